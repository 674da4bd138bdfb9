//! Device timeline: absolute-time source scheduling and mixing
//!
//! The timeline owns every buffer scheduled on an output device together
//! with the device clock (frames rendered). The render callback pulls one
//! frame at a time; sources whose window covers the current frame are summed,
//! scaled by the gain and clamped.
//!
//! Time is measured in device frames from stream start, so a buffer
//! scheduled at `t` seconds begins at frame `round(t * rate)`.
//!
//! The clock never stops. Pausing is per owner: a held owner's sources are
//! skipped while rendering and kept alive, and releasing the hold shifts
//! them later by the frames that passed, so they resume where they stopped
//! while other owners keep playing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

/// Default number of scheduled spans remembered for diagnostics
pub const DEFAULT_HISTORY_LIMIT: usize = 512;

/// Identifier of one scheduled buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

/// Where a buffer landed on the device clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSpan {
    pub id: SourceId,
    pub owner: Uuid,
    /// Start on the device clock (seconds)
    pub start_time: f64,
    /// Length in seconds
    pub duration: f64,
}

impl ScheduledSpan {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

struct ScheduledSource {
    id: SourceId,
    owner: Uuid,
    start_frame: u64,
    samples: Arc<[f32]>,
}

impl ScheduledSource {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

pub struct Timeline {
    sample_rate: u32,
    frames_rendered: u64,
    /// Sorted by start frame
    sources: VecDeque<ScheduledSource>,
    gain: f32,
    next_id: u64,
    /// Held owners and the frame each hold began at
    held: HashMap<Uuid, u64>,
    history: VecDeque<ScheduledSpan>,
    history_limit: usize,
}

impl Timeline {
    pub fn new(sample_rate: u32, gain: f32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            frames_rendered: 0,
            sources: VecDeque::new(),
            gain: gain.clamp(0.0, 2.0),
            next_id: 0,
            held: HashMap::new(),
            history: VecDeque::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Device clock in seconds
    pub fn now(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Set gain, clamped to [0, 2]; returns the applied value
    pub fn set_gain(&mut self, gain: f32) -> f32 {
        self.gain = gain.clamp(0.0, 2.0);
        self.gain
    }

    /// Schedule device-rate samples to start at `start_time` seconds.
    ///
    /// A start time in the past is moved to the current frame.
    pub fn schedule(&mut self, owner: Uuid, samples: Arc<[f32]>, start_time: f64) -> ScheduledSpan {
        let requested = (start_time.max(0.0) * self.sample_rate as f64).round() as u64;
        let start_frame = requested.max(self.frames_rendered);

        let id = SourceId(self.next_id);
        self.next_id += 1;

        let span = ScheduledSpan {
            id,
            owner,
            start_time: start_frame as f64 / self.sample_rate as f64,
            duration: samples.len() as f64 / self.sample_rate as f64,
        };

        let position = self
            .sources
            .iter()
            .position(|s| s.start_frame > start_frame)
            .unwrap_or(self.sources.len());
        self.sources.insert(
            position,
            ScheduledSource {
                id,
                owner,
                start_frame,
                samples,
            },
        );

        if self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(span);
        span
    }

    /// Render the next frame and advance the clock by one frame
    pub fn render_frame(&mut self) -> f32 {
        let frame = self.frames_rendered;
        let mut mixed = 0.0f32;

        for source in &self.sources {
            if source.start_frame > frame {
                break;
            }
            if self.held.contains_key(&source.owner) {
                continue;
            }
            let offset = (frame - source.start_frame) as usize;
            if let Some(sample) = source.samples.get(offset) {
                mixed += *sample;
            }
        }

        self.frames_rendered += 1;
        (mixed * self.gain).clamp(-1.0, 1.0)
    }

    /// Advance the clock without producing output
    pub fn advance_to(&mut self, frame: u64) {
        if frame > self.frames_rendered {
            self.frames_rendered = frame;
        }
        self.retire();
    }

    /// Drop sources that have finished playing; returns how many
    pub fn retire(&mut self) -> usize {
        let now = self.frames_rendered;
        let held = &self.held;
        let before = self.sources.len();
        self.sources
            .retain(|s| s.end_frame() > now || held.contains_key(&s.owner));
        before - self.sources.len()
    }

    /// Stop rendering `owner`'s sources; false if already held
    pub fn hold(&mut self, owner: Uuid) -> bool {
        if self.held.contains_key(&owner) {
            return false;
        }
        self.held.insert(owner, self.frames_rendered);
        true
    }

    /// Release a hold, moving the owner's sources later by the held span.
    ///
    /// Returns the shift in seconds (0 when `owner` was not held).
    pub fn release(&mut self, owner: Uuid) -> f64 {
        let Some(since) = self.held.remove(&owner) else {
            return 0.0;
        };
        let shift = self.frames_rendered.saturating_sub(since);
        if shift > 0 {
            for source in self.sources.iter_mut().filter(|s| s.owner == owner) {
                source.start_frame += shift;
            }
            self.sources
                .make_contiguous()
                .sort_by_key(|s| s.start_frame);
        }
        shift as f64 / self.sample_rate as f64
    }

    pub fn is_held(&self, owner: Uuid) -> bool {
        self.held.contains_key(&owner)
    }

    pub fn active_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn active_sources_for(&self, owner: Uuid) -> usize {
        self.sources.iter().filter(|s| s.owner == owner).count()
    }

    /// Cancel every source owned by `owner` and drop its hold; returns how many
    pub fn cancel_owner(&mut self, owner: Uuid) -> usize {
        self.held.remove(&owner);
        let before = self.sources.len();
        self.sources.retain(|s| s.owner != owner);
        before - self.sources.len()
    }

    pub fn history(&self) -> Vec<ScheduledSpan> {
        self.history.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(value: f32, len: usize) -> Arc<[f32]> {
        vec![value; len].into()
    }

    #[test]
    fn test_source_plays_at_scheduled_frame() {
        let mut timeline = Timeline::new(10, 1.0);
        let owner = Uuid::new_v4();
        timeline.schedule(owner, samples(0.5, 3), 0.2);

        let rendered: Vec<f32> = (0..6).map(|_| timeline.render_frame()).collect();
        assert_eq!(rendered, vec![0.0, 0.0, 0.5, 0.5, 0.5, 0.0]);

        assert_eq!(timeline.retire(), 1);
        assert_eq!(timeline.active_sources(), 0);
    }

    #[test]
    fn test_past_start_moves_to_now() {
        let mut timeline = Timeline::new(10, 1.0);
        timeline.advance_to(20);
        let span = timeline.schedule(Uuid::new_v4(), samples(0.1, 5), 0.5);
        assert_eq!(span.start_time, 2.0);
    }

    #[test]
    fn test_gain_scales_and_clamps() {
        let mut timeline = Timeline::new(10, 1.0);
        assert_eq!(timeline.set_gain(5.0), 2.0);
        timeline.schedule(Uuid::new_v4(), samples(0.75, 2), 0.0);
        assert_eq!(timeline.render_frame(), 1.0);

        timeline.set_gain(0.5);
        assert_eq!(timeline.render_frame(), 0.375);
    }

    #[test]
    fn test_cancel_owner_only_removes_owned() {
        let mut timeline = Timeline::new(10, 1.0);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        timeline.schedule(a, samples(0.1, 5), 0.0);
        timeline.schedule(b, samples(0.1, 5), 0.0);
        timeline.schedule(a, samples(0.1, 5), 0.5);

        assert_eq!(timeline.active_sources_for(a), 2);
        assert_eq!(timeline.cancel_owner(a), 2);
        assert_eq!(timeline.active_sources(), 1);
    }

    #[test]
    fn test_advance_retires_finished() {
        let mut timeline = Timeline::new(100, 1.0);
        let owner = Uuid::new_v4();
        timeline.schedule(owner, samples(0.1, 50), 0.0);
        timeline.schedule(owner, samples(0.1, 50), 0.5);

        timeline.advance_to(60);
        assert_eq!(timeline.active_sources(), 1);
        timeline.advance_to(100);
        assert_eq!(timeline.active_sources(), 0);
        assert_eq!(timeline.history().len(), 2);
    }

    #[test]
    fn test_hold_resumes_where_it_stopped() {
        let mut timeline = Timeline::new(10, 1.0);
        let owner = Uuid::new_v4();
        let ramp: Arc<[f32]> = vec![0.1, 0.2, 0.3, 0.4].into();
        timeline.schedule(owner, ramp, 0.0);

        assert_eq!(timeline.render_frame(), 0.1);
        assert_eq!(timeline.render_frame(), 0.2);
        assert!(timeline.hold(owner));
        assert!(!timeline.hold(owner));

        timeline.advance_to(50);
        assert_eq!(timeline.render_frame(), 0.0);
        assert_eq!(timeline.active_sources_for(owner), 1);

        // 49 frames passed while held
        assert!((timeline.release(owner) - 4.9).abs() < 1e-9);
        assert_eq!(timeline.render_frame(), 0.3);
        assert_eq!(timeline.render_frame(), 0.4);
        assert_eq!(timeline.retire(), 1);
    }

    #[test]
    fn test_hold_leaves_other_owners_playing() {
        let mut timeline = Timeline::new(10, 1.0);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        timeline.schedule(a, samples(0.25, 10), 0.0);
        timeline.schedule(b, samples(0.5, 10), 0.0);

        timeline.hold(a);
        assert_eq!(timeline.render_frame(), 0.5);
        assert!(timeline.is_held(a));
        assert!(!timeline.is_held(b));

        timeline.advance_to(20);
        assert_eq!(timeline.active_sources_for(b), 0);
        assert_eq!(timeline.active_sources_for(a), 1);

        assert_eq!(timeline.cancel_owner(a), 1);
        assert!(!timeline.is_held(a));
    }
}
