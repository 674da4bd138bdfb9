//! PCM16 decoding and linear resampling
//!
//! Converts raw little-endian PCM16 payloads into normalized f32 samples and
//! brings them to the pipeline rate.
//!
//! Decoding maps each signed 16-bit value `v` to `v / 32768`, so the full
//! input range lands in [-1.0, 1.0). Resampling is linear interpolation;
//! output length is `floor(len * to_rate / from_rate)`.

use crate::audio::types::ConvertedAudio;
use crate::error::{Error, Result};
use tracing::{debug, trace};

/// Scale between i16 and normalized f32
const PCM16_SCALE: f32 = 32768.0;

/// Stateless PCM16 → f32 converter
#[derive(Debug, Clone, Copy)]
pub struct SampleConverter {
    clamp: bool,
}

impl Default for SampleConverter {
    fn default() -> Self {
        Self { clamp: true }
    }
}

impl SampleConverter {
    /// # Arguments
    ///
    /// * `clamp` - Clamp decoded samples to [-1.0, 1.0]
    pub fn new(clamp: bool) -> Self {
        Self { clamp }
    }

    /// Decode a PCM16 payload.
    ///
    /// # Errors
    ///
    /// `Error::Validation` for an empty payload or an odd byte count.
    pub fn convert(&self, payload: &[u8], sample_rate: u32) -> Result<ConvertedAudio> {
        if payload.is_empty() {
            return Err(Error::Validation("empty payload".to_string()));
        }
        if payload.len() % 2 != 0 {
            return Err(Error::Validation(format!(
                "odd byte length {} is not PCM16",
                payload.len()
            )));
        }

        let data: Vec<f32> = payload
            .chunks_exact(2)
            .map(|pair| {
                let sample = i16::from_le_bytes([pair[0], pair[1]]) as f32 / PCM16_SCALE;
                if self.clamp {
                    sample.clamp(-1.0, 1.0)
                } else {
                    sample
                }
            })
            .collect();

        trace!("Converted {} bytes into {} samples", payload.len(), data.len());
        Ok(ConvertedAudio::new(data, sample_rate))
    }

    /// Decode a payload at `native_rate` and resample it to `pipeline_rate`
    pub fn normalize(
        &self,
        payload: &[u8],
        native_rate: u32,
        pipeline_rate: u32,
    ) -> Result<ConvertedAudio> {
        let decoded = self.convert(payload, native_rate)?;
        if native_rate == pipeline_rate {
            return Ok(decoded);
        }
        let data = resample(&decoded.data, native_rate, pipeline_rate);
        Ok(ConvertedAudio::new(data, pipeline_rate))
    }
}

/// Encode normalized samples back into PCM16 values.
///
/// Inverse of the decode mapping, saturating at the i16 range.
pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| (s * PCM16_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Encode i16 samples as a little-endian PCM16 payload
pub fn pcm16_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Linear-interpolation resampler.
///
/// Output sample `i` reads source position `s = i * from_rate / to_rate` and
/// blends `floor(s)` with the next sample (clamped to the last index).
/// Equal rates return a copy untouched.
pub fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || input.is_empty() {
        return input.to_vec();
    }
    if from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }

    let output_len = (input.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let ratio = from_rate as f64 / to_rate as f64;
    let last = input.len() - 1;

    let output: Vec<f32> = (0..output_len)
        .map(|i| {
            let position = i as f64 * ratio;
            let lo = (position.floor() as usize).min(last);
            let hi = (lo + 1).min(last);
            let frac = (position - lo as f64) as f32;
            input[lo] + (input[hi] - input[lo]) * frac
        })
        .collect();

    debug!(
        "Resampled {} samples {}Hz -> {} samples {}Hz",
        input.len(),
        from_rate,
        output.len(),
        to_rate
    );
    output
}
