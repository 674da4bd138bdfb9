//! Bounded FIFO queue between the upstream reader and the processing tick
//!
//! Holds inbound chunks in arrival order. Both a count limit and a byte
//! limit apply; when either would be exceeded, the oldest entries are
//! evicted (drop-oldest) and counted.

use crate::audio::AudioChunk;
use std::collections::VecDeque;
use tracing::warn;

/// Anything with a byte size the queue can budget
pub trait QueueItem {
    fn size_bytes(&self) -> usize;
}

impl QueueItem for AudioChunk {
    fn size_bytes(&self) -> usize {
        AudioChunk::size_bytes(self)
    }
}

impl QueueItem for Vec<u8> {
    fn size_bytes(&self) -> usize {
        self.len()
    }
}

/// Snapshot of queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FifoStats {
    pub len: usize,
    pub bytes: usize,
    pub dropped: u64,
    pub max_size: usize,
    pub max_bytes: usize,
}

/// Count- and byte-bounded queue with drop-oldest eviction
pub struct FifoQueue<T> {
    items: VecDeque<T>,
    bytes: usize,
    max_size: usize,
    max_bytes: usize,
    dropped: u64,
}

impl<T: QueueItem> FifoQueue<T> {
    pub fn new(max_size: usize, max_bytes: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(max_size.min(1024)),
            bytes: 0,
            max_size: max_size.max(1),
            max_bytes: max_bytes.max(1),
            dropped: 0,
        }
    }

    /// Append an item, evicting from the front until it fits.
    ///
    /// An item larger than the byte limit on its own is still accepted once
    /// the queue is empty. Returns the number of items evicted.
    pub fn enqueue(&mut self, item: T) -> usize {
        let size = item.size_bytes();
        let mut evicted = 0;

        while !self.items.is_empty()
            && (self.items.len() + 1 > self.max_size || self.bytes + size > self.max_bytes)
        {
            if let Some(old) = self.items.pop_front() {
                self.bytes -= old.size_bytes();
                evicted += 1;
            }
        }

        if evicted > 0 {
            self.dropped += evicted as u64;
            warn!(
                "FIFO full ({} items, {} bytes): dropped {} oldest",
                self.items.len(),
                self.bytes,
                evicted
            );
        }

        self.bytes += size;
        self.items.push_back(item);
        evicted
    }

    pub fn dequeue(&mut self) -> Option<T> {
        let item = self.items.pop_front()?;
        self.bytes -= item.size_bytes();
        Some(item)
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Room for another item under both limits
    pub fn has_capacity(&self) -> bool {
        self.items.len() < self.max_size && self.bytes < self.max_bytes
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Remove every item and zero the counters
    pub fn clear(&mut self) {
        self.items.clear();
        self.bytes = 0;
        self.dropped = 0;
    }

    pub fn stats(&self) -> FifoStats {
        FifoStats {
            len: self.items.len(),
            bytes: self.bytes,
            dropped: self.dropped,
            max_size: self.max_size,
            max_bytes: self.max_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue: FifoQueue<Vec<u8>> = FifoQueue::new(4, 1024);
        queue.enqueue(vec![1]);
        queue.enqueue(vec![2, 2]);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.bytes(), 3);
        assert_eq!(queue.dequeue(), Some(vec![1]));
        assert_eq!(queue.dequeue(), Some(vec![2, 2]));
        assert_eq!(queue.dequeue(), None);
        assert_eq!(queue.bytes(), 0);
    }

    #[test]
    fn test_count_limit_drops_oldest() {
        let mut queue: FifoQueue<Vec<u8>> = FifoQueue::new(2, 1024);
        queue.enqueue(vec![1]);
        queue.enqueue(vec![2]);
        assert_eq!(queue.enqueue(vec![3]), 1);

        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.peek(), Some(&vec![2]));
    }

    #[test]
    fn test_byte_limit_drops_oldest() {
        let mut queue: FifoQueue<Vec<u8>> = FifoQueue::new(10, 10);
        queue.enqueue(vec![0; 4]);
        queue.enqueue(vec![0; 4]);
        assert_eq!(queue.enqueue(vec![0; 6]), 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.bytes(), 10);
        assert_eq!(queue.enqueue(vec![0; 10]), 2);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_oversized_item_accepted_alone() {
        let mut queue: FifoQueue<Vec<u8>> = FifoQueue::new(10, 4);
        queue.enqueue(vec![0; 2]);
        queue.enqueue(vec![0; 9]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.bytes(), 9);
        assert!(!queue.has_capacity());
    }

    #[test]
    fn test_clear_resets_counters() {
        let mut queue: FifoQueue<Vec<u8>> = FifoQueue::new(1, 100);
        queue.enqueue(vec![1]);
        queue.enqueue(vec![2]);
        queue.clear();
        assert_eq!(queue.stats(), FifoStats {
            len: 0,
            bytes: 0,
            dropped: 0,
            max_size: 1,
            max_bytes: 100,
        });
    }
}
