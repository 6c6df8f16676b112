//! Bounded history buffers.
//!
//! Two orderings are used by the engine:
//! - [`BoundedSeries`]: chronological, oldest first, FIFO eviction from the front
//!   (events-per-interval, reward-per-interval).
//! - [`BoundedFeed`]: newest first, eviction from the back (ticker, wave history).

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Sliding window of numeric samples, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundedSeries {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl BoundedSeries {
    /// Creates an empty series holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample, dropping the oldest one past capacity.
    pub fn push(&mut self, sample: f64) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copies the window out, oldest first.
    pub fn to_vec(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }
}

/// Newest-first buffer that evicts from the back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundedFeed<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedFeed<T> {
    /// Creates an empty feed holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Inserts at the front. Returns the item evicted from the back, if any.
    pub fn push_front(&mut self, item: T) -> Option<T> {
        self.items.push_front(item);
        if self.items.len() > self.capacity {
            self.items.pop_back()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates newest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }
}

impl<T: Clone> BoundedFeed<T> {
    /// Copies out at most `limit` items, newest first.
    pub fn head(&self, limit: usize) -> Vec<T> {
        self.items.iter().take(limit).cloned().collect()
    }

    /// Copies out the whole feed, newest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_series_fifo_eviction() {
        let mut series = BoundedSeries::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            series.push(v);
        }
        assert_eq!(series.to_vec(), vec![2.0, 3.0, 4.0]);
        assert_eq!(series.latest(), Some(4.0));
    }

    #[test]
    fn test_feed_evicts_oldest_from_back() {
        let mut feed = BoundedFeed::new(2);
        assert_eq!(feed.push_front("a"), None);
        assert_eq!(feed.push_front("b"), None);
        assert_eq!(feed.push_front("c"), Some("a"));
        assert_eq!(feed.to_vec(), vec!["c", "b"]);
    }

    #[test]
    fn test_feed_head_limits() {
        let mut feed = BoundedFeed::new(10);
        for i in 0..5 {
            feed.push_front(i);
        }
        assert_eq!(feed.head(3), vec![4, 3, 2]);
    }

    proptest! {
        #[test]
        fn prop_series_never_exceeds_capacity(cap in 1usize..64, pushes in 0usize..300) {
            let mut series = BoundedSeries::new(cap);
            for i in 0..pushes {
                series.push(i as f64);
                prop_assert!(series.len() <= cap);
            }
            // Chronological: the newest sample is always last
            if pushes > 0 {
                prop_assert_eq!(series.latest(), Some((pushes - 1) as f64));
            }
        }

        #[test]
        fn prop_feed_never_exceeds_capacity(cap in 1usize..64, pushes in 0usize..300) {
            let mut feed = BoundedFeed::new(cap);
            for i in 0..pushes {
                feed.push_front(i);
                prop_assert!(feed.len() <= cap);
                prop_assert_eq!(feed.get(0), Some(&i));
            }
        }
    }
}
