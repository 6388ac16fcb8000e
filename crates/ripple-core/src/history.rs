//! Bounded history buffers
//!
//! Fixed-capacity, oldest-evicting buffers used for the event, log-event
//! and timeline subtrees of the snapshot. Memory stays bounded no matter
//! how long a channel stays up.

use std::collections::VecDeque;

use serde::Serialize;

/// A fixed-capacity ordered buffer that evicts its oldest item on overflow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundedHistory<T> {
    items: VecDeque<T>,
    #[serde(skip)]
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    /// Create a history holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be non-zero");
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, evicting the oldest one if the buffer is full.
    pub fn append(&mut self, item: T) {
        self.items.push_back(item);
        if self.items.len() > self.capacity {
            self.items.pop_front();
        }
    }

    /// Replace the entire contents, keeping only the most recent
    /// `capacity` items of the input.
    pub fn replace(&mut self, items: Vec<T>) {
        let mut items = items;
        let excess = items.len().saturating_sub(self.capacity);
        if excess > 0 {
            items.drain(..excess);
        }
        self.items = items.into();
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

    /// Iterate oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// The most recently appended item.
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }
}

impl<T: Clone> BoundedHistory<T> {
    /// Snapshot the retained items oldest-first.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_within_capacity() {
        let mut history = BoundedHistory::new(5);
        history.append(1);
        history.append(2);
        assert_eq!(history.len(), 2);
        assert_eq!(history.to_vec(), vec![1, 2]);
    }

    #[test]
    fn test_append_evicts_oldest() {
        // Capacity 3: A, B, C, D leaves B, C, D
        let mut history = BoundedHistory::new(3);
        for item in ["A", "B", "C", "D"] {
            history.append(item);
        }
        assert_eq!(history.to_vec(), vec!["B", "C", "D"]);
    }

    #[test]
    fn test_length_is_min_of_appends_and_capacity() {
        let capacity = 7;
        for appends in [0usize, 3, 7, 20] {
            let mut history = BoundedHistory::new(capacity);
            for i in 0..appends {
                history.append(i);
            }
            assert_eq!(history.len(), appends.min(capacity));
            // Retained items are exactly the last `capacity` in order
            let expected: Vec<usize> = (appends.saturating_sub(capacity)..appends).collect();
            assert_eq!(history.to_vec(), expected);
        }
    }

    #[test]
    fn test_replace_truncates_to_most_recent() {
        let mut history = BoundedHistory::new(3);
        history.replace(vec![1, 2, 3, 4, 5]);
        assert_eq!(history.to_vec(), vec![3, 4, 5]);
    }

    #[test]
    fn test_replace_with_fewer_items() {
        let mut history = BoundedHistory::new(10);
        history.append(99);
        history.replace(vec![1, 2]);
        assert_eq!(history.to_vec(), vec![1, 2]);
    }

    #[test]
    fn test_latest() {
        let mut history = BoundedHistory::new(2);
        assert!(history.latest().is_none());
        history.append("a");
        history.append("b");
        history.append("c");
        assert_eq!(history.latest(), Some(&"c"));
    }

    #[test]
    #[should_panic(expected = "capacity must be non-zero")]
    fn test_zero_capacity_panics() {
        let _ = BoundedHistory::<u8>::new(0);
    }
}
