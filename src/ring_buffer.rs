//! Fixed-capacity circular buffer that overwrites its oldest entry when full.

use std::collections::VecDeque;

/// Circular buffer holding at most `capacity` items in insertion order.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, evicting the oldest one when the buffer is full.
    pub fn push(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Number of items available to read.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.items.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Oldest-first iterator over the buffered items.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Most recently pushed item.
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy out every buffered item, oldest first.
    pub fn get_all(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    /// Copy out up to `count` of the oldest items.
    pub fn get(&self, count: usize) -> Vec<T> {
        self.items.iter().take(count).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_below_capacity_keeps_order() {
        let mut buffer = RingBuffer::new(4);
        buffer.push(1);
        buffer.push(2);
        buffer.push(3);
        assert_eq!(buffer.len(), 3);
        assert!(!buffer.is_full());
        assert_eq!(buffer.get_all(), vec![1, 2, 3]);
    }

    #[test]
    fn test_overwrites_oldest_when_full() {
        let mut buffer = RingBuffer::new(3);
        for i in 0..5 {
            buffer.push(i);
        }
        assert!(buffer.is_full());
        assert_eq!(buffer.get_all(), vec![2, 3, 4]);
        assert_eq!(buffer.latest(), Some(&4));
    }

    #[test]
    fn test_get_is_clamped_to_available() {
        let mut buffer = RingBuffer::new(8);
        buffer.push('a');
        buffer.push('b');
        assert_eq!(buffer.get(1), vec!['a']);
        assert_eq!(buffer.get(10), vec!['a', 'b']);
    }

    #[test]
    fn test_zero_capacity_ignores_pushes() {
        let mut buffer = RingBuffer::new(0);
        buffer.push(1);
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());
    }
}
