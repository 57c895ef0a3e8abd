//! An ordered queue of values keyed by a monotonically increasing serial.
//!
//! Used throughout the crate wherever a resource's release must be deferred
//! until the GPU has advanced past the [`ExecutionSerial`] in which it was
//! last used: the recycle pool in [`BuddyMemoryAllocator`](crate::allocator::buddy_memory::BuddyMemoryAllocator),
//! the pending-heap queue in [`DirectAllocator`](crate::allocator::direct::DirectAllocator),
//! and the in-flight/free-list buckets in [`TempBufferManager`](crate::allocator::temp_buffer::TempBufferManager).

use std::collections::VecDeque;

use crate::ExecutionSerial;

/// Ordered groups of values, each group tagged with the serial it was
/// enqueued at. Groups appear in non-decreasing serial order; enqueuing with
/// a serial older than the current tail is a caller bug (debug-asserted).
#[derive(Debug)]
pub struct SerialQueue<T> {
    groups: VecDeque<(ExecutionSerial, VecDeque<T>)>,
}

impl<T> Default for SerialQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SerialQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            groups: VecDeque::new(),
        }
    }

    /// Enqueue `value` at `serial`. If the tail group already has this
    /// serial, `value` joins it; otherwise a new group is appended.
    ///
    /// # Panics
    /// In debug builds, panics if `serial` is older than the queue's current
    /// tail serial — callers must enqueue in non-decreasing serial order.
    pub fn enqueue(&mut self, value: T, serial: ExecutionSerial) {
        match self.groups.back_mut() {
            Some((tail_serial, items)) if *tail_serial == serial => items.push_back(value),
            Some((tail_serial, _)) => {
                debug_assert!(
                    serial >= *tail_serial,
                    "SerialQueue::enqueue called with a serial older than the tail group"
                );
                let mut items = VecDeque::new();
                items.push_back(value);
                self.groups.push_back((serial, items));
            }
            None => {
                let mut items = VecDeque::new();
                items.push_back(value);
                self.groups.push_back((serial, items));
            }
        }
    }

    /// Iterate, without removing, every value in groups whose serial is
    /// `<= serial`, in insertion order.
    pub fn iterate_up_to(&self, serial: ExecutionSerial) -> impl Iterator<Item = &T> {
        self.groups
            .iter()
            .take_while(move |(s, _)| *s <= serial)
            .flat_map(|(_, items)| items.iter())
    }

    /// Drop every group whose serial is `<= serial`.
    pub fn clear_up_to(&mut self, serial: ExecutionSerial) {
        while matches!(self.groups.front(), Some((s, _)) if *s <= serial) {
            self.groups.pop_front();
        }
    }

    /// Remove and return every value in groups whose serial is `<= serial`.
    ///
    /// Cheaper than, and unlike, calling `iterate_up_to` followed by
    /// `clear_up_to`: that pair can't move values out in safe Rust without
    /// cloning them first, since the iterator borrows `self` immutably while
    /// `clear_up_to` needs `&mut self`.
    pub fn drain_up_to(&mut self, serial: ExecutionSerial) -> Vec<T> {
        let mut drained = Vec::new();
        while matches!(self.groups.front(), Some((s, _)) if *s <= serial) {
            let (_, items) = self.groups.pop_front().unwrap();
            drained.extend(items);
        }
        drained
    }

    /// Pop and return one value from the lowest-serial group. The group is
    /// dropped once it becomes empty.
    pub fn take_one_from_first_group(&mut self) -> Option<T> {
        let (_, items) = self.groups.front_mut()?;
        let value = items.pop_front();
        if items.is_empty() {
            self.groups.pop_front();
        }
        value
    }

    /// True if there are no outstanding groups at all.
    pub fn empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of outstanding values across all groups.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, items)| items.len()).sum()
    }

    /// The serial of the lowest-serial outstanding group, if any.
    pub fn first_serial(&self) -> Option<ExecutionSerial> {
        self.groups.front().map(|(s, _)| *s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_groups_by_serial() {
        let mut q = SerialQueue::new();
        q.enqueue("a", 1);
        q.enqueue("b", 1);
        q.enqueue("c", 2);
        assert_eq!(q.groups.len(), 2);
        assert_eq!(q.first_serial(), Some(1));
    }

    #[test]
    fn iterate_up_to_does_not_remove() {
        let mut q = SerialQueue::new();
        q.enqueue(10, 1);
        q.enqueue(20, 2);
        q.enqueue(30, 3);
        let seen: Vec<_> = q.iterate_up_to(2).copied().collect();
        assert_eq!(seen, vec![10, 20]);
        assert!(!q.empty());
        assert_eq!(q.first_serial(), Some(1));
    }

    #[test]
    fn clear_up_to_drops_groups() {
        let mut q = SerialQueue::new();
        q.enqueue(10, 1);
        q.enqueue(20, 2);
        q.enqueue(30, 3);
        q.clear_up_to(2);
        assert_eq!(q.first_serial(), Some(3));
    }

    #[test]
    fn drain_up_to_removes_and_returns() {
        let mut q = SerialQueue::new();
        q.enqueue(10, 1);
        q.enqueue(20, 1);
        q.enqueue(30, 2);
        q.enqueue(40, 3);
        let drained = q.drain_up_to(2);
        assert_eq!(drained, vec![10, 20, 30]);
        assert_eq!(q.first_serial(), Some(3));
    }

    #[test]
    fn take_one_from_first_group_drops_empty_group() {
        let mut q = SerialQueue::new();
        q.enqueue("x", 1);
        q.enqueue("y", 2);
        assert_eq!(q.take_one_from_first_group(), Some("x"));
        // Group for serial 1 is now empty and dropped.
        assert_eq!(q.first_serial(), Some(2));
        assert_eq!(q.take_one_from_first_group(), Some("y"));
        assert!(q.empty());
        assert_eq!(q.take_one_from_first_group(), None);
    }

    #[test]
    #[should_panic]
    fn enqueue_out_of_order_panics_in_debug() {
        let mut q = SerialQueue::new();
        q.enqueue(1, 5);
        q.enqueue(2, 4);
    }
}
