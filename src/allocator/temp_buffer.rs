//! Pools transient, host-visible scratch buffers keyed by power-of-two size
//! bucket, the way `dawn::native::TempGPUBufferManager` does.
//!
//! Grounded on `original_source/src/dawn/native/TempGPUBufferManager.cpp`:
//! requests are rounded up to the next bucket (capped at [`TempBufferConfig::pow2_max`],
//! above which a buffer is tracked at its exact size and is its own bucket),
//! and a buffer only becomes reusable after `deallocate` has both seen its
//! use-serial complete and, once [`TempBufferConfig::keep_alive`] submissions
//! have passed, the sweep has not yet dropped it. Reclamation here is FIFO
//! per bucket rather than the heap pool's LIFO in
//! [`BuddyMemoryAllocator`](crate::allocator::buddy_memory::BuddyMemoryAllocator):
//! the goal is bounding peak memory under bursty per-frame allocation, not
//! maximizing reuse locality.

use std::collections::HashMap;

use ash::vk;
use derivative::Derivative;
use log::{debug, trace};

use crate::core::{Buffer, BufferDescriptor, Device};
use crate::error::Result;
use crate::serial_queue::SerialQueue;
use crate::ExecutionSerial;

/// Tuning knobs for [`TempBufferManager`]. Defaults match the constants
/// `TempGPUBufferManager.cpp` hardcodes.
#[derive(Debug, Clone, Copy)]
pub struct TempBufferConfig {
    /// Requests at or below this size are rounded up to a power-of-two
    /// bucket; above it, each request is tracked at its exact size and is
    /// its own bucket.
    pub pow2_max: vk::DeviceSize,
    /// Number of submissions a freed buffer must sit idle for before
    /// `deallocate`'s sweep may drop it.
    pub keep_alive: u64,
}

impl Default for TempBufferConfig {
    fn default() -> Self {
        Self {
            pow2_max: 4 * 1024 * 1024,
            keep_alive: 300,
        }
    }
}

/// Pools buffers sized for one-frame-or-so scratch use (uniform upload
/// staging, indirect-draw parameter buffers, and similar).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct TempBufferManager<D> {
    #[derivative(Debug = "ignore")]
    device: D,
    usage: vk::BufferUsageFlags,
    config: TempBufferConfig,
    /// Buffers handed out and not yet passed to `deallocate`, grouped by the
    /// submission serial they're in use for.
    inflight: SerialQueue<Buffer>,
    /// One FIFO free list per bucket size, keyed by the serial the buffer
    /// was moved in at (i.e. the `completed_serial` of the `deallocate` call
    /// that freed it).
    free_lists: HashMap<vk::DeviceSize, SerialQueue<Buffer>>,
}

impl<D: Device> TempBufferManager<D> {
    pub fn new(device: D, usage: vk::BufferUsageFlags, config: TempBufferConfig) -> Self {
        Self {
            device,
            usage,
            config,
            inflight: SerialQueue::new(),
            free_lists: HashMap::new(),
        }
    }

    fn actual_size(&self, size: vk::DeviceSize) -> vk::DeviceSize {
        if size <= self.config.pow2_max {
            size.max(1).next_power_of_two()
        } else {
            size
        }
    }

    /// Allocate (or reuse) a buffer of at least `size` bytes, marked in use
    /// for the submission numbered `use_in_serial`.
    pub fn allocate(&mut self, size: vk::DeviceSize, use_in_serial: ExecutionSerial) -> Result<Buffer> {
        let actual_size = self.actual_size(size);

        let reused = match self.free_lists.get_mut(&actual_size) {
            Some(queue) => {
                let buffer = queue.take_one_from_first_group();
                if queue.empty() {
                    self.free_lists.remove(&actual_size);
                }
                buffer
            }
            None => None,
        };

        let buffer = match reused {
            Some(buffer) => {
                trace!("reusing pooled buffer of size {actual_size}");
                buffer
            }
            None => {
                debug!("no pooled buffer of size {actual_size} available, creating one");
                self.device.create_buffer(&BufferDescriptor {
                    size: actual_size,
                    usage: self.usage,
                })?
            }
        };

        self.inflight.enqueue(buffer, use_in_serial);
        Ok(buffer)
    }

    /// Move every in-flight buffer whose use-serial has completed into its
    /// bucket's free list, then sweep buckets for entries past their
    /// `keep_alive` window.
    pub fn deallocate(&mut self, completed_serial: ExecutionSerial) {
        for buffer in self.inflight.drain_up_to(completed_serial) {
            self.free_lists
                .entry(buffer.size())
                .or_insert_with(SerialQueue::new)
                .enqueue(buffer, completed_serial);
        }

        if completed_serial < self.config.keep_alive {
            return;
        }
        let threshold = completed_serial - self.config.keep_alive;

        let mut drained_keys = Vec::new();
        for (&size, queue) in self.free_lists.iter_mut() {
            queue.clear_up_to(threshold);
            if queue.empty() {
                drained_keys.push(size);
            }
        }
        for size in drained_keys {
            self.free_lists.remove(&size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FakeDevice {
        next_id: Cell<u64>,
        pending: u64,
        completed: u64,
    }

    impl Device for FakeDevice {
        fn pending_submission_serial(&self) -> ExecutionSerial {
            self.pending
        }

        fn completed_serial(&self) -> ExecutionSerial {
            self.completed
        }

        fn create_buffer(&mut self, desc: &BufferDescriptor) -> Result<Buffer> {
            let id = self.next_id.get();
            self.next_id.set(id + 1);
            Ok(Buffer::new(id, desc.size))
        }
    }

    fn device() -> FakeDevice {
        FakeDevice {
            next_id: Cell::new(1),
            pending: 0,
            completed: 0,
        }
    }

    #[test]
    fn scenario_s4_buckets_by_actual_size() {
        let mut mgr = TempBufferManager::new(device(), vk::BufferUsageFlags::UNIFORM_BUFFER, TempBufferConfig::default());

        let a = mgr.allocate(500, 10).unwrap();
        assert_eq!(a.size(), 512);
        mgr.deallocate(10);
        assert_eq!(mgr.free_lists.get(&512).map(SerialQueue::len), Some(1));

        let b = mgr.allocate(700, 11).unwrap();
        assert_eq!(b.size(), 1024);
        assert_ne!(b.id(), a.id());

        let c = mgr.allocate(500, 12).unwrap();
        assert_eq!(c.id(), a.id(), "should reuse the bucket-512 buffer rather than create a new one");
        assert!(!mgr.free_lists.contains_key(&512), "bucket must be erased once drained empty");
    }

    #[test]
    fn scenario_s5_keep_alive_sweep() {
        let mut mgr = TempBufferManager::new(
            device(),
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            TempBufferConfig {
                pow2_max: 4 * 1024 * 1024,
                keep_alive: 300,
            },
        );

        let first = mgr.allocate(64, 5).unwrap();
        mgr.deallocate(5);
        assert_eq!(mgr.free_lists.get(&64).map(SerialQueue::len), Some(1));

        mgr.deallocate(304);
        assert_eq!(
            mgr.free_lists.get(&64).map(SerialQueue::len),
            Some(1),
            "5 <= 304 - 300 = 4 is false, buffer must remain"
        );

        mgr.deallocate(305);
        assert!(
            !mgr.free_lists.contains_key(&64),
            "5 <= 305 - 300 = 5 is true, buffer must be swept and bucket erased"
        );
        let _ = first;
    }

    #[test]
    fn oversized_request_is_its_own_exact_size_bucket() {
        let mut mgr = TempBufferManager::new(device(), vk::BufferUsageFlags::UNIFORM_BUFFER, TempBufferConfig::default());

        let huge = mgr.allocate(5 * 1024 * 1024, 1).unwrap();
        assert_eq!(huge.size(), 5 * 1024 * 1024);
        mgr.deallocate(1);

        let reused = mgr.allocate(5 * 1024 * 1024, 2).unwrap();
        assert_eq!(reused.id(), huge.id());
    }
}
