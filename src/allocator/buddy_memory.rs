//! Pools whole [`DeviceHeap`]s behind a [`BuddyAllocator`], so many small
//! suballocations share a handful of real device-memory objects.
//!
//! Grounded directly on `dawn_native::BuddyMemoryAllocator` (`original_source/src/dawn_native/BuddyMemoryAllocator.cpp`):
//! one `BuddyAllocator` covers a virtual range of `heap_count * block_size`,
//! and heaps are created lazily the first time a buddy block lands in a
//! region that has never been backed before. Heap reclamation is LIFO: a
//! freed heap goes back on a recycle stack rather than being destroyed
//! immediately, keyed by the submission serial the heap was last used in, so
//! that it can only be handed back out once the device reports that serial
//! complete.

use ash::vk;
use derivative::Derivative;
use log::{debug, trace};

use crate::allocator::buddy::BuddyAllocator;
use crate::allocator::resource::ResourceMemoryAllocation;
use crate::core::{Device, DeviceHeap, DeviceHeapAllocator};
use crate::error::Result;
use crate::ExecutionSerial;

struct HeapTracker {
    refcount: u32,
    heap: Option<DeviceHeap>,
}

/// One entry in the LIFO recycle pool: a heap along with the submission
/// serial it was last used in. Reusable once the device reports that serial
/// complete.
struct PooledHeap {
    last_use_serial: ExecutionSerial,
    heap: DeviceHeap,
}

/// Suballocates many same-sized `DeviceHeap`s using a single [`BuddyAllocator`].
///
/// `H` is the backend's heap allocator, `D` is the device whose
/// `completed_serial`/`pending_submission_serial` gate the recycle pool.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct BuddyMemoryAllocator<H, D> {
    buddy: BuddyAllocator,
    block_size: vk::DeviceSize,
    #[derivative(Debug = "ignore")]
    trackers: Vec<HeapTracker>,
    /// Newest-at-end; the last element is the front of the conceptual LIFO
    /// pool and the only entry ever inspected for reuse (`BuddyMemoryAllocator.cpp`'s
    /// "peek-at-front is sufficient" policy — it is not a full scan).
    #[derivative(Debug = "ignore")]
    recycle_pool: Vec<PooledHeap>,
    #[derivative(Debug = "ignore")]
    heap_allocator: H,
    #[derivative(Debug = "ignore")]
    device: D,
}

impl<H: DeviceHeapAllocator, D: Device> BuddyMemoryAllocator<H, D> {
    /// `block_size` must be a power of two and must divide `max_system_size`.
    ///
    /// # Panics
    /// Panics if `block_size` is not a power of two, or does not divide
    /// `max_system_size` evenly (`BuddyMemoryAllocator.cpp` asserts the same
    /// in its constructor).
    pub fn new(max_system_size: vk::DeviceSize, block_size: vk::DeviceSize, heap_allocator: H, device: D) -> Self {
        assert!(block_size.is_power_of_two(), "BuddyMemoryAllocator::new: block_size must be a power of two");
        assert_eq!(
            max_system_size % block_size,
            0,
            "BuddyMemoryAllocator::new: block_size must divide max_system_size"
        );

        let tracker_count = (max_system_size / block_size) as usize;
        let mut trackers = Vec::with_capacity(tracker_count);
        trackers.resize_with(tracker_count, || HeapTracker { refcount: 0, heap: None });

        Self {
            buddy: BuddyAllocator::new(max_system_size),
            block_size,
            trackers,
            recycle_pool: Vec::new(),
            heap_allocator,
            device,
        }
    }

    /// The fixed heap size this allocator was configured with.
    pub fn block_size(&self) -> vk::DeviceSize {
        self.block_size
    }

    /// Number of heaps currently backing a live tracker (`refcount > 0`).
    /// Diagnostic only (mirrors `ComputeTotalNumOfHeapsForTesting`).
    pub fn heap_count(&self) -> usize {
        self.trackers.iter().filter(|t| t.refcount > 0).count()
    }

    /// Number of heaps sitting in the LIFO recycle pool (mirrors
    /// `GetPoolSizeForTesting`).
    pub fn pool_size(&self) -> usize {
        self.recycle_pool.len()
    }

    fn acquire_heap_for(&mut self, heap_index: usize) -> Result<()> {
        let tracker = &mut self.trackers[heap_index];
        if tracker.refcount > 0 {
            tracker.refcount += 1;
            return Ok(());
        }

        let completed = self.device.completed_serial();
        let reused = match self.recycle_pool.last() {
            Some(entry) if entry.last_use_serial <= completed => {
                trace!("reusing pooled heap for slot {heap_index}");
                Some(self.recycle_pool.pop().unwrap().heap)
            }
            _ => None,
        };

        let heap = match reused {
            Some(heap) => heap,
            None => {
                debug!("no pooled heap ready, allocating a new one of {} bytes", self.block_size);
                self.heap_allocator.allocate_heap(self.block_size)?
            }
        };

        self.trackers[heap_index].refcount = 1;
        self.trackers[heap_index].heap = Some(heap);
        Ok(())
    }

    /// Allocate `size` bytes aligned to `alignment`, creating or reusing a
    /// backing heap as needed.
    ///
    /// Returns `Ok(ResourceMemoryAllocation::invalid())` rather than an
    /// `Err` when `size` is zero or exceeds the block size, or when the
    /// buddy allocator's address space is exhausted — only a genuine
    /// backend heap-allocation failure propagates as `Err`.
    pub fn allocate(&mut self, size: vk::DeviceSize, alignment: vk::DeviceSize) -> Result<ResourceMemoryAllocation> {
        if size == 0 || size > self.block_size {
            return Ok(ResourceMemoryAllocation::invalid());
        }

        let offset = match self.buddy.allocate(size, alignment) {
            Some(offset) => offset,
            None => return Ok(ResourceMemoryAllocation::invalid()),
        };

        let heap_index = (offset / self.block_size) as usize;
        if let Err(e) = self.acquire_heap_for(heap_index) {
            self.buddy.deallocate(offset);
            return Err(e);
        }

        let memory_offset = offset % self.block_size;
        Ok(ResourceMemoryAllocation::sub_allocated(heap_index, offset, memory_offset, size))
    }

    /// Return a block to the buddy allocator, releasing its backing heap to
    /// the recycle pool once nothing else in that heap is still live.
    ///
    /// # Panics
    /// Panics if `allocation` was not produced by this allocator's
    /// sub-allocating path.
    pub fn deallocate(&mut self, mut allocation: ResourceMemoryAllocation) {
        if allocation.is_invalid() {
            return;
        }
        let heap_index = allocation
            .heap_index()
            .expect("BuddyMemoryAllocator::deallocate called with a non-sub-allocated allocation");
        let block_offset = allocation.block_offset().expect("sub-allocated allocation must carry a block offset");

        let tracker = &mut self.trackers[heap_index];
        tracker.refcount -= 1;
        if tracker.refcount == 0 {
            let heap = tracker.heap.take().expect("refcount was positive, heap must be present");
            trace!("heap at slot {heap_index} has no more live suballocations, returning to pool");
            self.recycle_pool.push(PooledHeap {
                last_use_serial: self.device.pending_submission_serial(),
                heap,
            });
        }

        self.buddy.deallocate(block_offset);
        allocation.mark_consumed();
    }

    /// Drain every heap in the recycle pool back to the backend.
    ///
    /// # Panics
    /// Panics (debug builds) if any tracker still has a live heap, matching
    /// the original's shutdown-time assertion that nothing is outstanding.
    /// Also panics if the backend fails to deallocate a pooled heap — this
    /// is a shutdown-time drain with no caller left to hand a `Result` to,
    /// so a backend failure here is unrecoverable and aborts.
    pub fn destroy_pool(&mut self) {
        debug_assert!(
            self.trackers.iter().all(|t| t.refcount == 0),
            "BuddyMemoryAllocator::destroy_pool called with outstanding allocations"
        );
        debug!("destroying {} pooled heap(s)", self.recycle_pool.len());
        for entry in self.recycle_pool.drain(..) {
            self.heap_allocator
                .deallocate_heap(entry.heap)
                .expect("destroy_pool: backend failed to deallocate a pooled heap");
        }
    }

    /// Resolve an allocation back to the heap that currently backs it.
    pub fn heap(&self, allocation: &ResourceMemoryAllocation) -> Option<&DeviceHeap> {
        let heap_index = allocation.heap_index()?;
        self.trackers[heap_index].heap.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Default)]
    struct CountingHeapAllocator {
        next_id: u64,
        allocate_calls: Rc<RefCell<u32>>,
        deallocate_calls: Rc<RefCell<u32>>,
    }

    impl DeviceHeapAllocator for CountingHeapAllocator {
        fn allocate_heap(&mut self, size: vk::DeviceSize) -> Result<DeviceHeap> {
            *self.allocate_calls.borrow_mut() += 1;
            self.next_id += 1;
            Ok(DeviceHeap::new(self.next_id, size))
        }

        fn deallocate_heap(&mut self, _heap: DeviceHeap) -> Result<()> {
            *self.deallocate_calls.borrow_mut() += 1;
            Ok(())
        }
    }

    struct FakeDevice {
        pending: Cell<u64>,
        completed: Cell<u64>,
    }

    impl FakeDevice {
        fn new() -> Self {
            Self {
                pending: Cell::new(1),
                completed: Cell::new(0),
            }
        }

        fn advance_completed_to(&self, serial: u64) {
            self.completed.set(serial);
        }
    }

    impl Device for FakeDevice {
        fn pending_submission_serial(&self) -> ExecutionSerial {
            let s = self.pending.get();
            self.pending.set(s + 1);
            s
        }

        fn completed_serial(&self) -> ExecutionSerial {
            self.completed.get()
        }

        fn create_buffer(&mut self, _desc: &crate::core::BufferDescriptor) -> Result<crate::core::Buffer> {
            unreachable!("BuddyMemoryAllocator never creates buffers")
        }
    }

    #[test]
    fn scenario_s1_pools_heaps_lifo() {
        let allocate_calls = Rc::new(RefCell::new(0));
        let deallocate_calls = Rc::new(RefCell::new(0));
        let heap_allocator = CountingHeapAllocator {
            next_id: 0,
            allocate_calls: allocate_calls.clone(),
            deallocate_calls: deallocate_calls.clone(),
        };
        let device = FakeDevice::new();

        let mut mgr = BuddyMemoryAllocator::new(256, 128, heap_allocator, device);

        let a = mgr.allocate(128, 1).unwrap();
        assert!(!a.is_invalid());
        assert_eq!(a.offset_in_heap(), 0);
        assert_eq!(*allocate_calls.borrow(), 1);
        assert_eq!(mgr.heap_count(), 1);

        let b = mgr.allocate(128, 1).unwrap();
        assert!(!b.is_invalid());
        assert_eq!(*allocate_calls.borrow(), 2);
        assert_eq!(mgr.heap_count(), 2);

        mgr.deallocate(a);
        assert_eq!(mgr.pool_size(), 1);
        assert_eq!(mgr.heap_count(), 1);

        // Not yet eligible: completed_serial hasn't advanced past the
        // pending serial the pool entry was tagged with.
        mgr.device.advance_completed_to(mgr.device.pending.get());
        let c = mgr.allocate(128, 1).unwrap();
        assert_eq!(*allocate_calls.borrow(), 2);
        assert_eq!(mgr.pool_size(), 0);

        mgr.deallocate(b);
        mgr.deallocate(c);
        mgr.destroy_pool();
        assert_eq!(*deallocate_calls.borrow(), 2);
        assert_eq!(mgr.pool_size(), 0);
    }

    #[test]
    fn scenario_s6_rejects_oversized_and_overflowing_as_invalid() {
        let device = FakeDevice::new();
        let mut mgr = BuddyMemoryAllocator::new(512, 128, CountingHeapAllocator::default(), device);

        let too_big = mgr.allocate(129, 1).unwrap();
        assert!(too_big.is_invalid());

        let overflowing = mgr.allocate(1u64 << 63, 1).unwrap();
        assert!(overflowing.is_invalid());
    }

    #[test]
    fn zero_size_is_invalid_not_error() {
        let device = FakeDevice::new();
        let mut mgr = BuddyMemoryAllocator::new(256, 128, CountingHeapAllocator::default(), device);
        assert!(mgr.allocate(0, 1).unwrap().is_invalid());
    }

    #[test]
    fn two_suballocations_share_one_heap() {
        let device = FakeDevice::new();
        let mut mgr = BuddyMemoryAllocator::new(256, 128, CountingHeapAllocator::default(), device);

        let a = mgr.allocate(64, 1).unwrap();
        let b = mgr.allocate(64, 1).unwrap();
        assert_eq!(mgr.heap_count(), 1);

        mgr.deallocate(a);
        assert_eq!(mgr.heap_count(), 1);
        mgr.deallocate(b);
        assert_eq!(mgr.heap_count(), 0);
    }
}
