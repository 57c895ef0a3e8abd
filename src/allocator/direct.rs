//! Allocates one whole [`DeviceHeap`] per request, for allocations too large
//! to be worth suballocating.
//!
//! Grounded on `dawn_native::DirectResourceMemoryAllocator` (`Allocator.cpp`):
//! no suballocation bookkeeping at all, just a pass-through to the backend's
//! heap allocator. The one piece of state this crate adds beyond the
//! original is deferred reclaim — a deallocated heap is not returned to the
//! backend until the GPU has finished the work that used it, tracked the
//! same way [`BuddyMemoryAllocator`](crate::allocator::buddy_memory::BuddyMemoryAllocator)'s
//! recycle pool would, but FIFO-by-serial rather than LIFO-by-recency since
//! there is no reuse benefit for heaps this large.

use ash::vk;
use derivative::Derivative;
use log::trace;

use crate::allocator::resource::ResourceMemoryAllocation;
use crate::core::{DeviceHeap, DeviceHeapAllocator};
use crate::error::Result;
use crate::serial_queue::SerialQueue;
use crate::ExecutionSerial;

/// Allocates a dedicated heap per request and releases it back to the
/// backend once the GPU has finished using it.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DirectAllocator<H> {
    #[derivative(Debug = "ignore")]
    heap_allocator: H,
    pending: SerialQueue<DeviceHeap>,
}

impl<H: DeviceHeapAllocator> DirectAllocator<H> {
    pub fn new(heap_allocator: H) -> Self {
        Self {
            heap_allocator,
            pending: SerialQueue::new(),
        }
    }

    /// Allocate a dedicated heap of exactly `size` bytes.
    ///
    /// Returns both the lightweight allocation handle and the owned
    /// [`DeviceHeap`] itself: unlike [`BuddyMemoryAllocator`](crate::allocator::buddy_memory::BuddyMemoryAllocator),
    /// this allocator keeps no heap table (one allocation uses exactly one
    /// heap, for its entire lifetime), so the caller is the sole owner and
    /// must hand the heap back in to [`Self::deallocate`].
    pub fn allocate(&mut self, size: vk::DeviceSize) -> Result<(ResourceMemoryAllocation, DeviceHeap)> {
        let heap = self.heap_allocator.allocate_heap(size)?;
        let allocation = ResourceMemoryAllocation::direct(heap.id());
        Ok((allocation, heap))
    }

    /// Queue the allocation's heap for release once `pending_serial` (the
    /// GPU submission this allocation was last used in) has completed.
    ///
    /// Because a `DeviceHeap` is not `Clone` and this crate never reaches
    /// into the backend to reconstruct one from just an id, this method
    /// takes the live heap directly rather than resolving it from the
    /// allocation's id — callers that made a direct allocation are expected
    /// to be holding the heap themselves.
    pub fn deallocate(&mut self, mut allocation: ResourceMemoryAllocation, heap: DeviceHeap, pending_serial: ExecutionSerial) {
        debug_assert_eq!(
            allocation.heap_id(),
            Some(heap.id()),
            "DirectAllocator::deallocate called with a heap that doesn't match its allocation"
        );
        self.pending.enqueue(heap, pending_serial);
        allocation.mark_consumed();
    }

    /// Advance the completed serial, returning every heap whose last use has
    /// now finished to the backend.
    ///
    /// # Panics
    /// Panics if the backend fails to deallocate a heap. `tick` cannot fail
    /// at the API level — there is no caller-recoverable path for a backend
    /// that refuses to free memory it has already told us is done with —
    /// so such a failure aborts rather than propagating as an `Err`.
    pub fn tick(&mut self, completed_serial: ExecutionSerial) {
        for heap in self.pending.drain_up_to(completed_serial) {
            trace!("releasing direct heap {} past its pending serial", heap.id());
            self.heap_allocator
                .deallocate_heap(heap)
                .expect("tick: backend failed to deallocate a heap");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeHeapAllocator {
        next_id: u64,
        destroyed: Vec<u64>,
    }

    impl DeviceHeapAllocator for FakeHeapAllocator {
        fn allocate_heap(&mut self, size: vk::DeviceSize) -> Result<DeviceHeap> {
            self.next_id += 1;
            Ok(DeviceHeap::new(self.next_id, size))
        }

        fn deallocate_heap(&mut self, heap: DeviceHeap) -> Result<()> {
            self.destroyed.push(heap.id());
            Ok(())
        }
    }

    #[test]
    fn allocate_then_deallocate_defers_until_completed() {
        let mut allocator = DirectAllocator::new(FakeHeapAllocator::default());
        let (alloc, heap) = allocator.allocate(4096).unwrap();
        let heap_id = heap.id();

        allocator.deallocate(alloc, heap, 5);
        allocator.tick(4);
        assert!(allocator.heap_allocator.destroyed.is_empty());

        allocator.tick(5);
        assert_eq!(allocator.heap_allocator.destroyed, vec![heap_id]);
    }
}
