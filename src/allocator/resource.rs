//! The handle returned by every allocator in this crate.
//!
//! `dawn_native::ResourceMemoryAllocation` stores a `AllocationMethod` enum
//! tag alongside an offset and a raw `ResourceHeapBase*`; an allocation made
//! by `DirectResourceMemoryAllocator` leaves the offset at zero and borrows
//! the heap outright, while one made through `BuddyResourceMemoryAllocator`
//! additionally carries the offset within the heap and the buddy block's
//! offset in the allocator's virtual address space (`Allocator.cpp`,
//! `BuddyMemoryAllocator.cpp`). The three-variant enum below is the same
//! state machine with the invalid case made unrepresentable except as its
//! own explicit variant, and the heap reference resolved through a stable
//! index rather than a borrow — a live borrow of a heap stored in the
//! owning allocator's own table would outlive the `&mut self` calls that
//! table needs.

use ash::vk;

/// A single GPU memory suballocation handed back by one of this crate's
/// allocators.
///
/// Must be passed to the allocator that produced it (via its `deallocate`
/// method) exactly once. In debug builds, dropping a still-outstanding
/// allocation without deallocating it first is treated as a leak and panics.
#[derive(Debug)]
pub struct ResourceMemoryAllocation {
    method: AllocationMethod,
    consumed: bool,
}

#[derive(Debug, Clone, Copy)]
enum AllocationMethod {
    /// Never allocated — only constructible via [`ResourceMemoryAllocation::invalid`],
    /// used by callers as a default/placeholder before an allocation attempt.
    Invalid,
    /// One entire heap allocated directly through a [`DeviceHeapAllocator`](crate::core::DeviceHeapAllocator),
    /// produced by [`DirectAllocator`](crate::allocator::direct::DirectAllocator).
    Direct { heap_id: u64 },
    /// A suballocated block inside a pooled heap, produced by
    /// [`BuddyMemoryAllocator`](crate::allocator::buddy_memory::BuddyMemoryAllocator).
    SubAllocated {
        heap_index: usize,
        block_offset: u64,
        memory_offset: vk::DeviceSize,
        size: vk::DeviceSize,
    },
}

impl ResourceMemoryAllocation {
    /// An allocation representing no memory at all. Useful as a field
    /// default before an allocator call succeeds.
    pub fn invalid() -> Self {
        Self {
            method: AllocationMethod::Invalid,
            consumed: true,
        }
    }

    pub(crate) fn direct(heap_id: u64) -> Self {
        Self {
            method: AllocationMethod::Direct { heap_id },
            consumed: false,
        }
    }

    pub(crate) fn sub_allocated(
        heap_index: usize,
        block_offset: u64,
        memory_offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> Self {
        Self {
            method: AllocationMethod::SubAllocated {
                heap_index,
                block_offset,
                memory_offset,
                size,
            },
            consumed: false,
        }
    }

    /// True if this allocation holds no live memory (either never allocated,
    /// or already deallocated).
    pub fn is_invalid(&self) -> bool {
        matches!(self.method, AllocationMethod::Invalid)
    }

    /// The byte offset into the owning heap's memory that this allocation's
    /// data starts at. Zero for [`AllocationMethod::Direct`].
    pub fn offset_in_heap(&self) -> vk::DeviceSize {
        match self.method {
            AllocationMethod::Invalid => 0,
            AllocationMethod::Direct { .. } => 0,
            AllocationMethod::SubAllocated { memory_offset, .. } => memory_offset,
        }
    }

    /// Index into the owning allocator's internal heap table, used by
    /// [`BuddyMemoryAllocator`](crate::allocator::buddy_memory::BuddyMemoryAllocator)
    /// to resolve this allocation back to a live [`DeviceHeap`](crate::core::DeviceHeap)
    /// without holding a borrow across the allocation's lifetime.
    pub(crate) fn heap_index(&self) -> Option<usize> {
        match self.method {
            AllocationMethod::SubAllocated { heap_index, .. } => Some(heap_index),
            _ => None,
        }
    }

    pub(crate) fn heap_id(&self) -> Option<u64> {
        match self.method {
            AllocationMethod::Direct { heap_id } => Some(heap_id),
            _ => None,
        }
    }

    pub(crate) fn block_offset(&self) -> Option<u64> {
        match self.method {
            AllocationMethod::SubAllocated { block_offset, .. } => Some(block_offset),
            _ => None,
        }
    }

    /// Called by the owning allocator's `deallocate` once it has reclaimed
    /// the underlying memory, so [`Drop`] no longer treats this as a leak.
    pub(crate) fn mark_consumed(&mut self) {
        self.consumed = true;
    }
}

impl Drop for ResourceMemoryAllocation {
    fn drop(&mut self) {
        if cfg!(debug_assertions) && !self.consumed {
            panic!(
                "leak: ResourceMemoryAllocation dropped without being deallocated (method: {:?})",
                self.method
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_allocation_is_invalid_and_does_not_leak() {
        let a = ResourceMemoryAllocation::invalid();
        assert!(a.is_invalid());
        assert_eq!(a.offset_in_heap(), 0);
    }

    #[test]
    fn direct_allocation_reports_zero_offset() {
        let mut a = ResourceMemoryAllocation::direct(7);
        assert!(!a.is_invalid());
        assert_eq!(a.offset_in_heap(), 0);
        assert_eq!(a.heap_id(), Some(7));
        a.mark_consumed();
    }

    #[test]
    fn sub_allocated_reports_fields() {
        let mut a = ResourceMemoryAllocation::sub_allocated(2, 128, 128, 64);
        assert_eq!(a.heap_index(), Some(2));
        assert_eq!(a.block_offset(), Some(128));
        assert_eq!(a.offset_in_heap(), 128);
        a.mark_consumed();
    }

    #[test]
    #[should_panic(expected = "leak")]
    fn dropping_unconsumed_allocation_panics_in_debug() {
        let _a = ResourceMemoryAllocation::direct(1);
    }
}
