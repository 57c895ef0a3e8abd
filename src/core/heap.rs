use ash::vk;

use crate::error::Error;

/// An opaque, owned handle to one underlying device memory heap.
///
/// A `DeviceHeap` is never split: it is always used in its entirety as the
/// backing store for one or more buddy blocks (via [`BuddyMemoryAllocator`](crate::allocator::buddy_memory::BuddyMemoryAllocator))
/// or for a single direct allocation (via [`DirectAllocator`](crate::allocator::direct::DirectAllocator)).
/// Ownership moves between a [`DeviceHeapAllocator`], a heap tracker slot, a
/// recycle pool entry, and an in-flight allocation chain — there is always
/// exactly one owner at a time, so this type is intentionally not `Clone`.
#[derive(Debug)]
pub struct DeviceHeap {
    id: u64,
    size: vk::DeviceSize,
}

impl DeviceHeap {
    /// Construct a heap handle. Only meant to be called by implementations
    /// of [`DeviceHeapAllocator`]; the subsystem itself never fabricates one.
    pub fn new(id: u64, size: vk::DeviceSize) -> Self {
        Self { id, size }
    }

    /// Backend-defined identifier for this heap (e.g. a `VkDeviceMemory`
    /// handle bitcast to `u64`).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The fixed byte size this heap was created with.
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

/// Creates and destroys the underlying [`DeviceHeap`]s this subsystem pools.
/// Implemented by the backend-specific heap driver; out of scope for this
/// crate beyond this interface.
pub trait DeviceHeapAllocator {
    /// Allocate a new heap of exactly `size` bytes.
    fn allocate_heap(&mut self, size: vk::DeviceSize) -> Result<DeviceHeap, Error>;

    /// Destroy a heap. May be asynchronous internally on the backend side;
    /// from this subsystem's point of view the call is final — the heap must
    /// not be used again after this returns.
    fn deallocate_heap(&mut self, heap: DeviceHeap) -> Result<(), Error>;
}
