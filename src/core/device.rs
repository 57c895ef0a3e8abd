use ash::vk;

use crate::error::Error;
use crate::ExecutionSerial;

/// Description of a buffer to create, passed to [`Device::create_buffer`].
/// Analogous to `wgpu::BufferDescriptor`; resource-state tracking and
/// barrier emission are out of scope here.
#[derive(Debug, Clone, Copy)]
pub struct BufferDescriptor {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

/// A lightweight, copyable reference to a GPU buffer.
///
/// Unlike [`DeviceHeap`](crate::heap::DeviceHeap), a `Buffer` is not a unique
/// owner of GPU state at this layer: [`TempBufferManager`](crate::allocator::temp_buffer::TempBufferManager)
/// retains the bookkeeping copy in its in-flight/free-list queues for the
/// buffer's entire lifetime, and what callers receive from `allocate` is a
/// second, cheap copy they use to record GPU commands against (the same
/// relationship `phobos-rs` has between an owning `Buffer` and a `BufferView`).
/// Actual resource destruction is a backend concern outside this subsystem's
/// interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Buffer {
    id: u64,
    size: vk::DeviceSize,
}

impl Buffer {
    pub fn new(id: u64, size: vk::DeviceSize) -> Self {
        Self { id, size }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

/// The device object that advances the completed submission serial and
/// issues submissions. Out of scope beyond this interface: the allocator
/// never mutates the serials it reads here.
pub trait Device {
    /// The serial of the next submission to be issued.
    fn pending_submission_serial(&self) -> ExecutionSerial;

    /// The highest serial known to have completed on the GPU.
    fn completed_serial(&self) -> ExecutionSerial;

    /// Create a buffer with the given description. Used only by
    /// [`TempBufferManager`](crate::allocator::temp_buffer::TempBufferManager).
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> Result<Buffer, Error>;
}
