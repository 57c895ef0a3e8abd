//! GPU memory suballocation: a binary buddy allocator plus a pooled heap
//! manager built on top of it, modeled on the allocator layer inside
//! Google's Dawn WebGPU implementation.
//!
//! This crate owns no device or memory itself. It consumes two traits,
//! [`core::Device`] and [`core::DeviceHeapAllocator`], that a backend (a
//! Vulkan, D3D12, or Metal driver) implements, and in return hands back
//! [`allocator::ResourceMemoryAllocation`] handles that track where a
//! suballocation lives without ever touching the memory itself.
//!
//! ```text
//!                 DeviceHeapAllocator (backend)
//!                          ^
//!                          |
//!   BuddyAllocator  <--  BuddyMemoryAllocator  <--  callers
//!   (virtual address      (pools real heaps)
//!    space bookkeeping)
//!
//!   DirectAllocator  (one heap per request, large allocations)
//!
//!   TempBufferManager  (pow2-bucketed transient buffers, own lifecycle)
//! ```

pub mod allocator;
pub mod core;
pub mod error;
pub mod serial_queue;

pub use error::{Error, Result};
pub use serial_queue::SerialQueue;

/// A strictly increasing counter identifying one GPU submission.
///
/// Every deferred-reclaim mechanism in this crate ([`allocator::direct::DirectAllocator`],
/// [`allocator::temp_buffer::TempBufferManager`]) is keyed on this type
/// rather than on a timestamp or generation counter, matching
/// `dawn_native::ExecutionSerial`.
pub type ExecutionSerial = u64;

pub mod prelude {
    //! Re-exports of the types most call sites need.
    pub use crate::allocator::{BuddyAllocator, BuddyMemoryAllocator, DirectAllocator, ResourceMemoryAllocation, TempBufferConfig, TempBufferManager};
    pub use crate::core::{Buffer, BufferDescriptor, Device, DeviceHeap, DeviceHeapAllocator};
    pub use crate::error::{Error, Result};
    pub use crate::serial_queue::SerialQueue;
    pub use crate::ExecutionSerial;
}
