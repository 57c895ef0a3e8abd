//! Collaborator interfaces this crate consumes but does not implement.
//!
//! Everything here is external to this crate's own logic: a backend driver
//! (D3D12, Vulkan, ...) supplies concrete implementations of [`Device`] and
//! [`DeviceHeapAllocator`]. This crate only depends on the traits.

mod device;
mod heap;

pub use device::{Buffer, BufferDescriptor, Device};
pub use heap::{DeviceHeap, DeviceHeapAllocator};
