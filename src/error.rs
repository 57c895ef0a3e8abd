//! Error taxonomy for the suballocation subsystem.

use thiserror::Error;

/// Errors produced by the allocators in this crate.
///
/// `HeapExhausted` is the only variant expected to come from outside the
/// crate (the backend-specific [`DeviceHeapAllocator`](crate::heap::DeviceHeapAllocator)
/// refusing a request). The others are raised by this crate itself, either
/// as an ordinary `Err` return or, for `Internal`, as a `panic!` gated on
/// `cfg!(debug_assertions)`.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend-specific heap allocator could not satisfy a request.
    #[error("device heap allocator could not satisfy a request for {size} bytes")]
    HeapExhausted {
        /// Size of the heap that was requested.
        size: u64,
    },
    /// The requested size exceeds the allocator's maximum unit (e.g. the
    /// block size of a `BuddyMemoryAllocator`, or the address range of a
    /// `BuddyAllocator`).
    #[error("requested size {size} exceeds the allocator's maximum unit of {max}")]
    SizeTooLarge {
        /// The size that was requested.
        size: u64,
        /// The largest size the allocator can satisfy.
        max: u64,
    },
    /// A zero-sized request, or a configuration value that was required to
    /// be a power of two but was not.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// An internal invariant was violated. Only raised in debug builds; the
    /// contract is otherwise unspecified behavior in release, per design.
    #[error("internal invariant violated: {0}")]
    Internal(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
