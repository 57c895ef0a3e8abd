//! The three concrete allocation strategies this crate offers, plus the
//! handle type ([`ResourceMemoryAllocation`]) they all return.
//!
//! Picking which one to call is left to the caller: a typical
//! backend routes small, long-lived resources through
//! [`BuddyMemoryAllocator`], large ones through [`DirectAllocator`], and
//! per-frame scratch buffers through [`TempBufferManager`].

pub mod buddy;
pub mod buddy_memory;
pub mod direct;
pub mod resource;
pub mod temp_buffer;

pub use buddy::BuddyAllocator;
pub use buddy_memory::BuddyMemoryAllocator;
pub use direct::DirectAllocator;
pub use resource::ResourceMemoryAllocation;
pub use temp_buffer::{TempBufferConfig, TempBufferManager};
