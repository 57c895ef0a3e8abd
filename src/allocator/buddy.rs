//! A binary buddy allocator over a single power-of-two virtual address range.
//!
//! Tracks no memory itself — it only hands out aligned `(size, offset)`
//! pairs, the way `dawn_native::BuddyAllocator` does (see
//! `original_source/src/dawn_native/Allocator.cpp`). The reference source
//! models free/split/allocated blocks as a tree of raw pointers; here they
//! live in an arena instead — a `Vec` addressed by 32-bit indices, with the
//! buddy relationship derived from `parent`/`Split { left, right }` rather
//! than stored.

use std::fmt;

/// Index of a [`Block`] inside a [`BuddyAllocator`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockIndex(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockState {
    Free {
        prev: Option<BlockIndex>,
        next: Option<BlockIndex>,
    },
    Split {
        left: BlockIndex,
        right: BlockIndex,
    },
    Allocated,
}

#[derive(Debug)]
struct Block {
    size: u64,
    offset: u64,
    parent: Option<BlockIndex>,
    state: BlockState,
}

/// Offset-returning binary buddy allocator over `[0, max_size)`.
///
/// `max_size` must be a power of two in `1..=2^63`. Levels are numbered from
/// the root (level 0, size `max_size`) down to the smallest block size the
/// allocator will ever hand out; level `L` holds blocks of size
/// `max_size >> L`.
pub struct BuddyAllocator {
    max_size: u64,
    blocks: Vec<Option<Block>>,
    free_slots: Vec<BlockIndex>,
    free_lists: Vec<Option<BlockIndex>>,
    root: BlockIndex,
}

impl fmt::Debug for BuddyAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuddyAllocator")
            .field("max_size", &self.max_size)
            .field("free_block_count", &self.free_block_count())
            .finish()
    }
}

impl BuddyAllocator {
    /// Create a new allocator over `[0, max_size)`.
    ///
    /// # Panics
    /// Panics if `max_size` is not a power of two, or is zero.
    pub fn new(max_size: u64) -> Self {
        assert!(
            max_size.is_power_of_two(),
            "BuddyAllocator::new: max_size must be a power of two, got {max_size}"
        );

        let level_count = max_size.trailing_zeros() as usize + 1;
        let mut blocks = Vec::with_capacity(level_count);
        blocks.push(Some(Block {
            size: max_size,
            offset: 0,
            parent: None,
            state: BlockState::Free {
                prev: None,
                next: None,
            },
        }));

        let mut free_lists = vec![None; level_count];
        free_lists[0] = Some(BlockIndex(0));

        Self {
            max_size,
            blocks,
            free_slots: Vec::new(),
            free_lists,
            root: BlockIndex(0),
        }
    }

    /// The upper bound of the address range this allocator manages.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Number of currently free leaf blocks. Diagnostic only.
    pub fn free_block_count(&self) -> usize {
        self.count_free(self.root)
    }

    fn count_free(&self, idx: BlockIndex) -> usize {
        match self.block(idx).state {
            BlockState::Free { .. } => 1,
            BlockState::Allocated => 0,
            BlockState::Split { left, right } => self.count_free(left) + self.count_free(right),
        }
    }

    fn block(&self, idx: BlockIndex) -> &Block {
        self.blocks[idx.0 as usize].as_ref().expect("dangling BlockIndex")
    }

    fn block_mut(&mut self, idx: BlockIndex) -> &mut Block {
        self.blocks[idx.0 as usize].as_mut().expect("dangling BlockIndex")
    }

    fn new_block(&mut self, size: u64, offset: u64, parent: Option<BlockIndex>, state: BlockState) -> BlockIndex {
        let block = Some(Block {
            size,
            offset,
            parent,
            state,
        });
        if let Some(idx) = self.free_slots.pop() {
            self.blocks[idx.0 as usize] = block;
            idx
        } else {
            self.blocks.push(block);
            BlockIndex(self.blocks.len() as u32 - 1)
        }
    }

    fn delete_block(&mut self, idx: BlockIndex) {
        self.blocks[idx.0 as usize] = None;
        self.free_slots.push(idx);
    }

    fn level_of(&self, size: u64) -> usize {
        (self.max_size.trailing_zeros() - size.trailing_zeros()) as usize
    }

    /// Find the smallest level at or above `target_level` (i.e. searching
    /// from `target_level` up toward the root) that has a free block.
    fn next_free_level(&self, target_level: usize) -> Option<usize> {
        for level in (0..=target_level).rev() {
            if self.free_lists[level].is_some() {
                return Some(level);
            }
        }
        None
    }

    fn insert_free(&mut self, idx: BlockIndex, level: usize) {
        let old_head = self.free_lists[level];
        if let Some(head) = old_head {
            self.block_mut(head).state = match self.block(head).state {
                BlockState::Free { next, .. } => BlockState::Free {
                    prev: Some(idx),
                    next,
                },
                _ => unreachable!("free-list head must be Free"),
            };
        }
        self.block_mut(idx).state = BlockState::Free {
            prev: None,
            next: old_head,
        };
        self.free_lists[level] = Some(idx);
    }

    fn remove_free(&mut self, idx: BlockIndex, level: usize) {
        let (prev, next) = match self.block(idx).state {
            BlockState::Free { prev, next } => (prev, next),
            _ => unreachable!("remove_free called on a non-Free block"),
        };
        match prev {
            Some(prev) => {
                self.block_mut(prev).state = match self.block(prev).state {
                    BlockState::Free { prev: pp, .. } => BlockState::Free { prev: pp, next },
                    _ => unreachable!(),
                };
            }
            None => self.free_lists[level] = next,
        }
        if let Some(next) = next {
            self.block_mut(next).state = match self.block(next).state {
                BlockState::Free { next: nn, .. } => BlockState::Free { prev, next: nn },
                _ => unreachable!(),
            };
        }
    }

    /// Round `size` up to a power of two, promoting to `alignment` if the
    /// alignment requirement is larger, and allocate a free block of the
    /// resulting size. Returns the block's offset, always a multiple of its
    /// (and therefore the requested) alignment.
    ///
    /// Returns `None` if `size` is zero, exceeds `max_size` once rounded, or
    /// the allocator has no free block large enough.
    pub fn allocate(&mut self, size: u64, alignment: u64) -> Option<u64> {
        if size == 0 {
            return None;
        }
        let rounded = size.checked_next_power_of_two()?;
        let rounded = if alignment > rounded {
            alignment.checked_next_power_of_two()?
        } else {
            rounded
        };
        if rounded > self.max_size {
            return None;
        }

        let target_level = self.level_of(rounded);
        let mut current_level = self.next_free_level(target_level)?;
        let mut current = self.free_lists[current_level].expect("next_free_level returned an empty level");

        while current_level < target_level {
            self.remove_free(current, current_level);

            let half = self.block(current).size / 2;
            let offset = self.block(current).offset;
            let left = self.new_block(
                half,
                offset,
                Some(current),
                BlockState::Free {
                    prev: None,
                    next: None,
                },
            );
            let right = self.new_block(
                half,
                offset + half,
                Some(current),
                BlockState::Free {
                    prev: None,
                    next: None,
                },
            );

            // Order matters: right first so left ends up at the free-list head.
            self.insert_free(right, current_level + 1);
            self.insert_free(left, current_level + 1);

            self.block_mut(current).state = BlockState::Split { left, right };

            current_level += 1;
            current = self.free_lists[current_level].expect("just inserted a block at this level");
        }

        self.remove_free(current, current_level);
        self.block_mut(current).state = BlockState::Allocated;
        Some(self.block(current).offset)
    }

    /// Return a block previously returned by [`Self::allocate`] to the
    /// allocator, merging it with its buddy (and recursively with ancestors)
    /// whenever both are free.
    ///
    /// # Panics
    /// Panics in debug builds if `offset` does not correspond to a
    /// currently allocated block. Deallocating an invalid offset is a
    /// caller bug; in release builds this is unspecified behavior rather
    /// than a guaranteed panic, matching every other invariant check in
    /// this crate.
    pub fn deallocate(&mut self, offset: u64) {
        let mut current = self.root;
        let mut level = 0usize;

        loop {
            match self.block(current).state {
                BlockState::Split { left, right } => {
                    current = if offset < self.block(right).offset { left } else { right };
                    level += 1;
                }
                _ => break,
            }
        }

        debug_assert_eq!(
            self.block(current).state,
            BlockState::Allocated,
            "BuddyAllocator::deallocate: offset {offset} is not an outstanding allocation"
        );

        self.block_mut(current).state = BlockState::Free {
            prev: None,
            next: None,
        };

        while level > 0 {
            let parent = self.block(current).parent.expect("non-root block must have a parent");
            let (left, right) = match self.block(parent).state {
                BlockState::Split { left, right } => (left, right),
                _ => unreachable!("parent of a merge candidate must be Split"),
            };
            let buddy = if current == left { right } else { left };

            let buddy_is_free = matches!(self.block(buddy).state, BlockState::Free { .. });
            if !buddy_is_free {
                break;
            }

            self.remove_free(buddy, level);
            self.delete_block(buddy);
            self.delete_block(current);

            self.block_mut(parent).state = BlockState::Free {
                prev: None,
                next: None,
            };

            current = parent;
            level -= 1;
        }

        self.insert_free(current, level);
    }
}

impl PartialEq<BlockIndex> for BlockIndex {
    fn eq(&self, other: &BlockIndex) -> bool {
        self.0 == other.0
    }
}
