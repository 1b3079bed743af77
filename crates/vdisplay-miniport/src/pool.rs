//! Tagged pool allocation seam.
//!
//! The adapter never allocates its long-lived state blocks directly; it asks a [`PoolAllocator`]
//! the way a kernel driver asks for tagged non-paged pool. Every block is represented by a
//! [`PoolAllocation`] token that returns the memory on `release` (reporting failures) or, as a
//! last resort, on drop.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

/// Four-character pool tag, stored in the same byte order a multi-character literal has.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct PoolTag(u32);

impl PoolTag {
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }

    pub fn as_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Debug for PoolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoolTag({self})")
    }
}

impl fmt::Display for PoolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.as_bytes() {
            let c = if b.is_ascii_graphic() { b as char } else { '.' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// Adapter context block.
pub const CONTEXT_TAG: PoolTag = PoolTag::from_bytes(*b"VDis");
/// Per-source state allocated at start.
pub const SOURCE_TAG: PoolTag = PoolTag::from_bytes(*b"VDsr");

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool exhausted allocating {bytes} bytes with tag {tag}")]
    Exhausted { tag: PoolTag, bytes: usize },

    #[error("free of {bytes} bytes with tag {tag} failed")]
    FreeFailed { tag: PoolTag, bytes: usize },
}

pub trait PoolAllocator: Send + Sync {
    fn allocate(&self, tag: PoolTag, bytes: usize) -> Result<(), PoolError>;

    /// Return a block. On error the block is still considered gone; callers only report it.
    fn free(&self, tag: PoolTag, bytes: usize) -> Result<(), PoolError>;
}

/// Owned handle to one pool block.
pub struct PoolAllocation {
    pool: Arc<dyn PoolAllocator>,
    tag: PoolTag,
    bytes: usize,
    live: bool,
}

impl PoolAllocation {
    pub fn new(pool: &Arc<dyn PoolAllocator>, tag: PoolTag, bytes: usize) -> Result<Self, PoolError> {
        pool.allocate(tag, bytes)?;
        Ok(Self {
            pool: Arc::clone(pool),
            tag,
            bytes,
            live: true,
        })
    }

    pub fn tag(&self) -> PoolTag {
        self.tag
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn release(mut self) -> Result<(), PoolError> {
        self.live = false;
        self.pool.free(self.tag, self.bytes)
    }
}

impl Drop for PoolAllocation {
    fn drop(&mut self) {
        if self.live {
            // Nobody is left to report to.
            let _ = self.pool.free(self.tag, self.bytes);
        }
    }
}

impl fmt::Debug for PoolAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAllocation")
            .field("tag", &self.tag)
            .field("bytes", &self.bytes)
            .finish()
    }
}

/// Allocator that always succeeds and keeps no books.
#[derive(Debug, Default)]
pub struct SystemPool;

impl PoolAllocator for SystemPool {
    fn allocate(&self, _tag: PoolTag, _bytes: usize) -> Result<(), PoolError> {
        Ok(())
    }

    fn free(&self, _tag: PoolTag, _bytes: usize) -> Result<(), PoolError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TrackingState {
    outstanding: HashMap<PoolTag, (usize, usize)>,
    total_allocations: u64,
    fail_allocations: usize,
    fail_skip: usize,
    fail_tag: Option<PoolTag>,
    fail_frees: bool,
}

/// Allocator that counts outstanding blocks per tag and can inject failures.
#[derive(Debug, Default)]
pub struct TrackingPool {
    state: Mutex<TrackingState>,
}

impl TrackingPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of blocks allocated and not yet freed, across all tags.
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding.values().map(|(count, _)| count).sum()
    }

    pub fn outstanding_bytes(&self) -> usize {
        self.lock().outstanding.values().map(|(_, bytes)| bytes).sum()
    }

    pub fn outstanding_for(&self, tag: PoolTag) -> usize {
        self.lock().outstanding.get(&tag).map_or(0, |(count, _)| *count)
    }

    pub fn total_allocations(&self) -> u64 {
        self.lock().total_allocations
    }

    /// Fail the next `count` allocations of any tag.
    pub fn fail_next_allocations(&self, count: usize) {
        let mut state = self.lock();
        state.fail_allocations = count;
        state.fail_skip = 0;
        state.fail_tag = None;
    }

    /// Fail the next `count` allocations carrying `tag`; other tags are unaffected.
    pub fn fail_next_allocations_of(&self, tag: PoolTag, count: usize) {
        let mut state = self.lock();
        state.fail_allocations = count;
        state.fail_skip = 0;
        state.fail_tag = Some(tag);
    }

    /// Fail only the `nth` (1-based) upcoming allocation carrying `tag`.
    pub fn fail_nth_allocation_of(&self, tag: PoolTag, nth: usize) {
        let mut state = self.lock();
        state.fail_allocations = 1;
        state.fail_skip = nth.saturating_sub(1);
        state.fail_tag = Some(tag);
    }

    /// Make every subsequent free report failure (the block is still released).
    pub fn set_fail_frees(&self, fail: bool) {
        self.lock().fail_frees = fail;
    }
}

impl PoolAllocator for TrackingPool {
    fn allocate(&self, tag: PoolTag, bytes: usize) -> Result<(), PoolError> {
        let mut state = self.lock();
        let targeted = state.fail_tag.map_or(true, |t| t == tag);
        if targeted && state.fail_allocations > 0 {
            if state.fail_skip > 0 {
                state.fail_skip -= 1;
            } else {
                state.fail_allocations -= 1;
                return Err(PoolError::Exhausted { tag, bytes });
            }
        }
        let entry = state.outstanding.entry(tag).or_default();
        entry.0 += 1;
        entry.1 += bytes;
        state.total_allocations += 1;
        Ok(())
    }

    fn free(&self, tag: PoolTag, bytes: usize) -> Result<(), PoolError> {
        let mut state = self.lock();
        if let Some(entry) = state.outstanding.get_mut(&tag) {
            entry.0 = entry.0.saturating_sub(1);
            entry.1 = entry.1.saturating_sub(bytes);
            if entry.0 == 0 {
                state.outstanding.remove(&tag);
            }
        }
        if state.fail_frees {
            return Err(PoolError::FreeFailed { tag, bytes });
        }
        Ok(())
    }
}
