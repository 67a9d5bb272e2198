//! Pluggable memory accounting for merge outputs.
//!
//! Buffers are ordinary `Vec`s; a [`MemoryPool`] tracks how many bytes each merge is allowed to
//! hold and rejects growth past its limit. The N-way scheduler bills intermediate tables to a
//! scratch pool and only the final table to the caller's pool.

use crate::error::{MergeError, MergeResult};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub trait MemoryPool: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Account for `bytes` more bytes, failing if the pool cannot provide them.
    fn try_grow(&self, bytes: usize) -> MergeResult<()>;

    /// Return `bytes` previously obtained through [`MemoryPool::try_grow`].
    fn shrink(&self, bytes: usize);

    /// Bytes currently accounted for.
    fn reserved(&self) -> usize;

    /// High-water mark of [`MemoryPool::reserved`].
    fn peak(&self) -> usize;
}

#[derive(Debug, Default)]
struct Usage {
    used: AtomicUsize,
    peak: AtomicUsize,
}

impl Usage {
    fn grow(&self, bytes: usize, limit: usize) -> Result<(), usize> {
        let prev = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|&next| next <= limit)
            })
            .map_err(|used| limit.saturating_sub(used))?;
        self.peak.fetch_max(prev + bytes, Ordering::AcqRel);
        Ok(())
    }

    fn shrink(&self, bytes: usize) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
    }
}

/// Pool without a limit; only tracks usage.
#[derive(Debug)]
pub struct UnboundedMemoryPool {
    name: String,
    usage: Usage,
}

impl UnboundedMemoryPool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            usage: Usage::default(),
        }
    }
}

impl Default for UnboundedMemoryPool {
    fn default() -> Self {
        Self::new("unbounded")
    }
}

impl MemoryPool for UnboundedMemoryPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_grow(&self, bytes: usize) -> MergeResult<()> {
        self.usage
            .grow(bytes, usize::MAX)
            .map_err(|available| MergeError::MemoryLimitExceeded {
                pool: self.name.clone(),
                requested: bytes,
                available,
            })
    }

    fn shrink(&self, bytes: usize) {
        self.usage.shrink(bytes);
    }

    fn reserved(&self) -> usize {
        self.usage.used.load(Ordering::Acquire)
    }

    fn peak(&self) -> usize {
        self.usage.peak.load(Ordering::Acquire)
    }
}

/// Pool with a hard byte limit; the first request that would exceed it fails.
#[derive(Debug)]
pub struct GreedyMemoryPool {
    name: String,
    limit: usize,
    usage: Usage,
}

impl GreedyMemoryPool {
    pub fn new(name: impl Into<String>, limit: usize) -> Self {
        Self {
            name: name.into(),
            limit,
            usage: Usage::default(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl MemoryPool for GreedyMemoryPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_grow(&self, bytes: usize) -> MergeResult<()> {
        self.usage
            .grow(bytes, self.limit)
            .map_err(|available| MergeError::MemoryLimitExceeded {
                pool: self.name.clone(),
                requested: bytes,
                available,
            })
    }

    fn shrink(&self, bytes: usize) {
        self.usage.shrink(bytes);
    }

    fn reserved(&self) -> usize {
        self.usage.used.load(Ordering::Acquire)
    }

    fn peak(&self) -> usize {
        self.usage.peak.load(Ordering::Acquire)
    }
}

/// Bytes held against a pool; returned to the pool on drop.
#[derive(Debug)]
pub struct MemoryReservation {
    pool: Arc<dyn MemoryPool>,
    size: usize,
}

impl MemoryReservation {
    pub fn new(pool: &Arc<dyn MemoryPool>) -> Self {
        Self {
            pool: Arc::clone(pool),
            size: 0,
        }
    }

    pub fn try_grow(&mut self, bytes: usize) -> MergeResult<()> {
        self.pool.try_grow(bytes)?;
        self.size += bytes;
        Ok(())
    }

    /// Grow or shrink to exactly `bytes`.
    pub fn try_resize(&mut self, bytes: usize) -> MergeResult<()> {
        match bytes.cmp(&self.size) {
            std::cmp::Ordering::Greater => self.try_grow(bytes - self.size)?,
            std::cmp::Ordering::Less => {
                self.pool.shrink(self.size - bytes);
                self.size = bytes;
            }
            std::cmp::Ordering::Equal => {}
        }
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn pool_name(&self) -> &str {
        self.pool.name()
    }
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        if self.size > 0 {
            self.pool.shrink(self.size);
        }
    }
}

/// Allocate an empty `Vec` with room for exactly `len` elements, surfacing allocator failure as
/// an error instead of aborting.
pub(crate) fn try_vec_with_capacity<T>(len: usize) -> MergeResult<Vec<T>> {
    let mut out = Vec::new();
    out.try_reserve_exact(len)
        .map_err(|_| MergeError::AllocationFailed {
            bytes: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    Ok(out)
}
