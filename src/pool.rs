//! MemoryPool - bounded, fallible memory accounting.
//!
//! Every structure the compressor allocates (bit sets, merges, alias lists,
//! scratch tables) takes a [`Lease`] from a shared [`MemoryPool`] before it
//! grows. A bounded pool can be exhausted, which surfaces as
//! [`CompressorError::OutOfMemory`] at the call site and is propagated up to
//! the orchestrator. Leases are released when dropped.
//!
//! # Examples
//!
//! ```
//! use routing_compressor::MemoryPool;
//!
//! let pool = MemoryPool::bounded(128);
//! let lease = pool.lease(100).unwrap();
//! assert_eq!(pool.in_use(), 100);
//! assert!(pool.lease(64).is_err());
//!
//! drop(lease);
//! assert_eq!(pool.in_use(), 0);
//! ```

use crate::error::{CompressorError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared memory budget.
#[derive(Debug)]
pub struct MemoryPool {
    limit: Option<usize>,
    used: AtomicUsize,
    peak: AtomicUsize,
}

impl MemoryPool {
    /// Pool without a limit. Leases only fail if the global allocator does.
    pub fn unbounded() -> Arc<Self> {
        Arc::new(Self {
            limit: None,
            used: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    /// Pool holding at most `bytes` bytes of leases at once.
    pub fn bounded(bytes: usize) -> Arc<Self> {
        Arc::new(Self {
            limit: Some(bytes),
            used: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    /// Pool from an optional limit.
    pub fn with_limit(limit: Option<usize>) -> Arc<Self> {
        match limit {
            Some(bytes) => Self::bounded(bytes),
            None => Self::unbounded(),
        }
    }

    /// Claim `bytes` from the pool.
    pub fn lease(self: &Arc<Self>, bytes: usize) -> Result<Lease> {
        self.claim(bytes)?;
        Ok(Lease {
            pool: Arc::clone(self),
            bytes,
        })
    }

    /// Bytes currently leased.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// High-water mark of leased bytes.
    #[inline]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    /// Bytes still available, `None` for an unbounded pool.
    pub fn available(&self) -> Option<usize> {
        self.limit.map(|l| l.saturating_sub(self.in_use()))
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    fn claim(&self, bytes: usize) -> Result<()> {
        let limit = self.limit;
        let claimed = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                let next = used.checked_add(bytes)?;
                match limit {
                    Some(l) if next > l => None,
                    _ => Some(next),
                }
            });

        match claimed {
            Ok(prev) => {
                self.peak.fetch_max(prev + bytes, Ordering::AcqRel);
                Ok(())
            }
            Err(used) => Err(CompressorError::OutOfMemory {
                requested: bytes,
                available: limit.map_or(0, |l| l.saturating_sub(used)),
            }),
        }
    }

    fn release(&self, bytes: usize) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// RAII claim on a [`MemoryPool`].
#[derive(Debug)]
pub struct Lease {
    pool: Arc<MemoryPool>,
    bytes: usize,
}

impl Lease {
    /// Bytes held by this lease.
    #[inline]
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Extend the lease by `extra` bytes.
    pub fn grow(&mut self, extra: usize) -> Result<()> {
        self.pool.claim(extra)?;
        self.bytes += extra;
        Ok(())
    }

    /// Take over the bytes held by `other`.
    ///
    /// Both leases must come from the same pool.
    pub fn absorb(&mut self, mut other: Lease) {
        debug_assert!(Arc::ptr_eq(&self.pool, &other.pool));
        self.bytes += other.bytes;
        other.bytes = 0;
    }

    pub fn pool(&self) -> &Arc<MemoryPool> {
        &self.pool
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.bytes > 0 {
            self.pool.release(self.bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_never_fails() {
        let pool = MemoryPool::unbounded();
        let _a = pool.lease(1 << 30).unwrap();
        let _b = pool.lease(1 << 30).unwrap();
        assert_eq!(pool.available(), None);
        assert_eq!(pool.in_use(), 2 << 30);
    }

    #[test]
    fn test_bounded_exhaustion() {
        let pool = MemoryPool::bounded(100);
        let _a = pool.lease(60).unwrap();
        match pool.lease(50) {
            Err(CompressorError::OutOfMemory {
                requested,
                available,
            }) => {
                assert_eq!(requested, 50);
                assert_eq!(available, 40);
            }
            other => panic!("expected OutOfMemory, got {:?}", other),
        }
        assert_eq!(pool.in_use(), 60);
    }

    #[test]
    fn test_grow_and_release() {
        let pool = MemoryPool::bounded(100);
        let mut lease = pool.lease(10).unwrap();
        lease.grow(80).unwrap();
        assert_eq!(lease.bytes(), 90);
        assert!(lease.grow(20).is_err());
        assert_eq!(lease.bytes(), 90);

        drop(lease);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.peak(), 90);
    }

    #[test]
    fn test_absorb() {
        let pool = MemoryPool::bounded(100);
        let mut a = pool.lease(30).unwrap();
        let b = pool.lease(20).unwrap();
        a.absorb(b);
        assert_eq!(a.bytes(), 50);
        assert_eq!(pool.in_use(), 50);

        drop(a);
        assert_eq!(pool.in_use(), 0);
    }
}
