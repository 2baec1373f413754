//! BitSet - fixed-capacity sets of entry indices.
//!
//! The compressor tracks "which entries are members / considered / removed"
//! with packed bit sets over table indices. Capacity is fixed at construction
//! to the size of the table being processed and never changes.
//!
//! # Design
//!
//! - Uses `BitVec<u32, Lsb0>` for storage (32-bit words, LSB-first ordering)
//! - Storage is leased from a [`MemoryPool`], so construction can fail with
//!   `OutOfMemory`
//! - The member count is maintained incrementally so `count()` is O(1)
//!
//! # Examples
//!
//! ```
//! use routing_compressor::{BitSet, MemoryPool};
//!
//! let pool = MemoryPool::unbounded();
//! let mut set = BitSet::new(100, &pool).unwrap();
//! assert!(set.add(5));
//! assert!(set.add(70));
//! assert!(!set.add(100));
//! assert_eq!(set.count(), 2);
//! assert_eq!(set.iter().collect::<Vec<_>>(), vec![5, 70]);
//! ```

use crate::error::Result;
use crate::pool::{Lease, MemoryPool};
use bitvec::prelude::*;
use std::sync::Arc;

/// Word type for bit storage (32-bit unsigned integer)
pub type Word = u32;

/// Number of bits per word
pub const BITS_PER_WORD: usize = 32;

/// Number of words needed to hold `n` bits
#[inline(always)]
const fn words_for(n: usize) -> usize {
    (n + BITS_PER_WORD - 1) / BITS_PER_WORD
}

/// Fixed-capacity set of integers in `[0, capacity)`.
#[derive(Debug)]
pub struct BitSet {
    bv: BitVec<Word, Lsb0>,
    count: usize,
    _lease: Lease,
}

impl BitSet {
    /// Create an empty set able to hold `[0, n)`.
    pub fn new(n: usize, pool: &Arc<MemoryPool>) -> Result<Self> {
        let lease = pool.lease(words_for(n) * std::mem::size_of::<Word>())?;

        let mut words: Vec<Word> = Vec::new();
        words.try_reserve_exact(words_for(n))?;
        words.resize(words_for(n), 0);

        let mut bv = BitVec::from_vec(words);
        bv.truncate(n);

        Ok(Self {
            bv,
            count: 0,
            _lease: lease,
        })
    }

    /// Remove every member.
    pub fn clear(&mut self) {
        if self.count > 0 {
            self.bv.fill(false);
            self.count = 0;
        }
    }

    /// Add `i`, returning false if it is out of range.
    ///
    /// Adding an existing member is a no-op that still returns true.
    #[inline]
    pub fn add(&mut self, i: usize) -> bool {
        if i >= self.bv.len() {
            return false;
        }
        if !self.bv[i] {
            self.bv.set(i, true);
            self.count += 1;
        }
        true
    }

    #[inline]
    pub fn contains(&self, i: usize) -> bool {
        i < self.bv.len() && self.bv[i]
    }

    /// Remove `i`, returning false if it was not a member.
    #[inline]
    pub fn remove(&mut self, i: usize) -> bool {
        if !self.contains(i) {
            return false;
        }
        self.bv.set(i, false);
        self.count -= 1;
        true
    }

    /// Number of members.
    #[inline(always)]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Size of the index range this set can hold.
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.bv.len()
    }

    /// Members in ascending order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = usize> + '_ {
        self.bv.iter_ones()
    }

    /// Exchange contents with another set of the same capacity.
    pub fn swap(&mut self, other: &mut BitSet) {
        debug_assert_eq!(self.capacity(), other.capacity());
        std::mem::swap(&mut self.bv, &mut other.bv);
        std::mem::swap(&mut self.count, &mut other.count);
    }
}
