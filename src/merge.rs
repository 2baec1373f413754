//! Merge - a group of table entries being folded into one.
//!
//! A merge records its member indices and keeps `key_mask`, `route` and
//! `source` equal to the fold of its members at all times. Adding a member
//! folds it in directly; removing one refolds over the survivors, since
//! key-mask merging cannot be undone.

use crate::bitset::BitSet;
use crate::error::Result;
use crate::key_mask::KeyMask;
use crate::pool::MemoryPool;
use crate::table::{Entry, TableStore};
use std::sync::Arc;

#[derive(Debug)]
pub struct Merge {
    members: BitSet,
    key_mask: KeyMask,
    route: u32,
    source: u32,
}

impl Merge {
    /// Empty merge over a table of `capacity` entries.
    pub fn new(capacity: usize, pool: &Arc<MemoryPool>) -> Result<Self> {
        Ok(Self {
            members: BitSet::new(capacity, pool)?,
            key_mask: KeyMask::NOTHING,
            route: 0,
            source: 0,
        })
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.key_mask = KeyMask::NOTHING;
        self.route = 0;
        self.source = 0;
    }

    /// Add entry `i` of `table`.
    pub fn add<T: TableStore>(&mut self, table: &T, i: usize) {
        if self.members.contains(i) || !self.members.add(i) {
            return;
        }
        let entry = table.get(i);
        self.key_mask = if self.members.count() == 1 {
            entry.key_mask
        } else {
            self.key_mask.merge(&entry.key_mask)
        };
        self.route |= entry.route;
        self.source |= entry.source;
    }

    /// Remove entry `i` and refold over the remaining members.
    pub fn remove<T: TableStore>(&mut self, table: &T, i: usize) {
        if !self.members.remove(i) {
            return;
        }
        self.refold(table);
    }

    /// Remove every index in `set`, refolding once.
    pub fn remove_all<T: TableStore>(&mut self, table: &T, set: &BitSet) {
        let mut changed = false;
        for i in set.iter() {
            changed |= self.members.remove(i);
        }
        if changed {
            self.refold(table);
        }
    }

    fn refold<T: TableStore>(&mut self, table: &T) {
        self.key_mask = KeyMask::NOTHING;
        self.route = 0;
        self.source = 0;

        for (n, i) in self.members.iter().enumerate() {
            let entry = table.get(i);
            self.key_mask = if n == 0 {
                entry.key_mask
            } else {
                self.key_mask.merge(&entry.key_mask)
            };
            self.route |= entry.route;
            self.source |= entry.source;
        }
    }

    #[inline]
    pub fn contains(&self, i: usize) -> bool {
        self.members.contains(i)
    }

    /// Net number of entries saved by applying this merge.
    #[inline]
    pub fn goodness(&self) -> i64 {
        self.members.count() as i64 - 1
    }

    #[inline]
    pub fn member_count(&self) -> usize {
        self.members.count()
    }

    pub fn members(&self) -> impl DoubleEndedIterator<Item = usize> + '_ {
        self.members.iter()
    }

    #[inline]
    pub fn key_mask(&self) -> KeyMask {
        self.key_mask
    }

    #[inline]
    pub fn route(&self) -> u32 {
        self.route
    }

    #[inline]
    pub fn source(&self) -> u32 {
        self.source
    }

    /// The entry that replaces the members when the merge is applied.
    pub fn entry(&self) -> Entry {
        Entry {
            key_mask: self.key_mask,
            route: self.route,
            source: self.source,
        }
    }

    /// Exchange contents with another merge over the same table.
    pub fn swap(&mut self, other: &mut Merge) {
        self.members.swap(&mut other.members);
        std::mem::swap(&mut self.key_mask, &mut other.key_mask);
        std::mem::swap(&mut self.route, &mut other.route);
        std::mem::swap(&mut self.source, &mut other.source);
    }
}
