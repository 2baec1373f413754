//! Alias bookkeeping for merged entries.
//!
//! When ordered covering folds several entries into one, the merged entry's
//! key-mask is bound in an [`AliasMap`] to the [`AliasList`] of original
//! `(key-mask, source)` pairs it now stands in for. Later down-checks test
//! conflicts against these originals instead of the merged pattern, which
//! may match keys no original entry did.
//!
//! The map is an ordered map keyed by the `(key, mask)` tuple. Alias lists
//! own their elements; joining moves one list's elements onto the end of
//! another.

use crate::error::Result;
use crate::key_mask::KeyMask;
use crate::pool::{Lease, MemoryPool};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One original entry absorbed into a merged entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub key_mask: KeyMask,
    pub source: u32,
}

const ALIAS_BYTES: usize = std::mem::size_of::<Alias>();

/// Ordered list of aliases, with storage leased from a [`MemoryPool`].
#[derive(Debug)]
pub struct AliasList {
    elements: Vec<Alias>,
    lease: Lease,
}

impl AliasList {
    /// Empty list with room for `capacity` aliases.
    pub fn new(capacity: usize, pool: &Arc<MemoryPool>) -> Result<Self> {
        let lease = pool.lease(capacity * ALIAS_BYTES)?;
        let mut elements = Vec::new();
        elements.try_reserve_exact(capacity)?;
        Ok(Self { elements, lease })
    }

    pub fn append(&mut self, key_mask: KeyMask, source: u32) -> Result<()> {
        self.reserve(1)?;
        self.elements.push(Alias { key_mask, source });
        Ok(())
    }

    /// Move every alias of `other` onto the end of this list.
    pub fn join(&mut self, mut other: AliasList) -> Result<()> {
        let spare = self.elements.capacity() - self.elements.len();
        if other.elements.len() > spare {
            let extra = other.elements.len() - spare;
            self.elements.try_reserve(extra)?;
        }
        self.elements.append(&mut other.elements);

        let AliasList { lease, .. } = other;
        self.lease.absorb(lease);
        self.settle_lease()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Alias> {
        self.elements.iter()
    }

    pub fn as_slice(&self) -> &[Alias] {
        &self.elements
    }

    fn reserve(&mut self, additional: usize) -> Result<()> {
        if self.elements.len() + additional > self.elements.capacity() {
            self.elements.try_reserve(additional)?;
        }
        self.settle_lease()
    }

    /// Keep the lease in line with the vector's real capacity.
    fn settle_lease(&mut self) -> Result<()> {
        let needed = self.elements.capacity() * ALIAS_BYTES;
        if needed > self.lease.bytes() {
            self.lease.grow(needed - self.lease.bytes())?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a AliasList {
    type Item = &'a Alias;
    type IntoIter = std::slice::Iter<'a, Alias>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Map from merged key-masks to the originals they replaced.
#[derive(Debug, Default)]
pub struct AliasMap {
    map: BTreeMap<KeyMask, AliasList>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, km: &KeyMask) -> Option<&AliasList> {
        self.map.get(km)
    }

    pub fn contains(&self, km: &KeyMask) -> bool {
        self.map.contains_key(km)
    }

    /// Bind `km` to `list`, returning any list previously bound to it.
    pub fn insert(&mut self, km: KeyMask, list: AliasList) -> Option<AliasList> {
        self.map.insert(km, list)
    }

    /// Detach and return the list bound to `km`.
    pub fn remove(&mut self, km: &KeyMask) -> Option<AliasList> {
        self.map.remove(km)
    }

    /// Release every alias list.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&KeyMask, &AliasList)> {
        self.map.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompressorError;

    #[test]
    fn test_append_and_iter() {
        let pool = MemoryPool::unbounded();
        let mut list = AliasList::new(2, &pool).unwrap();
        list.append(KeyMask::exact(1), 0x1).unwrap();
        list.append(KeyMask::exact(2), 0x2).unwrap();
        list.append(KeyMask::exact(3), 0x4).unwrap();

        let keys: Vec<u32> = list.iter().map(|a| a.key_mask.key).collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn test_join_preserves_order() {
        let pool = MemoryPool::unbounded();
        let mut a = AliasList::new(1, &pool).unwrap();
        a.append(KeyMask::exact(1), 0).unwrap();
        let mut b = AliasList::new(2, &pool).unwrap();
        b.append(KeyMask::exact(2), 0).unwrap();
        b.append(KeyMask::exact(3), 0).unwrap();

        a.join(b).unwrap();
        let keys: Vec<u32> = a.iter().map(|x| x.key_mask.key).collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn test_lease_follows_lists() {
        let pool = MemoryPool::bounded(1024);
        {
            let mut a = AliasList::new(2, &pool).unwrap();
            let b = AliasList::new(2, &pool).unwrap();
            assert_eq!(pool.in_use(), 4 * ALIAS_BYTES);
            a.join(b).unwrap();
            assert!(pool.in_use() >= 2 * ALIAS_BYTES);
        }
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_allocation_failure() {
        let pool = MemoryPool::bounded(ALIAS_BYTES);
        assert!(matches!(
            AliasList::new(2, &pool),
            Err(CompressorError::OutOfMemory { .. })
        ));
        let mut list = AliasList::new(1, &pool).unwrap();
        list.append(KeyMask::exact(0), 0).unwrap();
        assert!(list.append(KeyMask::exact(1), 0).is_err());
    }

    #[test]
    fn test_map_operations() {
        let pool = MemoryPool::unbounded();
        let mut map = AliasMap::new();
        let km = KeyMask::new(0, 0xF0);

        let mut list = AliasList::new(1, &pool).unwrap();
        list.append(KeyMask::exact(7), 1).unwrap();
        assert!(map.insert(km, list).is_none());
        assert!(map.contains(&km));
        assert_eq!(map.find(&km).map(|l| l.len()), Some(1));

        let replacement = AliasList::new(0, &pool).unwrap();
        assert!(map.insert(km, replacement).is_some());
        assert_eq!(map.find(&km).map(|l| l.len()), Some(0));

        assert!(map.remove(&km).is_some());
        assert!(!map.contains(&km));

        map.insert(km, AliasList::new(0, &pool).unwrap());
        map.clear();
        assert!(map.is_empty());
    }
}
