//! Routing tables - ordered sequences of routing entries.
//!
//! Matching is first-match: the earliest entry whose [`KeyMask`] matches a
//! key decides the route. Once compression begins, tables are kept sorted by
//! ascending generality (number of `X` bits), so more specific entries come
//! first.
//!
//! Two representations are provided behind the [`TableStore`] trait:
//!
//! - [`RoutingTable`] - a single contiguous vector
//! - [`ChunkedTable`] - several separately allocated chunks addressed through
//!   a flattened index, as produced when a table is split across stores
//!
//! The compression engine is written against `TableStore` only.

use crate::error::{CompressorError, Result};
use crate::key_mask::KeyMask;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of link (inter-chip) direction bits in a route word.
pub const N_LINKS: u32 = 6;

/// Mask of the link bits in a route or source word.
pub const LINK_MASK: u32 = (1 << N_LINKS) - 1;

/// A single routing entry.
///
/// `route` is a bitmask of output directions (link bits first, then
/// processor bits); `source` is a bitmask of the directions packets hitting
/// this entry may arrive from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Entry {
    pub key_mask: KeyMask,
    pub route: u32,
    pub source: u32,
}

impl Entry {
    pub const fn new(key: u32, mask: u32, route: u32, source: u32) -> Self {
        Self {
            key_mask: KeyMask::new(key, mask),
            route,
            source,
        }
    }

    /// Number of "don't care" bits in the key-mask.
    #[inline]
    pub const fn generality(&self) -> u32 {
        self.key_mask.count_xs()
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {:#08x} (from {:#04x})",
            self.key_mask, self.route, self.source
        )
    }
}

/// Storage capability the compression engine runs over.
///
/// Indices are flattened: `get(i)` for `i < len()` must resolve to the
/// correct entry regardless of how the table is physically stored, and
/// flattened order is preserved by every operation.
pub trait TableStore {
    /// Number of entries currently in the table.
    fn len(&self) -> usize;

    /// Entry at flattened index `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= len()`.
    fn get(&self, i: usize) -> &Entry;

    /// Mutable entry at flattened index `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= len()`.
    fn get_mut(&mut self, i: usize) -> &mut Entry;

    /// Reduce the logical size by `n`, dropping entries from the tail.
    ///
    /// Asking to remove more entries than exist is a `CorruptState` error.
    fn shrink_by(&mut self, n: usize) -> Result<()>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in flattened order.
    fn iter(&self) -> TableIter<'_, Self>
    where
        Self: Sized,
    {
        TableIter {
            table: self,
            pos: 0,
        }
    }

    /// Copy of all entries in flattened order.
    fn to_vec(&self) -> Result<Vec<Entry>> {
        let mut out = Vec::new();
        out.try_reserve_exact(self.len())?;
        for i in 0..self.len() {
            out.push(*self.get(i));
        }
        Ok(out)
    }

    /// Overwrite the first `entries.len()` entries and drop the rest.
    fn replace_prefix(&mut self, entries: &[Entry]) -> Result<()> {
        if entries.len() > self.len() {
            return Err(CompressorError::CorruptState(format!(
                "cannot write {} entries into a table of {}",
                entries.len(),
                self.len()
            )));
        }
        for (i, e) in entries.iter().enumerate() {
            *self.get_mut(i) = *e;
        }
        let excess = self.len() - entries.len();
        self.shrink_by(excess)
    }

    /// Stable sort by ascending generality.
    fn sort_by_generality(&mut self) -> Result<()> {
        let mut entries = self.to_vec()?;
        entries.sort_by_key(|e| e.generality());
        self.replace_prefix(&entries)
    }

    /// Index at which an entry of the given generality must be inserted to
    /// keep the table sorted: the first index whose generality is at least
    /// `generality`.
    ///
    /// A binary search locates the run of entries of generality
    /// `generality - 1`, then a forward scan finds the end of that run.
    fn insertion_point(&self, generality: u32) -> usize {
        let target = generality.saturating_sub(1);

        let mut bottom = 0;
        let mut top = self.len();
        while bottom < top {
            let pos = bottom + (top - bottom) / 2;
            if self.get(pos).generality() < target {
                bottom = pos + 1;
            } else {
                top = pos;
            }
        }

        let mut pos = bottom;
        while pos < self.len() && self.get(pos).generality() < generality {
            pos += 1;
        }
        pos
    }

    /// Route of the first entry matching `key`, if any.
    fn lookup(&self, key: u32) -> Option<u32> {
        (0..self.len())
            .map(|i| self.get(i))
            .find(|e| e.key_mask.matches(key))
            .map(|e| e.route)
    }
}

/// Iterator over a [`TableStore`] in flattened order.
pub struct TableIter<'a, T: TableStore> {
    table: &'a T,
    pos: usize,
}

impl<'a, T: TableStore> Iterator for TableIter<'a, T> {
    type Item = &'a Entry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.table.len() {
            return None;
        }
        let e = self.table.get(self.pos);
        self.pos += 1;
        Some(e)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.table.len().saturating_sub(self.pos);
        (n, Some(n))
    }
}

/// Contiguous routing table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingTable {
    entries: Vec<Entry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, entry: Entry) -> Result<()> {
        self.entries.try_reserve(1)?;
        self.entries.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }
}

impl TableStore for RoutingTable {
    #[inline]
    fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    fn get(&self, i: usize) -> &Entry {
        &self.entries[i]
    }

    #[inline]
    fn get_mut(&mut self, i: usize) -> &mut Entry {
        &mut self.entries[i]
    }

    fn shrink_by(&mut self, n: usize) -> Result<()> {
        if n > self.entries.len() {
            return Err(CompressorError::CorruptState(format!(
                "cannot remove {} entries from a table of {}",
                n,
                self.entries.len()
            )));
        }
        let len = self.entries.len() - n;
        self.entries.truncate(len);
        Ok(())
    }

    fn sort_by_generality(&mut self) -> Result<()> {
        self.entries.sort_by_key(|e| e.generality());
        Ok(())
    }
}

/// Routing table split across several chunks.
///
/// Empty chunks are permitted. Shrinking removes entries from the last
/// non-empty chunk first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkedTable {
    chunks: Vec<Vec<Entry>>,
}

impl ChunkedTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_chunks(chunks: Vec<Vec<Entry>>) -> Self {
        Self { chunks }
    }

    /// Split `entries` into chunks of at most `chunk_size` entries.
    pub fn split(entries: &[Entry], chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunks: entries.chunks(chunk_size).map(|c| c.to_vec()).collect(),
        }
    }

    pub fn chunks(&self) -> &[Vec<Entry>] {
        &self.chunks
    }

    /// Resolve a flattened index to `(chunk, offset)`.
    fn locate(&self, index: usize) -> (usize, usize) {
        let mut i = index;
        for (c, chunk) in self.chunks.iter().enumerate() {
            if i < chunk.len() {
                return (c, i);
            }
            i -= chunk.len();
        }
        panic!(
            "entry index out of range: {} in a table of {}",
            index,
            self.len()
        );
    }
}

impl TableStore for ChunkedTable {
    fn len(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }

    fn get(&self, i: usize) -> &Entry {
        let (c, o) = self.locate(i);
        &self.chunks[c][o]
    }

    fn get_mut(&mut self, i: usize) -> &mut Entry {
        let (c, o) = self.locate(i);
        &mut self.chunks[c][o]
    }

    fn shrink_by(&mut self, mut n: usize) -> Result<()> {
        if n > self.len() {
            return Err(CompressorError::CorruptState(format!(
                "cannot remove {} entries from a table of {}",
                n,
                self.len()
            )));
        }
        for chunk in self.chunks.iter_mut().rev() {
            if n == 0 {
                break;
            }
            let take = n.min(chunk.len());
            let len = chunk.len() - take;
            chunk.truncate(len);
            n -= take;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Entry> {
        vec![
            Entry::new(0x10, 0xFFFF_FFF0, 1, 0),
            Entry::new(0x00, 0xFFFF_FFFF, 2, 0),
            Entry::new(0x100, 0xFFFF_FF00, 4, 0),
            Entry::new(0x01, 0xFFFF_FFFF, 8, 0),
            Entry::new(0x30, 0xFFFF_FFF0, 16, 0),
        ]
    }

    #[test]
    fn test_generality() {
        assert_eq!(Entry::new(0, 0xFFFF_FFFF, 0, 0).generality(), 0);
        assert_eq!(Entry::new(0, 0xFFFF_FF00, 0, 0).generality(), 8);
    }

    #[test]
    fn test_sort_is_stable() {
        let mut t = RoutingTable::from_entries(sample());
        t.sort_by_generality().unwrap();
        let routes: Vec<u32> = t.iter().map(|e| e.route).collect();
        assert_eq!(routes, vec![2, 8, 1, 16, 4]);
    }

    #[test]
    fn test_chunked_sort_matches_contiguous() {
        let mut a = RoutingTable::from_entries(sample());
        let mut b = ChunkedTable::split(&sample(), 2);
        a.sort_by_generality().unwrap();
        b.sort_by_generality().unwrap();
        assert_eq!(a.to_vec().unwrap(), b.to_vec().unwrap());
    }

    #[test]
    fn test_insertion_point() {
        let mut t = RoutingTable::from_entries(sample());
        t.sort_by_generality().unwrap();
        // generalities: 0, 0, 4, 4, 8
        assert_eq!(t.insertion_point(0), 0);
        assert_eq!(t.insertion_point(1), 2);
        assert_eq!(t.insertion_point(4), 2);
        assert_eq!(t.insertion_point(5), 4);
        assert_eq!(t.insertion_point(8), 4);
        assert_eq!(t.insertion_point(9), 5);
        assert_eq!(t.insertion_point(32), 5);
    }

    #[test]
    fn test_insertion_point_empty() {
        let t = RoutingTable::new();
        assert_eq!(t.insertion_point(3), 0);
    }

    #[test]
    fn test_chunked_indexing() {
        let t = ChunkedTable::from_chunks(vec![
            sample()[..2].to_vec(),
            Vec::new(),
            sample()[2..].to_vec(),
        ]);
        assert_eq!(t.len(), 5);
        assert_eq!(t.get(2).route, 4);
        assert_eq!(t.get(4).route, 16);
    }

    #[test]
    fn test_chunked_shrink_from_tail() {
        let mut t = ChunkedTable::split(&sample(), 2);
        t.shrink_by(2).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.chunks()[2].len(), 0);
        assert_eq!(t.chunks()[1].len(), 1);
        assert_eq!(t.get(2).route, 4);
    }

    #[test]
    fn test_shrink_too_far_is_corrupt() {
        let mut t = RoutingTable::from_entries(sample());
        assert!(matches!(
            t.shrink_by(6),
            Err(CompressorError::CorruptState(_))
        ));
        let mut c = ChunkedTable::split(&sample(), 3);
        assert!(matches!(
            c.shrink_by(6),
            Err(CompressorError::CorruptState(_))
        ));
        assert_eq!(c.len(), 5);
    }

    #[test]
    #[should_panic(expected = "entry index out of range")]
    fn test_chunked_out_of_range_panics() {
        let t = ChunkedTable::split(&sample(), 2);
        t.get(5);
    }

    #[test]
    fn test_lookup_first_match() {
        let t = RoutingTable::from_entries(vec![
            Entry::new(0x0, 0xF, 1, 0),
            Entry::new(0x0, 0x0, 2, 0),
        ]);
        assert_eq!(t.lookup(0x10), Some(1));
        assert_eq!(t.lookup(0x11), Some(2));
        assert_eq!(RoutingTable::new().lookup(0), None);
    }
}
