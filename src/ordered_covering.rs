//! Ordered covering - greedy minimisation of a generality-sorted table.
//!
//! Each iteration of the outer loop picks the best legal [`Merge`], applies
//! it and records the absorbed entries in the [`AliasMap`]:
//!
//! ```text
//! loop:
//!   poll cancellation / deadline
//!   if table.len() <= target_length: TargetReached
//!   merge = find_best_merge(table, aliases)
//!   if merge has fewer than two members: NoFurtherProgress
//!   apply_merge(merge, table, aliases)
//! ```
//!
//! A candidate merge groups every entry sharing one route. It is then
//! refined by two checks until it is safe to insert at the position its
//! generality sorts to:
//!
//! - **down-check**: the merged entry must not cover an original entry that
//!   sits after its insertion point. Conflicts are dodged by forcing one of
//!   the merged entry's `X` bits to a fixed value, which means dropping the
//!   members that disagree at that bit.
//! - **up-check**: a member must not move past an entry between its old
//!   position and the insertion point that it intersects.
//!
//! Both checks stop refining once the merge is no better than the best merge
//! found so far.

use crate::alias::{AliasList, AliasMap};
use crate::bitset::BitSet;
use crate::control::ControlFlags;
use crate::error::Result;
use crate::key_mask::KeyMask;
use crate::merge::Merge;
use crate::pool::MemoryPool;
use crate::table::{Entry, TableStore};
use std::sync::Arc;

/// Why the outer loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The table is no longer than the target length.
    TargetReached,
    /// No merge with positive goodness exists.
    NoFurtherProgress,
}

/// Bits of a merge that may be forced to 0 or 1 to avoid covering the most
/// constrained conflicts seen so far.
#[derive(Debug, Clone, Copy)]
struct Settable {
    found: bool,
    stringency: u32,
    zeros: u32,
    ones: u32,
}

impl Settable {
    fn new() -> Self {
        Self {
            found: false,
            stringency: 33,
            zeros: 0,
            ones: 0,
        }
    }

    /// Record a conflict between the merged key-mask and a covered one.
    fn record(&mut self, merged: &KeyMask, covered: &KeyMask) {
        self.found = true;

        let settable = merged.xs() & !covered.xs();
        let stringency = settable.count_ones();
        let zeros = settable & covered.key;
        let ones = settable & !covered.key;

        if stringency < self.stringency {
            self.stringency = stringency;
            self.zeros = zeros;
            self.ones = ones;
        } else if stringency == self.stringency {
            self.zeros |= zeros;
            self.ones |= ones;
        }
    }
}

/// The ordered-covering minimiser.
#[derive(Debug)]
pub struct OrderedCovering {
    pool: Arc<MemoryPool>,
    control: Arc<ControlFlags>,
    guards: Vec<KeyMask>,
    merges_applied: usize,
}

impl OrderedCovering {
    pub fn new(pool: Arc<MemoryPool>, control: Arc<ControlFlags>) -> Self {
        Self {
            pool,
            control,
            guards: Vec::new(),
            merges_applied: 0,
        }
    }

    /// Key-masks no merged entry may cover.
    ///
    /// Guards behave like original entries placed after the end of the
    /// table. The orchestrator uses them for entries removed in favour of
    /// default routing.
    pub fn with_guards(mut self, guards: Vec<KeyMask>) -> Self {
        self.guards = guards;
        self
    }

    pub fn guards(&self) -> &[KeyMask] {
        &self.guards
    }

    /// Merges applied since construction.
    pub fn merges_applied(&self) -> usize {
        self.merges_applied
    }

    /// Minimise `table` until it has at most `target_length` entries or no
    /// further merge is possible.
    ///
    /// The table is sorted by generality first. On `Aborted` or `TimedOut`
    /// the table holds the result of the last completed merge, which is a
    /// valid if not minimal table.
    pub fn minimise<T: TableStore>(
        &mut self,
        table: &mut T,
        target_length: usize,
        aliases: &mut AliasMap,
    ) -> Result<Termination> {
        table.sort_by_generality()?;

        loop {
            self.control.poll()?;

            if table.len() <= target_length {
                return Ok(Termination::TargetReached);
            }

            let merge = self.find_best_merge(table, aliases)?;
            if merge.member_count() < 2 {
                return Ok(Termination::NoFurtherProgress);
            }

            self.apply_merge(&merge, table, aliases)?;
        }
    }

    /// Best legal merge of the current table; empty if none saves entries.
    pub fn find_best_merge<T: TableStore>(
        &self,
        table: &T,
        aliases: &AliasMap,
    ) -> Result<Merge> {
        let n = table.len();
        let mut best = Merge::new(n, &self.pool)?;
        let mut working = Merge::new(n, &self.pool)?;
        let mut considered = BitSet::new(n, &self.pool)?;

        for i in 0..n {
            if considered.contains(i) {
                continue;
            }

            working.clear();
            let route = table.get(i).route;
            for j in i..n {
                if table.get(j).route == route {
                    working.add(table, j);
                    considered.add(j);
                }
            }

            let bound = best.goodness();
            if working.goodness() <= bound {
                continue;
            }

            self.down_check(&mut working, table, bound, aliases)?;
            if working.goodness() <= bound {
                continue;
            }

            if self.up_check(&mut working, table, bound) {
                self.down_check(&mut working, table, bound, aliases)?;
            }

            if working.goodness() > bound {
                best.swap(&mut working);
            }
        }

        Ok(best)
    }

    /// Remove members until the merged entry covers no original entry after
    /// its insertion point, or the merge is no better than `min_goodness`.
    pub fn down_check<T: TableStore>(
        &self,
        merge: &mut Merge,
        table: &T,
        min_goodness: i64,
        aliases: &AliasMap,
    ) -> Result<()> {
        let min_goodness = min_goodness.max(0);

        while merge.goodness() > min_goodness {
            let merged = merge.key_mask();
            let insertion = table.insertion_point(merged.count_xs());

            let mut settable = Settable::new();
            for i in insertion..table.len() {
                if merge.contains(i) {
                    continue;
                }
                let other = table.get(i).key_mask;
                if !other.intersects(&merged) {
                    continue;
                }
                match aliases.find(&other) {
                    None => settable.record(&merged, &other),
                    Some(list) => {
                        for alias in list {
                            if alias.key_mask.intersects(&merged) {
                                settable.record(&merged, &alias.key_mask);
                            }
                        }
                    }
                }
            }
            for guard in &self.guards {
                if guard.intersects(&merged) {
                    settable.record(&merged, guard);
                }
            }

            if !settable.found {
                return Ok(());
            }
            if settable.stringency == 0 {
                merge.clear();
                return Ok(());
            }

            let removables = self.removables(merge, table, &settable)?;
            if removables.is_empty() {
                merge.clear();
                return Ok(());
            }
            merge.remove_all(table, &removables);

            if merge.member_count() == 1 {
                merge.clear();
            }
        }

        Ok(())
    }

    /// Smallest set of members whose exclusion lets one settable bit be
    /// fixed. Candidates are tried from the most significant bit down; the
    /// first smallest set wins.
    fn removables<T: TableStore>(
        &self,
        merge: &Merge,
        table: &T,
        settable: &Settable,
    ) -> Result<BitSet> {
        let mut best = BitSet::new(table.len(), &self.pool)?;
        let mut working = BitSet::new(table.len(), &self.pool)?;

        for bit in (0..32).rev().map(|b| 1u32 << b) {
            if best.count() == 1 {
                break;
            }

            for value in [true, false] {
                let wanted = if value { settable.ones } else { settable.zeros };
                if wanted & bit == 0 {
                    continue;
                }

                working.clear();
                for i in merge.members() {
                    let km = table.get(i).key_mask;
                    let fixed = km.mask & bit != 0;
                    let is_one = km.key & bit != 0;
                    if !fixed || is_one != value {
                        working.add(i);
                    }
                }

                if !working.is_empty() && (best.is_empty() || working.count() < best.count()) {
                    best.swap(&mut working);
                }
            }
        }

        Ok(best)
    }

    /// Remove members that would be moved past an entry they intersect.
    ///
    /// Returns whether any member was removed, in which case the down-check
    /// must be run again.
    pub fn up_check<T: TableStore>(&self, merge: &mut Merge, table: &T, min_goodness: i64) -> bool {
        let min_goodness = min_goodness.max(0);
        let mut changed = false;
        let mut insertion = table.insertion_point(merge.key_mask().count_xs());

        for i in (0..table.len()).rev() {
            if merge.goodness() <= min_goodness {
                break;
            }
            if !merge.contains(i) {
                continue;
            }

            let km = table.get(i).key_mask;
            let blocked = (i + 1..insertion)
                .any(|j| !merge.contains(j) && table.get(j).key_mask.intersects(&km));

            if blocked {
                merge.remove(table, i);
                insertion = table.insertion_point(merge.key_mask().count_xs());
                changed = true;
            }
        }

        changed
    }

    /// Replace the members of `merge` with the merged entry and record the
    /// absorbed entries as its aliases.
    pub fn apply_merge<T: TableStore>(
        &mut self,
        merge: &Merge,
        table: &mut T,
        aliases: &mut AliasMap,
    ) -> Result<()> {
        let merged = merge.entry();
        let insertion = table.insertion_point(merged.generality());
        let new_len = table.len() + 1 - merge.member_count();

        let mut absorbed = AliasList::new(merge.member_count(), &self.pool)?;
        let _scratch = self
            .pool
            .lease(new_len * std::mem::size_of::<Entry>())?;
        let mut compacted: Vec<Entry> = Vec::new();
        compacted.try_reserve_exact(new_len)?;

        let mut twin = None;
        for i in 0..table.len() {
            if i == insertion {
                compacted.push(merged);
            }

            let current = *table.get(i);
            if !merge.contains(i) {
                if current.key_mask == merged.key_mask {
                    twin = Some(current);
                }
                compacted.push(current);
            } else if let Some(list) = aliases.remove(&current.key_mask) {
                absorbed.join(list)?;
            } else {
                absorbed.append(current.key_mask, current.source)?;
            }
        }
        if insertion >= table.len() {
            compacted.push(merged);
        }

        // Entries sharing a key-mask share one alias list, which must cover
        // the originals behind all of them.
        if let Some(twin) = twin {
            if let Some(list) = aliases.remove(&twin.key_mask) {
                absorbed.join(list)?;
            }
            absorbed.append(twin.key_mask, twin.source)?;
        }

        table.replace_prefix(&compacted)?;
        aliases.insert(merged.key_mask, absorbed);
        self.merges_applied += 1;

        log::trace!(
            "merged {} entries into {} at {}, table now {} entries",
            merge.member_count(),
            merged,
            insertion,
            table.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::RoutingTable;

    fn engine() -> OrderedCovering {
        OrderedCovering::new(MemoryPool::unbounded(), Arc::new(ControlFlags::new()))
    }

    fn quad() -> RoutingTable {
        RoutingTable::from_entries(vec![
            Entry::new(0b000, 0b111, 0x1, 0x0),
            Entry::new(0b001, 0b111, 0x1, 0x0),
            Entry::new(0b010, 0b111, 0x1, 0x0),
            Entry::new(0b011, 0b111, 0x1, 0x0),
        ])
    }

    #[test]
    fn test_settable_prefers_stringent() {
        let merged = KeyMask::new(0b000, 0b000);
        let mut s = Settable::new();
        // Covered entry fixes three bits, then one fixing a single bit
        s.record(&merged, &KeyMask::new(0b101, 0b111));
        assert_eq!(s.stringency, 3);
        s.record(&merged, &KeyMask::new(0b000, 0b010));
        assert_eq!(s.stringency, 1);
        assert_eq!(s.ones, 0b010);
        assert_eq!(s.zeros, 0);
        s.record(&merged, &KeyMask::new(0b100, 0b100));
        assert_eq!(s.zeros, 0b100);
        assert_eq!(s.ones, 0b010);
    }

    #[test]
    fn test_best_merge_of_quad() {
        let oc = engine();
        let t = quad();
        let aliases = AliasMap::new();
        let m = oc.find_best_merge(&t, &aliases).unwrap();
        assert_eq!(m.goodness(), 3);
        assert_eq!(m.key_mask(), KeyMask::new(0b000, 0b100));
    }

    #[test]
    fn test_apply_merge_records_aliases() {
        let mut oc = engine();
        let mut t = quad();
        let mut aliases = AliasMap::new();
        let m = oc.find_best_merge(&t, &aliases).unwrap();
        oc.apply_merge(&m, &mut t, &mut aliases).unwrap();

        assert_eq!(t.len(), 1);
        assert_eq!(t.get(0).key_mask, KeyMask::new(0b000, 0b100));
        let list = aliases.find(&KeyMask::new(0b000, 0b100)).unwrap();
        assert_eq!(list.len(), 4);
        assert_eq!(oc.merges_applied(), 1);
    }

    #[test]
    fn test_down_check_dodges_covered_entry() {
        let oc = engine();
        // 000, 001 and 011 merge to 0XX, which would cover XX1X -> route 2
        let t = RoutingTable::from_entries(vec![
            Entry::new(0b000, 0b111, 0x1, 0),
            Entry::new(0b001, 0b111, 0x1, 0),
            Entry::new(0b011, 0b111, 0x1, 0),
            Entry::new(0b010, 0b010, 0x2, 0),
        ]);
        let aliases = AliasMap::new();
        let mut m = Merge::new(t.len(), &MemoryPool::unbounded()).unwrap();
        for i in 0..3 {
            m.add(&t, i);
        }
        oc.down_check(&mut m, &t, 0, &aliases).unwrap();

        assert_eq!(m.member_count(), 2);
        assert!(!m.key_mask().intersects(&KeyMask::new(0b010, 0b010)));
        assert!(m.contains(0) && m.contains(1));
    }

    #[test]
    fn test_down_check_uses_aliases() {
        let oc = engine();
        let pool = MemoryPool::unbounded();
        // Entry 2 is a merged entry whose originals do not intersect the
        // candidate merge of entries 0 and 1.
        let t = RoutingTable::from_entries(vec![
            Entry::new(0b0000, 0b1111, 0x1, 0),
            Entry::new(0b0001, 0b1111, 0x1, 0),
            Entry::new(0b0000, 0b0000, 0x2, 0),
        ]);
        let mut aliases = AliasMap::new();
        let mut list = AliasList::new(2, &pool).unwrap();
        list.append(KeyMask::new(0b1000, 0b1111), 0).unwrap();
        list.append(KeyMask::new(0b1100, 0b1111), 0).unwrap();
        aliases.insert(KeyMask::new(0b0000, 0b0000), list);

        let mut m = Merge::new(t.len(), &pool).unwrap();
        m.add(&t, 0);
        m.add(&t, 1);
        oc.down_check(&mut m, &t, 0, &aliases).unwrap();
        assert_eq!(m.goodness(), 1);

        // Without the alias binding the covering is a real conflict
        let m2_aliases = AliasMap::new();
        let mut m2 = Merge::new(t.len(), &pool).unwrap();
        m2.add(&t, 0);
        m2.add(&t, 1);
        oc.down_check(&mut m2, &t, 0, &m2_aliases).unwrap();
        assert_eq!(m2.member_count(), 0);
    }

    #[test]
    fn test_up_check_blocks_member() {
        let oc = engine();
        // Entry 1 (route 2) intersects entry 0 and sits between it and the
        // insertion point of the merge of 0 and 2.
        let t = RoutingTable::from_entries(vec![
            Entry::new(0b00, 0b11, 0x1, 0),
            Entry::new(0b00, 0b10, 0x2, 0),
            Entry::new(0b10, 0b10, 0x1, 0),
        ]);
        let mut m = Merge::new(t.len(), &MemoryPool::unbounded()).unwrap();
        m.add(&t, 0);
        m.add(&t, 2);
        assert!(oc.up_check(&mut m, &t, 0));
        assert!(!m.contains(0));
    }

    #[test]
    fn test_guards_are_never_covered() {
        let guard = KeyMask::new(0b010, 0b111);
        let oc = engine().with_guards(vec![guard]);
        let t = RoutingTable::from_entries(vec![
            Entry::new(0b000, 0b111, 0x1, 0),
            Entry::new(0b011, 0b111, 0x1, 0),
        ]);
        let m = oc.find_best_merge(&t, &AliasMap::new()).unwrap();
        assert!(m.member_count() < 2);
    }

    #[test]
    fn test_cancelled_before_first_merge() {
        let control = Arc::new(ControlFlags::new());
        control.cancel();
        let mut oc = OrderedCovering::new(MemoryPool::unbounded(), Arc::clone(&control));
        let mut t = quad();
        let res = oc.minimise(&mut t, 0, &mut AliasMap::new());
        assert!(matches!(res, Err(crate::CompressorError::Aborted)));
        assert_eq!(t.len(), 4);
    }
}
