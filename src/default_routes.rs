//! Default-route elision.
//!
//! A router forwards a packet that matches no entry straight through: out of
//! the link opposite the one it arrived on. An entry that does exactly that
//! (one source link, one route link, opposite each other) can be dropped from
//! the table, provided no entry after it intersects its key-mask. Otherwise
//! some packet matching both would fall through to the later entry instead
//! of taking the default route.
//!
//! Entries are examined from last to first so that an entry already marked
//! for removal no longer blocks the entries above it.

use crate::bitset::BitSet;
use crate::error::Result;
use crate::pool::MemoryPool;
use crate::table::{Entry, TableStore, LINK_MASK};
use std::sync::Arc;

/// Link a packet arriving on `source_link` leaves on by default.
///
/// Links are numbered 0 to 5 round the hexagon, so the opposite link is
/// three steps away.
#[inline]
pub const fn opposite_link(link: u32) -> u32 {
    (link + 3) % 6
}

/// Whether `entry` only restates default routing.
pub fn is_default_route(entry: &Entry) -> bool {
    let route = entry.route;
    let source = entry.source;

    route.count_ones() == 1
        && route & !LINK_MASK == 0
        && source.count_ones() == 1
        && source & !LINK_MASK == 0
        && (route >> 3) == (source & 0x7)
        && (source >> 3) == (route & 0x7)
}

/// Remove every entry default routing makes redundant.
///
/// Survivors keep their relative order. Returns the removed entries, in
/// table order.
pub fn elide_default_routes<T: TableStore>(
    table: &mut T,
    pool: &Arc<MemoryPool>,
) -> Result<Vec<Entry>> {
    let n = table.len();
    let mut remove = BitSet::new(n, pool)?;

    for i in (0..n).rev() {
        let entry = table.get(i);
        if !is_default_route(entry) {
            continue;
        }

        let blocked = (i + 1..n).any(|j| {
            !remove.contains(j) && table.get(j).key_mask.intersects(&entry.key_mask)
        });
        if !blocked {
            remove.add(i);
        }
    }

    let mut removed = Vec::new();
    if remove.is_empty() {
        return Ok(removed);
    }
    removed.try_reserve_exact(remove.count())?;

    let mut insert = 0;
    for i in 0..n {
        let entry = *table.get(i);
        if remove.contains(i) {
            removed.push(entry);
        } else {
            *table.get_mut(insert) = entry;
            insert += 1;
        }
    }
    table.shrink_by(remove.count())?;

    log::debug!(
        "elided {} default routes, {} entries remain",
        removed.len(),
        table.len()
    );
    Ok(removed)
}
