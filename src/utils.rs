//! Utility functions for building and checking routing tables.
//!
//! Random tables are generated from a caller-supplied RNG so tests and
//! benchmarks stay reproducible.

use crate::key_mask::KeyMask;
use crate::table::{Entry, LINK_MASK, N_LINKS};
use rand::Rng;

/// Route of the first entry matching `key`, or `None` for default routing.
///
/// # Examples
///
/// ```
/// use routing_compressor::utils::first_match;
/// use routing_compressor::Entry;
///
/// let table = [
///     Entry::new(0b01, 0b11, 0x1, 0),
///     Entry::new(0b00, 0b10, 0x2, 0),
/// ];
/// assert_eq!(first_match(&table, 0b01), Some(0x1));
/// assert_eq!(first_match(&table, 0b00), Some(0x2));
/// assert_eq!(first_match(&table, 0b10), None);
/// ```
#[inline]
pub fn first_match<'a, I>(entries: I, key: u32) -> Option<u32>
where
    I: IntoIterator<Item = &'a Entry>,
{
    entries
        .into_iter()
        .find(|e| e.key_mask.matches(key))
        .map(|e| e.route)
}

/// Keys worth checking when comparing two tables' behaviour.
///
/// For each key-mask this yields the lowest and highest matched keys and
/// each single-X-bit neighbour of the lowest, plus the `0` and all-ones
/// keys.
pub fn boundary_keys(key_masks: &[KeyMask]) -> Vec<u32> {
    let mut keys = vec![0, u32::MAX];
    for km in key_masks {
        if km.key & !km.mask != 0 {
            continue;
        }
        let xs = km.xs();
        keys.push(km.key);
        keys.push(km.key | xs);
        let mut bits = xs;
        while bits != 0 {
            let bit = bits & bits.wrapping_neg();
            keys.push(km.key | bit);
            bits &= bits - 1;
        }
    }
    keys.sort_unstable();
    keys.dedup();
    keys
}

/// Random key-mask whose `X` bits all lie in the low `width` bits.
pub fn random_key_mask<R: Rng>(rng: &mut R, width: u32) -> KeyMask {
    let field = if width >= 32 { u32::MAX } else { (1u32 << width) - 1 };
    let xs = rng.gen::<u32>() & rng.gen::<u32>() & field;
    let mask = !xs;
    KeyMask::new(rng.gen::<u32>() & mask & field, mask)
}

/// Random route word with one to three destinations drawn from `n_routes`
/// links and processors.
pub fn random_route<R: Rng>(rng: &mut R, n_routes: u32) -> u32 {
    let n_routes = n_routes.clamp(1, 32);
    let mut route = 0;
    for _ in 0..rng.gen_range(1..=3) {
        route |= 1 << rng.gen_range(0..n_routes);
    }
    route
}

/// Random source word: one link, or none.
pub fn random_source<R: Rng>(rng: &mut R) -> u32 {
    if rng.gen_bool(0.75) {
        1 << rng.gen_range(0..N_LINKS)
    } else {
        0
    }
}

/// Random table of `len` entries keyed within the low `width` bits.
///
/// Routes are drawn from `n_routes` destinations; fewer destinations give
/// more merge opportunities.
pub fn random_table<R: Rng>(rng: &mut R, len: usize, width: u32, n_routes: u32) -> Vec<Entry> {
    (0..len)
        .map(|_| Entry {
            key_mask: random_key_mask(rng, width),
            route: random_route(rng, n_routes),
            source: random_source(rng),
        })
        .collect()
}

/// Random table including some entries that restate default routing.
pub fn random_table_with_defaults<R: Rng>(rng: &mut R, len: usize, width: u32) -> Vec<Entry> {
    (0..len)
        .map(|_| {
            let key_mask = random_key_mask(rng, width);
            if rng.gen_bool(0.3) {
                let link = rng.gen_range(0..N_LINKS);
                let route = 1 << ((link + 3) % N_LINKS);
                Entry {
                    key_mask,
                    route,
                    source: 1 << link,
                }
            } else {
                Entry {
                    key_mask,
                    route: (random_route(rng, 12) & !LINK_MASK) | (1 << N_LINKS),
                    source: random_source(rng),
                }
            }
        })
        .collect()
}
