//! KeyMask - ternary 32-bit match patterns.
//!
//! A `KeyMask` pairs a 32-bit `key` with a 32-bit `mask`. A bit whose mask
//! bit is 1 is *fixed* and must equal the corresponding key bit; a bit whose
//! mask and key bits are both 0 is *don't care* (`X`). The remaining
//! combination (key 1, mask 0) can never be matched and is only used by the
//! "matches nothing" sentinel.
//!
//! # Examples
//!
//! ```
//! use routing_compressor::KeyMask;
//!
//! let a = KeyMask::new(0b000, 0b111);
//! let b = KeyMask::new(0b001, 0b111);
//! let m = a.merge(&b);
//!
//! assert_eq!(m, KeyMask::new(0b000, 0b110));
//! assert!(m.matches(0b000) && m.matches(0b001));
//! assert_eq!(m.count_xs(), 30);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ternary key/mask pair.
///
/// Ordering is lexicographic on `(key, mask)`, which lets key-masks key an
/// ordered map directly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct KeyMask {
    pub key: u32,
    pub mask: u32,
}

impl KeyMask {
    /// Pattern that matches no key at all: every bit is in the unmatchable
    /// (key 1, mask 0) state.
    pub const NOTHING: KeyMask = KeyMask {
        key: 0xFFFF_FFFF,
        mask: 0x0000_0000,
    };

    /// Pattern that matches every key.
    pub const EVERYTHING: KeyMask = KeyMask { key: 0, mask: 0 };

    #[inline]
    pub const fn new(key: u32, mask: u32) -> Self {
        Self { key, mask }
    }

    /// Pattern matching exactly one concrete key.
    #[inline]
    pub const fn exact(key: u32) -> Self {
        Self {
            key,
            mask: 0xFFFF_FFFF,
        }
    }

    /// Bits which are "don't care".
    #[inline]
    pub const fn xs(&self) -> u32 {
        !self.key & !self.mask
    }

    /// Number of "don't care" bits, i.e. the generality of the pattern.
    #[inline]
    pub const fn count_xs(&self) -> u32 {
        self.xs().count_ones()
    }

    /// Whether some concrete key is matched by both patterns.
    #[inline]
    pub const fn intersects(&self, other: &KeyMask) -> bool {
        (self.key & other.mask) == (other.key & self.mask)
    }

    /// Tightest pattern covering both inputs.
    ///
    /// The result may match keys neither input matched.
    #[inline]
    pub const fn merge(&self, other: &KeyMask) -> KeyMask {
        let new_xs = !(self.key ^ other.key);
        let mask = self.mask & other.mask & new_xs;
        KeyMask {
            key: (self.key | other.key) & mask,
            mask,
        }
    }

    /// Whether the concrete key `k` is matched.
    #[inline]
    pub const fn matches(&self, k: u32) -> bool {
        (k & self.mask) == self.key
    }

    /// Whether every key matched by `other` is also matched by `self`.
    #[inline]
    pub const fn covers(&self, other: &KeyMask) -> bool {
        (self.mask & !other.mask) == 0 && (other.key & self.mask) == self.key
    }

    /// Whether this is the unmatchable sentinel.
    #[inline]
    pub const fn is_nothing(&self) -> bool {
        self.key == Self::NOTHING.key && self.mask == Self::NOTHING.mask
    }
}

impl fmt::Display for KeyMask {
    /// Renders most-significant bit first as `0`, `1`, `X` or `!`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in (0..32).rev() {
            let k = (self.key >> bit) & 1;
            let m = (self.mask >> bit) & 1;
            let c = match (k, m) {
                (0, 0) => 'X',
                (1, 0) => '!',
                (0, _) => '0',
                _ => '1',
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xs() {
        let km = KeyMask::new(0x0000_0001, 0xFFFF_FFF3);
        assert_eq!(km.xs(), 0x0000_000C);
        assert_eq!(km.count_xs(), 2);
        assert_eq!(KeyMask::EVERYTHING.count_xs(), 32);
        assert_eq!(KeyMask::NOTHING.count_xs(), 0);
    }

    #[test]
    fn test_intersects() {
        let a = KeyMask::new(0b0000, 0b1100);
        let b = KeyMask::new(0b0011, 0b0011);
        let c = KeyMask::new(0b0100, 0b0100);

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(b.intersects(&c));
    }

    #[test]
    fn test_merge_adjacent() {
        let a = KeyMask::new(0b10, 0b11);
        let b = KeyMask::new(0b11, 0b11);
        assert_eq!(a.merge(&b), KeyMask::new(0b10, 0b10));
    }

    #[test]
    fn test_merge_generalises() {
        // 00 and 11 differ in two bits, the merge matches 01 and 10 too
        let a = KeyMask::new(0b00, 0b11);
        let b = KeyMask::new(0b11, 0b11);
        let m = a.merge(&b);
        assert_eq!(m.mask & 0b11, 0);
        assert!(m.matches(0b01));
        assert!(m.matches(0b10));
    }

    #[test]
    fn test_covers() {
        let wide = KeyMask::new(0b0000, 0b1000);
        let narrow = KeyMask::new(0b0110, 0b1111);
        assert!(wide.covers(&narrow));
        assert!(!narrow.covers(&wide));
        assert!(KeyMask::EVERYTHING.covers(&wide));
    }

    #[test]
    fn test_nothing_matches_nothing() {
        assert!(KeyMask::NOTHING.is_nothing());
        assert!(!KeyMask::NOTHING.matches(0));
        assert!(!KeyMask::NOTHING.matches(0xFFFF_FFFF));
    }

    #[test]
    fn test_display() {
        let km = KeyMask::new(0x8000_0000, 0xC000_0000);
        let s = km.to_string();
        assert_eq!(s.len(), 32);
        assert!(s.starts_with("10X"));
    }
}
