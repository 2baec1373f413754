//! Uncompressed routing table input buffers.
//!
//! Tables arrive as a flat block of 32-bit words:
//!
//! ```text
//! word 0   app_id
//! word 1   compress_only_when_needed (0 or 1)
//! word 2   compress_as_much_as_possible (0 or 1)
//! word 3   table_size
//! then     key, mask, route, source   for each of table_size entries
//! ```

use crate::error::{CompressorError, Result};
use crate::table::{Entry, RoutingTable};
use serde::{Deserialize, Serialize};

const HEADER_WORDS: usize = 4;
const ENTRY_WORDS: usize = 4;

/// A routing table together with its compression controls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableBuffer {
    pub app_id: u32,
    /// Try loading the table before compressing it
    pub compress_only_when_needed: bool,
    /// Keep merging after the target length is reached
    pub compress_as_much_as_possible: bool,
    pub entries: Vec<Entry>,
}

impl TableBuffer {
    pub fn new(app_id: u32, entries: Vec<Entry>) -> Self {
        Self {
            app_id,
            entries,
            ..Self::default()
        }
    }

    pub fn only_when_needed(mut self, flag: bool) -> Self {
        self.compress_only_when_needed = flag;
        self
    }

    pub fn as_much_as_possible(mut self, flag: bool) -> Self {
        self.compress_as_much_as_possible = flag;
        self
    }

    pub fn table_size(&self) -> usize {
        self.entries.len()
    }

    /// Copy of the entries as a contiguous table.
    pub fn to_table(&self) -> Result<RoutingTable> {
        let mut entries = Vec::new();
        entries.try_reserve_exact(self.entries.len())?;
        entries.extend_from_slice(&self.entries);
        Ok(RoutingTable::from_entries(entries))
    }

    /// Parse the word layout described in the module docs.
    ///
    /// Flags other than 0 or 1, a truncated body, or a key with bits set
    /// where its mask is 0 give `InvalidInput`.
    pub fn from_words(words: &[u32]) -> Result<Self> {
        if words.len() < HEADER_WORDS {
            return Err(CompressorError::InvalidInput(format!(
                "table header needs {} words, got {}",
                HEADER_WORDS,
                words.len()
            )));
        }

        let flag = |w: u32, name: &str| match w {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(CompressorError::InvalidInput(format!(
                "{} must be 0 or 1, got {}",
                name, w
            ))),
        };

        let app_id = words[0];
        let compress_only_when_needed = flag(words[1], "compress_only_when_needed")?;
        let compress_as_much_as_possible = flag(words[2], "compress_as_much_as_possible")?;
        let table_size = words[3] as usize;

        let body = &words[HEADER_WORDS..];
        if body.len() < table_size * ENTRY_WORDS {
            return Err(CompressorError::InvalidInput(format!(
                "table of {} entries needs {} words, got {}",
                table_size,
                table_size * ENTRY_WORDS,
                body.len()
            )));
        }

        let mut entries = Vec::new();
        entries.try_reserve_exact(table_size)?;
        for (i, w) in body.chunks_exact(ENTRY_WORDS).take(table_size).enumerate() {
            if w[0] & !w[1] != 0 {
                return Err(CompressorError::InvalidInput(format!(
                    "entry {}: key {:#010x} has bits outside mask {:#010x}",
                    i, w[0], w[1]
                )));
            }
            entries.push(Entry::new(w[0], w[1], w[2], w[3]));
        }

        Ok(Self {
            app_id,
            compress_only_when_needed,
            compress_as_much_as_possible,
            entries,
        })
    }

    pub fn to_words(&self) -> Vec<u32> {
        let mut words = Vec::with_capacity(HEADER_WORDS + self.entries.len() * ENTRY_WORDS);
        words.push(self.app_id);
        words.push(self.compress_only_when_needed as u32);
        words.push(self.compress_as_much_as_possible as u32);
        words.push(self.entries.len() as u32);
        for e in &self.entries {
            words.extend_from_slice(&[e.key_mask.key, e.key_mask.mask, e.route, e.source]);
        }
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_words() {
        let words = [
            30, 1, 0, 2, //
            0x10, 0xFFFF_FFF0, 0x3, 0x8, //
            0x20, 0xFFFF_FFFF, 0x80, 0x1,
        ];
        let buf = TableBuffer::from_words(&words).unwrap();
        assert_eq!(buf.app_id, 30);
        assert!(buf.compress_only_when_needed);
        assert!(!buf.compress_as_much_as_possible);
        assert_eq!(buf.table_size(), 2);
        assert_eq!(buf.entries[1], Entry::new(0x20, 0xFFFF_FFFF, 0x80, 0x1));
        assert_eq!(buf.to_words(), words.to_vec());
    }

    #[test]
    fn test_truncated_body() {
        let words = [1, 0, 0, 2, 0x10, 0xFFFF_FFF0, 0x3, 0x8];
        assert!(matches!(
            TableBuffer::from_words(&words),
            Err(CompressorError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_short_header() {
        assert!(TableBuffer::from_words(&[1, 0]).is_err());
    }

    #[test]
    fn test_bad_flag() {
        assert!(TableBuffer::from_words(&[1, 2, 0, 0]).is_err());
    }

    #[test]
    fn test_key_bits_outside_mask_rejected() {
        let words = [1, 0, 0, 2, 0x1, 0xFFFF_FFFF, 0x1, 0x0, 0x13, 0xFFFF_FFF0, 0x1, 0x0];
        match TableBuffer::from_words(&words) {
            Err(CompressorError::InvalidInput(msg)) => assert!(msg.starts_with("entry 1")),
            other => panic!("expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_trailing_words_ignored() {
        let words = [5, 0, 1, 1, 0x1, 0xFFFF_FFFF, 0x1, 0x0, 0xDEAD];
        let buf = TableBuffer::from_words(&words).unwrap();
        assert_eq!(buf.table_size(), 1);
        assert!(buf.compress_as_much_as_possible);
    }
}
