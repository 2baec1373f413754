//! Router-programming sinks.
//!
//! The final table is handed to a [`RouterSink`], which is the authority on
//! whether it fits. [`RouterCam`] is an in-memory router with a fixed number
//! of entry slots.

use crate::error::{CompressorError, Result};
use crate::table::{Entry, TableStore};

/// Destination for a finished routing table.
pub trait RouterSink {
    /// Entry slots available for a table.
    fn capacity(&self) -> usize;

    /// Load `table` for application `app_id`.
    ///
    /// Fails with `CapacityExceeded` if the table does not fit, in which case
    /// the router is left unchanged.
    fn load<T: TableStore>(&mut self, table: &T, app_id: u32) -> Result<()>;
}

/// In-memory router entry store.
#[derive(Debug, Clone, Default)]
pub struct RouterCam {
    size: usize,
    reserved: usize,
    entries: Vec<Entry>,
    app_id: Option<u32>,
    loads: usize,
}

impl RouterCam {
    /// Router with `size` entry slots.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    /// Keep `reserved` slots back for other applications.
    pub fn with_reserved(mut self, reserved: usize) -> Self {
        self.reserved = reserved;
        self
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }

    /// Application owning the loaded entries.
    pub fn app_id(&self) -> Option<u32> {
        self.app_id
    }

    /// Number of successful loads.
    pub fn loads(&self) -> usize {
        self.loads
    }

    pub fn is_loaded(&self) -> bool {
        self.app_id.is_some()
    }

    /// First-match route lookup over the loaded entries.
    pub fn route(&self, key: u32) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.key_mask.matches(key))
            .map(|e| e.route)
    }
}

impl RouterSink for RouterCam {
    fn capacity(&self) -> usize {
        self.size.saturating_sub(self.reserved)
    }

    fn load<T: TableStore>(&mut self, table: &T, app_id: u32) -> Result<()> {
        if table.len() > self.capacity() {
            return Err(CompressorError::CapacityExceeded {
                needed: table.len(),
                available: self.capacity(),
            });
        }
        self.entries = table.to_vec()?;
        self.app_id = Some(app_id);
        self.loads += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::RoutingTable;

    fn table(n: u32) -> RoutingTable {
        RoutingTable::from_entries((0..n).map(|k| Entry::new(k, 0xFFFF_FFFF, 1 << (k % 6), 0)).collect())
    }

    #[test]
    fn test_load_fits() {
        let mut cam = RouterCam::new(4);
        cam.load(&table(4), 7).unwrap();
        assert_eq!(cam.entries().len(), 4);
        assert_eq!(cam.app_id(), Some(7));
        assert_eq!(cam.route(2), Some(1 << 2));
        assert_eq!(cam.route(9), None);
    }

    #[test]
    fn test_load_too_big() {
        let mut cam = RouterCam::new(4).with_reserved(1);
        assert_eq!(cam.capacity(), 3);
        match cam.load(&table(4), 1) {
            Err(CompressorError::CapacityExceeded { needed, available }) => {
                assert_eq!(needed, 4);
                assert_eq!(available, 3);
            }
            other => panic!("expected CapacityExceeded, got {:?}", other),
        }
        assert!(!cam.is_loaded());
        assert_eq!(cam.loads(), 0);
    }
}
