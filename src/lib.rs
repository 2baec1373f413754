//! Routing Compressor - Ordered-Covering Minimisation of Multicast Routing Tables
//!
//! A multicast router matches each packet's 32-bit routing key against a
//! table of ternary patterns and forwards it along the route of the first
//! matching entry. Router tables are small, so large tables must be
//! compressed before they fit. This crate does that without changing where
//! any packet goes.
//!
//! # Key Characteristics
//!
//! - Ternary `0`/`1`/`X` key-masks with bitwise merge and intersection
//! - Default-route elision for entries the router would handle anyway
//! - Greedy ordered-covering minimisation with up- and down-checks
//! - Fallible allocation through a bounded [`MemoryPool`]
//! - Cooperative cancellation and time budgets
//!
//! # Architecture
//!
//! - **KeyMask / Entry**: routing patterns and table entries
//! - **TableStore**: the table interface the engine works against, with a
//!   contiguous [`RoutingTable`] and a multi-chunk [`ChunkedTable`]
//! - **OrderedCovering**: the minimisation engine, with [`Merge`],
//!   [`BitSet`] and [`AliasMap`] bookkeeping
//! - **Compressor**: drives a table from input buffer to [`RouterSink`]
//! - **BitFieldSearch**: folds per-processor bitfields into a table, running
//!   several compressors concurrently to find how many fit
//!
//! # Examples
//!
//! ## Merging key-masks
//!
//! ```
//! use routing_compressor::KeyMask;
//!
//! let a = KeyMask::exact(0b000);
//! let b = KeyMask::exact(0b011);
//!
//! let merged = a.merge(&b);
//! assert_eq!(merged, KeyMask::new(0b000, 0xFFFF_FFFC));
//! assert_eq!(merged.count_xs(), 2);
//! assert!(merged.intersects(&a));
//! ```
//!
//! ## Minimising a table
//!
//! ```
//! use routing_compressor::{
//!     AliasMap, ControlFlags, Entry, MemoryPool, OrderedCovering, RoutingTable, TableStore,
//!     Termination,
//! };
//! use std::sync::Arc;
//!
//! let mut table = RoutingTable::from_entries(
//!     (0..4).map(|k| Entry::new(k, 0b111, 0x1, 0)).collect(),
//! );
//! let mut aliases = AliasMap::new();
//! let mut engine = OrderedCovering::new(MemoryPool::unbounded(), Arc::new(ControlFlags::new()));
//!
//! let done = engine.minimise(&mut table, 1, &mut aliases).unwrap();
//! assert_eq!(done, Termination::TargetReached);
//! assert_eq!(table.len(), 1);
//! assert_eq!(table.get(0).key_mask.mask, 0b100);
//! ```
//!
//! # Logging
//!
//! The crate logs through the [`log`] facade and never installs a logger.
//! Phase transitions and elision counts are at `debug`, individual merges at
//! `trace`, and run outcomes at `info` or `warn`.

pub mod alias;
pub mod bitfield;
pub mod bitset;
pub mod buffer;
pub mod config;
pub mod control;
pub mod default_routes;
pub mod error;
pub mod key_mask;
pub mod merge;
pub mod ordered_covering;
pub mod orchestrator;
pub mod pool;
pub mod search;
pub mod sink;
pub mod table;
pub mod utils;

// Re-exports for convenient access
pub use alias::{Alias, AliasList, AliasMap};
pub use bitfield::{generate_table, processor_bit, BitFieldBuffer, KeyAtomMap};
pub use bitset::{BitSet, Word, BITS_PER_WORD};
pub use buffer::TableBuffer;
pub use config::{CompressorConfig, DEFAULT_TARGET_LENGTH};
pub use control::{ControlFlags, DeadlineTimer};
pub use default_routes::{elide_default_routes, is_default_route, opposite_link};
pub use error::{CompressorError, Result};
pub use key_mask::KeyMask;
pub use merge::Merge;
pub use ordered_covering::{OrderedCovering, Termination};
pub use orchestrator::{Compressor, Diagnostics, FailReason, Outcome, Phase};
pub use pool::{Lease, MemoryPool};
pub use search::{BitFieldSearch, SearchResult};
pub use sink::{RouterCam, RouterSink};
pub use table::{ChunkedTable, Entry, RoutingTable, TableStore, LINK_MASK, N_LINKS};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "Routing Compressor";

/// Get version string
pub fn version() -> String {
    format!("{} v{}", NAME, VERSION)
}
