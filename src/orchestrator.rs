//! Compression orchestration.
//!
//! A [`Compressor`] drives one table through the phases
//!
//! ```text
//! Idle -> ReadTable -> [LoadAsIs] -> ElideDefaults -> [LoadAfterElision]
//!      -> OrderedCovering -> FinalLoad -> Done
//! ```
//!
//! The bracketed phases run only when the table asks to be compressed only
//! when needed; a successful load there ends the run early. Every run ends
//! in exactly one [`Outcome`].
//!
//! # Examples
//!
//! ```
//! use routing_compressor::{Compressor, CompressorConfig, Entry, Outcome, RouterCam, TableBuffer};
//!
//! let entries = (0..4).map(|k| Entry::new(k, 0xFFFF_FFFF, 0x80, 0)).collect();
//! let buffer = TableBuffer::new(1, entries);
//!
//! let mut compressor = Compressor::new(CompressorConfig::new(2), RouterCam::new(2));
//! let outcome = compressor.run(&buffer).unwrap();
//! assert_eq!(outcome, Outcome::Success { final_size: 1 });
//! assert_eq!(outcome.status_code(), 0);
//! ```

use crate::alias::AliasMap;
use crate::buffer::TableBuffer;
use crate::config::CompressorConfig;
use crate::control::{ControlFlags, DeadlineTimer};
use crate::default_routes::elide_default_routes;
use crate::error::{CompressorError, Result};
use crate::ordered_covering::{OrderedCovering, Termination};
use crate::pool::MemoryPool;
use crate::sink::RouterSink;
use crate::table::{Entry, RoutingTable, TableStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Where a [`Compressor`] is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    ReadTable,
    LoadAsIs,
    ElideDefaults,
    LoadAfterElision,
    OrderedCovering,
    FinalLoad,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailReason {
    Malloc,
    Aborted,
    TimedOut,
    /// The table did not fit after the full algorithm ran.
    CapacityExceeded {
        original_size: usize,
        after_elision_size: usize,
        after_oc_size: usize,
    },
}

impl FailReason {
    /// Equivalent error for a router with `capacity` free slots.
    pub fn to_error(&self, capacity: usize) -> CompressorError {
        match *self {
            FailReason::Malloc => CompressorError::OutOfMemory {
                requested: 0,
                available: 0,
            },
            FailReason::Aborted => CompressorError::Aborted,
            FailReason::TimedOut => CompressorError::TimedOut,
            FailReason::CapacityExceeded { after_oc_size, .. } => {
                CompressorError::CapacityExceeded {
                    needed: after_oc_size,
                    available: capacity,
                }
            }
        }
    }
}

/// Terminal result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success { final_size: usize },
    Fail(FailReason),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// Status code reported back to the controller.
    pub fn status_code(&self) -> u32 {
        match self {
            Outcome::Success { .. } => 0,
            Outcome::Fail(FailReason::Malloc) => 1,
            Outcome::Fail(FailReason::Aborted) => 2,
            Outcome::Fail(FailReason::TimedOut) => 3,
            Outcome::Fail(FailReason::CapacityExceeded { .. }) => 4,
        }
    }
}

/// Counters from the most recent run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub original_size: usize,
    pub after_elision_size: usize,
    pub after_oc_size: usize,
    pub default_routes_elided: usize,
    pub merges_applied: usize,
    /// False if ordered covering stopped before reaching its target.
    pub target_reached: bool,
    pub peak_memory: usize,
}

/// Compresses routing tables and loads them into a [`RouterSink`].
#[derive(Debug)]
pub struct Compressor<S: RouterSink> {
    config: CompressorConfig,
    sink: S,
    pool: Arc<MemoryPool>,
    control: Arc<ControlFlags>,
    phase: Phase,
    diagnostics: Diagnostics,
}

impl<S: RouterSink> Compressor<S> {
    /// Compressor with a memory pool bounded by `config.memory_limit` and
    /// fresh control flags.
    pub fn new(config: CompressorConfig, sink: S) -> Self {
        let pool = MemoryPool::with_limit(config.memory_limit);
        Self {
            config,
            sink,
            pool,
            control: Arc::new(ControlFlags::new()),
            phase: Phase::Idle,
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn with_pool(mut self, pool: Arc<MemoryPool>) -> Self {
        self.pool = pool;
        self
    }

    /// Share control flags with a supervisor.
    pub fn with_control(mut self, control: Arc<ControlFlags>) -> Self {
        self.control = control;
        self
    }

    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }

    pub fn control(&self) -> &Arc<ControlFlags> {
        &self.control
    }

    pub fn pool(&self) -> &Arc<MemoryPool> {
        &self.pool
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Compress `buffer` and load the result.
    ///
    /// Cancellation is not reset between runs; a cancelled compressor
    /// stays cancelled until its flags are reset. When a time budget is
    /// configured the deadline flag is cleared and a fresh timer armed.
    ///
    /// # Errors
    ///
    /// Only errors that are not part of the [`Outcome`] taxonomy, such as
    /// `CorruptState`, are returned as `Err`.
    pub fn run(&mut self, buffer: &TableBuffer) -> Result<Outcome> {
        self.diagnostics = Diagnostics::default();
        self.phase = Phase::Idle;

        let _timer = self.config.time_budget().map(|budget| {
            self.control.clear_deadline();
            DeadlineTimer::arm(Arc::clone(&self.control), budget)
        });

        let result = self.compress(buffer);
        self.diagnostics.peak_memory = self.pool.peak();
        self.enter(Phase::Done);

        let outcome = match result {
            Ok(final_size) => Outcome::Success { final_size },
            Err(CompressorError::OutOfMemory { .. }) => Outcome::Fail(FailReason::Malloc),
            Err(CompressorError::Aborted) => Outcome::Fail(FailReason::Aborted),
            Err(CompressorError::TimedOut) => Outcome::Fail(FailReason::TimedOut),
            Err(CompressorError::CapacityExceeded { .. }) => {
                Outcome::Fail(FailReason::CapacityExceeded {
                    original_size: self.diagnostics.original_size,
                    after_elision_size: self.diagnostics.after_elision_size,
                    after_oc_size: self.diagnostics.after_oc_size,
                })
            }
            Err(e) => return Err(e),
        };

        match outcome {
            Outcome::Success { final_size } => log::info!(
                "app {}: loaded {} entries (from {})",
                buffer.app_id,
                final_size,
                self.diagnostics.original_size
            ),
            Outcome::Fail(reason) => log::warn!("app {}: compression failed: {:?}", buffer.app_id, reason),
        }
        Ok(outcome)
    }

    fn enter(&mut self, phase: Phase) {
        log::debug!("{} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// Try the sink; `Ok(false)` means the table did not fit.
    fn try_load(&mut self, table: &RoutingTable, app_id: u32) -> Result<bool> {
        match self.sink.load(table, app_id) {
            Ok(()) => Ok(true),
            Err(CompressorError::CapacityExceeded { needed, available }) => {
                log::debug!("{} entries do not fit in {}", needed, available);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn compress(&mut self, buffer: &TableBuffer) -> Result<usize> {
        self.enter(Phase::ReadTable);
        self.control.poll()?;
        let _storage = self
            .pool
            .lease(buffer.table_size() * std::mem::size_of::<Entry>())?;
        let mut table = buffer.to_table()?;
        self.diagnostics.original_size = table.len();

        if buffer.compress_only_when_needed {
            self.enter(Phase::LoadAsIs);
            if self.try_load(&table, buffer.app_id)? {
                return Ok(table.len());
            }
        }

        self.enter(Phase::ElideDefaults);
        self.control.poll()?;
        let elided = elide_default_routes(&mut table, &self.pool)?;
        self.diagnostics.default_routes_elided = elided.len();
        self.diagnostics.after_elision_size = table.len();

        if buffer.compress_only_when_needed {
            self.enter(Phase::LoadAfterElision);
            if self.try_load(&table, buffer.app_id)? {
                return Ok(table.len());
            }
        }

        self.enter(Phase::OrderedCovering);
        self.control.poll()?;
        let target_length = if buffer.compress_as_much_as_possible {
            0
        } else {
            self.config.target_length
        };

        let mut guards = Vec::new();
        guards.try_reserve_exact(elided.len())?;
        guards.extend(elided.iter().map(|e| e.key_mask));

        let mut aliases = AliasMap::new();
        let mut engine = OrderedCovering::new(Arc::clone(&self.pool), Arc::clone(&self.control))
            .with_guards(guards);
        let minimised = engine.minimise(&mut table, target_length, &mut aliases);
        self.diagnostics.merges_applied = engine.merges_applied();
        self.diagnostics.after_oc_size = table.len();
        let termination = minimised?;
        self.diagnostics.target_reached = termination == Termination::TargetReached;
        log::debug!(
            "ordered covering: {:?} after {} merges, {} entries",
            termination,
            engine.merges_applied(),
            table.len()
        );

        self.enter(Phase::FinalLoad);
        self.control.poll()?;
        self.sink.load(&table, buffer.app_id)?;
        Ok(table.len())
    }
}
