//! Concurrent search for the most bitfields a table can absorb.
//!
//! Folding more bitfields into a table makes it larger, so there is a
//! largest prefix of the bitfield list whose compressed table still fits.
//! [`BitFieldSearch`] finds it by binary search, running several
//! independent [`Compressor`]s per round on their own threads. Instances
//! share nothing but a results channel:
//!
//! - when an instance fits `k` bitfields, every running instance trying
//!   fewer than `k` is cancelled
//! - when an instance fails with `k`, every running instance trying more
//!   than `k` is cancelled
//!
//! # Examples
//!
//! ```
//! use routing_compressor::{BitFieldSearch, CompressorConfig, Entry, KeyAtomMap, TableBuffer};
//!
//! let buffer = TableBuffer::new(1, vec![Entry::new(0x100, 0xFFFF_FFF0, 0x40, 0)]);
//! let search = BitFieldSearch::new(CompressorConfig::new(4)).with_workers(2);
//! let result = search.run(&buffer, &[], &KeyAtomMap::new()).unwrap();
//! assert_eq!(result.bitfields_used, 0);
//! assert_eq!(result.entries.len(), 1);
//! ```

use crate::bitfield::{generate_table, BitFieldBuffer, KeyAtomMap};
use crate::buffer::TableBuffer;
use crate::config::CompressorConfig;
use crate::control::ControlFlags;
use crate::error::{CompressorError, Result};
use crate::orchestrator::{Compressor, FailReason, Outcome};
use crate::pool::MemoryPool;
use crate::sink::RouterCam;
use crate::table::Entry;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Best table found by a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    /// Leading bitfields folded into `entries`.
    pub bitfields_used: usize,
    pub entries: Vec<Entry>,
}

/// Result of one instance.
struct Report {
    k: usize,
    outcome: Result<Outcome>,
    entries: Vec<Entry>,
}

/// Binary search over bitfield prefixes.
#[derive(Debug, Clone)]
pub struct BitFieldSearch {
    config: CompressorConfig,
    workers: usize,
    control: Arc<ControlFlags>,
}

impl BitFieldSearch {
    pub fn new(config: CompressorConfig) -> Self {
        Self {
            config,
            workers: 1,
            control: Arc::new(ControlFlags::new()),
        }
    }

    /// Run up to `n` instances at a time.
    pub fn with_workers(mut self, n: usize) -> Self {
        self.workers = n.max(1);
        self
    }

    /// Flags cancelling the whole search.
    pub fn with_control(mut self, control: Arc<ControlFlags>) -> Self {
        self.control = control;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Find the largest `k` such that the table with the first `k`
    /// bitfields folded in compresses to `config.target_length` entries.
    ///
    /// # Errors
    ///
    /// If even the table without bitfields does not fit, the failure of
    /// that instance is returned as an error.
    pub fn run(
        &self,
        buffer: &TableBuffer,
        bitfields: &[BitFieldBuffer],
        atoms: &KeyAtomMap,
    ) -> Result<SearchResult> {
        self.config.validate()?;

        // Invariant: every k <= lo fits (if lo >= 0), every k >= hi does not.
        let mut lo: i64 = -1;
        let mut hi: i64 = bitfields.len() as i64 + 1;
        let mut best: Option<SearchResult> = None;
        let mut base_failure: Option<FailReason> = None;

        while hi - lo > 1 {
            self.control.poll()?;
            let candidates = candidates(lo, hi, self.workers);
            log::debug!("search round: lo={} hi={} trying {:?}", lo, hi, candidates);

            let mut running: Vec<(usize, Arc<ControlFlags>)> = candidates
                .iter()
                .map(|&k| (k, Arc::new(ControlFlags::new())))
                .collect();

            let mut fatal = None;
            thread::scope(|s| {
                let (tx, rx) = mpsc::channel::<Report>();
                for (k, flags) in &running {
                    let tx = tx.clone();
                    let k = *k;
                    let flags = Arc::clone(flags);
                    let config = self.config.clone();
                    s.spawn(move || {
                        let report = run_instance(config, flags, buffer, &bitfields[..k], atoms, k);
                        let _ = tx.send(report);
                    });
                }
                drop(tx);

                loop {
                    if self.control.is_cancelled() || self.control.is_timed_out() {
                        running.iter().for_each(|(_, f)| f.cancel());
                    }
                    let report = match rx.recv_timeout(POLL_INTERVAL) {
                        Ok(report) => report,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };
                    running.retain(|(k, _)| *k != report.k);
                    let k = report.k as i64;

                    match report.outcome {
                        Ok(Outcome::Success { .. }) => {
                            log::debug!("{} bitfields fit", k);
                            if k > lo {
                                lo = k;
                                best = Some(SearchResult {
                                    bitfields_used: report.k,
                                    entries: report.entries,
                                });
                            }
                            running
                                .iter()
                                .filter(|(other, _)| (*other as i64) < k)
                                .for_each(|(_, f)| f.cancel());
                        }
                        Ok(Outcome::Fail(FailReason::Aborted)) => {}
                        Ok(Outcome::Fail(reason)) => {
                            log::debug!("{} bitfields failed: {:?}", k, reason);
                            if k == 0 {
                                base_failure = Some(reason);
                            }
                            hi = hi.min(k);
                            running
                                .iter()
                                .filter(|(other, _)| (*other as i64) > k)
                                .for_each(|(_, f)| f.cancel());
                        }
                        Err(e) => {
                            running.iter().for_each(|(_, f)| f.cancel());
                            fatal.get_or_insert(e);
                        }
                    }
                }
            });

            if let Some(e) = fatal {
                return Err(e);
            }
        }

        match best {
            Some(result) => {
                log::info!(
                    "using {} of {} bitfields, {} entries",
                    result.bitfields_used,
                    bitfields.len(),
                    result.entries.len()
                );
                Ok(result)
            }
            None => {
                self.control.poll()?;
                Err(base_failure
                    .unwrap_or(FailReason::Aborted)
                    .to_error(self.config.target_length))
            }
        }
    }
}

/// Up to `workers` distinct values strictly between `lo` and `hi`, spread
/// evenly.
fn candidates(lo: i64, hi: i64, workers: usize) -> Vec<usize> {
    let span = hi - lo - 1;
    if span <= workers as i64 {
        return (lo + 1..hi).map(|k| k as usize).collect();
    }
    let mut ks: Vec<usize> = (1..=workers as i64)
        .map(|i| (lo + i * (span + 1) / (workers as i64 + 1)) as usize)
        .collect();
    ks.dedup();
    ks
}

fn run_instance(
    config: CompressorConfig,
    flags: Arc<ControlFlags>,
    buffer: &TableBuffer,
    bitfields: &[BitFieldBuffer],
    atoms: &KeyAtomMap,
    k: usize,
) -> Report {
    let pool = MemoryPool::with_limit(config.memory_limit);
    let table = match generate_table(&buffer.entries, bitfields, atoms, &pool) {
        Ok(table) => table,
        Err(CompressorError::OutOfMemory { .. }) => {
            return Report {
                k,
                outcome: Ok(Outcome::Fail(FailReason::Malloc)),
                entries: Vec::new(),
            }
        }
        Err(e) => {
            return Report {
                k,
                outcome: Err(e),
                entries: Vec::new(),
            }
        }
    };

    let input = TableBuffer {
        entries: table.into_entries(),
        ..buffer.clone()
    };
    let sink = RouterCam::new(config.target_length);
    let mut compressor = Compressor::new(config, sink)
        .with_pool(pool)
        .with_control(flags);
    let outcome = compressor.run(&input);
    let entries = compressor.into_sink().into_entries();
    Report {
        k,
        outcome,
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates() {
        assert_eq!(candidates(-1, 3, 8), vec![0, 1, 2]);
        assert_eq!(candidates(-1, 11, 1), vec![5]);
        assert_eq!(candidates(-1, 11, 3), vec![2, 5, 8]);
        assert!(candidates(4, 5, 2).is_empty());
    }

    #[test]
    fn test_candidates_progress() {
        for lo in -1..10i64 {
            for hi in lo + 2..14 {
                for w in 1..5 {
                    let ks = candidates(lo, hi, w);
                    assert!(!ks.is_empty());
                    assert!(ks.iter().all(|&k| (k as i64) > lo && (k as i64) < hi));
                }
            }
        }
    }
}
