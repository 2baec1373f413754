//! Cooperative cancellation and time budgets.
//!
//! Compression runs as a tight synchronous loop. A supervisor cancels it, or
//! a timer expires it, by setting one of two atomic flags in
//! [`ControlFlags`]; the loop polls them once per iteration and stops with
//! `Aborted` or `TimedOut`. Nothing is interrupted mid-merge.
//!
//! # Examples
//!
//! ```
//! use routing_compressor::{ControlFlags, CompressorError};
//! use std::sync::Arc;
//!
//! let flags = Arc::new(ControlFlags::new());
//! assert!(flags.poll().is_ok());
//!
//! flags.cancel();
//! assert!(matches!(flags.poll(), Err(CompressorError::Aborted)));
//! ```

use crate::error::{CompressorError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Pollable cancellation and deadline flags.
#[derive(Debug, Default)]
pub struct ControlFlags {
    cancelled: AtomicBool,
    deadline_exceeded: AtomicBool,
}

impl ControlFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Mark the time budget as exhausted.
    pub fn expire(&self) {
        self.deadline_exceeded.store(true, Ordering::Release);
    }

    /// Clear the deadline flag, leaving cancellation untouched.
    pub fn clear_deadline(&self) {
        self.deadline_exceeded.store(false, Ordering::Release);
    }

    /// Clear both flags.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
        self.deadline_exceeded.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_timed_out(&self) -> bool {
        self.deadline_exceeded.load(Ordering::Acquire)
    }

    /// Fail with `Aborted` or `TimedOut` if either flag is set.
    ///
    /// Cancellation wins when both are set.
    #[inline]
    pub fn poll(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(CompressorError::Aborted);
        }
        if self.is_timed_out() {
            return Err(CompressorError::TimedOut);
        }
        Ok(())
    }
}

/// Background timer that expires a [`ControlFlags`] after a budget.
///
/// Dropping the timer disarms it.
#[derive(Debug)]
pub struct DeadlineTimer {
    disarm: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DeadlineTimer {
    pub fn arm(flags: Arc<ControlFlags>, budget: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<()>();
        let handle = std::thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(budget) {
                log::debug!("time budget of {:?} exceeded", budget);
                flags.expire();
            }
        });
        Self {
            disarm: Some(tx),
            handle: Some(handle),
        }
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        // Closing the channel wakes the timer thread.
        self.disarm.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
