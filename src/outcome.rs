// Single-slot completion reporting.
//
// A background operation deposits exactly one terminal result; the caller
// takes it at most once. Taking blocks until the value exists. The slot is
// a capacity-one channel, so depositing never blocks the worker.

use std::fmt;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use crate::error::StreamError;

/// Terminal result of a background operation.
pub type OutcomeResult = Result<(), StreamError>;

/// Create a connected deposit/outcome pair.
pub fn slot() -> (Deposit, Outcome) {
    let (tx, rx) = channel::bounded(1);
    (Deposit { tx }, Outcome { rx })
}

/// The writing half of an outcome slot. Consumed by the single deposit.
pub struct Deposit {
    tx: Sender<OutcomeResult>,
}

impl Deposit {
    pub fn deposit(self, result: OutcomeResult) {
        // The caller may have dropped its `Outcome`; nobody is left to tell.
        if let Err(unclaimed) = self.tx.send(result) {
            if let Err(e) = unclaimed.into_inner() {
                log::debug!("outcome dropped unread: {e}");
            }
        }
    }
}

/// The reading half of an outcome slot.
pub struct Outcome {
    rx: Receiver<OutcomeResult>,
}

impl Outcome {
    /// An outcome that is already resolved.
    pub fn ready(result: OutcomeResult) -> Self {
        let (deposit, outcome) = slot();
        deposit.deposit(result);
        outcome
    }

    /// Block until the operation finished and return its result.
    ///
    /// If the worker went away without depositing (it panicked inside a
    /// transform), returns [`StreamError::Aborted`].
    pub fn wait(self) -> OutcomeResult {
        self.rx.recv().unwrap_or(Err(StreamError::Aborted))
    }

    /// Like [`wait`](Self::wait) but gives the slot back if nothing was
    /// deposited within `timeout`.
    pub fn wait_timeout(self, timeout: Duration) -> Result<OutcomeResult, Self> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Ok(result),
            Err(RecvTimeoutError::Disconnected) => Ok(Err(StreamError::Aborted)),
            Err(RecvTimeoutError::Timeout) => Err(self),
        }
    }

    /// Whether a result has been deposited.
    pub fn is_ready(&self) -> bool {
        !self.rx.is_empty()
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outcome")
            .field("ready", &self.is_ready())
            .finish()
    }
}
