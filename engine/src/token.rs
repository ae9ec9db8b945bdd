//! Run liveness token.
//!
//! A run is alive until its deadline passes or the engine records a stop
//! reason, whichever comes first. The first recorded reason wins and is
//! never overwritten, so an expired token can never come back to life; a new
//! run always gets a fresh token.
//!
//! Readers (`RunToken`) are cheap clones handed to every suspension point.
//! Only the engine holds a `TokenWriter`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::logger::TraceId;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Slot claimed and the page moved on to the next step.
    Completed,
    /// The run deadline passed.
    Timeout,
    /// An operator asked the engine to stop.
    Requested,
    /// A newer run replaced this one.
    Superseded,
    /// An unexpected page failure; the run was abandoned.
    Error(String),
}

impl StopReason {
    /// Short machine-readable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Completed => "done",
            StopReason::Timeout => "timeout",
            StopReason::Requested => "stopped",
            StopReason::Superseded => "superseded",
            StopReason::Error(_) => "error",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read side of a run's liveness.
#[derive(Clone, Debug)]
pub struct RunToken {
    run_id: TraceId,
    deadline: Instant,
    rx: watch::Receiver<Option<StopReason>>,
}

impl RunToken {
    pub fn run_id(&self) -> TraceId {
        self.run_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_live(&self) -> bool {
        self.reason().is_none()
    }

    /// The reason the run ended, or `None` while it is still live.
    /// An explicitly recorded reason takes precedence over the deadline.
    pub fn reason(&self) -> Option<StopReason> {
        if let Some(reason) = self.rx.borrow().clone() {
            return Some(reason);
        }
        (Instant::now() >= self.deadline).then_some(StopReason::Timeout)
    }

    /// Resolves once the run is no longer live.
    pub async fn expired(&self) -> StopReason {
        let mut rx = self.rx.clone();
        let deadline = sleep_until(self.deadline);
        tokio::pin!(deadline);

        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            tokio::select! {
                biased;
                changed = rx.changed() => {
                    if changed.is_err() {
                        // Writer gone without recording a reason.
                        return StopReason::Requested;
                    }
                }
                _ = &mut deadline => return StopReason::Timeout,
            }
        }
    }

    /// Runs `fut` until it completes or the token expires, whichever is
    /// first. On expiry the future is dropped at its current await point.
    pub async fn guard<F>(&self, fut: F) -> Result<F::Output, StopReason>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            reason = self.expired() => Err(reason),
            out = fut => Ok(out),
        }
    }
}

/// Write side. Held by the engine only.
#[derive(Clone, Debug)]
pub(crate) struct TokenWriter {
    tx: Arc<watch::Sender<Option<StopReason>>>,
}

impl TokenWriter {
    /// Records `reason` unless the run already ended. Returns whether this
    /// call was the one that ended it.
    pub(crate) fn expire(&self, reason: StopReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        })
    }
}

/// Creates the token pair for a new run with the given budget.
pub(crate) fn arm(run_id: TraceId, budget: Duration) -> (TokenWriter, RunToken) {
    let (tx, rx) = watch::channel(None);
    let token = RunToken {
        run_id,
        deadline: Instant::now() + budget,
        rx,
    };
    (TokenWriter { tx: Arc::new(tx) }, token)
}
