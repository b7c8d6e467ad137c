//! Payment attempt tracking and the reconciliation poller.
//!
//! Initiating a mobile-money authorization hands control to a human with a phone: the remote authority will not
//! resolve the transaction until the buyer approves the PIN prompt, and it may never resolve at all. The poller
//! owns that wait. It probes a [`StatusSource`] on a fixed cadence and stops on `PAID`, `CANCELLED`, or a hard
//! wall-clock ceiling, whichever comes first. Transient probe failures are swallowed by design: a single failed
//! status check must not abort an in-progress payment wait.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use thiserror::Error;
use tokio::{sync::Mutex, task::JoinHandle};

use crate::types::{TransactionId, TransactionStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_POLL_CEILING: Duration = Duration::from_secs(300);

//--------------------------------------   PaymentAttempt    ---------------------------------------------------------
/// One attempt at authorizing a payment for a transaction.
///
/// `Pending` is entered only after the initiation call succeeded and the remote authority issued a checkout
/// reference. `Success` and `Failed` are terminal for the attempt; a fresh attempt starts from `Idle`, which is
/// reachable again only by an explicit [`PaymentAttempt::retry`] after a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PaymentAttempt {
    #[default]
    Idle,
    Pending {
        checkout_reference: String,
        started_at: DateTime<Utc>,
    },
    Success,
    Failed,
}

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("A payment attempt cannot start from the {0} state")]
    AlreadyStarted(String),
    #[error("Only a failed payment attempt can be retried")]
    NotRetryable,
    #[error("Received a poll outcome for an attempt that was not pending")]
    NotPending,
}

impl PaymentAttempt {
    /// Move `Idle -> Pending` after a successful initiation call.
    pub fn begin(&mut self, checkout_reference: String) -> Result<(), PaymentError> {
        match self {
            PaymentAttempt::Idle => {
                *self = PaymentAttempt::Pending { checkout_reference, started_at: Utc::now() };
                Ok(())
            },
            other => Err(PaymentError::AlreadyStarted(format!("{other:?}"))),
        }
    }

    /// Fold a poll outcome into the attempt.
    ///
    /// A `TimedOut` outcome deliberately leaves the attempt `Pending`: the payment may still land after the
    /// polling budget expires, and auto-failing it could contradict the remote authority. Callers surface the
    /// stalled wait to the user instead.
    pub fn resolve(&mut self, outcome: PollOutcome) -> Result<(), PaymentError> {
        match self {
            PaymentAttempt::Pending { .. } => {
                match outcome {
                    PollOutcome::Paid => *self = PaymentAttempt::Success,
                    PollOutcome::Cancelled => *self = PaymentAttempt::Failed,
                    PollOutcome::TimedOut => {},
                }
                Ok(())
            },
            _ => Err(PaymentError::NotPending),
        }
    }

    /// Explicit user retry: `Failed -> Idle`.
    pub fn retry(&mut self) -> Result<(), PaymentError> {
        match self {
            PaymentAttempt::Failed => {
                *self = PaymentAttempt::Idle;
                Ok(())
            },
            _ => Err(PaymentError::NotRetryable),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, PaymentAttempt::Pending { .. })
    }
}

//--------------------------------------    StatusSource     ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
#[error("Status probe failed: {0}")]
pub struct ProbeError(pub String);

/// The unauthenticated status probe the poller issues on every tick. Implemented by the HTTP client.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn check_status(&self, transaction_id: &TransactionId) -> Result<TransactionStatus, ProbeError>;
}

//--------------------------------------       Poller        ---------------------------------------------------------
/// How a polling run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The remote authority reported `PAID`.
    Paid,
    /// The remote authority reported `CANCELLED`.
    Cancelled,
    /// The hard ceiling elapsed without a resolution.
    TimedOut,
}

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Cadence between status probes.
    pub interval: Duration,
    /// Hard wall-clock budget for the whole run. Bounds resource use when the remote authority never resolves.
    pub ceiling: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval: DEFAULT_POLL_INTERVAL, ceiling: DEFAULT_POLL_CEILING }
    }
}

/// Handle to one polling run. `cancel` tears down the tick timer and the ceiling as one unit; both live inside a
/// single task so neither can leak on its own.
#[derive(Debug)]
pub struct PollHandle {
    transaction_id: TransactionId,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    /// Stop polling immediately. The resolve callback will not fire after this.
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Polls a [`StatusSource`] until a payment resolves or the budget runs out.
pub struct Poller<S> {
    source: Arc<S>,
    config: PollConfig,
}

impl<S> Clone for Poller<S> {
    fn clone(&self) -> Self {
        Self { source: Arc::clone(&self.source), config: self.config }
    }
}

impl<S> Poller<S>
where S: StatusSource + 'static
{
    pub fn new(source: Arc<S>) -> Self {
        Self { source, config: PollConfig::default() }
    }

    pub fn with_config(source: Arc<S>, config: PollConfig) -> Self {
        Self { source, config }
    }

    /// Start polling for `transaction_id`. The resolve callback fires exactly once, with the final outcome.
    ///
    /// Probe errors and unresolved statuses keep the run going; the run always ends by the configured ceiling.
    pub fn start<F>(&self, transaction_id: TransactionId, on_resolve: F) -> PollHandle
    where F: FnOnce(PollOutcome) + Send + 'static {
        let source = Arc::clone(&self.source);
        let PollConfig { interval, ceiling } = self.config;
        let id = transaction_id.clone();
        let task = tokio::spawn(async move {
            debug!("💳️ Started payment polling for [{id}]");
            let ceiling_timer = tokio::time::sleep(ceiling);
            tokio::pin!(ceiling_timer);
            let mut ticker = tokio::time::interval(interval);
            // An interval's first tick completes immediately; consume it so the first probe lands one full
            // cadence after initiation, as the payment prompt needs time to reach the buyer's phone.
            ticker.tick().await;
            let outcome = loop {
                tokio::select! {
                    _ = &mut ceiling_timer => {
                        warn!("💳️ Payment polling for [{id}] hit the {}s ceiling without resolving", ceiling.as_secs());
                        break PollOutcome::TimedOut;
                    },
                    _ = ticker.tick() => {
                        match source.check_status(&id).await {
                            Ok(TransactionStatus::Paid) => {
                                info!("💳️ Payment for [{id}] confirmed");
                                break PollOutcome::Paid;
                            },
                            Ok(TransactionStatus::Cancelled) => {
                                info!("💳️ Payment for [{id}] was cancelled");
                                break PollOutcome::Cancelled;
                            },
                            Ok(status) => {
                                trace!("💳️ [{id}] still unresolved (status: {status})");
                            },
                            Err(e) => {
                                // Polling is speculative; a failed probe is not a failed payment.
                                debug!("💳️ Swallowed transient probe error for [{id}]: {e}");
                            },
                        }
                    },
                }
            };
            on_resolve(outcome);
        });
        PollHandle { transaction_id, task }
    }
}

//--------------------------------------      PollerSet      ---------------------------------------------------------
/// Keeps at most one active polling run per transaction.
///
/// Starting a run for a transaction that already has one cancels the old run first, so two pollers can never race
/// each other for the same id.
#[derive(Default)]
pub struct PollerSet {
    active: Mutex<HashMap<TransactionId, PollHandle>>,
}

impl PollerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly started handle, cancelling any previous run for the same transaction.
    pub async fn replace(&self, handle: PollHandle) {
        let mut active = self.active.lock().await;
        if let Some(old) = active.insert(handle.transaction_id().clone(), handle) {
            if !old.is_finished() {
                debug!("💳️ Cancelling superseded poller for [{}]", old.transaction_id());
            }
            old.cancel();
        }
    }

    /// Cancel and forget the run for one transaction, e.g. when the user navigates away.
    pub async fn cancel(&self, transaction_id: &TransactionId) {
        if let Some(handle) = self.active.lock().await.remove(transaction_id) {
            handle.cancel();
        }
    }

    /// Component teardown: stop every active run.
    pub async fn cancel_all(&self) {
        let mut active = self.active.lock().await;
        for (_, handle) in active.drain() {
            handle.cancel();
        }
    }

    pub async fn is_polling(&self, transaction_id: &TransactionId) -> bool {
        self.active.lock().await.get(transaction_id).map(|h| !h.is_finished()).unwrap_or(false)
    }
}
