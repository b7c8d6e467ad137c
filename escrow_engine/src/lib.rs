//! Escrow Client Engine
//!
//! The engine keeps a client-held view of escrow transactions synchronized with the remote authority that owns the
//! actual state machine. It is transport-agnostic: nothing in this crate performs network I/O. The pieces are:
//!
//! 1. The transaction data model and lifecycle state machine ([`mod@types`] and [`mod@lifecycle`]). Status strings
//!    received from the remote authority are validated here, and the permitted-action derivation in `lifecycle` is
//!    the single source of truth for which affordances a transaction currently allows.
//! 2. The payment reconciliation poller ([`mod@payment`]). After a mobile-money authorization is initiated, the
//!    poller probes a [`StatusSource`] on a fixed cadence until the payment resolves or a hard ceiling is reached.
//! 3. The live-update reconciler ([`mod@live`]). Out-of-band status updates are folded into a cached order
//!    collection, with a transient "recently changed" marker that decays on its own after a fixed window.
//!
//! Callers wire a concrete HTTP client in by implementing [`StatusSource`] and by feeding
//! [`events::OrderUpdateEvent`]s into an [`OrderCache`].

pub mod events;
pub mod lifecycle;
pub mod live;
pub mod payment;
pub mod types;

pub use lifecycle::{permitted_actions, PermittedAction};
pub use live::{CachedOrder, OrderCache};
pub use payment::{
    PaymentAttempt,
    PaymentError,
    PollConfig,
    PollHandle,
    PollOutcome,
    Poller,
    PollerSet,
    ProbeError,
    StatusSource,
};
pub use types::{Counterparty, OrderSummary, Transaction, TransactionId, TransactionStatus, DEMO_TRANSACTION_ID};
