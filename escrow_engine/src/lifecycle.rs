//! The transaction lifecycle state machine.
//!
//! The remote authority owns the actual state; this module encodes which of its moves the client recognises as
//! valid, and derives the set of next-step affordances a given status permits. Every consumer that needs to know
//! "can the buyer pay right now?" or "should the shipping form appear?" asks this module instead of re-implementing
//! status-set membership checks at the call site.

use crate::types::TransactionStatus;

/// The next-step affordances a transaction status allows.
///
/// The names describe which external collaborator (payment widget, seller forms, buyer confirmation) becomes
/// relevant; rendering them is out of scope here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermittedAction {
    /// The buyer may initiate a mobile-money payment.
    ShowPaymentWidget,
    /// The seller must accept or reject the paid order.
    ShowSellerAcceptOrReject,
    /// The seller may capture or amend shipping details.
    ShowShippingEntry,
    /// The buyer may confirm delivery and release funds.
    ShowBuyerConfirmation,
}

/// Derive the permitted actions for a status. Pure, no I/O, and the single source of truth for affordance checks.
///
/// Unrecognised statuses (and every status not listed) yield the empty set; callers render a neutral fallback.
pub const fn permitted_actions(status: TransactionStatus) -> &'static [PermittedAction] {
    use TransactionStatus::*;
    match status {
        Pending | Processing => &[PermittedAction::ShowPaymentWidget],
        Paid => &[PermittedAction::ShowSellerAcceptOrReject],
        Accepted | Shipped => &[PermittedAction::ShowShippingEntry],
        Delivered => &[PermittedAction::ShowBuyerConfirmation],
        _ => &[],
    }
}

impl TransactionStatus {
    /// Whether the remote authority may legally move a transaction from `self` to `next`.
    ///
    /// The forward chain is strict (each state is reachable only from its immediate predecessor), with three side
    /// exits:
    ///
    /// | From                                | To          |
    /// |-------------------------------------|-------------|
    /// | `PENDING`, `PROCESSING`             | `CANCELLED` |
    /// | `PAID` ..= `DELIVERED`              | `DISPUTED`  |
    /// | `COMPLETED`, `DISPUTED`             | `REFUNDED`  |
    ///
    /// The `REFUNDED` exit is administrative only. `CANCELLED`, `COMPLETED` and `REFUNDED` are terminal, and
    /// `UNKNOWN` can be neither entered nor left.
    pub const fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Paid)
                | (Paid, Accepted)
                | (Accepted, Shipped)
                | (Shipped, Delivered)
                | (Delivered, Confirmed)
                | (Confirmed, Completed)
                | (Pending | Processing, Cancelled)
                | (Paid | Accepted | Shipped | Delivered, Disputed)
                | (Completed | Disputed, Refunded)
        )
    }

    /// Terminal states admit no further transitions.
    pub const fn is_terminal(self) -> bool {
        use TransactionStatus::*;
        matches!(self, Cancelled | Completed | Refunded)
    }

    pub fn allows(self, action: PermittedAction) -> bool {
        permitted_actions(self).contains(&action)
    }
}
