use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{TransactionId, TransactionStatus};

/// A push-style notification that an order's status changed on the remote authority.
///
/// Events carry only the delta; the reconciler overlays them onto a previously fetched snapshot. There is no
/// sequence number on the channel, so events are applied strictly in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdateEvent {
    pub order_id: TransactionId,
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
}
