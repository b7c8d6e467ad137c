use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use escrow_common::{Money, KES_CURRENCY_CODE};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transaction id reserved for the offline preview fixture. Calls for this id must never reach the network.
pub const DEMO_TRANSACTION_ID: &str = "demo-transaction";

//--------------------------------------   TransactionId     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl From<String> for TransactionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TransactionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_demo(&self) -> bool {
        self.0 == DEMO_TRANSACTION_ID
    }
}

//--------------------------------------  TransactionStatus  ---------------------------------------------------------
/// The lifecycle states a transaction moves through, as reported by the remote authority.
///
/// The remote authority is the source of truth; this enum only validates what it sends. A status string outside the
/// enumeration deserializes to [`TransactionStatus::Unknown`] rather than failing the whole payload: consumers are
/// expected to render a neutral fallback for it, and the permitted-action derivation returns nothing for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Newly created, awaiting payment.
    Pending,
    /// A payment authorization is in flight.
    Processing,
    /// Funds are held in escrow.
    Paid,
    /// The seller has accepted the order.
    Accepted,
    /// The seller has handed the item to a courier.
    Shipped,
    /// The courier has delivered the item.
    Delivered,
    /// The buyer has confirmed receipt.
    Confirmed,
    /// Funds released to the seller. Terminal.
    Completed,
    /// Abandoned before funds were held. Terminal.
    Cancelled,
    /// Either party raised a dispute while funds were in escrow.
    Disputed,
    /// Funds returned to the buyer by an administrator. Terminal.
    Refunded,
    /// Any status string this client does not recognise.
    #[serde(other)]
    Unknown,
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Processing => "PROCESSING",
            TransactionStatus::Paid => "PAID",
            TransactionStatus::Accepted => "ACCEPTED",
            TransactionStatus::Shipped => "SHIPPED",
            TransactionStatus::Delivered => "DELIVERED",
            TransactionStatus::Confirmed => "CONFIRMED",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Cancelled => "CANCELLED",
            TransactionStatus::Disputed => "DISPUTED",
            TransactionStatus::Refunded => "REFUNDED",
            TransactionStatus::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid transaction status: {0}")]
pub struct StatusConversionError(String);

impl FromStr for TransactionStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "PAID" => Ok(Self::Paid),
            "ACCEPTED" => Ok(Self::Accepted),
            "SHIPPED" => Ok(Self::Shipped),
            "DELIVERED" => Ok(Self::Delivered),
            "CONFIRMED" => Ok(Self::Confirmed),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            "DISPUTED" => Ok(Self::Disputed),
            "REFUNDED" => Ok(Self::Refunded),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

impl From<String> for TransactionStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            warn!("🧾️ Remote authority sent an unrecognised transaction status: {value}");
            TransactionStatus::Unknown
        })
    }
}

//--------------------------------------    Counterparty     ---------------------------------------------------------
/// Buyer or seller identity as embedded in a transaction snapshot. Read-only from the engine's perspective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    pub name: String,
    pub phone: String,
}

//--------------------------------------     Transaction     ---------------------------------------------------------
/// Full transaction snapshot as returned by `GET /api/v1/transactions/:id`.
///
/// Milestone timestamps (`paid_at`, `shipped_at`, `delivered_at`) are set only by the remote authority and are
/// monotonically non-decreasing as the lifecycle advances.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub status: TransactionStatus,
    pub amount: Money,
    pub currency: String,
    pub item_name: String,
    #[serde(default)]
    pub item_description: Option<String>,
    #[serde(default)]
    pub item_images: Vec<String>,
    pub seller_id: String,
    #[serde(default)]
    pub buyer_id: Option<String>,
    #[serde(default)]
    pub buyer_phone: Option<String>,
    #[serde(default)]
    pub buyer_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub courier_name: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub delivery_proof_urls: Vec<String>,
    #[serde(default)]
    pub seller: Option<Counterparty>,
}

impl Transaction {
    /// The offline preview fixture used when a caller asks for [`DEMO_TRANSACTION_ID`].
    pub fn demo() -> Self {
        Self {
            id: TransactionId::from(DEMO_TRANSACTION_ID),
            status: TransactionStatus::Pending,
            amount: Money::try_from(5000i64).unwrap_or_default(),
            currency: KES_CURRENCY_CODE.to_string(),
            item_name: "iPhone 13 Pro Max".to_string(),
            item_description: Some("Brand new, sealed in box. 256GB Sierra Blue.".to_string()),
            item_images: Vec::new(),
            seller_id: "demo-seller".to_string(),
            buyer_id: None,
            buyer_phone: None,
            buyer_name: None,
            created_at: None,
            expires_at: Some(Utc::now() + Duration::days(7)),
            paid_at: None,
            shipped_at: None,
            delivered_at: None,
            courier_name: None,
            tracking_number: None,
            delivery_proof_urls: Vec::new(),
            seller: Some(Counterparty { name: "Demo Seller".to_string(), phone: "+254712345678".to_string() }),
        }
    }
}

//--------------------------------------    OrderSummary     ---------------------------------------------------------
/// A row in a buyer or seller order listing. This is the shape the live-update reconciler caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: TransactionId,
    pub item_name: String,
    pub amount: Money,
    pub status: TransactionStatus,
    #[serde(default)]
    pub seller: Option<Counterparty>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
