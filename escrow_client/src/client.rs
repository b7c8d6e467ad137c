//! The typed endpoint surface.
//!
//! [`EscrowClient`] turns the remote authority's REST endpoints into typed calls. Authentication state is delegated
//! to the session manager; lifecycle rules are enforced client-side before a request is even issued, so a caller
//! cannot, say, initiate payment on a shipped transaction and burn a round trip on a guaranteed refusal.
//!
//! The reserved id `demo-transaction` is answered locally from a fixture and never reaches the network.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use escrow_common::{helpers::normalize_msisdn, Money};
use escrow_engine::{
    lifecycle::PermittedAction,
    payment::{ProbeError, StatusSource},
    types::{OrderSummary, Transaction, TransactionId, TransactionStatus},
};
use log::*;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::{
    errors::ClientError,
    session::SessionManager,
    store::{CredentialStore, FileCredentialStore, MemoryCredentialStore},
    transport::{Backend, HttpTransport, Reply, Request},
};

//--------------------------------------   Request payloads   --------------------------------------------------------
/// What a one-time password is being requested for. The server words the SMS accordingly and refuses `LOGIN`
/// OTPs for unregistered numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    Login,
    Registration,
}

impl OtpPurpose {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Login => "LOGIN",
            OtpPurpose::Registration => "REGISTRATION",
        }
    }
}

/// Fields for creating a new escrow transaction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub item_name: String,
    pub amount: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Courier details the seller submits once the item is handed over.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
    pub courier_name: String,
    pub tracking_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_delivery_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

//--------------------------------------  Response payloads   --------------------------------------------------------
#[derive(Deserialize)]
struct AuthPayload {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
    #[serde(default)]
    user: Option<Value>,
}

#[derive(Deserialize)]
struct StkPushPayload {
    /// The reference the mobile-money provider assigns to the in-flight authorization.
    #[serde(rename = "checkoutRequestID")]
    checkout_request_id: String,
}

#[derive(Deserialize)]
struct StatusPayload {
    status: TransactionStatus,
}

/// A buyer-side dispute row, one per transaction that entered `DISPUTED`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeSummary {
    pub id: String,
    pub transaction_id: TransactionId,
    pub status: String,
    pub reason: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Escrow balance roll-up for the buyer dashboard.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSummary {
    pub available_balance: Money,
    pub pending_balance: Money,
    pub total_spent: Money,
    pub total_transactions: u64,
}

/// Order listings arrive either as a bare array or wrapped in an `orders` field, depending on the endpoint
/// revision. Accept both.
#[derive(Deserialize)]
#[serde(untagged)]
enum OrderListing {
    Bare(Vec<OrderSummary>),
    Wrapped { orders: Vec<OrderSummary> },
}

impl OrderListing {
    fn into_orders(self) -> Vec<OrderSummary> {
        match self {
            OrderListing::Bare(orders) | OrderListing::Wrapped { orders } => orders,
        }
    }
}

/// Dispute listings use the same two wire shapes as order listings.
#[derive(Deserialize)]
#[serde(untagged)]
enum DisputeListing {
    Bare(Vec<DisputeSummary>),
    Wrapped { disputes: Vec<DisputeSummary> },
}

impl DisputeListing {
    fn into_disputes(self) -> Vec<DisputeSummary> {
        match self {
            DisputeListing::Bare(disputes) | DisputeListing::Wrapped { disputes } => disputes,
        }
    }
}

//--------------------------------------     EscrowClient     --------------------------------------------------------
pub struct EscrowClient<B, C> {
    session: SessionManager<B, C>,
}

impl EscrowClient<HttpTransport, FileCredentialStore> {
    /// Production client: HTTP transport against `base_url`, credentials in the home-directory store.
    pub fn connect(base_url: Url) -> std::io::Result<Self> {
        let store = FileCredentialStore::new()?;
        Ok(Self { session: SessionManager::new(HttpTransport::new(base_url), store) })
    }

    /// Like [`EscrowClient::connect`], but with the transport configured from `ESCROW_*` environment variables.
    pub fn from_env() -> std::io::Result<Self> {
        let store = FileCredentialStore::new()?;
        Ok(Self { session: SessionManager::new(HttpTransport::from_env(), store) })
    }
}

impl Default for EscrowClient<HttpTransport, MemoryCredentialStore> {
    /// Ephemeral client against the development backend. Nothing persists between runs.
    fn default() -> Self {
        Self::with_parts(HttpTransport::default(), MemoryCredentialStore::new())
    }
}

impl<B, C> EscrowClient<B, C>
where
    B: Backend,
    C: CredentialStore,
{
    pub fn with_parts(backend: B, store: C) -> Self {
        Self { session: SessionManager::new(backend, store) }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    //----------------------------------      Authentication      ----------------------------------------------------

    /// Ask the remote authority to text a one-time password to `phone`.
    pub async fn request_otp(&self, phone: &str, purpose: OtpPurpose) -> Result<(), ClientError> {
        let msisdn = normalize_msisdn(phone).map_err(|e| ClientError::InvalidInput(e.to_string()))?;
        let body = json!({ "phone": msisdn, "purpose": purpose.as_str() });
        accept(self.session.send(Request::post("/api/v1/auth/otp/request", body)).await?)
    }

    /// Exchange a phone number and OTP for a session. On success the token pair and profile are persisted as a unit.
    pub async fn login(&self, phone: &str, otp: &str) -> Result<(), ClientError> {
        let msisdn = normalize_msisdn(phone).map_err(|e| ClientError::InvalidInput(e.to_string()))?;
        let request = Request::post("/api/v1/auth/login", json!({ "phone": msisdn, "otp": otp }));
        let auth: AuthPayload = decode(self.session.send(request).await?)?;
        info!("🔑️ Logged in");
        self.establish(auth);
        Ok(())
    }

    /// Create an account and log straight in.
    pub async fn register(&self, phone: &str, name: &str, otp: &str) -> Result<(), ClientError> {
        let msisdn = normalize_msisdn(phone).map_err(|e| ClientError::InvalidInput(e.to_string()))?;
        let body = json!({ "phone": msisdn, "name": name, "otp": otp });
        let request = Request::post("/api/v1/auth/register", body);
        let auth: AuthPayload = decode(self.session.send(request).await?)?;
        info!("🔑️ Registered and logged in");
        self.establish(auth);
        Ok(())
    }

    /// End the session. The local session is destroyed even if the server-side revocation fails; a client that
    /// cannot reach the backend must still be able to log out.
    pub async fn logout(&self) {
        if let Some(refresh) = self.session.refresh_token() {
            let request = Request::post("/api/v1/auth/logout", json!({ "refreshToken": refresh }));
            if let Err(e) = self.session.send(request).await {
                warn!("🔑️ Server-side logout failed, destroying the local session anyway: {e}");
            }
        }
        self.session.destroy();
        info!("🔑️ Logged out");
    }

    /// The authenticated user's profile, as an opaque blob the server owns the shape of.
    pub async fn profile(&self) -> Result<Value, ClientError> {
        decode(self.session.authorized_send(Request::get("/api/v1/auth/profile")).await?)
    }

    //----------------------------------       Transactions       ----------------------------------------------------

    pub async fn create_transaction(&self, new: &NewTransaction) -> Result<Transaction, ClientError> {
        let body = serde_json::to_value(new).map_err(|e| ClientError::InvalidInput(e.to_string()))?;
        let request = Request::post("/api/v1/transactions", body);
        decode(self.session.authorized_send(request).await?)
    }

    /// Fetch one transaction snapshot. The endpoint is unauthenticated so a buyer can open a payment link without
    /// an account. The demo id is answered from the local fixture without touching the network.
    pub async fn transaction(&self, id: &TransactionId) -> Result<Transaction, ClientError> {
        if id.is_demo() {
            debug!("🧾️ Serving the demo transaction fixture for [{id}]");
            return Ok(Transaction::demo());
        }
        let request = Request::get(format!("/api/v1/transactions/{id}"));
        decode(self.session.send(request).await?)
    }

    /// The authenticated user's transactions, optionally narrowed to one status.
    pub async fn transactions(&self, status: Option<TransactionStatus>) -> Result<Vec<Transaction>, ClientError> {
        let path = match status {
            Some(status) => format!("/api/v1/transactions?status={status}"),
            None => "/api/v1/transactions".to_string(),
        };
        decode(self.session.authorized_send(Request::get(path)).await?)
    }

    //----------------------------------         Payments         ----------------------------------------------------

    /// Kick off a mobile-money authorization for `transaction`, prompting `phone` to approve it.
    ///
    /// Returns the checkout reference identifying the in-flight authorization. The call is refused locally when the
    /// transaction is not in a payable state, so the guard holds even if the backend's validation were to lapse.
    pub async fn initiate_payment(&self, transaction: &Transaction, phone: &str) -> Result<String, ClientError> {
        if transaction.id.is_demo() {
            return Err(ClientError::DemoTransaction);
        }
        if !transaction.status.allows(PermittedAction::ShowPaymentWidget) {
            return Err(ClientError::NotPayable(format!(
                "transaction [{}] is {}, payment can only be initiated while PENDING or PROCESSING",
                transaction.id, transaction.status
            )));
        }
        let msisdn = normalize_msisdn(phone).map_err(|e| ClientError::InvalidInput(e.to_string()))?;
        let body = json!({
            "transactionId": transaction.id,
            "phoneNumber": msisdn,
            "amount": transaction.amount,
        });
        let request = Request::post("/api/v1/payments/initiate-stk", body);
        let stk: StkPushPayload = decode(self.session.authorized_send(request).await?)?;
        info!("💳️ Payment initiated for [{}], checkout reference {}", transaction.id, stk.checkout_request_id);
        Ok(stk.checkout_request_id)
    }

    /// One unauthenticated status probe. This is what the payment poller calls on every tick, so it deliberately
    /// skips the session layer: an expired session must never interrupt a payment wait.
    pub async fn check_payment_status(&self, id: &TransactionId) -> Result<TransactionStatus, ClientError> {
        if id.is_demo() {
            return Ok(Transaction::demo().status);
        }
        let request = Request::post("/api/v1/payments/check-status", json!({ "transactionId": id }));
        let payload: StatusPayload = decode(self.session.send(request).await?)?;
        Ok(payload.status)
    }

    /// Development-only: ask the backend to settle a payment without a real mobile-money leg.
    pub async fn simulate_payment(&self, id: &TransactionId) -> Result<(), ClientError> {
        if id.is_demo() {
            return Err(ClientError::DemoTransaction);
        }
        let request = Request::post("/api/v1/payments/simulate-payment", json!({ "transactionId": id }));
        accept(self.session.send(request).await?)
    }

    //----------------------------------          Orders          ----------------------------------------------------

    pub async fn buyer_orders(&self, page: u32, limit: u32) -> Result<Vec<OrderSummary>, ClientError> {
        let request = Request::get(format!("/api/v1/buyer/orders?page={page}&limit={limit}"));
        let listing: OrderListing = decode(self.session.authorized_send(request).await?)?;
        Ok(listing.into_orders())
    }

    /// The buyer's open and resolved disputes, fetched alongside orders in the dashboard snapshot.
    pub async fn buyer_disputes(&self) -> Result<Vec<DisputeSummary>, ClientError> {
        let request = Request::get("/api/v1/buyer/disputes");
        let listing: DisputeListing = decode(self.session.authorized_send(request).await?)?;
        Ok(listing.into_disputes())
    }

    /// The buyer's escrow balance roll-up.
    pub async fn buyer_wallet(&self) -> Result<WalletSummary, ClientError> {
        decode(self.session.authorized_send(Request::get("/api/v1/buyer/wallet")).await?)
    }

    pub async fn seller_orders(&self, page: u32, limit: u32) -> Result<Vec<OrderSummary>, ClientError> {
        let request = Request::get(format!("/api/v1/seller/orders?page={page}&limit={limit}"));
        let listing: OrderListing = decode(self.session.authorized_send(request).await?)?;
        Ok(listing.into_orders())
    }

    /// Aggregate seller dashboard figures. The server owns the shape.
    pub async fn seller_stats(&self) -> Result<Value, ClientError> {
        decode(self.session.authorized_send(Request::get("/api/v1/seller/stats")).await?)
    }

    /// Seller accepts a paid order, moving it to `ACCEPTED`.
    pub async fn accept_order(&self, id: &TransactionId) -> Result<Transaction, ClientError> {
        let request = Request::post_empty(format!("/api/v1/seller/orders/{id}/accept"));
        decode(self.session.authorized_send(request).await?)
    }

    /// Seller rejects a paid order; the remote authority handles the refund leg.
    pub async fn reject_order(&self, id: &TransactionId, reason: &str) -> Result<Transaction, ClientError> {
        let request = Request::post(format!("/api/v1/seller/orders/{id}/reject"), json!({ "reason": reason }));
        decode(self.session.authorized_send(request).await?)
    }

    /// Seller records the courier hand-off, moving the order to `SHIPPED`.
    pub async fn add_shipping_info(&self, id: &TransactionId, info: &ShippingInfo) -> Result<Transaction, ClientError> {
        let body = serde_json::to_value(info).map_err(|e| ClientError::InvalidInput(e.to_string()))?;
        let request = Request::post(format!("/api/v1/seller/orders/{id}/shipping"), body);
        decode(self.session.authorized_send(request).await?)
    }

    /// Buyer confirms receipt, releasing the escrowed funds.
    pub async fn confirm_delivery(&self, id: &TransactionId) -> Result<Transaction, ClientError> {
        let request = Request::post_empty(format!("/api/v1/transactions/{id}/confirm"));
        decode(self.session.authorized_send(request).await?)
    }

    /// Receipt confirmation with the delivery OTP the courier relays from the buyer.
    pub async fn confirm_delivery_with_otp(&self, id: &TransactionId, otp: &str) -> Result<Transaction, ClientError> {
        let body = json!({ "transactionId": id, "deliveryOTP": otp });
        let request = Request::post("/api/v1/payments/confirm-delivery", body);
        decode(self.session.authorized_send(request).await?)
    }

    fn establish(&self, auth: AuthPayload) {
        let user = auth.user.map(|u| u.to_string());
        self.session.establish(auth.access_token, auth.refresh_token, user);
    }
}

//--------------------------------------     StatusSource     --------------------------------------------------------
#[async_trait]
impl<B, C> StatusSource for EscrowClient<B, C>
where
    B: Backend,
    C: CredentialStore,
{
    async fn check_status(&self, transaction_id: &TransactionId) -> Result<TransactionStatus, ProbeError> {
        self.check_payment_status(transaction_id).await.map_err(|e| ProbeError(e.to_string()))
    }
}

//--------------------------------------  Envelope utilities  --------------------------------------------------------
fn decode<T: DeserializeOwned>(reply: Reply) -> Result<T, ClientError> {
    if !reply.envelope.success {
        return Err(ClientError::from_envelope(reply.envelope));
    }
    Ok(reply.envelope.decode()?)
}

/// For endpoints whose payload carries nothing the client needs.
fn accept(reply: Reply) -> Result<(), ClientError> {
    if !reply.envelope.success {
        return Err(ClientError::from_envelope(reply.envelope));
    }
    Ok(())
}
