//! HTTP layer for the escrow client engine.
//!
//! Everything network-facing lives here, split along the responsibilities the engine expects:
//!
//! * [`transport`] issues single HTTP requests and classifies what came back into the uniform response envelope.
//!   It holds no lifecycle knowledge, performs no retries and attaches no credentials.
//! * [`session`] owns the access/refresh token pair. It attaches credentials to outgoing requests and transparently
//!   recovers from an expired access token exactly once per logical call, coalescing concurrent refreshes into a
//!   single wire call.
//! * [`store`] persists the token pair and cached user profile, cleared as a unit on logout or unrecoverable
//!   session expiry.
//! * [`client`] is the typed endpoint surface the rest of the application calls, and implements the engine's
//!   [`escrow_engine::StatusSource`] so the payment poller can probe through it.

pub mod client;
pub mod envelope;
pub mod errors;
pub mod session;
pub mod store;
pub mod transport;

pub use client::{DisputeSummary, EscrowClient, NewTransaction, OtpPurpose, ShippingInfo, WalletSummary};
pub use envelope::{Envelope, ErrorCode};
pub use errors::ClientError;
pub use session::SessionManager;
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore, StoredCredentials};
pub use transport::{Backend, HttpTransport, Reply, Request, TransportError};
