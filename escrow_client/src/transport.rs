//! Single-request HTTP plumbing.
//!
//! The transport issues one request and classifies the response. It knows nothing about sessions, retries or the
//! transaction lifecycle; those live a layer up. Four failure modes are distinguished so callers can react to each:
//! the server being unreachable, an empty body, a non-JSON body, and a JSON body that fails to parse.

use async_trait::async_trait;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client,
    Method,
};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::envelope::{Envelope, ErrorCode};

/// The backend assumed when no base URL is configured; the remote authority runs on port 8000 in development.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// How much of a non-JSON body to keep for diagnostics.
const SNIPPET_LEN: usize = 200;

//--------------------------------------   TransportError    ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Empty response from server (status: {status})")]
    EmptyResponse { status: u16 },
    #[error("Server returned an invalid response (expected JSON)")]
    InvalidResponse { snippet: String },
    #[error("Failed to parse server response: {reason}")]
    JsonParse { reason: String, snippet: String },
}

impl TransportError {
    pub const fn code(&self) -> ErrorCode {
        match self {
            TransportError::Network(_) => ErrorCode::NetworkError,
            TransportError::EmptyResponse { .. } => ErrorCode::EmptyResponse,
            TransportError::InvalidResponse { .. } => ErrorCode::InvalidResponse,
            TransportError::JsonParse { .. } => ErrorCode::JsonParseError,
        }
    }

    /// Fold the error into the uniform envelope shape, for callers that surface failures rather than propagate them.
    pub fn into_envelope(self) -> Envelope {
        let reason = self.to_string();
        Envelope::failure(self.code(), reason)
    }
}

//--------------------------------------  Request and Reply  ---------------------------------------------------------
/// One outgoing request. The bearer credential is attached by the session manager, never by callers directly.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub bearer: Option<String>,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self { method: Method::GET, path: path.into(), body: None, bearer: None }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self { method: Method::POST, path: path.into(), body: Some(body), bearer: None }
    }

    pub fn post_empty(path: impl Into<String>) -> Self {
        Self { method: Method::POST, path: path.into(), body: None, bearer: None }
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

/// A classified response: the HTTP status plus the decoded envelope.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub envelope: Envelope,
}

impl Reply {
    pub fn is_auth_failure(&self) -> bool {
        self.status == 401
    }
}

//--------------------------------------       Backend       ---------------------------------------------------------
/// The seam between the session layer and the wire. Mocked in tests.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn send(&self, request: Request) -> Result<Reply, TransportError>;
}

#[async_trait]
impl<T: Backend + ?Sized> Backend for std::sync::Arc<T> {
    async fn send(&self, request: Request) -> Result<Reply, TransportError> {
        (**self).send(request).await
    }
}

//--------------------------------------    HttpTransport    ---------------------------------------------------------
/// The reqwest-backed transport used in production.
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: Url) -> Self {
        Self { client: build_client(false), base_url }
    }

    /// Configure from the environment: `ESCROW_API_URL` for the backend address, and
    /// `ESCROW_ACCEPT_INVALID_CERTS=1` to tolerate self-signed certificates on a development backend.
    pub fn from_env() -> Self {
        let base_url = std::env::var("ESCROW_API_URL")
            .ok()
            .and_then(|s| match Url::parse(&s) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("📡️ Ignoring unparseable ESCROW_API_URL ({s}): {e}");
                    None
                },
            })
            .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL).expect("Default base URL is valid"));
        let accept_invalid_certs =
            escrow_common::helpers::parse_boolean_flag(std::env::var("ESCROW_ACCEPT_INVALID_CERTS").ok(), false);
        if accept_invalid_certs {
            warn!("📡️ TLS certificate validation is DISABLED. Never use this against a production backend.");
        }
        Self { client: build_client(accept_invalid_certs), base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

fn build_client(accept_invalid_certs: bool) -> Client {
    let mut headers = HeaderMap::new();
    headers.insert("Accept", HeaderValue::from_static("application/json"));
    Client::builder()
        .user_agent("Escrow Client")
        .default_headers(headers)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .expect("Failed to create reqwest client")
}

impl Default for HttpTransport {
    fn default() -> Self {
        let url = Url::parse(DEFAULT_BASE_URL).expect("Default base URL is valid");
        Self::new(url)
    }
}

#[async_trait]
impl Backend for HttpTransport {
    async fn send(&self, request: Request) -> Result<Reply, TransportError> {
        let url = self
            .base_url
            .join(&request.path)
            .map_err(|e| TransportError::Network(format!("Failed to join URL: {e}")))?;
        trace!("📡️ {} {}", request.method, url);
        let mut req = self.client.request(request.method.clone(), url).header(CONTENT_TYPE, "application/json");
        if let Some(token) = &request.bearer {
            req = req.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }
        let res = req.send().await.map_err(|e| TransportError::Network(e.to_string()))?;
        let status = res.status().as_u16();
        let content_type =
            res.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or_default().to_string();
        let raw = res.text().await.map_err(|e| TransportError::Network(e.to_string()))?;

        // A down or misrouted backend often answers with nothing, or with the SPA's index.html.
        if raw.trim().is_empty() {
            return Err(TransportError::EmptyResponse { status });
        }
        if !content_type.contains("application/json") {
            return Err(TransportError::InvalidResponse { snippet: snippet(&raw) });
        }
        let envelope = serde_json::from_str::<Envelope>(&raw)
            .map_err(|e| TransportError::JsonParse { reason: e.to_string(), snippet: snippet(&raw) })?;
        Ok(Reply { status, envelope })
    }
}

fn snippet(raw: &str) -> String {
    raw.char_indices().take(SNIPPET_LEN).map(|(_, c)| c).collect()
}
