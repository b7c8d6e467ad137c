use thiserror::Error;

use crate::{
    envelope::{DecodeError, Envelope, ErrorCode},
    transport::TransportError,
};

/// The error taxonomy callers of the typed client see.
///
/// Transport errors are always recoverable by retrying or treating the one call as failed. `SessionExpired` is
/// fatal to the session (the caller should redirect to re-authentication) but never to the process. `Api` carries
/// the server's own human-readable refusal, e.g. initiating payment for a transaction that is not payable.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error. {0}")]
    Transport(#[from] TransportError),
    #[error("Session expired. Please log in again")]
    SessionExpired,
    #[error("Request failed. {message}")]
    Api { code: Option<String>, message: String },
    #[error("Response payload was missing or malformed. {0}")]
    BadPayload(#[from] DecodeError),
    #[error("Payment is not permitted: {0}")]
    NotPayable(String),
    #[error("The demo transaction never touches the network")]
    DemoTransaction,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ClientError {
    /// The wire-level error code, where one applies.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::Transport(e) => Some(e.code()),
            ClientError::SessionExpired => Some(ErrorCode::SessionExpired),
            ClientError::Api { code, .. } => code.as_deref().and_then(|c| c.parse().ok()),
            _ => None,
        }
    }

    /// Lift a failed envelope into a typed error, preserving the server's code and prose.
    pub fn from_envelope(envelope: Envelope) -> Self {
        ClientError::Api { message: envelope.reason(), code: envelope.code }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn session_expiry_is_distinct_from_ordinary_auth_failure() {
        let expired = ClientError::SessionExpired;
        assert_eq!(expired.code(), Some(ErrorCode::SessionExpired));
        let refused = ClientError::Api { code: None, message: "Invalid OTP".to_string() };
        assert_eq!(refused.code(), None);
    }

    #[test]
    fn failed_envelopes_keep_the_server_reason() {
        let envelope = Envelope {
            success: false,
            data: None,
            error: Some("Transaction is not in a payable state".to_string()),
            code: None,
            message: None,
        };
        let err = ClientError::from_envelope(envelope);
        assert!(err.to_string().contains("not in a payable state"));
    }
}
