use std::{fmt::Display, str::FromStr};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

//--------------------------------------      ErrorCode      ---------------------------------------------------------
/// The machine-readable failure codes the client recognises and handles distinctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The session could not be refreshed; re-authentication is required.
    SessionExpired,
    /// The server sent back nothing at all (typically down or misrouted).
    EmptyResponse,
    /// The server answered with something other than JSON (e.g. an HTML error page).
    InvalidResponse,
    /// The body claimed to be JSON but did not parse.
    JsonParseError,
    /// The server could not be reached.
    NetworkError,
}

impl ErrorCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::SessionExpired => "SESSION_EXPIRED",
            ErrorCode::EmptyResponse => "EMPTY_RESPONSE",
            ErrorCode::InvalidResponse => "INVALID_RESPONSE",
            ErrorCode::JsonParseError => "JSON_PARSE_ERROR",
            ErrorCode::NetworkError => "NETWORK_ERROR",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Unrecognised error code: {0}")]
pub struct ErrorCodeConversionError(String);

impl FromStr for ErrorCode {
    type Err = ErrorCodeConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SESSION_EXPIRED" => Ok(Self::SessionExpired),
            "EMPTY_RESPONSE" => Ok(Self::EmptyResponse),
            "INVALID_RESPONSE" => Ok(Self::InvalidResponse),
            "JSON_PARSE_ERROR" => Ok(Self::JsonParseError),
            "NETWORK_ERROR" => Ok(Self::NetworkError),
            s => Err(ErrorCodeConversionError(s.to_string())),
        }
    }
}

//--------------------------------------      Envelope       ---------------------------------------------------------
/// The uniform response wrapper every endpoint returns: `{ success, data?, error?, code?, message? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    pub fn failure(code: ErrorCode, error: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(error.into()), code: Some(code.as_str().to_string()), message: None }
    }

    /// The human-readable reason for a failed envelope, falling back to the code when the server sent no prose.
    pub fn reason(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| self.code.clone())
            .unwrap_or_else(|| "Request failed".to_string())
    }

    /// Deserialize the `data` payload of a successful envelope into `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, DecodeError> {
        let data = self.data.ok_or(DecodeError::MissingData)?;
        serde_json::from_value(data).map_err(|e| DecodeError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    #[error("Response envelope carried no data payload")]
    MissingData,
    #[error("Response payload did not match the expected shape: {0}")]
    Malformed(String),
}
