use std::net::SocketAddr;

use reqwest::StatusCode;
use serde_json::Value;

use crate::envelope::ResponseParameters;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong talking to the Bot API or ingesting updates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller handed us something unusable. Nothing was sent.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("failed to encode request payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// Connection, timeout or body read failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Any response status other than 200.
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The response body was not the JSON we expected.
    #[error("failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    /// The call reached the API and came back with `ok: false`.
    #[error("request rejected: {0}")]
    Rejected(Rejection),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to bind webhook listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported method: {0}")]
    UnknownMethod(String),
}

impl Error {
    /// Status errors in the 4xx range.
    pub fn is_client_status(&self) -> bool {
        matches!(self, Error::Status { status, .. } if status.is_client_error())
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Error::Rejected(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Error::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

/// What's left of an `ok: false` envelope, kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub method: String,
    pub error_code: Option<i64>,
    pub description: Option<String>,
    pub parameters: Option<ResponseParameters>,
    /// Raw `result` field, if the server sent one. Never trust its shape.
    pub result: Option<Value>,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.method)?;
        if let Some(code) = self.error_code {
            write!(f, " [{}]", code)?;
        }
        match &self.description {
            Some(d) => write!(f, ": {}", d),
            None => write!(f, ": no description"),
        }
    }
}
