//! Decoding of the `{ok, result, description}` wrapper every Bot API
//! response comes in.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Rejection, Result};

/// Extra hints the API attaches to some failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrate_to_chat_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

/// Decode a response body into the operation's result type.
///
/// A malformed body is `Error::Decode`; a well-formed body with `ok: false`
/// is `Error::Rejected` and its `result` is never handed out as `T`.
pub fn decode<T: DeserializeOwned>(method: &str, body: &[u8]) -> Result<T> {
    let envelope: Envelope = serde_json::from_slice(body).map_err(Error::Decode)?;

    if !envelope.ok {
        return Err(Error::Rejected(Rejection {
            method: method.to_string(),
            error_code: envelope.error_code,
            description: envelope.description,
            parameters: envelope.parameters,
            result: envelope.result,
        }));
    }

    // `ok: true` without a result: decode `null`, which succeeds for `()`
    // and `Option<_>` and fails with a useful message for everything else.
    let result = envelope.result.unwrap_or(Value::Null);
    serde_json::from_value(result).map_err(Error::Decode)
}
