//! Opaque pagination cursor.
//!
//! Wire format: URL-safe base64 of `{"ts": <float>, "id": "<insertion id>"}`.
//! Decoding also accepts the standard base64 alphabet and a numeric `id`.

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Why a cursor token could not be decoded.
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("cursor is not valid base64")]
    Encoding,
    #[error("cursor payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("cursor timestamp must be a finite number")]
    Timestamp,
    #[error("cursor id must be an integer")]
    Id,
}

/// Position of the last row of a page in `(ts DESC, id DESC)` order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorPosition {
    pub ts: f64,
    pub id: i64,
}

#[derive(Serialize, Deserialize)]
struct CursorWire {
    ts: f64,
    id: Value,
}

impl CursorPosition {
    pub fn new(ts: f64, id: i64) -> Self {
        Self { ts, id }
    }

    /// Encode into the opaque token handed to callers.
    pub fn encode(&self) -> String {
        let wire = CursorWire {
            ts: self.ts,
            id: Value::String(self.id.to_string()),
        };
        // Serializing an f64 and a string cannot fail
        let json = serde_json::to_vec(&wire).unwrap_or_default();
        URL_SAFE.encode(json)
    }

    /// Decode a token produced by [`CursorPosition::encode`].
    pub fn decode(token: &str) -> Result<Self, CursorError> {
        let token = token.trim();
        let bytes = URL_SAFE
            .decode(token)
            .or_else(|_| STANDARD.decode(token))
            .map_err(|_| CursorError::Encoding)?;

        let wire: CursorWire = serde_json::from_slice(&bytes)?;
        if !wire.ts.is_finite() {
            return Err(CursorError::Timestamp);
        }

        let id = match wire.id {
            Value::String(s) => s.trim().parse::<i64>().map_err(|_| CursorError::Id)?,
            Value::Number(n) => n.as_i64().ok_or(CursorError::Id)?,
            _ => return Err(CursorError::Id),
        };

        Ok(Self { ts: wire.ts, id })
    }
}
