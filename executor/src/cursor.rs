//! Opaque continuation cursors. A cursor binds to the plan that produced it
//! (by fingerprint) and records, per sub-query, whether the leg is exhausted
//! and the primary-key position of the last item handed to the caller, plus a
//! Bloom filter of every yielded primary key so resumed traversals never
//! repeat one.

use crate::bloom::Bloom;
use crate::error::ExecError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use dynaq_store::Item;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub(crate) fingerprint: u64,
    pub(crate) legs: Vec<LegCursor>,
    pub(crate) seen: Bloom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct LegCursor {
    pub(crate) exhausted: bool,
    pub(crate) resume_key: Option<Item>,
}

impl Cursor {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ExecError> {
        bincode::serialize(self).map_err(|e| ExecError::InvalidCursor(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Cursor, ExecError> {
        bincode::deserialize(bytes).map_err(|e| ExecError::InvalidCursor(e.to_string()))
    }

    /// Printable token form for transports that want text.
    pub fn to_token(&self) -> Result<String, ExecError> { Ok(URL_SAFE_NO_PAD.encode(self.to_bytes()?)) }

    pub fn from_token(token: &str) -> Result<Cursor, ExecError> {
        let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|e| ExecError::InvalidCursor(e.to_string()))?;
        Cursor::from_bytes(&bytes)
    }
}
