use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::QueryError;

/// Opaque resume marker for a sorted traversal.
///
/// Encodes the id and sort-field value of the last returned item; enough to
/// continue strictly after it without offset re-scanning, and stable under
/// concurrent inserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCursor {
    pub last_id: String,
    pub last_sort_value: Value,
}

impl PageCursor {
    pub fn encode(&self) -> String {
        // serializing a two-field struct cannot fail
        let bytes = serde_json::to_vec(self).expect("cursor serialization");
        URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn decode(token: &str) -> Result<Self, QueryError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| QueryError::InvalidCursor)?;
        serde_json::from_slice(&bytes).map_err(|_| QueryError::InvalidCursor)
    }
}
