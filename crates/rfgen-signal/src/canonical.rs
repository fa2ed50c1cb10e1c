//! Canonical signal content and content-derived ids
//!
//! The content id is computed using the RFC 8785 JSON Canonicalization
//! Scheme (JCS), so key order and number formatting in the source fragment
//! never influence the id.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{type_name, SignalError};

/// Field carrying a caller-supplied signal id
pub const ID_FIELD: &str = "id";

/// Field naming a registered command transform
pub const TRANSFORM_FIELD: &str = "transform";

/// Identifier of a registered signal
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalId(String);

impl SignalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SignalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signal content with the bookkeeping fields (`id`, `transform`) removed
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalSignal {
    content: Map<String, Value>,
    bytes: Vec<u8>,
}

impl CanonicalSignal {
    /// Strip bookkeeping fields and compute the JCS serialization
    pub fn from_definition(definition: &Value) -> Result<Self, SignalError> {
        let Value::Object(map) = definition else {
            return Err(SignalError::NotAnObject(type_name(definition)));
        };

        let mut content = map.clone();
        content.shift_remove(ID_FIELD);
        content.shift_remove(TRANSFORM_FIELD);

        let bytes = serde_json_canonicalizer::to_vec(&content)
            .map_err(|e| SignalError::JcsError(e.to_string()))?;

        Ok(Self { content, bytes })
    }

    /// The signal fields that take part in the content id
    pub fn content(&self) -> &Map<String, Value> {
        &self.content
    }

    /// Canonical (JCS) bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// content_id = SHA-256 hex digest of JCS(content)
    pub fn content_id(&self) -> SignalId {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        SignalId(hex::encode(hasher.finalize()))
    }
}
