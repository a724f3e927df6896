//! Refresh credential model - storage-backed, rotated on every use.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// A stored refresh credential.
///
/// Only the SHA-256 digest of the opaque value is persisted; the raw value
/// is handed to the caller exactly once. A rotated credential keeps its
/// record (with `replaced_by` set) so that presenting it again is
/// recognizable as reuse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshCredential {
    pub id: String,

    pub identity_id: String,

    /// Hex-encoded SHA-256 of the opaque token value.
    pub token_hash: String,

    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    #[serde(default)]
    pub revoked: bool,

    /// Id of the credential that superseded this one on rotation.
    #[serde(default)]
    pub replaced_by: Option<String>,
}

impl RefreshCredential {
    pub fn new(identity_id: String, raw_value: &str, ttl: Duration) -> Self {
        Self::new_with_id(Uuid::new_v4().to_string(), identity_id, raw_value, ttl)
    }

    pub fn new_with_id(id: String, identity_id: String, raw_value: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id,
            identity_id,
            token_hash: Self::hash_value(raw_value),
            issued_at: now,
            expires_at: now + ttl,
            revoked: false,
            replaced_by: None,
        }
    }

    /// Digest an opaque token value for storage or lookup.
    pub fn hash_value(raw_value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(raw_value.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Constant-time comparison against a presented raw value.
    pub fn matches_value(&self, raw_value: &str) -> bool {
        let presented = Self::hash_value(raw_value);
        bool::from(self.token_hash.as_bytes().ct_eq(presented.as_bytes()))
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn was_replaced(&self) -> bool {
        self.replaced_by.is_some()
    }

    /// Live means usable for refresh: unrevoked, unexpired, not rotated away.
    pub fn is_live(&self) -> bool {
        !self.revoked && !self.is_expired() && !self.was_replaced()
    }
}
