//! Identity model - administrative operator accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Administrative operator identity.
///
/// Identities are never physically deleted; disabling an account keeps the
/// audit trail referentially intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,

    /// Lowercased, unique across the store.
    pub email: String,

    /// Argon2id verifier string. Never the plaintext password.
    pub password_hash: String,

    /// Name of the assigned role in the catalog.
    pub role_name: String,

    /// Consecutive failed authentication attempts.
    pub failed_attempts: u32,

    /// Set while the account is locked out.
    pub locked_until: Option<DateTime<Utc>>,

    /// How many times this account has been locked; drives the
    /// escalating lock-duration schedule.
    pub lock_episodes: u32,

    pub active: bool,

    pub display_name: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(
        email: &str,
        password_hash: String,
        role_name: String,
        display_name: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            email: Self::normalize_email(email),
            password_hash,
            role_name,
            failed_attempts: 0,
            locked_until: None,
            lock_episodes: 0,
            active: true,
            display_name,
            created_at: now,
            updated_at: now,
        }
    }

    /// Emails compare case-insensitively; store them folded.
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.locked_until, Some(until) if until > Utc::now())
    }

    /// Convert to a response view that carries no verifier material.
    pub fn sanitized(&self) -> IdentityResponse {
        IdentityResponse::from(self.clone())
    }
}

/// Identity view handed to callers (no sensitive fields).
#[derive(Debug, Clone, Serialize)]
pub struct IdentityResponse {
    pub id: String,
    pub email: String,
    pub role_name: String,
    pub active: bool,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Identity> for IdentityResponse {
    fn from(i: Identity) -> Self {
        Self {
            id: i.id,
            email: i.email,
            role_name: i.role_name,
            active: i.active,
            display_name: i.display_name,
            created_at: i.created_at,
        }
    }
}
