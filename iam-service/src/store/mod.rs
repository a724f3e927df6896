//! Persistence seams consumed by the core.
//!
//! The concrete datastore lives outside this crate; these traits are the
//! interface it must provide. `memory` holds reference implementations used
//! by the test suites and by standalone deployments.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{AuditEvent, Identity, RefreshCredential};

pub use memory::{
    InMemoryAuditStore, InMemoryIdentityStore, InMemoryOwnerDirectory,
    InMemoryRefreshCredentialStore,
};

/// Failure inside a storage backend. Always treated as fatal for the
/// operation in flight, never as a caller error.
#[derive(Debug, Error)]
#[error("store error: {0}")]
pub struct StoreError(#[from] pub anyhow::Error);

impl StoreError {
    pub fn msg(message: &'static str) -> Self {
        Self(anyhow::anyhow!(message))
    }
}

/// Identity records with atomic lockout-counter updates.
///
/// The counter operations are the only writes raced by concurrent requests
/// for the same identity; implementations must make them atomic
/// (keyed entry guard, `SELECT .. FOR UPDATE`, or an equivalent primitive).
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Identity>, StoreError>;

    async fn insert(&self, identity: Identity) -> Result<(), StoreError>;

    async fn update_password(&self, id: &str, password_hash: String) -> Result<(), StoreError>;

    async fn set_active(&self, id: &str, active: bool) -> Result<(), StoreError>;

    /// Atomically increment the failed-attempt counter; returns the
    /// post-increment count.
    async fn increment_failures(&self, id: &str) -> Result<u32, StoreError>;

    /// Zero the failure counter and clear any lock. Lock episodes persist so
    /// the escalation schedule survives an unlock.
    async fn reset_failures(&self, id: &str) -> Result<(), StoreError>;

    async fn set_lock(
        &self,
        id: &str,
        until: DateTime<Utc>,
        episode: u32,
    ) -> Result<(), StoreError>;
}

/// Refresh credentials, addressable by value digest and by owning identity.
#[async_trait]
pub trait RefreshCredentialStore: Send + Sync {
    async fn insert(&self, credential: RefreshCredential) -> Result<(), StoreError>;

    async fn find_by_hash(&self, token_hash: &str)
        -> Result<Option<RefreshCredential>, StoreError>;

    /// Compare-and-set `replaced_by`. Returns `false` when the credential is
    /// already replaced or revoked, so exactly one of two racing rotations
    /// can win.
    async fn mark_replaced(&self, id: &str, replaced_by: &str) -> Result<bool, StoreError>;

    /// Idempotent single-credential revocation.
    async fn revoke(&self, id: &str) -> Result<(), StoreError>;

    /// Revoke every live credential for an identity; returns how many were
    /// revoked.
    async fn revoke_all_for_identity(&self, identity_id: &str) -> Result<u64, StoreError>;

    async fn live_for_identity(
        &self,
        identity_id: &str,
    ) -> Result<Vec<RefreshCredential>, StoreError>;
}

/// Append-only audit event log with timestamp-range reads.
#[async_trait]
pub trait AuditEventStore: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), StoreError>;

    async fn events_since(&self, since: DateTime<Utc>) -> Result<Vec<AuditEvent>, StoreError>;

    async fn events_for_identity(
        &self,
        identity_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuditEvent>, StoreError>;
}

/// Resolves the owner of a protected resource for ownership-scoped grants.
/// Injected per deployment by the request-handling layer. `owner_field`
/// names the attribute of the target record that holds the owning
/// identity id.
#[async_trait]
pub trait ResourceOwnerAccessor: Send + Sync {
    async fn owner_of(
        &self,
        resource: &str,
        resource_id: &str,
        owner_field: &str,
    ) -> Result<Option<String>, StoreError>;
}
