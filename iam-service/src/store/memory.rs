//! In-memory reference stores.
//!
//! Back the test suites and single-node deployments. Counter and rotation
//! updates go through dashmap entry guards, which serialize concurrent
//! writers on the same key.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::models::{AuditEvent, Identity, RefreshCredential};

use super::{
    AuditEventStore, IdentityStore, RefreshCredentialStore, ResourceOwnerAccessor, StoreError,
};

#[derive(Default)]
pub struct InMemoryIdentityStore {
    identities: DashMap<String, Identity>,
    ids_by_email: DashMap<String, String>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let email = Identity::normalize_email(email);
        let id = match self.ids_by_email.get(&email) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        Ok(self.identities.get(&id).map(|i| i.clone()))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self.identities.get(id).map(|i| i.clone()))
    }

    async fn insert(&self, identity: Identity) -> Result<(), StoreError> {
        if self.ids_by_email.contains_key(&identity.email) {
            return Err(StoreError::msg("email already registered"));
        }
        self.ids_by_email
            .insert(identity.email.clone(), identity.id.clone());
        self.identities.insert(identity.id.clone(), identity);
        Ok(())
    }

    async fn update_password(&self, id: &str, password_hash: String) -> Result<(), StoreError> {
        let mut identity = self
            .identities
            .get_mut(id)
            .ok_or_else(|| StoreError::msg("identity not found"))?;
        identity.password_hash = password_hash;
        identity.updated_at = Utc::now();
        Ok(())
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<(), StoreError> {
        let mut identity = self
            .identities
            .get_mut(id)
            .ok_or_else(|| StoreError::msg("identity not found"))?;
        identity.active = active;
        identity.updated_at = Utc::now();
        Ok(())
    }

    async fn increment_failures(&self, id: &str) -> Result<u32, StoreError> {
        let mut identity = self
            .identities
            .get_mut(id)
            .ok_or_else(|| StoreError::msg("identity not found"))?;
        identity.failed_attempts += 1;
        Ok(identity.failed_attempts)
    }

    async fn reset_failures(&self, id: &str) -> Result<(), StoreError> {
        let mut identity = self
            .identities
            .get_mut(id)
            .ok_or_else(|| StoreError::msg("identity not found"))?;
        identity.failed_attempts = 0;
        identity.locked_until = None;
        Ok(())
    }

    async fn set_lock(
        &self,
        id: &str,
        until: DateTime<Utc>,
        episode: u32,
    ) -> Result<(), StoreError> {
        let mut identity = self
            .identities
            .get_mut(id)
            .ok_or_else(|| StoreError::msg("identity not found"))?;
        identity.locked_until = Some(until);
        identity.lock_episodes = episode;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRefreshCredentialStore {
    credentials: DashMap<String, RefreshCredential>,
    ids_by_hash: DashMap<String, String>,
}

impl InMemoryRefreshCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshCredentialStore for InMemoryRefreshCredentialStore {
    async fn insert(&self, credential: RefreshCredential) -> Result<(), StoreError> {
        self.ids_by_hash
            .insert(credential.token_hash.clone(), credential.id.clone());
        self.credentials.insert(credential.id.clone(), credential);
        Ok(())
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshCredential>, StoreError> {
        let id = match self.ids_by_hash.get(token_hash) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        Ok(self.credentials.get(&id).map(|c| c.clone()))
    }

    async fn mark_replaced(&self, id: &str, replaced_by: &str) -> Result<bool, StoreError> {
        let mut credential = self
            .credentials
            .get_mut(id)
            .ok_or_else(|| StoreError::msg("credential not found"))?;
        if credential.was_replaced() || credential.revoked {
            return Ok(false);
        }
        credential.replaced_by = Some(replaced_by.to_string());
        Ok(true)
    }

    async fn revoke(&self, id: &str) -> Result<(), StoreError> {
        if let Some(mut credential) = self.credentials.get_mut(id) {
            credential.revoked = true;
        }
        Ok(())
    }

    async fn revoke_all_for_identity(&self, identity_id: &str) -> Result<u64, StoreError> {
        let mut revoked = 0;
        for mut entry in self.credentials.iter_mut() {
            if entry.identity_id == identity_id && !entry.revoked {
                entry.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn live_for_identity(
        &self,
        identity_id: &str,
    ) -> Result<Vec<RefreshCredential>, StoreError> {
        Ok(self
            .credentials
            .iter()
            .filter(|c| c.identity_id == identity_id && c.is_live())
            .map(|c| c.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryAuditStore {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditEventStore for InMemoryAuditStore {
    async fn append(&self, event: AuditEvent) -> Result<(), StoreError> {
        self.events
            .write()
            .map_err(|_| StoreError::msg("audit log poisoned"))?
            .push(event);
        Ok(())
    }

    async fn events_since(&self, since: DateTime<Utc>) -> Result<Vec<AuditEvent>, StoreError> {
        Ok(self
            .events
            .read()
            .map_err(|_| StoreError::msg("audit log poisoned"))?
            .iter()
            .filter(|e| e.created_utc >= since)
            .cloned()
            .collect())
    }

    async fn events_for_identity(
        &self,
        identity_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        Ok(self
            .events
            .read()
            .map_err(|_| StoreError::msg("audit log poisoned"))?
            .iter()
            .filter(|e| {
                e.created_utc >= since && e.identity_id.as_deref() == Some(identity_id)
            })
            .cloned()
            .collect())
    }
}

/// Owner lookup backed by a map; deployments register real accessors per
/// protected resource instead.
#[derive(Default)]
pub struct InMemoryOwnerDirectory {
    owners: DashMap<String, String>,
}

impl InMemoryOwnerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_owner(&self, resource: &str, resource_id: &str, owner_identity_id: &str) {
        self.owners.insert(
            Self::key(resource, resource_id),
            owner_identity_id.to_string(),
        );
    }

    fn key(resource: &str, resource_id: &str) -> String {
        format!("{resource}:{resource_id}")
    }
}

#[async_trait]
impl ResourceOwnerAccessor for InMemoryOwnerDirectory {
    // The directory stores the owner id directly, so `owner_field` is
    // only meaningful for record-backed accessors.
    async fn owner_of(
        &self,
        resource: &str,
        resource_id: &str,
        _owner_field: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .owners
            .get(&Self::key(resource, resource_id))
            .map(|o| o.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{actions, Outcome, RequestContext, Severity};
    use chrono::Duration;

    fn identity(email: &str) -> Identity {
        Identity::new(email, "$argon2id$stub".to_string(), "manager".to_string(), None)
    }

    #[tokio::test]
    async fn test_email_lookup_is_case_insensitive() {
        let store = InMemoryIdentityStore::new();
        store.insert(identity("Ops@Example.com")).await.unwrap();

        let found = store.find_by_email("OPS@EXAMPLE.COM").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = InMemoryIdentityStore::new();
        store.insert(identity("ops@example.com")).await.unwrap();
        assert!(store.insert(identity("ops@example.com")).await.is_err());
    }

    #[tokio::test]
    async fn test_increment_failures_counts_up() {
        let store = InMemoryIdentityStore::new();
        let id = identity("ops@example.com");
        let identity_id = id.id.clone();
        store.insert(id).await.unwrap();

        assert_eq!(store.increment_failures(&identity_id).await.unwrap(), 1);
        assert_eq!(store.increment_failures(&identity_id).await.unwrap(), 2);

        store.reset_failures(&identity_id).await.unwrap();
        let fresh = store.find_by_id(&identity_id).await.unwrap().unwrap();
        assert_eq!(fresh.failed_attempts, 0);
        assert!(fresh.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_mark_replaced_wins_only_once() {
        let store = InMemoryRefreshCredentialStore::new();
        let credential =
            RefreshCredential::new("op_1".to_string(), "raw-value", Duration::days(7));
        let id = credential.id.clone();
        store.insert(credential).await.unwrap();

        assert!(store.mark_replaced(&id, "next-1").await.unwrap());
        assert!(!store.mark_replaced(&id, "next-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_all_only_touches_target_identity() {
        let store = InMemoryRefreshCredentialStore::new();
        store
            .insert(RefreshCredential::new(
                "op_1".to_string(),
                "a",
                Duration::days(7),
            ))
            .await
            .unwrap();
        store
            .insert(RefreshCredential::new(
                "op_1".to_string(),
                "b",
                Duration::days(7),
            ))
            .await
            .unwrap();
        store
            .insert(RefreshCredential::new(
                "op_2".to_string(),
                "c",
                Duration::days(7),
            ))
            .await
            .unwrap();

        assert_eq!(store.revoke_all_for_identity("op_1").await.unwrap(), 2);
        assert_eq!(store.live_for_identity("op_1").await.unwrap().len(), 0);
        assert_eq!(store.live_for_identity("op_2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_audit_store_timestamp_filter() {
        let store = InMemoryAuditStore::new();
        let event = AuditEvent::new(
            actions::LOGIN,
            "auth",
            Outcome::Success,
            Severity::Low,
            RequestContext::new("127.0.0.1", "POST", "/auth/login"),
        );
        store.append(event).await.unwrap();

        let recent = store
            .events_since(Utc::now() - Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);

        let future = store
            .events_since(Utc::now() + Duration::minutes(5))
            .await
            .unwrap();
        assert!(future.is_empty());
    }
}
