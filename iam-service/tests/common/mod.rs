//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::sync::Arc;

use secrecy::SecretString;
use serde_json::json;

use iam_service::config::{Environment, IamConfig, JwtConfig};
use iam_service::models::{
    Condition, ConditionOp, Grant, Identity, RequestContext, Role, RoleCatalog,
};
use iam_service::services::{
    AuditConfig, AuthzConfig, IdentityContext, LockoutConfig, PasswordPolicy,
};
use iam_service::store::{
    IdentityStore, InMemoryAuditStore, InMemoryIdentityStore, InMemoryOwnerDirectory,
    InMemoryRefreshCredentialStore,
};
use iam_service::utils::password::{hash_password, Password};
use iam_service::SecurityCore;

pub const ORIGIN: &str = "198.51.100.7";

pub fn test_config() -> IamConfig {
    IamConfig {
        common: service_core::config::Config { port: 8080 },
        environment: Environment::Dev,
        service_name: "iam-service".to_string(),
        log_level: "debug".to_string(),
        jwt: JwtConfig {
            secret: SecretString::new("integration-test-signing-secret".to_string()),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        },
        lockout: LockoutConfig::default(),
        authz: AuthzConfig::default(),
        audit: AuditConfig::default(),
        password: PasswordPolicy::default(),
    }
}

/// Catalog used across the suites:
/// - `super_admin` (level 1): unrestricted by design, no explicit grants.
/// - `admin` (level 2): bypasses ownership, may create subordinates.
/// - `manager` (level 2): owner-scoped order access, conditional grants.
/// - `support` (level 4): read-mostly.
pub fn test_catalog() -> RoleCatalog {
    let mut catalog = RoleCatalog::new();

    catalog.insert_role(Role::new("super_admin", 1).with_subordinate_creation());

    catalog.insert_role(
        Role::new("admin", 2)
            .with_ownership_bypass()
            .with_subordinate_creation()
            .grant(Grant::new("identities", ["create", "update", "delete"]))
            .grant(Grant::new("roles", ["update"]))
            .grant(Grant::new("orders", ["read", "update", "delete"])),
    );

    catalog.insert_role(
        Role::new("manager", 2)
            .grant(Grant::new("orders", ["read", "update", "delete"]).owned_by("owner_id"))
            .grant(Grant::new("products", ["read"]))
            .grant(
                Grant::new("products", ["update"]).with_conditions(vec![Condition::new(
                    "department",
                    ConditionOp::Equals,
                    json!("sales"),
                )]),
            )
            .grant(
                Grant::new("reports", ["export"]).with_conditions(vec![Condition::new(
                    "row_count",
                    ConditionOp::Range,
                    json!({"min": 1, "max": 10000}),
                )]),
            )
            .grant(Grant::new("identities", ["update"])),
    );

    catalog.insert_role(
        Role::new("support", 4)
            .grant(Grant::new("orders", ["read"]).owned_by("owner_id"))
            .grant(Grant::new("products", ["read"])),
    );

    catalog
}

pub struct TestHarness {
    pub core: SecurityCore,
    pub identities: Arc<InMemoryIdentityStore>,
    pub credentials: Arc<InMemoryRefreshCredentialStore>,
    pub audit_store: Arc<InMemoryAuditStore>,
    pub owners: Arc<InMemoryOwnerDirectory>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: IamConfig) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("info")
            .try_init();

        let identities = Arc::new(InMemoryIdentityStore::new());
        let credentials = Arc::new(InMemoryRefreshCredentialStore::new());
        let audit_store = Arc::new(InMemoryAuditStore::new());
        let owners = Arc::new(InMemoryOwnerDirectory::new());

        let core = SecurityCore::new(
            &config,
            Arc::new(test_catalog()),
            identities.clone(),
            credentials.clone(),
            audit_store.clone(),
            owners.clone(),
        );

        Self {
            core,
            identities,
            credentials,
            audit_store,
            owners,
        }
    }

    pub async fn add_identity(&self, email: &str, password: &str, role_name: &str) -> Identity {
        let hash = hash_password(&Password::new(password.to_string())).expect("hashing failed");
        let identity = Identity::new(email, hash.into_string(), role_name.to_string(), None);
        self.identities
            .insert(identity.clone())
            .await
            .expect("insert failed");
        identity
    }

    /// Authenticate and return the verified caller context, end to end.
    pub async fn login_context(&self, email: &str, password: &str) -> IdentityContext {
        let tokens = self
            .core
            .tokens
            .authenticate(email, password, &self.ctx())
            .await
            .expect("login failed");
        self.core
            .tokens
            .verify_access(&tokens.access_token)
            .expect("token verification failed")
    }

    pub fn ctx(&self) -> RequestContext {
        RequestContext::new(ORIGIN, "POST", "/auth/login")
    }

    pub fn ctx_from(&self, origin: &str) -> RequestContext {
        RequestContext::new(origin, "POST", "/auth/login")
    }
}
