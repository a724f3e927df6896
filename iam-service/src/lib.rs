//! Administrative identity, authorization, and security-audit core.
//!
//! The request-handling layer wires this crate in front of the back-office
//! API: it authenticates operators, enforces the hierarchical permission
//! model, throttles brute-force attempts, and records a tamper-evident
//! audit trail for every privileged action. Persistence is consumed
//! through the trait seams in [`store`].

pub mod config;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

use std::sync::Arc;

use crate::config::IamConfig;
use crate::models::RoleCatalog;
use crate::services::{
    AuditRecorder, AuthorizationEngine, BruteForceGuard, JwtService, TokenService,
};
use crate::store::{
    AuditEventStore, IdentityStore, RefreshCredentialStore, ResourceOwnerAccessor,
};

/// Fully wired security core, shared by the request-handling layer.
#[derive(Clone)]
pub struct SecurityCore {
    pub tokens: TokenService,
    pub authz: Arc<AuthorizationEngine>,
    pub guard: Arc<BruteForceGuard>,
    pub audit: AuditRecorder,
}

impl SecurityCore {
    /// Wire the services against the injected stores and role catalog.
    pub fn new(
        config: &IamConfig,
        catalog: Arc<RoleCatalog>,
        identities: Arc<dyn IdentityStore>,
        credentials: Arc<dyn RefreshCredentialStore>,
        audit_store: Arc<dyn AuditEventStore>,
        owners: Arc<dyn ResourceOwnerAccessor>,
    ) -> Self {
        let audit = AuditRecorder::new(audit_store, config.audit.clone());

        let guard = Arc::new(BruteForceGuard::new(
            identities.clone(),
            audit.clone(),
            config.lockout.clone(),
        ));

        let tokens = TokenService::new(
            identities,
            credentials,
            catalog.clone(),
            guard.clone(),
            audit.clone(),
            JwtService::new(&config.jwt),
            config.password.clone(),
            config.jwt.refresh_token_expiry_days,
        );

        let authz = Arc::new(AuthorizationEngine::new(
            catalog,
            owners,
            audit.clone(),
            config.authz.clone(),
        ));

        Self {
            tokens,
            authz,
            guard,
            audit,
        }
    }
}
