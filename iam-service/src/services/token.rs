//! Token service - credential verification and token lifecycle.
//!
//! Access assertions are short-lived HS256 JWTs carrying a snapshot of the
//! role's grants, verified by signature and expiry alone. Refresh
//! credentials are opaque random values stored as digests and rotated on
//! every use; presenting a rotated credential again revokes the identity's
//! whole session set.

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::Rng;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::{
    actions, AuditEvent, Grant, Identity, Outcome, RefreshCredential, RequestContext, Role,
    RoleCatalog, Severity,
};
use crate::store::{IdentityStore, RefreshCredentialStore};
use crate::utils::password::{
    hash_password, verify_against_dummy, verify_password, Password, PasswordHashString,
};

use super::{AuditRecorder, BruteForceGuard, PasswordPolicy, PolicyService, ServiceError};

/// Claims carried by an access assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (identity id)
    pub sub: String,
    pub email: String,
    /// Assigned role name
    pub role: String,
    /// Hierarchy level of the role
    pub level: i32,
    /// Snapshot of the role's grants at issue time
    pub grants: Vec<Grant>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// JWT ID
    pub jti: String,
}

/// The authenticated caller, as seen by the authorization engine.
#[derive(Debug, Clone)]
pub struct IdentityContext {
    pub identity_id: String,
    pub email: String,
    pub role_name: String,
    pub level: i32,
    pub grants: Vec<Grant>,
}

impl From<AccessTokenClaims> for IdentityContext {
    fn from(claims: AccessTokenClaims) -> Self {
        Self {
            identity_id: claims.sub,
            email: claims.email,
            role_name: claims.role,
            level: claims.level,
            grants: claims.grants,
        }
    }
}

/// Token pair returned to the client.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// What `revoke` targets.
#[derive(Debug, Clone)]
pub enum RevocationScope {
    /// One refresh credential by id.
    Single(String),
    /// Every credential for the identity.
    All,
}

/// JWT signing and validation for access assertions.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_minutes: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
        }
    }

    pub fn generate_access_token(
        &self,
        identity: &Identity,
        role: &Role,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let claims = AccessTokenClaims {
            sub: identity.id.clone(),
            email: identity.email.clone(),
            role: role.name.clone(),
            level: role.level,
            grants: role.grants.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to encode token: {e}")))
    }

    /// Signature + expiry check only; no storage involved.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        match decode::<AccessTokenClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => Err(ServiceError::TokenExpired),
                _ => Err(ServiceError::TokenMalformed),
            },
        }
    }

    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}

#[derive(Clone)]
pub struct TokenService {
    identities: Arc<dyn IdentityStore>,
    credentials: Arc<dyn RefreshCredentialStore>,
    catalog: Arc<RoleCatalog>,
    guard: Arc<BruteForceGuard>,
    audit: AuditRecorder,
    jwt: JwtService,
    password_policy: PasswordPolicy,
    refresh_token_expiry_days: i64,
}

impl TokenService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        credentials: Arc<dyn RefreshCredentialStore>,
        catalog: Arc<RoleCatalog>,
        guard: Arc<BruteForceGuard>,
        audit: AuditRecorder,
        jwt: JwtService,
        password_policy: PasswordPolicy,
        refresh_token_expiry_days: i64,
    ) -> Self {
        Self {
            identities,
            credentials,
            catalog,
            guard,
            audit,
            jwt,
            password_policy,
            refresh_token_expiry_days,
        }
    }

    /// Verify a password and issue a token pair.
    ///
    /// Unknown email and wrong password produce the same error and burn
    /// the same verification work, so callers cannot enumerate identities.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
        context: &RequestContext,
    ) -> Result<TokenResponse, ServiceError> {
        if self.guard.is_origin_blocked(&context.origin) {
            self.audit
                .record(self.login_failure_event(None, context))
                .await;
            return Err(ServiceError::OriginThrottled);
        }

        let identity = match self.identities.find_by_email(email).await? {
            Some(identity) => identity,
            None => {
                verify_against_dummy(&Password::new(password.to_string()));
                self.guard.record_origin_failure(&context.origin);
                self.audit
                    .record(self.login_failure_event(None, context))
                    .await;
                return Err(ServiceError::InvalidCredentials);
            }
        };

        if let Some(until) = identity.locked_until.filter(|until| *until > Utc::now()) {
            self.audit
                .record(self.login_failure_event(Some(&identity.id), context))
                .await;
            return Err(ServiceError::AccountLocked { until });
        }

        if !identity.active {
            self.audit
                .record(self.login_failure_event(Some(&identity.id), context))
                .await;
            return Err(ServiceError::AccountDisabled);
        }

        let presented = Password::new(password.to_string());
        let stored = PasswordHashString::new(identity.password_hash.clone());
        if verify_password(&presented, &stored).is_err() {
            self.guard.record_failure(&identity.id, context).await?;
            self.audit
                .record(self.login_failure_event(Some(&identity.id), context))
                .await;
            return Err(ServiceError::InvalidCredentials);
        }

        self.guard.record_success(&identity.id).await?;

        let response = self.issue_pair(&identity).await?;

        tracing::info!(identity = %identity.id, "Operator authenticated");
        self.audit
            .record(
                AuditEvent::new(
                    actions::LOGIN,
                    "auth",
                    Outcome::Success,
                    Severity::Low,
                    context.clone(),
                )
                .with_identity(&identity.id),
            )
            .await;

        Ok(response)
    }

    /// Validate an access assertion. Pure function of the token and the
    /// clock; safe to call on every protected request.
    pub fn verify_access(&self, token: &str) -> Result<IdentityContext, ServiceError> {
        let claims = self.jwt.validate_access_token(token)?;
        Ok(IdentityContext::from(claims))
    }

    /// Rotate a refresh credential into a new token pair.
    pub async fn refresh(
        &self,
        raw_token: &str,
        context: &RequestContext,
    ) -> Result<TokenResponse, ServiceError> {
        let hash = RefreshCredential::hash_value(raw_token);
        let credential = match self.credentials.find_by_hash(&hash).await? {
            Some(credential) => credential,
            None => {
                self.audit
                    .record(self.refresh_failure_event(None, context))
                    .await;
                return Err(ServiceError::TokenNotFound);
            }
        };

        // A replaced credential coming back is proof of theft; the check
        // precedes everything else so an attacker cannot learn more from
        // the error shape.
        if credential.was_replaced() {
            return self.respond_to_reuse(&credential, context).await;
        }

        if credential.revoked {
            self.audit
                .record(self.refresh_failure_event(Some(&credential.identity_id), context))
                .await;
            return Err(ServiceError::TokenRevoked);
        }

        if credential.is_expired() {
            self.audit
                .record(self.refresh_failure_event(Some(&credential.identity_id), context))
                .await;
            return Err(ServiceError::TokenExpired);
        }

        let identity = self
            .identities
            .find_by_id(&credential.identity_id)
            .await?
            .ok_or_else(|| {
                ServiceError::Internal(anyhow::anyhow!(
                    "identity missing for live refresh credential"
                ))
            })?;

        if !identity.active {
            self.audit
                .record(self.refresh_failure_event(Some(&identity.id), context))
                .await;
            return Err(ServiceError::AccountDisabled);
        }

        let role = self.role_for(&identity)?;

        // Winner-takes-all: of two concurrent rotations of the same
        // credential, the loser is handled exactly like replay.
        let next_id = Uuid::new_v4().to_string();
        if !self.credentials.mark_replaced(&credential.id, &next_id).await? {
            return self.respond_to_reuse(&credential, context).await;
        }

        let access_token = self.jwt.generate_access_token(&identity, role)?;
        let raw_next = generate_opaque_token();
        let next = RefreshCredential::new_with_id(
            next_id,
            identity.id.clone(),
            &raw_next,
            Duration::days(self.refresh_token_expiry_days),
        );
        self.credentials.insert(next).await?;

        tracing::debug!(identity = %identity.id, "Refresh credential rotated");
        self.audit
            .record(
                AuditEvent::new(
                    actions::TOKEN_REFRESH,
                    "auth",
                    Outcome::Success,
                    Severity::Low,
                    context.clone(),
                )
                .with_identity(&identity.id),
            )
            .await;

        Ok(TokenResponse {
            access_token,
            refresh_token: raw_next,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_token_expiry_seconds(),
        })
    }

    /// Revoke one or all refresh credentials for an identity. Idempotent.
    pub async fn revoke(
        &self,
        identity_id: &str,
        scope: RevocationScope,
        context: &RequestContext,
    ) -> Result<(), ServiceError> {
        match scope {
            RevocationScope::Single(credential_id) => {
                self.credentials.revoke(&credential_id).await?;
            }
            RevocationScope::All => {
                self.credentials.revoke_all_for_identity(identity_id).await?;
            }
        }

        self.audit
            .record(
                AuditEvent::new(
                    actions::LOGOUT,
                    "auth",
                    Outcome::Success,
                    Severity::Low,
                    context.clone(),
                )
                .with_identity(identity_id),
            )
            .await;

        Ok(())
    }

    /// Change a password after verifying the current one. All sessions are
    /// revoked as a side effect.
    pub async fn change_password(
        &self,
        identity_id: &str,
        old_password: &str,
        new_password: &str,
        context: &RequestContext,
    ) -> Result<(), ServiceError> {
        let identity = self
            .identities
            .find_by_id(identity_id)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        let presented = Password::new(old_password.to_string());
        let stored = PasswordHashString::new(identity.password_hash.clone());
        if verify_password(&presented, &stored).is_err() {
            self.audit
                .record(
                    AuditEvent::new(
                        actions::PASSWORD_CHANGE,
                        "identities",
                        Outcome::Failed,
                        Severity::Medium,
                        context.clone(),
                    )
                    .with_identity(&identity.id),
                )
                .await;
            return Err(ServiceError::InvalidCredentials);
        }

        let violations = PolicyService::validate_password_all(new_password, &self.password_policy);
        if !violations.is_empty() {
            let detail = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ServiceError::WeakPassword(detail));
        }

        let new_hash = hash_password(&Password::new(new_password.to_string()))?;
        self.identities
            .update_password(&identity.id, new_hash.into_string())
            .await?;
        self.credentials
            .revoke_all_for_identity(&identity.id)
            .await?;

        tracing::info!(identity = %identity.id, "Password changed, all sessions revoked");
        self.audit
            .record(
                AuditEvent::new(
                    actions::PASSWORD_CHANGE,
                    "identities",
                    Outcome::Success,
                    Severity::Low,
                    context.clone(),
                )
                .with_identity(&identity.id),
            )
            .await;

        Ok(())
    }

    async fn issue_pair(&self, identity: &Identity) -> Result<TokenResponse, ServiceError> {
        let role = self.role_for(identity)?;
        let access_token = self.jwt.generate_access_token(identity, role)?;

        let raw_refresh = generate_opaque_token();
        let credential = RefreshCredential::new(
            identity.id.clone(),
            &raw_refresh,
            Duration::days(self.refresh_token_expiry_days),
        );
        self.credentials.insert(credential).await?;

        Ok(TokenResponse {
            access_token,
            refresh_token: raw_refresh,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_token_expiry_seconds(),
        })
    }

    fn role_for(&self, identity: &Identity) -> Result<&Role, ServiceError> {
        self.catalog.role(&identity.role_name).ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!(
                "role '{}' is not in the catalog",
                identity.role_name
            ))
        })
    }

    /// Theft response: revoke the whole session set and record at
    /// critical severity. The presenter still sees a plain revocation.
    async fn respond_to_reuse(
        &self,
        credential: &RefreshCredential,
        context: &RequestContext,
    ) -> Result<TokenResponse, ServiceError> {
        let revoked = self
            .credentials
            .revoke_all_for_identity(&credential.identity_id)
            .await?;

        tracing::warn!(
            identity = %credential.identity_id,
            credential = %credential.id,
            revoked,
            "Rotated refresh credential presented again; revoking all sessions"
        );
        self.audit
            .record(
                AuditEvent::new(
                    actions::TOKEN_REUSE_DETECTED,
                    "auth",
                    Outcome::Denied,
                    Severity::Critical,
                    context.clone(),
                )
                .with_identity(&credential.identity_id)
                .with_resource_id(&credential.id),
            )
            .await;

        Err(ServiceError::TokenRevoked)
    }

    fn login_failure_event(
        &self,
        identity_id: Option<&str>,
        context: &RequestContext,
    ) -> AuditEvent {
        let mut event = AuditEvent::new(
            actions::LOGIN,
            "auth",
            Outcome::Failed,
            Severity::Medium,
            context.clone(),
        );
        if let Some(id) = identity_id {
            event = event.with_identity(id);
        }
        event
    }

    fn refresh_failure_event(
        &self,
        identity_id: Option<&str>,
        context: &RequestContext,
    ) -> AuditEvent {
        let mut event = AuditEvent::new(
            actions::TOKEN_REFRESH,
            "auth",
            Outcome::Failed,
            Severity::Medium,
            context.clone(),
        );
        if let Some(id) = identity_id {
            event = event.with_identity(id);
        }
        event
    }
}

fn generate_opaque_token() -> String {
    let mut rng = rand::thread_rng();
    let token_bytes: [u8; 32] = rng.gen();
    hex::encode(token_bytes)
}
