//! Brute-force guard - failed-attempt counters and lockout decisions.
//!
//! Identity counters live on the identity record through the store's atomic
//! operations, so multiple service instances sharing a store see the same
//! state. Origin counters are process-local and age out by time window;
//! they are not reset by unrelated successful logins.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::models::{actions, AuditEvent, Outcome, RequestContext, Severity};
use crate::store::IdentityStore;

use super::{AuditRecorder, ServiceError};

/// Lockout policy.
#[derive(Debug, Clone)]
pub struct LockoutConfig {
    /// Consecutive failures that trigger a lock.
    pub max_failed_attempts: u32,
    /// Duration of the first lock; doubles each episode.
    pub base_lock_minutes: i64,
    /// Ceiling for the escalating schedule.
    pub max_lock_minutes: i64,
    /// Failures from one origin within the window that block the origin.
    pub origin_max_failures: u32,
    pub origin_window_seconds: i64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            base_lock_minutes: 15,
            max_lock_minutes: 24 * 60,
            origin_max_failures: 20,
            origin_window_seconds: 300,
        }
    }
}

struct OriginWindow {
    count: u32,
    window_start: DateTime<Utc>,
}

pub struct BruteForceGuard {
    identities: Arc<dyn IdentityStore>,
    audit: AuditRecorder,
    config: LockoutConfig,
    origin_failures: DashMap<String, OriginWindow>,
}

impl BruteForceGuard {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        audit: AuditRecorder,
        config: LockoutConfig,
    ) -> Self {
        Self {
            identities,
            audit,
            config,
            origin_failures: DashMap::new(),
        }
    }

    /// Count a failed attempt against both the identity and the origin.
    /// Crossing the identity threshold locks the account for the current
    /// episode's duration.
    pub async fn record_failure(
        &self,
        identity_id: &str,
        context: &RequestContext,
    ) -> Result<(), ServiceError> {
        self.record_origin_failure(&context.origin);

        let failures = self.identities.increment_failures(identity_id).await?;
        if failures < self.config.max_failed_attempts {
            return Ok(());
        }

        let episode = self
            .identities
            .find_by_id(identity_id)
            .await?
            .map(|i| i.lock_episodes)
            .unwrap_or(0)
            + 1;
        let duration = self.lock_duration(episode);
        let until = Utc::now() + duration;

        self.identities.set_lock(identity_id, until, episode).await?;

        tracing::warn!(
            identity = %identity_id,
            failures,
            episode,
            lock_minutes = duration.num_minutes(),
            "Account locked after repeated authentication failures"
        );
        self.audit
            .record(
                AuditEvent::new(
                    actions::ACCOUNT_LOCKED,
                    "auth",
                    Outcome::Denied,
                    Severity::High,
                    context.clone(),
                )
                .with_identity(identity_id),
            )
            .await;

        Ok(())
    }

    /// Reset the identity counter after a successful authentication.
    /// Lock episodes are kept so repeat offenders stay on the escalated
    /// schedule.
    pub async fn record_success(&self, identity_id: &str) -> Result<(), ServiceError> {
        self.identities.reset_failures(identity_id).await?;
        Ok(())
    }

    /// Count a failure against an origin without an identity (unknown
    /// email, pre-authentication).
    pub fn record_origin_failure(&self, origin: &str) {
        let now = Utc::now();
        let mut window = self
            .origin_failures
            .entry(origin.to_string())
            .or_insert_with(|| OriginWindow {
                count: 0,
                window_start: now,
            });
        if now - window.window_start > Duration::seconds(self.config.origin_window_seconds) {
            window.count = 0;
            window.window_start = now;
        }
        window.count += 1;
    }

    /// Whether an origin has exhausted its failure budget for the current
    /// window.
    pub fn is_origin_blocked(&self, origin: &str) -> bool {
        match self.origin_failures.get(origin) {
            Some(window) => {
                Utc::now() - window.window_start
                    <= Duration::seconds(self.config.origin_window_seconds)
                    && window.count >= self.config.origin_max_failures
            }
            None => false,
        }
    }

    pub async fn is_locked(&self, identity_id: &str) -> Result<bool, ServiceError> {
        Ok(self
            .identities
            .find_by_id(identity_id)
            .await?
            .map(|i| i.is_locked())
            .unwrap_or(false))
    }

    pub async fn locked_until(
        &self,
        identity_id: &str,
    ) -> Result<Option<DateTime<Utc>>, ServiceError> {
        Ok(self
            .identities
            .find_by_id(identity_id)
            .await?
            .and_then(|i| i.locked_until)
            .filter(|until| *until > Utc::now()))
    }

    /// Administrative unlock: zero the counter and clear the lock now.
    pub async fn clear(&self, identity_id: &str) -> Result<(), ServiceError> {
        self.identities.reset_failures(identity_id).await?;
        Ok(())
    }

    fn lock_duration(&self, episode: u32) -> Duration {
        let doublings = episode.saturating_sub(1).min(16);
        let minutes = self
            .config
            .base_lock_minutes
            .saturating_mul(1i64 << doublings)
            .min(self.config.max_lock_minutes);
        Duration::minutes(minutes)
    }
}
