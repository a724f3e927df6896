//! Authorization engine - hierarchical allow/deny decisions.
//!
//! The decision walks a fixed rule order, short-circuiting on the first
//! definitive answer: super-admin bypass, explicit grant, conditions,
//! ownership, hierarchy. Keeping the rules as separate functions keeps the
//! precedence auditable and testable in isolation.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::models::{
    actions, AuditEvent, Grant, Outcome, RequestContext, RoleCatalog, Severity,
};
use crate::store::ResourceOwnerAccessor;

use super::{AuditRecorder, IdentityContext, ServiceError};

/// Two-tier bulk-operation limits.
///
/// Counts at or below `standard_limit` pass for every role. Above it the
/// actor must sit at `admin_level_floor` or better; above `elevated_limit`
/// only the most privileged defined level passes.
#[derive(Debug, Clone)]
pub struct BulkLimits {
    pub standard_limit: usize,
    pub elevated_limit: usize,
    pub admin_level_floor: i32,
}

impl Default for BulkLimits {
    fn default() -> Self {
        Self {
            standard_limit: 100,
            elevated_limit: 1000,
            admin_level_floor: 2,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct AuthzConfig {
    /// Resources whose mutations are hierarchy-sensitive.
    pub hierarchy_resources: HashSet<String>,
    /// `resource:action` pairs exempt from the super-admin bypass.
    pub super_admin_denied: HashSet<String>,
    pub bulk: BulkLimits,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            hierarchy_resources: ["identities", "roles"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            super_admin_denied: HashSet::new(),
            bulk: BulkLimits::default(),
        }
    }
}

/// Everything the engine needs to know about one request.
#[derive(Debug, Clone)]
pub struct AuthzRequest {
    /// Origin/method/endpoint, recorded with any denial.
    pub request: RequestContext,
    /// Body/query/path fields the conditional rules read.
    pub attributes: Value,
    /// Target record for ownership checks.
    pub resource_id: Option<String>,
    /// Role level of the target identity/role for hierarchy-sensitive
    /// mutations; supplied by the caller, which has loaded the target.
    pub target_level: Option<i32>,
}

impl AuthzRequest {
    pub fn new(request: RequestContext) -> Self {
        Self {
            request,
            attributes: Value::Object(serde_json::Map::new()),
            resource_id: None,
            target_level: None,
        }
    }

    pub fn with_attributes(mut self, attributes: Value) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_resource_id(mut self, resource_id: &str) -> Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn with_target_level(mut self, target_level: i32) -> Self {
        self.target_level = Some(target_level);
        self
    }
}

pub struct AuthorizationEngine {
    catalog: Arc<RoleCatalog>,
    owners: Arc<dyn ResourceOwnerAccessor>,
    audit: AuditRecorder,
    config: AuthzConfig,
}

impl AuthorizationEngine {
    pub fn new(
        catalog: Arc<RoleCatalog>,
        owners: Arc<dyn ResourceOwnerAccessor>,
        audit: AuditRecorder,
        config: AuthzConfig,
    ) -> Self {
        Self {
            catalog,
            owners,
            audit,
            config,
        }
    }

    /// Decide whether `actor` may perform `action` on `resource`.
    pub async fn authorize(
        &self,
        actor: &IdentityContext,
        resource: &str,
        action: &str,
        request: &AuthzRequest,
    ) -> Result<(), ServiceError> {
        if self.rule_super_admin_bypass(actor, resource, action) {
            return Ok(());
        }

        let grant = match self.rule_explicit_grant(actor, resource, action) {
            Some(grant) => grant,
            None => {
                return self
                    .deny_permission(actor, resource, action, request, "no explicit grant")
                    .await
            }
        };

        if !Self::rule_conditions_hold(grant, &request.attributes) {
            return self
                .deny_permission(actor, resource, action, request, "condition not met")
                .await;
        }

        if !self.rule_ownership(actor, grant, resource, request).await? {
            self.audit
                .record(
                    AuditEvent::new(
                        actions::PERMISSION_DENIED,
                        resource,
                        Outcome::Denied,
                        Severity::Medium,
                        request.request.clone(),
                    )
                    .with_identity(&actor.identity_id),
                )
                .await;
            return Err(ServiceError::NotOwner);
        }

        if !self.rule_hierarchy(actor, resource, action, request) {
            tracing::warn!(
                actor = %actor.identity_id,
                actor_level = actor.level,
                target_level = ?request.target_level,
                %resource,
                %action,
                "Hierarchy violation"
            );
            self.audit
                .record(
                    AuditEvent::new(
                        actions::HIERARCHY_VIOLATION,
                        resource,
                        Outcome::Denied,
                        Severity::High,
                        request.request.clone(),
                    )
                    .with_identity(&actor.identity_id),
                )
                .await;
            return Err(ServiceError::HierarchyViolation);
        }

        Ok(())
    }

    /// The most privileged defined level is unrestricted, except for
    /// operations explicitly listed as exempt from the bypass.
    fn rule_super_admin_bypass(
        &self,
        actor: &IdentityContext,
        resource: &str,
        action: &str,
    ) -> bool {
        self.catalog.is_most_privileged(actor.level)
            && !self
                .config
                .super_admin_denied
                .contains(&format!("{resource}:{action}"))
    }

    /// Grants are evaluated from the assertion's snapshot, so the decision
    /// needs no role-store read.
    fn rule_explicit_grant<'a>(
        &self,
        actor: &'a IdentityContext,
        resource: &str,
        action: &str,
    ) -> Option<&'a Grant> {
        actor.grants.iter().find(|g| g.covers(resource, action))
    }

    /// Every condition on the matched grant must hold.
    fn rule_conditions_hold(grant: &Grant, attributes: &Value) -> bool {
        grant.conditions.iter().all(|c| c.holds(attributes))
    }

    /// Owner-scoped grants require the target to belong to the actor,
    /// unless the actor's role bypasses ownership. A missing target or
    /// unknown owner fails closed.
    async fn rule_ownership(
        &self,
        actor: &IdentityContext,
        grant: &Grant,
        resource: &str,
        request: &AuthzRequest,
    ) -> Result<bool, ServiceError> {
        let owner_field = match &grant.owner_field {
            Some(field) => field,
            None => return Ok(true),
        };

        if let Some(role) = self.catalog.role(&actor.role_name) {
            if role.bypass_ownership {
                return Ok(true);
            }
        }

        let owner = match &request.resource_id {
            Some(resource_id) => {
                self.owners
                    .owner_of(resource, resource_id, owner_field)
                    .await?
            }
            None => None,
        };

        Ok(owner.as_deref() == Some(actor.identity_id.as_str()))
    }

    /// Mutations of identities and roles require the actor to be strictly
    /// more privileged than the target; creating subordinates additionally
    /// requires the role flag.
    fn rule_hierarchy(
        &self,
        actor: &IdentityContext,
        resource: &str,
        action: &str,
        request: &AuthzRequest,
    ) -> bool {
        if !self.config.hierarchy_resources.contains(resource) {
            return true;
        }
        let target_level = match request.target_level {
            Some(level) => level,
            None => return true,
        };

        if actor.level >= target_level {
            return false;
        }

        if action == "create" {
            let can_create = self
                .catalog
                .role(&actor.role_name)
                .map(|r| r.can_create_subordinates)
                .unwrap_or(false);
            if !can_create {
                return false;
            }
        }

        true
    }

    async fn deny_permission(
        &self,
        actor: &IdentityContext,
        resource: &str,
        action: &str,
        request: &AuthzRequest,
        detail: &str,
    ) -> Result<(), ServiceError> {
        tracing::debug!(
            actor = %actor.identity_id,
            %resource,
            %action,
            detail,
            "Permission denied"
        );
        self.audit
            .record(
                AuditEvent::new(
                    actions::PERMISSION_DENIED,
                    resource,
                    Outcome::Denied,
                    Severity::Medium,
                    request.request.clone(),
                )
                .with_identity(&actor.identity_id),
            )
            .await;
        Err(ServiceError::PermissionDenied {
            resource: resource.to_string(),
            action: action.to_string(),
        })
    }

    /// Companion guard for bulk operations; see [`BulkLimits`].
    pub async fn check_bulk_size(
        &self,
        actor: &IdentityContext,
        item_count: usize,
        context: &RequestContext,
    ) -> Result<(), ServiceError> {
        let bulk = &self.config.bulk;

        let exceeded_limit = if item_count <= bulk.standard_limit {
            None
        } else if actor.level > bulk.admin_level_floor {
            Some(bulk.standard_limit)
        } else if item_count > bulk.elevated_limit && !self.catalog.is_most_privileged(actor.level)
        {
            Some(bulk.elevated_limit)
        } else {
            None
        };

        match exceeded_limit {
            None => Ok(()),
            Some(limit) => {
                self.audit
                    .record(
                        AuditEvent::new(
                            actions::BULK_LIMIT_EXCEEDED,
                            "bulk",
                            Outcome::Denied,
                            Severity::Medium,
                            context.clone(),
                        )
                        .with_identity(&actor.identity_id),
                    )
                    .await;
                Err(ServiceError::BulkLimitExceeded { limit })
            }
        }
    }
}
