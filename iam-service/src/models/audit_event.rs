//! Audit event model - security and compliance logging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Placeholder written over sensitive payload fields before persistence.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Well-known action names recorded by the core itself.
pub mod actions {
    pub const LOGIN: &str = "login";
    pub const LOGOUT: &str = "logout";
    pub const TOKEN_REFRESH: &str = "token_refresh";
    pub const TOKEN_REUSE_DETECTED: &str = "token_reuse_detected";
    pub const PASSWORD_CHANGE: &str = "password_change";
    pub const ACCOUNT_LOCKED: &str = "account_locked";
    pub const PERMISSION_DENIED: &str = "permission_denied";
    pub const HIERARCHY_VIOLATION: &str = "hierarchy_violation";
    pub const BULK_LIMIT_EXCEEDED: &str = "bulk_limit_exceeded";
}

/// Ordinal severity attached to every event; drives monitoring thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Outcome of the audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed,
    Denied,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failed => "failed",
            Outcome::Denied => "denied",
        }
    }
}

/// Request context captured alongside every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub origin: String,
    pub user_agent: Option<String>,
    pub method: String,
    pub endpoint: String,
}

impl RequestContext {
    pub fn new(origin: &str, method: &str, endpoint: &str) -> Self {
        Self {
            origin: origin.to_string(),
            user_agent: None,
            method: method.to_string(),
            endpoint: endpoint.to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = Some(user_agent.to_string());
        self
    }
}

/// Append-only audit event. Never mutated after it is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,

    /// Absent for pre-authentication events.
    pub identity_id: Option<String>,

    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,

    pub outcome: Outcome,
    pub severity: Severity,

    pub context: RequestContext,

    pub old_values: Option<Value>,
    pub new_values: Option<Value>,

    pub created_utc: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        action: &str,
        resource: &str,
        outcome: Outcome,
        severity: Severity,
        context: RequestContext,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            identity_id: None,
            action: action.to_string(),
            resource: resource.to_string(),
            resource_id: None,
            outcome,
            severity,
            context,
            old_values: None,
            new_values: None,
            created_utc: Utc::now(),
        }
    }

    pub fn with_identity(mut self, identity_id: &str) -> Self {
        self.identity_id = Some(identity_id.to_string());
        self
    }

    pub fn with_resource_id(mut self, resource_id: &str) -> Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn with_snapshots(mut self, old_values: Option<Value>, new_values: Option<Value>) -> Self {
        self.old_values = old_values;
        self.new_values = new_values;
        self
    }

    /// Redact sensitive fields in both value snapshots.
    pub fn redact(&mut self, sensitive_fields: &[String]) {
        if let Some(old) = self.old_values.as_mut() {
            redact_value(old, sensitive_fields);
        }
        if let Some(new) = self.new_values.as_mut() {
            redact_value(new, sensitive_fields);
        }
    }
}

/// Replace any field whose lowercased name contains a sensitive-field entry,
/// recursing through nested objects and arrays.
pub fn redact_value(value: &mut Value, sensitive_fields: &[String]) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                let key = key.to_lowercase();
                if sensitive_fields.iter().any(|f| key.contains(f.as_str())) {
                    *entry = Value::String(REDACTION_MARKER.to_string());
                } else {
                    redact_value(entry, sensitive_fields);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_value(item, sensitive_fields);
            }
        }
        _ => {}
    }
}
