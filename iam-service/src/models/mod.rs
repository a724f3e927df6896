//! Domain models for the IAM core.

mod audit_event;
mod identity;
mod refresh_credential;
mod role;

pub use audit_event::{
    actions, redact_value, AuditEvent, Outcome, RequestContext, Severity, REDACTION_MARKER,
};
pub use identity::{Identity, IdentityResponse};
pub use refresh_credential::RefreshCredential;
pub use role::{Condition, ConditionOp, Grant, Role, RoleCatalog};
