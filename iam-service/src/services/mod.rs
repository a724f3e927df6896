//! Services layer for the IAM core.
//!
//! Token lifecycle, authorization decisions, brute-force defense, and
//! audit recording.

mod audit;
mod authorization;
mod brute_force;
pub mod error;
mod policy;
mod token;

pub use audit::{
    ActionOptions, AuditConfig, AuditRecorder, Finding, FindingCode, OriginCount, SecurityReport,
};
pub use authorization::{AuthorizationEngine, AuthzConfig, AuthzRequest, BulkLimits};
pub use brute_force::{BruteForceGuard, LockoutConfig};
pub use error::ServiceError;
pub use policy::{PasswordPolicy, PolicyError, PolicyService};
pub use token::{
    AccessTokenClaims, IdentityContext, JwtService, RevocationScope, TokenResponse, TokenService,
};
