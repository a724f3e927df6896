use chrono::{DateTime, Utc};
use service_core::error::AppError;
use thiserror::Error;

use crate::store::StoreError;

/// Caller-facing error taxonomy for the security core.
///
/// Everything here is recoverable and typed; the request layer maps it to a
/// status signal through `AppError`. Only `Store` and `Internal` represent
/// subsystem faults.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked until {until}")]
    AccountLocked { until: DateTime<Utc> },

    #[error("Account disabled")]
    AccountDisabled,

    #[error("Password does not meet policy: {0}")]
    WeakPassword(String),

    #[error("Too many attempts from this origin")]
    OriginThrottled,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token malformed or signature invalid")]
    TokenMalformed,

    #[error("Token not found")]
    TokenNotFound,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Permission denied for {action} on {resource}")]
    PermissionDenied { resource: String, action: String },

    #[error("Not the owner of the target resource")]
    NotOwner,

    #[error("Target role level is not subordinate to the acting role")]
    HierarchyViolation,

    #[error("Bulk operation exceeds the limit of {limit} items")]
    BulkLimitExceeded { limit: usize },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::AccountLocked { until } => {
                let retry = (until - Utc::now()).num_seconds().max(0) as u64;
                AppError::TooManyRequests("Account locked".to_string(), Some(retry))
            }
            ServiceError::AccountDisabled => {
                AppError::Forbidden(anyhow::anyhow!("Account disabled"))
            }
            ServiceError::WeakPassword(detail) => AppError::BadRequest(anyhow::anyhow!(detail)),
            ServiceError::OriginThrottled => {
                AppError::TooManyRequests("Too many attempts".to_string(), None)
            }
            ServiceError::TokenExpired => AppError::AuthError(anyhow::anyhow!("Token expired")),
            ServiceError::TokenMalformed => {
                AppError::AuthError(anyhow::anyhow!("Token malformed"))
            }
            ServiceError::TokenNotFound => AppError::AuthError(anyhow::anyhow!("Token not found")),
            ServiceError::TokenRevoked => AppError::AuthError(anyhow::anyhow!("Token revoked")),
            ServiceError::PermissionDenied { resource, action } => AppError::Forbidden(
                anyhow::anyhow!("Permission denied for {action} on {resource}"),
            ),
            ServiceError::NotOwner => {
                AppError::Forbidden(anyhow::anyhow!("Not the owner of the target resource"))
            }
            ServiceError::HierarchyViolation => {
                AppError::Forbidden(anyhow::anyhow!("Role hierarchy violation"))
            }
            ServiceError::BulkLimitExceeded { limit } => AppError::Forbidden(anyhow::anyhow!(
                "Bulk operation exceeds the limit of {limit} items"
            )),
            ServiceError::Store(e) => AppError::StorageError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
