//! Password strength policy.
//!
//! Checked before any store write; a violation never reaches the identity
//! record.

use serde::Deserialize;

const SPECIAL_CHARS: &str = "!@#$%^&*()-_=+[]{}|\\;:'\",.<>/?`~";

/// Minimum-strength requirements for operator passwords.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordPolicy {
    pub min_length: u8,
    pub require_uppercase: bool,
    pub require_number: bool,
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 12,
            require_uppercase: true,
            require_number: true,
            require_special: true,
        }
    }
}

/// A single policy violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    PasswordTooShort {
        min_length: u8,
        actual_length: usize,
    },
    PasswordMissingUppercase,
    PasswordMissingNumber,
    PasswordMissingSpecial,
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::PasswordTooShort {
                min_length,
                actual_length,
            } => write!(
                f,
                "Password must be at least {} characters (got {})",
                min_length, actual_length
            ),
            PolicyError::PasswordMissingUppercase => {
                write!(f, "Password must contain at least one uppercase letter")
            }
            PolicyError::PasswordMissingNumber => {
                write!(f, "Password must contain at least one number")
            }
            PolicyError::PasswordMissingSpecial => {
                write!(f, "Password must contain at least one special character")
            }
        }
    }
}

impl std::error::Error for PolicyError {}

pub struct PolicyService;

impl PolicyService {
    /// First violation found, or Ok.
    pub fn validate_password(password: &str, policy: &PasswordPolicy) -> Result<(), PolicyError> {
        match Self::validate_password_all(password, policy).into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Every violation at once, for callers that surface the full list.
    pub fn validate_password_all(password: &str, policy: &PasswordPolicy) -> Vec<PolicyError> {
        let mut errors = Vec::new();

        if password.chars().count() < policy.min_length as usize {
            errors.push(PolicyError::PasswordTooShort {
                min_length: policy.min_length,
                actual_length: password.chars().count(),
            });
        }

        if policy.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
            errors.push(PolicyError::PasswordMissingUppercase);
        }

        if policy.require_number && !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push(PolicyError::PasswordMissingNumber);
        }

        if policy.require_special && !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
            errors.push(PolicyError::PasswordMissingSpecial);
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict_policy() -> PasswordPolicy {
        PasswordPolicy {
            min_length: 12,
            require_uppercase: true,
            require_number: true,
            require_special: true,
        }
    }

    fn lenient_policy() -> PasswordPolicy {
        PasswordPolicy {
            min_length: 1,
            require_uppercase: false,
            require_number: false,
            require_special: false,
        }
    }

    #[test]
    fn test_password_too_short() {
        let result = PolicyService::validate_password("Short1!", &strict_policy());
        assert!(matches!(result, Err(PolicyError::PasswordTooShort { .. })));
    }

    #[test]
    fn test_password_missing_uppercase() {
        let result = PolicyService::validate_password("longenoughpassword1!", &strict_policy());
        assert!(matches!(result, Err(PolicyError::PasswordMissingUppercase)));
    }

    #[test]
    fn test_password_missing_number() {
        let result = PolicyService::validate_password("LongEnoughPassword!", &strict_policy());
        assert!(matches!(result, Err(PolicyError::PasswordMissingNumber)));
    }

    #[test]
    fn test_password_missing_special() {
        let result = PolicyService::validate_password("LongEnoughPassword1", &strict_policy());
        assert!(matches!(result, Err(PolicyError::PasswordMissingSpecial)));
    }

    #[test]
    fn test_valid_password_strict() {
        let result = PolicyService::validate_password("LongEnoughP@ss1", &strict_policy());
        assert!(result.is_ok());
    }

    #[test]
    fn test_valid_password_lenient() {
        let result = PolicyService::validate_password("simple", &lenient_policy());
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_all_returns_every_violation() {
        let errors = PolicyService::validate_password_all("short", &strict_policy());
        assert_eq!(errors.len(), 4);
    }
}
