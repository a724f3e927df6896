use secrecy::SecretString;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

use crate::services::{AuditConfig, AuthzConfig, LockoutConfig, PasswordPolicy};

#[derive(Debug, Clone)]
pub struct IamConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub jwt: JwtConfig,
    pub lockout: LockoutConfig,
    pub authz: AuthzConfig,
    pub audit: AuditConfig,
    pub password: PasswordPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HS256 signing secret. Never logged; `SecretString` redacts Debug.
    pub secret: SecretString,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

impl IamConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        let config = IamConfig {
            common,
            environment,
            service_name: get_env("SERVICE_NAME", Some("iam-service"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            jwt: JwtConfig {
                secret: SecretString::new(get_env("JWT_SECRET", None, is_prod)?),
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    Some("15"),
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    Some("7"),
                    is_prod,
                )?,
            },
            lockout: LockoutConfig {
                max_failed_attempts: parse_env("LOCKOUT_MAX_FAILED_ATTEMPTS", Some("5"), is_prod)?,
                base_lock_minutes: parse_env("LOCKOUT_BASE_LOCK_MINUTES", Some("15"), is_prod)?,
                max_lock_minutes: parse_env("LOCKOUT_MAX_LOCK_MINUTES", Some("1440"), is_prod)?,
                origin_max_failures: parse_env("LOCKOUT_ORIGIN_MAX_FAILURES", Some("20"), is_prod)?,
                origin_window_seconds: parse_env(
                    "LOCKOUT_ORIGIN_WINDOW_SECONDS",
                    Some("300"),
                    is_prod,
                )?,
            },
            authz: {
                let mut authz = AuthzConfig::default();
                authz.bulk.standard_limit =
                    parse_env("BULK_STANDARD_LIMIT", Some("100"), is_prod)?;
                authz.bulk.elevated_limit =
                    parse_env("BULK_ELEVATED_LIMIT", Some("1000"), is_prod)?;
                authz.bulk.admin_level_floor =
                    parse_env("BULK_ADMIN_LEVEL_FLOOR", Some("2"), is_prod)?;
                authz
            },
            audit: {
                let mut audit = AuditConfig::default();
                audit.queue_capacity = parse_env("AUDIT_QUEUE_CAPACITY", Some("256"), is_prod)?;
                audit.sensitive_fields = get_env(
                    "AUDIT_SENSITIVE_FIELDS",
                    Some("password,token,secret,card,cvv,authorization"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .collect();
                audit
            },
            password: PasswordPolicy {
                min_length: parse_env("PASSWORD_MIN_LENGTH", Some("12"), is_prod)?,
                require_uppercase: parse_env("PASSWORD_REQUIRE_UPPERCASE", Some("true"), is_prod)?,
                require_number: parse_env("PASSWORD_REQUIRE_NUMBER", Some("true"), is_prod)?,
                require_special: parse_env("PASSWORD_REQUIRE_SPECIAL", Some("true"), is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if self.lockout.max_failed_attempts == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "LOCKOUT_MAX_FAILED_ATTEMPTS must be at least 1"
            )));
        }

        if self.authz.bulk.elevated_limit < self.authz.bulk.standard_limit {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BULK_ELEVATED_LIMIT must not be below BULK_STANDARD_LIMIT"
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?
        .parse()
        .map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("{key} is invalid: {e}"))
        })
}
