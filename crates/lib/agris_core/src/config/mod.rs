//! Token settings and their startup validation.
//!
//! | Setting | Default |
//! |---|---|
//! | issuer | `user-service` |
//! | access TTL | 15 minutes |
//! | refresh TTL | 7 days |
//!
//! The secret has no usable default: it must be at least 32 characters,
//! and the well-known placeholder [`DEFAULT_JWT_SECRET`] is refused in
//! production.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use thiserror::Error;

/// Placeholder secret shipped in sample env files.
pub const DEFAULT_JWT_SECRET: &str = "default-secret-change-in-production";

/// Minimum accepted secret length, in characters.
pub const MIN_SECRET_LEN: usize = 32;

pub const DEFAULT_ISSUER: &str = "user-service";

/// Access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;

/// Refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Configuration errors, reported once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("JWT secret is required")]
    MissingSecret,

    #[error("JWT secret must be at least {MIN_SECRET_LEN} characters")]
    SecretTooShort,

    #[error("the default JWT secret cannot be used in production")]
    DefaultSecretInProduction,

    #[error("{0} must be greater than zero")]
    NonPositive(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(ConfigError::Invalid {
                name: "environment",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Production => f.write_str("production"),
        }
    }
}

/// Signing settings for the token manager.
#[derive(Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

impl JwtSettings {
    /// Settings with default issuer and lifetimes.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: DEFAULT_ISSUER.to_string(),
            access_ttl: Duration::seconds(DEFAULT_ACCESS_TTL_SECS),
            refresh_ttl: Duration::seconds(DEFAULT_REFRESH_TTL_SECS),
        }
    }

    pub fn validate(&self, env: Environment) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if env == Environment::Production && self.secret == DEFAULT_JWT_SECRET {
            return Err(ConfigError::DefaultSecretInProduction);
        }
        if self.secret.chars().count() < MIN_SECRET_LEN {
            return Err(ConfigError::SecretTooShort);
        }
        if self.access_ttl <= Duration::zero() {
            return Err(ConfigError::NonPositive("access token TTL"));
        }
        if self.refresh_ttl <= Duration::zero() {
            return Err(ConfigError::NonPositive("refresh token TTL"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn accepts_long_secret() {
        let s = JwtSettings::new(GOOD_SECRET);
        assert_eq!(s.validate(Environment::Production), Ok(()));
    }

    #[test]
    fn rejects_empty_secret() {
        let s = JwtSettings::new("");
        assert_eq!(
            s.validate(Environment::Development),
            Err(ConfigError::MissingSecret)
        );
    }

    #[test]
    fn rejects_short_secret() {
        let s = JwtSettings::new("too-short");
        assert_eq!(
            s.validate(Environment::Development),
            Err(ConfigError::SecretTooShort)
        );
    }

    #[test]
    fn default_secret_is_refused_only_in_production() {
        let s = JwtSettings::new(DEFAULT_JWT_SECRET);
        assert_eq!(
            s.validate(Environment::Production),
            Err(ConfigError::DefaultSecretInProduction)
        );
        assert_eq!(s.validate(Environment::Development), Ok(()));
    }

    #[test]
    fn rejects_zero_ttl() {
        let mut s = JwtSettings::new(GOOD_SECRET);
        s.access_ttl = Duration::zero();
        assert!(matches!(
            s.validate(Environment::Development),
            Err(ConfigError::NonPositive(_))
        ));
    }

    #[test]
    fn debug_hides_secret() {
        let s = JwtSettings::new(GOOD_SECRET);
        assert!(!format!("{s:?}").contains(GOOD_SECRET));
    }

    #[test]
    fn environment_parses_aliases() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("dev".parse::<Environment>(), Ok(Environment::Development));
        assert!("staging".parse::<Environment>().is_err());
    }
}
