//! Service configuration.

use std::str::FromStr;
use std::time::Duration;

use agris_core::config::{
    ConfigError, DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS, Environment, JwtSettings,
};

/// Deadline applied to every request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for one call to the remote authenticator.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(3);

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Configuration for the user service.
#[derive(Clone, Debug)]
pub struct UserApiConfig {
    /// Address of the public HTTP listener (e.g. "127.0.0.1:8005").
    pub bind_addr: String,
    /// Address of the internal RPC listener.
    pub rpc_bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    pub redis_url: String,
    pub environment: Environment,
    pub jwt: JwtSettings,
    pub request_timeout: Duration,
}

impl UserApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable               | Default                                   |
    /// |------------------------|-------------------------------------------|
    /// | `BIND_ADDR`            | `127.0.0.1:8005`                          |
    /// | `RPC_BIND_ADDR`        | `127.0.0.1:9005`                          |
    /// | `DATABASE_URL`         | `postgres://localhost:5432/agris`         |
    /// | `REDIS_URL`            | `redis://127.0.0.1:6379`                  |
    /// | `APP_ENV`              | `development`                             |
    /// | `JWT_SECRET`           | none, required                            |
    /// | `JWT_ISSUER`           | `user-service`                            |
    /// | `ACCESS_TOKEN_TTL_SECS`  | `900`                                   |
    /// | `REFRESH_TOKEN_TTL_SECS` | `604800`                                |
    /// | `REQUEST_TIMEOUT_SECS` | `10`                                      |
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut jwt = JwtSettings::new(std::env::var("JWT_SECRET").unwrap_or_default());
        if let Ok(issuer) = std::env::var("JWT_ISSUER") {
            jwt.issuer = issuer;
        }
        jwt.access_ttl = chrono::Duration::seconds(env_parse(
            "ACCESS_TOKEN_TTL_SECS",
            DEFAULT_ACCESS_TTL_SECS,
        )?);
        jwt.refresh_ttl = chrono::Duration::seconds(env_parse(
            "REFRESH_TOKEN_TTL_SECS",
            DEFAULT_REFRESH_TTL_SECS,
        )?);

        Ok(Self {
            bind_addr: env_or("BIND_ADDR", "127.0.0.1:8005"),
            rpc_bind_addr: env_or("RPC_BIND_ADDR", "127.0.0.1:9005"),
            pg_connection_url: env_or("DATABASE_URL", "postgres://localhost:5432/agris"),
            redis_url: env_or("REDIS_URL", DEFAULT_REDIS_URL),
            environment: env_parse("APP_ENV", Environment::Development)?,
            jwt,
            request_timeout: Duration::from_secs(env_parse(
                "REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT.as_secs(),
            )?),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.jwt.validate(self.environment)?;
        if self.request_timeout.is_zero() {
            return Err(ConfigError::NonPositive("request timeout"));
        }
        Ok(())
    }
}

/// Configuration for the catalog service.
#[derive(Clone, Debug)]
pub struct CatalogApiConfig {
    /// Address of the public HTTP listener (e.g. "127.0.0.1:8006").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    pub redis_url: String,
    /// Base URL of the user service's RPC listener.
    pub auth_service_url: String,
    pub auth_timeout: Duration,
    pub request_timeout: Duration,
}

impl CatalogApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable               | Default                           |
    /// |------------------------|-----------------------------------|
    /// | `BIND_ADDR`            | `127.0.0.1:8006`                  |
    /// | `DATABASE_URL`         | `postgres://localhost:5432/agris` |
    /// | `REDIS_URL`            | `redis://127.0.0.1:6379`          |
    /// | `AUTH_SERVICE_URL`     | `http://127.0.0.1:9005`           |
    /// | `AUTH_TIMEOUT_SECS`    | `3`                               |
    /// | `REQUEST_TIMEOUT_SECS` | `10`                              |
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: env_or("BIND_ADDR", "127.0.0.1:8006"),
            pg_connection_url: env_or("DATABASE_URL", "postgres://localhost:5432/agris"),
            redis_url: env_or("REDIS_URL", DEFAULT_REDIS_URL),
            auth_service_url: env_or("AUTH_SERVICE_URL", "http://127.0.0.1:9005"),
            auth_timeout: Duration::from_secs(env_parse(
                "AUTH_TIMEOUT_SECS",
                DEFAULT_AUTH_TIMEOUT.as_secs(),
            )?),
            request_timeout: Duration::from_secs(env_parse(
                "REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT.as_secs(),
            )?),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.auth_service_url.starts_with("http://")
            && !self.auth_service_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid {
                name: "auth service url",
                value: self.auth_service_url.clone(),
            });
        }
        if self.auth_timeout.is_zero() {
            return Err(ConfigError::NonPositive("auth timeout"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::NonPositive("request timeout"));
        }
        Ok(())
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn env_parse<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw.clone(),
        }),
        Err(_) => Ok(default),
    }
}
