use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::AppError;

pub const DEFAULT_PERMISSION_TTL_SECS: i64 = 3600;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2000;

/// Tunables for the authorization core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// How long a resolved permission set stays authoritative.
    pub permission_ttl: chrono::Duration,
    /// Upper bound on identity and permission store lookups.
    pub store_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            permission_ttl: chrono::Duration::seconds(DEFAULT_PERMISSION_TTL_SECS),
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let ttl_secs: i64 = env_or("PERMISSION_CACHE_TTL_SECS", DEFAULT_PERMISSION_TTL_SECS)?;
        if ttl_secs <= 0 {
            return Err(AppError::configuration("PERMISSION_CACHE_TTL_SECS must be positive"));
        }
        let timeout_ms: u64 = env_or("AUTH_STORE_TIMEOUT_MS", DEFAULT_STORE_TIMEOUT_MS)?;
        if timeout_ms == 0 {
            return Err(AppError::configuration("AUTH_STORE_TIMEOUT_MS must be positive"));
        }

        Ok(Self {
            permission_ttl: chrono::Duration::seconds(ttl_secs),
            store_timeout: Duration::from_millis(timeout_ms),
        })
    }
}

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub tls: Option<TlsPaths>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let port = env_or("APP_PORT", 8000u16)?;
        let cert = std::env::var("TLS_CERT_PATH").ok().filter(|v| !v.is_empty());
        let key = std::env::var("TLS_KEY_PATH").ok().filter(|v| !v.is_empty());

        let tls = match (cert, key) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => {
                return Err(AppError::configuration(
                    "TLS_CERT_PATH and TLS_KEY_PATH must be set together",
                ))
            }
        };

        Ok(Self { port, tls })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::configuration(format!("{key} has an invalid value: {raw}"))),
        _ => Ok(default),
    }
}
