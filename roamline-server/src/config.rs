//! Server configuration - defaults and environment loading
//!
//! Configuration is loaded from environment variables:
//! - `ROAMLINE_BIND_ADDR`: listen address (default: 127.0.0.1:3030)
//! - `DATABASE_URL`: Postgres connection string
//! - `ROAMLINE_MAX_CONNECTIONS`: pool size (default: 10)
//! - `ROAMLINE_ACQUIRE_TIMEOUT_MS`: wait for a pooled connection (default: 5000)
//! - `ROAMLINE_CORS_PERMISSIVE`: allow any origin (default: false)
//! - `ROAMLINE_IDENTITY_HEADER` / `ROAMLINE_CLAIMS_HEADER`: gateway identity headers
//! - `ROAMLINE_DEBUG_ROUTES`: mount `/debug/rls/*` (default: false)
//! - `ROAMLINE_RUN_MIGRATIONS`: migrate on startup (default: false)

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderName;

use crate::db::DEFAULT_MAX_CONNECTIONS;
use crate::session::DEFAULT_ACQUIRE_TIMEOUT;

pub const DEFAULT_IDENTITY_HEADER: &str = "x-roamline-user";
pub const DEFAULT_CLAIMS_HEADER: &str = "x-roamline-claims";

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:3030)
    pub bind_addr: SocketAddr,

    pub database_url: String,

    /// Upper bound on concurrent database-touching requests
    pub max_connections: u32,

    /// How long a request waits for a pooled connection before 503
    pub acquire_timeout: Duration,

    /// Allow permissive CORS (default: false = localhost only)
    ///
    /// WARNING: Setting this to true allows any origin.
    pub cors_permissive: bool,

    /// Header carrying the authenticated principal, set by the gateway
    pub identity_header: String,

    /// Optional header carrying the principal's claims as a JSON object
    pub claims_header: String,

    /// Mount the RLS debug routes. Never enable in production.
    pub debug_routes: bool,

    pub run_migrations: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3030)),
            database_url: "postgres://localhost/roamline".to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            cors_permissive: false,
            identity_header: DEFAULT_IDENTITY_HEADER.to_string(),
            claims_header: DEFAULT_CLAIMS_HEADER.to_string(),
            debug_routes: false,
            run_migrations: false,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup (for testing)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = lookup("ROAMLINE_BIND_ADDR") {
            config.bind_addr = parse("ROAMLINE_BIND_ADDR", v, "expected host:port")?;
        }
        if let Some(v) = lookup("DATABASE_URL") {
            config.database_url = v;
        }
        if let Some(v) = lookup("ROAMLINE_MAX_CONNECTIONS") {
            config.max_connections = parse("ROAMLINE_MAX_CONNECTIONS", v, "expected an integer")?;
        }
        if let Some(v) = lookup("ROAMLINE_ACQUIRE_TIMEOUT_MS") {
            let ms: u64 = parse("ROAMLINE_ACQUIRE_TIMEOUT_MS", v, "expected milliseconds")?;
            config.acquire_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = lookup("ROAMLINE_CORS_PERMISSIVE") {
            config.cors_permissive = parse_flag("ROAMLINE_CORS_PERMISSIVE", v)?;
        }
        if let Some(v) = lookup("ROAMLINE_IDENTITY_HEADER") {
            config.identity_header = v;
        }
        if let Some(v) = lookup("ROAMLINE_CLAIMS_HEADER") {
            config.claims_header = v;
        }
        if let Some(v) = lookup("ROAMLINE_DEBUG_ROUTES") {
            config.debug_routes = parse_flag("ROAMLINE_DEBUG_ROUTES", v)?;
        }
        if let Some(v) = lookup("ROAMLINE_RUN_MIGRATIONS") {
            config.run_migrations = parse_flag("ROAMLINE_RUN_MIGRATIONS", v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "max_connections",
                value: "0".into(),
                reason: "must be at least 1",
            });
        }
        if self.acquire_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "acquire_timeout",
                value: "0".into(),
                reason: "must be positive",
            });
        }
        self.header_names()?;
        Ok(())
    }

    /// Parsed identity and claims header names, reporting whichever is invalid.
    pub fn header_names(&self) -> Result<(HeaderName, HeaderName), ConfigError> {
        let parse = |key: &'static str, value: &str| {
            HeaderName::from_str(value).map_err(|_| ConfigError::Invalid {
                key,
                value: value.to_string(),
                reason: "not a valid header name",
            })
        };
        Ok((
            parse("identity_header", &self.identity_header)?,
            parse("claims_header", &self.claims_header)?,
        ))
    }
}

fn parse<T: FromStr>(key: &'static str, value: String, reason: &'static str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value, reason })
}

fn parse_flag(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value,
            reason: "expected true or false",
        }),
    }
}
