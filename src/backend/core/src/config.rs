//! Configuration management.
//!
//! Values come from an optional file layered under `STAFFGATE__*`
//! environment variables (`__` separates nesting levels, e.g.
//! `STAFFGATE__ACCESS__CACHE_TTL=10m`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::db::AccessSchema;
use crate::error::Result;
use crate::rbac::guard::PermissionOverride;
use crate::rbac::roles::RoleTable;
use crate::telemetry::LoggingConfig;

const ENV_PREFIX: &str = "STAFFGATE";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Deployment environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Access control configuration
    #[serde(default)]
    pub access: AccessConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            database: DatabaseConfig::default(),
            access: AccessConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long to wait for a pooled connection
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout: default_acquire_timeout(),
        }
    }
}

impl DatabaseConfig {
    /// The connection URL with any password replaced by `****`.
    pub fn masked_url(&self) -> String {
        let Some((scheme, rest)) = self.url.split_once("://") else {
            return self.url.clone();
        };
        let Some((credentials, host)) = rest.rsplit_once('@') else {
            return self.url.clone();
        };
        match credentials.split_once(':') {
            Some((user, _)) => format!("{}://{}:****@{}", scheme, user, host),
            None => self.url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Lifetime of permission cache entries
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// Upper bound on each resolver store lookup
    #[serde(default = "default_resolver_timeout", with = "humantime_serde")]
    pub resolver_timeout: Duration,

    /// Role tag → permission strings; replaces or adds a role
    #[serde(default)]
    pub role_overrides: HashMap<String, Vec<String>>,

    /// User id → extra grants and revocations
    #[serde(default)]
    pub user_overrides: HashMap<String, PermissionOverride>,

    /// Storage layout used by the context resolvers
    #[serde(default)]
    pub schema: AccessSchema,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            cache_ttl: default_cache_ttl(),
            resolver_timeout: default_resolver_timeout(),
            role_overrides: HashMap::new(),
            user_overrides: HashMap::new(),
            schema: AccessSchema::default(),
        }
    }
}

// Default value functions
fn default_environment() -> String { "production".to_string() }
fn default_database_url() -> String { "postgres://localhost:5432/staffgate".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 1 }
fn default_acquire_timeout() -> Duration { Duration::from_secs(5) }
fn default_cache_ttl() -> Duration { Duration::from_secs(300) }
fn default_resolver_timeout() -> Duration { Duration::from_secs(3) }

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment variables on top.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject role overrides and schema descriptors that would only fail later.
    pub fn validate(&self) -> Result<()> {
        RoleTable::from_config(&self.access.role_overrides)?;
        self.access.schema.validate()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
