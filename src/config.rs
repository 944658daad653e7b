//! Configuration system for Entitle.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `ENTITLE_SERVER_HOST` - Server bind address
//! - `ENTITLE_SERVER_PORT` - Server port
//! - `ENTITLE_DATABASE_TYPE` - `sqlite` or `postgres`
//! - `ENTITLE_DATABASE_URL` - Database connection URL (routed by scheme)
//! - `ENTITLE_MAX_UPLOAD_BYTES` - Maximum license upload size
//! - `ENTITLE_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
//! - `ENTITLE_AUTH_ENABLED` - Require JWT bearer tokens
//! - `ENTITLE_JWT_SECRET` - JWT secret key for signing/validation
//! - `ENTITLE_JWT_ISSUER` - JWT issuer claim
//! - `ENTITLE_JWT_AUDIENCE` - JWT audience claim
//! - `ENTITLE_TOKEN_EXPIRATION_SECS` - Token expiration time in seconds
//! - `ENTITLE_GEOIP_XDB_PATH` - Path to an ip2region xdb file

use config::{Config, ConfigBuilder, ConfigError, Value};
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;

use crate::errors::{LicenseError, LicenseResult};

/// Global configuration singleton.
static CONFIG: OnceLock<EntitleConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EntitleConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub license: LicenseConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub geoip: GeoIpConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database type: "sqlite" or "postgres"
    pub db_type: String,
    /// SQLite connection URL
    pub sqlite_url: String,
    /// PostgreSQL connection URL
    pub postgres_url: String,
    /// Connection pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite://entitle.db?mode=rwc".to_string(),
            postgres_url: "postgres://localhost/entitle".to_string(),
            max_connections: 5,
        }
    }
}

/// License upload configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Largest accepted request body for license uploads, in bytes
    pub max_upload_bytes: usize,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 1024 * 1024,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// JWT authentication configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Require bearer tokens. When false, an upstream authorizer is trusted.
    pub enabled: bool,
    /// JWT secret key (use `env:VAR_NAME` to read from environment)
    pub jwt_secret: String,
    /// JWT issuer claim (iss)
    pub jwt_issuer: String,
    /// JWT audience claim (aud)
    pub jwt_audience: String,
    /// Token expiration time in seconds (default: 1 hour)
    pub token_expiration_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            jwt_secret: String::new(),
            jwt_issuer: "entitle".to_string(),
            jwt_audience: "entitle-api".to_string(),
            token_expiration_secs: 3600,
        }
    }
}

/// IP geolocation configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GeoIpConfig {
    /// Path to an ip2region xdb file. Lookups resolve to "unknown" when unset.
    pub xdb_path: Option<String>,
}

fn config_err(e: ConfigError) -> LicenseError {
    LicenseError::ConfigError(e.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

type Builder = ConfigBuilder<config::builder::DefaultState>;

fn with_defaults(builder: Builder) -> LicenseResult<Builder> {
    let defaults: [(&str, Value); 13] = [
        ("server.host", "127.0.0.1".into()),
        ("server.port", 8080.into()),
        ("database.db_type", "sqlite".into()),
        ("database.sqlite_url", "sqlite://entitle.db?mode=rwc".into()),
        ("database.postgres_url", "postgres://localhost/entitle".into()),
        ("database.max_connections", 5.into()),
        ("license.max_upload_bytes", (1024 * 1024).into()),
        ("logging.level", "info".into()),
        ("auth.enabled", false.into()),
        ("auth.jwt_secret", "".into()),
        ("auth.jwt_issuer", "entitle".into()),
        ("auth.jwt_audience", "entitle-api".into()),
        ("auth.token_expiration_secs", 3600.into()),
    ];

    defaults
        .into_iter()
        .try_fold(builder, |b, (key, value)| b.set_default(key, value))
        .map_err(config_err)
}

fn with_env_overrides(builder: Builder) -> LicenseResult<Builder> {
    let database_url = env::var("ENTITLE_DATABASE_URL").ok();

    builder
        .set_override_option("server.host", env::var("ENTITLE_SERVER_HOST").ok())
        .and_then(|b| {
            b.set_override_option("server.port", env_parsed::<i64>("ENTITLE_SERVER_PORT"))
        })
        .and_then(|b| {
            b.set_override_option("database.db_type", env::var("ENTITLE_DATABASE_TYPE").ok())
        })
        .and_then(|b| {
            b.set_override_option(
                "database.sqlite_url",
                database_url
                    .clone()
                    .filter(|url| url.starts_with("sqlite")),
            )
        })
        .and_then(|b| {
            b.set_override_option(
                "database.postgres_url",
                database_url.filter(|url| url.starts_with("postgres")),
            )
        })
        .and_then(|b| {
            b.set_override_option(
                "license.max_upload_bytes",
                env_parsed::<i64>("ENTITLE_MAX_UPLOAD_BYTES"),
            )
        })
        .and_then(|b| b.set_override_option("logging.level", env::var("ENTITLE_LOG_LEVEL").ok()))
        .and_then(|b| {
            b.set_override_option("auth.enabled", env_parsed::<bool>("ENTITLE_AUTH_ENABLED"))
        })
        .and_then(|b| b.set_override_option("auth.jwt_secret", env::var("ENTITLE_JWT_SECRET").ok()))
        .and_then(|b| b.set_override_option("auth.jwt_issuer", env::var("ENTITLE_JWT_ISSUER").ok()))
        .and_then(|b| {
            b.set_override_option("auth.jwt_audience", env::var("ENTITLE_JWT_AUDIENCE").ok())
        })
        .and_then(|b| {
            b.set_override_option(
                "auth.token_expiration_secs",
                env_parsed::<i64>("ENTITLE_TOKEN_EXPIRATION_SECS"),
            )
        })
        .and_then(|b| {
            b.set_override_option("geoip.xdb_path", env::var("ENTITLE_GEOIP_XDB_PATH").ok())
        })
        .map_err(config_err)
}

impl EntitleConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` file (optional)
    /// 3. Environment variables
    pub fn load() -> LicenseResult<Self> {
        let builder = with_defaults(Config::builder())?
            .add_source(config::File::with_name("config").required(false));
        let builder = with_env_overrides(builder)?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| LicenseError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.server.port == 0 {
            return Err(LicenseError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        match self.database.db_type.as_str() {
            "sqlite" | "postgres" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "database.db_type must be 'sqlite' or 'postgres', got '{other}'"
                )));
            }
        }

        if self.database.max_connections == 0 {
            return Err(LicenseError::ConfigError(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }

        if self.license.max_upload_bytes == 0 {
            return Err(LicenseError::ConfigError(
                "license.max_upload_bytes must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        if self.auth.enabled && self.auth.jwt_secret.is_empty() {
            return Err(LicenseError::ConfigError(
                "auth.jwt_secret is required when auth.enabled is true".to_string(),
            ));
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> LicenseResult<&'static EntitleConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = EntitleConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is valid.
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EntitleConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_unknown_database() {
        let mut config = EntitleConfig::default();
        config.database.db_type = "mysql".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_log_level() {
        let mut config = EntitleConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn auth_requires_secret() {
        let mut config = EntitleConfig::default();
        config.auth.enabled = true;
        assert!(config.validate().is_err());

        config.auth.jwt_secret = "secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_upload_limit() {
        let mut config = EntitleConfig::default();
        config.license.max_upload_bytes = 0;
        assert!(config.validate().is_err());
    }
}
