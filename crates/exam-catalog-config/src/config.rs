// crates/exam-catalog-config/src/config.rs
// ============================================================================
// Module: Exam Catalog Configuration
// Description: Configuration loading and validation for the exam catalog.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: exam-catalog-core, exam-catalog-store-*, serde, toml
// ============================================================================

//! ## Overview
//! Configuration starts from built-in defaults, applies an optional TOML file
//! (size and path limited), then applies environment overrides, and finally
//! validates every section. Any invalid value fails the whole load.
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use exam_catalog_core::IsolationLevel;
use exam_catalog_core::RetryPolicy;
use exam_catalog_core::ServiceConfig;
use exam_catalog_store_postgres::PostgresSslMode;
use exam_catalog_store_postgres::PostgresStoreConfig;
use exam_catalog_store_sqlite::SqliteStoreConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::duration;
use crate::env::EnvOverrides;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable naming the optional TOML file.
pub const CONFIG_ENV_VAR: &str = "EXAM_CATALOG_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default request body limit (1 MiB).
pub(crate) const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Maximum number of configured bearer tokens.
pub(crate) const MAX_AUTH_TOKENS: usize = 64;
/// Maximum length of a bearer token.
pub(crate) const MAX_AUTH_TOKEN_LENGTH: usize = 256;
/// Minimum CSRF token length in bytes.
pub(crate) const MIN_CSRF_TOKEN_LENGTH: usize = 16;
/// Maximum CSRF token length in bytes.
pub(crate) const MAX_CSRF_TOKEN_LENGTH: usize = 128;
/// Maximum allowed requests per rate limit window.
pub(crate) const MAX_RATE_LIMIT_REQUESTS: u32 = 100_000;
/// Minimum rate limit window.
pub(crate) const MIN_RATE_LIMIT_WINDOW: Duration = Duration::from_millis(100);
/// Maximum rate limit window.
pub(crate) const MAX_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(3_600);
/// Maximum number of tracked rate limit entries.
pub(crate) const MAX_RATE_LIMIT_ENTRIES: usize = 65_536;
/// Default tracked rate limit entries.
pub(crate) const DEFAULT_RATE_LIMIT_MAX_ENTRIES: usize = 4_096;
/// Log levels accepted by `LOG_LEVEL`.
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Exam catalog service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Write transaction and retry configuration.
    #[serde(default)]
    pub transactions: TransactionConfig,
    /// Read path configuration.
    #[serde(default)]
    pub reads: ReadConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Path of the TOML file this config was loaded from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl CatalogConfig {
    /// Loads configuration using the default resolution rules.
    ///
    /// The file named by `path`, or else by `EXAM_CATALOG_CONFIG`, is read
    /// when present; process environment variables are applied on top.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let vars: BTreeMap<String, String> = env::vars().collect();
        Self::load_with_env(path, &vars)
    }

    /// Loads configuration against an explicit environment map.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load_with_env(
        path: Option<&Path>,
        vars: &BTreeMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match resolve_path(path, vars)? {
            Some(resolved) => Self::from_file(&resolved)?,
            None => Self::default(),
        };
        EnvOverrides::new(vars).apply(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Builds configuration from defaults and an environment map only.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an override is malformed or validation
    /// fails.
    pub fn from_env_map(vars: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        EnvOverrides::new(vars).apply(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML file without applying environment overrides.
    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        validate_path(path)?;
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.transactions.validate()?;
        self.reads.validate()?;
        self.logging.validate()?;
        if self.server.environment == Environment::Production && !self.server.csrf.enabled {
            return Err(ConfigError::Invalid("csrf must stay enabled in production".to_string()));
        }
        Ok(())
    }

    /// Returns the service defaults derived from this configuration.
    #[must_use]
    pub fn service_config(&self) -> ServiceConfig {
        let tx = &self.transactions;
        ServiceConfig {
            retry: RetryPolicy::new(
                tx.initial_interval,
                tx.multiplier,
                tx.max_interval,
                tx.randomization_factor,
                tx.max_elapsed,
            ),
            write_timeout: tx.timeout,
            read_timeout: self.reads.timeout,
            isolation: tx.isolation,
            read_only: tx.read_only,
            cache_ttl: self.reads.cache_ttl,
        }
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Deployment environment label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Local development.
    #[default]
    Development,
    /// Automated tests.
    Test,
    /// Staging deployment.
    Staging,
    /// Production deployment.
    Production,
}

impl Environment {
    /// Parses an `ENV` value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "test" => Some(Self::Test),
            "staging" => Some(Self::Staging),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    /// Returns the canonical label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Deployment environment.
    #[serde(default)]
    pub environment: Environment,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Inbound authentication.
    #[serde(default)]
    pub auth: AuthConfig,
    /// CSRF protection.
    #[serde(default)]
    pub csrf: CsrfConfig,
    /// Optional per-client rate limit.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    /// Write audit logging.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: Environment::default(),
            max_body_bytes: default_max_body_bytes(),
            auth: AuthConfig::default(),
            csrf: CsrfConfig::default(),
            rate_limit: None,
            audit: AuditConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Returns the socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the host is not an IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .host
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid("server.host must be an ip address".to_string()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Validates server settings.
    fn validate(&self) -> Result<(), ConfigError> {
        let addr = self.bind_addr()?;
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        self.auth.validate()?;
        self.csrf.validate()?;
        if let Some(rate_limit) = &self.rate_limit {
            rate_limit.validate()?;
        }
        self.audit.validate()?;
        if self.environment == Environment::Production
            && !addr.ip().is_loopback()
            && self.auth.mode == AuthMode::Open
        {
            return Err(ConfigError::Invalid(
                "non-loopback production bind requires bearer_token auth".to_string(),
            ));
        }
        Ok(())
    }
}

/// Inbound authentication modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// No authentication.
    #[default]
    Open,
    /// Bearer token authentication.
    BearerToken,
}

impl AuthMode {
    /// Parses an `AUTH_MODE` value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" | "none" => Some(Self::Open),
            "bearer_token" | "bearer" => Some(Self::BearerToken),
            _ => None,
        }
    }
}

/// Inbound authentication configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Authentication mode.
    #[serde(default)]
    pub mode: AuthMode,
    /// Tokens allowed to read and write.
    #[serde(default)]
    pub bearer_tokens: Vec<String>,
    /// Tokens allowed to read only.
    #[serde(default)]
    pub read_only_tokens: Vec<String>,
}

impl AuthConfig {
    /// Validates token lists against the mode.
    fn validate(&self) -> Result<(), ConfigError> {
        let total = self.bearer_tokens.len() + self.read_only_tokens.len();
        if total > MAX_AUTH_TOKENS {
            return Err(ConfigError::Invalid("too many auth tokens".to_string()));
        }
        for token in self.bearer_tokens.iter().chain(&self.read_only_tokens) {
            let trimmed = token.trim();
            if trimmed.is_empty() {
                return Err(ConfigError::Invalid("auth tokens must be non-empty".to_string()));
            }
            if trimmed.len() > MAX_AUTH_TOKEN_LENGTH {
                return Err(ConfigError::Invalid("auth token exceeds max length".to_string()));
            }
            if trimmed.chars().any(char::is_whitespace) {
                return Err(ConfigError::Invalid(
                    "auth tokens must not contain whitespace".to_string(),
                ));
            }
        }
        if self.mode == AuthMode::BearerToken && self.bearer_tokens.is_empty() {
            return Err(ConfigError::Invalid(
                "bearer_token auth requires at least one read-write token".to_string(),
            ));
        }
        if self.mode == AuthMode::Open && total > 0 {
            return Err(ConfigError::Invalid("auth tokens require bearer_token mode".to_string()));
        }
        Ok(())
    }
}

/// CSRF protection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CsrfConfig {
    /// Require a valid token on mutating requests.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Request header carrying the token.
    #[serde(default = "default_csrf_header")]
    pub header: String,
    /// Random bytes per token.
    #[serde(default = "default_csrf_token_length")]
    pub token_length: usize,
    /// Token lifetime.
    #[serde(default = "default_csrf_expiration", deserialize_with = "duration::deserialize")]
    pub expiration: Duration,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            header: default_csrf_header(),
            token_length: default_csrf_token_length(),
            expiration: default_csrf_expiration(),
        }
    }
}

impl CsrfConfig {
    /// Validates CSRF settings.
    fn validate(&self) -> Result<(), ConfigError> {
        let header = self.header.trim();
        if header.is_empty()
            || !header.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
        {
            return Err(ConfigError::Invalid("csrf header must be a valid header name".to_string()));
        }
        if !(MIN_CSRF_TOKEN_LENGTH ..= MAX_CSRF_TOKEN_LENGTH).contains(&self.token_length) {
            return Err(ConfigError::Invalid(format!(
                "csrf token_length must be between {MIN_CSRF_TOKEN_LENGTH} and \
                 {MAX_CSRF_TOKEN_LENGTH}"
            )));
        }
        if self.expiration.is_zero() {
            return Err(ConfigError::Invalid(
                "csrf expiration must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-client fixed-window rate limit.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window length.
    #[serde(deserialize_with = "duration::deserialize")]
    pub window: Duration,
    /// Maximum number of distinct tracked clients.
    #[serde(default = "default_rate_limit_max_entries")]
    pub max_entries: usize,
}

impl RateLimitConfig {
    /// Validates rate limit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_requests == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit max_requests must be greater than zero".to_string(),
            ));
        }
        if self.max_requests > MAX_RATE_LIMIT_REQUESTS {
            return Err(ConfigError::Invalid("rate_limit max_requests too large".to_string()));
        }
        if self.window < MIN_RATE_LIMIT_WINDOW || self.window > MAX_RATE_LIMIT_WINDOW {
            return Err(ConfigError::Invalid(
                "rate_limit window must be between 100ms and 1h".to_string(),
            ));
        }
        if self.max_entries == 0 || self.max_entries > MAX_RATE_LIMIT_ENTRIES {
            return Err(ConfigError::Invalid(format!(
                "rate_limit max_entries must be between 1 and {MAX_RATE_LIMIT_ENTRIES}"
            )));
        }
        Ok(())
    }
}

/// Write audit configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Emit audit events.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Optional JSON-lines file; events go to tracing when unset.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("audit.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Database
// ============================================================================

/// Persistence backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseDriver {
    /// Embedded `SQLite` file.
    #[default]
    Sqlite,
    /// `PostgreSQL` server.
    Postgres,
}

impl DatabaseDriver {
    /// Parses a `DB_DRIVER` value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }

    /// Returns the canonical label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

/// Database connection configuration.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Backend selection.
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// `PostgreSQL` host.
    #[serde(default = "default_db_host")]
    pub host: String,
    /// `PostgreSQL` port.
    #[serde(default = "default_db_port")]
    pub port: u16,
    /// `PostgreSQL` role.
    #[serde(default)]
    pub user: String,
    /// `PostgreSQL` password.
    #[serde(default)]
    pub password: Option<String>,
    /// `PostgreSQL` database name.
    #[serde(default)]
    pub name: String,
    /// `PostgreSQL` TLS negotiation.
    #[serde(default)]
    pub ssl_mode: PostgresSslMode,
    /// Idle connections kept in the pool.
    #[serde(default = "default_max_idle_conns")]
    pub max_idle_conns: u32,
    /// Maximum open connections.
    #[serde(default = "default_max_open_conns")]
    pub max_open_conns: u32,
    /// Maximum lifetime of one connection.
    #[serde(default = "default_conn_max_lifetime", deserialize_with = "duration::deserialize")]
    pub conn_max_lifetime: Duration,
    /// Idle time after which a connection is closed.
    #[serde(default = "default_conn_max_idle_time", deserialize_with = "duration::deserialize")]
    pub conn_max_idle_time: Duration,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("driver", &self.driver)
            .field("path", &self.path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("name", &self.name)
            .field("ssl_mode", &self.ssl_mode)
            .field("max_idle_conns", &self.max_idle_conns)
            .field("max_open_conns", &self.max_open_conns)
            .field("conn_max_lifetime", &self.conn_max_lifetime)
            .field("conn_max_idle_time", &self.conn_max_idle_time)
            .finish()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            path: default_db_path(),
            host: default_db_host(),
            port: default_db_port(),
            user: String::new(),
            password: None,
            name: String::new(),
            ssl_mode: PostgresSslMode::default(),
            max_idle_conns: default_max_idle_conns(),
            max_open_conns: default_max_open_conns(),
            conn_max_lifetime: default_conn_max_lifetime(),
            conn_max_idle_time: default_conn_max_idle_time(),
        }
    }
}

impl DatabaseConfig {
    /// Validates the database section for the selected driver.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_open_conns == 0 {
            return Err(ConfigError::Invalid(
                "database max_open_conns must be greater than zero".to_string(),
            ));
        }
        if self.max_idle_conns > self.max_open_conns {
            return Err(ConfigError::Invalid(
                "database max_idle_conns must not exceed max_open_conns".to_string(),
            ));
        }
        match self.driver {
            DatabaseDriver::Sqlite => {
                validate_path_string("database.path", &self.path.to_string_lossy())
            }
            DatabaseDriver::Postgres => self
                .postgres_store_config()
                .validate()
                .map_err(|err| ConfigError::Invalid(err.to_string())),
        }
    }

    /// Builds the `SQLite` store configuration.
    #[must_use]
    pub fn sqlite_store_config(&self) -> SqliteStoreConfig {
        let mut config = SqliteStoreConfig::new(self.path.clone());
        config.max_connections = self.max_open_conns;
        config.min_idle = Some(self.max_idle_conns);
        config.max_lifetime_ms = nonzero_millis(self.conn_max_lifetime);
        config.idle_timeout_ms = nonzero_millis(self.conn_max_idle_time);
        config
    }

    /// Builds the `PostgreSQL` store configuration.
    #[must_use]
    pub fn postgres_store_config(&self) -> PostgresStoreConfig {
        let mut config = PostgresStoreConfig::new(&self.host, &self.user, &self.name);
        config.port = self.port;
        config.password.clone_from(&self.password);
        config.ssl_mode = self.ssl_mode;
        config.max_connections = self.max_open_conns;
        config.min_idle = Some(self.max_idle_conns);
        config.max_lifetime_ms = nonzero_millis(self.conn_max_lifetime);
        config.idle_timeout_ms = nonzero_millis(self.conn_max_idle_time);
        config
    }
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

/// Write transaction and retry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionConfig {
    /// Deadline for one write including retries.
    #[serde(default = "default_tx_timeout", deserialize_with = "duration::deserialize")]
    pub timeout: Duration,
    /// First backoff interval.
    #[serde(default = "default_initial_interval", deserialize_with = "duration::deserialize")]
    pub initial_interval: Duration,
    /// Backoff ceiling.
    #[serde(default = "default_max_interval", deserialize_with = "duration::deserialize")]
    pub max_interval: Duration,
    /// Backoff growth factor.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Jitter fraction in `[0, 1]`.
    #[serde(default = "default_randomization_factor")]
    pub randomization_factor: f64,
    /// Total retry budget.
    #[serde(default = "default_max_elapsed", deserialize_with = "duration::deserialize")]
    pub max_elapsed: Duration,
    /// Transaction isolation.
    #[serde(default)]
    pub isolation: IsolationLevel,
    /// Open write transactions read-only.
    #[serde(default)]
    pub read_only: bool,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            timeout: default_tx_timeout(),
            initial_interval: default_initial_interval(),
            max_interval: default_max_interval(),
            multiplier: default_multiplier(),
            randomization_factor: default_randomization_factor(),
            max_elapsed: default_max_elapsed(),
            isolation: IsolationLevel::default(),
            read_only: false,
        }
    }
}

impl TransactionConfig {
    /// Validates retry and timeout settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("tx timeout must be greater than zero".to_string()));
        }
        if self.initial_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "tx initial_interval must be greater than zero".to_string(),
            ));
        }
        if self.max_interval < self.initial_interval {
            return Err(ConfigError::Invalid(
                "tx max_interval must not be below initial_interval".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::Invalid("tx multiplier must be at least 1".to_string()));
        }
        if !(0.0 ..= 1.0).contains(&self.randomization_factor) {
            return Err(ConfigError::Invalid(
                "tx randomization_factor must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Reads and Logging
// ============================================================================

/// Read path configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadConfig {
    /// Deadline for one read.
    #[serde(default = "default_read_timeout", deserialize_with = "duration::deserialize")]
    pub timeout: Duration,
    /// Read cache entry lifetime; zero disables caching.
    #[serde(default = "default_cache_ttl", deserialize_with = "duration::deserialize")]
    pub cache_ttl: Duration,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            timeout: default_read_timeout(),
            cache_ttl: default_cache_ttl(),
        }
    }
}

impl ReadConfig {
    /// Validates read settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("read timeout must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parses a `LOG_FORMAT` value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Minimum level.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Validates the log level.
    fn validate(&self) -> Result<(), ConfigError> {
        let level = self.level.trim().to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "log level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config file from the argument or environment.
fn resolve_path(
    path: Option<&Path>,
    vars: &BTreeMap<String, String>,
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = path {
        return Ok(Some(path.to_path_buf()));
    }
    match vars.get(CONFIG_ENV_VAR).map(|value| value.trim()) {
        Some(value) if !value.is_empty() => {
            if value.len() > MAX_TOTAL_PATH_LENGTH {
                return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
            }
            Ok(Some(PathBuf::from(value)))
        }
        _ => Ok(None),
    }
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Converts a duration to pool milliseconds, mapping zero to unlimited.
fn nonzero_millis(value: Duration) -> Option<u64> {
    let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
    (millis > 0).then_some(millis)
}

/// Default bind host.
fn default_host() -> String {
    "0.0.0.0".to_string()
}

/// Default bind port.
const fn default_port() -> u16 {
    8080
}

/// Default request body limit.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Serde default for enabled flags.
const fn default_true() -> bool {
    true
}

/// Default CSRF header.
fn default_csrf_header() -> String {
    "X-CSRF-Token".to_string()
}

/// Default CSRF token length.
const fn default_csrf_token_length() -> usize {
    32
}

/// Default CSRF token lifetime.
const fn default_csrf_expiration() -> Duration {
    Duration::from_secs(3_600)
}

/// Default tracked rate limit entries.
const fn default_rate_limit_max_entries() -> usize {
    DEFAULT_RATE_LIMIT_MAX_ENTRIES
}

/// Default `SQLite` file.
fn default_db_path() -> PathBuf {
    PathBuf::from("exam-catalog.db")
}

/// Default `PostgreSQL` host.
fn default_db_host() -> String {
    "localhost".to_string()
}

/// Default `PostgreSQL` port.
const fn default_db_port() -> u16 {
    5432
}

/// Default idle connections.
const fn default_max_idle_conns() -> u32 {
    10
}

/// Default open connections.
const fn default_max_open_conns() -> u32 {
    100
}

/// Default connection lifetime.
const fn default_conn_max_lifetime() -> Duration {
    Duration::from_secs(3_600)
}

/// Default connection idle time.
const fn default_conn_max_idle_time() -> Duration {
    Duration::from_secs(1_800)
}

/// Default write deadline.
const fn default_tx_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Default first backoff interval.
const fn default_initial_interval() -> Duration {
    Duration::from_millis(100)
}

/// Default backoff ceiling.
const fn default_max_interval() -> Duration {
    Duration::from_secs(2)
}

/// Default backoff multiplier.
const fn default_multiplier() -> f64 {
    2.0
}

/// Default jitter fraction.
const fn default_randomization_factor() -> f64 {
    0.1
}

/// Default retry budget.
const fn default_max_elapsed() -> Duration {
    Duration::from_secs(60)
}

/// Default read deadline.
const fn default_read_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Default cache lifetime.
const fn default_cache_ttl() -> Duration {
    Duration::from_secs(300)
}

/// Default log level.
fn default_log_level() -> String {
    "info".to_string()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn defaults_validate_and_match_documented_values() {
        let config = CatalogConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.csrf.header, "X-CSRF-Token");
        assert_eq!(config.server.csrf.token_length, 32);
        assert_eq!(config.database.max_open_conns, 100);
        assert_eq!(config.database.max_idle_conns, 10);
        assert_eq!(config.transactions.timeout, Duration::from_secs(30));
        assert_eq!(config.reads.cache_ttl, Duration::from_secs(300));
    }

    #[test]
    fn service_config_carries_retry_and_timeouts() {
        let mut config = CatalogConfig::default();
        config.transactions.timeout = Duration::from_secs(7);
        config.transactions.isolation = IsolationLevel::Serializable;
        let service = config.service_config();
        assert_eq!(service.write_timeout, Duration::from_secs(7));
        assert_eq!(service.isolation, IsolationLevel::Serializable);
        assert_eq!(service.retry.initial_interval(), Duration::from_millis(100));
        assert_eq!(service.retry.max_interval(), Duration::from_secs(2));
    }

    #[test]
    fn bearer_mode_requires_a_read_write_token() {
        let mut auth = AuthConfig {
            mode: AuthMode::BearerToken,
            bearer_tokens: Vec::new(),
            read_only_tokens: vec!["reader".to_string()],
        };
        assert!(auth.validate().is_err());
        auth.bearer_tokens.push("writer".to_string());
        auth.validate().unwrap();
        auth.bearer_tokens.push("has space".to_string());
        assert!(auth.validate().is_err());
    }

    #[test]
    fn production_open_auth_on_public_bind_is_rejected() {
        let mut config = CatalogConfig::default();
        config.server.environment = Environment::Production;
        assert!(config.validate().is_err());
        config.server.host = "127.0.0.1".to_string();
        config.validate().unwrap();
        config.server.csrf.enabled = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn pool_mapping_treats_zero_durations_as_unlimited() {
        let mut database = DatabaseConfig {
            conn_max_idle_time: Duration::ZERO,
            ..DatabaseConfig::default()
        };
        database.password = Some("secret".to_string());
        let postgres = database.postgres_store_config();
        assert_eq!(postgres.max_connections, 100);
        assert_eq!(postgres.min_idle, Some(10));
        assert_eq!(postgres.max_lifetime_ms, Some(3_600_000));
        assert_eq!(postgres.idle_timeout_ms, None);
        assert!(!format!("{database:?}").contains("secret"));
    }

    #[test]
    fn path_components_are_length_limited() {
        let long = "a".repeat(MAX_PATH_COMPONENT_LENGTH + 1);
        assert!(validate_path(Path::new(&long)).is_err());
        assert!(validate_path_string("audit.path", "  ").is_err());
        validate_path_string("audit.path", "logs/audit.jsonl").unwrap();
    }
}
