// crates/exam-catalog-config/src/env.rs
// ============================================================================
// Module: Environment Overrides
// Description: Applies process environment variables over loaded config.
// Purpose: Let deployments tune the service without editing files.
// Dependencies: exam-catalog-core, exam-catalog-store-postgres
// ============================================================================

//! ## Overview
//! Each recognized variable replaces exactly one config field. Unset or
//! empty variables leave the field alone; malformed values fail the load and
//! name the variable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use exam_catalog_core::IsolationLevel;
use exam_catalog_store_postgres::PostgresSslMode;

use crate::config::AuthMode;
use crate::config::CatalogConfig;
use crate::config::ConfigError;
use crate::config::DEFAULT_RATE_LIMIT_MAX_ENTRIES;
use crate::config::DatabaseDriver;
use crate::config::Environment;
use crate::config::LogFormat;
use crate::config::RateLimitConfig;
use crate::duration::parse_duration;

// ============================================================================
// SECTION: Overrides
// ============================================================================

/// Read-only view over an environment snapshot.
pub(crate) struct EnvOverrides<'a> {
    /// Variables by name.
    vars: &'a BTreeMap<String, String>,
}

impl<'a> EnvOverrides<'a> {
    /// Wraps an environment snapshot.
    pub(crate) const fn new(vars: &'a BTreeMap<String, String>) -> Self {
        Self {
            vars,
        }
    }

    /// Applies every recognized variable to `config`.
    pub(crate) fn apply(&self, config: &mut CatalogConfig) -> Result<(), ConfigError> {
        self.apply_server(config)?;
        self.apply_database(config)?;
        self.apply_transactions(config)?;
        if let Some(ttl) = self.duration("CACHE_TTL")? {
            config.reads.cache_ttl = ttl;
        }
        if let Some(timeout) = self.duration("READ_TIMEOUT")? {
            config.reads.timeout = timeout;
        }
        if let Some(level) = self.get("LOG_LEVEL") {
            config.logging.level = level.to_ascii_lowercase();
        }
        if let Some(format) = self.parsed("LOG_FORMAT", LogFormat::parse)? {
            config.logging.format = format;
        }
        Ok(())
    }

    /// Applies server, auth, CSRF, and rate limit variables.
    fn apply_server(&self, config: &mut CatalogConfig) -> Result<(), ConfigError> {
        let server = &mut config.server;
        if let Some(host) = self.get("HOST") {
            server.host = host.to_string();
        }
        if let Some(port) = self.number("PORT")? {
            server.port = port;
        }
        if let Some(environment) = self.parsed("ENV", Environment::parse)? {
            server.environment = environment;
        }
        if let Some(max_body) = self.number("MAX_BODY_BYTES")? {
            server.max_body_bytes = max_body;
        }
        if let Some(mode) = self.parsed("AUTH_MODE", AuthMode::parse)? {
            server.auth.mode = mode;
        }
        if let Some(tokens) = self.list("AUTH_BEARER_TOKENS") {
            server.auth.bearer_tokens = tokens;
        }
        if let Some(tokens) = self.list("AUTH_READ_ONLY_TOKENS") {
            server.auth.read_only_tokens = tokens;
        }
        if let Some(enabled) = self.flag("CSRF_ENABLED")? {
            server.csrf.enabled = enabled;
        }
        if let Some(header) = self.get("CSRF_TOKEN_HEADER") {
            server.csrf.header = header.to_string();
        }
        if let Some(length) = self.number("CSRF_TOKEN_LENGTH")? {
            server.csrf.token_length = length;
        }
        if let Some(expiration) = self.duration("CSRF_TOKEN_EXPIRATION")? {
            server.csrf.expiration = expiration;
        }
        let max_requests = self.number::<u32>("RATE_LIMIT_MAX_REQUESTS")?;
        let window = self.duration("RATE_LIMIT_WINDOW")?;
        if max_requests.is_some() || window.is_some() {
            let current = server.rate_limit.take();
            server.rate_limit = Some(RateLimitConfig {
                max_requests: max_requests
                    .or_else(|| current.as_ref().map(|limit| limit.max_requests))
                    .unwrap_or(1_000),
                window: window
                    .or_else(|| current.as_ref().map(|limit| limit.window))
                    .unwrap_or(Duration::from_secs(1)),
                max_entries: current
                    .as_ref()
                    .map_or(DEFAULT_RATE_LIMIT_MAX_ENTRIES, |limit| limit.max_entries),
            });
        }
        if let Some(enabled) = self.flag("AUDIT_ENABLED")? {
            server.audit.enabled = enabled;
        }
        if let Some(path) = self.get("AUDIT_PATH") {
            server.audit.path = Some(path.to_string());
        }
        Ok(())
    }

    /// Applies `DB_*` variables.
    fn apply_database(&self, config: &mut CatalogConfig) -> Result<(), ConfigError> {
        let database = &mut config.database;
        if let Some(driver) = self.parsed("DB_DRIVER", DatabaseDriver::parse)? {
            database.driver = driver;
        }
        if let Some(path) = self.get("DB_PATH") {
            database.path = PathBuf::from(path);
        }
        if let Some(host) = self.get("DB_HOST") {
            database.host = host.to_string();
        }
        if let Some(port) = self.number("DB_PORT")? {
            database.port = port;
        }
        if let Some(user) = self.get("DB_USER") {
            database.user = user.to_string();
        }
        if let Some(password) = self.vars.get("DB_PASSWORD").filter(|value| !value.is_empty()) {
            database.password = Some(password.clone());
        }
        if let Some(name) = self.get("DB_NAME") {
            database.name = name.to_string();
        }
        if let Some(mode) = self.parsed("DB_SSL_MODE", PostgresSslMode::parse)? {
            database.ssl_mode = mode;
        }
        if let Some(idle) = self.number("DB_MAX_IDLE_CONNS")? {
            database.max_idle_conns = idle;
        }
        if let Some(open) = self.number("DB_MAX_OPEN_CONNS")? {
            database.max_open_conns = open;
        }
        if let Some(lifetime) = self.duration("DB_CONN_MAX_LIFETIME")? {
            database.conn_max_lifetime = lifetime;
        }
        if let Some(idle_time) = self.duration("DB_CONN_MAX_IDLE_TIME")? {
            database.conn_max_idle_time = idle_time;
        }
        Ok(())
    }

    /// Applies `TX_*` variables.
    fn apply_transactions(&self, config: &mut CatalogConfig) -> Result<(), ConfigError> {
        let tx = &mut config.transactions;
        if let Some(timeout) = self.duration("TX_TIMEOUT")? {
            tx.timeout = timeout;
        }
        if let Some(initial) = self.duration("TX_INITIAL_INTERVAL")? {
            tx.initial_interval = initial;
        }
        if let Some(max) = self.duration("TX_MAX_INTERVAL")? {
            tx.max_interval = max;
        }
        if let Some(multiplier) = self.number("TX_MULTIPLIER")? {
            tx.multiplier = multiplier;
        }
        if let Some(factor) = self.number("TX_RANDOMIZATION_FACTOR")? {
            tx.randomization_factor = factor;
        }
        if let Some(elapsed) = self.duration("TX_MAX_ELAPSED")? {
            tx.max_elapsed = elapsed;
        }
        if let Some(isolation) = self.parsed("TX_ISOLATION", parse_isolation)? {
            tx.isolation = isolation;
        }
        if let Some(read_only) = self.flag("TX_READ_ONLY")? {
            tx.read_only = read_only;
        }
        Ok(())
    }

    /// Returns a trimmed non-empty value.
    fn get(&self, name: &str) -> Option<&'a str> {
        self.vars.get(name).map(|value| value.trim()).filter(|value| !value.is_empty())
    }

    /// Parses a value with an enum parser.
    fn parsed<T>(&self, name: &str, parse: fn(&str) -> Option<T>) -> Result<Option<T>, ConfigError> {
        self.get(name)
            .map(|value| {
                parse(value).ok_or_else(|| {
                    ConfigError::Invalid(format!("{name} has unsupported value \"{value}\""))
                })
            })
            .transpose()
    }

    /// Parses a numeric value.
    fn number<T: FromStr>(&self, name: &str) -> Result<Option<T>, ConfigError> {
        self.get(name)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| ConfigError::Invalid(format!("{name} must be a number")))
            })
            .transpose()
    }

    /// Parses a Go-style duration.
    fn duration(&self, name: &str) -> Result<Option<Duration>, ConfigError> {
        self.get(name)
            .map(|value| parse_duration(value).map_err(|err| ConfigError::Invalid(format!("{name}: {err}"))))
            .transpose()
    }

    /// Parses a boolean flag.
    fn flag(&self, name: &str) -> Result<Option<bool>, ConfigError> {
        self.parsed(name, parse_flag)
    }

    /// Splits a comma separated list, dropping empty items.
    fn list(&self, name: &str) -> Option<Vec<String>> {
        self.get(name).map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(ToString::to_string)
                .collect()
        })
    }
}

/// Parses a boolean flag value.
fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parses an isolation level name.
fn parse_isolation(value: &str) -> Option<IsolationLevel> {
    match value.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
        "read_committed" => Some(IsolationLevel::ReadCommitted),
        "serializable" => Some(IsolationLevel::Serializable),
        _ => None,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Tests unwrap known-good fixtures.")]

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect()
    }

    #[test]
    fn overrides_replace_single_fields() {
        let env = vars(&[
            ("PORT", "9090"),
            ("DB_DRIVER", "postgres"),
            ("DB_SSL_MODE", "allow"),
            ("TX_TIMEOUT", "45s"),
            ("TX_ISOLATION", "serializable"),
            ("CACHE_TTL", "0"),
            ("AUTH_READ_ONLY_TOKENS", "a, ,b"),
        ]);
        let mut config = CatalogConfig::default();
        EnvOverrides::new(&env).apply(&mut config).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.driver, DatabaseDriver::Postgres);
        assert_eq!(config.database.ssl_mode, PostgresSslMode::Allow);
        assert_eq!(config.transactions.timeout, Duration::from_secs(45));
        assert_eq!(config.transactions.isolation, IsolationLevel::Serializable);
        assert_eq!(config.reads.cache_ttl, Duration::ZERO);
        assert_eq!(config.server.auth.read_only_tokens, vec!["a", "b"]);
    }

    #[test]
    fn empty_values_are_ignored() {
        let env = vars(&[("PORT", "  "), ("DB_PASSWORD", "")]);
        let mut config = CatalogConfig::default();
        EnvOverrides::new(&env).apply(&mut config).unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.database.password.is_none());
    }

    #[test]
    fn malformed_values_name_the_variable() {
        for (name, value) in [
            ("PORT", "eighty"),
            ("DB_SSL_MODE", "require"),
            ("TX_TIMEOUT", "30"),
            ("CSRF_ENABLED", "maybe"),
        ] {
            let env = vars(&[(name, value)]);
            let err = EnvOverrides::new(&env).apply(&mut CatalogConfig::default()).unwrap_err();
            assert!(err.to_string().contains(name), "{err}");
        }
    }

    #[test]
    fn rate_limit_is_enabled_by_either_variable() {
        let env = vars(&[("RATE_LIMIT_WINDOW", "10s")]);
        let mut config = CatalogConfig::default();
        EnvOverrides::new(&env).apply(&mut config).unwrap();
        let limit = config.server.rate_limit.unwrap();
        assert_eq!(limit.window, Duration::from_secs(10));
        assert_eq!(limit.max_requests, 1_000);
    }
}
