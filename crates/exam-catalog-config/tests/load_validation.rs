//! Load and override tests for exam-catalog-config.
// crates/exam-catalog-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: File loading, environment precedence, and fail-closed checks.
// Purpose: Ensure resolved configuration is deterministic and validated.
// =============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use exam_catalog_config::AuthMode;
use exam_catalog_config::CONFIG_ENV_VAR;
use exam_catalog_config::CatalogConfig;
use exam_catalog_config::ConfigError;
use exam_catalog_config::DatabaseDriver;
use exam_catalog_config::LogFormat;

type TestResult = Result<(), String>;

fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect()
}

fn assert_invalid<T: std::fmt::Debug>(result: Result<T, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(value) => Err(format!("expected invalid config, got {value:?}")),
    }
}

#[test]
fn missing_file_and_env_yield_defaults() -> TestResult {
    let config =
        CatalogConfig::load_with_env(None, &BTreeMap::new()).map_err(|err| err.to_string())?;
    if config.source.is_some() || config.database.driver != DatabaseDriver::Sqlite {
        return Err(format!("unexpected defaults: {config:?}"));
    }
    Ok(())
}

#[test]
fn file_values_are_overridden_by_environment() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("catalog.toml");
    fs::write(
        &path,
        r#"
[server]
port = 7000

[transactions]
timeout = "10s"
max_elapsed = 2500

[logging]
format = "json"
"#,
    )
    .map_err(|err| err.to_string())?;
    let vars = env(&[(CONFIG_ENV_VAR, path.to_string_lossy().as_ref()), ("PORT", "7001")]);
    let config = CatalogConfig::load_with_env(None, &vars).map_err(|err| err.to_string())?;
    if config.server.port != 7001 {
        return Err(format!("env port not applied: {}", config.server.port));
    }
    if config.transactions.timeout != Duration::from_secs(10)
        || config.transactions.max_elapsed != Duration::from_millis(2_500)
    {
        return Err(format!("file durations not applied: {:?}", config.transactions));
    }
    if config.logging.format != LogFormat::Json || config.source.as_deref() != Some(path.as_path())
    {
        return Err("file logging or source not applied".to_string());
    }
    Ok(())
}

#[test]
fn unknown_fields_are_rejected() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("catalog.toml");
    fs::write(&path, "[server]\nprot = 1\n").map_err(|err| err.to_string())?;
    assert_invalid(CatalogConfig::load_with_env(Some(&path), &BTreeMap::new()), "parse error")
}

#[test]
fn oversized_file_is_rejected() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("catalog.toml");
    let padding = format!("# {}\n", "x".repeat(1024 * 1024));
    fs::write(&path, padding).map_err(|err| err.to_string())?;
    assert_invalid(CatalogConfig::load_with_env(Some(&path), &BTreeMap::new()), "size limit")
}

#[test]
fn missing_explicit_file_is_an_io_error() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("absent.toml");
    assert_invalid(CatalogConfig::load_with_env(Some(&path), &BTreeMap::new()), "io error")
}

#[test]
fn postgres_driver_requires_connection_identity() -> TestResult {
    assert_invalid(CatalogConfig::from_env_map(&env(&[("DB_DRIVER", "postgres")])), "invalid")?;
    let config = CatalogConfig::from_env_map(&env(&[
        ("DB_DRIVER", "postgres"),
        ("DB_USER", "catalog"),
        ("DB_NAME", "exams"),
        ("DB_SSL_MODE", "prefer"),
    ]))
    .map_err(|err| err.to_string())?;
    let store = config.database.postgres_store_config();
    if store.user != "catalog" || store.dbname != "exams" {
        return Err(format!("unexpected store config: {store:?}"));
    }
    Ok(())
}

#[test]
fn bearer_auth_from_environment() -> TestResult {
    let config = CatalogConfig::from_env_map(&env(&[
        ("AUTH_MODE", "bearer_token"),
        ("AUTH_BEARER_TOKENS", "alpha,beta"),
    ]))
    .map_err(|err| err.to_string())?;
    if config.server.auth.mode != AuthMode::BearerToken
        || config.server.auth.bearer_tokens.len() != 2
    {
        return Err(format!("auth not applied: {:?}", config.server.auth));
    }
    assert_invalid(
        CatalogConfig::from_env_map(&env(&[("AUTH_MODE", "bearer")])),
        "read-write token",
    )
}

#[test]
fn fail_closed_on_invalid_ranges() -> TestResult {
    assert_invalid(CatalogConfig::from_env_map(&env(&[("TX_MULTIPLIER", "0.5")])), "multiplier")?;
    assert_invalid(
        CatalogConfig::from_env_map(&env(&[("TX_RANDOMIZATION_FACTOR", "1.5")])),
        "randomization_factor",
    )?;
    assert_invalid(
        CatalogConfig::from_env_map(&env(&[("DB_MAX_IDLE_CONNS", "200")])),
        "max_idle_conns",
    )?;
    assert_invalid(
        CatalogConfig::from_env_map(&env(&[("RATE_LIMIT_WINDOW", "10ms")])),
        "window",
    )?;
    assert_invalid(CatalogConfig::from_env_map(&env(&[("LOG_LEVEL", "loud")])), "log level")?;
    assert_invalid(
        CatalogConfig::from_env_map(&env(&[
            ("ENV", "production"),
            ("HOST", "127.0.0.1"),
            ("CSRF_ENABLED", "false"),
        ])),
        "csrf",
    )
}
