// crates/exam-catalog-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Tests
// Description: Argument parsing and config summary rendering.
// Purpose: Keep the command surface and operator output stable.
// Dependencies: clap, exam-catalog-config
// ============================================================================

//! ## Overview
//! Parses representative command lines and renders summaries for default and
//! `PostgreSQL` configurations without touching the process environment.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use exam_catalog_config::RateLimitConfig;

use super::CatalogConfig;
use super::Cli;
use super::Commands;
use super::ConfigCommand;
use super::DatabaseDriver;
use super::summary;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn serve_accepts_an_optional_config_path() {
    let cli = Cli::try_parse_from(["exam-catalog", "serve", "--config", "catalog.toml"]).unwrap();
    let Commands::Serve(args) = cli.command else {
        panic!("expected serve");
    };
    assert_eq!(args.config, Some(PathBuf::from("catalog.toml")));

    let cli = Cli::try_parse_from(["exam-catalog", "serve"]).unwrap();
    let Commands::Serve(args) = cli.command else {
        panic!("expected serve");
    };
    assert!(args.config.is_none());
}

#[test]
fn config_check_parses_as_a_nested_subcommand() {
    let cli = Cli::try_parse_from(["exam-catalog", "config", "check"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Config {
            command: ConfigCommand::Check(_)
        }
    ));
    assert!(Cli::try_parse_from(["exam-catalog"]).is_err());
    assert!(Cli::try_parse_from(["exam-catalog", "migrate"]).is_err());
}

#[test]
fn summary_reports_defaults() {
    let lines = summary(&CatalogConfig::default());
    assert_eq!(lines[0], "config ok");
    assert!(lines.contains(&"source: environment and defaults".to_string()));
    assert!(lines.contains(&"environment: development".to_string()));
    assert!(lines.contains(&"listen: 0.0.0.0:8080".to_string()));
    assert!(lines.contains(&"database: sqlite exam-catalog.db".to_string()));
    assert!(lines.contains(&"csrf: enabled".to_string()));
    assert!(lines.contains(&"rate limit: off".to_string()));
}

#[test]
fn summary_names_postgres_target_without_credentials() {
    let mut config = CatalogConfig::default();
    config.database.driver = DatabaseDriver::Postgres;
    config.database.host = "db.internal".to_string();
    config.database.name = "catalog".to_string();
    config.database.password = Some("hunter2".to_string());
    config.server.rate_limit = Some(RateLimitConfig {
        max_requests: 50,
        window: Duration::from_secs(1),
        max_entries: 128,
    });
    let lines = summary(&config);
    assert!(lines.contains(&"database: postgres db.internal:5432/catalog".to_string()));
    assert!(lines.contains(&"rate limit: 50 per 1000ms".to_string()));
    assert!(lines.iter().all(|line| !line.contains("hunter2")));
}
