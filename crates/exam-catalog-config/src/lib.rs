// crates/exam-catalog-config/src/lib.rs
// ============================================================================
// Module: Exam Catalog Config Library
// Description: Canonical config model, environment overrides, and validation.
// Purpose: Single source of truth for exam catalog runtime settings.
// Dependencies: exam-catalog-core, exam-catalog-store-*, serde, toml
// ============================================================================

//! ## Overview
//! `exam-catalog-config` resolves service settings from defaults, an optional
//! TOML file, and environment variables, then validates them fail-closed and
//! converts them into store and service configuration.
//!
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod duration;
mod env;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use duration::parse_duration;
