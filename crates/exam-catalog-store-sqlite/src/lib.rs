// crates/exam-catalog-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Catalog Store
// Description: Durable CatalogStore backend using SQLite WAL.
// Purpose: Provide pooled, transactional persistence for the exam catalog.
// Dependencies: exam-catalog-core, r2d2, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`CatalogStore`] implementation that
//! persists the University aggregate in normalized tables with cascading
//! foreign keys and partial unique indexes. Writes run in one transaction
//! each; reads preload whole sub-trees with per-level batch queries.
//! Security posture: storage inputs are untrusted.
//!
//! [`CatalogStore`]: exam_catalog_core::CatalogStore

// ============================================================================
// SECTION: Modules
// ============================================================================

mod loader;
mod schema;
pub mod store;
mod writer;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use schema::SCHEMA_VERSION;
pub use store::SqliteCatalogStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
pub use store::SqliteTx;
