// crates/exam-catalog-store-postgres/src/lib.rs
// ============================================================================
// Module: PostgreSQL Catalog Store
// Description: Durable CatalogStore backend using PostgreSQL.
// Purpose: Provide pooled persistence with native transaction isolation.
// Dependencies: exam-catalog-core, postgres, r2d2, r2d2_postgres
// ============================================================================

//! ## Overview
//! This crate provides a PostgreSQL-backed [`CatalogStore`] with the same
//! table layout and semantics as the `SQLite` backend, using the server's
//! native READ COMMITTED and SERIALIZABLE isolation levels. Serialization
//! failures and deadlocks surface as retryable store errors.
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
pub use store::PostgresCatalogStore;
pub use store::PostgresSslMode;
pub use store::PostgresStoreConfig;
pub use store::PostgresStoreError;
