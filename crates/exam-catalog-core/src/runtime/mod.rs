// crates/exam-catalog-core/src/runtime/mod.rs
// ============================================================================
// Module: Exam Catalog Runtime
// Description: Service orchestration, retry, caching, audit, and errors.
// Purpose: Drive catalog reads and writes against a store backend.
// Dependencies: crate::{core, interfaces, sanitize, validation}
// ============================================================================

//! ## Overview
//! Runtime modules turn the pure catalog types into a working service: the
//! write pipeline with retries and cache invalidation, the cached read
//! pipeline, and the error taxonomy transports map to status codes.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod cache;
pub mod error;
pub mod retry;
pub mod service;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditOutcome;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::TracingAuditSink;
pub use audit::WriteAuditEvent;
pub use audit::WriteAuditEventParams;
pub use audit::WriteAuditSink;
pub use cache::DEFAULT_CACHE_TTL;
pub use cache::ReadCache;
pub use error::CatalogError;
pub use error::ErrorKind;
pub use retry::RetryHandle;
pub use retry::RetryPolicy;
pub use retry::is_retryable;
pub use retry::is_retryable_message;
pub use service::CatalogService;
pub use service::DEFAULT_READ_TIMEOUT;
pub use service::DEFAULT_WRITE_TIMEOUT;
pub use service::ServiceConfig;
pub use service::WriteOptions;
