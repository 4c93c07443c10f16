// crates/exam-catalog-server/src/lib.rs
// ============================================================================
// Module: Exam Catalog Server Library
// Description: JSON/HTTP adapter for the exam catalog service.
// Purpose: Route requests through auth, CSRF, and limits into the service.
// Dependencies: axum, exam-catalog-core, exam-catalog-config
// ============================================================================

//! ## Overview
//! `exam-catalog-server` exposes universities, their nested admission data,
//! and filter options over HTTP. Errors leave the server as a JSON envelope
//! `{code, message, details}`; storage internals never reach clients.
//!
//! Security posture: request bodies, paths, and headers are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auth;
pub mod csrf;
pub mod error;
pub mod extract;
pub mod rate_limit;
mod routes;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use auth::Access;
pub use auth::AuthPolicy;
pub use csrf::CsrfGuard;
pub use error::ApiError;
pub use rate_limit::RateLimiter;
pub use routes::SubjectBatch;
pub use server::AppState;
pub use server::CatalogServer;
pub use server::ServerError;
pub use server::build_audit_sink;
pub use server::build_store;
