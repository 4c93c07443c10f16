// crates/exam-catalog-core/src/lib.rs
// ============================================================================
// Module: Exam Catalog Core Library
// Description: Public API surface for the exam catalog core.
// Purpose: Expose catalog types, the store interface, and the service runtime.
// Dependencies: crate::{core, interfaces, runtime, sanitize, validation}
// ============================================================================

//! ## Overview
//! Exam catalog core models Japanese university entrance-examination data as
//! a versioned University aggregate, validates and sanitizes it at ingress,
//! and orchestrates transactional writes and cached reads over a pluggable
//! [`CatalogStore`]. It has no opinion on transport or storage engine.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;
pub mod sanitize;
pub mod validation;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::CatalogStore;
pub use interfaces::DEFAULT_PAGE_LIMIT;
pub use interfaces::DeleteMode;
pub use interfaces::EntityRef;
pub use interfaces::InvalidationScope;
pub use interfaces::IsolationLevel;
pub use interfaces::MAX_PAGE_LIMIT;
pub use interfaces::OpContext;
pub use interfaces::Page;
pub use interfaces::ResourceKind;
pub use interfaces::SharedCatalogStore;
pub use interfaces::StoreError;
pub use interfaces::TxOptions;
pub use interfaces::WriteCommand;
pub use interfaces::WriteOutcome;
pub use interfaces::WriteRecord;
pub use runtime::CatalogError;
pub use runtime::CatalogService;
pub use runtime::ErrorKind;
pub use runtime::ReadCache;
pub use runtime::RetryPolicy;
pub use runtime::ServiceConfig;
pub use runtime::WriteAuditEvent;
pub use runtime::WriteAuditSink;
pub use runtime::WriteOptions;
pub use sanitize::HtmlPolicy;
pub use sanitize::SanitizeConfig;
pub use sanitize::SanitizeOptions;
pub use sanitize::Sanitizer;
pub use validation::ErrorCode;
pub use validation::FieldError;
pub use validation::FieldPath;
pub use validation::ValidationError;
pub use validation::Validator;
