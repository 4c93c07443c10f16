// crates/exam-catalog-core/src/core/mod.rs
// ============================================================================
// Module: Exam Catalog Core Types
// Description: Canonical catalog aggregate and auxiliary filter types.
// Purpose: Provide stable, serializable types for the catalog tree.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Catalog core types define the University aggregate, its nested entities,
//! filter options, and percentage scoring helpers. These types are the
//! canonical source of truth for the HTTP surface and every store backend.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod filter_option;
pub mod identifiers;
pub mod model;
pub mod scoring;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use filter_option::FilterCategory;
pub use filter_option::FilterOption;
pub use identifiers::AdmissionInfoId;
pub use identifiers::AdmissionScheduleId;
pub use identifiers::DepartmentId;
pub use identifiers::FilterOptionId;
pub use identifiers::MajorId;
pub use identifiers::SubjectId;
pub use identifiers::TestTypeId;
pub use identifiers::UniversityId;
pub use model::AdmissionInfo;
pub use model::AdmissionSchedule;
pub use model::AdmissionStatus;
pub use model::Department;
pub use model::MAX_ACADEMIC_YEAR;
pub use model::MAX_DEPARTMENTS;
pub use model::MAX_MAJORS;
pub use model::MAX_NAME_CHARS;
pub use model::MAX_SUBJECTS;
pub use model::MIN_ACADEMIC_YEAR;
pub use model::Major;
pub use model::RecordMeta;
pub use model::Subject;
pub use model::TestType;
pub use model::University;
pub use scoring::PERCENTAGE_TOLERANCE;
pub use scoring::normalize_university;
pub use scoring::percentages_coherent;
pub use scoring::recompute_percentages;
