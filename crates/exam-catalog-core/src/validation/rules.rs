// crates/exam-catalog-core/src/validation/rules.rs
// ============================================================================
// Module: Exam Catalog Validation Rules
// Description: Per-entity scalar rule tables.
// Purpose: Declare field rules once as data and share them process-wide.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Each entity type owns a table of [`FieldRule`]s: a field path segment, a
//! predicate that must hold, and the error code and message reported when it
//! does not. Collection rules (caps, uniqueness, percentages) live in the
//! walker because they need sibling context. The table set is built once on
//! first use and read without locking afterwards.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::LazyLock;

use crate::core::AdmissionInfo;
use crate::core::AdmissionSchedule;
use crate::core::Department;
use crate::core::FilterOption;
use crate::core::MAX_ACADEMIC_YEAR;
use crate::core::MAX_NAME_CHARS;
use crate::core::MIN_ACADEMIC_YEAR;
use crate::core::Major;
use crate::core::Subject;
use crate::core::TestType;
use crate::core::University;
use crate::validation::ErrorCode;

// ============================================================================
// SECTION: Rule Types
// ============================================================================

/// Single scalar rule over an entity of type `T`.
pub struct FieldRule<T: 'static> {
    /// Field path segment the violation is reported on.
    pub field: &'static str,
    /// Predicate that must hold.
    pub holds: fn(&T) -> bool,
    /// Code reported on violation.
    pub code: ErrorCode,
    /// Message reported on violation.
    pub message: &'static str,
}

impl<T> FieldRule<T> {
    /// Builds a rule triple.
    const fn new(
        field: &'static str,
        holds: fn(&T) -> bool,
        code: ErrorCode,
        message: &'static str,
    ) -> Self {
        Self {
            field,
            holds,
            code,
            message,
        }
    }
}

/// Complete rule set for every validated entity type.
pub struct RuleTable {
    /// University rules.
    pub university: Vec<FieldRule<University>>,
    /// Department rules.
    pub department: Vec<FieldRule<Department>>,
    /// Major rules.
    pub major: Vec<FieldRule<Major>>,
    /// Admission schedule rules.
    pub schedule: Vec<FieldRule<AdmissionSchedule>>,
    /// Admission info rules.
    pub info: Vec<FieldRule<AdmissionInfo>>,
    /// Test type rules.
    pub test_type: Vec<FieldRule<TestType>>,
    /// Subject rules.
    pub subject: Vec<FieldRule<Subject>>,
    /// Filter option rules.
    pub filter_option: Vec<FieldRule<FilterOption>>,
}

/// Process-wide rule table, built on first use.
pub static RULES: LazyLock<RuleTable> = LazyLock::new(RuleTable::build);

// ============================================================================
// SECTION: Shared Predicates
// ============================================================================

/// Message for empty names.
const NAME_REQUIRED: &str = "name is required";
/// Message for overlong names.
const NAME_TOO_LONG: &str = "name must be at most 100 characters";
/// Message for non-positive versions.
const VERSION_INVALID: &str = "version must be at least 1";
/// Message for negative display orders.
const ORDER_NEGATIVE: &str = "display_order must not be negative";

/// Returns true when the trimmed name is non-empty.
fn name_present(name: &str) -> bool {
    !name.trim().is_empty()
}

/// Returns true when the trimmed name fits the length limit.
fn name_fits(name: &str) -> bool {
    name.trim().chars().count() <= MAX_NAME_CHARS
}

/// Returns true for versions a stored row could carry.
const fn version_valid(version: i64) -> bool {
    version >= 1
}

// ============================================================================
// SECTION: Table Construction
// ============================================================================

impl RuleTable {
    /// Builds every entity table.
    fn build() -> Self {
        Self {
            university: vec![
                FieldRule::new(
                    "name",
                    |u: &University| name_present(&u.name),
                    ErrorCode::Required,
                    NAME_REQUIRED,
                ),
                FieldRule::new(
                    "name",
                    |u: &University| name_fits(&u.name),
                    ErrorCode::TooLong,
                    NAME_TOO_LONG,
                ),
                FieldRule::new(
                    "version",
                    |u: &University| version_valid(u.meta.version),
                    ErrorCode::InvalidVersion,
                    VERSION_INVALID,
                ),
            ],
            department: vec![
                FieldRule::new(
                    "name",
                    |d: &Department| name_present(&d.name),
                    ErrorCode::Required,
                    NAME_REQUIRED,
                ),
                FieldRule::new(
                    "name",
                    |d: &Department| name_fits(&d.name),
                    ErrorCode::TooLong,
                    NAME_TOO_LONG,
                ),
                FieldRule::new(
                    "version",
                    |d: &Department| version_valid(d.meta.version),
                    ErrorCode::InvalidVersion,
                    VERSION_INVALID,
                ),
            ],
            major: vec![
                FieldRule::new(
                    "name",
                    |m: &Major| name_present(&m.name),
                    ErrorCode::Required,
                    NAME_REQUIRED,
                ),
                FieldRule::new("name", |m: &Major| name_fits(&m.name), ErrorCode::TooLong, NAME_TOO_LONG),
                FieldRule::new(
                    "version",
                    |m: &Major| version_valid(m.meta.version),
                    ErrorCode::InvalidVersion,
                    VERSION_INVALID,
                ),
            ],
            schedule: vec![
                FieldRule::new(
                    "name",
                    |s: &AdmissionSchedule| name_present(&s.name),
                    ErrorCode::Required,
                    NAME_REQUIRED,
                ),
                FieldRule::new(
                    "name",
                    |s: &AdmissionSchedule| name_fits(&s.name),
                    ErrorCode::TooLong,
                    NAME_TOO_LONG,
                ),
                FieldRule::new(
                    "display_order",
                    |s: &AdmissionSchedule| s.display_order >= 0,
                    ErrorCode::NegativeValue,
                    ORDER_NEGATIVE,
                ),
                FieldRule::new(
                    "version",
                    |s: &AdmissionSchedule| version_valid(s.meta.version),
                    ErrorCode::InvalidVersion,
                    VERSION_INVALID,
                ),
            ],
            info: vec![
                FieldRule::new(
                    "enrollment",
                    |i: &AdmissionInfo| i.enrollment > 0,
                    ErrorCode::OutOfRange,
                    "enrollment must be greater than 0",
                ),
                FieldRule::new(
                    "academic_year",
                    |i: &AdmissionInfo| {
                        (MIN_ACADEMIC_YEAR..=MAX_ACADEMIC_YEAR).contains(&i.academic_year)
                    },
                    ErrorCode::OutOfRange,
                    "academic_year must be between 2000 and 2100",
                ),
                FieldRule::new(
                    "status",
                    |i: &AdmissionInfo| i.status.is_known(),
                    ErrorCode::InvalidEnum,
                    "status must be one of active, archived, draft, published",
                ),
                FieldRule::new(
                    "valid_until",
                    |i: &AdmissionInfo| i.valid_from <= i.valid_until,
                    ErrorCode::InvalidDateRange,
                    "valid_until must not be earlier than valid_from",
                ),
                FieldRule::new(
                    "version",
                    |i: &AdmissionInfo| version_valid(i.meta.version),
                    ErrorCode::InvalidVersion,
                    VERSION_INVALID,
                ),
            ],
            test_type: vec![
                FieldRule::new(
                    "name",
                    |t: &TestType| name_present(&t.name),
                    ErrorCode::Required,
                    NAME_REQUIRED,
                ),
                FieldRule::new(
                    "name",
                    |t: &TestType| name_fits(&t.name),
                    ErrorCode::TooLong,
                    NAME_TOO_LONG,
                ),
                FieldRule::new(
                    "version",
                    |t: &TestType| version_valid(t.meta.version),
                    ErrorCode::InvalidVersion,
                    VERSION_INVALID,
                ),
            ],
            subject: vec![
                FieldRule::new(
                    "name",
                    |s: &Subject| name_present(&s.name),
                    ErrorCode::Required,
                    NAME_REQUIRED,
                ),
                FieldRule::new(
                    "name",
                    |s: &Subject| name_fits(&s.name),
                    ErrorCode::TooLong,
                    NAME_TOO_LONG,
                ),
                FieldRule::new(
                    "score",
                    |s: &Subject| s.score.is_finite() && s.score >= 0.0,
                    ErrorCode::OutOfRange,
                    "score must not be negative",
                ),
                FieldRule::new(
                    "percentage",
                    |s: &Subject| (0.0..=100.0).contains(&s.percentage),
                    ErrorCode::OutOfRange,
                    "percentage must be between 0 and 100",
                ),
                FieldRule::new(
                    "display_order",
                    |s: &Subject| s.display_order >= 0,
                    ErrorCode::NegativeValue,
                    ORDER_NEGATIVE,
                ),
                FieldRule::new(
                    "version",
                    |s: &Subject| version_valid(s.meta.version),
                    ErrorCode::InvalidVersion,
                    VERSION_INVALID,
                ),
            ],
            filter_option: vec![
                FieldRule::new(
                    "name",
                    |o: &FilterOption| name_present(&o.name),
                    ErrorCode::Required,
                    NAME_REQUIRED,
                ),
                FieldRule::new(
                    "name",
                    |o: &FilterOption| {
                        o.name.trim().chars().count() <= o.category.max_name_chars()
                    },
                    ErrorCode::TooLong,
                    "name exceeds the length limit for its category",
                ),
                FieldRule::new(
                    "display_order",
                    |o: &FilterOption| o.display_order >= 0,
                    ErrorCode::NegativeValue,
                    ORDER_NEGATIVE,
                ),
                FieldRule::new(
                    "parent_id",
                    |o: &FilterOption| {
                        o.parent_id.is_none() || o.category.parent_category().is_some()
                    },
                    ErrorCode::InvalidParent,
                    "this category does not accept a parent",
                ),
                FieldRule::new(
                    "version",
                    |o: &FilterOption| version_valid(o.meta.version),
                    ErrorCode::InvalidVersion,
                    VERSION_INVALID,
                ),
            ],
        }
    }
}
