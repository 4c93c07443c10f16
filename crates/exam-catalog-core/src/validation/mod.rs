// crates/exam-catalog-core/src/validation/mod.rs
// ============================================================================
// Module: Exam Catalog Validation
// Description: Recursive aggregate validation with field-path reporting.
// Purpose: Reject malformed catalog writes before they reach a store.
// Dependencies: serde, thiserror, crate::core
// ============================================================================

//! ## Overview
//! The [`Validator`] walks an aggregate depth-first and accumulates every
//! violation instead of stopping at the first one. Each violation carries a
//! dotted field path with numeric indices, e.g.
//! `departments[0].majors[2].admission_schedules[0].test_types[1].subjects[3].score`,
//! so clients can point at the exact offending input.
//!
//! Validation is pure and lock-free; the scalar rule tables in [`rules`] are
//! built once and shared by every thread.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod rules;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::AdmissionInfo;
use crate::core::AdmissionSchedule;
use crate::core::Department;
use crate::core::FilterOption;
use crate::core::MAX_DEPARTMENTS;
use crate::core::MAX_MAJORS;
use crate::core::MAX_SUBJECTS;
use crate::core::Major;
use crate::core::PERCENTAGE_TOLERANCE;
use crate::core::Subject;
use crate::core::TestType;
use crate::core::University;
use crate::core::scoring::score_total;
use crate::core::scoring::share_of;
use crate::validation::rules::FieldRule;
use crate::validation::rules::RULES;

// ============================================================================
// SECTION: Error Types
// ============================================================================

/// Machine-readable validation failure code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Required value missing or blank.
    Required,
    /// Text longer than allowed.
    TooLong,
    /// Numeric value outside its range.
    OutOfRange,
    /// Value outside an enumerated set.
    InvalidEnum,
    /// Version below 1.
    InvalidVersion,
    /// Negative value where only non-negative values are allowed.
    NegativeValue,
    /// Collection larger than its cap.
    TooManyItems,
    /// Name repeated within one parent.
    DuplicateName,
    /// Subject percentage does not match its score share.
    PercentageMismatch,
    /// Subject percentages do not sum to 100.
    PercentageSum,
    /// Validity window ends before it starts.
    InvalidDateRange,
    /// Parent reference incompatible with the category.
    InvalidParent,
}

impl ErrorCode {
    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Required => "REQUIRED",
            Self::TooLong => "TOO_LONG",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::InvalidEnum => "INVALID_ENUM",
            Self::InvalidVersion => "INVALID_VERSION",
            Self::NegativeValue => "NEGATIVE_VALUE",
            Self::TooManyItems => "TOO_MANY_ITEMS",
            Self::DuplicateName => "DUPLICATE_NAME",
            Self::PercentageMismatch => "PERCENTAGE_MISMATCH",
            Self::PercentageSum => "PERCENTAGE_SUM",
            Self::InvalidDateRange => "INVALID_DATE_RANGE",
            Self::InvalidParent => "INVALID_PARENT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single field-level violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Dotted path to the offending field.
    pub field_path: String,
    /// Human-readable description.
    pub message: String,
    /// Machine-readable code.
    pub code: ErrorCode,
}

/// Accumulated validation failures for one input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed with {} error(s)", .errors.len())]
pub struct ValidationError {
    /// Every violation found, in walk order.
    errors: Vec<FieldError>,
}

impl ValidationError {
    /// Builds an error from a list of violations.
    #[must_use]
    pub const fn from_errors(errors: Vec<FieldError>) -> Self {
        Self {
            errors,
        }
    }

    /// Builds an error with a single violation.
    #[must_use]
    pub fn single(field_path: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::from_errors(vec![FieldError {
            field_path: field_path.into(),
            message: message.into(),
            code,
        }])
    }

    /// Returns the violations.
    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Consumes the error and returns the violations.
    #[must_use]
    pub fn into_errors(self) -> Vec<FieldError> {
        self.errors
    }

    /// Returns the first violation at `field_path`, if any.
    #[must_use]
    pub fn find(&self, field_path: &str) -> Option<&FieldError> {
        self.errors.iter().find(|error| error.field_path == field_path)
    }
}

// ============================================================================
// SECTION: Field Paths
// ============================================================================

/// Dotted field path builder (`departments[1].name`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(String);

impl FieldPath {
    /// Returns the empty root path.
    #[must_use]
    pub const fn root() -> Self {
        Self(String::new())
    }

    /// Returns this path extended by a named field.
    #[must_use]
    pub fn field(&self, name: &str) -> Self {
        if self.0.is_empty() { Self(name.to_string()) } else { Self(format!("{}.{name}", self.0)) }
    }

    /// Returns this path extended by an indexed collection element.
    #[must_use]
    pub fn item(&self, collection: &str, index: usize) -> Self {
        let mut path = self.field(collection);
        path.0.push_str(&format!("[{index}]"));
        path
    }

    /// Returns the rendered path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SECTION: Validator
// ============================================================================

/// Pure aggregate validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    /// Creates a validator over the shared rule tables.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a full university aggregate.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] listing every violation in the tree.
    pub fn validate_university(&self, university: &University) -> Result<(), ValidationError> {
        let mut collector = Collector::default();
        collector.university(&FieldPath::root(), university);
        collector.finish()
    }

    /// Validates a department sub-tree.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] listing every violation in the sub-tree.
    pub fn validate_department(&self, department: &Department) -> Result<(), ValidationError> {
        let mut collector = Collector::default();
        collector.department(&FieldPath::root(), department);
        collector.finish()
    }

    /// Validates a major sub-tree.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] listing every violation in the sub-tree.
    pub fn validate_major(&self, major: &Major) -> Result<(), ValidationError> {
        let mut collector = Collector::default();
        collector.major(&FieldPath::root(), major);
        collector.finish()
    }

    /// Validates an admission schedule sub-tree.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] listing every violation in the sub-tree.
    pub fn validate_admission_schedule(
        &self,
        schedule: &AdmissionSchedule,
    ) -> Result<(), ValidationError> {
        let mut collector = Collector::default();
        collector.schedule(&FieldPath::root(), schedule);
        collector.finish()
    }

    /// Validates a single admission info row.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] listing every violation.
    pub fn validate_admission_info(&self, info: &AdmissionInfo) -> Result<(), ValidationError> {
        let mut collector = Collector::default();
        collector.apply(&FieldPath::root(), &RULES.info, info);
        collector.finish()
    }

    /// Validates a test type and its subjects.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] listing every violation in the sub-tree.
    pub fn validate_test_type(&self, test_type: &TestType) -> Result<(), ValidationError> {
        let mut collector = Collector::default();
        collector.test_type(&FieldPath::root(), test_type);
        collector.finish()
    }

    /// Validates a single subject.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] listing every violation.
    pub fn validate_subject(&self, subject: &Subject) -> Result<(), ValidationError> {
        let mut collector = Collector::default();
        collector.apply(&FieldPath::root(), &RULES.subject, subject);
        collector.finish()
    }

    /// Validates the input of a batch subject update.
    ///
    /// Percentages are not checked here; the writer recomputes them over the
    /// final subject set. The subject cap is likewise enforced on the final
    /// set by the store.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] with paths of the form `subjects[i].field`.
    pub fn validate_subject_batch(&self, subjects: &[Subject]) -> Result<(), ValidationError> {
        let mut collector = Collector::default();
        let root = FieldPath::root();
        collector.children(&root, "subjects", subjects, None);
        for (index, subject) in subjects.iter().enumerate() {
            collector.apply(&root.item("subjects", index), &RULES.subject, subject);
        }
        collector.finish()
    }

    /// Validates a filter option against its resolved parent.
    ///
    /// `parent` is the stored option referenced by `option.parent_id`, or
    /// `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] listing every violation.
    pub fn validate_filter_option(
        &self,
        option: &FilterOption,
        parent: Option<&FilterOption>,
    ) -> Result<(), ValidationError> {
        let mut collector = Collector::default();
        let root = FieldPath::root();
        collector.apply(&root, &RULES.filter_option, option);
        if option.parent_id.is_some()
            && let Some(expected) = option.category.parent_category()
        {
            match parent {
                None => collector.push(
                    root.field("parent_id"),
                    ErrorCode::InvalidParent,
                    "parent option does not exist",
                ),
                Some(parent) if parent.category != expected => collector.push(
                    root.field("parent_id"),
                    ErrorCode::InvalidParent,
                    format!("parent must be a {expected} option"),
                ),
                Some(_) => {}
            }
        }
        collector.finish()
    }
}

// ============================================================================
// SECTION: Walker
// ============================================================================

/// Entities whose names must be unique among siblings.
trait Named {
    /// Returns the entity name.
    fn name(&self) -> &str;
}

impl Named for Department {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Major {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Subject {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Accumulates violations during a walk.
#[derive(Default)]
struct Collector {
    /// Violations in walk order.
    errors: Vec<FieldError>,
}

impl Collector {
    /// Records one violation.
    fn push(&mut self, path: FieldPath, code: ErrorCode, message: impl Into<String>) {
        self.errors.push(FieldError {
            field_path: path.0,
            message: message.into(),
            code,
        });
    }

    /// Converts the collected violations into a result.
    fn finish(self) -> Result<(), ValidationError> {
        if self.errors.is_empty() { Ok(()) } else { Err(ValidationError::from_errors(self.errors)) }
    }

    /// Applies a scalar rule table to one node.
    fn apply<T>(&mut self, path: &FieldPath, rules: &[FieldRule<T>], value: &T) {
        for rule in rules {
            if !(rule.holds)(value) {
                self.push(path.field(rule.field), rule.code, rule.message);
            }
        }
    }

    /// Checks the cap and sibling-name uniqueness of a child collection.
    fn children<T: Named>(
        &mut self,
        path: &FieldPath,
        collection: &str,
        items: &[T],
        cap: Option<usize>,
    ) {
        if let Some(cap) = cap
            && items.len() > cap
        {
            self.push(
                path.field(collection),
                ErrorCode::TooManyItems,
                format!("at most {cap} {collection} are allowed (got {})", items.len()),
            );
        }
        let mut seen: HashMap<&str, usize> = HashMap::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let name = item.name();
            if name.trim().is_empty() {
                continue;
            }
            if let Some(first) = seen.get(name) {
                self.push(
                    path.item(collection, index).field("name"),
                    ErrorCode::DuplicateName,
                    format!("name \"{name}\" duplicates {collection}[{first}]"),
                );
            } else {
                seen.insert(name, index);
            }
        }
    }

    /// Walks a university.
    fn university(&mut self, path: &FieldPath, university: &University) {
        self.apply(path, &RULES.university, university);
        self.children(
            path,
            "departments",
            &university.departments,
            Some(MAX_DEPARTMENTS),
        );
        for (index, department) in university.departments.iter().enumerate() {
            self.department(&path.item("departments", index), department);
        }
    }

    /// Walks a department.
    fn department(&mut self, path: &FieldPath, department: &Department) {
        self.apply(path, &RULES.department, department);
        self.children(
            path,
            "majors",
            &department.majors,
            Some(MAX_MAJORS),
        );
        for (index, major) in department.majors.iter().enumerate() {
            self.major(&path.item("majors", index), major);
        }
    }

    /// Walks a major.
    fn major(&mut self, path: &FieldPath, major: &Major) {
        self.apply(path, &RULES.major, major);
        for (index, schedule) in major.admission_schedules.iter().enumerate() {
            self.schedule(&path.item("admission_schedules", index), schedule);
        }
    }

    /// Walks an admission schedule.
    fn schedule(&mut self, path: &FieldPath, schedule: &AdmissionSchedule) {
        self.apply(path, &RULES.schedule, schedule);
        for (index, info) in schedule.admission_infos.iter().enumerate() {
            self.apply(&path.item("admission_infos", index), &RULES.info, info);
        }
        for (index, test_type) in schedule.test_types.iter().enumerate() {
            self.test_type(&path.item("test_types", index), test_type);
        }
    }

    /// Walks a test type, including the percentage coherence check.
    fn test_type(&mut self, path: &FieldPath, test_type: &TestType) {
        self.apply(path, &RULES.test_type, test_type);
        self.children(
            path,
            "subjects",
            &test_type.subjects,
            Some(MAX_SUBJECTS),
        );
        for (index, subject) in test_type.subjects.iter().enumerate() {
            self.apply(&path.item("subjects", index), &RULES.subject, subject);
        }
        self.percentages(path, &test_type.subjects);
    }

    /// Checks that percentages match score shares when the total is positive.
    fn percentages(&mut self, path: &FieldPath, subjects: &[Subject]) {
        let total = score_total(subjects);
        if subjects.is_empty() || total <= 0.0 {
            return;
        }
        for (index, subject) in subjects.iter().enumerate() {
            let expected = share_of(subject.score, total);
            if (subject.percentage - expected).abs() > PERCENTAGE_TOLERANCE {
                self.push(
                    path.item("subjects", index).field("percentage"),
                    ErrorCode::PercentageMismatch,
                    format!("percentage must be {expected:.2} for score {}", subject.score),
                );
            }
        }
        let sum: f64 = subjects.iter().map(|subject| subject.percentage).sum();
        if (sum - 100.0).abs() > PERCENTAGE_TOLERANCE {
            self.push(
                path.field("subjects"),
                ErrorCode::PercentageSum,
                format!("subject percentages must sum to 100 (got {sum:.2})"),
            );
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_paths_render_dotted_indices() {
        let path = FieldPath::root().item("departments", 0).item("majors", 2).field("name");
        assert_eq!(path.as_str(), "departments[0].majors[2].name");
        assert_eq!(FieldPath::root().field("name").as_str(), "name");
    }

    #[test]
    fn error_codes_serialize_screaming_snake_case() {
        let value = serde_json::to_value(ErrorCode::PercentageMismatch).ok();
        assert_eq!(value, Some(serde_json::json!("PERCENTAGE_MISMATCH")));
        assert_eq!(ErrorCode::DuplicateName.as_str(), "DUPLICATE_NAME");
    }
}
