// crates/exam-catalog-core/src/core/model.rs
// ============================================================================
// Module: Exam Catalog Aggregate Model
// Description: University aggregate and its nested entities.
// Purpose: Define the versioned tree persisted and served by the catalog.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The University aggregate is a strongly typed tree:
//! `University → Department → Major → AdmissionSchedule → { AdmissionInfo,
//! TestType → Subject }`. Parents own their children by value; children only
//! carry the identifier of their parent. Every node carries a [`RecordMeta`]
//! header with audit timestamps, a soft-delete marker, and an optimistic
//! concurrency version.
//!
//! All wire fields are `snake_case`. Store-assigned fields (ids, parent ids,
//! timestamps) are optional on input so clients can post a bare tree.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::identifiers::AdmissionInfoId;
use crate::core::identifiers::AdmissionScheduleId;
use crate::core::identifiers::DepartmentId;
use crate::core::identifiers::MajorId;
use crate::core::identifiers::SubjectId;
use crate::core::identifiers::TestTypeId;
use crate::core::identifiers::UniversityId;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum name length in characters, measured after trimming.
pub const MAX_NAME_CHARS: usize = 100;
/// Maximum departments per university.
pub const MAX_DEPARTMENTS: usize = 50;
/// Maximum majors per department.
pub const MAX_MAJORS: usize = 30;
/// Maximum subjects per test type.
pub const MAX_SUBJECTS: usize = 20;
/// Earliest accepted academic year.
pub const MIN_ACADEMIC_YEAR: i32 = 2000;
/// Latest accepted academic year.
pub const MAX_ACADEMIC_YEAR: i32 = 2100;

// ============================================================================
// SECTION: Record Header
// ============================================================================

/// Audit and concurrency header shared by every catalog entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// Creation timestamp assigned by the store.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
    /// Last update timestamp assigned by the store.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
    /// Soft-delete marker; `None` for live rows.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    /// Optimistic concurrency version, starting at 1.
    #[serde(default = "default_version")]
    pub version: i64,
}

impl Default for RecordMeta {
    fn default() -> Self {
        Self {
            created_at: None,
            updated_at: None,
            deleted_at: None,
            version: default_version(),
        }
    }
}

impl RecordMeta {
    /// Returns a header carrying only the supplied version.
    #[must_use]
    pub fn with_version(version: i64) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }
}

/// Returns the version assigned to freshly inserted rows.
const fn default_version() -> i64 {
    1
}

// ============================================================================
// SECTION: Aggregate Root
// ============================================================================

/// University aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct University {
    /// Store-assigned identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UniversityId>,
    /// Display name, globally unique.
    #[serde(default)]
    pub name: String,
    /// Owned departments.
    #[serde(default)]
    pub departments: Vec<Department>,
    /// Record header.
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl University {
    /// Creates an unsaved university with no departments.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            departments: Vec::new(),
            meta: RecordMeta::default(),
        }
    }

    /// Adds a department and returns the university.
    #[must_use]
    pub fn with_department(mut self, department: Department) -> Self {
        self.departments.push(department);
        self
    }

    /// Iterates every test type in the tree.
    pub fn test_types_mut(&mut self) -> impl Iterator<Item = &mut TestType> {
        self.departments.iter_mut().flat_map(|department| department.test_types_mut())
    }
}

// ============================================================================
// SECTION: Nested Entities
// ============================================================================

/// Department within a university.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    /// Store-assigned identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DepartmentId>,
    /// Owning university.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub university_id: Option<UniversityId>,
    /// Display name, unique within the university.
    #[serde(default)]
    pub name: String,
    /// Owned majors.
    #[serde(default)]
    pub majors: Vec<Major>,
    /// Record header.
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl Department {
    /// Creates an unsaved department with no majors.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            university_id: None,
            name: name.into(),
            majors: Vec::new(),
            meta: RecordMeta::default(),
        }
    }

    /// Adds a major and returns the department.
    #[must_use]
    pub fn with_major(mut self, major: Major) -> Self {
        self.majors.push(major);
        self
    }

    /// Iterates every test type below this department.
    pub fn test_types_mut(&mut self) -> impl Iterator<Item = &mut TestType> {
        self.majors.iter_mut().flat_map(|major| major.test_types_mut())
    }
}

/// Major (course of study) within a department.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Major {
    /// Store-assigned identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MajorId>,
    /// Owning department.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<DepartmentId>,
    /// Display name, unique within the department.
    #[serde(default)]
    pub name: String,
    /// Owned admission schedules.
    #[serde(default)]
    pub admission_schedules: Vec<AdmissionSchedule>,
    /// Record header.
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl Major {
    /// Creates an unsaved major with no schedules.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            department_id: None,
            name: name.into(),
            admission_schedules: Vec::new(),
            meta: RecordMeta::default(),
        }
    }

    /// Adds an admission schedule and returns the major.
    #[must_use]
    pub fn with_schedule(mut self, schedule: AdmissionSchedule) -> Self {
        self.admission_schedules.push(schedule);
        self
    }

    /// Iterates every test type below this major.
    pub fn test_types_mut(&mut self) -> impl Iterator<Item = &mut TestType> {
        self.admission_schedules.iter_mut().flat_map(|schedule| schedule.test_types.iter_mut())
    }
}

/// Admission schedule (e.g. 前期, 後期) within a major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionSchedule {
    /// Store-assigned identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AdmissionScheduleId>,
    /// Owning major.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major_id: Option<MajorId>,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Sort key among sibling schedules.
    #[serde(default)]
    pub display_order: i32,
    /// Owned admission information rows.
    #[serde(default)]
    pub admission_infos: Vec<AdmissionInfo>,
    /// Owned test types.
    #[serde(default)]
    pub test_types: Vec<TestType>,
    /// Record header.
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl AdmissionSchedule {
    /// Creates an unsaved schedule with no children.
    #[must_use]
    pub fn new(name: impl Into<String>, display_order: i32) -> Self {
        Self {
            id: None,
            major_id: None,
            name: name.into(),
            display_order,
            admission_infos: Vec::new(),
            test_types: Vec::new(),
            meta: RecordMeta::default(),
        }
    }

    /// Adds a test type and returns the schedule.
    #[must_use]
    pub fn with_test_type(mut self, test_type: TestType) -> Self {
        self.test_types.push(test_type);
        self
    }

    /// Adds an admission info row and returns the schedule.
    #[must_use]
    pub fn with_info(mut self, info: AdmissionInfo) -> Self {
        self.admission_infos.push(info);
        self
    }
}

/// Lifecycle status of an admission info row.
///
/// Unknown strings are retained so validation can report them with a field
/// path instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AdmissionStatus {
    /// Currently in effect.
    #[default]
    Active,
    /// Retired from display.
    Archived,
    /// Being prepared, not yet public.
    Draft,
    /// Published to clients.
    Published,
    /// Any value outside the accepted set.
    Other(String),
}

impl AdmissionStatus {
    /// Returns the canonical wire label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Other(raw) => raw,
        }
    }

    /// Returns true when the status is one of the accepted values.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for AdmissionStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "active" => Self::Active,
            "archived" => Self::Archived,
            "draft" => Self::Draft,
            "published" => Self::Published,
            _ => Self::Other(value),
        }
    }
}

impl From<AdmissionStatus> for String {
    fn from(value: AdmissionStatus) -> Self {
        match value {
            AdmissionStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for AdmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enrollment and validity window for an admission schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionInfo {
    /// Store-assigned identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AdmissionInfoId>,
    /// Owning admission schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission_schedule_id: Option<AdmissionScheduleId>,
    /// Number of admitted students; must be positive.
    pub enrollment: i64,
    /// Academic year in `[2000, 2100]`.
    pub academic_year: i32,
    /// Start of validity.
    #[serde(with = "time::serde::rfc3339")]
    pub valid_from: OffsetDateTime,
    /// End of validity; never earlier than `valid_from`.
    #[serde(with = "time::serde::rfc3339")]
    pub valid_until: OffsetDateTime,
    /// Lifecycle status.
    #[serde(default)]
    pub status: AdmissionStatus,
    /// Record header.
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl AdmissionInfo {
    /// Creates an unsaved admission info row.
    #[must_use]
    pub fn new(
        enrollment: i64,
        academic_year: i32,
        valid_from: OffsetDateTime,
        valid_until: OffsetDateTime,
        status: AdmissionStatus,
    ) -> Self {
        Self {
            id: None,
            admission_schedule_id: None,
            enrollment,
            academic_year,
            valid_from,
            valid_until,
            status,
            meta: RecordMeta::default(),
        }
    }
}

/// Test type (e.g. 共通テスト, 二次試験) within an admission schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestType {
    /// Store-assigned identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TestTypeId>,
    /// Owning admission schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission_schedule_id: Option<AdmissionScheduleId>,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Owned subjects.
    #[serde(default)]
    pub subjects: Vec<Subject>,
    /// Record header.
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl TestType {
    /// Creates an unsaved test type with no subjects.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            admission_schedule_id: None,
            name: name.into(),
            subjects: Vec::new(),
            meta: RecordMeta::default(),
        }
    }

    /// Adds a subject and returns the test type.
    #[must_use]
    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subjects.push(subject);
        self
    }
}

/// Scored exam subject within a test type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    /// Store-assigned identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SubjectId>,
    /// Owning test type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_type_id: Option<TestTypeId>,
    /// Display name, unique within the test type.
    #[serde(default)]
    pub name: String,
    /// Allotted score; non-negative.
    #[serde(default)]
    pub score: f64,
    /// Share of the test type's total score, derived from `score`.
    #[serde(default)]
    pub percentage: f64,
    /// Sort key among sibling subjects.
    #[serde(default)]
    pub display_order: i32,
    /// Record header.
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl Subject {
    /// Creates an unsaved subject with a zero percentage.
    #[must_use]
    pub fn new(name: impl Into<String>, score: f64, display_order: i32) -> Self {
        Self {
            id: None,
            test_type_id: None,
            name: name.into(),
            score,
            percentage: 0.0,
            display_order,
            meta: RecordMeta::default(),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Tests use unwrap on deterministic fixtures.")]

    use serde_json::json;

    use super::*;

    #[test]
    fn bare_university_payload_deserializes_with_defaults() {
        let university: University =
            serde_json::from_value(json!({"name": "東京大学", "departments": []})).unwrap();
        assert_eq!(university.name, "東京大学");
        assert!(university.id.is_none());
        assert_eq!(university.meta.version, 1);
        assert!(university.meta.deleted_at.is_none());
    }

    #[test]
    fn unknown_status_is_retained_for_validation() {
        let status: AdmissionStatus = serde_json::from_value(json!("pending")).unwrap();
        assert_eq!(status, AdmissionStatus::Other("pending".to_string()));
        assert!(!status.is_known());
        assert_eq!(serde_json::to_value(&status).unwrap(), json!("pending"));
        let known: AdmissionStatus = serde_json::from_value(json!("published")).unwrap();
        assert_eq!(known, AdmissionStatus::Published);
    }

    #[test]
    fn record_meta_serializes_snake_case_timestamps() {
        let mut meta = RecordMeta::with_version(3);
        meta.created_at = Some(time::macros::datetime!(2025-04-01 09:00 UTC));
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["created_at"], json!("2025-04-01T09:00:00Z"));
        assert_eq!(value["deleted_at"], json!(null));
        assert_eq!(value["version"], json!(3));
        assert!(value.get("updated_at").is_none());
    }
}
