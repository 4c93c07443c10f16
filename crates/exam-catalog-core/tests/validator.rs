// crates/exam-catalog-core/tests/validator.rs
// ============================================================================
// Module: Validator Tests
// Description: Boundary and aggregate-level validation coverage.
// Purpose: Pin field paths, codes, and range boundaries of the validator.
// Dependencies: exam-catalog-core, time
// ============================================================================

//! ## Overview
//! Exercises the validator against whole aggregates: range boundaries,
//! sibling duplicates, caps, percentage coherence, and date ranges.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    missing_docs,
    reason = "Test-only panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use exam_catalog_core::AdmissionInfo;
use exam_catalog_core::AdmissionSchedule;
use exam_catalog_core::AdmissionStatus;
use exam_catalog_core::Department;
use exam_catalog_core::ErrorCode;
use exam_catalog_core::FilterCategory;
use exam_catalog_core::FilterOption;
use exam_catalog_core::FilterOptionId;
use exam_catalog_core::MAX_DEPARTMENTS;
use exam_catalog_core::Major;
use exam_catalog_core::RecordMeta;
use exam_catalog_core::Subject;
use exam_catalog_core::TestType;
use exam_catalog_core::University;
use exam_catalog_core::ValidationError;
use exam_catalog_core::Validator;
use exam_catalog_core::normalize_university;
use time::macros::datetime;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn info(enrollment: i64, academic_year: i32) -> AdmissionInfo {
    AdmissionInfo::new(
        enrollment,
        academic_year,
        datetime!(2025-04-01 00:00 UTC),
        datetime!(2026-03-31 00:00 UTC),
        AdmissionStatus::Active,
    )
}

fn university_with_info(info: AdmissionInfo) -> University {
    University::new("東京大学").with_department(
        Department::new("理学部").with_major(
            Major::new("数学科").with_schedule(AdmissionSchedule::new("前期", 0).with_info(info)),
        ),
    )
}

fn codes(error: &ValidationError) -> Vec<(String, ErrorCode)> {
    error.errors().iter().map(|e| (e.field_path.clone(), e.code)).collect()
}

const INFO_PATH: &str = "departments[0].majors[0].admission_schedules[0].admission_infos[0]";

// ============================================================================
// SECTION: Boundaries
// ============================================================================

#[test]
fn enrollment_must_be_positive() {
    let validator = Validator::new();
    let err = validator.validate_university(&university_with_info(info(0, 2025))).unwrap_err();
    assert_eq!(codes(&err), vec![(format!("{INFO_PATH}.enrollment"), ErrorCode::OutOfRange)]);
    assert!(validator.validate_university(&university_with_info(info(1, 2025))).is_ok());
}

#[test]
fn academic_year_bounds_are_inclusive() {
    let validator = Validator::new();
    for year in [2000, 2100] {
        assert!(validator.validate_university(&university_with_info(info(10, year))).is_ok());
    }
    for year in [1999, 2101] {
        let err = validator.validate_university(&university_with_info(info(10, year))).unwrap_err();
        assert_eq!(
            codes(&err),
            vec![(format!("{INFO_PATH}.academic_year"), ErrorCode::OutOfRange)]
        );
    }
}

#[test]
fn department_cap_allows_fifty() {
    let validator = Validator::new();
    let mut university = University::new("大学");
    for index in 0..MAX_DEPARTMENTS {
        university.departments.push(Department::new(format!("学部{index}")));
    }
    assert!(validator.validate_university(&university).is_ok());

    university.departments.push(Department::new("追加学部"));
    let err = validator.validate_university(&university).unwrap_err();
    assert_eq!(codes(&err), vec![("departments".to_string(), ErrorCode::TooManyItems)]);
}

#[test]
fn inverted_validity_window_is_reported_on_valid_until() {
    let mut row = info(10, 2025);
    row.valid_until = datetime!(2024-01-01 00:00 UTC);
    let err = Validator::new().validate_admission_info(&row).unwrap_err();
    assert_eq!(codes(&err), vec![("valid_until".to_string(), ErrorCode::InvalidDateRange)]);
}

#[test]
fn unknown_status_is_an_enum_violation() {
    let mut row = info(10, 2025);
    row.status = AdmissionStatus::from("pending".to_string());
    let err = Validator::new().validate_admission_info(&row).unwrap_err();
    assert_eq!(codes(&err), vec![("status".to_string(), ErrorCode::InvalidEnum)]);
}

#[test]
fn version_below_one_is_rejected() {
    let mut university = University::new("大学");
    university.meta = RecordMeta::with_version(0);
    let err = Validator::new().validate_university(&university).unwrap_err();
    assert_eq!(codes(&err), vec![("version".to_string(), ErrorCode::InvalidVersion)]);
}

// ============================================================================
// SECTION: Aggregate Rules
// ============================================================================

#[test]
fn duplicate_department_reports_later_index() {
    let university = University::new("東京大学")
        .with_department(Department::new("理学部"))
        .with_department(Department::new("理学部"));
    let err = Validator::new().validate_university(&university).unwrap_err();
    let error = err.find("departments[1].name").expect("duplicate reported");
    assert_eq!(error.code, ErrorCode::DuplicateName);
    assert!(err.find("departments[0].name").is_none());
}

#[test]
fn violations_accumulate_across_the_tree() {
    let mut subject = Subject::new("", -1.0, -2);
    subject.percentage = 0.0;
    let university = University::new("").with_department(
        Department::new("理学部").with_major(
            Major::new("数学科").with_schedule(
                AdmissionSchedule::new("前期", -1)
                    .with_test_type(TestType::new("共通テスト").with_subject(subject)),
            ),
        ),
    );
    let err = Validator::new().validate_university(&university).unwrap_err();
    let subject_path = "departments[0].majors[0].admission_schedules[0].test_types[0].subjects[0]";
    assert_eq!(err.find("name").map(|e| e.code), Some(ErrorCode::Required));
    assert_eq!(
        err.find("departments[0].majors[0].admission_schedules[0].display_order").map(|e| e.code),
        Some(ErrorCode::NegativeValue)
    );
    assert_eq!(
        err.find(&format!("{subject_path}.name")).map(|e| e.code),
        Some(ErrorCode::Required)
    );
    assert_eq!(
        err.find(&format!("{subject_path}.score")).map(|e| e.code),
        Some(ErrorCode::OutOfRange)
    );
    assert_eq!(
        err.find(&format!("{subject_path}.display_order")).map(|e| e.code),
        Some(ErrorCode::NegativeValue)
    );
}

#[test]
fn stale_percentages_fail_until_normalized() {
    let mut english = Subject::new("英語", 100.0, 0);
    english.percentage = 80.0;
    let mut math = Subject::new("数学", 100.0, 1);
    math.percentage = 30.0;
    let mut university = University::new("大学").with_department(
        Department::new("理学部").with_major(
            Major::new("数学科").with_schedule(
                AdmissionSchedule::new("前期", 0).with_test_type(
                    TestType::new("二次試験").with_subject(english).with_subject(math),
                ),
            ),
        ),
    );
    let validator = Validator::new();
    let err = validator.validate_university(&university).unwrap_err();
    let test_type_path = "departments[0].majors[0].admission_schedules[0].test_types[0]";
    assert_eq!(
        err.find(&format!("{test_type_path}.subjects[0].percentage")).map(|e| e.code),
        Some(ErrorCode::PercentageMismatch)
    );
    assert_eq!(
        err.find(&format!("{test_type_path}.subjects")).map(|e| e.code),
        Some(ErrorCode::PercentageSum)
    );

    normalize_university(&mut university);
    assert!(validator.validate_university(&university).is_ok());
}

#[test]
fn all_zero_scores_skip_percentage_checks() {
    let test_type = TestType::new("面接")
        .with_subject(Subject::new("面接", 0.0, 0))
        .with_subject(Subject::new("書類", 0.0, 1));
    assert!(Validator::new().validate_test_type(&test_type).is_ok());
}

#[test]
fn subject_batch_reports_indexed_paths() {
    let subjects = vec![Subject::new("英語", 60.0, 0), Subject::new("英語", -5.0, 1)];
    let err = Validator::new().validate_subject_batch(&subjects).unwrap_err();
    assert_eq!(err.find("subjects[1].name").map(|e| e.code), Some(ErrorCode::DuplicateName));
    assert_eq!(err.find("subjects[1].score").map(|e| e.code), Some(ErrorCode::OutOfRange));
}

// ============================================================================
// SECTION: Filter Options
// ============================================================================

#[test]
fn prefecture_requires_region_parent() {
    let validator = Validator::new();
    let mut region = FilterOption::new(FilterCategory::Region, "関東", 0);
    region.id = Some(FilterOptionId::new(1));
    let mut classification = FilterOption::new(FilterCategory::Classification, "国立", 0);
    classification.id = Some(FilterOptionId::new(2));

    let tokyo = FilterOption::new(FilterCategory::Prefecture, "東京都", 0)
        .with_parent(FilterOptionId::new(1));
    assert!(validator.validate_filter_option(&tokyo, Some(&region)).is_ok());

    let err = validator.validate_filter_option(&tokyo, Some(&classification)).unwrap_err();
    assert_eq!(codes(&err), vec![("parent_id".to_string(), ErrorCode::InvalidParent)]);

    let err = validator.validate_filter_option(&tokyo, None).unwrap_err();
    assert_eq!(codes(&err), vec![("parent_id".to_string(), ErrorCode::InvalidParent)]);
}

#[test]
fn region_cannot_have_parent_and_name_is_capped() {
    let option = FilterOption::new(FilterCategory::Region, "あ".repeat(21), 0)
        .with_parent(FilterOptionId::new(9));
    let err = Validator::new().validate_filter_option(&option, None).unwrap_err();
    assert_eq!(err.find("name").map(|e| e.code), Some(ErrorCode::TooLong));
    assert_eq!(err.find("parent_id").map(|e| e.code), Some(ErrorCode::InvalidParent));
}
