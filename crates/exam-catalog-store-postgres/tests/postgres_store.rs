// crates/exam-catalog-store-postgres/tests/postgres_store.rs
// ============================================================================
// Module: PostgreSQL Catalog Store Tests
// Description: Aggregate persistence against a live PostgreSQL server.
// Purpose: Exercise the PostgreSQL CatalogStore when a server is available.
// Dependencies: exam-catalog-store-postgres, exam-catalog-core
// ============================================================================

//! ## Overview
//! These tests run only when `EXAM_CATALOG_POSTGRES_URL` names a reachable
//! database; otherwise each test returns early. Every test writes uniquely
//! named universities so runs can share one database.

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

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use exam_catalog_core::AdmissionInfo;
use exam_catalog_core::AdmissionSchedule;
use exam_catalog_core::AdmissionStatus;
use exam_catalog_core::CatalogStore;
use exam_catalog_core::DeleteMode;
use exam_catalog_core::Department;
use exam_catalog_core::EntityRef;
use exam_catalog_core::IsolationLevel;
use exam_catalog_core::Major;
use exam_catalog_core::OpContext;
use exam_catalog_core::ResourceKind;
use exam_catalog_core::StoreError;
use exam_catalog_core::Subject;
use exam_catalog_core::TestType;
use exam_catalog_core::TxOptions;
use exam_catalog_core::University;
use exam_catalog_core::WriteCommand;
use exam_catalog_core::WriteRecord;
use exam_catalog_store_postgres::PostgresCatalogStore;
use exam_catalog_store_postgres::PostgresStoreConfig;
use time::macros::datetime;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

fn open_store() -> Option<PostgresCatalogStore> {
    let url = std::env::var("EXAM_CATALOG_POSTGRES_URL").ok()?;
    let mut config = PostgresStoreConfig::from_url(&url).expect("parse url");
    config.max_connections = 4;
    Some(PostgresCatalogStore::new(config).expect("open store"))
}

fn unique(prefix: &str) -> String {
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    format!("{prefix}-{}-{nanos}-{sequence}", std::process::id())
}

fn write(store: &PostgresCatalogStore, command: WriteCommand) -> Result<WriteRecord, StoreError> {
    store
        .write(&command, &TxOptions::default(), &OpContext::background())
        .map(|outcome| outcome.record)
}

fn nested_university(name: &str, scores: &[f64]) -> University {
    let mut test_type = TestType::new("個別試験");
    for (index, score) in scores.iter().enumerate() {
        let order = i32::try_from(index).unwrap();
        test_type = test_type.with_subject(Subject::new(format!("科目{index}"), *score, order));
    }
    let info = AdmissionInfo::new(
        80,
        2025,
        datetime!(2025-04-01 0:00 UTC),
        datetime!(2026-03-31 0:00 UTC),
        AdmissionStatus::Active,
    );
    let schedule = AdmissionSchedule::new("後期", 2).with_info(info).with_test_type(test_type);
    University::new(name).with_department(
        Department::new("工学部").with_major(Major::new("機械工学科").with_schedule(schedule)),
    )
}

fn create(store: &PostgresCatalogStore, university: University) -> University {
    match write(store, WriteCommand::CreateUniversity(university)).expect("create") {
        WriteRecord::University(university) => university,
        other => panic!("unexpected record: {other:?}"),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn nested_create_round_trips_with_percentages() {
    let Some(store) = open_store() else {
        return;
    };
    let created = create(&store, nested_university(&unique("大阪大学"), &[150.0, 50.0]));
    let loaded = store
        .load_university(created.id.unwrap(), &OpContext::background())
        .unwrap()
        .expect("present");
    assert_eq!(loaded, created);
    let subjects = &loaded.departments[0].majors[0].admission_schedules[0].test_types[0].subjects;
    assert_eq!(subjects[0].percentage, 75.0);
    assert_eq!(subjects[1].percentage, 25.0);
    assert_eq!(loaded.meta.version, 1);
}

#[test]
fn stale_version_update_conflicts() {
    let Some(store) = open_store() else {
        return;
    };
    let created = create(&store, University::new(unique("名古屋大学")));
    let id = created.id.unwrap();
    let mut renamed = created.clone();
    renamed.name = unique("名古屋大学改");
    write(
        &store,
        WriteCommand::UpdateUniversity {
            id,
            university: renamed.clone(),
            replace_children: false,
        },
    )
    .unwrap();
    let err = write(
        &store,
        WriteCommand::UpdateUniversity {
            id,
            university: renamed,
            replace_children: false,
        },
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { expected: 1, .. }), "{err:?}");
}

#[test]
fn duplicate_names_are_reported() {
    let Some(store) = open_store() else {
        return;
    };
    let name = unique("東北大学");
    create(&store, University::new(name.clone()));
    let err = write(&store, WriteCommand::CreateUniversity(University::new(name))).unwrap_err();
    assert!(matches!(
        err,
        StoreError::DuplicateName {
            resource: ResourceKind::University,
            ..
        }
    ));
}

#[test]
fn search_matches_department_names_case_insensitively() {
    let Some(store) = open_store() else {
        return;
    };
    let marker = unique("Faculty");
    let university = University::new(unique("九州大学"))
        .with_department(Department::new(marker.to_uppercase()));
    let created = create(&store, university);
    let found = store
        .search_universities(&marker.to_lowercase(), &OpContext::background())
        .unwrap();
    assert_eq!(found.iter().filter_map(|university| university.id).collect::<Vec<_>>(), vec![
        created.id.unwrap()
    ]);
}

#[test]
fn soft_delete_hides_sub_tree_and_hard_delete_cascades() {
    let Some(store) = open_store() else {
        return;
    };
    let soft = create(&store, nested_university(&unique("北海道大学"), &[10.0]));
    let department = soft.departments[0].id.unwrap();
    write(
        &store,
        WriteCommand::DeleteDepartment {
            university_id: soft.id.unwrap(),
            department_id: department,
            mode: DeleteMode::Soft,
        },
    )
    .unwrap();
    let reloaded = store
        .load_university(soft.id.unwrap(), &OpContext::background())
        .unwrap()
        .unwrap();
    assert!(reloaded.departments.is_empty());
    assert!(
        store
            .owning_university(EntityRef::Department(department), &OpContext::background())
            .unwrap()
            .is_none()
    );

    let hard = create(&store, nested_university(&unique("広島大学"), &[10.0]));
    write(
        &store,
        WriteCommand::DeleteUniversity {
            id: hard.id.unwrap(),
            mode: DeleteMode::Hard,
        },
    )
    .unwrap();
    let err = write(
        &store,
        WriteCommand::DeleteUniversity {
            id: hard.id.unwrap(),
            mode: DeleteMode::Hard,
        },
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[test]
fn serializable_transaction_rolls_back_on_error() {
    let Some(store) = open_store() else {
        return;
    };
    let name = unique("神戸大学");
    let options = TxOptions {
        isolation: IsolationLevel::Serializable,
        read_only: false,
    };
    let result = store.transaction(&options, &OpContext::background(), |tx| {
        tx.apply(&WriteCommand::CreateUniversity(University::new(name.clone())))?;
        tx.apply(&WriteCommand::CreateUniversity(University::new(name.clone())))
    });
    assert!(result.is_err());
    let found = store.search_universities(&name, &OpContext::background()).unwrap();
    assert!(found.is_empty());
}

#[test]
fn cancelled_context_is_rejected_before_work() {
    let Some(store) = open_store() else {
        return;
    };
    let ctx = OpContext::background();
    ctx.cancellation().cancel();
    let err = store
        .write(
            &WriteCommand::CreateUniversity(University::new(unique("千葉大学"))),
            &TxOptions::default(),
            &ctx,
        )
        .unwrap_err();
    assert_eq!(err, StoreError::Cancelled);
    store.readiness().unwrap();
}
