// crates/exam-catalog-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Catalog Store Tests
// Description: Aggregate persistence, concurrency, and delete semantics.
// Purpose: Exercise the SQLite-backed CatalogStore end to end.
// Dependencies: exam-catalog-store-sqlite, exam-catalog-core, tempfile
// ============================================================================

//! ## Overview
//! Each test opens a fresh database in a temporary directory and drives it
//! through the [`CatalogStore`] trait or the explicit transaction API, so
//! cascade, soft-delete, savepoint, and optimistic-concurrency behavior is
//! observed against a real engine.

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

use std::sync::Arc;
use std::sync::Barrier;
use std::thread;

use exam_catalog_core::AdmissionInfo;
use exam_catalog_core::AdmissionSchedule;
use exam_catalog_core::AdmissionStatus;
use exam_catalog_core::CatalogStore;
use exam_catalog_core::DeleteMode;
use exam_catalog_core::Department;
use exam_catalog_core::DepartmentId;
use exam_catalog_core::EntityRef;
use exam_catalog_core::ErrorCode;
use exam_catalog_core::FilterCategory;
use exam_catalog_core::FilterOption;
use exam_catalog_core::FilterOptionId;
use exam_catalog_core::InvalidationScope;
use exam_catalog_core::MAX_DEPARTMENTS;
use exam_catalog_core::Major;
use exam_catalog_core::MajorId;
use exam_catalog_core::OpContext;
use exam_catalog_core::Page;
use exam_catalog_core::ResourceKind;
use exam_catalog_core::StoreError;
use exam_catalog_core::Subject;
use exam_catalog_core::SubjectId;
use exam_catalog_core::TestType;
use exam_catalog_core::TestTypeId;
use exam_catalog_core::TxOptions;
use exam_catalog_core::University;
use exam_catalog_core::UniversityId;
use exam_catalog_core::WriteCommand;
use exam_catalog_core::WriteRecord;
use exam_catalog_core::percentages_coherent;
use exam_catalog_store_sqlite::SqliteCatalogStore;
use exam_catalog_store_sqlite::SqliteStoreConfig;
use exam_catalog_store_sqlite::SqliteStoreError;
use proptest::prelude::*;
use tempfile::TempDir;
use time::macros::datetime;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn open_store() -> (TempDir, SqliteCatalogStore) {
    let dir = TempDir::new().expect("tempdir");
    let config = SqliteStoreConfig::new(dir.path().join("catalog.db"));
    let store = SqliteCatalogStore::new(config).expect("open store");
    (dir, store)
}

fn write(store: &SqliteCatalogStore, command: WriteCommand) -> Result<WriteRecord, StoreError> {
    store
        .write(&command, &TxOptions::default(), &OpContext::background())
        .map(|outcome| outcome.record)
}

fn sample_info() -> AdmissionInfo {
    AdmissionInfo::new(
        120,
        2025,
        datetime!(2025-04-01 0:00 UTC),
        datetime!(2026-03-31 0:00 UTC),
        AdmissionStatus::Published,
    )
}

fn nested_university(name: &str, scores: &[f64]) -> University {
    let mut test_type = TestType::new("共通テスト");
    for (index, score) in scores.iter().enumerate() {
        let order = i32::try_from(index).unwrap();
        let mut subject = Subject::new(format!("科目{index}"), *score, order);
        subject.percentage = 99.0;
        test_type = test_type.with_subject(subject);
    }
    let schedule = AdmissionSchedule::new("前期", 1).with_info(sample_info()).with_test_type(test_type);
    University::new(name).with_department(
        Department::new("理学部").with_major(Major::new("数学科").with_schedule(schedule)),
    )
}

fn create(store: &SqliteCatalogStore, university: University) -> University {
    match write(store, WriteCommand::CreateUniversity(university)).expect("create") {
        WriteRecord::University(university) => university,
        other => panic!("unexpected record: {other:?}"),
    }
}

fn first_test_type(university: &University) -> &TestType {
    &university.departments[0].majors[0].admission_schedules[0].test_types[0]
}

fn ids(university: &University) -> (UniversityId, DepartmentId, MajorId, TestTypeId) {
    let department = &university.departments[0];
    let major = &department.majors[0];
    (
        university.id.unwrap(),
        department.id.unwrap(),
        major.id.unwrap(),
        first_test_type(university).id.unwrap(),
    )
}

fn reload(store: &SqliteCatalogStore, id: UniversityId) -> Option<University> {
    store.load_university(id, &OpContext::background()).expect("load")
}

// ============================================================================
// SECTION: Create and Read
// ============================================================================

#[test]
fn create_minimal_university_assigns_id_and_version() {
    let (_dir, store) = open_store();
    let university = create(&store, University::new("東京大学"));

    assert!(university.id.unwrap().get() >= 1);
    assert_eq!(university.meta.version, 1);
    assert!(university.meta.created_at.is_some());
    assert!(university.departments.is_empty());
}

#[test]
fn create_nested_tree_recomputes_percentages() {
    let (_dir, store) = open_store();
    let university = create(&store, nested_university("東京大学", &[100.0, 100.0]));

    let percentages: Vec<f64> =
        first_test_type(&university).subjects.iter().map(|subject| subject.percentage).collect();
    assert_eq!(percentages, vec![50.0, 50.0]);

    let stored = reload(&store, university.id.unwrap()).unwrap();
    assert_eq!(stored, university);
    let schedule = &stored.departments[0].majors[0].admission_schedules[0];
    assert_eq!(schedule.admission_infos.len(), 1);
    assert_eq!(schedule.admission_infos[0].status, AdmissionStatus::Published);
    assert_eq!(schedule.admission_infos[0].valid_from, datetime!(2025-04-01 0:00 UTC));
}

#[test]
fn zero_scores_store_zero_percentages() {
    let (_dir, store) = open_store();
    let university = create(&store, nested_university("京都大学", &[0.0, 0.0]));
    assert!(first_test_type(&university).subjects.iter().all(|subject| subject.percentage == 0.0));
}

#[test]
fn children_are_ordered_by_name_and_display_order() {
    let (_dir, store) = open_store();
    let mut university = University::new("大阪大学")
        .with_department(Department::new("理学部"))
        .with_department(Department::new("工学部"));
    university.departments[0].majors.push(Major::new("物理学科"));
    let created = create(&store, university);
    let names: Vec<&str> =
        created.departments.iter().map(|department| department.name.as_str()).collect();
    assert_eq!(names, vec!["工学部", "理学部"]);

    let (_, _, _, test_type_id) = ids(&create(&store, nested_university("名古屋大学", &[1.0, 2.0])));
    let subjects = match write(
        &store,
        WriteCommand::UpdateSubjectsBatch {
            test_type_id,
            subjects: vec![Subject::new("同順", 5.0, 0)],
        },
    )
    .unwrap()
    {
        WriteRecord::Subjects(subjects) => subjects,
        other => panic!("unexpected record: {other:?}"),
    };
    let names: Vec<&str> = subjects.iter().map(|subject| subject.name.as_str()).collect();
    assert_eq!(names, vec!["科目0", "同順", "科目1"]);
}

#[test]
fn list_universities_pages_by_id() {
    let (_dir, store) = open_store();
    for name in ["A大学", "B大学", "C大学"] {
        create(&store, University::new(name));
    }
    let ctx = OpContext::background();
    let page = store.list_universities(Page::new(1, 1), &ctx).unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].name, "B大学");
    assert_eq!(store.list_universities(Page::default(), &ctx).unwrap().len(), 3);
}

#[test]
fn search_matches_substrings_case_insensitively() {
    let (_dir, store) = open_store();
    create(&store, University::new("Kyoto University"));
    let tokyo = create(&store, nested_university("東京大学", &[1.0]));
    let ctx = OpContext::background();

    let found = store.search_universities("kyoto", &ctx).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Kyoto University");

    let by_department = store.search_universities("理学", &ctx).unwrap();
    assert_eq!(by_department.len(), 1);
    assert_eq!(by_department[0].id, tokyo.id);

    assert!(store.search_universities("%", &ctx).unwrap().is_empty());
}

// ============================================================================
// SECTION: Update and Concurrency
// ============================================================================

#[test]
fn update_bumps_version_and_rejects_stale_version() {
    let (_dir, store) = open_store();
    let created = create(&store, University::new("東北大学"));
    let id = created.id.unwrap();

    let mut incoming = created.clone();
    incoming.name = "東北大学（改）".to_string();
    let updated = match write(
        &store,
        WriteCommand::UpdateUniversity {
            id,
            university: incoming.clone(),
            replace_children: false,
        },
    )
    .unwrap()
    {
        WriteRecord::University(university) => university,
        other => panic!("unexpected record: {other:?}"),
    };
    assert_eq!(updated.meta.version, 2);

    let err = write(
        &store,
        WriteCommand::UpdateUniversity {
            id,
            university: incoming,
            replace_children: false,
        },
    )
    .unwrap_err();
    assert_eq!(
        err,
        StoreError::Conflict {
            resource: ResourceKind::University,
            id: id.get(),
            expected: 1,
        }
    );
}

#[test]
fn concurrent_stale_writers_let_one_succeed() {
    let (_dir, store) = open_store();
    let created = create(&store, University::new("九州大学"));
    let id = created.id.unwrap();
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = ["九州大学A", "九州大学B"]
        .into_iter()
        .map(|name| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            let mut university = created.clone();
            university.name = name.to_string();
            thread::spawn(move || {
                barrier.wait();
                write(
                    &store,
                    WriteCommand::UpdateUniversity {
                        id,
                        university,
                        replace_children: false,
                    },
                )
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    for result in results.iter().filter_map(|result| result.as_ref().err()) {
        assert!(
            matches!(result, StoreError::Conflict { .. } | StoreError::Db(_)),
            "unexpected error: {result:?}"
        );
    }
    assert_eq!(reload(&store, id).unwrap().meta.version, 2);
}

#[test]
fn replace_children_reconciles_by_id() {
    let (_dir, store) = open_store();
    let created = create(
        &store,
        University::new("北海道大学")
            .with_department(Department::new("理学部"))
            .with_department(Department::new("文学部")),
    );
    let id = created.id.unwrap();
    let kept = created.departments.iter().find(|d| d.name == "理学部").unwrap().clone();

    let mut incoming = created.clone();
    let mut renamed = kept.clone();
    renamed.name = "理工学部".to_string();
    incoming.departments = vec![renamed, Department::new("医学部")];
    write(
        &store,
        WriteCommand::UpdateUniversity {
            id,
            university: incoming,
            replace_children: true,
        },
    )
    .unwrap();

    let stored = reload(&store, id).unwrap();
    let names: Vec<&str> = stored.departments.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["医学部", "理工学部"]);
    assert!(stored.departments.iter().any(|d| d.id == kept.id));
}

#[test]
fn replace_children_rejects_foreign_child_ids() {
    let (_dir, store) = open_store();
    let other = create(&store, University::new("他大学").with_department(Department::new("法学部")));
    let created = create(&store, University::new("自大学"));
    let mut incoming = created.clone();
    incoming.departments = vec![other.departments[0].clone()];

    let err = write(
        &store,
        WriteCommand::UpdateUniversity {
            id: created.id.unwrap(),
            university: incoming,
            replace_children: true,
        },
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { resource: ResourceKind::Department, .. }));
    assert_eq!(reload(&store, other.id.unwrap()).unwrap().departments.len(), 1);
}

#[test]
fn replace_children_swaps_sibling_names() {
    let (_dir, store) = open_store();
    let created = create(
        &store,
        University::new("東北大学")
            .with_department(Department::new("理学部"))
            .with_department(Department::new("文学部")),
    );
    let id = created.id.unwrap();
    let science = created.departments.iter().find(|d| d.name == "理学部").unwrap().clone();
    let letters = created.departments.iter().find(|d| d.name == "文学部").unwrap().clone();

    let mut incoming = created.clone();
    let mut first = science.clone();
    first.name = "文学部".to_string();
    let mut second = letters.clone();
    second.name = "理学部".to_string();
    incoming.departments = vec![first, second];
    write(
        &store,
        WriteCommand::UpdateUniversity {
            id,
            university: incoming,
            replace_children: true,
        },
    )
    .unwrap();

    let stored = reload(&store, id).unwrap();
    let by_id = |department_id: Option<DepartmentId>| {
        stored.departments.iter().find(|d| d.id == department_id).unwrap().name.clone()
    };
    assert_eq!(by_id(science.id), "文学部");
    assert_eq!(by_id(letters.id), "理学部");
    assert_eq!(stored.departments.len(), 2);
}

#[test]
fn replace_children_inserts_a_name_released_later_in_the_payload() {
    let (_dir, store) = open_store();
    let created = create(&store, University::new("名古屋大学").with_department(Department::new("工学部")));
    let id = created.id.unwrap();
    let mut renamed = created.departments[0].clone();
    renamed.name = "情報学部".to_string();

    let mut incoming = created.clone();
    incoming.departments = vec![Department::new("工学部"), renamed.clone()];
    write(
        &store,
        WriteCommand::UpdateUniversity {
            id,
            university: incoming,
            replace_children: true,
        },
    )
    .unwrap();

    let stored = reload(&store, id).unwrap();
    let names: Vec<&str> = stored.departments.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["工学部", "情報学部"]);
    let kept = stored.departments.iter().find(|d| d.id == renamed.id).unwrap();
    assert_eq!(kept.name, "情報学部");
}

#[test]
fn batch_update_recomputes_percentages() {
    let (_dir, store) = open_store();
    let created = create(&store, nested_university("一橋大学", &[60.0, 40.0]));
    let (id, _, _, test_type_id) = ids(&created);

    let mut subjects = first_test_type(&created).subjects.clone();
    subjects[0].score = 70.0;
    subjects[1].score = 30.0;
    let outcome = store
        .write(
            &WriteCommand::UpdateSubjectsBatch {
                test_type_id,
                subjects,
            },
            &TxOptions::default(),
            &OpContext::background(),
        )
        .unwrap();
    assert_eq!(outcome.scope, InvalidationScope::All);

    let stored = reload(&store, id).unwrap();
    let percentages: Vec<f64> =
        first_test_type(&stored).subjects.iter().map(|subject| subject.percentage).collect();
    assert_eq!(percentages, vec![70.0, 30.0]);
    assert!((percentages.iter().sum::<f64>() - 100.0).abs() < 0.01);
}

#[test]
fn batch_update_swaps_subject_names() {
    let (_dir, store) = open_store();
    let created = create(&store, nested_university("神戸大学", &[60.0, 40.0]));
    let (id, _, _, test_type_id) = ids(&created);

    let mut subjects = first_test_type(&created).subjects.clone();
    let (first, second) = (subjects[0].name.clone(), subjects[1].name.clone());
    subjects[0].name.clone_from(&second);
    subjects[1].name.clone_from(&first);
    write(
        &store,
        WriteCommand::UpdateSubjectsBatch {
            test_type_id,
            subjects: subjects.clone(),
        },
    )
    .unwrap();

    let stored = reload(&store, id).unwrap();
    let stored_subjects = &first_test_type(&stored).subjects;
    for subject in &subjects {
        let persisted = stored_subjects.iter().find(|s| s.id == subject.id).unwrap();
        assert_eq!(persisted.name, subject.name);
    }
}

#[test]
fn batch_for_missing_test_type_is_not_found() {
    let (_dir, store) = open_store();
    let err = write(
        &store,
        WriteCommand::UpdateSubjectsBatch {
            test_type_id: TestTypeId::new(404),
            subjects: vec![Subject::new("数学", 1.0, 0)],
        },
    )
    .unwrap_err();
    assert_eq!(
        err,
        StoreError::NotFound {
            resource: ResourceKind::TestType,
            id: 404,
        }
    );
}

#[test]
fn subject_write_recomputes_sibling_percentages() {
    let (_dir, store) = open_store();
    let created = create(&store, nested_university("筑波大学", &[50.0, 50.0]));
    let (id, _, _, test_type_id) = ids(&created);

    write(
        &store,
        WriteCommand::CreateSubject {
            test_type_id,
            subject: Subject::new("英語", 100.0, 5),
        },
    )
    .unwrap();
    let subjects = first_test_type(&reload(&store, id).unwrap()).subjects.clone();
    let percentages: Vec<f64> = subjects.iter().map(|subject| subject.percentage).collect();
    assert_eq!(percentages, vec![25.0, 25.0, 50.0]);

    write(
        &store,
        WriteCommand::DeleteSubject {
            test_type_id,
            subject_id: subjects[2].id.unwrap(),
            mode: DeleteMode::Hard,
        },
    )
    .unwrap();
    let subjects = first_test_type(&reload(&store, id).unwrap()).subjects.clone();
    assert!(subjects.iter().all(|subject| subject.percentage == 50.0));
}

// ============================================================================
// SECTION: Constraints
// ============================================================================

#[test]
fn duplicate_sibling_names_are_rejected() {
    let (_dir, store) = open_store();
    let err = write(
        &store,
        WriteCommand::CreateUniversity(
            University::new("重複大学")
                .with_department(Department::new("理学部"))
                .with_department(Department::new("理学部")),
        ),
    )
    .unwrap_err();
    assert_eq!(
        err,
        StoreError::DuplicateName {
            resource: ResourceKind::Department,
            name: "理学部".to_string(),
        }
    );
    assert!(store.list_universities(Page::default(), &OpContext::background()).unwrap().is_empty());

    create(&store, University::new("東京大学"));
    let err = write(&store, WriteCommand::CreateUniversity(University::new("東京大学"))).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateName { resource: ResourceKind::University, .. }));
}

#[test]
fn department_cap_is_enforced_after_create() {
    let (_dir, store) = open_store();
    let mut university = University::new("大規模大学");
    for index in 0 .. MAX_DEPARTMENTS {
        university = university.with_department(Department::new(format!("学部{index:02}")));
    }
    let id = create(&store, university).id.unwrap();

    let err = write(
        &store,
        WriteCommand::CreateDepartment {
            university_id: id,
            department: Department::new("超過学部"),
        },
    )
    .unwrap_err();
    match err {
        StoreError::Validation(validation) => {
            assert_eq!(validation.errors()[0].code, ErrorCode::TooManyItems);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(reload(&store, id).unwrap().departments.len(), MAX_DEPARTMENTS);
}

#[test]
fn creating_under_missing_parent_is_parent_not_found() {
    let (_dir, store) = open_store();
    let err = write(
        &store,
        WriteCommand::CreateMajor {
            department_id: DepartmentId::new(77),
            major: Major::new("化学科"),
        },
    )
    .unwrap_err();
    assert_eq!(
        err,
        StoreError::ParentNotFound {
            resource: ResourceKind::Department,
            id: 77,
        }
    );
}

#[test]
fn children_are_scoped_to_their_owner() {
    let (_dir, store) = open_store();
    let first = create(&store, nested_university("第一大学", &[1.0]));
    let second = create(&store, University::new("第二大学"));
    let (_, department_id, major_id, _) = ids(&first);
    let ctx = OpContext::background();

    assert!(store.load_department(second.id.unwrap(), department_id, &ctx).unwrap().is_none());
    assert_eq!(
        store.owning_university(EntityRef::Major(major_id), &ctx).unwrap(),
        first.id
    );

    let mut department = first.departments[0].clone();
    department.name = "乗っ取り".to_string();
    let err = write(
        &store,
        WriteCommand::UpdateDepartment {
            university_id: second.id.unwrap(),
            department_id,
            department,
        },
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { resource: ResourceKind::Department, .. }));
}

// ============================================================================
// SECTION: Deletes
// ============================================================================

#[test]
fn hard_delete_cascades_to_descendants() {
    let (_dir, store) = open_store();
    let created = create(&store, nested_university("消去大学", &[1.0]));
    let (id, _, _, test_type_id) = ids(&created);
    let subject_id = first_test_type(&created).subjects[0].id.unwrap();

    let outcome = store
        .write(
            &WriteCommand::DeleteUniversity {
                id,
                mode: DeleteMode::Hard,
            },
            &TxOptions::default(),
            &OpContext::background(),
        )
        .unwrap();
    assert_eq!(outcome.record, WriteRecord::Deleted);
    assert_eq!(outcome.scope, InvalidationScope::University(id));

    let ctx = OpContext::background();
    assert!(reload(&store, id).is_none());
    assert!(store.load_subject(test_type_id, subject_id, &ctx).unwrap().is_none());
    let err = write(
        &store,
        WriteCommand::DeleteUniversity {
            id,
            mode: DeleteMode::Hard,
        },
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[test]
fn soft_delete_hides_subtree_and_frees_the_name() {
    let (_dir, store) = open_store();
    let created = create(&store, nested_university("論理大学", &[1.0]));
    let (id, department_id, major_id, _) = ids(&created);
    let ctx = OpContext::background();

    write(
        &store,
        WriteCommand::DeleteDepartment {
            university_id: id,
            department_id,
            mode: DeleteMode::Soft,
        },
    )
    .unwrap();

    assert!(reload(&store, id).unwrap().departments.is_empty());
    assert!(store.load_department(id, department_id, &ctx).unwrap().is_none());
    assert!(store.owning_university(EntityRef::Major(major_id), &ctx).unwrap().is_none());

    let recreated = write(
        &store,
        WriteCommand::CreateDepartment {
            university_id: id,
            department: Department::new("理学部"),
        },
    )
    .unwrap();
    assert!(matches!(recreated, WriteRecord::Department(_)));
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

#[test]
fn savepoint_rollback_keeps_outer_work() {
    let (_dir, store) = open_store();
    let ctx = OpContext::background();
    store
        .transaction(&TxOptions::default(), &ctx, |tx| {
            tx.apply(&WriteCommand::CreateUniversity(University::new("外側大学")))?;
            let inner = tx.savepoint(|sp| {
                sp.apply(&WriteCommand::CreateUniversity(University::new("内側大学")))?;
                Err::<(), _>(SqliteStoreError::Invalid("abort inner work".to_string()))
            });
            assert!(inner.is_err());
            Ok(())
        })
        .unwrap();

    let names: Vec<String> = store
        .list_universities(Page::default(), &ctx)
        .unwrap()
        .into_iter()
        .map(|university| university.name)
        .collect();
    assert_eq!(names, vec!["外側大学".to_string()]);
}

#[test]
fn cancellation_before_commit_leaves_store_unchanged() {
    let (_dir, store) = open_store();
    let ctx = OpContext::background();
    let err = store
        .transaction(&TxOptions::default(), &ctx, |tx| {
            tx.apply(&WriteCommand::CreateUniversity(University::new("取消大学")))?;
            ctx.cancellation().cancel();
            Ok(())
        })
        .unwrap_err();
    assert_eq!(StoreError::from(err), StoreError::Cancelled);

    let fresh = OpContext::background();
    assert!(store.list_universities(Page::default(), &fresh).unwrap().is_empty());
}

#[test]
fn read_only_transactions_reject_writes() {
    let (_dir, store) = open_store();
    let options = TxOptions {
        read_only: true,
        ..TxOptions::default()
    };
    let err = store
        .write(
            &WriteCommand::CreateUniversity(University::new("読取大学")),
            &options,
            &OpContext::background(),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::Db(_)));
}

// ============================================================================
// SECTION: Filter Options
// ============================================================================

#[test]
fn filter_options_nest_and_list_by_category() {
    let (_dir, store) = open_store();
    let region = match write(
        &store,
        WriteCommand::CreateFilterOption(FilterOption::new(FilterCategory::Region, "関東", 1)),
    )
    .unwrap()
    {
        WriteRecord::FilterOption(option) => option,
        other => panic!("unexpected record: {other:?}"),
    };
    let region_id = region.id.unwrap();
    write(
        &store,
        WriteCommand::CreateFilterOption(
            FilterOption::new(FilterCategory::Prefecture, "東京都", 1).with_parent(region_id),
        ),
    )
    .unwrap();

    let ctx = OpContext::background();
    let prefectures = store.list_filter_options(Some(FilterCategory::Prefecture), &ctx).unwrap();
    assert_eq!(prefectures.len(), 1);
    assert_eq!(prefectures[0].parent_id, Some(region_id));
    assert_eq!(store.list_filter_options(None, &ctx).unwrap().len(), 2);

    let err = write(
        &store,
        WriteCommand::CreateFilterOption(
            FilterOption::new(FilterCategory::Prefecture, "大阪府", 2)
                .with_parent(FilterOptionId::new(999)),
        ),
    )
    .unwrap_err();
    assert_eq!(
        err,
        StoreError::ParentNotFound {
            resource: ResourceKind::FilterOption,
            id: 999,
        }
    );

    let err = write(
        &store,
        WriteCommand::CreateFilterOption(FilterOption::new(FilterCategory::Region, "関東", 2)),
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateName { .. }));
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

#[test]
fn directory_paths_are_rejected() {
    let dir = TempDir::new().unwrap();
    let err = SqliteCatalogStore::new(SqliteStoreConfig::new(dir.path())).unwrap_err();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn zero_connections_are_rejected() {
    let dir = TempDir::new().unwrap();
    let mut config = SqliteStoreConfig::new(dir.path().join("catalog.db"));
    config.max_connections = 0;
    let err = SqliteCatalogStore::new(config).unwrap_err();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn reopening_keeps_rows_and_reports_ready() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("catalog.db");
    let id = {
        let store = SqliteCatalogStore::new(SqliteStoreConfig::new(&path)).unwrap();
        create(&store, University::new("永続大学")).id.unwrap()
    };
    let store = SqliteCatalogStore::new(SqliteStoreConfig::new(&path)).unwrap();
    store.readiness().unwrap();
    assert_eq!(reload(&store, id).unwrap().name, "永続大学");
}

#[test]
fn loading_a_subject_through_the_wrong_test_type_is_none() {
    let (_dir, store) = open_store();
    let created = create(&store, nested_university("境界大学", &[1.0]));
    let subject_id = first_test_type(&created).subjects[0].id.unwrap();
    let ctx = OpContext::background();
    assert!(store.load_subject(TestTypeId::new(9_999), subject_id, &ctx).unwrap().is_none());
    assert!(store.load_subject(TestTypeId::new(9_999), SubjectId::new(1), &ctx).unwrap().is_none());
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn stored_percentages_stay_coherent(scores in prop::collection::vec(0u32 .. 1_000, 1 .. 8)) {
        let (_dir, store) = open_store();
        let scores: Vec<f64> = scores.into_iter().map(f64::from).collect();
        let created = create(&store, nested_university("性質大学", &scores));
        let stored = reload(&store, created.id.unwrap()).unwrap();
        prop_assert!(percentages_coherent(&first_test_type(&stored).subjects));
    }
}
