// crates/exam-catalog-store-sqlite/src/writer.rs
// ============================================================================
// Module: SQLite Catalog Writer
// Description: Applies write commands inside an open SQLite transaction.
// Purpose: Insert, reconcile, and delete aggregate rows with CAS updates.
// Dependencies: rusqlite, exam-catalog-core
// ============================================================================

//! ## Overview
//! Each [`WriteCommand`] is applied against the caller's transaction:
//! - creates insert the full supplied sub-tree with version 1,
//! - updates compare-and-swap on the stored version and bump it by one,
//! - university updates with `replace_children` reconcile every level by
//!   primary key (update owned ids, insert id-less rows, delete the rest),
//! - soft deletes stamp `deleted_at` on the node and its whole sub-tree.
//!
//! Every test type whose subjects were touched has its percentages
//! recomputed before the persisted record is reloaded, so committed rows
//! always satisfy percentage coherence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use exam_catalog_core::AdmissionInfo;
use exam_catalog_core::AdmissionSchedule;
use exam_catalog_core::DeleteMode;
use exam_catalog_core::Department;
use exam_catalog_core::ErrorCode;
use exam_catalog_core::FilterOption;
use exam_catalog_core::InvalidationScope;
use exam_catalog_core::MAX_DEPARTMENTS;
use exam_catalog_core::MAX_MAJORS;
use exam_catalog_core::MAX_SUBJECTS;
use exam_catalog_core::Major;
use exam_catalog_core::OpContext;
use exam_catalog_core::ResourceKind;
use exam_catalog_core::StoreError;
use exam_catalog_core::Subject;
use exam_catalog_core::TestType;
use exam_catalog_core::University;
use exam_catalog_core::UniversityId;
use exam_catalog_core::ValidationError;
use exam_catalog_core::WriteCommand;
use exam_catalog_core::WriteOutcome;
use exam_catalog_core::WriteRecord;
use exam_catalog_core::recompute_percentages;
use rusqlite::Connection;
use rusqlite::ToSql;
use rusqlite::params;

use crate::loader;
use crate::loader::IN_CHUNK;
use crate::loader::placeholders;
use crate::loader::to_millis;
use crate::schema::Level;
use crate::store::SqliteStoreError;
use crate::store::SqliteTx;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Subjects upserted per batch chunk.
const SUBJECT_CHUNK: usize = 1_000;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Entity reloaded after a write to build the returned record.
enum Target {
    /// University by id.
    University(u64),
    /// Department scoped to its university.
    Department {
        /// Owning university.
        university: u64,
        /// Department id.
        id: u64,
    },
    /// Major scoped to its department.
    Major {
        /// Owning department.
        department: u64,
        /// Major id.
        id: u64,
    },
    /// Schedule scoped to its major.
    Schedule {
        /// Owning major.
        major: u64,
        /// Schedule id.
        id: u64,
    },
    /// Admission info scoped to its schedule.
    Info {
        /// Owning schedule.
        schedule: u64,
        /// Info id.
        id: u64,
    },
    /// Test type scoped to its schedule.
    TestType {
        /// Owning schedule.
        schedule: u64,
        /// Test type id.
        id: u64,
    },
    /// Subject scoped to its test type.
    Subject {
        /// Owning test type.
        test_type: u64,
        /// Subject id.
        id: u64,
    },
    /// Every live subject of a test type.
    Subjects(u64),
    /// Filter option by id.
    FilterOption(u64),
    /// Nothing to reload.
    Deleted,
}

/// Applies `command` inside the transaction behind `tx`.
pub(crate) fn apply(
    tx: &SqliteTx<'_>,
    command: &WriteCommand,
) -> Result<WriteOutcome, SqliteStoreError> {
    let mut writer = Writer {
        conn: tx.connection(),
        ctx: tx.context(),
        now: tx.now_ms(),
        touched: BTreeSet::new(),
    };
    let (target, scope) = writer.execute(command)?;
    writer.recompute_touched()?;
    let record = writer.reload(target)?;
    Ok(WriteOutcome {
        record,
        scope,
    })
}

/// Returns the invalidation scope of one university.
const fn university_scope(id: u64) -> InvalidationScope {
    InvalidationScope::University(UniversityId::new(id))
}

/// Builds a not-found error for a row.
fn not_found(level: Level, id: u64) -> SqliteStoreError {
    StoreError::NotFound {
        resource: level.resource(),
        id,
    }
    .into()
}

/// Builds a parent-not-found error for a row.
fn parent_not_found(resource: ResourceKind, id: u64) -> SqliteStoreError {
    StoreError::ParentNotFound {
        resource,
        id,
    }
    .into()
}

/// Maps unique index violations to duplicate-name errors.
fn constraint_error(err: rusqlite::Error, resource: ResourceKind, name: &str) -> SqliteStoreError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err
        && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    {
        return StoreError::DuplicateName {
            resource,
            name: name.to_string(),
        }
        .into();
    }
    err.into()
}

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Per-command write state.
struct Writer<'t> {
    /// Connection running the transaction.
    conn: &'t Connection,
    /// Caller context checked at statement boundaries.
    ctx: &'t OpContext,
    /// Transaction timestamp in epoch milliseconds.
    now: i64,
    /// Test types whose percentages must be recomputed.
    touched: BTreeSet<u64>,
}

impl Writer<'_> {
    /// Dispatches one command and returns the reload target and cache scope.
    fn execute(
        &mut self,
        command: &WriteCommand,
    ) -> Result<(Target, InvalidationScope), SqliteStoreError> {
        match command {
            WriteCommand::CreateUniversity(university) => {
                let id = self.insert_university(university)?;
                Ok((Target::University(id), university_scope(id)))
            }
            WriteCommand::UpdateUniversity {
                id,
                university,
                replace_children,
            } => {
                let id = id.get();
                self.update_university(id, university)?;
                if *replace_children {
                    self.reconcile_departments(id, &university.departments)?;
                }
                Ok((Target::University(id), university_scope(id)))
            }
            WriteCommand::DeleteUniversity {
                id,
                mode,
            } => {
                let id = id.get();
                self.delete(Level::University, id, None, *mode)?;
                Ok((Target::Deleted, university_scope(id)))
            }
            WriteCommand::CreateDepartment {
                university_id,
                department,
            } => {
                let owner = self.owner(Level::University, university_id.get())?;
                let id = self.insert_department(owner, department)?;
                self.enforce_cap(Level::Department, owner, MAX_DEPARTMENTS, "departments")?;
                Ok((
                    Target::Department {
                        university: owner,
                        id,
                    },
                    university_scope(owner),
                ))
            }
            WriteCommand::UpdateDepartment {
                university_id,
                department_id,
                department,
            } => {
                let owner = self.owner(Level::University, university_id.get())?;
                let id = department_id.get();
                self.update_department(owner, id, department, Some(department.meta.version))?;
                Ok((
                    Target::Department {
                        university: owner,
                        id,
                    },
                    university_scope(owner),
                ))
            }
            WriteCommand::DeleteDepartment {
                university_id,
                department_id,
                mode,
            } => {
                let owner = self.owner(Level::University, university_id.get())?;
                self.delete(Level::Department, department_id.get(), Some(owner), *mode)?;
                Ok((Target::Deleted, university_scope(owner)))
            }
            WriteCommand::CreateMajor {
                department_id,
                major,
            } => {
                let department = department_id.get();
                let owner = self.owner(Level::Department, department)?;
                let id = self.insert_major(department, major)?;
                self.enforce_cap(Level::Major, department, MAX_MAJORS, "majors")?;
                Ok((
                    Target::Major {
                        department,
                        id,
                    },
                    university_scope(owner),
                ))
            }
            WriteCommand::UpdateMajor {
                department_id,
                major_id,
                major,
            } => {
                let department = department_id.get();
                let owner = self.owner(Level::Department, department)?;
                let id = major_id.get();
                self.update_major(department, id, major, Some(major.meta.version))?;
                Ok((
                    Target::Major {
                        department,
                        id,
                    },
                    university_scope(owner),
                ))
            }
            WriteCommand::DeleteMajor {
                department_id,
                major_id,
                mode,
            } => {
                let department = department_id.get();
                let owner = self.owner(Level::Department, department)?;
                self.delete(Level::Major, major_id.get(), Some(department), *mode)?;
                Ok((Target::Deleted, university_scope(owner)))
            }
            WriteCommand::CreateAdmissionSchedule {
                major_id,
                schedule,
            } => {
                let major = major_id.get();
                let owner = self.owner(Level::Major, major)?;
                let id = self.insert_schedule(major, schedule)?;
                Ok((
                    Target::Schedule {
                        major,
                        id,
                    },
                    university_scope(owner),
                ))
            }
            WriteCommand::UpdateAdmissionSchedule {
                major_id,
                schedule_id,
                schedule,
            } => {
                let major = major_id.get();
                let owner = self.owner(Level::Major, major)?;
                let id = schedule_id.get();
                self.update_schedule(major, id, schedule, Some(schedule.meta.version))?;
                Ok((
                    Target::Schedule {
                        major,
                        id,
                    },
                    university_scope(owner),
                ))
            }
            WriteCommand::DeleteAdmissionSchedule {
                major_id,
                schedule_id,
                mode,
            } => {
                let major = major_id.get();
                let owner = self.owner(Level::Major, major)?;
                self.delete(Level::AdmissionSchedule, schedule_id.get(), Some(major), *mode)?;
                Ok((Target::Deleted, university_scope(owner)))
            }
            WriteCommand::CreateAdmissionInfo {
                schedule_id,
                info,
            } => {
                let schedule = schedule_id.get();
                let owner = self.owner(Level::AdmissionSchedule, schedule)?;
                let id = self.insert_info(schedule, info)?;
                Ok((
                    Target::Info {
                        schedule,
                        id,
                    },
                    university_scope(owner),
                ))
            }
            WriteCommand::UpdateAdmissionInfo {
                schedule_id,
                info_id,
                info,
            } => {
                let schedule = schedule_id.get();
                let owner = self.owner(Level::AdmissionSchedule, schedule)?;
                let id = info_id.get();
                self.update_info(schedule, id, info, Some(info.meta.version))?;
                Ok((
                    Target::Info {
                        schedule,
                        id,
                    },
                    university_scope(owner),
                ))
            }
            WriteCommand::DeleteAdmissionInfo {
                schedule_id,
                info_id,
                mode,
            } => {
                let schedule = schedule_id.get();
                let owner = self.owner(Level::AdmissionSchedule, schedule)?;
                self.delete(Level::AdmissionInfo, info_id.get(), Some(schedule), *mode)?;
                Ok((Target::Deleted, university_scope(owner)))
            }
            WriteCommand::CreateTestType {
                schedule_id,
                test_type,
            } => {
                let schedule = schedule_id.get();
                let owner = self.owner(Level::AdmissionSchedule, schedule)?;
                let id = self.insert_test_type(schedule, test_type)?;
                Ok((
                    Target::TestType {
                        schedule,
                        id,
                    },
                    university_scope(owner),
                ))
            }
            WriteCommand::UpdateTestType {
                schedule_id,
                test_type_id,
                test_type,
            } => {
                let schedule = schedule_id.get();
                let owner = self.owner(Level::AdmissionSchedule, schedule)?;
                let id = test_type_id.get();
                self.update_test_type(schedule, id, test_type, Some(test_type.meta.version))?;
                Ok((
                    Target::TestType {
                        schedule,
                        id,
                    },
                    university_scope(owner),
                ))
            }
            WriteCommand::DeleteTestType {
                schedule_id,
                test_type_id,
                mode,
            } => {
                let schedule = schedule_id.get();
                let owner = self.owner(Level::AdmissionSchedule, schedule)?;
                self.delete(Level::TestType, test_type_id.get(), Some(schedule), *mode)?;
                Ok((Target::Deleted, university_scope(owner)))
            }
            WriteCommand::CreateSubject {
                test_type_id,
                subject,
            } => {
                let test_type = test_type_id.get();
                let owner = self.owner(Level::TestType, test_type)?;
                let id = self.insert_subject(test_type, subject)?;
                self.enforce_cap(Level::Subject, test_type, MAX_SUBJECTS, "subjects")?;
                Ok((
                    Target::Subject {
                        test_type,
                        id,
                    },
                    university_scope(owner),
                ))
            }
            WriteCommand::UpdateSubject {
                test_type_id,
                subject_id,
                subject,
            } => {
                let test_type = test_type_id.get();
                let owner = self.owner(Level::TestType, test_type)?;
                let id = subject_id.get();
                self.update_subject(test_type, id, subject, Some(subject.meta.version))?;
                Ok((
                    Target::Subject {
                        test_type,
                        id,
                    },
                    university_scope(owner),
                ))
            }
            WriteCommand::DeleteSubject {
                test_type_id,
                subject_id,
                mode,
            } => {
                let test_type = test_type_id.get();
                let owner = self.owner(Level::TestType, test_type)?;
                self.delete(Level::Subject, subject_id.get(), Some(test_type), *mode)?;
                self.touched.insert(test_type);
                Ok((Target::Deleted, university_scope(owner)))
            }
            WriteCommand::UpdateSubjectsBatch {
                test_type_id,
                subjects,
            } => {
                let test_type = test_type_id.get();
                if !loader::is_live(self.conn, Level::TestType, test_type, None)? {
                    return Err(not_found(Level::TestType, test_type));
                }
                self.upsert_subjects(test_type, subjects)?;
                self.enforce_cap(Level::Subject, test_type, MAX_SUBJECTS, "subjects")?;
                Ok((Target::Subjects(test_type), InvalidationScope::All))
            }
            WriteCommand::CreateFilterOption(option) => {
                let id = self.insert_filter_option(option)?;
                Ok((Target::FilterOption(id), InvalidationScope::FilterOptions))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Statement helpers
    // ------------------------------------------------------------------------

    /// Executes an INSERT and returns the new row id.
    fn insert(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        resource: ResourceKind,
        name: &str,
    ) -> Result<u64, SqliteStoreError> {
        self.ctx.checkpoint()?;
        self.conn
            .prepare_cached(sql)?
            .execute(params)
            .map_err(|err| constraint_error(err, resource, name))?;
        u64::try_from(self.conn.last_insert_rowid())
            .map_err(|_| SqliteStoreError::Corrupt("negative row id".to_string()))
    }

    /// Executes an UPDATE and returns the number of changed rows.
    fn update(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        resource: ResourceKind,
        name: &str,
    ) -> Result<usize, SqliteStoreError> {
        self.ctx.checkpoint()?;
        self.conn
            .prepare_cached(sql)?
            .execute(params)
            .map_err(|err| constraint_error(err, resource, name))
    }

    /// Turns a zero-row update into `Conflict` or `NotFound`.
    fn settle(
        &self,
        changed: usize,
        level: Level,
        id: u64,
        parent: Option<u64>,
        expected: Option<i64>,
    ) -> Result<(), SqliteStoreError> {
        if changed > 0 {
            return Ok(());
        }
        match expected {
            Some(expected) if loader::is_live(self.conn, level, id, parent)? => {
                Err(StoreError::Conflict {
                    resource: level.resource(),
                    id,
                    expected,
                }
                .into())
            }
            _ => Err(not_found(level, id)),
        }
    }

    /// Resolves the owning university of a live parent row.
    fn owner(&self, level: Level, id: u64) -> Result<u64, SqliteStoreError> {
        self.ctx.checkpoint()?;
        loader::owning_university(self.conn, level, id)?
            .ok_or_else(|| parent_not_found(level.resource(), id))
    }

    /// Rejects a parent whose live children exceed `max`.
    fn enforce_cap(
        &self,
        level: Level,
        parent: u64,
        max: usize,
        field: &str,
    ) -> Result<(), SqliteStoreError> {
        let count = loader::live_child_ids(self.conn, level, &[parent])?.len();
        if count > max {
            return Err(StoreError::Validation(ValidationError::single(
                field,
                ErrorCode::TooManyItems,
                format!("at most {max} items are allowed"),
            ))
            .into());
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Inserts
    // ------------------------------------------------------------------------

    /// Inserts a university and its sub-tree.
    fn insert_university(&mut self, university: &University) -> Result<u64, SqliteStoreError> {
        let id = self.insert(
            "INSERT INTO universities (name, created_at, updated_at, version) VALUES (?1, ?2, ?2, \
             1)",
            params![university.name, self.now],
            ResourceKind::University,
            &university.name,
        )?;
        for department in &university.departments {
            self.insert_department(id, department)?;
        }
        Ok(id)
    }

    /// Inserts a department and its sub-tree.
    fn insert_department(
        &mut self,
        university: u64,
        department: &Department,
    ) -> Result<u64, SqliteStoreError> {
        let id = self.insert(
            "INSERT INTO departments (university_id, name, created_at, updated_at, version) \
             VALUES (?1, ?2, ?3, ?3, 1)",
            params![university, department.name, self.now],
            ResourceKind::Department,
            &department.name,
        )?;
        for major in &department.majors {
            self.insert_major(id, major)?;
        }
        Ok(id)
    }

    /// Inserts a major and its sub-tree.
    fn insert_major(&mut self, department: u64, major: &Major) -> Result<u64, SqliteStoreError> {
        let id = self.insert(
            "INSERT INTO majors (department_id, name, created_at, updated_at, version) VALUES \
             (?1, ?2, ?3, ?3, 1)",
            params![department, major.name, self.now],
            ResourceKind::Major,
            &major.name,
        )?;
        for schedule in &major.admission_schedules {
            self.insert_schedule(id, schedule)?;
        }
        Ok(id)
    }

    /// Inserts a schedule with its infos and test types.
    fn insert_schedule(
        &mut self,
        major: u64,
        schedule: &AdmissionSchedule,
    ) -> Result<u64, SqliteStoreError> {
        let id = self.insert(
            "INSERT INTO admission_schedules (major_id, name, display_order, created_at, \
             updated_at, version) VALUES (?1, ?2, ?3, ?4, ?4, 1)",
            params![major, schedule.name, schedule.display_order, self.now],
            ResourceKind::AdmissionSchedule,
            &schedule.name,
        )?;
        for info in &schedule.admission_infos {
            self.insert_info(id, info)?;
        }
        for test_type in &schedule.test_types {
            self.insert_test_type(id, test_type)?;
        }
        Ok(id)
    }

    /// Inserts an admission info row.
    fn insert_info(&self, schedule: u64, info: &AdmissionInfo) -> Result<u64, SqliteStoreError> {
        self.insert(
            "INSERT INTO admission_infos (admission_schedule_id, enrollment, academic_year, \
             valid_from, valid_until, status, created_at, updated_at, version) VALUES (?1, ?2, \
             ?3, ?4, ?5, ?6, ?7, ?7, 1)",
            params![
                schedule,
                info.enrollment,
                info.academic_year,
                to_millis(info.valid_from),
                to_millis(info.valid_until),
                info.status.as_str(),
                self.now
            ],
            ResourceKind::AdmissionInfo,
            "",
        )
    }

    /// Inserts a test type with its subjects.
    fn insert_test_type(
        &mut self,
        schedule: u64,
        test_type: &TestType,
    ) -> Result<u64, SqliteStoreError> {
        let id = self.insert(
            "INSERT INTO test_types (admission_schedule_id, name, created_at, updated_at, \
             version) VALUES (?1, ?2, ?3, ?3, 1)",
            params![schedule, test_type.name, self.now],
            ResourceKind::TestType,
            &test_type.name,
        )?;
        for subject in &test_type.subjects {
            self.insert_subject(id, subject)?;
        }
        Ok(id)
    }

    /// Inserts a subject and marks its test type for recomputation.
    fn insert_subject(&mut self, test_type: u64, subject: &Subject) -> Result<u64, SqliteStoreError> {
        let id = self.insert(
            "INSERT INTO subjects (test_type_id, name, score, percentage, display_order, \
             created_at, updated_at, version) VALUES (?1, ?2, ?3, 0, ?4, ?5, ?5, 1)",
            params![test_type, subject.name, subject.score, subject.display_order, self.now],
            ResourceKind::Subject,
            &subject.name,
        )?;
        self.touched.insert(test_type);
        Ok(id)
    }

    /// Inserts a filter option after checking its parent exists.
    fn insert_filter_option(&self, option: &FilterOption) -> Result<u64, SqliteStoreError> {
        let parent = option.parent_id.map(u64::from);
        if let Some(parent) = parent
            && loader::filter_option(self.conn, parent)?.is_none()
        {
            return Err(parent_not_found(ResourceKind::FilterOption, parent));
        }
        self.insert(
            "INSERT INTO filter_options (category, name, parent_id, display_order, created_at, \
             updated_at, version) VALUES (?1, ?2, ?3, ?4, ?5, ?5, 1)",
            params![option.category.as_str(), option.name, parent, option.display_order, self.now],
            ResourceKind::FilterOption,
            &option.name,
        )
    }

    // ------------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------------

    /// Compare-and-swap update of a university's own fields.
    fn update_university(&self, id: u64, university: &University) -> Result<(), SqliteStoreError> {
        let expected = university.meta.version;
        let changed = self.update(
            "UPDATE universities SET name = ?1, updated_at = ?2, version = version + 1 WHERE id = \
             ?3 AND version = ?4 AND deleted_at IS NULL",
            params![university.name, self.now, id, expected],
            ResourceKind::University,
            &university.name,
        )?;
        self.settle(changed, Level::University, id, None, Some(expected))
    }

    /// Updates a department's own fields, checking the version when given.
    fn update_department(
        &self,
        university: u64,
        id: u64,
        department: &Department,
        expected: Option<i64>,
    ) -> Result<(), SqliteStoreError> {
        let changed = self.update(
            "UPDATE departments SET name = ?1, updated_at = ?2, version = version + 1 WHERE id = \
             ?3 AND university_id = ?4 AND deleted_at IS NULL AND (?5 IS NULL OR version = ?5)",
            params![department.name, self.now, id, university, expected],
            ResourceKind::Department,
            &department.name,
        )?;
        self.settle(changed, Level::Department, id, Some(university), expected)
    }

    /// Updates a major's own fields, checking the version when given.
    fn update_major(
        &self,
        department: u64,
        id: u64,
        major: &Major,
        expected: Option<i64>,
    ) -> Result<(), SqliteStoreError> {
        let changed = self.update(
            "UPDATE majors SET name = ?1, updated_at = ?2, version = version + 1 WHERE id = ?3 \
             AND department_id = ?4 AND deleted_at IS NULL AND (?5 IS NULL OR version = ?5)",
            params![major.name, self.now, id, department, expected],
            ResourceKind::Major,
            &major.name,
        )?;
        self.settle(changed, Level::Major, id, Some(department), expected)
    }

    /// Updates a schedule's own fields, checking the version when given.
    fn update_schedule(
        &self,
        major: u64,
        id: u64,
        schedule: &AdmissionSchedule,
        expected: Option<i64>,
    ) -> Result<(), SqliteStoreError> {
        let changed = self.update(
            "UPDATE admission_schedules SET name = ?1, display_order = ?2, updated_at = ?3, \
             version = version + 1 WHERE id = ?4 AND major_id = ?5 AND deleted_at IS NULL AND (?6 \
             IS NULL OR version = ?6)",
            params![schedule.name, schedule.display_order, self.now, id, major, expected],
            ResourceKind::AdmissionSchedule,
            &schedule.name,
        )?;
        self.settle(changed, Level::AdmissionSchedule, id, Some(major), expected)
    }

    /// Updates an admission info row, checking the version when given.
    fn update_info(
        &self,
        schedule: u64,
        id: u64,
        info: &AdmissionInfo,
        expected: Option<i64>,
    ) -> Result<(), SqliteStoreError> {
        let changed = self.update(
            "UPDATE admission_infos SET enrollment = ?1, academic_year = ?2, valid_from = ?3, \
             valid_until = ?4, status = ?5, updated_at = ?6, version = version + 1 WHERE id = ?7 \
             AND admission_schedule_id = ?8 AND deleted_at IS NULL AND (?9 IS NULL OR version = \
             ?9)",
            params![
                info.enrollment,
                info.academic_year,
                to_millis(info.valid_from),
                to_millis(info.valid_until),
                info.status.as_str(),
                self.now,
                id,
                schedule,
                expected
            ],
            ResourceKind::AdmissionInfo,
            "",
        )?;
        self.settle(changed, Level::AdmissionInfo, id, Some(schedule), expected)
    }

    /// Updates a test type's own fields, checking the version when given.
    fn update_test_type(
        &self,
        schedule: u64,
        id: u64,
        test_type: &TestType,
        expected: Option<i64>,
    ) -> Result<(), SqliteStoreError> {
        let changed = self.update(
            "UPDATE test_types SET name = ?1, updated_at = ?2, version = version + 1 WHERE id = \
             ?3 AND admission_schedule_id = ?4 AND deleted_at IS NULL AND (?5 IS NULL OR version \
             = ?5)",
            params![test_type.name, self.now, id, schedule, expected],
            ResourceKind::TestType,
            &test_type.name,
        )?;
        self.settle(changed, Level::TestType, id, Some(schedule), expected)
    }

    /// Updates a subject, checking the version when given.
    fn update_subject(
        &mut self,
        test_type: u64,
        id: u64,
        subject: &Subject,
        expected: Option<i64>,
    ) -> Result<(), SqliteStoreError> {
        let changed = self.update(
            "UPDATE subjects SET name = ?1, score = ?2, display_order = ?3, updated_at = ?4, \
             version = version + 1 WHERE id = ?5 AND test_type_id = ?6 AND deleted_at IS NULL AND \
             (?7 IS NULL OR version = ?7)",
            params![
                subject.name,
                subject.score,
                subject.display_order,
                self.now,
                id,
                test_type,
                expected
            ],
            ResourceKind::Subject,
            &subject.name,
        )?;
        self.settle(changed, Level::Subject, id, Some(test_type), expected)?;
        self.touched.insert(test_type);
        Ok(())
    }

    /// Upserts a subject batch in bounded chunks.
    fn upsert_subjects(
        &mut self,
        test_type: u64,
        subjects: &[Subject],
    ) -> Result<(), SqliteStoreError> {
        let named: Vec<u64> =
            subjects.iter().filter_map(|subject| subject.id.map(u64::from)).collect();
        self.park_names(Level::Subject, test_type, &named)?;
        for chunk in subjects.chunks(SUBJECT_CHUNK) {
            self.ctx.checkpoint()?;
            for subject in chunk {
                match subject.id {
                    Some(id) => self.update_subject(test_type, id.get(), subject, None)?,
                    None => {
                        self.insert_subject(test_type, subject)?;
                    }
                }
            }
        }
        self.touched.insert(test_type);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------------

    /// Deletes live children absent from `incoming`; rejects foreign ids.
    fn prune_children(
        &self,
        level: Level,
        parent: u64,
        incoming: &[Option<u64>],
    ) -> Result<(), SqliteStoreError> {
        self.ctx.checkpoint()?;
        let existing: BTreeSet<u64> =
            loader::live_child_ids(self.conn, level, &[parent])?.into_iter().collect();
        let keep: BTreeSet<u64> = incoming.iter().flatten().copied().collect();
        if let Some(foreign) = keep.difference(&existing).next() {
            return Err(not_found(level, *foreign));
        }
        let sql = format!("DELETE FROM {} WHERE id = ?1", level.table());
        for id in existing.difference(&keep) {
            self.conn.prepare_cached(&sql)?.execute(params![id])?;
        }
        let kept: Vec<u64> = keep.into_iter().collect();
        self.park_names(level, parent, &kept)
    }

    /// Moves kept sibling names to per-row placeholders until their final
    /// names are applied. Placeholders start with U+0001, which sanitized
    /// names never contain.
    fn park_names(&self, level: Level, parent: u64, ids: &[u64]) -> Result<(), SqliteStoreError> {
        let Some(parent_column) = level.parent_column() else {
            return Ok(());
        };
        if !level.unique_name() || ids.is_empty() {
            return Ok(());
        }
        self.ctx.checkpoint()?;
        let sql = format!(
            "UPDATE {} SET name = char(1) || id WHERE id = ?1 AND {parent_column} = ?2 AND \
             deleted_at IS NULL",
            level.table()
        );
        let mut statement = self.conn.prepare_cached(&sql)?;
        for id in ids {
            statement.execute(params![id, parent])?;
        }
        Ok(())
    }

    /// Reconciles the departments of a university.
    fn reconcile_departments(
        &mut self,
        university: u64,
        departments: &[Department],
    ) -> Result<(), SqliteStoreError> {
        let ids: Vec<Option<u64>> =
            departments.iter().map(|department| department.id.map(u64::from)).collect();
        self.prune_children(Level::Department, university, &ids)?;
        for department in departments {
            match department.id {
                Some(id) => {
                    self.update_department(university, id.get(), department, None)?;
                    self.reconcile_majors(id.get(), &department.majors)?;
                }
                None => {
                    self.insert_department(university, department)?;
                }
            }
        }
        Ok(())
    }

    /// Reconciles the majors of a department.
    fn reconcile_majors(&mut self, department: u64, majors: &[Major]) -> Result<(), SqliteStoreError> {
        let ids: Vec<Option<u64>> = majors.iter().map(|major| major.id.map(u64::from)).collect();
        self.prune_children(Level::Major, department, &ids)?;
        for major in majors {
            match major.id {
                Some(id) => {
                    self.update_major(department, id.get(), major, None)?;
                    self.reconcile_schedules(id.get(), &major.admission_schedules)?;
                }
                None => {
                    self.insert_major(department, major)?;
                }
            }
        }
        Ok(())
    }

    /// Reconciles the schedules of a major.
    fn reconcile_schedules(
        &mut self,
        major: u64,
        schedules: &[AdmissionSchedule],
    ) -> Result<(), SqliteStoreError> {
        let ids: Vec<Option<u64>> =
            schedules.iter().map(|schedule| schedule.id.map(u64::from)).collect();
        self.prune_children(Level::AdmissionSchedule, major, &ids)?;
        for schedule in schedules {
            match schedule.id {
                Some(id) => {
                    self.update_schedule(major, id.get(), schedule, None)?;
                    self.reconcile_infos(id.get(), &schedule.admission_infos)?;
                    self.reconcile_test_types(id.get(), &schedule.test_types)?;
                }
                None => {
                    self.insert_schedule(major, schedule)?;
                }
            }
        }
        Ok(())
    }

    /// Reconciles the admission infos of a schedule.
    fn reconcile_infos(
        &self,
        schedule: u64,
        infos: &[AdmissionInfo],
    ) -> Result<(), SqliteStoreError> {
        let ids: Vec<Option<u64>> = infos.iter().map(|info| info.id.map(u64::from)).collect();
        self.prune_children(Level::AdmissionInfo, schedule, &ids)?;
        for info in infos {
            match info.id {
                Some(id) => self.update_info(schedule, id.get(), info, None)?,
                None => {
                    self.insert_info(schedule, info)?;
                }
            }
        }
        Ok(())
    }

    /// Reconciles the test types of a schedule.
    fn reconcile_test_types(
        &mut self,
        schedule: u64,
        test_types: &[TestType],
    ) -> Result<(), SqliteStoreError> {
        let ids: Vec<Option<u64>> =
            test_types.iter().map(|test_type| test_type.id.map(u64::from)).collect();
        self.prune_children(Level::TestType, schedule, &ids)?;
        for test_type in test_types {
            match test_type.id {
                Some(id) => {
                    self.update_test_type(schedule, id.get(), test_type, None)?;
                    self.reconcile_subjects(id.get(), &test_type.subjects)?;
                }
                None => {
                    self.insert_test_type(schedule, test_type)?;
                }
            }
        }
        Ok(())
    }

    /// Reconciles the subjects of a test type.
    fn reconcile_subjects(
        &mut self,
        test_type: u64,
        subjects: &[Subject],
    ) -> Result<(), SqliteStoreError> {
        let ids: Vec<Option<u64>> =
            subjects.iter().map(|subject| subject.id.map(u64::from)).collect();
        self.prune_children(Level::Subject, test_type, &ids)?;
        self.touched.insert(test_type);
        for subject in subjects {
            match subject.id {
                Some(id) => self.update_subject(test_type, id.get(), subject, None)?,
                None => {
                    self.insert_subject(test_type, subject)?;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Deletes
    // ------------------------------------------------------------------------

    /// Deletes a live row (scoped to `parent` when given).
    fn delete(
        &self,
        level: Level,
        id: u64,
        parent: Option<u64>,
        mode: DeleteMode,
    ) -> Result<(), SqliteStoreError> {
        self.ctx.checkpoint()?;
        if !loader::is_live(self.conn, level, id, parent)? {
            return Err(not_found(level, id));
        }
        match mode {
            DeleteMode::Hard => {
                let sql = format!("DELETE FROM {} WHERE id = ?1", level.table());
                self.conn.prepare_cached(&sql)?.execute(params![id])?;
            }
            DeleteMode::Soft => self.soft_delete(level, &[id])?,
        }
        Ok(())
    }

    /// Stamps `deleted_at` on the rows and their live sub-trees.
    fn soft_delete(&self, level: Level, ids: &[u64]) -> Result<(), SqliteStoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.ctx.checkpoint()?;
        for chunk in ids.chunks(IN_CHUNK) {
            let sql = format!(
                "UPDATE {} SET deleted_at = ?1, updated_at = ?1 WHERE deleted_at IS NULL AND id \
                 IN ({})",
                level.table(),
                placeholders(2, chunk.len())
            );
            let mut values: Vec<&dyn ToSql> = Vec::with_capacity(chunk.len() + 1);
            values.push(&self.now);
            values.extend(chunk.iter().map(|id| id as &dyn ToSql));
            self.conn.prepare_cached(&sql)?.execute(values.as_slice())?;
        }
        for child in level.children() {
            let child_ids = loader::live_child_ids(self.conn, *child, ids)?;
            self.soft_delete(*child, &child_ids)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Derived state
    // ------------------------------------------------------------------------

    /// Recomputes percentages for every touched test type.
    fn recompute_touched(&mut self) -> Result<(), SqliteStoreError> {
        let touched = std::mem::take(&mut self.touched);
        for test_type in touched {
            let mut subjects = loader::subjects_of(self.conn, self.ctx, test_type)?;
            recompute_percentages(&mut subjects);
            let mut statement =
                self.conn.prepare_cached("UPDATE subjects SET percentage = ?1 WHERE id = ?2")?;
            for subject in &subjects {
                if let Some(id) = subject.id {
                    statement.execute(params![subject.percentage, id.get()])?;
                }
            }
        }
        Ok(())
    }

    /// Reloads the written entity inside the transaction.
    fn reload(&self, target: Target) -> Result<WriteRecord, SqliteStoreError> {
        let (conn, ctx) = (self.conn, self.ctx);
        let record = match target {
            Target::University(id) => loader::university(conn, ctx, id)?.map(WriteRecord::University),
            Target::Department {
                university,
                id,
            } => loader::department(conn, ctx, university, id)?.map(WriteRecord::Department),
            Target::Major {
                department,
                id,
            } => loader::major(conn, ctx, department, id)?.map(WriteRecord::Major),
            Target::Schedule {
                major,
                id,
            } => loader::admission_schedule(conn, ctx, major, id)?
                .map(WriteRecord::AdmissionSchedule),
            Target::Info {
                schedule,
                id,
            } => loader::admission_info(conn, ctx, schedule, id)?.map(WriteRecord::AdmissionInfo),
            Target::TestType {
                schedule,
                id,
            } => loader::test_type(conn, ctx, schedule, id)?.map(WriteRecord::TestType),
            Target::Subject {
                test_type,
                id,
            } => loader::subject(conn, ctx, test_type, id)?.map(WriteRecord::Subject),
            Target::Subjects(test_type) => {
                Some(WriteRecord::Subjects(loader::subjects_of(conn, ctx, test_type)?))
            }
            Target::FilterOption(id) => {
                loader::filter_option(conn, id)?.map(WriteRecord::FilterOption)
            }
            Target::Deleted => Some(WriteRecord::Deleted),
        };
        record.ok_or_else(|| {
            SqliteStoreError::Corrupt("written row is not readable inside its transaction".to_string())
        })
    }
}
