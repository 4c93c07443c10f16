// crates/exam-catalog-store-postgres/src/writer.rs
// ============================================================================
// Module: PostgreSQL Catalog Writer
// Description: Applies write commands inside an open PostgreSQL transaction.
// Purpose: Insert, reconcile, and delete aggregate rows with CAS updates.
// Dependencies: postgres, exam-catalog-core
// ============================================================================

//! ## Overview
//! Command semantics match the `SQLite` backend: creates insert whole
//! sub-trees at version 1, updates compare-and-swap on `version`, university
//! replacement reconciles children by primary key, and soft deletes stamp the
//! whole sub-tree. Ids come back through `RETURNING id`; set-based statements
//! bind `BIGINT[]` arrays instead of expanded placeholder lists.

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
use postgres::Transaction;
use postgres::error::SqlState;
use postgres::types::ToSql;
use time::OffsetDateTime;

use crate::loader;
use crate::loader::to_key;
use crate::loader::to_keys;
use crate::schema::Level;
use crate::store::PostgresStoreError;
use crate::store::PostgresTx;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Subjects upserted between cancellation checks.
const SUBJECT_CHUNK: usize = 1_000;

/// Bound statement parameters.
type Params<'p> = [&'p (dyn ToSql + Sync)];

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

/// Applies `command` inside the transaction behind `handle`.
pub(crate) fn apply(
    handle: &mut PostgresTx<'_, '_>,
    command: &WriteCommand,
) -> Result<WriteOutcome, PostgresStoreError> {
    let (tx, ctx, now) = handle.parts();
    let mut writer = Writer {
        tx,
        ctx,
        now,
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
fn not_found(level: Level, id: u64) -> PostgresStoreError {
    StoreError::NotFound {
        resource: level.resource(),
        id,
    }
    .into()
}

/// Builds a parent-not-found error for a row.
fn parent_not_found(resource: ResourceKind, id: u64) -> PostgresStoreError {
    StoreError::ParentNotFound {
        resource,
        id,
    }
    .into()
}

/// Maps unique index violations to duplicate-name errors.
fn constraint_error(err: postgres::Error, resource: ResourceKind, name: &str) -> PostgresStoreError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
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
struct Writer<'w, 'c> {
    /// Open driver transaction.
    tx: &'w mut Transaction<'c>,
    /// Caller context checked at statement boundaries.
    ctx: &'w OpContext,
    /// Transaction timestamp.
    now: OffsetDateTime,
    /// Test types whose percentages must be recomputed.
    touched: BTreeSet<u64>,
}

impl Writer<'_, '_> {
    /// Dispatches one command and returns the reload target and cache scope.
    fn execute(
        &mut self,
        command: &WriteCommand,
    ) -> Result<(Target, InvalidationScope), PostgresStoreError> {
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
                if !loader::is_live(self.tx, Level::TestType, test_type, None)? {
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

    /// Executes an `INSERT … RETURNING id` and returns the new id.
    fn insert(
        &mut self,
        sql: &str,
        params: &Params<'_>,
        resource: ResourceKind,
        name: &str,
    ) -> Result<u64, PostgresStoreError> {
        self.ctx.checkpoint()?;
        let row =
            self.tx.query_one(sql, params).map_err(|err| constraint_error(err, resource, name))?;
        loader::id_at(&row, 0)
    }

    /// Executes an UPDATE and returns the number of changed rows.
    fn update(
        &mut self,
        sql: &str,
        params: &Params<'_>,
        resource: ResourceKind,
        name: &str,
    ) -> Result<u64, PostgresStoreError> {
        self.ctx.checkpoint()?;
        self.tx.execute(sql, params).map_err(|err| constraint_error(err, resource, name))
    }

    /// Turns a zero-row update into `Conflict` or `NotFound`.
    fn settle(
        &mut self,
        changed: u64,
        level: Level,
        id: u64,
        parent: Option<u64>,
        expected: Option<i64>,
    ) -> Result<(), PostgresStoreError> {
        if changed > 0 {
            return Ok(());
        }
        match expected {
            Some(expected) if loader::is_live(self.tx, level, id, parent)? => {
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
    fn owner(&mut self, level: Level, id: u64) -> Result<u64, PostgresStoreError> {
        self.ctx.checkpoint()?;
        loader::owning_university(self.tx, level, id)?
            .ok_or_else(|| parent_not_found(level.resource(), id))
    }

    /// Rejects a parent whose live children exceed `max`.
    fn enforce_cap(
        &mut self,
        level: Level,
        parent: u64,
        max: usize,
        field: &str,
    ) -> Result<(), PostgresStoreError> {
        let count = loader::live_child_ids(self.tx, level, &[parent])?.len();
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
    fn insert_university(&mut self, university: &University) -> Result<u64, PostgresStoreError> {
        let now = self.now;
        let id = self.insert(
            "INSERT INTO universities (name, created_at, updated_at, version) VALUES ($1, $2, $2, \
             1) RETURNING id",
            &[&university.name, &now],
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
    ) -> Result<u64, PostgresStoreError> {
        let now = self.now;
        let id = self.insert(
            "INSERT INTO departments (university_id, name, created_at, updated_at, version) \
             VALUES ($1, $2, $3, $3, 1) RETURNING id",
            &[&to_key(university)?, &department.name, &now],
            ResourceKind::Department,
            &department.name,
        )?;
        for major in &department.majors {
            self.insert_major(id, major)?;
        }
        Ok(id)
    }

    /// Inserts a major and its sub-tree.
    fn insert_major(&mut self, department: u64, major: &Major) -> Result<u64, PostgresStoreError> {
        let now = self.now;
        let id = self.insert(
            "INSERT INTO majors (department_id, name, created_at, updated_at, version) VALUES \
             ($1, $2, $3, $3, 1) RETURNING id",
            &[&to_key(department)?, &major.name, &now],
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
    ) -> Result<u64, PostgresStoreError> {
        let now = self.now;
        let id = self.insert(
            "INSERT INTO admission_schedules (major_id, name, display_order, created_at, \
             updated_at, version) VALUES ($1, $2, $3, $4, $4, 1) RETURNING id",
            &[&to_key(major)?, &schedule.name, &schedule.display_order, &now],
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
    fn insert_info(&mut self, schedule: u64, info: &AdmissionInfo) -> Result<u64, PostgresStoreError> {
        let now = self.now;
        self.insert(
            "INSERT INTO admission_infos (admission_schedule_id, enrollment, academic_year, \
             valid_from, valid_until, status, created_at, updated_at, version) VALUES ($1, $2, \
             $3, $4, $5, $6, $7, $7, 1) RETURNING id",
            &[
                &to_key(schedule)?,
                &info.enrollment,
                &info.academic_year,
                &info.valid_from,
                &info.valid_until,
                &info.status.as_str(),
                &now,
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
    ) -> Result<u64, PostgresStoreError> {
        let now = self.now;
        let id = self.insert(
            "INSERT INTO test_types (admission_schedule_id, name, created_at, updated_at, \
             version) VALUES ($1, $2, $3, $3, 1) RETURNING id",
            &[&to_key(schedule)?, &test_type.name, &now],
            ResourceKind::TestType,
            &test_type.name,
        )?;
        for subject in &test_type.subjects {
            self.insert_subject(id, subject)?;
        }
        Ok(id)
    }

    /// Inserts a subject and marks its test type for recomputation.
    fn insert_subject(
        &mut self,
        test_type: u64,
        subject: &Subject,
    ) -> Result<u64, PostgresStoreError> {
        let now = self.now;
        let id = self.insert(
            "INSERT INTO subjects (test_type_id, name, score, percentage, display_order, \
             created_at, updated_at, version) VALUES ($1, $2, $3, 0, $4, $5, $5, 1) RETURNING id",
            &[&to_key(test_type)?, &subject.name, &subject.score, &subject.display_order, &now],
            ResourceKind::Subject,
            &subject.name,
        )?;
        self.touched.insert(test_type);
        Ok(id)
    }

    /// Inserts a filter option after checking its parent exists.
    fn insert_filter_option(&mut self, option: &FilterOption) -> Result<u64, PostgresStoreError> {
        let parent = option.parent_id.map(u64::from);
        if let Some(parent) = parent
            && loader::filter_option(self.tx, parent)?.is_none()
        {
            return Err(parent_not_found(ResourceKind::FilterOption, parent));
        }
        let parent_key = parent.map(to_key).transpose()?;
        let now = self.now;
        self.insert(
            "INSERT INTO filter_options (category, name, parent_id, display_order, created_at, \
             updated_at, version) VALUES ($1, $2, $3, $4, $5, $5, 1) RETURNING id",
            &[&option.category.as_str(), &option.name, &parent_key, &option.display_order, &now],
            ResourceKind::FilterOption,
            &option.name,
        )
    }

    // ------------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------------

    /// Compare-and-swap update of a university's own fields.
    fn update_university(&mut self, id: u64, university: &University) -> Result<(), PostgresStoreError> {
        let expected = university.meta.version;
        let now = self.now;
        let changed = self.update(
            "UPDATE universities SET name = $1, updated_at = $2, version = version + 1 WHERE id = \
             $3 AND version = $4 AND deleted_at IS NULL",
            &[&university.name, &now, &to_key(id)?, &expected],
            ResourceKind::University,
            &university.name,
        )?;
        self.settle(changed, Level::University, id, None, Some(expected))
    }

    /// Updates a department's own fields, checking the version when given.
    fn update_department(
        &mut self,
        university: u64,
        id: u64,
        department: &Department,
        expected: Option<i64>,
    ) -> Result<(), PostgresStoreError> {
        let now = self.now;
        let changed = self.update(
            "UPDATE departments SET name = $1, updated_at = $2, version = version + 1 WHERE id = \
             $3 AND university_id = $4 AND deleted_at IS NULL AND ($5::BIGINT IS NULL OR version \
             = $5)",
            &[&department.name, &now, &to_key(id)?, &to_key(university)?, &expected],
            ResourceKind::Department,
            &department.name,
        )?;
        self.settle(changed, Level::Department, id, Some(university), expected)
    }

    /// Updates a major's own fields, checking the version when given.
    fn update_major(
        &mut self,
        department: u64,
        id: u64,
        major: &Major,
        expected: Option<i64>,
    ) -> Result<(), PostgresStoreError> {
        let now = self.now;
        let changed = self.update(
            "UPDATE majors SET name = $1, updated_at = $2, version = version + 1 WHERE id = $3 \
             AND department_id = $4 AND deleted_at IS NULL AND ($5::BIGINT IS NULL OR version = \
             $5)",
            &[&major.name, &now, &to_key(id)?, &to_key(department)?, &expected],
            ResourceKind::Major,
            &major.name,
        )?;
        self.settle(changed, Level::Major, id, Some(department), expected)
    }

    /// Updates a schedule's own fields, checking the version when given.
    fn update_schedule(
        &mut self,
        major: u64,
        id: u64,
        schedule: &AdmissionSchedule,
        expected: Option<i64>,
    ) -> Result<(), PostgresStoreError> {
        let now = self.now;
        let changed = self.update(
            "UPDATE admission_schedules SET name = $1, display_order = $2, updated_at = $3, \
             version = version + 1 WHERE id = $4 AND major_id = $5 AND deleted_at IS NULL AND \
             ($6::BIGINT IS NULL OR version = $6)",
            &[
                &schedule.name,
                &schedule.display_order,
                &now,
                &to_key(id)?,
                &to_key(major)?,
                &expected,
            ],
            ResourceKind::AdmissionSchedule,
            &schedule.name,
        )?;
        self.settle(changed, Level::AdmissionSchedule, id, Some(major), expected)
    }

    /// Updates an admission info row, checking the version when given.
    fn update_info(
        &mut self,
        schedule: u64,
        id: u64,
        info: &AdmissionInfo,
        expected: Option<i64>,
    ) -> Result<(), PostgresStoreError> {
        let now = self.now;
        let changed = self.update(
            "UPDATE admission_infos SET enrollment = $1, academic_year = $2, valid_from = $3, \
             valid_until = $4, status = $5, updated_at = $6, version = version + 1 WHERE id = $7 \
             AND admission_schedule_id = $8 AND deleted_at IS NULL AND ($9::BIGINT IS NULL OR \
             version = $9)",
            &[
                &info.enrollment,
                &info.academic_year,
                &info.valid_from,
                &info.valid_until,
                &info.status.as_str(),
                &now,
                &to_key(id)?,
                &to_key(schedule)?,
                &expected,
            ],
            ResourceKind::AdmissionInfo,
            "",
        )?;
        self.settle(changed, Level::AdmissionInfo, id, Some(schedule), expected)
    }

    /// Updates a test type's own fields, checking the version when given.
    fn update_test_type(
        &mut self,
        schedule: u64,
        id: u64,
        test_type: &TestType,
        expected: Option<i64>,
    ) -> Result<(), PostgresStoreError> {
        let now = self.now;
        let changed = self.update(
            "UPDATE test_types SET name = $1, updated_at = $2, version = version + 1 WHERE id = \
             $3 AND admission_schedule_id = $4 AND deleted_at IS NULL AND ($5::BIGINT IS NULL OR \
             version = $5)",
            &[&test_type.name, &now, &to_key(id)?, &to_key(schedule)?, &expected],
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
    ) -> Result<(), PostgresStoreError> {
        let now = self.now;
        let changed = self.update(
            "UPDATE subjects SET name = $1, score = $2, display_order = $3, updated_at = $4, \
             version = version + 1 WHERE id = $5 AND test_type_id = $6 AND deleted_at IS NULL AND \
             ($7::BIGINT IS NULL OR version = $7)",
            &[
                &subject.name,
                &subject.score,
                &subject.display_order,
                &now,
                &to_key(id)?,
                &to_key(test_type)?,
                &expected,
            ],
            ResourceKind::Subject,
            &subject.name,
        )?;
        self.settle(changed, Level::Subject, id, Some(test_type), expected)?;
        self.touched.insert(test_type);
        Ok(())
    }

    /// Upserts a subject batch, checking cancellation between chunks.
    fn upsert_subjects(
        &mut self,
        test_type: u64,
        subjects: &[Subject],
    ) -> Result<(), PostgresStoreError> {
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
        &mut self,
        level: Level,
        parent: u64,
        incoming: &[Option<u64>],
    ) -> Result<(), PostgresStoreError> {
        self.ctx.checkpoint()?;
        let existing: BTreeSet<u64> =
            loader::live_child_ids(self.tx, level, &[parent])?.into_iter().collect();
        let keep: BTreeSet<u64> = incoming.iter().flatten().copied().collect();
        if let Some(foreign) = keep.difference(&existing).next() {
            return Err(not_found(level, *foreign));
        }
        let stale: Vec<u64> = existing.difference(&keep).copied().collect();
        if !stale.is_empty() {
            let sql = format!("DELETE FROM {} WHERE id = ANY($1)", level.table());
            self.tx.execute(sql.as_str(), &[&to_keys(&stale)?])?;
        }
        let kept: Vec<u64> = keep.into_iter().collect();
        self.park_names(level, parent, &kept)
    }

    /// Moves kept sibling names to per-row placeholders until their final
    /// names are applied. Placeholders start with U+0001, which sanitized
    /// names never contain.
    fn park_names(
        &mut self,
        level: Level,
        parent: u64,
        ids: &[u64],
    ) -> Result<(), PostgresStoreError> {
        let Some(parent_column) = level.parent_column() else {
            return Ok(());
        };
        if !level.unique_name() || ids.is_empty() {
            return Ok(());
        }
        self.ctx.checkpoint()?;
        let sql = format!(
            "UPDATE {} SET name = chr(1) || id::text WHERE id = ANY($1) AND {parent_column} = $2 \
             AND deleted_at IS NULL",
            level.table()
        );
        self.tx.execute(sql.as_str(), &[&to_keys(ids)?, &to_key(parent)?])?;
        Ok(())
    }

    /// Reconciles the departments of a university.
    fn reconcile_departments(
        &mut self,
        university: u64,
        departments: &[Department],
    ) -> Result<(), PostgresStoreError> {
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
    fn reconcile_majors(&mut self, department: u64, majors: &[Major]) -> Result<(), PostgresStoreError> {
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
    ) -> Result<(), PostgresStoreError> {
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
        &mut self,
        schedule: u64,
        infos: &[AdmissionInfo],
    ) -> Result<(), PostgresStoreError> {
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
    ) -> Result<(), PostgresStoreError> {
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
    ) -> Result<(), PostgresStoreError> {
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
        &mut self,
        level: Level,
        id: u64,
        parent: Option<u64>,
        mode: DeleteMode,
    ) -> Result<(), PostgresStoreError> {
        self.ctx.checkpoint()?;
        if !loader::is_live(self.tx, level, id, parent)? {
            return Err(not_found(level, id));
        }
        match mode {
            DeleteMode::Hard => {
                let sql = format!("DELETE FROM {} WHERE id = $1", level.table());
                self.tx.execute(sql.as_str(), &[&to_key(id)?])?;
            }
            DeleteMode::Soft => self.soft_delete(level, &[id])?,
        }
        Ok(())
    }

    /// Stamps `deleted_at` on the rows and their live sub-trees.
    fn soft_delete(&mut self, level: Level, ids: &[u64]) -> Result<(), PostgresStoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.ctx.checkpoint()?;
        for child in level.children() {
            let child_ids = loader::live_child_ids(self.tx, *child, ids)?;
            self.soft_delete(*child, &child_ids)?;
        }
        let sql = format!(
            "UPDATE {} SET deleted_at = $1, updated_at = $1 WHERE deleted_at IS NULL AND id = \
             ANY($2)",
            level.table()
        );
        let now = self.now;
        self.tx.execute(sql.as_str(), &[&now, &to_keys(ids)?])?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Derived state
    // ------------------------------------------------------------------------

    /// Recomputes percentages for every touched test type.
    fn recompute_touched(&mut self) -> Result<(), PostgresStoreError> {
        let touched = std::mem::take(&mut self.touched);
        if touched.is_empty() {
            return Ok(());
        }
        let statement = self.tx.prepare("UPDATE subjects SET percentage = $1 WHERE id = $2")?;
        for test_type in touched {
            let mut subjects = loader::subjects_of(self.tx, self.ctx, test_type)?;
            recompute_percentages(&mut subjects);
            for subject in &subjects {
                if let Some(id) = subject.id {
                    self.tx.execute(&statement, &[&subject.percentage, &to_key(id.get())?])?;
                }
            }
        }
        Ok(())
    }

    /// Reloads the written entity inside the transaction.
    fn reload(&mut self, target: Target) -> Result<WriteRecord, PostgresStoreError> {
        let ctx = self.ctx;
        let tx = &mut *self.tx;
        let record = match target {
            Target::University(id) => loader::university(tx, ctx, id)?.map(WriteRecord::University),
            Target::Department {
                university,
                id,
            } => loader::department(tx, ctx, university, id)?.map(WriteRecord::Department),
            Target::Major {
                department,
                id,
            } => loader::major(tx, ctx, department, id)?.map(WriteRecord::Major),
            Target::Schedule {
                major,
                id,
            } => {
                loader::admission_schedule(tx, ctx, major, id)?.map(WriteRecord::AdmissionSchedule)
            }
            Target::Info {
                schedule,
                id,
            } => loader::admission_info(tx, ctx, schedule, id)?.map(WriteRecord::AdmissionInfo),
            Target::TestType {
                schedule,
                id,
            } => loader::test_type(tx, ctx, schedule, id)?.map(WriteRecord::TestType),
            Target::Subject {
                test_type,
                id,
            } => loader::subject(tx, ctx, test_type, id)?.map(WriteRecord::Subject),
            Target::Subjects(test_type) => {
                Some(WriteRecord::Subjects(loader::subjects_of(tx, ctx, test_type)?))
            }
            Target::FilterOption(id) => loader::filter_option(tx, id)?.map(WriteRecord::FilterOption),
            Target::Deleted => Some(WriteRecord::Deleted),
        };
        record.ok_or_else(|| {
            PostgresStoreError::Corrupt("written row is not readable inside its transaction".to_string())
        })
    }
}
