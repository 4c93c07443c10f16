// crates/exam-catalog-core/src/runtime/service.rs
// ============================================================================
// Module: Exam Catalog Service
// Description: Write and read pipelines over a catalog store.
// Purpose: Sanitize, validate, persist with retry, and serve cached reads.
// Dependencies: tokio, tracing, crate::{core, interfaces, sanitize, validation}
// ============================================================================

//! ## Overview
//! [`CatalogService`] is the only entry point transports use. Writes flow
//! through sanitization, percentage normalization, and validation before the
//! store executes them in one transaction on the blocking pool. Retryable
//! store faults are retried with bounded exponential backoff; the backoff
//! sleep is async and aborts as soon as the caller cancels or the deadline
//! passes. Every committed write invalidates the cache scope the store
//! reports before the result is returned, so reads issued afterwards observe
//! the write.
//!
//! Reads consult the [`ReadCache`] first and populate it only when no
//! invalidation ran while the store was being queried.
//!
//! Security posture: payload names are untrusted and are sanitized before
//! they reach validation or storage.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::audit::AuditOutcome;
use super::audit::NoopAuditSink;
use super::audit::WriteAuditEvent;
use super::audit::WriteAuditEventParams;
use super::audit::WriteAuditSink;
use super::cache::DEFAULT_CACHE_TTL;
use super::cache::ReadCache;
use super::cache::keys;
use super::error::CatalogError;
use super::retry::RetryPolicy;
use super::retry::is_retryable;
use crate::core::AdmissionInfo;
use crate::core::AdmissionInfoId;
use crate::core::AdmissionSchedule;
use crate::core::AdmissionScheduleId;
use crate::core::Department;
use crate::core::DepartmentId;
use crate::core::FilterCategory;
use crate::core::FilterOption;
use crate::core::Major;
use crate::core::MajorId;
use crate::core::Subject;
use crate::core::SubjectId;
use crate::core::TestType;
use crate::core::TestTypeId;
use crate::core::University;
use crate::core::UniversityId;
use crate::core::normalize_university;
use crate::core::recompute_percentages;
use crate::interfaces::CatalogStore;
use crate::interfaces::DeleteMode;
use crate::interfaces::EntityRef;
use crate::interfaces::IsolationLevel;
use crate::interfaces::OpContext;
use crate::interfaces::Page;
use crate::interfaces::ResourceKind;
use crate::interfaces::SharedCatalogStore;
use crate::interfaces::StoreError;
use crate::interfaces::TxOptions;
use crate::interfaces::WriteCommand;
use crate::interfaces::WriteRecord;
use crate::sanitize::Sanitizer;
use crate::validation::Validator;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default deadline for a write including retries.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);
/// Default deadline for a read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Service-wide defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Retry policy for transient store faults.
    pub retry: RetryPolicy,
    /// Deadline for a write including retries.
    pub write_timeout: Duration,
    /// Deadline for a read.
    pub read_timeout: Duration,
    /// Transaction isolation for writes.
    pub isolation: IsolationLevel,
    /// Open every write transaction read-only.
    pub read_only: bool,
    /// Read cache entry lifetime.
    pub cache_ttl: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            isolation: IsolationLevel::default(),
            read_only: false,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// Per-call overrides of the service defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOptions {
    /// Retry policy override.
    pub retry: Option<RetryPolicy>,
    /// Isolation override.
    pub isolation: Option<IsolationLevel>,
    /// Deadline override.
    pub timeout: Option<Duration>,
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Outcome of racing a backoff sleep against cancellation and deadline.
enum Backoff {
    /// Sleep finished; try again.
    Elapsed,
    /// Caller cancelled.
    Cancelled,
    /// Deadline passed first.
    Expired,
}

/// Extracts a typed record from a committed write.
macro_rules! record_as {
    ($record:expr, $variant:ident) => {
        match $record {
            WriteRecord::$variant(value) => Ok(value),
            other => Err(CatalogError::Internal(format!(
                "store returned unexpected record: {}",
                record_label(&other)
            ))),
        }
    };
}

/// Catalog read and write pipelines.
#[derive(Clone)]
pub struct CatalogService {
    /// Persistence backend.
    store: SharedCatalogStore,
    /// Shared read cache.
    cache: Arc<ReadCache>,
    /// Ingress sanitizer.
    sanitizer: Sanitizer,
    /// Aggregate validator.
    validator: Validator,
    /// Service defaults.
    config: ServiceConfig,
    /// Write audit sink.
    audit: Arc<dyn WriteAuditSink>,
}

impl CatalogService {
    /// Creates a service over `store`.
    #[must_use]
    pub fn new(store: SharedCatalogStore, config: ServiceConfig) -> Self {
        Self {
            store,
            cache: Arc::new(ReadCache::new(config.cache_ttl)),
            sanitizer: Sanitizer::default(),
            validator: Validator::new(),
            config,
            audit: Arc::new(NoopAuditSink),
        }
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn WriteAuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Replaces the sanitizer.
    #[must_use]
    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    /// Returns the service defaults.
    #[must_use]
    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Returns the read cache.
    #[must_use]
    pub fn cache(&self) -> &ReadCache {
        &self.cache
    }

    // ------------------------------------------------------------------------
    // University writes
    // ------------------------------------------------------------------------

    /// Creates a university with its full nested tree.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on validation, uniqueness, or store failure.
    pub async fn create_university(
        &self,
        university: University,
        ctx: &OpContext,
    ) -> Result<University, CatalogError> {
        let record = self.write(WriteCommand::CreateUniversity(university), ctx).await?;
        record_as!(record, University)
    }

    /// Updates a university; reconciles children when `replace_children`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on validation, version conflict, missing
    /// rows, or store failure.
    pub async fn update_university(
        &self,
        id: UniversityId,
        university: University,
        replace_children: bool,
        ctx: &OpContext,
    ) -> Result<University, CatalogError> {
        let command = WriteCommand::UpdateUniversity {
            id,
            university,
            replace_children,
        };
        let record = self.write(command, ctx).await?;
        record_as!(record, University)
    }

    /// Deletes a university and its sub-tree.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the university is missing or the store
    /// fails.
    pub async fn delete_university(
        &self,
        id: UniversityId,
        mode: DeleteMode,
        ctx: &OpContext,
    ) -> Result<(), CatalogError> {
        self.write(
            WriteCommand::DeleteUniversity {
                id,
                mode,
            },
            ctx,
        )
        .await
        .map(|_| ())
    }

    // ------------------------------------------------------------------------
    // Child writes
    // ------------------------------------------------------------------------

    /// Creates a department sub-tree under a university.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on validation, missing parent, uniqueness, or
    /// store failure.
    pub async fn create_department(
        &self,
        university_id: UniversityId,
        department: Department,
        ctx: &OpContext,
    ) -> Result<Department, CatalogError> {
        let command = WriteCommand::CreateDepartment {
            university_id,
            department,
        };
        record_as!(self.write(command, ctx).await?, Department)
    }

    /// Updates a department's own fields.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on validation, conflict, missing rows, or
    /// store failure.
    pub async fn update_department(
        &self,
        university_id: UniversityId,
        department_id: DepartmentId,
        department: Department,
        ctx: &OpContext,
    ) -> Result<Department, CatalogError> {
        let command = WriteCommand::UpdateDepartment {
            university_id,
            department_id,
            department,
        };
        record_as!(self.write(command, ctx).await?, Department)
    }

    /// Deletes a department and its sub-tree.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the department is missing or the store
    /// fails.
    pub async fn delete_department(
        &self,
        university_id: UniversityId,
        department_id: DepartmentId,
        mode: DeleteMode,
        ctx: &OpContext,
    ) -> Result<(), CatalogError> {
        let command = WriteCommand::DeleteDepartment {
            university_id,
            department_id,
            mode,
        };
        self.write(command, ctx).await.map(|_| ())
    }

    /// Creates a major sub-tree under a department.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on validation, missing parent, uniqueness, or
    /// store failure.
    pub async fn create_major(
        &self,
        department_id: DepartmentId,
        major: Major,
        ctx: &OpContext,
    ) -> Result<Major, CatalogError> {
        let command = WriteCommand::CreateMajor {
            department_id,
            major,
        };
        record_as!(self.write(command, ctx).await?, Major)
    }

    /// Updates a major's own fields.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on validation, conflict, missing rows, or
    /// store failure.
    pub async fn update_major(
        &self,
        department_id: DepartmentId,
        major_id: MajorId,
        major: Major,
        ctx: &OpContext,
    ) -> Result<Major, CatalogError> {
        let command = WriteCommand::UpdateMajor {
            department_id,
            major_id,
            major,
        };
        record_as!(self.write(command, ctx).await?, Major)
    }

    /// Deletes a major and its sub-tree.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the major is missing or the store fails.
    pub async fn delete_major(
        &self,
        department_id: DepartmentId,
        major_id: MajorId,
        mode: DeleteMode,
        ctx: &OpContext,
    ) -> Result<(), CatalogError> {
        let command = WriteCommand::DeleteMajor {
            department_id,
            major_id,
            mode,
        };
        self.write(command, ctx).await.map(|_| ())
    }

    /// Creates an admission schedule sub-tree under a major.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on validation, missing parent, or store
    /// failure.
    pub async fn create_admission_schedule(
        &self,
        major_id: MajorId,
        schedule: AdmissionSchedule,
        ctx: &OpContext,
    ) -> Result<AdmissionSchedule, CatalogError> {
        let command = WriteCommand::CreateAdmissionSchedule {
            major_id,
            schedule,
        };
        record_as!(self.write(command, ctx).await?, AdmissionSchedule)
    }

    /// Updates an admission schedule's own fields.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on validation, conflict, missing rows, or
    /// store failure.
    pub async fn update_admission_schedule(
        &self,
        major_id: MajorId,
        schedule_id: AdmissionScheduleId,
        schedule: AdmissionSchedule,
        ctx: &OpContext,
    ) -> Result<AdmissionSchedule, CatalogError> {
        let command = WriteCommand::UpdateAdmissionSchedule {
            major_id,
            schedule_id,
            schedule,
        };
        record_as!(self.write(command, ctx).await?, AdmissionSchedule)
    }

    /// Deletes an admission schedule and its sub-tree.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the schedule is missing or the store
    /// fails.
    pub async fn delete_admission_schedule(
        &self,
        major_id: MajorId,
        schedule_id: AdmissionScheduleId,
        mode: DeleteMode,
        ctx: &OpContext,
    ) -> Result<(), CatalogError> {
        let command = WriteCommand::DeleteAdmissionSchedule {
            major_id,
            schedule_id,
            mode,
        };
        self.write(command, ctx).await.map(|_| ())
    }

    /// Creates an admission info row.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on validation, missing parent, or store
    /// failure.
    pub async fn create_admission_info(
        &self,
        schedule_id: AdmissionScheduleId,
        info: AdmissionInfo,
        ctx: &OpContext,
    ) -> Result<AdmissionInfo, CatalogError> {
        let command = WriteCommand::CreateAdmissionInfo {
            schedule_id,
            info,
        };
        record_as!(self.write(command, ctx).await?, AdmissionInfo)
    }

    /// Updates an admission info row.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on validation, conflict, missing rows, or
    /// store failure.
    pub async fn update_admission_info(
        &self,
        schedule_id: AdmissionScheduleId,
        info_id: AdmissionInfoId,
        info: AdmissionInfo,
        ctx: &OpContext,
    ) -> Result<AdmissionInfo, CatalogError> {
        let command = WriteCommand::UpdateAdmissionInfo {
            schedule_id,
            info_id,
            info,
        };
        record_as!(self.write(command, ctx).await?, AdmissionInfo)
    }

    /// Deletes an admission info row.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the row is missing or the store fails.
    pub async fn delete_admission_info(
        &self,
        schedule_id: AdmissionScheduleId,
        info_id: AdmissionInfoId,
        mode: DeleteMode,
        ctx: &OpContext,
    ) -> Result<(), CatalogError> {
        let command = WriteCommand::DeleteAdmissionInfo {
            schedule_id,
            info_id,
            mode,
        };
        self.write(command, ctx).await.map(|_| ())
    }

    /// Creates a test type with its subjects.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on validation, missing parent, uniqueness, or
    /// store failure.
    pub async fn create_test_type(
        &self,
        schedule_id: AdmissionScheduleId,
        test_type: TestType,
        ctx: &OpContext,
    ) -> Result<TestType, CatalogError> {
        let command = WriteCommand::CreateTestType {
            schedule_id,
            test_type,
        };
        record_as!(self.write(command, ctx).await?, TestType)
    }

    /// Updates a test type's own fields.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on validation, conflict, missing rows, or
    /// store failure.
    pub async fn update_test_type(
        &self,
        schedule_id: AdmissionScheduleId,
        test_type_id: TestTypeId,
        test_type: TestType,
        ctx: &OpContext,
    ) -> Result<TestType, CatalogError> {
        let command = WriteCommand::UpdateTestType {
            schedule_id,
            test_type_id,
            test_type,
        };
        record_as!(self.write(command, ctx).await?, TestType)
    }

    /// Deletes a test type and its subjects.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the test type is missing or the store
    /// fails.
    pub async fn delete_test_type(
        &self,
        schedule_id: AdmissionScheduleId,
        test_type_id: TestTypeId,
        mode: DeleteMode,
        ctx: &OpContext,
    ) -> Result<(), CatalogError> {
        let command = WriteCommand::DeleteTestType {
            schedule_id,
            test_type_id,
            mode,
        };
        self.write(command, ctx).await.map(|_| ())
    }

    /// Creates a subject; sibling percentages are recomputed.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on validation, missing parent, uniqueness,
    /// the subject cap, or store failure.
    pub async fn create_subject(
        &self,
        test_type_id: TestTypeId,
        subject: Subject,
        ctx: &OpContext,
    ) -> Result<Subject, CatalogError> {
        let command = WriteCommand::CreateSubject {
            test_type_id,
            subject,
        };
        record_as!(self.write(command, ctx).await?, Subject)
    }

    /// Updates a subject; sibling percentages are recomputed.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on validation, conflict, missing rows, or
    /// store failure.
    pub async fn update_subject(
        &self,
        test_type_id: TestTypeId,
        subject_id: SubjectId,
        subject: Subject,
        ctx: &OpContext,
    ) -> Result<Subject, CatalogError> {
        let command = WriteCommand::UpdateSubject {
            test_type_id,
            subject_id,
            subject,
        };
        record_as!(self.write(command, ctx).await?, Subject)
    }

    /// Deletes a subject; sibling percentages are recomputed.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the subject is missing or the store
    /// fails.
    pub async fn delete_subject(
        &self,
        test_type_id: TestTypeId,
        subject_id: SubjectId,
        mode: DeleteMode,
        ctx: &OpContext,
    ) -> Result<(), CatalogError> {
        let command = WriteCommand::DeleteSubject {
            test_type_id,
            subject_id,
            mode,
        };
        self.write(command, ctx).await.map(|_| ())
    }

    /// Upserts many subjects of one test type and recomputes percentages.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on validation (including the subject cap on
    /// the final set), missing rows, or store failure.
    pub async fn update_subjects_batch(
        &self,
        test_type_id: TestTypeId,
        subjects: Vec<Subject>,
        ctx: &OpContext,
    ) -> Result<Vec<Subject>, CatalogError> {
        let command = WriteCommand::UpdateSubjectsBatch {
            test_type_id,
            subjects,
        };
        record_as!(self.write(command, ctx).await?, Subjects)
    }

    /// Creates a filter option after checking its parent category.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on validation or store failure.
    pub async fn create_filter_option(
        &self,
        mut option: FilterOption,
        ctx: &OpContext,
    ) -> Result<FilterOption, CatalogError> {
        self.sanitizer.sanitize_filter_option(&mut option);
        let parent = match option.parent_id {
            Some(parent_id) => {
                let lookup = ctx.with_timeout(self.config.read_timeout);
                self.blocking("load_filter_option", lookup, move |store, ctx| {
                    store.load_filter_option(parent_id, ctx)
                })
                .await?
            }
            None => None,
        };
        self.validator.validate_filter_option(&option, parent.as_ref())?;
        let command = WriteCommand::CreateFilterOption(option);
        let record = self.execute_prepared(command, &WriteOptions::default(), ctx).await?;
        record_as!(record, FilterOption)
    }

    /// Executes an arbitrary write command with per-call overrides.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when preparation, validation, or the store
    /// write fails.
    pub async fn execute(
        &self,
        mut command: WriteCommand,
        options: &WriteOptions,
        ctx: &OpContext,
    ) -> Result<WriteRecord, CatalogError> {
        if let WriteCommand::CreateFilterOption(option) = command {
            return self.create_filter_option(option, ctx).await.map(WriteRecord::FilterOption);
        }
        self.prepare(&mut command)?;
        self.execute_prepared(command, options, ctx).await
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Lists universities with full nested trees.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the store fails.
    pub async fn find_all(
        &self,
        page: Page,
        ctx: &OpContext,
    ) -> Result<Vec<University>, CatalogError> {
        self.cached(keys::universities_page(page), "find_all", ctx, move |store, ctx| {
            store.list_universities(page, ctx)
        })
        .await
    }

    /// Loads one university with its full tree.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when absent.
    pub async fn find_by_id(
        &self,
        id: UniversityId,
        ctx: &OpContext,
    ) -> Result<University, CatalogError> {
        self.cached(keys::university(id), "find_by_id", ctx, move |store, ctx| {
            found(store.load_university(id, ctx)?, ResourceKind::University, id.get())
        })
        .await
    }

    /// Searches university, department, and major names.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidInput`] for an empty query.
    pub async fn search(
        &self,
        query: &str,
        ctx: &OpContext,
    ) -> Result<Vec<University>, CatalogError> {
        let query = self.sanitizer.sanitize_str(query).to_lowercase();
        if query.is_empty() {
            return Err(CatalogError::InvalidInput("search query must not be empty".to_string()));
        }
        let key = keys::search(&query);
        self.cached(key, "search", ctx, move |store, ctx| store.search_universities(&query, ctx))
            .await
    }

    /// Loads a department sub-tree scoped to its university.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when absent.
    pub async fn find_department(
        &self,
        university_id: UniversityId,
        department_id: DepartmentId,
        ctx: &OpContext,
    ) -> Result<Department, CatalogError> {
        let key = keys::department(university_id, department_id);
        self.cached(key, "find_department", ctx, move |store, ctx| {
            found(
                store.load_department(university_id, department_id, ctx)?,
                ResourceKind::Department,
                department_id.get(),
            )
        })
        .await
    }

    /// Loads a major sub-tree scoped to its department.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when absent.
    pub async fn find_major(
        &self,
        department_id: DepartmentId,
        major_id: MajorId,
        ctx: &OpContext,
    ) -> Result<Major, CatalogError> {
        let key = keys::major(department_id, major_id);
        self.cached(key, "find_major", ctx, move |store, ctx| {
            found(store.load_major(department_id, major_id, ctx)?, ResourceKind::Major, major_id.get())
        })
        .await
    }

    /// Loads an admission schedule sub-tree scoped to its major.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when absent.
    pub async fn find_admission_schedule(
        &self,
        major_id: MajorId,
        schedule_id: AdmissionScheduleId,
        ctx: &OpContext,
    ) -> Result<AdmissionSchedule, CatalogError> {
        let key = keys::admission_schedule(major_id, schedule_id);
        self.cached(key, "find_admission_schedule", ctx, move |store, ctx| {
            found(
                store.load_admission_schedule(major_id, schedule_id, ctx)?,
                ResourceKind::AdmissionSchedule,
                schedule_id.get(),
            )
        })
        .await
    }

    /// Loads an admission info row scoped to its schedule.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when absent.
    pub async fn find_admission_info(
        &self,
        schedule_id: AdmissionScheduleId,
        info_id: AdmissionInfoId,
        ctx: &OpContext,
    ) -> Result<AdmissionInfo, CatalogError> {
        let key = keys::admission_info(schedule_id, info_id);
        self.cached(key, "find_admission_info", ctx, move |store, ctx| {
            found(
                store.load_admission_info(schedule_id, info_id, ctx)?,
                ResourceKind::AdmissionInfo,
                info_id.get(),
            )
        })
        .await
    }

    /// Loads a test type with subjects scoped to its schedule.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when absent.
    pub async fn find_test_type(
        &self,
        schedule_id: AdmissionScheduleId,
        test_type_id: TestTypeId,
        ctx: &OpContext,
    ) -> Result<TestType, CatalogError> {
        let key = keys::test_type(schedule_id, test_type_id);
        self.cached(key, "find_test_type", ctx, move |store, ctx| {
            found(
                store.load_test_type(schedule_id, test_type_id, ctx)?,
                ResourceKind::TestType,
                test_type_id.get(),
            )
        })
        .await
    }

    /// Loads a subject scoped to its test type.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when absent.
    pub async fn find_subject(
        &self,
        test_type_id: TestTypeId,
        subject_id: SubjectId,
        ctx: &OpContext,
    ) -> Result<Subject, CatalogError> {
        let key = keys::subject(test_type_id, subject_id);
        self.cached(key, "find_subject", ctx, move |store, ctx| {
            found(
                store.load_subject(test_type_id, subject_id, ctx)?,
                ResourceKind::Subject,
                subject_id.get(),
            )
        })
        .await
    }

    /// Lists filter options, optionally restricted to one category.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the store fails.
    pub async fn list_filter_options(
        &self,
        category: Option<FilterCategory>,
        ctx: &OpContext,
    ) -> Result<Vec<FilterOption>, CatalogError> {
        self.cached(keys::filter_options(category), "list_filter_options", ctx, move |store, ctx| {
            store.list_filter_options(category, ctx)
        })
        .await
    }

    // ------------------------------------------------------------------------
    // Ownership
    // ------------------------------------------------------------------------

    /// Fails with `NotFound` unless `entity` belongs to `university_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] for foreign or missing entities.
    pub async fn ensure_owned(
        &self,
        university_id: UniversityId,
        entity: EntityRef,
        ctx: &OpContext,
    ) -> Result<(), CatalogError> {
        if self.owner_of(entity, ctx).await? == Some(university_id) {
            return Ok(());
        }
        Err(CatalogError::NotFound {
            resource: entity.kind(),
            id: entity.raw_id(),
        })
    }

    /// Fails with `ParentNotFound` unless the parent `entity` of a create
    /// belongs to `university_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ParentNotFound`] for foreign or missing
    /// parents.
    pub async fn ensure_parent_owned(
        &self,
        university_id: UniversityId,
        entity: EntityRef,
        ctx: &OpContext,
    ) -> Result<(), CatalogError> {
        if self.owner_of(entity, ctx).await? == Some(university_id) {
            return Ok(());
        }
        Err(CatalogError::ParentNotFound {
            resource: entity.kind(),
            id: entity.raw_id(),
        })
    }

    /// Checks that the store can serve requests.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the store is unreachable.
    pub async fn readiness(&self) -> Result<(), CatalogError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.readiness())
            .await
            .map_err(|err| CatalogError::Internal(format!("readiness task failed: {err}")))?
            .map_err(|err| CatalogError::from_store(err, "readiness"))
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Resolves the owning university of an entity.
    async fn owner_of(
        &self,
        entity: EntityRef,
        ctx: &OpContext,
    ) -> Result<Option<UniversityId>, CatalogError> {
        let lookup = ctx.with_timeout(self.config.read_timeout);
        self.blocking("owning_university", lookup, move |store, ctx| {
            store.owning_university(entity, ctx)
        })
        .await
    }

    /// Prepares and executes a command with default options.
    async fn write(
        &self,
        mut command: WriteCommand,
        ctx: &OpContext,
    ) -> Result<WriteRecord, CatalogError> {
        self.prepare(&mut command)?;
        self.execute_prepared(command, &WriteOptions::default(), ctx).await
    }

    /// Sanitizes, normalizes percentages, and validates a command payload.
    fn prepare(&self, command: &mut WriteCommand) -> Result<(), CatalogError> {
        let sanitizer = &self.sanitizer;
        let validator = &self.validator;
        match command {
            WriteCommand::CreateUniversity(university)
            | WriteCommand::UpdateUniversity {
                university,
                ..
            } => {
                sanitizer.sanitize_university(university);
                normalize_university(university);
                validator.validate_university(university)?;
            }
            WriteCommand::CreateDepartment {
                department,
                ..
            }
            | WriteCommand::UpdateDepartment {
                department,
                ..
            } => {
                sanitizer.sanitize_department(department);
                for test_type in department.test_types_mut() {
                    recompute_percentages(&mut test_type.subjects);
                }
                validator.validate_department(department)?;
            }
            WriteCommand::CreateMajor {
                major,
                ..
            }
            | WriteCommand::UpdateMajor {
                major,
                ..
            } => {
                sanitizer.sanitize_major(major);
                for test_type in major.test_types_mut() {
                    recompute_percentages(&mut test_type.subjects);
                }
                validator.validate_major(major)?;
            }
            WriteCommand::CreateAdmissionSchedule {
                schedule,
                ..
            }
            | WriteCommand::UpdateAdmissionSchedule {
                schedule,
                ..
            } => {
                sanitizer.sanitize_schedule(schedule);
                for test_type in &mut schedule.test_types {
                    recompute_percentages(&mut test_type.subjects);
                }
                validator.validate_admission_schedule(schedule)?;
            }
            WriteCommand::CreateAdmissionInfo {
                info,
                ..
            }
            | WriteCommand::UpdateAdmissionInfo {
                info,
                ..
            } => validator.validate_admission_info(info)?,
            WriteCommand::CreateTestType {
                test_type,
                ..
            }
            | WriteCommand::UpdateTestType {
                test_type,
                ..
            } => {
                sanitizer.sanitize_test_type(test_type);
                recompute_percentages(&mut test_type.subjects);
                validator.validate_test_type(test_type)?;
            }
            WriteCommand::CreateSubject {
                subject,
                ..
            }
            | WriteCommand::UpdateSubject {
                subject,
                ..
            } => {
                sanitizer.sanitize_subject(subject);
                validator.validate_subject(subject)?;
            }
            WriteCommand::UpdateSubjectsBatch {
                subjects,
                ..
            } => {
                for subject in subjects.iter_mut() {
                    sanitizer.sanitize_subject(subject);
                }
                validator.validate_subject_batch(subjects)?;
            }
            WriteCommand::CreateFilterOption(option) => {
                sanitizer.sanitize_filter_option(option);
            }
            WriteCommand::DeleteUniversity {
                ..
            }
            | WriteCommand::DeleteDepartment {
                ..
            }
            | WriteCommand::DeleteMajor {
                ..
            }
            | WriteCommand::DeleteAdmissionSchedule {
                ..
            }
            | WriteCommand::DeleteAdmissionInfo {
                ..
            }
            | WriteCommand::DeleteTestType {
                ..
            }
            | WriteCommand::DeleteSubject {
                ..
            } => {}
        }
        Ok(())
    }

    /// Runs the retry loop for a prepared command and invalidates the cache
    /// on commit.
    async fn execute_prepared(
        &self,
        command: WriteCommand,
        options: &WriteOptions,
        ctx: &OpContext,
    ) -> Result<WriteRecord, CatalogError> {
        let operation = command.operation();
        let resource = command.resource();
        let target = command_target(&command);
        let started = Instant::now();
        let ctx = ctx.with_timeout(options.timeout.unwrap_or(self.config.write_timeout));
        let tx = TxOptions {
            isolation: options.isolation.unwrap_or(self.config.isolation),
            read_only: self.config.read_only,
        };
        let mut retry = options.retry.as_ref().unwrap_or(&self.config.retry).handle_from(started);
        let command = Arc::new(command);
        let mut attempts: u32 = 0;

        let result = loop {
            if let Err(err) = ctx.checkpoint() {
                break Err(CatalogError::from_store(err, operation));
            }
            attempts = attempts.saturating_add(1);
            let store = Arc::clone(&self.store);
            let attempt_command = Arc::clone(&command);
            let attempt_ctx = ctx.clone();
            let joined = tokio::task::spawn_blocking(move || {
                store.write(&attempt_command, &tx, &attempt_ctx)
            })
            .await;
            let err = match joined {
                Ok(Ok(outcome)) => break Ok(outcome),
                Ok(Err(err)) => err,
                Err(join) => {
                    break Err(CatalogError::Internal(format!("write task failed: {join}")));
                }
            };
            if !is_retryable(&err) {
                break Err(CatalogError::from_store(err, operation));
            }
            let Some(delay) = retry.next_delay() else {
                warn!(operation, attempts, error = %err, "catalog write retries exhausted");
                break Err(CatalogError::from_store(err, operation));
            };
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            debug!(operation, attempts, delay_ms, error = %err, "retrying catalog write");
            match backoff(&ctx, delay).await {
                Backoff::Elapsed => {}
                Backoff::Cancelled => {
                    break Err(CatalogError::Cancelled {
                        operation: operation.to_string(),
                    });
                }
                Backoff::Expired => {
                    break Err(CatalogError::Timeout {
                        operation: operation.to_string(),
                    });
                }
            }
        };

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok(outcome) => {
                self.cache.invalidate(outcome.scope);
                let id = record_id(&outcome.record).or(target);
                info!(
                    operation,
                    resource = %resource,
                    id = ?id,
                    attempts,
                    elapsed_ms,
                    "catalog write committed"
                );
                self.audit.record(&WriteAuditEvent::new(WriteAuditEventParams {
                    operation,
                    resource,
                    id,
                    outcome: AuditOutcome::Committed,
                    error_code: None,
                    attempts,
                    elapsed_ms,
                }));
                Ok(outcome.record)
            }
            Err(err) => {
                warn!(
                    operation,
                    resource = %resource,
                    id = ?target,
                    attempts,
                    elapsed_ms,
                    code = err.code(),
                    error = %err,
                    "catalog write failed"
                );
                self.audit.record(&WriteAuditEvent::new(WriteAuditEventParams {
                    operation,
                    resource,
                    id: target,
                    outcome: AuditOutcome::Failed,
                    error_code: Some(err.code()),
                    attempts,
                    elapsed_ms,
                }));
                Err(err)
            }
        }
    }

    /// Serves a read from the cache or the store, populating the cache when
    /// no invalidation raced the load.
    async fn cached<T, F>(
        &self,
        key: String,
        operation: &'static str,
        ctx: &OpContext,
        load: F,
    ) -> Result<T, CatalogError>
    where
        T: Any + Clone + Send + Sync,
        F: FnOnce(&dyn CatalogStore, &OpContext) -> Result<T, StoreError> + Send + 'static,
    {
        if let Some(hit) = self.cache.get::<T>(&key) {
            debug!(operation, key = %key, "catalog cache hit");
            return Ok(Arc::unwrap_or_clone(hit));
        }
        let generation = self.cache.generation();
        let value = self.blocking(operation, ctx.with_timeout(self.config.read_timeout), load).await?;
        let value = Arc::new(value);
        self.cache.insert_if_current(key, Arc::clone(&value), generation);
        Ok(Arc::unwrap_or_clone(value))
    }

    /// Runs a store call on the blocking pool.
    async fn blocking<T, F>(
        &self,
        operation: &'static str,
        ctx: OpContext,
        call: F,
    ) -> Result<T, CatalogError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn CatalogStore, &OpContext) -> Result<T, StoreError> + Send + 'static,
    {
        ctx.checkpoint().map_err(|err| CatalogError::from_store(err, operation))?;
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || call(store.as_ref(), &ctx))
            .await
            .map_err(|err| CatalogError::Internal(format!("{operation} task failed: {err}")))?
            .map_err(|err| CatalogError::from_store(err, operation))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Sleeps for `delay` unless the context is cancelled or expires first.
async fn backoff(ctx: &OpContext, delay: Duration) -> Backoff {
    let remaining = ctx.remaining();
    let deadline = async move {
        match remaining {
            Some(remaining) => tokio::time::sleep(remaining).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        biased;
        () = ctx.cancellation().cancelled() => Backoff::Cancelled,
        () = deadline => Backoff::Expired,
        () = tokio::time::sleep(delay) => Backoff::Elapsed,
    }
}

/// Maps a missing row to `NotFound`.
fn found<T>(value: Option<T>, resource: ResourceKind, id: u64) -> Result<T, StoreError> {
    value.ok_or(StoreError::NotFound {
        resource,
        id,
    })
}

/// Returns the id a command addresses, when it addresses an existing row.
const fn command_target(command: &WriteCommand) -> Option<u64> {
    match command {
        WriteCommand::UpdateUniversity {
            id,
            ..
        }
        | WriteCommand::DeleteUniversity {
            id,
            ..
        } => Some(id.get()),
        WriteCommand::UpdateDepartment {
            department_id,
            ..
        }
        | WriteCommand::DeleteDepartment {
            department_id,
            ..
        } => Some(department_id.get()),
        WriteCommand::UpdateMajor {
            major_id,
            ..
        }
        | WriteCommand::DeleteMajor {
            major_id,
            ..
        } => Some(major_id.get()),
        WriteCommand::UpdateAdmissionSchedule {
            schedule_id,
            ..
        }
        | WriteCommand::DeleteAdmissionSchedule {
            schedule_id,
            ..
        } => Some(schedule_id.get()),
        WriteCommand::UpdateAdmissionInfo {
            info_id,
            ..
        }
        | WriteCommand::DeleteAdmissionInfo {
            info_id,
            ..
        } => Some(info_id.get()),
        WriteCommand::UpdateTestType {
            test_type_id,
            ..
        }
        | WriteCommand::DeleteTestType {
            test_type_id,
            ..
        }
        | WriteCommand::UpdateSubjectsBatch {
            test_type_id,
            ..
        } => Some(test_type_id.get()),
        WriteCommand::UpdateSubject {
            subject_id,
            ..
        }
        | WriteCommand::DeleteSubject {
            subject_id,
            ..
        } => Some(subject_id.get()),
        _ => None,
    }
}

/// Returns the id of a persisted record.
fn record_id(record: &WriteRecord) -> Option<u64> {
    match record {
        WriteRecord::University(value) => value.id.map(UniversityId::get),
        WriteRecord::Department(value) => value.id.map(DepartmentId::get),
        WriteRecord::Major(value) => value.id.map(MajorId::get),
        WriteRecord::AdmissionSchedule(value) => value.id.map(AdmissionScheduleId::get),
        WriteRecord::AdmissionInfo(value) => value.id.map(AdmissionInfoId::get),
        WriteRecord::TestType(value) => value.id.map(TestTypeId::get),
        WriteRecord::Subject(value) => value.id.map(SubjectId::get),
        WriteRecord::FilterOption(value) => value.id.map(crate::core::FilterOptionId::get),
        WriteRecord::Subjects(_) | WriteRecord::Deleted => None,
    }
}

/// Returns a label for a record variant.
const fn record_label(record: &WriteRecord) -> &'static str {
    match record {
        WriteRecord::University(_) => "university",
        WriteRecord::Department(_) => "department",
        WriteRecord::Major(_) => "major",
        WriteRecord::AdmissionSchedule(_) => "admission_schedule",
        WriteRecord::AdmissionInfo(_) => "admission_info",
        WriteRecord::TestType(_) => "test_type",
        WriteRecord::Subject(_) => "subject",
        WriteRecord::Subjects(_) => "subjects",
        WriteRecord::FilterOption(_) => "filter_option",
        WriteRecord::Deleted => "deleted",
    }
}
