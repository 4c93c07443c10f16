// crates/exam-catalog-core/src/interfaces/mod.rs
// ============================================================================
// Module: Exam Catalog Interfaces
// Description: Backend-agnostic store interface and write command model.
// Purpose: Define the contract every catalog persistence backend implements.
// Dependencies: serde, thiserror, tokio-util, crate::core
// ============================================================================

//! ## Overview
//! A [`CatalogStore`] persists the University aggregate and serves nested
//! reads. Every mutation is expressed as a [`WriteCommand`] executed in one
//! store transaction; the store returns a [`WriteOutcome`] naming the
//! persisted record and the cache scope the write invalidates.
//!
//! Stores are synchronous and run on blocking threads. They observe the
//! caller's [`OpContext`] at statement boundaries and immediately before
//! commit, so a cancelled or expired operation rolls back without side
//! effects.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::AdmissionInfo;
use crate::core::AdmissionInfoId;
use crate::core::AdmissionSchedule;
use crate::core::AdmissionScheduleId;
use crate::core::Department;
use crate::core::DepartmentId;
use crate::core::FilterCategory;
use crate::core::FilterOption;
use crate::core::FilterOptionId;
use crate::core::Major;
use crate::core::MajorId;
use crate::core::Subject;
use crate::core::SubjectId;
use crate::core::TestType;
use crate::core::TestTypeId;
use crate::core::University;
use crate::core::UniversityId;
use crate::validation::ValidationError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default page size for university listings.
pub const DEFAULT_PAGE_LIMIT: u32 = 100;
/// Largest accepted page size.
pub const MAX_PAGE_LIMIT: u32 = 1_000;

// ============================================================================
// SECTION: Resources
// ============================================================================

/// Catalog entity kind, used in errors and audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// University aggregate root.
    University,
    /// Department.
    Department,
    /// Major.
    Major,
    /// Admission schedule.
    AdmissionSchedule,
    /// Admission info.
    AdmissionInfo,
    /// Test type.
    TestType,
    /// Subject.
    Subject,
    /// Filter option.
    FilterOption,
}

impl ResourceKind {
    /// Returns the `snake_case` label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::University => "university",
            Self::Department => "department",
            Self::Major => "major",
            Self::AdmissionSchedule => "admission_schedule",
            Self::AdmissionInfo => "admission_info",
            Self::TestType => "test_type",
            Self::Subject => "subject",
            Self::FilterOption => "filter_option",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a non-root catalog entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    /// Department by id.
    Department(DepartmentId),
    /// Major by id.
    Major(MajorId),
    /// Admission schedule by id.
    AdmissionSchedule(AdmissionScheduleId),
    /// Admission info by id.
    AdmissionInfo(AdmissionInfoId),
    /// Test type by id.
    TestType(TestTypeId),
    /// Subject by id.
    Subject(SubjectId),
}

impl EntityRef {
    /// Returns the referenced entity kind.
    #[must_use]
    pub const fn kind(self) -> ResourceKind {
        match self {
            Self::Department(_) => ResourceKind::Department,
            Self::Major(_) => ResourceKind::Major,
            Self::AdmissionSchedule(_) => ResourceKind::AdmissionSchedule,
            Self::AdmissionInfo(_) => ResourceKind::AdmissionInfo,
            Self::TestType(_) => ResourceKind::TestType,
            Self::Subject(_) => ResourceKind::Subject,
        }
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn raw_id(self) -> u64 {
        match self {
            Self::Department(id) => id.get(),
            Self::Major(id) => id.get(),
            Self::AdmissionSchedule(id) => id.get(),
            Self::AdmissionInfo(id) => id.get(),
            Self::TestType(id) => id.get(),
            Self::Subject(id) => id.get(),
        }
    }
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Read committed.
    #[default]
    ReadCommitted,
    /// Serializable.
    Serializable,
}

impl IsolationLevel {
    /// Returns the `snake_case` label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadCommitted => "read_committed",
            Self::Serializable => "serializable",
        }
    }
}

/// Per-transaction options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxOptions {
    /// Isolation level.
    pub isolation: IsolationLevel,
    /// Open the transaction read-only; writes fail with a store error.
    pub read_only: bool,
}

/// Delete strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// Remove rows; foreign keys cascade to descendants.
    #[default]
    Hard,
    /// Mark the node and its sub-tree with `deleted_at`.
    Soft,
}

/// Cancellation and deadline carried by every store call.
#[derive(Debug, Clone)]
pub struct OpContext {
    /// Cooperative cancellation signal.
    cancel: CancellationToken,
    /// Absolute deadline, if any.
    deadline: Option<Instant>,
}

impl Default for OpContext {
    fn default() -> Self {
        Self::background()
    }
}

impl OpContext {
    /// Creates a context from a cancellation token and optional deadline.
    #[must_use]
    pub const fn new(cancel: CancellationToken, deadline: Option<Instant>) -> Self {
        Self {
            cancel,
            deadline,
        }
    }

    /// Returns a context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::new(CancellationToken::new(), None)
    }

    /// Returns a child context whose deadline is at most `timeout` from now.
    ///
    /// Cancelling the parent cancels the child.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, candidate) {
            (Some(existing), Some(candidate)) => Some(existing.min(candidate)),
            (existing, candidate) => existing.or(candidate),
        };
        Self::new(self.cancel.child_token(), deadline)
    }

    /// Returns the cancellation token.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left before the deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns true once the context is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails when the context is cancelled or past its deadline.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cancelled`] or [`StoreError::Timeout`].
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        if self.cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(StoreError::Timeout);
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Reads
// ============================================================================

/// Offset pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Rows to skip.
    pub offset: u64,
    /// Maximum rows to return.
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Page {
    /// Creates a page, clamping the limit into `[1, MAX_PAGE_LIMIT]`.
    #[must_use]
    pub fn new(offset: u64, limit: u32) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }
}

// ============================================================================
// SECTION: Write Commands
// ============================================================================

/// Single transactional catalog mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteCommand {
    /// Insert a full university tree.
    CreateUniversity(University),
    /// Update a university; reconcile children when `replace_children`.
    UpdateUniversity {
        /// Target university.
        id: UniversityId,
        /// Incoming state carrying the expected version.
        university: University,
        /// Reconcile departments (and below) against the payload.
        replace_children: bool,
    },
    /// Delete a university and its sub-tree.
    DeleteUniversity {
        /// Target university.
        id: UniversityId,
        /// Delete strategy.
        mode: DeleteMode,
    },
    /// Insert a department sub-tree under a university.
    CreateDepartment {
        /// Parent university.
        university_id: UniversityId,
        /// New department.
        department: Department,
    },
    /// Update a department's own fields.
    UpdateDepartment {
        /// Parent university.
        university_id: UniversityId,
        /// Target department.
        department_id: DepartmentId,
        /// Incoming state carrying the expected version.
        department: Department,
    },
    /// Delete a department and its sub-tree.
    DeleteDepartment {
        /// Parent university.
        university_id: UniversityId,
        /// Target department.
        department_id: DepartmentId,
        /// Delete strategy.
        mode: DeleteMode,
    },
    /// Insert a major sub-tree under a department.
    CreateMajor {
        /// Parent department.
        department_id: DepartmentId,
        /// New major.
        major: Major,
    },
    /// Update a major's own fields.
    UpdateMajor {
        /// Parent department.
        department_id: DepartmentId,
        /// Target major.
        major_id: MajorId,
        /// Incoming state carrying the expected version.
        major: Major,
    },
    /// Delete a major and its sub-tree.
    DeleteMajor {
        /// Parent department.
        department_id: DepartmentId,
        /// Target major.
        major_id: MajorId,
        /// Delete strategy.
        mode: DeleteMode,
    },
    /// Insert an admission schedule sub-tree under a major.
    CreateAdmissionSchedule {
        /// Parent major.
        major_id: MajorId,
        /// New schedule.
        schedule: AdmissionSchedule,
    },
    /// Update a schedule's own fields.
    UpdateAdmissionSchedule {
        /// Parent major.
        major_id: MajorId,
        /// Target schedule.
        schedule_id: AdmissionScheduleId,
        /// Incoming state carrying the expected version.
        schedule: AdmissionSchedule,
    },
    /// Delete a schedule and its sub-tree.
    DeleteAdmissionSchedule {
        /// Parent major.
        major_id: MajorId,
        /// Target schedule.
        schedule_id: AdmissionScheduleId,
        /// Delete strategy.
        mode: DeleteMode,
    },
    /// Insert an admission info row.
    CreateAdmissionInfo {
        /// Parent schedule.
        schedule_id: AdmissionScheduleId,
        /// New row.
        info: AdmissionInfo,
    },
    /// Update an admission info row.
    UpdateAdmissionInfo {
        /// Parent schedule.
        schedule_id: AdmissionScheduleId,
        /// Target row.
        info_id: AdmissionInfoId,
        /// Incoming state carrying the expected version.
        info: AdmissionInfo,
    },
    /// Delete an admission info row.
    DeleteAdmissionInfo {
        /// Parent schedule.
        schedule_id: AdmissionScheduleId,
        /// Target row.
        info_id: AdmissionInfoId,
        /// Delete strategy.
        mode: DeleteMode,
    },
    /// Insert a test type with its subjects.
    CreateTestType {
        /// Parent schedule.
        schedule_id: AdmissionScheduleId,
        /// New test type.
        test_type: TestType,
    },
    /// Update a test type's own fields.
    UpdateTestType {
        /// Parent schedule.
        schedule_id: AdmissionScheduleId,
        /// Target test type.
        test_type_id: TestTypeId,
        /// Incoming state carrying the expected version.
        test_type: TestType,
    },
    /// Delete a test type and its subjects.
    DeleteTestType {
        /// Parent schedule.
        schedule_id: AdmissionScheduleId,
        /// Target test type.
        test_type_id: TestTypeId,
        /// Delete strategy.
        mode: DeleteMode,
    },
    /// Insert a subject; sibling percentages are recomputed.
    CreateSubject {
        /// Parent test type.
        test_type_id: TestTypeId,
        /// New subject.
        subject: Subject,
    },
    /// Update a subject; sibling percentages are recomputed.
    UpdateSubject {
        /// Parent test type.
        test_type_id: TestTypeId,
        /// Target subject.
        subject_id: SubjectId,
        /// Incoming state carrying the expected version.
        subject: Subject,
    },
    /// Delete a subject; sibling percentages are recomputed.
    DeleteSubject {
        /// Parent test type.
        test_type_id: TestTypeId,
        /// Target subject.
        subject_id: SubjectId,
        /// Delete strategy.
        mode: DeleteMode,
    },
    /// Upsert many subjects of one test type and recompute percentages.
    UpdateSubjectsBatch {
        /// Parent test type.
        test_type_id: TestTypeId,
        /// Subjects to upsert; entries without id are inserted.
        subjects: Vec<Subject>,
    },
    /// Insert a filter option.
    CreateFilterOption(FilterOption),
}

impl WriteCommand {
    /// Returns the primary resource kind the command writes.
    #[must_use]
    pub const fn resource(&self) -> ResourceKind {
        match self {
            Self::CreateUniversity(_)
            | Self::UpdateUniversity {
                ..
            }
            | Self::DeleteUniversity {
                ..
            } => ResourceKind::University,
            Self::CreateDepartment {
                ..
            }
            | Self::UpdateDepartment {
                ..
            }
            | Self::DeleteDepartment {
                ..
            } => ResourceKind::Department,
            Self::CreateMajor {
                ..
            }
            | Self::UpdateMajor {
                ..
            }
            | Self::DeleteMajor {
                ..
            } => ResourceKind::Major,
            Self::CreateAdmissionSchedule {
                ..
            }
            | Self::UpdateAdmissionSchedule {
                ..
            }
            | Self::DeleteAdmissionSchedule {
                ..
            } => ResourceKind::AdmissionSchedule,
            Self::CreateAdmissionInfo {
                ..
            }
            | Self::UpdateAdmissionInfo {
                ..
            }
            | Self::DeleteAdmissionInfo {
                ..
            } => ResourceKind::AdmissionInfo,
            Self::CreateTestType {
                ..
            }
            | Self::UpdateTestType {
                ..
            }
            | Self::DeleteTestType {
                ..
            } => ResourceKind::TestType,
            Self::CreateSubject {
                ..
            }
            | Self::UpdateSubject {
                ..
            }
            | Self::DeleteSubject {
                ..
            }
            | Self::UpdateSubjectsBatch {
                ..
            } => ResourceKind::Subject,
            Self::CreateFilterOption(_) => ResourceKind::FilterOption,
        }
    }

    /// Returns the operation label used in logs and audit records.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::CreateUniversity(_) => "create_university",
            Self::UpdateUniversity {
                ..
            } => "update_university",
            Self::DeleteUniversity {
                ..
            } => "delete_university",
            Self::CreateDepartment {
                ..
            } => "create_department",
            Self::UpdateDepartment {
                ..
            } => "update_department",
            Self::DeleteDepartment {
                ..
            } => "delete_department",
            Self::CreateMajor {
                ..
            } => "create_major",
            Self::UpdateMajor {
                ..
            } => "update_major",
            Self::DeleteMajor {
                ..
            } => "delete_major",
            Self::CreateAdmissionSchedule {
                ..
            } => "create_admission_schedule",
            Self::UpdateAdmissionSchedule {
                ..
            } => "update_admission_schedule",
            Self::DeleteAdmissionSchedule {
                ..
            } => "delete_admission_schedule",
            Self::CreateAdmissionInfo {
                ..
            } => "create_admission_info",
            Self::UpdateAdmissionInfo {
                ..
            } => "update_admission_info",
            Self::DeleteAdmissionInfo {
                ..
            } => "delete_admission_info",
            Self::CreateTestType {
                ..
            } => "create_test_type",
            Self::UpdateTestType {
                ..
            } => "update_test_type",
            Self::DeleteTestType {
                ..
            } => "delete_test_type",
            Self::CreateSubject {
                ..
            } => "create_subject",
            Self::UpdateSubject {
                ..
            } => "update_subject",
            Self::DeleteSubject {
                ..
            } => "delete_subject",
            Self::UpdateSubjectsBatch {
                ..
            } => "update_subjects_batch",
            Self::CreateFilterOption(_) => "create_filter_option",
        }
    }
}

/// Record produced by a committed write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRecord {
    /// Persisted university tree.
    University(University),
    /// Persisted department sub-tree.
    Department(Department),
    /// Persisted major sub-tree.
    Major(Major),
    /// Persisted schedule sub-tree.
    AdmissionSchedule(AdmissionSchedule),
    /// Persisted admission info.
    AdmissionInfo(AdmissionInfo),
    /// Persisted test type with subjects.
    TestType(TestType),
    /// Persisted subject.
    Subject(Subject),
    /// Final subject set after a batch update.
    Subjects(Vec<Subject>),
    /// Persisted filter option.
    FilterOption(FilterOption),
    /// Row(s) removed or soft-deleted.
    Deleted,
}

/// Cache scope invalidated by a committed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationScope {
    /// Entries derived from one university aggregate.
    University(UniversityId),
    /// Every cached catalog entry.
    All,
    /// Filter option listings only.
    FilterOptions,
}

/// Result of a committed write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    /// Persisted record.
    pub record: WriteRecord,
    /// Cache scope to invalidate.
    pub scope: InvalidationScope,
}

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Catalog store errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Addressed entity does not exist (or is soft-deleted).
    #[error("{resource} {id} not found")]
    NotFound {
        /// Entity kind.
        resource: ResourceKind,
        /// Raw id.
        id: u64,
    },
    /// Parent of a scoped write does not exist.
    #[error("parent {resource} {id} not found")]
    ParentNotFound {
        /// Parent kind.
        resource: ResourceKind,
        /// Raw parent id.
        id: u64,
    },
    /// Unique name constraint violated.
    #[error("{resource} name already exists: {name}")]
    DuplicateName {
        /// Entity kind.
        resource: ResourceKind,
        /// Conflicting name.
        name: String,
    },
    /// Stored version differs from the expected version.
    #[error("{resource} {id} was modified concurrently (expected version {expected})")]
    Conflict {
        /// Entity kind.
        resource: ResourceKind,
        /// Raw id.
        id: u64,
        /// Version supplied by the caller.
        expected: i64,
    },
    /// Data rejected by a rule only the store can check.
    #[error("catalog store rejected data: {0}")]
    Validation(ValidationError),
    /// Operation cancelled before commit.
    #[error("catalog store operation cancelled")]
    Cancelled,
    /// Operation deadline elapsed before commit.
    #[error("catalog store operation deadline exceeded")]
    Timeout,
    /// Database driver or engine error.
    #[error("catalog store db error: {0}")]
    Db(String),
    /// Stored data failed to decode.
    #[error("catalog store corruption: {0}")]
    Corrupt(String),
    /// Store schema version is incompatible.
    #[error("catalog store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store configuration or argument is invalid.
    #[error("catalog store invalid data: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Catalog Store
// ============================================================================

/// Persistence backend for the catalog.
///
/// Reads return only live rows (`deleted_at IS NULL`) and order children
/// deterministically: departments, majors and test types by name; schedules
/// and subjects by display order; admission infos by creation time.
pub trait CatalogStore: Send + Sync {
    /// Lists universities with their full sub-trees.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn list_universities(&self, page: Page, ctx: &OpContext)
    -> Result<Vec<University>, StoreError>;

    /// Loads one university with its full sub-tree.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_university(
        &self,
        id: UniversityId,
        ctx: &OpContext,
    ) -> Result<Option<University>, StoreError>;

    /// Finds universities whose own, department, or major name contains the
    /// query (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the search fails.
    fn search_universities(
        &self,
        query: &str,
        ctx: &OpContext,
    ) -> Result<Vec<University>, StoreError>;

    /// Loads a department sub-tree scoped to its university.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_department(
        &self,
        university_id: UniversityId,
        department_id: DepartmentId,
        ctx: &OpContext,
    ) -> Result<Option<Department>, StoreError>;

    /// Loads a major sub-tree scoped to its department.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_major(
        &self,
        department_id: DepartmentId,
        major_id: MajorId,
        ctx: &OpContext,
    ) -> Result<Option<Major>, StoreError>;

    /// Loads a schedule sub-tree scoped to its major.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_admission_schedule(
        &self,
        major_id: MajorId,
        schedule_id: AdmissionScheduleId,
        ctx: &OpContext,
    ) -> Result<Option<AdmissionSchedule>, StoreError>;

    /// Loads an admission info row scoped to its schedule.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_admission_info(
        &self,
        schedule_id: AdmissionScheduleId,
        info_id: AdmissionInfoId,
        ctx: &OpContext,
    ) -> Result<Option<AdmissionInfo>, StoreError>;

    /// Loads a test type with subjects scoped to its schedule.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_test_type(
        &self,
        schedule_id: AdmissionScheduleId,
        test_type_id: TestTypeId,
        ctx: &OpContext,
    ) -> Result<Option<TestType>, StoreError>;

    /// Loads a subject scoped to its test type.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_subject(
        &self,
        test_type_id: TestTypeId,
        subject_id: SubjectId,
        ctx: &OpContext,
    ) -> Result<Option<Subject>, StoreError>;

    /// Resolves the university that owns a live entity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn owning_university(
        &self,
        entity: EntityRef,
        ctx: &OpContext,
    ) -> Result<Option<UniversityId>, StoreError>;

    /// Lists filter options, optionally restricted to one category.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn list_filter_options(
        &self,
        category: Option<FilterCategory>,
        ctx: &OpContext,
    ) -> Result<Vec<FilterOption>, StoreError>;

    /// Loads one filter option.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_filter_option(
        &self,
        id: FilterOptionId,
        ctx: &OpContext,
    ) -> Result<Option<FilterOption>, StoreError>;

    /// Executes one command in a single transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the command fails; the transaction is
    /// rolled back.
    fn write(
        &self,
        command: &WriteCommand,
        options: &TxOptions,
        ctx: &OpContext,
    ) -> Result<WriteOutcome, StoreError>;

    /// Checks that the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot serve requests.
    fn readiness(&self) -> Result<(), StoreError>;
}

/// Shared catalog store handle.
pub type SharedCatalogStore = Arc<dyn CatalogStore>;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_reports_cancellation_before_deadline() {
        let ctx = OpContext::background();
        assert!(ctx.checkpoint().is_ok());
        ctx.cancellation().cancel();
        assert_eq!(ctx.checkpoint(), Err(StoreError::Cancelled));
    }

    #[test]
    fn checkpoint_reports_elapsed_deadline() {
        let ctx = OpContext::new(CancellationToken::new(), Some(Instant::now()));
        assert_eq!(ctx.checkpoint(), Err(StoreError::Timeout));
    }

    #[test]
    fn child_context_keeps_the_earlier_deadline() {
        let parent = OpContext::background().with_timeout(Duration::from_millis(10));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
        parent.cancellation().cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn page_limit_is_clamped() {
        assert_eq!(Page::new(0, 0).limit, 1);
        assert_eq!(Page::new(5, 50_000).limit, MAX_PAGE_LIMIT);
        assert_eq!(Page::default().limit, DEFAULT_PAGE_LIMIT);
    }
}
