// crates/exam-catalog-store-sqlite/src/schema.rs
// ============================================================================
// Module: SQLite Catalog Schema
// Description: Table layout, constraints, and schema version bookkeeping.
// Purpose: Create or verify the relational catalog schema on startup.
// Dependencies: rusqlite, exam-catalog-core
// ============================================================================

//! ## Overview
//! Every parent → child link is a cascading foreign key, every table carries
//! `deleted_at`, and name uniqueness is enforced by partial unique indexes
//! that ignore soft-deleted rows. A single `store_meta` row records the
//! schema version; unknown versions fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use exam_catalog_core::EntityRef;
use exam_catalog_core::ResourceKind;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::store::SqliteStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Current schema version stored in `store_meta`.
pub const SCHEMA_VERSION: i64 = 1;

/// Catalog tables, constraints, and indexes.
const CATALOG_DDL: &str = "
CREATE TABLE IF NOT EXISTS universities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(name) > 0),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    deleted_at INTEGER,
    version INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1)
);
CREATE UNIQUE INDEX IF NOT EXISTS ux_universities_name
    ON universities (name) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS departments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    university_id INTEGER NOT NULL REFERENCES universities (id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(name) > 0),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    deleted_at INTEGER,
    version INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1)
);
CREATE INDEX IF NOT EXISTS idx_departments_university ON departments (university_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_departments_name
    ON departments (university_id, name) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS majors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    department_id INTEGER NOT NULL REFERENCES departments (id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(name) > 0),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    deleted_at INTEGER,
    version INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1)
);
CREATE INDEX IF NOT EXISTS idx_majors_department ON majors (department_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_majors_name
    ON majors (department_id, name) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS admission_schedules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    major_id INTEGER NOT NULL REFERENCES majors (id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(name) > 0),
    display_order INTEGER NOT NULL DEFAULT 0 CHECK (display_order >= 0),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    deleted_at INTEGER,
    version INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1)
);
CREATE INDEX IF NOT EXISTS idx_admission_schedules_major ON admission_schedules (major_id);

CREATE TABLE IF NOT EXISTS admission_infos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    admission_schedule_id INTEGER NOT NULL
        REFERENCES admission_schedules (id) ON DELETE CASCADE,
    enrollment INTEGER NOT NULL CHECK (enrollment > 0),
    academic_year INTEGER NOT NULL CHECK (academic_year BETWEEN 2000 AND 2100),
    valid_from INTEGER NOT NULL,
    valid_until INTEGER NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('active', 'archived', 'draft', 'published')),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    deleted_at INTEGER,
    version INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1),
    CHECK (valid_from <= valid_until)
);
CREATE INDEX IF NOT EXISTS idx_admission_infos_schedule
    ON admission_infos (admission_schedule_id);
CREATE INDEX IF NOT EXISTS idx_admission_infos_year_schedule
    ON admission_infos (academic_year, admission_schedule_id);

CREATE TABLE IF NOT EXISTS test_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    admission_schedule_id INTEGER NOT NULL
        REFERENCES admission_schedules (id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(name) > 0),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    deleted_at INTEGER,
    version INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1)
);
CREATE INDEX IF NOT EXISTS idx_test_types_schedule ON test_types (admission_schedule_id);

CREATE TABLE IF NOT EXISTS subjects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    test_type_id INTEGER NOT NULL REFERENCES test_types (id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(name) > 0),
    score REAL NOT NULL CHECK (score >= 0),
    percentage REAL NOT NULL DEFAULT 0 CHECK (percentage >= 0 AND percentage <= 100),
    display_order INTEGER NOT NULL DEFAULT 0 CHECK (display_order >= 0),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    deleted_at INTEGER,
    version INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1)
);
CREATE INDEX IF NOT EXISTS idx_subjects_test_type ON subjects (test_type_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_subjects_name
    ON subjects (test_type_id, name) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS filter_options (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    category TEXT NOT NULL CHECK (category IN ('REGION', 'PREFECTURE', 'SCHEDULE',
        'ACADEMIC_FIELD', 'CLASSIFICATION', 'SUB_CLASSIFICATION')),
    name TEXT NOT NULL CHECK (length(name) > 0),
    parent_id INTEGER REFERENCES filter_options (id) ON DELETE CASCADE,
    display_order INTEGER NOT NULL DEFAULT 0 CHECK (display_order >= 0),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    deleted_at INTEGER,
    version INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1)
);
CREATE INDEX IF NOT EXISTS idx_filter_options_category
    ON filter_options (category, display_order);
CREATE UNIQUE INDEX IF NOT EXISTS ux_filter_options_name
    ON filter_options (category, name) WHERE deleted_at IS NULL;
";

// ============================================================================
// SECTION: Aggregate Levels
// ============================================================================

/// One level of the University aggregate and its backing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Level {
    /// `universities`.
    University,
    /// `departments`.
    Department,
    /// `majors`.
    Major,
    /// `admission_schedules`.
    AdmissionSchedule,
    /// `admission_infos`.
    AdmissionInfo,
    /// `test_types`.
    TestType,
    /// `subjects`.
    Subject,
}

impl Level {
    /// Returns the backing table.
    pub(crate) const fn table(self) -> &'static str {
        match self {
            Self::University => "universities",
            Self::Department => "departments",
            Self::Major => "majors",
            Self::AdmissionSchedule => "admission_schedules",
            Self::AdmissionInfo => "admission_infos",
            Self::TestType => "test_types",
            Self::Subject => "subjects",
        }
    }

    /// Returns the column referencing the parent row.
    pub(crate) const fn parent_column(self) -> Option<&'static str> {
        match self {
            Self::University => None,
            Self::Department => Some("university_id"),
            Self::Major => Some("department_id"),
            Self::AdmissionSchedule => Some("major_id"),
            Self::AdmissionInfo | Self::TestType => Some("admission_schedule_id"),
            Self::Subject => Some("test_type_id"),
        }
    }

    /// Returns true when live siblings at this level carry unique names.
    pub(crate) const fn unique_name(self) -> bool {
        matches!(self, Self::University | Self::Department | Self::Major | Self::Subject)
    }

    /// Returns the parent level.
    pub(crate) const fn parent(self) -> Option<Self> {
        match self {
            Self::University => None,
            Self::Department => Some(Self::University),
            Self::Major => Some(Self::Department),
            Self::AdmissionSchedule => Some(Self::Major),
            Self::AdmissionInfo | Self::TestType => Some(Self::AdmissionSchedule),
            Self::Subject => Some(Self::TestType),
        }
    }

    /// Returns the direct child levels.
    pub(crate) const fn children(self) -> &'static [Self] {
        match self {
            Self::University => &[Self::Department],
            Self::Department => &[Self::Major],
            Self::Major => &[Self::AdmissionSchedule],
            Self::AdmissionSchedule => &[Self::AdmissionInfo, Self::TestType],
            Self::TestType => &[Self::Subject],
            Self::AdmissionInfo | Self::Subject => &[],
        }
    }

    /// Returns the resource kind used in errors.
    pub(crate) const fn resource(self) -> ResourceKind {
        match self {
            Self::University => ResourceKind::University,
            Self::Department => ResourceKind::Department,
            Self::Major => ResourceKind::Major,
            Self::AdmissionSchedule => ResourceKind::AdmissionSchedule,
            Self::AdmissionInfo => ResourceKind::AdmissionInfo,
            Self::TestType => ResourceKind::TestType,
            Self::Subject => ResourceKind::Subject,
        }
    }

    /// Returns the level of a referenced entity.
    pub(crate) const fn of(entity: EntityRef) -> Self {
        match entity {
            EntityRef::Department(_) => Self::Department,
            EntityRef::Major(_) => Self::Major,
            EntityRef::AdmissionSchedule(_) => Self::AdmissionSchedule,
            EntityRef::AdmissionInfo(_) => Self::AdmissionInfo,
            EntityRef::TestType(_) => Self::TestType,
            EntityRef::Subject(_) => Self::Subject,
        }
    }
}

// ============================================================================
// SECTION: Initialization
// ============================================================================

/// Initializes the catalog schema or validates the existing version.
pub(crate) fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            tx.execute_batch(CATALOG_DDL)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit()?;
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Tests use expect on in-memory fixtures.")]

    use super::*;

    #[test]
    fn every_level_except_the_root_names_its_parent_column() {
        let levels = [
            Level::University,
            Level::Department,
            Level::Major,
            Level::AdmissionSchedule,
            Level::AdmissionInfo,
            Level::TestType,
            Level::Subject,
        ];
        for level in levels {
            assert_eq!(level.parent().is_some(), level.parent_column().is_some());
            for child in level.children() {
                assert_eq!(child.parent(), Some(level));
            }
        }
    }

    #[test]
    fn schema_initializes_once_and_rejects_unknown_versions() {
        let mut connection = Connection::open_in_memory().expect("open");
        initialize_schema(&mut connection).expect("first init");
        initialize_schema(&mut connection).expect("second init is a no-op");
        connection.execute("UPDATE store_meta SET version = 99", []).expect("bump version");
        let err = initialize_schema(&mut connection).expect_err("version mismatch");
        assert!(matches!(err, SqliteStoreError::VersionMismatch(_)));
    }
}
