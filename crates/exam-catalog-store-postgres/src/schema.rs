// crates/exam-catalog-store-postgres/src/schema.rs
// ============================================================================
// Module: PostgreSQL Catalog Schema
// Description: Table layout, constraints, and schema version bookkeeping.
// Purpose: Create or verify the relational catalog schema on startup.
// Dependencies: postgres, exam-catalog-core
// ============================================================================

//! ## Overview
//! The layout mirrors the `SQLite` backend: cascading foreign keys, partial
//! unique indexes ignoring soft-deleted rows, and a `store_meta` version row.
//! Initialization holds a transaction-scoped advisory lock so concurrent
//! processes starting against an empty database do not race.

// ============================================================================
// SECTION: Imports
// ============================================================================

use exam_catalog_core::EntityRef;
use exam_catalog_core::ResourceKind;
use postgres::Client;

use crate::store::PostgresStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Current schema version stored in `store_meta`.
pub const SCHEMA_VERSION: i64 = 1;

/// Advisory lock key serializing schema initialization.
const SCHEMA_LOCK_KEY: i64 = 0x6578_616d_6361_74;

/// Catalog tables, constraints, and indexes.
const CATALOG_DDL: &str = r"
CREATE TABLE IF NOT EXISTS universities (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL CHECK (length(name) > 0),
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ,
    version BIGINT NOT NULL DEFAULT 1 CHECK (version >= 1)
);
CREATE UNIQUE INDEX IF NOT EXISTS ux_universities_name
    ON universities (name) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS departments (
    id BIGSERIAL PRIMARY KEY,
    university_id BIGINT NOT NULL REFERENCES universities (id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(name) > 0),
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ,
    version BIGINT NOT NULL DEFAULT 1 CHECK (version >= 1)
);
CREATE INDEX IF NOT EXISTS idx_departments_university ON departments (university_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_departments_name
    ON departments (university_id, name) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS majors (
    id BIGSERIAL PRIMARY KEY,
    department_id BIGINT NOT NULL REFERENCES departments (id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(name) > 0),
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ,
    version BIGINT NOT NULL DEFAULT 1 CHECK (version >= 1)
);
CREATE INDEX IF NOT EXISTS idx_majors_department ON majors (department_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_majors_name
    ON majors (department_id, name) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS admission_schedules (
    id BIGSERIAL PRIMARY KEY,
    major_id BIGINT NOT NULL REFERENCES majors (id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(name) > 0),
    display_order INTEGER NOT NULL DEFAULT 0 CHECK (display_order >= 0),
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ,
    version BIGINT NOT NULL DEFAULT 1 CHECK (version >= 1)
);
CREATE INDEX IF NOT EXISTS idx_admission_schedules_major ON admission_schedules (major_id);

CREATE TABLE IF NOT EXISTS admission_infos (
    id BIGSERIAL PRIMARY KEY,
    admission_schedule_id BIGINT NOT NULL
        REFERENCES admission_schedules (id) ON DELETE CASCADE,
    enrollment BIGINT NOT NULL CHECK (enrollment > 0),
    academic_year INTEGER NOT NULL CHECK (academic_year BETWEEN 2000 AND 2100),
    valid_from TIMESTAMPTZ NOT NULL,
    valid_until TIMESTAMPTZ NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('active', 'archived', 'draft', 'published')),
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ,
    version BIGINT NOT NULL DEFAULT 1 CHECK (version >= 1),
    CHECK (valid_from <= valid_until)
);
CREATE INDEX IF NOT EXISTS idx_admission_infos_schedule
    ON admission_infos (admission_schedule_id);
CREATE INDEX IF NOT EXISTS idx_admission_infos_year_schedule
    ON admission_infos (academic_year, admission_schedule_id);

CREATE TABLE IF NOT EXISTS test_types (
    id BIGSERIAL PRIMARY KEY,
    admission_schedule_id BIGINT NOT NULL
        REFERENCES admission_schedules (id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(name) > 0),
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ,
    version BIGINT NOT NULL DEFAULT 1 CHECK (version >= 1)
);
CREATE INDEX IF NOT EXISTS idx_test_types_schedule ON test_types (admission_schedule_id);

CREATE TABLE IF NOT EXISTS subjects (
    id BIGSERIAL PRIMARY KEY,
    test_type_id BIGINT NOT NULL REFERENCES test_types (id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(name) > 0),
    score DOUBLE PRECISION NOT NULL CHECK (score >= 0),
    percentage DOUBLE PRECISION NOT NULL DEFAULT 0
        CHECK (percentage >= 0 AND percentage <= 100),
    display_order INTEGER NOT NULL DEFAULT 0 CHECK (display_order >= 0),
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ,
    version BIGINT NOT NULL DEFAULT 1 CHECK (version >= 1)
);
CREATE INDEX IF NOT EXISTS idx_subjects_test_type ON subjects (test_type_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_subjects_name
    ON subjects (test_type_id, name) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS filter_options (
    id BIGSERIAL PRIMARY KEY,
    category TEXT NOT NULL CHECK (category IN ('REGION', 'PREFECTURE', 'SCHEDULE',
        'ACADEMIC_FIELD', 'CLASSIFICATION', 'SUB_CLASSIFICATION')),
    name TEXT NOT NULL CHECK (length(name) > 0),
    parent_id BIGINT REFERENCES filter_options (id) ON DELETE CASCADE,
    display_order INTEGER NOT NULL DEFAULT 0 CHECK (display_order >= 0),
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ,
    version BIGINT NOT NULL DEFAULT 1 CHECK (version >= 1)
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
pub(crate) fn initialize_schema(client: &mut Client) -> Result<(), PostgresStoreError> {
    let mut tx = client.transaction()?;
    tx.execute("SELECT pg_advisory_xact_lock($1)", &[&SCHEMA_LOCK_KEY])?;
    tx.batch_execute(
        "CREATE TABLE IF NOT EXISTS store_meta (
             id SMALLINT PRIMARY KEY CHECK (id = 1),
             version BIGINT NOT NULL
         );",
    )?;
    let version: Option<i64> = tx
        .query_opt("SELECT version FROM store_meta WHERE id = 1", &[])?
        .map(|row| row.try_get(0))
        .transpose()?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (id, version) VALUES (1, $1)", &[&SCHEMA_VERSION])?;
            tx.batch_execute(CATALOG_DDL)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(PostgresStoreError::VersionMismatch(format!(
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
    use super::*;

    #[test]
    fn child_levels_point_back_to_their_parent() {
        for level in [
            Level::University,
            Level::Department,
            Level::Major,
            Level::AdmissionSchedule,
            Level::TestType,
        ] {
            for child in level.children() {
                assert_eq!(child.parent(), Some(level));
                assert!(child.parent_column().is_some());
            }
        }
    }

    #[test]
    fn ddl_declares_every_level_table() {
        for level in [
            Level::University,
            Level::Department,
            Level::Major,
            Level::AdmissionSchedule,
            Level::AdmissionInfo,
            Level::TestType,
            Level::Subject,
        ] {
            let needle = format!("CREATE TABLE IF NOT EXISTS {} (", level.table());
            assert!(CATALOG_DDL.contains(&needle), "missing table {}", level.table());
        }
    }
}
