// crates/exam-catalog-store-postgres/src/loader.rs
// ============================================================================
// Module: PostgreSQL Catalog Loader
// Description: Nested aggregate reads with per-level array queries.
// Purpose: Rebuild University sub-trees from normalized rows.
// Dependencies: postgres, time, exam-catalog-core
// ============================================================================

//! ## Overview
//! Each level is fetched with a single `= ANY($1)` query over the parent ids
//! of the level above, grouped by parent in query order, then attached
//! bottom-up. Only live rows are returned. Text ordering uses the `"C"`
//! collation so results match byte order regardless of database locale.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use exam_catalog_core::AdmissionInfo;
use exam_catalog_core::AdmissionSchedule;
use exam_catalog_core::AdmissionStatus;
use exam_catalog_core::Department;
use exam_catalog_core::FilterCategory;
use exam_catalog_core::FilterOption;
use exam_catalog_core::Major;
use exam_catalog_core::OpContext;
use exam_catalog_core::Page;
use exam_catalog_core::RecordMeta;
use exam_catalog_core::Subject;
use exam_catalog_core::TestType;
use exam_catalog_core::University;
use postgres::Row;
use postgres::Transaction;
use postgres::types::FromSql;
use time::OffsetDateTime;

use crate::schema::Level;
use crate::store::PostgresStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Universities preloaded per batch.
const UNIVERSITY_BATCH: usize = 100;

/// University columns.
const UNIVERSITY_COLUMNS: &str = "id, name, created_at, updated_at, deleted_at, version";
/// Department columns.
const DEPARTMENT_COLUMNS: &str =
    "id, university_id, name, created_at, updated_at, deleted_at, version";
/// Major columns.
const MAJOR_COLUMNS: &str = "id, department_id, name, created_at, updated_at, deleted_at, version";
/// Admission schedule columns.
const SCHEDULE_COLUMNS: &str =
    "id, major_id, name, display_order, created_at, updated_at, deleted_at, version";
/// Admission info columns.
const INFO_COLUMNS: &str = "id, admission_schedule_id, enrollment, academic_year, valid_from, \
                            valid_until, status, created_at, updated_at, deleted_at, version";
/// Test type columns.
const TEST_TYPE_COLUMNS: &str =
    "id, admission_schedule_id, name, created_at, updated_at, deleted_at, version";
/// Subject columns.
const SUBJECT_COLUMNS: &str = "id, test_type_id, name, score, percentage, display_order, \
                               created_at, updated_at, deleted_at, version";
/// Filter option columns.
const FILTER_OPTION_COLUMNS: &str = "id, category, name, parent_id, display_order, created_at, \
                                     updated_at, deleted_at, version";

/// Ordering for name-sorted levels.
const BY_NAME: &str = "name COLLATE \"C\", id";

/// Children grouped by parent id, each group in query order.
type Grouped<T> = BTreeMap<u64, Vec<T>>;

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Returns the current time truncated to the microsecond precision of `TIMESTAMPTZ`.
pub(crate) fn now_micros() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(now.nanosecond() / 1_000 * 1_000).unwrap_or(now)
}

/// Converts a stored `BIGINT` key to an id.
pub(crate) fn to_id(value: i64) -> Result<u64, PostgresStoreError> {
    u64::try_from(value).map_err(|_| PostgresStoreError::Corrupt(format!("negative id {value}")))
}

/// Converts an id to a `BIGINT` parameter.
pub(crate) fn to_key(value: u64) -> Result<i64, PostgresStoreError> {
    i64::try_from(value)
        .map_err(|_| PostgresStoreError::Invalid(format!("id {value} exceeds bigint range")))
}

/// Converts ids to a `BIGINT[]` parameter.
pub(crate) fn to_keys(values: &[u64]) -> Result<Vec<i64>, PostgresStoreError> {
    values.iter().map(|value| to_key(*value)).collect()
}

/// Reads a column, reporting decode failures as corruption.
fn column<'a, T: FromSql<'a>>(row: &'a Row, index: usize) -> Result<T, PostgresStoreError> {
    row.try_get(index)
        .map_err(|err| PostgresStoreError::Corrupt(format!("column {index}: {err}")))
}

/// Reads a `BIGINT` key column as an id.
pub(crate) fn id_at(row: &Row, index: usize) -> Result<u64, PostgresStoreError> {
    to_id(column(row, index)?)
}

/// Reads the record header starting at `start`.
fn meta_at(row: &Row, start: usize) -> Result<RecordMeta, PostgresStoreError> {
    Ok(RecordMeta {
        created_at: Some(column(row, start)?),
        updated_at: Some(column(row, start + 1)?),
        deleted_at: column(row, start + 2)?,
        version: column(row, start + 3)?,
    })
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Maps a university row.
fn map_university(row: &Row) -> Result<University, PostgresStoreError> {
    Ok(University {
        id: Some(id_at(row, 0)?.into()),
        name: column(row, 1)?,
        departments: Vec::new(),
        meta: meta_at(row, 2)?,
    })
}

/// Maps a department row with its parent id.
fn map_department(row: &Row) -> Result<(u64, Department), PostgresStoreError> {
    let parent = id_at(row, 1)?;
    Ok((
        parent,
        Department {
            id: Some(id_at(row, 0)?.into()),
            university_id: Some(parent.into()),
            name: column(row, 2)?,
            majors: Vec::new(),
            meta: meta_at(row, 3)?,
        },
    ))
}

/// Maps a major row with its parent id.
fn map_major(row: &Row) -> Result<(u64, Major), PostgresStoreError> {
    let parent = id_at(row, 1)?;
    Ok((
        parent,
        Major {
            id: Some(id_at(row, 0)?.into()),
            department_id: Some(parent.into()),
            name: column(row, 2)?,
            admission_schedules: Vec::new(),
            meta: meta_at(row, 3)?,
        },
    ))
}

/// Maps an admission schedule row with its parent id.
fn map_schedule(row: &Row) -> Result<(u64, AdmissionSchedule), PostgresStoreError> {
    let parent = id_at(row, 1)?;
    Ok((
        parent,
        AdmissionSchedule {
            id: Some(id_at(row, 0)?.into()),
            major_id: Some(parent.into()),
            name: column(row, 2)?,
            display_order: column(row, 3)?,
            admission_infos: Vec::new(),
            test_types: Vec::new(),
            meta: meta_at(row, 4)?,
        },
    ))
}

/// Maps an admission info row with its parent id.
fn map_info(row: &Row) -> Result<(u64, AdmissionInfo), PostgresStoreError> {
    let parent = id_at(row, 1)?;
    let status: String = column(row, 6)?;
    Ok((
        parent,
        AdmissionInfo {
            id: Some(id_at(row, 0)?.into()),
            admission_schedule_id: Some(parent.into()),
            enrollment: column(row, 2)?,
            academic_year: column(row, 3)?,
            valid_from: column(row, 4)?,
            valid_until: column(row, 5)?,
            status: AdmissionStatus::from(status),
            meta: meta_at(row, 7)?,
        },
    ))
}

/// Maps a test type row with its parent id.
fn map_test_type(row: &Row) -> Result<(u64, TestType), PostgresStoreError> {
    let parent = id_at(row, 1)?;
    Ok((
        parent,
        TestType {
            id: Some(id_at(row, 0)?.into()),
            admission_schedule_id: Some(parent.into()),
            name: column(row, 2)?,
            subjects: Vec::new(),
            meta: meta_at(row, 3)?,
        },
    ))
}

/// Maps a subject row with its parent id.
fn map_subject(row: &Row) -> Result<(u64, Subject), PostgresStoreError> {
    let parent = id_at(row, 1)?;
    Ok((
        parent,
        Subject {
            id: Some(id_at(row, 0)?.into()),
            test_type_id: Some(parent.into()),
            name: column(row, 2)?,
            score: column(row, 3)?,
            percentage: column(row, 4)?,
            display_order: column(row, 5)?,
            meta: meta_at(row, 6)?,
        },
    ))
}

/// Maps a filter option row.
fn map_filter_option(row: &Row) -> Result<FilterOption, PostgresStoreError> {
    let label: String = column(row, 1)?;
    let category = FilterCategory::parse(&label)
        .ok_or_else(|| PostgresStoreError::Corrupt(format!("unknown filter category: {label}")))?;
    let parent: Option<i64> = column(row, 3)?;
    Ok(FilterOption {
        id: Some(id_at(row, 0)?.into()),
        category,
        name: column(row, 2)?,
        parent_id: parent.map(to_id).transpose()?.map(Into::into),
        display_order: column(row, 4)?,
        meta: meta_at(row, 5)?,
    })
}

// ============================================================================
// SECTION: Query Helpers
// ============================================================================

/// Loads live children of `parent_ids`, grouped by parent in `order`.
fn children<T>(
    tx: &mut Transaction<'_>,
    ctx: &OpContext,
    level: Level,
    columns: &str,
    order: &str,
    parent_ids: &[u64],
    map: fn(&Row) -> Result<(u64, T), PostgresStoreError>,
) -> Result<Grouped<T>, PostgresStoreError> {
    let mut grouped: Grouped<T> = BTreeMap::new();
    let Some(parent_column) = level.parent_column() else {
        return Ok(grouped);
    };
    if parent_ids.is_empty() {
        return Ok(grouped);
    }
    ctx.checkpoint()?;
    let sql = format!(
        "SELECT {columns} FROM {} WHERE deleted_at IS NULL AND {parent_column} = ANY($1) ORDER \
         BY {order}",
        level.table()
    );
    let keys = to_keys(parent_ids)?;
    for row in tx.query(sql.as_str(), &[&keys])? {
        let (parent, item) = map(&row)?;
        grouped.entry(parent).or_default().push(item);
    }
    Ok(grouped)
}

/// Collects the ids of every grouped child.
fn child_ids<T>(grouped: &Grouped<T>, id: impl Fn(&T) -> Option<u64>) -> Vec<u64> {
    grouped.values().flatten().filter_map(id).collect()
}

/// Returns live child ids of the given parents.
pub(crate) fn live_child_ids(
    tx: &mut Transaction<'_>,
    level: Level,
    parent_ids: &[u64],
) -> Result<Vec<u64>, PostgresStoreError> {
    let Some(parent_column) = level.parent_column() else {
        return Ok(Vec::new());
    };
    if parent_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id FROM {} WHERE deleted_at IS NULL AND {parent_column} = ANY($1) ORDER BY id",
        level.table()
    );
    let keys = to_keys(parent_ids)?;
    tx.query(sql.as_str(), &[&keys])?.iter().map(|row| id_at(row, 0)).collect()
}

/// Returns true when a live row exists, optionally scoped to its parent.
pub(crate) fn is_live(
    tx: &mut Transaction<'_>,
    level: Level,
    id: u64,
    parent: Option<u64>,
) -> Result<bool, PostgresStoreError> {
    let table = level.table();
    let key = to_key(id)?;
    let row = match (level.parent_column(), parent) {
        (Some(column), Some(parent)) => tx.query_opt(
            format!("SELECT 1 FROM {table} WHERE id = $1 AND {column} = $2 AND deleted_at IS NULL")
                .as_str(),
            &[&key, &to_key(parent)?],
        )?,
        _ => tx.query_opt(
            format!("SELECT 1 FROM {table} WHERE id = $1 AND deleted_at IS NULL").as_str(),
            &[&key],
        )?,
    };
    Ok(row.is_some())
}

/// Resolves the university owning a live row by walking parent links.
pub(crate) fn owning_university(
    tx: &mut Transaction<'_>,
    level: Level,
    id: u64,
) -> Result<Option<u64>, PostgresStoreError> {
    let mut level = level;
    let mut id = id;
    loop {
        let (Some(column), Some(parent_level)) = (level.parent_column(), level.parent()) else {
            return Ok(is_live(tx, level, id, None)?.then_some(id));
        };
        let sql =
            format!("SELECT {column} FROM {} WHERE id = $1 AND deleted_at IS NULL", level.table());
        let Some(row) = tx.query_opt(sql.as_str(), &[&to_key(id)?])? else {
            return Ok(None);
        };
        level = parent_level;
        id = id_at(&row, 0)?;
    }
}

/// Escapes LIKE wildcards so the query matches literally.
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

// ============================================================================
// SECTION: Level Loaders
// ============================================================================

/// Loads subjects of the given test types.
fn subjects_by_test_type(
    tx: &mut Transaction<'_>,
    ctx: &OpContext,
    test_type_ids: &[u64],
) -> Result<Grouped<Subject>, PostgresStoreError> {
    children(
        tx,
        ctx,
        Level::Subject,
        SUBJECT_COLUMNS,
        "display_order, id",
        test_type_ids,
        map_subject,
    )
}

/// Loads test types (with subjects) of the given schedules.
fn test_types_by_schedule(
    tx: &mut Transaction<'_>,
    ctx: &OpContext,
    schedule_ids: &[u64],
) -> Result<Grouped<TestType>, PostgresStoreError> {
    let mut grouped =
        children(tx, ctx, Level::TestType, TEST_TYPE_COLUMNS, BY_NAME, schedule_ids, map_test_type)?;
    let ids = child_ids(&grouped, |test_type| test_type.id.map(u64::from));
    let mut subjects = subjects_by_test_type(tx, ctx, &ids)?;
    for test_type in grouped.values_mut().flatten() {
        if let Some(id) = test_type.id {
            test_type.subjects = subjects.remove(&id.get()).unwrap_or_default();
        }
    }
    Ok(grouped)
}

/// Loads admission infos of the given schedules.
fn infos_by_schedule(
    tx: &mut Transaction<'_>,
    ctx: &OpContext,
    schedule_ids: &[u64],
) -> Result<Grouped<AdmissionInfo>, PostgresStoreError> {
    children(
        tx,
        ctx,
        Level::AdmissionInfo,
        INFO_COLUMNS,
        "created_at, id",
        schedule_ids,
        map_info,
    )
}

/// Loads schedules (with infos and test types) of the given majors.
fn schedules_by_major(
    tx: &mut Transaction<'_>,
    ctx: &OpContext,
    major_ids: &[u64],
) -> Result<Grouped<AdmissionSchedule>, PostgresStoreError> {
    let mut grouped = children(
        tx,
        ctx,
        Level::AdmissionSchedule,
        SCHEDULE_COLUMNS,
        "display_order, id",
        major_ids,
        map_schedule,
    )?;
    let ids = child_ids(&grouped, |schedule| schedule.id.map(u64::from));
    let mut infos = infos_by_schedule(tx, ctx, &ids)?;
    let mut test_types = test_types_by_schedule(tx, ctx, &ids)?;
    for schedule in grouped.values_mut().flatten() {
        if let Some(id) = schedule.id {
            schedule.admission_infos = infos.remove(&id.get()).unwrap_or_default();
            schedule.test_types = test_types.remove(&id.get()).unwrap_or_default();
        }
    }
    Ok(grouped)
}

/// Loads majors (with sub-trees) of the given departments.
fn majors_by_department(
    tx: &mut Transaction<'_>,
    ctx: &OpContext,
    department_ids: &[u64],
) -> Result<Grouped<Major>, PostgresStoreError> {
    let mut grouped =
        children(tx, ctx, Level::Major, MAJOR_COLUMNS, BY_NAME, department_ids, map_major)?;
    let ids = child_ids(&grouped, |major| major.id.map(u64::from));
    let mut schedules = schedules_by_major(tx, ctx, &ids)?;
    for major in grouped.values_mut().flatten() {
        if let Some(id) = major.id {
            major.admission_schedules = schedules.remove(&id.get()).unwrap_or_default();
        }
    }
    Ok(grouped)
}

/// Loads departments (with sub-trees) of the given universities.
fn departments_by_university(
    tx: &mut Transaction<'_>,
    ctx: &OpContext,
    university_ids: &[u64],
) -> Result<Grouped<Department>, PostgresStoreError> {
    let mut grouped = children(
        tx,
        ctx,
        Level::Department,
        DEPARTMENT_COLUMNS,
        BY_NAME,
        university_ids,
        map_department,
    )?;
    let ids = child_ids(&grouped, |department| department.id.map(u64::from));
    let mut majors = majors_by_department(tx, ctx, &ids)?;
    for department in grouped.values_mut().flatten() {
        if let Some(id) = department.id {
            department.majors = majors.remove(&id.get()).unwrap_or_default();
        }
    }
    Ok(grouped)
}

// ============================================================================
// SECTION: Aggregate Reads
// ============================================================================

/// Loads universities by id (ordered by id) with full sub-trees.
pub(crate) fn universities_by_ids(
    tx: &mut Transaction<'_>,
    ctx: &OpContext,
    ids: &[u64],
) -> Result<Vec<University>, PostgresStoreError> {
    let mut universities = Vec::with_capacity(ids.len());
    for batch in ids.chunks(UNIVERSITY_BATCH) {
        ctx.checkpoint()?;
        let sql = format!(
            "SELECT {UNIVERSITY_COLUMNS} FROM universities WHERE deleted_at IS NULL AND id = \
             ANY($1) ORDER BY id"
        );
        let keys = to_keys(batch)?;
        let mut loaded = tx
            .query(sql.as_str(), &[&keys])?
            .iter()
            .map(map_university)
            .collect::<Result<Vec<_>, _>>()?;
        let mut departments = departments_by_university(tx, ctx, batch)?;
        for university in &mut loaded {
            if let Some(id) = university.id {
                university.departments = departments.remove(&id.get()).unwrap_or_default();
            }
        }
        universities.append(&mut loaded);
    }
    Ok(universities)
}

/// Lists live university ids for a page.
pub(crate) fn university_ids(
    tx: &mut Transaction<'_>,
    page: Page,
) -> Result<Vec<u64>, PostgresStoreError> {
    let offset = i64::try_from(page.offset).unwrap_or(i64::MAX);
    let limit = i64::from(page.limit);
    tx.query(
        "SELECT id FROM universities WHERE deleted_at IS NULL ORDER BY id LIMIT $1 OFFSET $2",
        &[&limit, &offset],
    )?
    .iter()
    .map(|row| id_at(row, 0))
    .collect()
}

/// Finds ids of universities whose own, department, or major name matches.
pub(crate) fn search_university_ids(
    tx: &mut Transaction<'_>,
    query: &str,
) -> Result<Vec<u64>, PostgresStoreError> {
    let pattern = like_pattern(query);
    tx.query(
        "SELECT DISTINCT u.id FROM universities u
         LEFT JOIN departments d ON d.university_id = u.id AND d.deleted_at IS NULL
         LEFT JOIN majors m ON m.department_id = d.id AND m.deleted_at IS NULL
         WHERE u.deleted_at IS NULL AND (
             u.name ILIKE $1 ESCAPE '\\'
             OR d.name ILIKE $1 ESCAPE '\\'
             OR m.name ILIKE $1 ESCAPE '\\')
         ORDER BY u.id",
        &[&pattern],
    )?
    .iter()
    .map(|row| id_at(row, 0))
    .collect()
}

/// Loads one university with its sub-tree.
pub(crate) fn university(
    tx: &mut Transaction<'_>,
    ctx: &OpContext,
    id: u64,
) -> Result<Option<University>, PostgresStoreError> {
    Ok(universities_by_ids(tx, ctx, &[id])?.into_iter().next())
}

/// Loads one department sub-tree scoped to its university.
pub(crate) fn department(
    tx: &mut Transaction<'_>,
    ctx: &OpContext,
    university_id: u64,
    department_id: u64,
) -> Result<Option<Department>, PostgresStoreError> {
    if !is_live(tx, Level::Department, department_id, Some(university_id))? {
        return Ok(None);
    }
    let Some(mut department) =
        single_row(tx, ctx, Level::Department, DEPARTMENT_COLUMNS, department_id, map_department)?
    else {
        return Ok(None);
    };
    department.majors =
        majors_by_department(tx, ctx, &[department_id])?.remove(&department_id).unwrap_or_default();
    Ok(Some(department))
}

/// Loads one major sub-tree scoped to its department.
pub(crate) fn major(
    tx: &mut Transaction<'_>,
    ctx: &OpContext,
    department_id: u64,
    major_id: u64,
) -> Result<Option<Major>, PostgresStoreError> {
    if !is_live(tx, Level::Major, major_id, Some(department_id))? {
        return Ok(None);
    }
    let Some(mut major) = single_row(tx, ctx, Level::Major, MAJOR_COLUMNS, major_id, map_major)?
    else {
        return Ok(None);
    };
    major.admission_schedules =
        schedules_by_major(tx, ctx, &[major_id])?.remove(&major_id).unwrap_or_default();
    Ok(Some(major))
}

/// Loads one schedule sub-tree scoped to its major.
pub(crate) fn admission_schedule(
    tx: &mut Transaction<'_>,
    ctx: &OpContext,
    major_id: u64,
    schedule_id: u64,
) -> Result<Option<AdmissionSchedule>, PostgresStoreError> {
    if !is_live(tx, Level::AdmissionSchedule, schedule_id, Some(major_id))? {
        return Ok(None);
    }
    let Some(mut schedule) =
        single_row(tx, ctx, Level::AdmissionSchedule, SCHEDULE_COLUMNS, schedule_id, map_schedule)?
    else {
        return Ok(None);
    };
    schedule.admission_infos =
        infos_by_schedule(tx, ctx, &[schedule_id])?.remove(&schedule_id).unwrap_or_default();
    schedule.test_types =
        test_types_by_schedule(tx, ctx, &[schedule_id])?.remove(&schedule_id).unwrap_or_default();
    Ok(Some(schedule))
}

/// Loads one admission info scoped to its schedule.
pub(crate) fn admission_info(
    tx: &mut Transaction<'_>,
    ctx: &OpContext,
    schedule_id: u64,
    info_id: u64,
) -> Result<Option<AdmissionInfo>, PostgresStoreError> {
    if !is_live(tx, Level::AdmissionInfo, info_id, Some(schedule_id))? {
        return Ok(None);
    }
    single_row(tx, ctx, Level::AdmissionInfo, INFO_COLUMNS, info_id, map_info)
}

/// Loads one test type with subjects scoped to its schedule.
pub(crate) fn test_type(
    tx: &mut Transaction<'_>,
    ctx: &OpContext,
    schedule_id: u64,
    test_type_id: u64,
) -> Result<Option<TestType>, PostgresStoreError> {
    if !is_live(tx, Level::TestType, test_type_id, Some(schedule_id))? {
        return Ok(None);
    }
    let Some(mut test_type) =
        single_row(tx, ctx, Level::TestType, TEST_TYPE_COLUMNS, test_type_id, map_test_type)?
    else {
        return Ok(None);
    };
    test_type.subjects = subjects_of(tx, ctx, test_type_id)?;
    Ok(Some(test_type))
}

/// Loads one subject scoped to its test type.
pub(crate) fn subject(
    tx: &mut Transaction<'_>,
    ctx: &OpContext,
    test_type_id: u64,
    subject_id: u64,
) -> Result<Option<Subject>, PostgresStoreError> {
    if !is_live(tx, Level::Subject, subject_id, Some(test_type_id))? {
        return Ok(None);
    }
    single_row(tx, ctx, Level::Subject, SUBJECT_COLUMNS, subject_id, map_subject)
}

/// Loads the live subjects of a test type in display order.
pub(crate) fn subjects_of(
    tx: &mut Transaction<'_>,
    ctx: &OpContext,
    test_type_id: u64,
) -> Result<Vec<Subject>, PostgresStoreError> {
    Ok(subjects_by_test_type(tx, ctx, &[test_type_id])?.remove(&test_type_id).unwrap_or_default())
}

/// Loads a single live row by id without its children.
fn single_row<T>(
    tx: &mut Transaction<'_>,
    ctx: &OpContext,
    level: Level,
    columns: &str,
    id: u64,
    map: fn(&Row) -> Result<(u64, T), PostgresStoreError>,
) -> Result<Option<T>, PostgresStoreError> {
    ctx.checkpoint()?;
    let sql =
        format!("SELECT {columns} FROM {} WHERE id = $1 AND deleted_at IS NULL", level.table());
    tx.query_opt(sql.as_str(), &[&to_key(id)?])?
        .map(|row| map(&row).map(|(_, item)| item))
        .transpose()
}

// ============================================================================
// SECTION: Filter Options
// ============================================================================

/// Lists live filter options, optionally for one category.
pub(crate) fn filter_options(
    tx: &mut Transaction<'_>,
    category: Option<FilterCategory>,
) -> Result<Vec<FilterOption>, PostgresStoreError> {
    let label = category.map(FilterCategory::as_str);
    let sql = format!(
        "SELECT {FILTER_OPTION_COLUMNS} FROM filter_options WHERE deleted_at IS NULL AND \
         ($1::TEXT IS NULL OR category = $1) ORDER BY category, display_order, id"
    );
    tx.query(sql.as_str(), &[&label])?.iter().map(map_filter_option).collect()
}

/// Loads one live filter option.
pub(crate) fn filter_option(
    tx: &mut Transaction<'_>,
    id: u64,
) -> Result<Option<FilterOption>, PostgresStoreError> {
    let sql = format!(
        "SELECT {FILTER_OPTION_COLUMNS} FROM filter_options WHERE id = $1 AND deleted_at IS NULL"
    );
    tx.query_opt(sql.as_str(), &[&to_key(id)?])?.as_ref().map(map_filter_option).transpose()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards_and_keeps_case() {
        assert_eq!(like_pattern("Tokyo"), "%Tokyo%");
        assert_eq!(like_pattern("100%_a\\b"), "%100\\%\\_a\\\\b%");
    }

    #[test]
    fn ids_outside_bigint_range_are_rejected() {
        assert_eq!(to_key(42).ok(), Some(42));
        assert!(matches!(to_key(u64::MAX), Err(PostgresStoreError::Invalid(_))));
        assert!(matches!(to_id(-1), Err(PostgresStoreError::Corrupt(_))));
    }

    #[test]
    fn transaction_clock_has_microsecond_precision() {
        assert_eq!(now_micros().nanosecond() % 1_000, 0);
    }
}
