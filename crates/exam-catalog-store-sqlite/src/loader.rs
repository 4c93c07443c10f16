// crates/exam-catalog-store-sqlite/src/loader.rs
// ============================================================================
// Module: SQLite Catalog Loader
// Description: Nested aggregate reads with per-level batch queries.
// Purpose: Rebuild University sub-trees from normalized rows.
// Dependencies: rusqlite, time, exam-catalog-core
// ============================================================================

//! ## Overview
//! Sub-trees are loaded level by level: one `IN (…)` query per level (split
//! into bounded chunks) instead of one query per parent. Rows are grouped by
//! parent id in query order, then attached bottom-up. Only live rows
//! (`deleted_at IS NULL`) are returned, with explicit column lists and a
//! deterministic order at every level.

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
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use rusqlite::types::Type;
use time::OffsetDateTime;

use crate::schema::Level;
use crate::store::SqliteStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Universities preloaded per batch.
pub(crate) const UNIVERSITY_BATCH: usize = 100;
/// Maximum bound parameters per `IN (…)` list.
pub(crate) const IN_CHUNK: usize = 500;

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

/// Children grouped by parent id, each group in query order.
type Grouped<T> = BTreeMap<u64, Vec<T>>;

// ============================================================================
// SECTION: Time Encoding
// ============================================================================

/// Converts a timestamp to UTC epoch milliseconds.
pub(crate) fn to_millis(value: OffsetDateTime) -> i64 {
    i64::try_from(value.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

/// Returns the current time in UTC epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    to_millis(OffsetDateTime::now_utc())
}

/// Reads an epoch-millisecond column as a UTC timestamp.
fn time_at(row: &Row<'_>, index: usize) -> rusqlite::Result<OffsetDateTime> {
    let millis: i64 = row.get(index)?;
    decode_millis(millis, index)
}

/// Reads a nullable epoch-millisecond column.
fn optional_time_at(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<OffsetDateTime>> {
    let millis: Option<i64> = row.get(index)?;
    millis.map(|value| decode_millis(value, index)).transpose()
}

/// Decodes epoch milliseconds.
fn decode_millis(millis: i64, index: usize) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(index, Type::Integer, Box::new(err)))
}

/// Reads the record header starting at `start`.
fn meta_at(row: &Row<'_>, start: usize) -> rusqlite::Result<RecordMeta> {
    Ok(RecordMeta {
        created_at: Some(time_at(row, start)?),
        updated_at: Some(time_at(row, start + 1)?),
        deleted_at: optional_time_at(row, start + 2)?,
        version: row.get(start + 3)?,
    })
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Maps a university row.
fn map_university(row: &Row<'_>) -> rusqlite::Result<University> {
    Ok(University {
        id: Some(row.get::<_, u64>(0)?.into()),
        name: row.get(1)?,
        departments: Vec::new(),
        meta: meta_at(row, 2)?,
    })
}

/// Maps a department row with its parent id.
fn map_department(row: &Row<'_>) -> rusqlite::Result<(u64, Department)> {
    let parent: u64 = row.get(1)?;
    Ok((
        parent,
        Department {
            id: Some(row.get::<_, u64>(0)?.into()),
            university_id: Some(parent.into()),
            name: row.get(2)?,
            majors: Vec::new(),
            meta: meta_at(row, 3)?,
        },
    ))
}

/// Maps a major row with its parent id.
fn map_major(row: &Row<'_>) -> rusqlite::Result<(u64, Major)> {
    let parent: u64 = row.get(1)?;
    Ok((
        parent,
        Major {
            id: Some(row.get::<_, u64>(0)?.into()),
            department_id: Some(parent.into()),
            name: row.get(2)?,
            admission_schedules: Vec::new(),
            meta: meta_at(row, 3)?,
        },
    ))
}

/// Maps an admission schedule row with its parent id.
fn map_schedule(row: &Row<'_>) -> rusqlite::Result<(u64, AdmissionSchedule)> {
    let parent: u64 = row.get(1)?;
    Ok((
        parent,
        AdmissionSchedule {
            id: Some(row.get::<_, u64>(0)?.into()),
            major_id: Some(parent.into()),
            name: row.get(2)?,
            display_order: row.get(3)?,
            admission_infos: Vec::new(),
            test_types: Vec::new(),
            meta: meta_at(row, 4)?,
        },
    ))
}

/// Maps an admission info row with its parent id.
fn map_info(row: &Row<'_>) -> rusqlite::Result<(u64, AdmissionInfo)> {
    let parent: u64 = row.get(1)?;
    Ok((
        parent,
        AdmissionInfo {
            id: Some(row.get::<_, u64>(0)?.into()),
            admission_schedule_id: Some(parent.into()),
            enrollment: row.get(2)?,
            academic_year: row.get(3)?,
            valid_from: time_at(row, 4)?,
            valid_until: time_at(row, 5)?,
            status: AdmissionStatus::from(row.get::<_, String>(6)?),
            meta: meta_at(row, 7)?,
        },
    ))
}

/// Maps a test type row with its parent id.
fn map_test_type(row: &Row<'_>) -> rusqlite::Result<(u64, TestType)> {
    let parent: u64 = row.get(1)?;
    Ok((
        parent,
        TestType {
            id: Some(row.get::<_, u64>(0)?.into()),
            admission_schedule_id: Some(parent.into()),
            name: row.get(2)?,
            subjects: Vec::new(),
            meta: meta_at(row, 3)?,
        },
    ))
}

/// Maps a subject row with its parent id.
fn map_subject(row: &Row<'_>) -> rusqlite::Result<(u64, Subject)> {
    let parent: u64 = row.get(1)?;
    Ok((
        parent,
        Subject {
            id: Some(row.get::<_, u64>(0)?.into()),
            test_type_id: Some(parent.into()),
            name: row.get(2)?,
            score: row.get(3)?,
            percentage: row.get(4)?,
            display_order: row.get(5)?,
            meta: meta_at(row, 6)?,
        },
    ))
}

/// Maps a filter option row.
fn map_filter_option(row: &Row<'_>) -> rusqlite::Result<FilterOption> {
    let label: String = row.get(1)?;
    let category = FilterCategory::parse(&label).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            format!("unknown filter category: {label}").into(),
        )
    })?;
    Ok(FilterOption {
        id: Some(row.get::<_, u64>(0)?.into()),
        category,
        name: row.get(2)?,
        parent_id: row.get::<_, Option<u64>>(3)?.map(Into::into),
        display_order: row.get(4)?,
        meta: meta_at(row, 5)?,
    })
}

// ============================================================================
// SECTION: Query Helpers
// ============================================================================

/// Returns `?start, ?start+1, …` for `count` parameters.
pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start .. start + count).map(|index| format!("?{index}")).collect::<Vec<_>>().join(", ")
}

/// Loads live children of `parent_ids`, grouped by parent in `order`.
fn children<T>(
    conn: &Connection,
    ctx: &OpContext,
    level: Level,
    columns: &str,
    order: &str,
    parent_ids: &[u64],
    map: fn(&Row<'_>) -> rusqlite::Result<(u64, T)>,
) -> Result<Grouped<T>, SqliteStoreError> {
    let mut grouped: Grouped<T> = BTreeMap::new();
    let Some(parent_column) = level.parent_column() else {
        return Ok(grouped);
    };
    for chunk in parent_ids.chunks(IN_CHUNK) {
        ctx.checkpoint()?;
        let sql = format!(
            "SELECT {columns} FROM {} WHERE deleted_at IS NULL AND {parent_column} IN ({}) ORDER \
             BY {order}",
            level.table(),
            placeholders(1, chunk.len())
        );
        let mut statement = conn.prepare_cached(&sql)?;
        let rows = statement
            .query_map(rusqlite::params_from_iter(chunk.iter()), map)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (parent, item) in rows {
            grouped.entry(parent).or_default().push(item);
        }
    }
    Ok(grouped)
}

/// Collects the ids of every grouped child.
fn child_ids<T>(grouped: &Grouped<T>, id: impl Fn(&T) -> Option<u64>) -> Vec<u64> {
    grouped.values().flatten().filter_map(id).collect()
}

/// Returns live child ids of the given parents.
pub(crate) fn live_child_ids(
    conn: &Connection,
    level: Level,
    parent_ids: &[u64],
) -> Result<Vec<u64>, SqliteStoreError> {
    let mut ids = Vec::new();
    let Some(parent_column) = level.parent_column() else {
        return Ok(ids);
    };
    for chunk in parent_ids.chunks(IN_CHUNK) {
        let sql = format!(
            "SELECT id FROM {} WHERE deleted_at IS NULL AND {parent_column} IN ({}) ORDER BY id",
            level.table(),
            placeholders(1, chunk.len())
        );
        let mut statement = conn.prepare_cached(&sql)?;
        let chunk_ids = statement
            .query_map(rusqlite::params_from_iter(chunk.iter()), |row| row.get::<_, u64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        ids.extend(chunk_ids);
    }
    Ok(ids)
}

/// Returns true when a live row exists, optionally scoped to its parent.
pub(crate) fn is_live(
    conn: &Connection,
    level: Level,
    id: u64,
    parent: Option<u64>,
) -> Result<bool, SqliteStoreError> {
    let table = level.table();
    let exists = match (level.parent_column(), parent) {
        (Some(column), Some(parent)) => conn
            .prepare_cached(&format!(
                "SELECT 1 FROM {table} WHERE id = ?1 AND {column} = ?2 AND deleted_at IS NULL"
            ))?
            .exists(params![id, parent])?,
        _ => conn
            .prepare_cached(&format!("SELECT 1 FROM {table} WHERE id = ?1 AND deleted_at IS NULL"))?
            .exists(params![id])?,
    };
    Ok(exists)
}

/// Resolves the university owning a live row by walking parent links.
pub(crate) fn owning_university(
    conn: &Connection,
    level: Level,
    id: u64,
) -> Result<Option<u64>, SqliteStoreError> {
    let mut level = level;
    let mut id = id;
    loop {
        let (Some(column), Some(parent_level)) = (level.parent_column(), level.parent()) else {
            return Ok(is_live(conn, level, id, None)?.then_some(id));
        };
        let sql =
            format!("SELECT {column} FROM {} WHERE id = ?1 AND deleted_at IS NULL", level.table());
        let parent: Option<u64> =
            conn.prepare_cached(&sql)?.query_row(params![id], |row| row.get(0)).optional()?;
        let Some(parent) = parent else {
            return Ok(None);
        };
        level = parent_level;
        id = parent;
    }
}

/// Escapes LIKE wildcards so the query matches literally.
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for ch in query.to_lowercase().chars() {
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
    conn: &Connection,
    ctx: &OpContext,
    test_type_ids: &[u64],
) -> Result<Grouped<Subject>, SqliteStoreError> {
    children(
        conn,
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
    conn: &Connection,
    ctx: &OpContext,
    schedule_ids: &[u64],
) -> Result<Grouped<TestType>, SqliteStoreError> {
    let mut grouped = children(
        conn,
        ctx,
        Level::TestType,
        TEST_TYPE_COLUMNS,
        "name, id",
        schedule_ids,
        map_test_type,
    )?;
    let ids = child_ids(&grouped, |test_type| test_type.id.map(u64::from));
    let mut subjects = subjects_by_test_type(conn, ctx, &ids)?;
    for test_type in grouped.values_mut().flatten() {
        if let Some(id) = test_type.id {
            test_type.subjects = subjects.remove(&id.get()).unwrap_or_default();
        }
    }
    Ok(grouped)
}

/// Loads admission infos of the given schedules.
fn infos_by_schedule(
    conn: &Connection,
    ctx: &OpContext,
    schedule_ids: &[u64],
) -> Result<Grouped<AdmissionInfo>, SqliteStoreError> {
    children(
        conn,
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
    conn: &Connection,
    ctx: &OpContext,
    major_ids: &[u64],
) -> Result<Grouped<AdmissionSchedule>, SqliteStoreError> {
    let mut grouped = children(
        conn,
        ctx,
        Level::AdmissionSchedule,
        SCHEDULE_COLUMNS,
        "display_order, id",
        major_ids,
        map_schedule,
    )?;
    let ids = child_ids(&grouped, |schedule| schedule.id.map(u64::from));
    let mut infos = infos_by_schedule(conn, ctx, &ids)?;
    let mut test_types = test_types_by_schedule(conn, ctx, &ids)?;
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
    conn: &Connection,
    ctx: &OpContext,
    department_ids: &[u64],
) -> Result<Grouped<Major>, SqliteStoreError> {
    let mut grouped = children(
        conn,
        ctx,
        Level::Major,
        MAJOR_COLUMNS,
        "name, id",
        department_ids,
        map_major,
    )?;
    let ids = child_ids(&grouped, |major| major.id.map(u64::from));
    let mut schedules = schedules_by_major(conn, ctx, &ids)?;
    for major in grouped.values_mut().flatten() {
        if let Some(id) = major.id {
            major.admission_schedules = schedules.remove(&id.get()).unwrap_or_default();
        }
    }
    Ok(grouped)
}

/// Loads departments (with sub-trees) of the given universities.
fn departments_by_university(
    conn: &Connection,
    ctx: &OpContext,
    university_ids: &[u64],
) -> Result<Grouped<Department>, SqliteStoreError> {
    let mut grouped = children(
        conn,
        ctx,
        Level::Department,
        DEPARTMENT_COLUMNS,
        "name, id",
        university_ids,
        map_department,
    )?;
    let ids = child_ids(&grouped, |department| department.id.map(u64::from));
    let mut majors = majors_by_department(conn, ctx, &ids)?;
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
    conn: &Connection,
    ctx: &OpContext,
    ids: &[u64],
) -> Result<Vec<University>, SqliteStoreError> {
    let mut universities = Vec::with_capacity(ids.len());
    for batch in ids.chunks(UNIVERSITY_BATCH) {
        ctx.checkpoint()?;
        let sql = format!(
            "SELECT {UNIVERSITY_COLUMNS} FROM universities WHERE deleted_at IS NULL AND id IN \
             ({}) ORDER BY id",
            placeholders(1, batch.len())
        );
        let mut statement = conn.prepare_cached(&sql)?;
        let mut loaded = statement
            .query_map(rusqlite::params_from_iter(batch.iter()), map_university)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut departments = departments_by_university(conn, ctx, batch)?;
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
pub(crate) fn university_ids(conn: &Connection, page: Page) -> Result<Vec<u64>, SqliteStoreError> {
    let offset = i64::try_from(page.offset).unwrap_or(i64::MAX);
    let mut statement = conn.prepare_cached(
        "SELECT id FROM universities WHERE deleted_at IS NULL ORDER BY id LIMIT ?1 OFFSET ?2",
    )?;
    let ids = statement
        .query_map(params![page.limit, offset], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<u64>>>()?;
    Ok(ids)
}

/// Finds ids of universities whose own, department, or major name matches.
pub(crate) fn search_university_ids(
    conn: &Connection,
    query: &str,
) -> Result<Vec<u64>, SqliteStoreError> {
    let mut statement = conn.prepare_cached(
        "SELECT DISTINCT u.id FROM universities u
         LEFT JOIN departments d ON d.university_id = u.id AND d.deleted_at IS NULL
         LEFT JOIN majors m ON m.department_id = d.id AND m.deleted_at IS NULL
         WHERE u.deleted_at IS NULL AND (
             lower(u.name) LIKE ?1 ESCAPE '\\'
             OR lower(d.name) LIKE ?1 ESCAPE '\\'
             OR lower(m.name) LIKE ?1 ESCAPE '\\')
         ORDER BY u.id",
    )?;
    let pattern = like_pattern(query);
    let ids = statement
        .query_map(params![pattern], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<u64>>>()?;
    Ok(ids)
}

/// Loads one university with its sub-tree.
pub(crate) fn university(
    conn: &Connection,
    ctx: &OpContext,
    id: u64,
) -> Result<Option<University>, SqliteStoreError> {
    Ok(universities_by_ids(conn, ctx, &[id])?.into_iter().next())
}

/// Loads one department sub-tree scoped to its university.
pub(crate) fn department(
    conn: &Connection,
    ctx: &OpContext,
    university_id: u64,
    department_id: u64,
) -> Result<Option<Department>, SqliteStoreError> {
    if !is_live(conn, Level::Department, department_id, Some(university_id))? {
        return Ok(None);
    }
    let Some(mut department) =
        single_child(conn, ctx, Level::Department, DEPARTMENT_COLUMNS, department_id, map_department)?
    else {
        return Ok(None);
    };
    department.majors =
        majors_by_department(conn, ctx, &[department_id])?.remove(&department_id).unwrap_or_default();
    Ok(Some(department))
}

/// Loads one major sub-tree scoped to its department.
pub(crate) fn major(
    conn: &Connection,
    ctx: &OpContext,
    department_id: u64,
    major_id: u64,
) -> Result<Option<Major>, SqliteStoreError> {
    if !is_live(conn, Level::Major, major_id, Some(department_id))? {
        return Ok(None);
    }
    let Some(mut major) = single_child(conn, ctx, Level::Major, MAJOR_COLUMNS, major_id, map_major)?
    else {
        return Ok(None);
    };
    major.admission_schedules =
        schedules_by_major(conn, ctx, &[major_id])?.remove(&major_id).unwrap_or_default();
    Ok(Some(major))
}

/// Loads one schedule sub-tree scoped to its major.
pub(crate) fn admission_schedule(
    conn: &Connection,
    ctx: &OpContext,
    major_id: u64,
    schedule_id: u64,
) -> Result<Option<AdmissionSchedule>, SqliteStoreError> {
    if !is_live(conn, Level::AdmissionSchedule, schedule_id, Some(major_id))? {
        return Ok(None);
    }
    let Some(mut schedule) =
        single_child(conn, ctx, Level::AdmissionSchedule, SCHEDULE_COLUMNS, schedule_id, map_schedule)?
    else {
        return Ok(None);
    };
    schedule.admission_infos =
        infos_by_schedule(conn, ctx, &[schedule_id])?.remove(&schedule_id).unwrap_or_default();
    schedule.test_types =
        test_types_by_schedule(conn, ctx, &[schedule_id])?.remove(&schedule_id).unwrap_or_default();
    Ok(Some(schedule))
}

/// Loads one admission info scoped to its schedule.
pub(crate) fn admission_info(
    conn: &Connection,
    ctx: &OpContext,
    schedule_id: u64,
    info_id: u64,
) -> Result<Option<AdmissionInfo>, SqliteStoreError> {
    if !is_live(conn, Level::AdmissionInfo, info_id, Some(schedule_id))? {
        return Ok(None);
    }
    single_child(conn, ctx, Level::AdmissionInfo, INFO_COLUMNS, info_id, map_info)
}

/// Loads one test type with subjects scoped to its schedule.
pub(crate) fn test_type(
    conn: &Connection,
    ctx: &OpContext,
    schedule_id: u64,
    test_type_id: u64,
) -> Result<Option<TestType>, SqliteStoreError> {
    if !is_live(conn, Level::TestType, test_type_id, Some(schedule_id))? {
        return Ok(None);
    }
    let Some(mut test_type) =
        single_child(conn, ctx, Level::TestType, TEST_TYPE_COLUMNS, test_type_id, map_test_type)?
    else {
        return Ok(None);
    };
    test_type.subjects = subjects_of(conn, ctx, test_type_id)?;
    Ok(Some(test_type))
}

/// Loads one subject scoped to its test type.
pub(crate) fn subject(
    conn: &Connection,
    ctx: &OpContext,
    test_type_id: u64,
    subject_id: u64,
) -> Result<Option<Subject>, SqliteStoreError> {
    if !is_live(conn, Level::Subject, subject_id, Some(test_type_id))? {
        return Ok(None);
    }
    single_child(conn, ctx, Level::Subject, SUBJECT_COLUMNS, subject_id, map_subject)
}

/// Loads the live subjects of a test type in display order.
pub(crate) fn subjects_of(
    conn: &Connection,
    ctx: &OpContext,
    test_type_id: u64,
) -> Result<Vec<Subject>, SqliteStoreError> {
    Ok(subjects_by_test_type(conn, ctx, &[test_type_id])?.remove(&test_type_id).unwrap_or_default())
}

/// Loads a single live row by id without its children.
fn single_child<T>(
    conn: &Connection,
    ctx: &OpContext,
    level: Level,
    columns: &str,
    id: u64,
    map: fn(&Row<'_>) -> rusqlite::Result<(u64, T)>,
) -> Result<Option<T>, SqliteStoreError> {
    ctx.checkpoint()?;
    let sql =
        format!("SELECT {columns} FROM {} WHERE id = ?1 AND deleted_at IS NULL", level.table());
    let row = conn.prepare_cached(&sql)?.query_row(params![id], map).optional()?;
    Ok(row.map(|(_, item)| item))
}

// ============================================================================
// SECTION: Filter Options
// ============================================================================

/// Lists live filter options, optionally for one category.
pub(crate) fn filter_options(
    conn: &Connection,
    category: Option<FilterCategory>,
) -> Result<Vec<FilterOption>, SqliteStoreError> {
    let label = category.map(FilterCategory::as_str);
    let sql = format!(
        "SELECT {FILTER_OPTION_COLUMNS} FROM filter_options WHERE deleted_at IS NULL AND (?1 IS \
         NULL OR category = ?1) ORDER BY category, display_order, id"
    );
    let mut statement = conn.prepare_cached(&sql)?;
    let options = statement
        .query_map(params![label], map_filter_option)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(options)
}

/// Loads one live filter option.
pub(crate) fn filter_option(
    conn: &Connection,
    id: u64,
) -> Result<Option<FilterOption>, SqliteStoreError> {
    let sql = format!(
        "SELECT {FILTER_OPTION_COLUMNS} FROM filter_options WHERE id = ?1 AND deleted_at IS NULL"
    );
    Ok(conn.prepare_cached(&sql)?.query_row(params![id], map_filter_option).optional()?)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards_and_lowercases() {
        assert_eq!(like_pattern("Tokyo"), "%tokyo%");
        assert_eq!(like_pattern("100%_a\\b"), "%100\\%\\_a\\\\b%");
    }

    #[test]
    fn placeholders_are_numbered_from_start() {
        assert_eq!(placeholders(1, 3), "?1, ?2, ?3");
        assert_eq!(placeholders(2, 1), "?2");
    }

    #[test]
    fn millisecond_encoding_truncates_sub_millisecond_precision() {
        let value = time::macros::datetime!(2025-04-01 09:00:00.123_456 UTC);
        let millis = to_millis(value);
        assert_eq!(millis % 1_000, 123);
        let decoded = decode_millis(millis, 0).unwrap_or(OffsetDateTime::UNIX_EPOCH);
        assert_eq!(decoded, time::macros::datetime!(2025-04-01 09:00:00.123 UTC));
    }
}
