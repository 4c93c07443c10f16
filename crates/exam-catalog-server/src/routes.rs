// crates/exam-catalog-server/src/routes.rs
// ============================================================================
// Module: Catalog Routes
// Description: HTTP handlers for universities, nested entities, and filters.
// Purpose: Map requests onto catalog service calls with ownership checks.
// Dependencies: axum, exam-catalog-core
// ============================================================================

//! ## Overview
//! Handlers parse ids, verify that the addressed entity belongs to the
//! university in the path, call the service, and shape the response: 200 for
//! reads and updates, 201 for creates, 204 for deletes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use exam_catalog_core::AdmissionInfo;
use exam_catalog_core::AdmissionInfoId;
use exam_catalog_core::AdmissionSchedule;
use exam_catalog_core::AdmissionScheduleId;
use exam_catalog_core::DEFAULT_PAGE_LIMIT;
use exam_catalog_core::Department;
use exam_catalog_core::DepartmentId;
use exam_catalog_core::EntityRef;
use exam_catalog_core::FilterCategory;
use exam_catalog_core::FilterOption;
use exam_catalog_core::Major;
use exam_catalog_core::MajorId;
use exam_catalog_core::Page;
use exam_catalog_core::Subject;
use exam_catalog_core::SubjectId;
use exam_catalog_core::TestType;
use exam_catalog_core::TestTypeId;
use exam_catalog_core::University;
use exam_catalog_core::UniversityId;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::extract::RequestScope;
use crate::extract::checked_id;
use crate::extract::decode_with_presence;
use crate::extract::delete_mode;
use crate::extract::parse_id;
use crate::extract::query_number;
use crate::server::AppState;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Handler result.
type ApiResult = Result<Response, ApiError>;

/// Shared state extractor.
type AppStateRef = State<Arc<AppState>>;

/// Query string as raw pairs.
type RawQuery = Query<BTreeMap<String, String>>;

/// Batch subject update body.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubjectBatch {
    /// Test type whose subjects are replaced.
    pub test_type_id: u64,
    /// Subjects to upsert.
    pub subjects: Vec<Subject>,
}

/// Response for `/healthz`.
#[derive(Debug, Serialize)]
struct Health {
    /// Always `ok` on success.
    status: &'static str,
}

/// 200 with a JSON body.
fn ok<T: Serialize>(value: T) -> Response {
    Json(value).into_response()
}

/// 201 with a JSON body.
fn created<T: Serialize>(value: T) -> Response {
    (StatusCode::CREATED, Json(value)).into_response()
}

/// 204 without a body.
fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

// ============================================================================
// SECTION: Service Routes
// ============================================================================

/// `GET /healthz`
pub(crate) async fn healthz(State(state): AppStateRef) -> ApiResult {
    match state.service.readiness().await {
        Ok(()) => Ok(ok(Health {
            status: "ok",
        })),
        Err(error) => {
            tracing::warn!(error = %error, "readiness check failed");
            Err(ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "UNAVAILABLE",
                "the catalog store is unavailable",
            ))
        }
    }
}

/// `GET /csrf`
pub(crate) async fn issue_csrf(State(state): AppStateRef) -> ApiResult {
    Ok(ok(json!({ "token": state.csrf.issue() })))
}

// ============================================================================
// SECTION: Universities
// ============================================================================

/// `GET /api/universities`
pub(crate) async fn list_universities(State(state): AppStateRef, Query(query): RawQuery) -> ApiResult {
    let offset = query_number::<u64>(&query, "offset")?.unwrap_or(0);
    let limit = query_number::<u32>(&query, "limit")?.unwrap_or(DEFAULT_PAGE_LIMIT);
    let scope = RequestScope::new();
    let universities = state.service.find_all(Page::new(offset, limit), scope.ctx()).await?;
    Ok(ok(universities))
}

/// `GET /api/universities/search`
pub(crate) async fn search_universities(
    State(state): AppStateRef,
    Query(query): RawQuery,
) -> ApiResult {
    let term = query.get("q").map_or("", String::as_str);
    let scope = RequestScope::new();
    let universities = state.service.search(term, scope.ctx()).await?;
    Ok(ok(universities))
}

/// `POST /api/universities`
pub(crate) async fn create_university(
    State(state): AppStateRef,
    JsonBody(university): JsonBody<University>,
) -> ApiResult {
    let scope = RequestScope::new();
    let university = state.service.create_university(university, scope.ctx()).await?;
    Ok(created(university))
}

/// `GET /api/universities/{uid}`
pub(crate) async fn get_university(State(state): AppStateRef, Path(uid): Path<String>) -> ApiResult {
    let uid: UniversityId = parse_id("university id", &uid)?;
    let scope = RequestScope::new();
    let university = state.service.find_by_id(uid, scope.ctx()).await?;
    Ok(ok(university))
}

/// `PUT /api/universities/{uid}`; children are reconciled only when the body
/// carries `departments`.
pub(crate) async fn update_university(
    State(state): AppStateRef,
    Path(uid): Path<String>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult {
    let uid: UniversityId = parse_id("university id", &uid)?;
    let (university, replace_children): (University, bool) =
        decode_with_presence(body, "departments")?;
    let scope = RequestScope::new();
    let university =
        state.service.update_university(uid, university, replace_children, scope.ctx()).await?;
    Ok(ok(university))
}

/// `DELETE /api/universities/{uid}`
pub(crate) async fn delete_university(
    State(state): AppStateRef,
    Path(uid): Path<String>,
    Query(query): RawQuery,
) -> ApiResult {
    let uid: UniversityId = parse_id("university id", &uid)?;
    let mode = delete_mode(&query)?;
    let scope = RequestScope::new();
    state.service.delete_university(uid, mode, scope.ctx()).await?;
    Ok(no_content())
}

// ============================================================================
// SECTION: Departments
// ============================================================================

/// `POST /api/universities/{uid}/departments`
pub(crate) async fn create_department(
    State(state): AppStateRef,
    Path(uid): Path<String>,
    JsonBody(department): JsonBody<Department>,
) -> ApiResult {
    let uid: UniversityId = parse_id("university id", &uid)?;
    let scope = RequestScope::new();
    let department = state.service.create_department(uid, department, scope.ctx()).await?;
    Ok(created(department))
}

/// `GET /api/universities/{uid}/departments/{did}`
pub(crate) async fn get_department(
    State(state): AppStateRef,
    Path((uid, did)): Path<(String, String)>,
) -> ApiResult {
    let uid: UniversityId = parse_id("university id", &uid)?;
    let did: DepartmentId = parse_id("department id", &did)?;
    let scope = RequestScope::new();
    let department = state.service.find_department(uid, did, scope.ctx()).await?;
    Ok(ok(department))
}

/// `PUT /api/universities/{uid}/departments/{did}`
pub(crate) async fn update_department(
    State(state): AppStateRef,
    Path((uid, did)): Path<(String, String)>,
    JsonBody(department): JsonBody<Department>,
) -> ApiResult {
    let uid: UniversityId = parse_id("university id", &uid)?;
    let did: DepartmentId = parse_id("department id", &did)?;
    let scope = RequestScope::new();
    let department = state.service.update_department(uid, did, department, scope.ctx()).await?;
    Ok(ok(department))
}

/// `DELETE /api/universities/{uid}/departments/{did}`
pub(crate) async fn delete_department(
    State(state): AppStateRef,
    Path((uid, did)): Path<(String, String)>,
    Query(query): RawQuery,
) -> ApiResult {
    let uid: UniversityId = parse_id("university id", &uid)?;
    let did: DepartmentId = parse_id("department id", &did)?;
    let mode = delete_mode(&query)?;
    let scope = RequestScope::new();
    state.service.delete_department(uid, did, mode, scope.ctx()).await?;
    Ok(no_content())
}

/// `PUT /api/universities/{uid}/departments/{did}/subjects/batch`
pub(crate) async fn update_subjects_batch(
    State(state): AppStateRef,
    Path((uid, did)): Path<(String, String)>,
    JsonBody(batch): JsonBody<SubjectBatch>,
) -> ApiResult {
    let uid: UniversityId = parse_id("university id", &uid)?;
    let did: DepartmentId = parse_id("department id", &did)?;
    let tid: TestTypeId = checked_id("test_type_id", batch.test_type_id)?;
    let scope = RequestScope::new();
    let ctx = scope.ctx();
    state.service.ensure_owned(uid, EntityRef::Department(did), ctx).await?;
    state.service.ensure_owned(uid, EntityRef::TestType(tid), ctx).await?;
    let subjects = state.service.update_subjects_batch(tid, batch.subjects, ctx).await?;
    Ok(ok(subjects))
}

// ============================================================================
// SECTION: Majors
// ============================================================================

/// `POST /api/universities/{uid}/departments/{did}/majors`
pub(crate) async fn create_major(
    State(state): AppStateRef,
    Path((uid, did)): Path<(String, String)>,
    JsonBody(major): JsonBody<Major>,
) -> ApiResult {
    let uid: UniversityId = parse_id("university id", &uid)?;
    let did: DepartmentId = parse_id("department id", &did)?;
    let scope = RequestScope::new();
    let ctx = scope.ctx();
    state.service.ensure_parent_owned(uid, EntityRef::Department(did), ctx).await?;
    let major = state.service.create_major(did, major, ctx).await?;
    Ok(created(major))
}

/// Parses `{uid}/departments/{did}/majors/{mid}` and checks the department.
async fn major_scope(
    state: &AppState,
    (uid, did, mid): (String, String, String),
    scope: &RequestScope,
) -> Result<(DepartmentId, MajorId), ApiError> {
    let uid: UniversityId = parse_id("university id", &uid)?;
    let did: DepartmentId = parse_id("department id", &did)?;
    let mid: MajorId = parse_id("major id", &mid)?;
    state.service.ensure_owned(uid, EntityRef::Department(did), scope.ctx()).await?;
    Ok((did, mid))
}

/// `GET /api/universities/{uid}/departments/{did}/majors/{mid}`
pub(crate) async fn get_major(
    State(state): AppStateRef,
    Path(path): Path<(String, String, String)>,
) -> ApiResult {
    let scope = RequestScope::new();
    let (did, mid) = major_scope(&state, path, &scope).await?;
    let major = state.service.find_major(did, mid, scope.ctx()).await?;
    Ok(ok(major))
}

/// `PUT /api/universities/{uid}/departments/{did}/majors/{mid}`
pub(crate) async fn update_major(
    State(state): AppStateRef,
    Path(path): Path<(String, String, String)>,
    JsonBody(major): JsonBody<Major>,
) -> ApiResult {
    let scope = RequestScope::new();
    let (did, mid) = major_scope(&state, path, &scope).await?;
    let major = state.service.update_major(did, mid, major, scope.ctx()).await?;
    Ok(ok(major))
}

/// `DELETE /api/universities/{uid}/departments/{did}/majors/{mid}`
pub(crate) async fn delete_major(
    State(state): AppStateRef,
    Path(path): Path<(String, String, String)>,
    Query(query): RawQuery,
) -> ApiResult {
    let mode = delete_mode(&query)?;
    let scope = RequestScope::new();
    let (did, mid) = major_scope(&state, path, &scope).await?;
    state.service.delete_major(did, mid, mode, scope.ctx()).await?;
    Ok(no_content())
}

// ============================================================================
// SECTION: Admission Schedules
// ============================================================================

/// `POST /api/universities/{uid}/majors/{mid}/admission-schedules`
pub(crate) async fn create_admission_schedule(
    State(state): AppStateRef,
    Path((uid, mid)): Path<(String, String)>,
    JsonBody(schedule): JsonBody<AdmissionSchedule>,
) -> ApiResult {
    let uid: UniversityId = parse_id("university id", &uid)?;
    let mid: MajorId = parse_id("major id", &mid)?;
    let scope = RequestScope::new();
    let ctx = scope.ctx();
    state.service.ensure_parent_owned(uid, EntityRef::Major(mid), ctx).await?;
    let schedule = state.service.create_admission_schedule(mid, schedule, ctx).await?;
    Ok(created(schedule))
}

/// Parses `{uid}/majors/{mid}/admission-schedules/{sid}` and checks the major.
async fn schedule_scope(
    state: &AppState,
    (uid, mid, sid): (String, String, String),
    scope: &RequestScope,
) -> Result<(MajorId, AdmissionScheduleId), ApiError> {
    let uid: UniversityId = parse_id("university id", &uid)?;
    let mid: MajorId = parse_id("major id", &mid)?;
    let sid: AdmissionScheduleId = parse_id("admission schedule id", &sid)?;
    state.service.ensure_owned(uid, EntityRef::Major(mid), scope.ctx()).await?;
    Ok((mid, sid))
}

/// `GET /api/universities/{uid}/majors/{mid}/admission-schedules/{sid}`
pub(crate) async fn get_admission_schedule(
    State(state): AppStateRef,
    Path(path): Path<(String, String, String)>,
) -> ApiResult {
    let scope = RequestScope::new();
    let (mid, sid) = schedule_scope(&state, path, &scope).await?;
    let schedule = state.service.find_admission_schedule(mid, sid, scope.ctx()).await?;
    Ok(ok(schedule))
}

/// `PUT /api/universities/{uid}/majors/{mid}/admission-schedules/{sid}`
pub(crate) async fn update_admission_schedule(
    State(state): AppStateRef,
    Path(path): Path<(String, String, String)>,
    JsonBody(schedule): JsonBody<AdmissionSchedule>,
) -> ApiResult {
    let scope = RequestScope::new();
    let (mid, sid) = schedule_scope(&state, path, &scope).await?;
    let schedule =
        state.service.update_admission_schedule(mid, sid, schedule, scope.ctx()).await?;
    Ok(ok(schedule))
}

/// `DELETE /api/universities/{uid}/majors/{mid}/admission-schedules/{sid}`
pub(crate) async fn delete_admission_schedule(
    State(state): AppStateRef,
    Path(path): Path<(String, String, String)>,
    Query(query): RawQuery,
) -> ApiResult {
    let mode = delete_mode(&query)?;
    let scope = RequestScope::new();
    let (mid, sid) = schedule_scope(&state, path, &scope).await?;
    state.service.delete_admission_schedule(mid, sid, mode, scope.ctx()).await?;
    Ok(no_content())
}

// ============================================================================
// SECTION: Schedule Children
// ============================================================================

/// Parses `{uid}/admission-schedules/{sid}` and checks the schedule.
async fn owned_schedule(
    state: &AppState,
    uid: &str,
    sid: &str,
    scope: &RequestScope,
    parent: bool,
) -> Result<AdmissionScheduleId, ApiError> {
    let uid: UniversityId = parse_id("university id", uid)?;
    let sid: AdmissionScheduleId = parse_id("admission schedule id", sid)?;
    let entity = EntityRef::AdmissionSchedule(sid);
    if parent {
        state.service.ensure_parent_owned(uid, entity, scope.ctx()).await?;
    } else {
        state.service.ensure_owned(uid, entity, scope.ctx()).await?;
    }
    Ok(sid)
}

/// `POST /api/universities/{uid}/admission-schedules/{sid}/info`
pub(crate) async fn create_admission_info(
    State(state): AppStateRef,
    Path((uid, sid)): Path<(String, String)>,
    JsonBody(info): JsonBody<AdmissionInfo>,
) -> ApiResult {
    let scope = RequestScope::new();
    let sid = owned_schedule(&state, &uid, &sid, &scope, true).await?;
    let info = state.service.create_admission_info(sid, info, scope.ctx()).await?;
    Ok(created(info))
}

/// `GET /api/universities/{uid}/admission-schedules/{sid}/info/{iid}`
pub(crate) async fn get_admission_info(
    State(state): AppStateRef,
    Path((uid, sid, iid)): Path<(String, String, String)>,
) -> ApiResult {
    let iid: AdmissionInfoId = parse_id("admission info id", &iid)?;
    let scope = RequestScope::new();
    let sid = owned_schedule(&state, &uid, &sid, &scope, false).await?;
    let info = state.service.find_admission_info(sid, iid, scope.ctx()).await?;
    Ok(ok(info))
}

/// `PUT /api/universities/{uid}/admission-schedules/{sid}/info/{iid}`
pub(crate) async fn update_admission_info(
    State(state): AppStateRef,
    Path((uid, sid, iid)): Path<(String, String, String)>,
    JsonBody(info): JsonBody<AdmissionInfo>,
) -> ApiResult {
    let iid: AdmissionInfoId = parse_id("admission info id", &iid)?;
    let scope = RequestScope::new();
    let sid = owned_schedule(&state, &uid, &sid, &scope, false).await?;
    let info = state.service.update_admission_info(sid, iid, info, scope.ctx()).await?;
    Ok(ok(info))
}

/// `DELETE /api/universities/{uid}/admission-schedules/{sid}/info/{iid}`
pub(crate) async fn delete_admission_info(
    State(state): AppStateRef,
    Path((uid, sid, iid)): Path<(String, String, String)>,
    Query(query): RawQuery,
) -> ApiResult {
    let iid: AdmissionInfoId = parse_id("admission info id", &iid)?;
    let mode = delete_mode(&query)?;
    let scope = RequestScope::new();
    let sid = owned_schedule(&state, &uid, &sid, &scope, false).await?;
    state.service.delete_admission_info(sid, iid, mode, scope.ctx()).await?;
    Ok(no_content())
}

/// `POST /api/universities/{uid}/admission-schedules/{sid}/test-types`
pub(crate) async fn create_test_type(
    State(state): AppStateRef,
    Path((uid, sid)): Path<(String, String)>,
    JsonBody(test_type): JsonBody<TestType>,
) -> ApiResult {
    let scope = RequestScope::new();
    let sid = owned_schedule(&state, &uid, &sid, &scope, true).await?;
    let test_type = state.service.create_test_type(sid, test_type, scope.ctx()).await?;
    Ok(created(test_type))
}

/// `GET /api/universities/{uid}/admission-schedules/{sid}/test-types/{tid}`
pub(crate) async fn get_test_type(
    State(state): AppStateRef,
    Path((uid, sid, tid)): Path<(String, String, String)>,
) -> ApiResult {
    let tid: TestTypeId = parse_id("test type id", &tid)?;
    let scope = RequestScope::new();
    let sid = owned_schedule(&state, &uid, &sid, &scope, false).await?;
    let test_type = state.service.find_test_type(sid, tid, scope.ctx()).await?;
    Ok(ok(test_type))
}

/// `PUT /api/universities/{uid}/admission-schedules/{sid}/test-types/{tid}`
pub(crate) async fn update_test_type(
    State(state): AppStateRef,
    Path((uid, sid, tid)): Path<(String, String, String)>,
    JsonBody(test_type): JsonBody<TestType>,
) -> ApiResult {
    let tid: TestTypeId = parse_id("test type id", &tid)?;
    let scope = RequestScope::new();
    let sid = owned_schedule(&state, &uid, &sid, &scope, false).await?;
    let test_type = state.service.update_test_type(sid, tid, test_type, scope.ctx()).await?;
    Ok(ok(test_type))
}

/// `DELETE /api/universities/{uid}/admission-schedules/{sid}/test-types/{tid}`
pub(crate) async fn delete_test_type(
    State(state): AppStateRef,
    Path((uid, sid, tid)): Path<(String, String, String)>,
    Query(query): RawQuery,
) -> ApiResult {
    let tid: TestTypeId = parse_id("test type id", &tid)?;
    let mode = delete_mode(&query)?;
    let scope = RequestScope::new();
    let sid = owned_schedule(&state, &uid, &sid, &scope, false).await?;
    state.service.delete_test_type(sid, tid, mode, scope.ctx()).await?;
    Ok(no_content())
}

// ============================================================================
// SECTION: Subjects
// ============================================================================

/// Parses `{uid}/test-types/{tid}` and checks the test type.
async fn owned_test_type(
    state: &AppState,
    uid: &str,
    tid: &str,
    scope: &RequestScope,
    parent: bool,
) -> Result<TestTypeId, ApiError> {
    let uid: UniversityId = parse_id("university id", uid)?;
    let tid: TestTypeId = parse_id("test type id", tid)?;
    let entity = EntityRef::TestType(tid);
    if parent {
        state.service.ensure_parent_owned(uid, entity, scope.ctx()).await?;
    } else {
        state.service.ensure_owned(uid, entity, scope.ctx()).await?;
    }
    Ok(tid)
}

/// `POST /api/universities/{uid}/test-types/{tid}/subjects`
pub(crate) async fn create_subject(
    State(state): AppStateRef,
    Path((uid, tid)): Path<(String, String)>,
    JsonBody(subject): JsonBody<Subject>,
) -> ApiResult {
    let scope = RequestScope::new();
    let tid = owned_test_type(&state, &uid, &tid, &scope, true).await?;
    let subject = state.service.create_subject(tid, subject, scope.ctx()).await?;
    Ok(created(subject))
}

/// `GET /api/universities/{uid}/test-types/{tid}/subjects/{subid}`
pub(crate) async fn get_subject(
    State(state): AppStateRef,
    Path((uid, tid, subid)): Path<(String, String, String)>,
) -> ApiResult {
    let subid: SubjectId = parse_id("subject id", &subid)?;
    let scope = RequestScope::new();
    let tid = owned_test_type(&state, &uid, &tid, &scope, false).await?;
    let subject = state.service.find_subject(tid, subid, scope.ctx()).await?;
    Ok(ok(subject))
}

/// `PUT /api/universities/{uid}/test-types/{tid}/subjects/{subid}`
pub(crate) async fn update_subject(
    State(state): AppStateRef,
    Path((uid, tid, subid)): Path<(String, String, String)>,
    JsonBody(subject): JsonBody<Subject>,
) -> ApiResult {
    let subid: SubjectId = parse_id("subject id", &subid)?;
    let scope = RequestScope::new();
    let tid = owned_test_type(&state, &uid, &tid, &scope, false).await?;
    let subject = state.service.update_subject(tid, subid, subject, scope.ctx()).await?;
    Ok(ok(subject))
}

/// `DELETE /api/universities/{uid}/test-types/{tid}/subjects/{subid}`
pub(crate) async fn delete_subject(
    State(state): AppStateRef,
    Path((uid, tid, subid)): Path<(String, String, String)>,
    Query(query): RawQuery,
) -> ApiResult {
    let subid: SubjectId = parse_id("subject id", &subid)?;
    let mode = delete_mode(&query)?;
    let scope = RequestScope::new();
    let tid = owned_test_type(&state, &uid, &tid, &scope, false).await?;
    state.service.delete_subject(tid, subid, mode, scope.ctx()).await?;
    Ok(no_content())
}

// ============================================================================
// SECTION: Filter Options
// ============================================================================

/// `GET /api/filter-options`
pub(crate) async fn list_filter_options(
    State(state): AppStateRef,
    Query(query): RawQuery,
) -> ApiResult {
    let category = match query.get("category").map(|value| value.trim()) {
        None | Some("") => None,
        Some(label) => Some(FilterCategory::parse(label).ok_or_else(|| {
            ApiError::invalid_input(format!("unknown filter category {label}"))
        })?),
    };
    let scope = RequestScope::new();
    let options = state.service.list_filter_options(category, scope.ctx()).await?;
    Ok(ok(options))
}

/// `POST /api/filter-options`
pub(crate) async fn create_filter_option(
    State(state): AppStateRef,
    JsonBody(option): JsonBody<FilterOption>,
) -> ApiResult {
    let scope = RequestScope::new();
    let option = state.service.create_filter_option(option, scope.ctx()).await?;
    Ok(created(option))
}
