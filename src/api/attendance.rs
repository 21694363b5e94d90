use actix_web::{HttpRequest, HttpResponse, Responder, web};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::api::with_request_context;
use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::AppResult;
use crate::model::attendance::AttendanceRecord;
use crate::model::device::DeviceMetadata;
use crate::service::attendance_recorder::{
    self, ChallengeGrant, ChallengeRequest, Submission, SubmissionOutcome,
};
use crate::utils::db_utils::paging;

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct HistoryQuery {
    /// First day to include (YYYY-MM-DD)
    #[schema(example = "2026-01-01", format = "date", value_type = Option<String>)]
    pub from: Option<NaiveDate>,
    /// Last day to include (YYYY-MM-DD)
    #[schema(example = "2026-01-31", format = "date", value_type = Option<String>)]
    pub to: Option<NaiveDate>,
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    /// Items per page, at most 100
    pub per_page: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceListResponse {
    pub data: Vec<AttendanceRecord>,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 10)]
    pub per_page: u64,
    #[schema(example = 1)]
    pub total: i64,
}

/// Issue a one-time challenge for a check-in or check-out
#[utoipa::path(
    post,
    path = "/api/v1/attendance/challenge",
    request_body = ChallengeRequest,
    responses(
        (status = 200, description = "Challenge issued", body = ChallengeGrant, example = json!({
            "token": "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
            "expires_at": "2026-01-05T08:03:00Z",
            "device_id": 7,
            "device_status": "registered"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Device blocked or no employee profile"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn request_challenge(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    body: web::Json<ChallengeRequest>,
) -> AppResult<impl Responder> {
    let employee_id = auth.require_employee()?;
    let mut request = body.into_inner();
    request.metadata = with_request_context(request.metadata, &req, config.trust_proxy_headers);

    let grant = attendance_recorder::request_challenge(
        pool.get_ref(),
        &config.attendance,
        employee_id,
        &request,
        Utc::now(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(grant))
}

/// Submit a check-in or check-out against a previously issued challenge
#[utoipa::path(
    post,
    path = "/api/v1/attendance/submit",
    request_body = Submission,
    responses(
        (status = 200, description = "Attendance recorded", body = SubmissionOutcome),
        (status = 400, description = "Challenge expired/used/mismatched, or invalid transition", body = Object, example = json!({
            "error": "bad_request",
            "message": "Already checked in today"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Unknown or blocked device, or foreign challenge"),
        (status = 404, description = "Challenge not found, or no record to check out from"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn submit(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    body: web::Json<Submission>,
) -> AppResult<impl Responder> {
    let employee_id = auth.require_employee()?;
    let meta = with_request_context(DeviceMetadata::default(), &req, config.trust_proxy_headers);

    let outcome = attendance_recorder::submit(
        pool.get_ref(),
        &config.attendance,
        employee_id,
        body.into_inner(),
        &meta,
        Utc::now(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(outcome))
}

/// Today's record of the caller, `null` before the first check-in
#[utoipa::path(
    get,
    path = "/api/v1/attendance/today",
    responses(
        (status = 200, description = "Today's attendance record, or null", body = AttendanceRecord),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn today(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    let employee_id = auth.require_employee()?;
    let record =
        attendance_recorder::today(pool.get_ref(), &config.attendance, employee_id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Own attendance history, newest first
#[utoipa::path(
    get,
    path = "/api/v1/attendance",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Paginated attendance records", body = AttendanceListResponse),
        (status = 400, description = "Invalid range"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn history(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<HistoryQuery>,
) -> AppResult<impl Responder> {
    let employee_id = auth.require_employee()?;
    let (page, per_page, offset) = paging(query.page, query.per_page);

    let (data, total) =
        attendance_recorder::history(pool.get_ref(), employee_id, query.from, query.to, per_page, offset)
            .await?;

    Ok(HttpResponse::Ok().json(AttendanceListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

/// Delete an attendance record (super admin only)
#[utoipa::path(
    delete,
    path = "/api/v1/attendance/{id}",
    params(
        ("id" = u64, Path, description = "Attendance record id")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Super admin only"),
        (status = 404, description = "Record not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn delete_record(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    auth.require_super_admin()?;
    attendance_recorder::delete_record(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
