use actix_web::{HttpResponse, Responder, web};
use chrono::Utc;
use serde::Deserialize;
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::AppResult;
use crate::model::attendance::local_date;
use crate::model::hr_request::{HrRequest, LeaveBalance, RequestStatus, UpdateRequest};
use crate::service::hr_request_engine::{
    self, CreateLateEarly, CreateLeave, CreateOvertime, RequestFilter, RequestPage,
};

#[derive(Deserialize, Default, ToSchema)]
pub struct DecisionNote {
    #[schema(example = "Enjoy the break")]
    pub note: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct LeaveBalanceQuery {
    /// Defaults to the caller
    pub employee_id: Option<u64>,
    /// Defaults to the current year
    pub year: Option<i32>,
}

/// List requests visible to the caller
#[utoipa::path(
    get,
    path = "/api/v1/requests",
    params(RequestFilter),
    responses(
        (status = 200, description = "Paginated requests, newest first", body = RequestPage),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Request"
)]
pub async fn list_requests(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    filter: web::Query<RequestFilter>,
) -> AppResult<impl Responder> {
    let page = hr_request_engine::find_all(pool.get_ref(), &auth, &filter).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Get a single request
#[utoipa::path(
    get,
    path = "/api/v1/requests/{id}",
    params(
        ("id" = u64, Path, description = "Request id")
    ),
    responses(
        (status = 200, description = "Request found", body = HrRequest),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not visible to the caller"),
        (status = 404, description = "Request not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Request"
)]
pub async fn get_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    let request = hr_request_engine::find_one(pool.get_ref(), path.into_inner(), &auth).await?;
    Ok(HttpResponse::Ok().json(request))
}

/// Apply for leave
#[utoipa::path(
    post,
    path = "/api/v1/requests/leave",
    request_body = CreateLeave,
    responses(
        (status = 201, description = "Leave request created", body = HrRequest, example = json!({
            "id": 1,
            "employee_id": 1000,
            "request_type": "LEAVE",
            "status": "pending",
            "leave_type": "annual",
            "start_date": "2026-01-10",
            "end_date": "2026-01-15",
            "total_days": 6,
            "reason": "Family trip",
            "approver_id": null,
            "approved_at": null,
            "approval_note": null,
            "created_at": "2026-01-02T09:00:00Z"
        })),
        (status = 400, description = "Invalid dates or overlapping leave", body = Object, example = json!({
            "error": "bad_request",
            "message": "Leave overlaps request 4 (2026-01-12 to 2026-01-13)"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Request"
)]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    body: web::Json<CreateLeave>,
) -> AppResult<impl Responder> {
    let employee_id = auth.require_employee()?;
    let today = local_date(Utc::now(), &config.attendance);
    let created =
        hr_request_engine::create_leave(pool.get_ref(), employee_id, body.into_inner(), today).await?;
    Ok(HttpResponse::Created().json(created))
}

/// Request overtime
#[utoipa::path(
    post,
    path = "/api/v1/requests/overtime",
    request_body = CreateOvertime,
    responses(
        (status = 201, description = "Overtime request created", body = HrRequest),
        (status = 400, description = "end_time must be after start_time"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Request"
)]
pub async fn create_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<CreateOvertime>,
) -> AppResult<impl Responder> {
    let employee_id = auth.require_employee()?;
    let created = hr_request_engine::create_overtime(pool.get_ref(), employee_id, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(created))
}

/// Report a late arrival or early departure
#[utoipa::path(
    post,
    path = "/api/v1/requests/late-early",
    request_body = CreateLateEarly,
    responses(
        (status = 201, description = "Late/early request created", body = HrRequest),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Request"
)]
pub async fn create_late_early(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<CreateLateEarly>,
) -> AppResult<impl Responder> {
    let employee_id = auth.require_employee()?;
    let created =
        hr_request_engine::create_late_early(pool.get_ref(), employee_id, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(created))
}

/// Edit an own pending request
#[utoipa::path(
    put,
    path = "/api/v1/requests/{id}",
    params(
        ("id" = u64, Path, description = "Request id")
    ),
    request_body = UpdateRequest,
    responses(
        (status = 200, description = "Request updated", body = HrRequest),
        (status = 400, description = "Not pending, not the owner, or invalid fields"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Request not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Request"
)]
pub async fn update_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
    body: web::Json<UpdateRequest>,
) -> AppResult<impl Responder> {
    let employee_id = auth.require_employee()?;
    let today = local_date(Utc::now(), &config.attendance);
    let updated = hr_request_engine::update(
        pool.get_ref(),
        path.into_inner(),
        employee_id,
        body.into_inner(),
        today,
    )
    .await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// Delete an own pending request
#[utoipa::path(
    delete,
    path = "/api/v1/requests/{id}",
    params(
        ("id" = u64, Path, description = "Request id")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Not pending or not the owner"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Request not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Request"
)]
pub async fn delete_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    let employee_id = auth.require_employee()?;
    hr_request_engine::delete(pool.get_ref(), path.into_inner(), employee_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn decide(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: Option<web::Json<DecisionNote>>,
    outcome: RequestStatus,
) -> AppResult<HttpResponse> {
    let note = body.map(|b| b.into_inner()).unwrap_or_default().note;
    let decided =
        hr_request_engine::decide(pool.get_ref(), path.into_inner(), &auth, outcome, note, Utc::now())
            .await?;
    Ok(HttpResponse::Ok().json(decided))
}

/// Approve a pending request
#[utoipa::path(
    put,
    path = "/api/v1/requests/{id}/approve",
    params(
        ("id" = u64, Path, description = "Request id")
    ),
    request_body(content = DecisionNote, description = "Optional approval note"),
    responses(
        (status = 200, description = "Request approved", body = HrRequest),
        (status = 400, description = "Request is not pending"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller may not decide for this employee"),
        (status = 404, description = "Request not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Request"
)]
pub async fn approve_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: Option<web::Json<DecisionNote>>,
) -> AppResult<impl Responder> {
    decide(auth, pool, path, body, RequestStatus::Approved).await
}

/// Reject a pending request
#[utoipa::path(
    put,
    path = "/api/v1/requests/{id}/reject",
    params(
        ("id" = u64, Path, description = "Request id")
    ),
    request_body(content = DecisionNote, description = "Optional rejection note"),
    responses(
        (status = 200, description = "Request rejected", body = HrRequest),
        (status = 400, description = "Request is not pending"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller may not decide for this employee"),
        (status = 404, description = "Request not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Request"
)]
pub async fn reject_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: Option<web::Json<DecisionNote>>,
) -> AppResult<impl Responder> {
    decide(auth, pool, path, body, RequestStatus::Rejected).await
}

/// Cancel an own pending request
#[utoipa::path(
    put,
    path = "/api/v1/requests/{id}/cancel",
    params(
        ("id" = u64, Path, description = "Request id")
    ),
    responses(
        (status = 200, description = "Request cancelled", body = HrRequest),
        (status = 400, description = "Not pending or not the owner"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Request not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Request"
)]
pub async fn cancel_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    let employee_id = auth.require_employee()?;
    let cancelled = hr_request_engine::cancel(pool.get_ref(), path.into_inner(), employee_id).await?;
    Ok(HttpResponse::Ok().json(cancelled))
}

/// Annual leave balance for a year
#[utoipa::path(
    get,
    path = "/api/v1/requests/leave-balance",
    params(LeaveBalanceQuery),
    responses(
        (status = 200, description = "Leave balance", body = LeaveBalance),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not allowed to view this employee"),
        (status = 404, description = "Employee not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Request"
)]
pub async fn leave_balance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<LeaveBalanceQuery>,
) -> AppResult<impl Responder> {
    let today = local_date(Utc::now(), &config.attendance);
    let balance = hr_request_engine::leave_balance(
        pool.get_ref(),
        &auth,
        query.employee_id,
        query.year,
        today,
        config.default_annual_leave_limit,
    )
    .await?;
    Ok(HttpResponse::Ok().json(balance))
}
