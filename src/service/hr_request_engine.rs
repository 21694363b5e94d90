use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::model::employee::Placement;
use crate::model::hr_request::{
    HrRequest, HrRequestRow, LateEarlyType, LeaveBalance, LeaveType, RequestPayload, RequestStatus,
    RequestType, UpdateRequest, ranges_overlap,
};
use crate::model::role::Role;
use crate::service::employees;
use crate::service::policy::{self, Actor};
use crate::utils::db_utils::{FilterValue, paging};

const REQUEST_COLUMNS: &str = r#"
    r.id, r.employee_id, r.request_type, r.status, r.reason,
    r.leave_type, r.start_date, r.end_date, r.total_days,
    r.request_date, r.start_time, r.end_time, r.overtime_hours,
    r.late_early_type, r.actual_time, r.minutes,
    r.approver_id, r.approved_at, r.approval_note, r.created_at
"#;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLeave {
    pub leave_type: LeaveType,
    #[schema(example = "2026-01-10", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-15", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOvertime {
    #[schema(example = "2026-01-10", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = "18:00:00", value_type = String)]
    pub start_time: NaiveTime,
    #[schema(example = "20:30:00", value_type = String)]
    pub end_time: NaiveTime,
    pub reason: Option<String>,
}

/// `minutes` and `actual_time` are taken as reported by the employee.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLateEarly {
    #[schema(example = "2026-01-10", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub late_early_type: LateEarlyType,
    #[schema(example = "08:40:00", value_type = Option<String>)]
    pub actual_time: Option<NaiveTime>,
    #[schema(example = 25)]
    pub minutes: Option<i32>,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct RequestFilter {
    /// Ignored for callers who may only see their own requests
    pub employee_id: Option<u64>,
    pub request_type: Option<RequestType>,
    pub status: Option<RequestStatus>,
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    /// Items per page, at most 100
    pub per_page: Option<u64>,
}

/// Which rows of `hr_requests` a viewer may list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All { employee_id: Option<u64> },
    /// Same department, strictly lower rank.
    Department { department_id: u64, below_level: i32, employee_id: Option<u64> },
    Own(u64),
    Nothing,
}

pub fn visibility_scope(viewer: &Actor, own_employee_id: Option<u64>, requested: Option<u64>) -> Scope {
    match viewer.role {
        Role::SuperAdmin => Scope::All { employee_id: requested },
        Role::Manager => match viewer.placement {
            Some(Placement {
                department_id,
                position_level,
            }) => Scope::Department {
                department_id,
                below_level: position_level,
                employee_id: requested,
            },
            None => Scope::Nothing,
        },
        Role::Employee => match own_employee_id {
            Some(id) => Scope::Own(id),
            None => Scope::Nothing,
        },
    }
}

/// First PENDING/APPROVED leave whose range intersects `[start, end]`.
pub fn find_overlap<'a>(
    existing: &'a [HrRequest],
    start: NaiveDate,
    end: NaiveDate,
    exclude_id: Option<u64>,
) -> Option<&'a HrRequest> {
    existing.iter().find(|req| {
        Some(req.id()) != exclude_id
            && matches!(req.status(), RequestStatus::Pending | RequestStatus::Approved)
            && req
                .payload
                .leave_range()
                .is_some_and(|(s, e)| ranges_overlap(start, end, s, e))
    })
}

impl Scope {
    fn push_where(&self, where_sql: &mut String, args: &mut Vec<FilterValue>) {
        match *self {
            Scope::All { employee_id } => {
                if let Some(id) = employee_id {
                    where_sql.push_str(" AND r.employee_id = ?");
                    args.push(FilterValue::U64(id));
                }
            }
            Scope::Department {
                department_id,
                below_level,
                employee_id,
            } => {
                where_sql.push_str(" AND e.department_id = ? AND p.level > ?");
                args.push(FilterValue::U64(department_id));
                args.push(FilterValue::I32(below_level));
                if let Some(id) = employee_id {
                    where_sql.push_str(" AND r.employee_id = ?");
                    args.push(FilterValue::U64(id));
                }
            }
            Scope::Own(id) => {
                where_sql.push_str(" AND r.employee_id = ?");
                args.push(FilterValue::U64(id));
            }
            Scope::Nothing => where_sql.push_str(" AND 1=0"),
        }
    }
}

async fn load(conn: &mut MySqlConnection, request_id: u64, for_update: bool) -> AppResult<HrRequest> {
    let sql = format!(
        "SELECT {REQUEST_COLUMNS} FROM hr_requests r WHERE r.id = ?{}",
        if for_update { " FOR UPDATE" } else { "" }
    );
    let row = sqlx::query_as::<_, HrRequestRow>(&sql)
        .bind(request_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Request {request_id} not found")))?;
    HrRequest::try_from(row)
}

async fn active_leaves(conn: &mut MySqlConnection, employee_id: u64) -> AppResult<Vec<HrRequest>> {
    let sql = format!(
        r#"
        SELECT {REQUEST_COLUMNS}
        FROM hr_requests r
        WHERE r.employee_id = ? AND r.request_type = ? AND r.status IN (?, ?)
        "#
    );
    sqlx::query_as::<_, HrRequestRow>(&sql)
        .bind(employee_id)
        .bind(RequestType::Leave.as_ref())
        .bind(RequestStatus::Pending.as_ref())
        .bind(RequestStatus::Approved.as_ref())
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(HrRequest::try_from)
        .collect()
}

async fn ensure_no_overlap(
    conn: &mut MySqlConnection,
    employee_id: u64,
    payload: &RequestPayload,
    exclude_id: Option<u64>,
) -> AppResult<()> {
    let Some((start, end)) = payload.leave_range() else {
        return Ok(());
    };
    let existing = active_leaves(conn, employee_id).await?;
    if let Some(clash) = find_overlap(&existing, start, end, exclude_id) {
        let (s, e) = clash.payload.leave_range().unwrap_or((start, end));
        return Err(AppError::bad_request(format!(
            "Leave overlaps request {} ({s} to {e})",
            clash.id()
        )));
    }
    Ok(())
}

/// Type specific columns of a payload, `None` where they do not apply.
#[derive(Default)]
struct PayloadColumns {
    leave_type: Option<&'static str>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    total_days: Option<i32>,
    request_date: Option<NaiveDate>,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
    overtime_hours: Option<f64>,
    late_early_type: Option<&'static str>,
    actual_time: Option<NaiveTime>,
    minutes: Option<i32>,
}

impl From<&RequestPayload> for PayloadColumns {
    fn from(payload: &RequestPayload) -> Self {
        match *payload {
            RequestPayload::Leave {
                leave_type,
                start_date,
                end_date,
                total_days,
            } => PayloadColumns {
                leave_type: Some(leave_type.into()),
                start_date: Some(start_date),
                end_date: Some(end_date),
                total_days: Some(total_days),
                ..Default::default()
            },
            RequestPayload::Overtime {
                date,
                start_time,
                end_time,
                hours,
            } => PayloadColumns {
                request_date: Some(date),
                start_time: Some(start_time),
                end_time: Some(end_time),
                overtime_hours: Some(hours),
                ..Default::default()
            },
            RequestPayload::LateEarly {
                date,
                kind,
                actual_time,
                minutes,
            } => PayloadColumns {
                request_date: Some(date),
                late_early_type: Some(kind.into()),
                actual_time,
                minutes,
                ..Default::default()
            },
        }
    }
}

async fn insert(
    conn: &mut MySqlConnection,
    employee_id: u64,
    payload: &RequestPayload,
    reason: Option<&str>,
) -> AppResult<u64> {
    let cols = PayloadColumns::from(payload);
    let result = sqlx::query(
        r#"
        INSERT INTO hr_requests
            (employee_id, request_type, status, reason,
             leave_type, start_date, end_date, total_days,
             request_date, start_time, end_time, overtime_hours,
             late_early_type, actual_time, minutes)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(payload.request_type().as_ref())
    .bind(RequestStatus::Pending.as_ref())
    .bind(reason)
    .bind(cols.leave_type)
    .bind(cols.start_date)
    .bind(cols.end_date)
    .bind(cols.total_days)
    .bind(cols.request_date)
    .bind(cols.start_time)
    .bind(cols.end_time)
    .bind(cols.overtime_hours)
    .bind(cols.late_early_type)
    .bind(cols.actual_time)
    .bind(cols.minutes)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_id())
}

async fn save_payload(conn: &mut MySqlConnection, request: &HrRequest) -> AppResult<()> {
    let cols = PayloadColumns::from(&request.payload);
    sqlx::query(
        r#"
        UPDATE hr_requests
        SET reason = ?,
            leave_type = ?, start_date = ?, end_date = ?, total_days = ?,
            request_date = ?, start_time = ?, end_time = ?, overtime_hours = ?,
            late_early_type = ?, actual_time = ?, minutes = ?
        WHERE id = ?
        "#,
    )
    .bind(request.header.reason.as_deref())
    .bind(cols.leave_type)
    .bind(cols.start_date)
    .bind(cols.end_date)
    .bind(cols.total_days)
    .bind(cols.request_date)
    .bind(cols.start_time)
    .bind(cols.end_time)
    .bind(cols.overtime_hours)
    .bind(cols.late_early_type)
    .bind(cols.actual_time)
    .bind(cols.minutes)
    .bind(request.id())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn save_status(conn: &mut MySqlConnection, request: &HrRequest) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE hr_requests
        SET status = ?, approver_id = ?, approved_at = ?, approval_note = ?
        WHERE id = ?
        "#,
    )
    .bind(request.status().as_ref())
    .bind(request.header.approver_id)
    .bind(request.header.approved_at)
    .bind(request.header.approval_note.as_deref())
    .bind(request.id())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn create(
    pool: &MySqlPool,
    employee_id: u64,
    payload: RequestPayload,
    reason: Option<String>,
) -> AppResult<HrRequest> {
    let mut tx = pool.begin().await?;
    // Serialises overlap check and insert per employee.
    employees::lock(&mut tx, employee_id).await?;
    ensure_no_overlap(&mut tx, employee_id, &payload, None).await?;

    let id = insert(&mut tx, employee_id, &payload, reason.as_deref()).await?;
    let created = load(&mut tx, id, false).await?;
    tx.commit().await?;

    info!(employee_id, request_id = id, request_type = %payload.request_type(), "Request created");
    Ok(created)
}

pub async fn create_leave(
    pool: &MySqlPool,
    employee_id: u64,
    input: CreateLeave,
    today: NaiveDate,
) -> AppResult<HrRequest> {
    let payload = RequestPayload::leave(input.leave_type, input.start_date, input.end_date, today)?;
    create(pool, employee_id, payload, input.reason).await
}

pub async fn create_overtime(
    pool: &MySqlPool,
    employee_id: u64,
    input: CreateOvertime,
) -> AppResult<HrRequest> {
    let payload = RequestPayload::overtime(input.date, input.start_time, input.end_time)?;
    create(pool, employee_id, payload, input.reason).await
}

pub async fn create_late_early(
    pool: &MySqlPool,
    employee_id: u64,
    input: CreateLateEarly,
) -> AppResult<HrRequest> {
    let payload = RequestPayload::LateEarly {
        date: input.date,
        kind: input.late_early_type,
        actual_time: input.actual_time,
        minutes: input.minutes,
    };
    create(pool, employee_id, payload, input.reason).await
}

/// Approve or reject; the caller must be allowed to decide for the requester.
pub async fn decide(
    pool: &MySqlPool,
    request_id: u64,
    auth: &AuthUser,
    outcome: RequestStatus,
    note: Option<String>,
    now: DateTime<Utc>,
) -> AppResult<HrRequest> {
    let approver_id = auth.require_employee()?;

    let mut tx = pool.begin().await?;
    let mut request = load(&mut tx, request_id, true).await?;
    request.ensure_pending()?;

    let approver = employees::actor_for(&mut tx, auth).await?;
    let requester = employees::find(&mut tx, request.header.employee_id).await?;
    if !policy::can_approve(&approver, requester.placement()) {
        return Err(AppError::forbidden(
            "Only a super admin or a senior manager of the same department can decide on this request",
        ));
    }

    request.decide(outcome, approver_id, note, now)?;
    save_status(&mut tx, &request).await?;
    tx.commit().await?;

    info!(request_id, approver_id, status = %outcome, "Request decided");
    Ok(request)
}

pub async fn cancel(pool: &MySqlPool, request_id: u64, employee_id: u64) -> AppResult<HrRequest> {
    let mut tx = pool.begin().await?;
    let mut request = load(&mut tx, request_id, true).await?;
    request.cancel(employee_id)?;
    save_status(&mut tx, &request).await?;
    tx.commit().await?;

    info!(request_id, employee_id, "Request cancelled");
    Ok(request)
}

pub async fn update(
    pool: &MySqlPool,
    request_id: u64,
    employee_id: u64,
    changes: UpdateRequest,
    today: NaiveDate,
) -> AppResult<HrRequest> {
    let mut tx = pool.begin().await?;
    employees::lock(&mut tx, employee_id).await?;

    let mut request = load(&mut tx, request_id, true).await?;
    request.ensure_owner_pending(employee_id)?;
    request.apply_update(changes, today)?;
    ensure_no_overlap(&mut tx, employee_id, &request.payload, Some(request_id)).await?;

    save_payload(&mut tx, &request).await?;
    tx.commit().await?;

    info!(request_id, employee_id, "Request updated");
    Ok(request)
}

pub async fn delete(pool: &MySqlPool, request_id: u64, employee_id: u64) -> AppResult<()> {
    let mut tx = pool.begin().await?;
    let request = load(&mut tx, request_id, true).await?;
    request.ensure_owner_pending(employee_id)?;

    sqlx::query("DELETE FROM hr_requests WHERE id = ?")
        .bind(request_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(request_id, employee_id, "Request deleted");
    Ok(())
}

pub async fn find_one(pool: &MySqlPool, request_id: u64, auth: &AuthUser) -> AppResult<HrRequest> {
    let mut conn = pool.acquire().await?;
    let request = load(&mut conn, request_id, false).await?;
    if auth.employee_id == Some(request.header.employee_id) {
        return Ok(request);
    }

    let viewer = employees::actor_for(&mut conn, auth).await?;
    let requester = employees::find(&mut conn, request.header.employee_id).await?;
    if !policy::can_view(&viewer, requester.placement()) {
        return Err(AppError::forbidden("You cannot view this request"));
    }
    Ok(request)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestPage {
    pub data: Vec<HrRequest>,
    pub page: u64,
    pub per_page: u64,
    pub total: i64,
}

pub async fn find_all(pool: &MySqlPool, auth: &AuthUser, filter: &RequestFilter) -> AppResult<RequestPage> {
    let (page, per_page, offset) = paging(filter.page, filter.per_page);

    let mut conn = pool.acquire().await?;
    let viewer = employees::actor_for(&mut conn, auth).await?;
    let scope = visibility_scope(&viewer, auth.employee_id, filter.employee_id);

    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<FilterValue> = Vec::new();
    scope.push_where(&mut where_sql, &mut args);

    if let Some(request_type) = filter.request_type {
        where_sql.push_str(" AND r.request_type = ?");
        args.push(FilterValue::Str(request_type.into()));
    }
    if let Some(status) = filter.status {
        where_sql.push_str(" AND r.status = ?");
        args.push(FilterValue::Str(status.into()));
    }

    let from_sql = r#"
        FROM hr_requests r
        JOIN employees e ON e.id = r.employee_id
        LEFT JOIN positions p ON p.id = e.position_id
    "#;

    let count_sql = format!("SELECT COUNT(*) {from_sql}{where_sql}");
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &args {
        count_q = match *arg {
            FilterValue::U64(v) => count_q.bind(v),
            FilterValue::I32(v) => count_q.bind(v),
            FilterValue::Str(s) => count_q.bind(s),
        };
    }
    let total = count_q.fetch_one(&mut *conn).await?;

    let data_sql = format!(
        "SELECT {REQUEST_COLUMNS} {from_sql}{where_sql} ORDER BY r.created_at DESC, r.id DESC LIMIT ? OFFSET ?"
    );
    let mut data_q = sqlx::query_as::<_, HrRequestRow>(&data_sql);
    for arg in &args {
        data_q = match *arg {
            FilterValue::U64(v) => data_q.bind(v),
            FilterValue::I32(v) => data_q.bind(v),
            FilterValue::Str(s) => data_q.bind(s),
        };
    }
    let data = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(HrRequest::try_from)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(RequestPage {
        data,
        page,
        per_page,
        total,
    })
}

/// Annual limit minus approved leave starting in `year`, floored at zero.
pub async fn leave_balance(
    pool: &MySqlPool,
    auth: &AuthUser,
    employee_id: Option<u64>,
    year: Option<i32>,
    today: NaiveDate,
    default_limit: i32,
) -> AppResult<LeaveBalance> {
    let mut conn = pool.acquire().await?;
    let target_id = match employee_id {
        Some(id) => id,
        None => auth.require_employee()?,
    };
    let target = employees::find(&mut conn, target_id).await?;

    if auth.employee_id != Some(target_id) {
        let viewer = employees::actor_for(&mut conn, auth).await?;
        if !policy::can_view(&viewer, target.placement()) {
            return Err(AppError::forbidden("You cannot view this employee's leave balance"));
        }
    }

    let year = year.unwrap_or_else(|| LeaveBalance::current_year(today));
    let (start, end) = LeaveBalance::year_bounds(year)?;

    let used = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT CAST(COALESCE(SUM(total_days), 0) AS SIGNED)
        FROM hr_requests
        WHERE employee_id = ? AND request_type = ? AND status = ?
          AND start_date BETWEEN ? AND ?
        "#,
    )
    .bind(target_id)
    .bind(RequestType::Leave.as_ref())
    .bind(RequestStatus::Approved.as_ref())
    .bind(start)
    .bind(end)
    .fetch_one(&mut *conn)
    .await?;

    let limit = target.annual_leave_limit.unwrap_or(default_limit);
    let used = i32::try_from(used).map_err(|_| AppError::Internal(format!("used leave overflow: {used}")))?;
    Ok(LeaveBalance::compute(year, limit, used))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::hr_request::{RequestHeader, leave_total_days};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn leave(id: u64, status: RequestStatus, start: NaiveDate, end: NaiveDate) -> HrRequest {
        HrRequest {
            header: RequestHeader {
                id,
                employee_id: 42,
                status,
                reason: None,
                approver_id: None,
                approved_at: None,
                approval_note: None,
                created_at: Utc::now(),
            },
            payload: RequestPayload::Leave {
                leave_type: LeaveType::Annual,
                start_date: start,
                end_date: end,
                total_days: leave_total_days(start, end),
            },
        }
    }

    #[test]
    fn overlapping_leave_is_found_for_pending_and_approved() {
        for status in [RequestStatus::Pending, RequestStatus::Approved] {
            let existing = vec![leave(1, status, d(2025, 1, 10), d(2025, 1, 15))];
            let clash = find_overlap(&existing, d(2025, 1, 14), d(2025, 1, 20), None);
            assert_eq!(clash.map(HrRequest::id), Some(1));
        }
    }

    #[test]
    fn adjacent_leave_does_not_overlap() {
        let existing = vec![leave(1, RequestStatus::Pending, d(2025, 1, 10), d(2025, 1, 15))];
        assert!(find_overlap(&existing, d(2025, 1, 16), d(2025, 1, 20), None).is_none());
    }

    #[test]
    fn closed_requests_and_self_are_ignored() {
        let existing = vec![
            leave(1, RequestStatus::Rejected, d(2025, 1, 10), d(2025, 1, 15)),
            leave(2, RequestStatus::Cancelled, d(2025, 1, 10), d(2025, 1, 15)),
            leave(3, RequestStatus::Pending, d(2025, 1, 10), d(2025, 1, 15)),
        ];
        assert!(find_overlap(&existing, d(2025, 1, 12), d(2025, 1, 13), Some(3)).is_none());
        assert_eq!(
            find_overlap(&existing, d(2025, 1, 12), d(2025, 1, 13), None).map(HrRequest::id),
            Some(3)
        );
    }

    fn actor(role: Role, placement: Option<Placement>) -> Actor {
        Actor { role, placement }
    }

    #[test]
    fn scope_follows_role() {
        let placement = Some(Placement {
            department_id: 4,
            position_level: 3,
        });

        assert_eq!(
            visibility_scope(&actor(Role::SuperAdmin, None), None, Some(9)),
            Scope::All { employee_id: Some(9) }
        );
        assert_eq!(
            visibility_scope(&actor(Role::Manager, placement), Some(1), None),
            Scope::Department {
                department_id: 4,
                below_level: 3,
                employee_id: None
            }
        );
        assert_eq!(visibility_scope(&actor(Role::Manager, None), Some(1), None), Scope::Nothing);
    }

    #[test]
    fn employees_only_see_their_own_requests_whatever_they_ask_for() {
        let employee = actor(Role::Employee, None);
        assert_eq!(visibility_scope(&employee, Some(7), Some(99)), Scope::Own(7));
        assert_eq!(visibility_scope(&employee, None, Some(99)), Scope::Nothing);
    }

    #[test]
    fn scope_renders_where_clause() {
        let mut sql = String::new();
        let mut args = Vec::new();
        Scope::Department {
            department_id: 4,
            below_level: 3,
            employee_id: Some(5),
        }
        .push_where(&mut sql, &mut args);
        assert_eq!(sql, " AND e.department_id = ? AND p.level > ? AND r.employee_id = ?");
        assert_eq!(args.len(), 3);

        let mut sql = String::new();
        Scope::Nothing.push_where(&mut sql, &mut Vec::new());
        assert_eq!(sql, " AND 1=0");
    }
}
