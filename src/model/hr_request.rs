use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString, IntoStaticStr};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};
use crate::utils::geo_time;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Leave,
    Overtime,
    LateEarly,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveType {
    Annual,
    Sick,
    Unpaid,
    Personal,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LateEarlyType {
    Late,
    Early,
}

/// Fields every request carries regardless of its type.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RequestHeader {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1000)]
    pub employee_id: u64,
    pub status: RequestStatus,
    pub reason: Option<String>,
    pub approver_id: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub approved_at: Option<DateTime<Utc>>,
    pub approval_note: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "request_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestPayload {
    Leave {
        leave_type: LeaveType,
        start_date: NaiveDate,
        end_date: NaiveDate,
        total_days: i32,
    },
    Overtime {
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        hours: f64,
    },
    LateEarly {
        date: NaiveDate,
        kind: LateEarlyType,
        actual_time: Option<NaiveTime>,
        minutes: Option<i32>,
    },
}

impl RequestPayload {
    pub fn request_type(&self) -> RequestType {
        match self {
            RequestPayload::Leave { .. } => RequestType::Leave,
            RequestPayload::Overtime { .. } => RequestType::Overtime,
            RequestPayload::LateEarly { .. } => RequestType::LateEarly,
        }
    }

    /// Builds a validated leave payload; `today` is the office calendar day.
    pub fn leave(
        leave_type: LeaveType,
        start_date: NaiveDate,
        end_date: NaiveDate,
        today: NaiveDate,
    ) -> AppResult<Self> {
        if start_date < today {
            return Err(AppError::bad_request("start_date cannot be in the past"));
        }
        if end_date < start_date {
            return Err(AppError::bad_request("end_date cannot be before start_date"));
        }
        Ok(RequestPayload::Leave {
            leave_type,
            start_date,
            end_date,
            total_days: leave_total_days(start_date, end_date),
        })
    }

    pub fn overtime(date: NaiveDate, start_time: NaiveTime, end_time: NaiveTime) -> AppResult<Self> {
        if end_time <= start_time {
            return Err(AppError::bad_request("end_time must be after start_time"));
        }
        Ok(RequestPayload::Overtime {
            date,
            start_time,
            end_time,
            hours: geo_time::hours_between_ms((end_time - start_time).num_milliseconds()),
        })
    }

    pub fn leave_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match self {
            RequestPayload::Leave {
                start_date,
                end_date,
                ..
            } => Some((*start_date, *end_date)),
            _ => None,
        }
    }
}

/// Inclusive day count of a leave window.
pub fn leave_total_days(start_date: NaiveDate, end_date: NaiveDate) -> i32 {
    (end_date - start_date).num_days().abs() as i32 + 1
}

/// Closed-interval intersection.
pub fn ranges_overlap(s1: NaiveDate, e1: NaiveDate, s2: NaiveDate, e2: NaiveDate) -> bool {
    s1 <= e2 && s2 <= e1
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HrRequest {
    #[serde(flatten)]
    pub header: RequestHeader,
    #[serde(flatten)]
    pub payload: RequestPayload,
}

impl HrRequest {
    pub fn id(&self) -> u64 {
        self.header.id
    }

    pub fn status(&self) -> RequestStatus {
        self.header.status
    }

    pub fn ensure_pending(&self) -> AppResult<()> {
        if self.header.status != RequestStatus::Pending {
            return Err(AppError::bad_request(format!(
                "Request is {} and can no longer be changed",
                self.header.status
            )));
        }
        Ok(())
    }

    /// Owner-only mutations: the request must be pending and belong to the caller.
    pub fn ensure_owner_pending(&self, employee_id: u64) -> AppResult<()> {
        self.ensure_pending()?;
        if self.header.employee_id != employee_id {
            return Err(AppError::bad_request("Only the requesting employee can change this request"));
        }
        Ok(())
    }

    pub fn decide(
        &mut self,
        outcome: RequestStatus,
        approver_id: u64,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.ensure_pending()?;
        if !matches!(outcome, RequestStatus::Approved | RequestStatus::Rejected) {
            return Err(AppError::Internal(format!("{outcome} is not an approval outcome")));
        }
        self.header.status = outcome;
        self.header.approver_id = Some(approver_id);
        self.header.approved_at = Some(now);
        self.header.approval_note = note;
        Ok(())
    }

    pub fn cancel(&mut self, employee_id: u64) -> AppResult<()> {
        self.ensure_owner_pending(employee_id)?;
        self.header.status = RequestStatus::Cancelled;
        Ok(())
    }

    /// Applies an owner edit, re-deriving `total_days` / `hours`.
    pub fn apply_update(&mut self, update: UpdateRequest, today: NaiveDate) -> AppResult<()> {
        self.ensure_pending()?;
        let kind = self.payload.request_type();
        let mismatch = |field: &str| {
            AppError::bad_request(format!("{field} does not apply to {kind} requests"))
        };

        let payload = match &self.payload {
            RequestPayload::Leave {
                leave_type,
                start_date,
                end_date,
                ..
            } => {
                if let Some(field) = update.first_non_leave_field() {
                    return Err(mismatch(field));
                }
                if update.leave_type.is_none()
                    && update.start_date.is_none()
                    && update.end_date.is_none()
                {
                    self.payload.clone()
                } else {
                    RequestPayload::leave(
                        update.leave_type.unwrap_or(*leave_type),
                        update.start_date.unwrap_or(*start_date),
                        update.end_date.unwrap_or(*end_date),
                        today,
                    )?
                }
            }
            RequestPayload::Overtime {
                date,
                start_time,
                end_time,
                ..
            } => {
                if let Some(field) = update.first_non_overtime_field() {
                    return Err(mismatch(field));
                }
                RequestPayload::overtime(
                    update.date.unwrap_or(*date),
                    update.start_time.unwrap_or(*start_time),
                    update.end_time.unwrap_or(*end_time),
                )?
            }
            RequestPayload::LateEarly {
                date,
                kind,
                actual_time,
                minutes,
            } => {
                if let Some(field) = update.first_non_late_early_field() {
                    return Err(mismatch(field));
                }
                RequestPayload::LateEarly {
                    date: update.date.unwrap_or(*date),
                    kind: update.late_early_type.unwrap_or(*kind),
                    actual_time: update.actual_time.or(*actual_time),
                    minutes: update.minutes.or(*minutes),
                }
            }
        };

        self.payload = payload;
        if update.reason.is_some() {
            self.header.reason = update.reason;
        }
        Ok(())
    }
}

/// Partial edit of a pending request. Only fields of the request's own type are accepted.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateRequest {
    pub reason: Option<String>,
    pub leave_type: Option<LeaveType>,
    #[schema(value_type = Option<String>, format = "date")]
    pub start_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    pub date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, example = "18:00:00")]
    pub start_time: Option<NaiveTime>,
    #[schema(value_type = Option<String>, example = "20:30:00")]
    pub end_time: Option<NaiveTime>,
    pub late_early_type: Option<LateEarlyType>,
    #[schema(value_type = Option<String>, example = "08:40:00")]
    pub actual_time: Option<NaiveTime>,
    pub minutes: Option<i32>,
}

impl UpdateRequest {
    fn first_non_leave_field(&self) -> Option<&'static str> {
        [
            ("date", self.date.is_some()),
            ("start_time", self.start_time.is_some()),
            ("end_time", self.end_time.is_some()),
            ("late_early_type", self.late_early_type.is_some()),
            ("actual_time", self.actual_time.is_some()),
            ("minutes", self.minutes.is_some()),
        ]
        .into_iter()
        .find_map(|(name, set)| set.then_some(name))
    }

    fn first_non_overtime_field(&self) -> Option<&'static str> {
        [
            ("leave_type", self.leave_type.is_some()),
            ("start_date", self.start_date.is_some()),
            ("end_date", self.end_date.is_some()),
            ("late_early_type", self.late_early_type.is_some()),
            ("actual_time", self.actual_time.is_some()),
            ("minutes", self.minutes.is_some()),
        ]
        .into_iter()
        .find_map(|(name, set)| set.then_some(name))
    }

    fn first_non_late_early_field(&self) -> Option<&'static str> {
        [
            ("leave_type", self.leave_type.is_some()),
            ("start_date", self.start_date.is_some()),
            ("end_date", self.end_date.is_some()),
            ("start_time", self.start_time.is_some()),
            ("end_time", self.end_time.is_some()),
        ]
        .into_iter()
        .find_map(|(name, set)| set.then_some(name))
    }
}

/// Flat row of `hr_requests`; type specific columns are nullable.
#[derive(Debug, sqlx::FromRow)]
pub struct HrRequestRow {
    pub id: u64,
    pub employee_id: u64,
    #[sqlx(try_from = "String")]
    pub request_type: RequestType,
    #[sqlx(try_from = "String")]
    pub status: RequestStatus,
    pub reason: Option<String>,
    pub leave_type: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_days: Option<i32>,
    pub request_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub overtime_hours: Option<f64>,
    pub late_early_type: Option<String>,
    pub actual_time: Option<NaiveTime>,
    pub minutes: Option<i32>,
    pub approver_id: Option<u64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approval_note: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn missing(id: u64, column: &str) -> AppError {
    AppError::Internal(format!("hr_requests row {id} is missing {column}"))
}

fn parse_column<T: std::str::FromStr>(id: u64, column: &str, value: Option<String>) -> AppResult<T> {
    value
        .ok_or_else(|| missing(id, column))?
        .parse()
        .map_err(|_| AppError::Internal(format!("hr_requests row {id} has an invalid {column}")))
}

impl TryFrom<HrRequestRow> for HrRequest {
    type Error = AppError;

    fn try_from(row: HrRequestRow) -> AppResult<Self> {
        let id = row.id;
        let payload = match row.request_type {
            RequestType::Leave => RequestPayload::Leave {
                leave_type: parse_column(id, "leave_type", row.leave_type)?,
                start_date: row.start_date.ok_or_else(|| missing(id, "start_date"))?,
                end_date: row.end_date.ok_or_else(|| missing(id, "end_date"))?,
                total_days: row.total_days.ok_or_else(|| missing(id, "total_days"))?,
            },
            RequestType::Overtime => RequestPayload::Overtime {
                date: row.request_date.ok_or_else(|| missing(id, "request_date"))?,
                start_time: row.start_time.ok_or_else(|| missing(id, "start_time"))?,
                end_time: row.end_time.ok_or_else(|| missing(id, "end_time"))?,
                hours: row.overtime_hours.ok_or_else(|| missing(id, "overtime_hours"))?,
            },
            RequestType::LateEarly => RequestPayload::LateEarly {
                date: row.request_date.ok_or_else(|| missing(id, "request_date"))?,
                kind: parse_column(id, "late_early_type", row.late_early_type)?,
                actual_time: row.actual_time,
                minutes: row.minutes,
            },
        };

        Ok(HrRequest {
            header: RequestHeader {
                id,
                employee_id: row.employee_id,
                status: row.status,
                reason: row.reason,
                approver_id: row.approver_id,
                approved_at: row.approved_at,
                approval_note: row.approval_note,
                created_at: row.created_at,
            },
            payload,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct LeaveBalance {
    #[schema(example = 2026)]
    pub year: i32,
    #[schema(example = 12)]
    pub limit: i32,
    #[schema(example = 5)]
    pub used: i32,
    #[schema(example = 7)]
    pub remaining: i32,
}

impl LeaveBalance {
    pub fn compute(year: i32, limit: i32, used: i32) -> Self {
        Self {
            year,
            limit,
            used,
            remaining: (limit - used).max(0),
        }
    }

    /// Jan 1 and Dec 31 of `year`.
    pub fn year_bounds(year: i32) -> AppResult<(NaiveDate, NaiveDate)> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1);
        let end = NaiveDate::from_ymd_opt(year, 12, 31);
        start
            .zip(end)
            .ok_or_else(|| AppError::bad_request(format!("Invalid year {year}")))
    }

    pub fn current_year(today: NaiveDate) -> i32 {
        today.year()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn request(status: RequestStatus, payload: RequestPayload) -> HrRequest {
        HrRequest {
            header: RequestHeader {
                id: 1,
                employee_id: 42,
                status,
                reason: None,
                approver_id: None,
                approved_at: None,
                approval_note: None,
                created_at: Utc::now(),
            },
            payload,
        }
    }

    fn leave(start: NaiveDate, end: NaiveDate) -> RequestPayload {
        RequestPayload::Leave {
            leave_type: LeaveType::Annual,
            start_date: start,
            end_date: end,
            total_days: leave_total_days(start, end),
        }
    }

    #[test]
    fn leave_day_count_is_inclusive() {
        assert_eq!(leave_total_days(d(2025, 1, 10), d(2025, 1, 10)), 1);
        assert_eq!(leave_total_days(d(2025, 1, 10), d(2025, 1, 15)), 6);
        assert_eq!(leave_total_days(d(2024, 12, 30), d(2025, 1, 2)), 4);
    }

    #[test]
    fn leave_dates_are_validated() {
        let today = d(2025, 1, 10);
        assert!(RequestPayload::leave(LeaveType::Sick, d(2025, 1, 10), d(2025, 1, 10), today).is_ok());
        assert!(matches!(
            RequestPayload::leave(LeaveType::Sick, d(2025, 1, 9), d(2025, 1, 12), today),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            RequestPayload::leave(LeaveType::Sick, d(2025, 1, 12), d(2025, 1, 11), today),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn overlap_is_closed_interval() {
        assert!(ranges_overlap(d(2025, 1, 10), d(2025, 1, 15), d(2025, 1, 14), d(2025, 1, 20)));
        assert!(ranges_overlap(d(2025, 1, 10), d(2025, 1, 15), d(2025, 1, 15), d(2025, 1, 15)));
        assert!(ranges_overlap(d(2025, 1, 1), d(2025, 1, 31), d(2025, 1, 10), d(2025, 1, 12)));
        assert!(!ranges_overlap(d(2025, 1, 10), d(2025, 1, 15), d(2025, 1, 16), d(2025, 1, 20)));
    }

    #[test]
    fn overtime_hours_rounded_and_ordered() {
        match RequestPayload::overtime(d(2025, 1, 10), t(18, 0), t(20, 20)).unwrap() {
            RequestPayload::Overtime { hours, .. } => assert_eq!(hours, 2.33),
            other => panic!("unexpected payload {other:?}"),
        }
        assert!(RequestPayload::overtime(d(2025, 1, 10), t(18, 0), t(18, 0)).is_err());
        assert!(RequestPayload::overtime(d(2025, 1, 10), t(18, 0), t(17, 0)).is_err());
    }

    #[test]
    fn non_pending_requests_are_immutable_for_everyone() {
        for status in [RequestStatus::Approved, RequestStatus::Rejected, RequestStatus::Cancelled] {
            let mut req = request(status, leave(d(2025, 1, 10), d(2025, 1, 12)));
            assert!(matches!(req.cancel(42), Err(AppError::BadRequest(_))));
            assert!(matches!(req.cancel(7), Err(AppError::BadRequest(_))));
            assert!(matches!(req.ensure_owner_pending(42), Err(AppError::BadRequest(_))));
            assert!(matches!(
                req.apply_update(UpdateRequest::default(), d(2025, 1, 1)),
                Err(AppError::BadRequest(_))
            ));
            assert!(matches!(
                req.decide(RequestStatus::Approved, 1, None, Utc::now()),
                Err(AppError::BadRequest(_))
            ));
            assert_eq!(req.status(), status);
        }
    }

    #[test]
    fn only_owner_may_cancel() {
        let mut req = request(RequestStatus::Pending, leave(d(2025, 1, 10), d(2025, 1, 12)));
        assert!(matches!(req.cancel(7), Err(AppError::BadRequest(_))));
        req.cancel(42).unwrap();
        assert_eq!(req.status(), RequestStatus::Cancelled);
    }

    #[test]
    fn decision_records_audit_fields() {
        let mut req = request(RequestStatus::Pending, leave(d(2025, 1, 10), d(2025, 1, 12)));
        let now = Utc::now();
        req.decide(RequestStatus::Rejected, 9, Some("team offsite".into()), now).unwrap();
        assert_eq!(req.status(), RequestStatus::Rejected);
        assert_eq!(req.header.approver_id, Some(9));
        assert_eq!(req.header.approved_at, Some(now));
        assert_eq!(req.header.approval_note.as_deref(), Some("team offsite"));
    }

    #[test]
    fn update_recomputes_derived_fields() {
        let today = d(2025, 1, 1);
        let mut req = request(RequestStatus::Pending, leave(d(2025, 1, 10), d(2025, 1, 12)));
        req.apply_update(
            UpdateRequest {
                end_date: Some(d(2025, 1, 20)),
                ..UpdateRequest::default()
            },
            today,
        )
        .unwrap();
        assert_eq!(req.payload.leave_range(), Some((d(2025, 1, 10), d(2025, 1, 20))));
        assert!(matches!(req.payload, RequestPayload::Leave { total_days: 11, .. }));

        let mut ot = request(
            RequestStatus::Pending,
            RequestPayload::overtime(d(2025, 1, 10), t(18, 0), t(19, 0)).unwrap(),
        );
        ot.apply_update(
            UpdateRequest {
                end_time: Some(t(21, 30)),
                ..UpdateRequest::default()
            },
            today,
        )
        .unwrap();
        assert!(matches!(ot.payload, RequestPayload::Overtime { hours, .. } if hours == 3.5));
    }

    #[test]
    fn reason_only_edit_keeps_a_started_leave() {
        let mut req = request(RequestStatus::Pending, leave(d(2025, 1, 10), d(2025, 1, 12)));
        let today = d(2025, 1, 11);
        req.apply_update(
            UpdateRequest {
                reason: Some("Doctor's note attached".into()),
                ..UpdateRequest::default()
            },
            today,
        )
        .unwrap();
        assert_eq!(req.header.reason.as_deref(), Some("Doctor's note attached"));
        assert_eq!(req.payload, leave(d(2025, 1, 10), d(2025, 1, 12)));

        let moved = req.apply_update(
            UpdateRequest {
                end_date: Some(d(2025, 1, 13)),
                ..UpdateRequest::default()
            },
            today,
        );
        assert!(matches!(moved, Err(AppError::BadRequest(m)) if m.contains("past")));
    }

    #[test]
    fn update_rejects_fields_of_other_types() {
        let mut req = request(RequestStatus::Pending, leave(d(2025, 1, 10), d(2025, 1, 12)));
        let res = req.apply_update(
            UpdateRequest {
                start_time: Some(t(9, 0)),
                ..UpdateRequest::default()
            },
            d(2025, 1, 1),
        );
        assert!(matches!(res, Err(AppError::BadRequest(m)) if m.contains("start_time")));
    }

    #[test]
    fn leave_balance_floors_at_zero() {
        assert_eq!(
            LeaveBalance::compute(2025, 12, 5),
            LeaveBalance { year: 2025, limit: 12, used: 5, remaining: 7 }
        );
        assert_eq!(LeaveBalance::compute(2025, 12, 15).remaining, 0);
        assert_eq!(
            LeaveBalance::year_bounds(2025).unwrap(),
            (d(2025, 1, 1), d(2025, 12, 31))
        );
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let req = request(RequestStatus::Pending, leave(d(2025, 1, 10), d(2025, 1, 12)));
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["request_type"], "LEAVE");
        assert_eq!(v["status"], "pending");
        assert_eq!(v["total_days"], 3);
        assert_eq!(v["leave_type"], "annual");
    }
}
