use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use utoipa::ToSchema;

use crate::config::AttendanceSettings;
use crate::error::{AppError, AppResult};
use crate::model::challenge::ActionType;
use crate::utils::geo_time;

/// One verification event, stored as data and rendered on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VerificationFact {
    pub action: ActionType,
    pub device_known: bool,
    pub device_label: Option<String>,
    pub photo_present: bool,
    pub distance_meters: Option<f64>,
    pub within_geofence: Option<bool>,
    pub note: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub recorded_at: DateTime<Utc>,
}

impl VerificationFact {
    pub fn verified(&self) -> bool {
        self.photo_present && self.device_known
    }

    pub fn describe(&self) -> String {
        let action = match self.action {
            ActionType::CheckIn => "Check-in",
            ActionType::CheckOut => "Check-out",
        };
        let device = self.device_label.as_deref().unwrap_or("unknown device");
        let known = if self.device_known { "known" } else { "unrecognised" };
        let photo = if self.photo_present { "yes" } else { "no" };

        let mut line = format!("{action}: device {device} ({known}), photo: {photo}");
        if let Some(distance) = self.distance_meters {
            let fence = match self.within_geofence {
                Some(true) => "inside geofence",
                Some(false) => "outside geofence",
                None => "geofence unknown",
            };
            line.push_str(&format!(", distance: {distance:.1}m ({fence})"));
        }
        if let Some(note) = self.note.as_deref().filter(|n| !n.trim().is_empty()) {
            line.push_str(&format!(", note: {}", note.trim()));
        }
        line
    }
}

pub const NOTES_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceRecord {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_in: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out: Option<DateTime<Utc>>,
    pub check_in_photo_url: Option<String>,
    pub check_out_photo_url: Option<String>,
    #[schema(example = 8.5)]
    pub work_hours: Option<f64>,
    pub late_minutes: i32,
    pub early_leave_minutes: i32,
    pub is_verified: bool,
    #[schema(value_type = Vec<VerificationFact>)]
    pub verification: Json<Vec<VerificationFact>>,
}

impl AttendanceRecord {
    /// A not-yet-persisted record for the given day (`id` is 0 until inserted).
    pub fn blank(employee_id: u64, date: NaiveDate) -> Self {
        Self {
            id: 0,
            employee_id,
            date,
            check_in: None,
            check_out: None,
            check_in_photo_url: None,
            check_out_photo_url: None,
            work_hours: None,
            late_minutes: 0,
            early_leave_minutes: 0,
            is_verified: false,
            verification: Json(Vec::new()),
        }
    }

    pub fn check_in(
        &mut self,
        at: DateTime<Utc>,
        photo_url: Option<String>,
        fact: VerificationFact,
        settings: &AttendanceSettings,
    ) -> AppResult<()> {
        if self.check_in.is_some() {
            return Err(AppError::bad_request("Already checked in today"));
        }

        self.check_in = Some(at);
        self.check_in_photo_url = photo_url;
        self.late_minutes = geo_time::late_minutes(
            local_time(at, settings),
            settings.standard_check_in_minutes,
            settings.late_tolerance_minutes,
        );
        self.is_verified = fact.verified();
        self.verification.0.push(fact);
        Ok(())
    }

    pub fn check_out(
        &mut self,
        at: DateTime<Utc>,
        photo_url: Option<String>,
        fact: VerificationFact,
        settings: &AttendanceSettings,
    ) -> AppResult<()> {
        let checked_in = self
            .check_in
            .ok_or_else(|| AppError::bad_request("You must check in first"))?;
        if self.check_out.is_some() {
            return Err(AppError::bad_request("Already checked out today"));
        }

        self.check_out = Some(at);
        self.check_out_photo_url = photo_url;
        self.work_hours = Some(geo_time::hours_between_ms(
            (at - checked_in).num_milliseconds(),
        ));
        self.early_leave_minutes = geo_time::early_leave_minutes(
            local_time(at, settings),
            settings.standard_check_out_minutes,
            settings.early_leave_tolerance_minutes,
        );
        self.is_verified = fact.verified();
        self.verification.0.push(fact);
        Ok(())
    }

    pub fn render_notes(&self) -> String {
        self.verification
            .0
            .iter()
            .map(VerificationFact::describe)
            .collect::<Vec<_>>()
            .join(NOTES_SEPARATOR)
    }
}

/// Wall-clock time at the office for an instant.
/// Applies a punch to the day's record, creating it on check-in when absent.
/// The returned flag tells whether the record still has to be inserted.
/// Action and instant are taken from the fact.
pub fn apply_transition(
    existing: Option<AttendanceRecord>,
    employee_id: u64,
    date: NaiveDate,
    photo_url: Option<String>,
    fact: VerificationFact,
    settings: &AttendanceSettings,
) -> AppResult<(AttendanceRecord, bool)> {
    let at = fact.recorded_at;
    match fact.action {
        ActionType::CheckIn => {
            let is_new = existing.is_none();
            let mut record = existing.unwrap_or_else(|| AttendanceRecord::blank(employee_id, date));
            record.check_in(at, photo_url, fact, settings)?;
            Ok((record, is_new))
        }
        ActionType::CheckOut => {
            let mut record =
                existing.ok_or_else(|| AppError::not_found("No attendance record for today"))?;
            record.check_out(at, photo_url, fact, settings)?;
            Ok((record, false))
        }
    }
}

pub fn local_time(at: DateTime<Utc>, settings: &AttendanceSettings) -> NaiveTime {
    at.with_timezone(&settings.office_offset).time()
}

/// Calendar day at the office for an instant.
pub fn local_date(at: DateTime<Utc>, settings: &AttendanceSettings) -> NaiveDate {
    at.with_timezone(&settings.office_offset).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, h, m, s).unwrap()
    }

    fn fact(action: ActionType, photo: bool, known: bool) -> VerificationFact {
        VerificationFact {
            action,
            device_known: known,
            device_label: Some("Pixel 8".into()),
            photo_present: photo,
            distance_meters: Some(12.5),
            within_geofence: Some(true),
            note: None,
            recorded_at: at(8, 0, 0),
        }
    }

    fn day() -> AttendanceRecord {
        AttendanceRecord::blank(1, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
    }

    #[test]
    fn check_in_then_out_computes_hours_and_minutes() {
        let settings = AttendanceSettings::default();
        let mut rec = day();

        rec.check_in(at(8, 16, 0), Some("in.jpg".into()), fact(ActionType::CheckIn, true, true), &settings)
            .unwrap();
        assert_eq!(rec.late_minutes, 1);
        assert!(rec.is_verified);

        rec.check_out(at(16, 30, 0), None, fact(ActionType::CheckOut, false, true), &settings)
            .unwrap();
        // 8h14m = 29_640_000 ms
        assert_eq!(rec.work_hours, Some(8.23));
        assert_eq!(rec.early_leave_minutes, 15);
        assert!(!rec.is_verified);
        assert_eq!(rec.verification.0.len(), 2);
    }

    #[test]
    fn work_hours_match_millisecond_formula() {
        let settings = AttendanceSettings::default();
        let mut rec = day();
        let check_in = at(7, 59, 31);
        let check_out = at(17, 3, 2);

        rec.check_in(check_in, None, fact(ActionType::CheckIn, false, false), &settings).unwrap();
        rec.check_out(check_out, None, fact(ActionType::CheckOut, false, false), &settings).unwrap();

        let expected = ((check_out - check_in).num_milliseconds() as f64 / 3_600_000.0 * 100.0).round() / 100.0;
        assert_eq!(rec.work_hours, Some(expected));
        assert_eq!(rec.late_minutes, 0);
        assert_eq!(rec.early_leave_minutes, 0);
    }

    #[test]
    fn repeated_transitions_fail() {
        let settings = AttendanceSettings::default();
        let mut rec = day();

        rec.check_in(at(8, 0, 0), None, fact(ActionType::CheckIn, true, true), &settings).unwrap();
        let again = rec.check_in(at(8, 5, 0), None, fact(ActionType::CheckIn, true, true), &settings);
        assert!(matches!(again, Err(AppError::BadRequest(m)) if m.contains("checked in")));

        rec.check_out(at(17, 0, 0), None, fact(ActionType::CheckOut, true, true), &settings).unwrap();
        let again = rec.check_out(at(17, 5, 0), None, fact(ActionType::CheckOut, true, true), &settings);
        assert!(matches!(again, Err(AppError::BadRequest(m)) if m.contains("checked out")));
        let third = rec.check_in(at(18, 0, 0), None, fact(ActionType::CheckIn, true, true), &settings);
        assert!(matches!(third, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn check_out_without_check_in_is_rejected() {
        let settings = AttendanceSettings::default();
        let mut rec = day();
        let res = rec.check_out(at(17, 0, 0), None, fact(ActionType::CheckOut, true, true), &settings);
        assert!(matches!(res, Err(AppError::BadRequest(m)) if m.contains("check in first")));
        assert!(rec.check_out.is_none());
    }

    #[test]
    fn lateness_uses_office_time_zone() {
        let settings = AttendanceSettings {
            office_offset: FixedOffset::east_opt(6 * 3600).unwrap(),
            ..AttendanceSettings::default()
        };
        let mut rec = day();
        // 02:30 UTC is 08:30 at UTC+6
        rec.check_in(at(2, 30, 0), None, fact(ActionType::CheckIn, true, true), &settings).unwrap();
        assert_eq!(rec.late_minutes, 15);
        assert_eq!(local_date(at(20, 0, 0), &settings), NaiveDate::from_ymd_opt(2026, 1, 6).unwrap());
    }

    #[test]
    fn notes_accumulate_with_separator() {
        let settings = AttendanceSettings::default();
        let mut rec = day();
        let mut first = fact(ActionType::CheckIn, true, true);
        first.note = Some("client visit".into());
        rec.check_in(at(8, 0, 0), None, first, &settings).unwrap();
        let mut second = fact(ActionType::CheckOut, false, false);
        second.distance_meters = None;
        second.within_geofence = None;
        rec.check_out(at(17, 0, 0), None, second, &settings).unwrap();

        let notes = rec.render_notes();
        let parts: Vec<&str> = notes.split(NOTES_SEPARATOR).collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(
            parts[0],
            "Check-in: device Pixel 8 (known), photo: yes, distance: 12.5m (inside geofence), note: client visit"
        );
        assert_eq!(parts[1], "Check-out: device Pixel 8 (unrecognised), photo: no");
    }

    #[test]
    fn check_out_with_no_record_is_not_found() {
        let settings = AttendanceSettings::default();
        let res = apply_transition(
            None,
            1,
            day().date,
            None,
            fact(ActionType::CheckOut, true, true),
            &settings,
        );
        assert!(matches!(res, Err(AppError::NotFound(_))));
    }

    #[test]
    fn check_out_on_record_without_check_in_is_bad_request() {
        let settings = AttendanceSettings::default();
        let res = apply_transition(
            Some(day()),
            1,
            day().date,
            None,
            fact(ActionType::CheckOut, true, true),
            &settings,
        );
        assert!(matches!(res, Err(AppError::BadRequest(m)) if m.contains("check in first")));
    }

    #[test]
    fn first_check_in_creates_the_day_and_later_punches_reuse_it() {
        let settings = AttendanceSettings::default();
        let (rec, is_new) = apply_transition(
            None,
            7,
            day().date,
            Some("in.jpg".into()),
            fact(ActionType::CheckIn, true, true),
            &settings,
        )
        .unwrap();
        assert!(is_new);
        assert_eq!(rec.employee_id, 7);
        assert!(rec.check_in.is_some());

        let mut out = fact(ActionType::CheckOut, true, true);
        out.recorded_at = at(17, 0, 0);
        let (rec, is_new) = apply_transition(Some(rec), 7, day().date, None, out, &settings).unwrap();
        assert!(!is_new);
        assert_eq!(rec.check_out, Some(at(17, 0, 0)));
        assert_eq!(rec.verification.0.len(), 2);
    }
}
