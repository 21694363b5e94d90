use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::config::AttendanceSettings;
use crate::error::{AppError, AppResult, is_integrity_violation};
use crate::model::attendance::{AttendanceRecord, VerificationFact, apply_transition, local_date};
use crate::model::challenge::{ActionType, IssuedChallenge};
use crate::model::device::{DeviceMetadata, DeviceResolution};
use crate::service::{challenge_issuer, device_registry, employees};
use crate::utils::geo_time;

const RECORD_COLUMNS: &str = r#"
    id, employee_id, date, check_in, check_out, check_in_photo_url, check_out_photo_url,
    work_hours, late_minutes, early_leave_minutes, is_verified, verification
"#;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChallengeRequest {
    #[schema(example = "b1946ac92492d2347c6235b4d2611184")]
    pub device_fingerprint: String,
    pub action_type: ActionType,
    #[serde(flatten)]
    pub metadata: DeviceMetadata,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChallengeGrant {
    #[serde(flatten)]
    pub challenge: IssuedChallenge,
    pub device_id: u64,
    pub device_status: DeviceResolution,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct Submission {
    pub challenge_token: String,
    pub device_fingerprint: String,
    pub action_type: ActionType,
    /// Object key or URL of a photo uploaded out of band.
    pub photo_url: Option<String>,
    #[schema(example = 23.8103)]
    pub latitude: Option<f64>,
    #[schema(example = 90.4125)]
    pub longitude: Option<f64>,
    pub note: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmissionOutcome {
    pub action: ActionType,
    pub verified: bool,
    pub distance_meters: Option<f64>,
    pub within_geofence: Option<bool>,
    pub late_minutes: i32,
    pub early_leave_minutes: i32,
    pub work_hours: Option<f64>,
    pub notes: String,
    pub record: AttendanceRecord,
}

/// Distance from the office for an optional reported position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoReading {
    pub distance_meters: Option<f64>,
    pub within_geofence: Option<bool>,
}

pub fn measure(
    settings: &AttendanceSettings,
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> AppResult<GeoReading> {
    let (lat, lon) = match (latitude, longitude) {
        (None, None) => return Ok(GeoReading::default()),
        (Some(lat), Some(lon)) => (lat, lon),
        _ => {
            return Err(AppError::bad_request(
                "latitude and longitude must be supplied together",
            ));
        }
    };
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(AppError::bad_request("Coordinates are out of range"));
    }

    let distance = geo_time::haversine_distance_meters(
        settings.office_latitude,
        settings.office_longitude,
        lat,
        lon,
    );
    let within = geo_time::within_geofence(distance, settings.geofence_radius_meters);
    if settings.geofence_strict && !within {
        return Err(AppError::forbidden(format!(
            "You are {distance:.0}m from the office, outside the allowed {:.0}m",
            settings.geofence_radius_meters
        )));
    }

    Ok(GeoReading {
        distance_meters: Some(geo_time::round2(distance)),
        within_geofence: Some(within),
    })
}

/// Resolves (or registers) the device and issues a challenge for it.
pub async fn request_challenge(
    pool: &MySqlPool,
    settings: &AttendanceSettings,
    employee_id: u64,
    request: &ChallengeRequest,
    now: DateTime<Utc>,
) -> AppResult<ChallengeGrant> {
    let mut tx = pool.begin().await?;
    employees::lock(&mut tx, employee_id).await?;

    let (device, resolution) = device_registry::resolve_or_register(
        &mut tx,
        employee_id,
        &request.device_fingerprint,
        &request.metadata,
        now,
    )
    .await?;

    let challenge = challenge_issuer::issue(
        &mut tx,
        employee_id,
        &request.device_fingerprint,
        request.action_type,
        settings.challenge_ttl_seconds,
        now,
    )
    .await?;

    tx.commit().await?;

    Ok(ChallengeGrant {
        challenge,
        device_id: device.id,
        device_status: resolution,
    })
}

async fn find_day(
    conn: &mut MySqlConnection,
    employee_id: u64,
    date: NaiveDate,
    for_update: bool,
) -> AppResult<Option<AttendanceRecord>> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE employee_id = ? AND date = ?{}",
        if for_update { " FOR UPDATE" } else { "" }
    );
    Ok(sqlx::query_as::<_, AttendanceRecord>(&sql)
        .bind(employee_id)
        .bind(date)
        .fetch_optional(&mut *conn)
        .await?)
}

async fn insert_record(conn: &mut MySqlConnection, record: &AttendanceRecord) -> AppResult<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO attendance_records
            (employee_id, date, check_in, check_in_photo_url, late_minutes, is_verified, verification)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.employee_id)
    .bind(record.date)
    .bind(record.check_in)
    .bind(record.check_in_photo_url.as_deref())
    .bind(record.late_minutes)
    .bind(record.is_verified)
    .bind(&record.verification)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(done) => Ok(done.last_insert_id()),
        // The unique (employee_id, date) index is the last line of defence.
        Err(e) if is_integrity_violation(&e) => {
            Err(AppError::bad_request("Already checked in today"))
        }
        Err(e) => Err(e.into()),
    }
}

async fn update_record(conn: &mut MySqlConnection, record: &AttendanceRecord) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE attendance_records
        SET check_in = ?, check_out = ?, check_in_photo_url = ?, check_out_photo_url = ?,
            work_hours = ?, late_minutes = ?, early_leave_minutes = ?, is_verified = ?,
            verification = ?
        WHERE id = ?
        "#,
    )
    .bind(record.check_in)
    .bind(record.check_out)
    .bind(record.check_in_photo_url.as_deref())
    .bind(record.check_out_photo_url.as_deref())
    .bind(record.work_hours)
    .bind(record.late_minutes)
    .bind(record.early_leave_minutes)
    .bind(record.is_verified)
    .bind(&record.verification)
    .bind(record.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Validates device and challenge, applies the day's transition and does the
/// device bookkeeping, all in one transaction.
pub async fn submit(
    pool: &MySqlPool,
    settings: &AttendanceSettings,
    employee_id: u64,
    submission: Submission,
    meta: &DeviceMetadata,
    now: DateTime<Utc>,
) -> AppResult<SubmissionOutcome> {
    let geo = measure(settings, submission.latitude, submission.longitude)?;

    let mut tx = pool.begin().await?;
    employees::lock(&mut tx, employee_id).await?;

    let (device, device_known) =
        device_registry::validate_for_submission(&mut tx, employee_id, &submission.device_fingerprint)
            .await?;

    challenge_issuer::consume(
        &mut tx,
        employee_id,
        &submission.challenge_token,
        &submission.device_fingerprint,
        submission.action_type,
        now,
    )
    .await?;

    let fact = VerificationFact {
        action: submission.action_type,
        device_known,
        device_label: Some(device.label()),
        photo_present: submission
            .photo_url
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty()),
        distance_meters: geo.distance_meters,
        within_geofence: geo.within_geofence,
        note: submission.note,
        recorded_at: now,
    };

    let date = local_date(now, settings);
    let existing = find_day(&mut tx, employee_id, date, true).await?;

    let (mut record, is_new) = apply_transition(
        existing,
        employee_id,
        date,
        submission.photo_url,
        fact,
        settings,
    )?;
    if is_new {
        record.id = insert_record(&mut tx, &record).await?;
    } else {
        update_record(&mut tx, &record).await?;
    }

    device_registry::touch(&mut tx, device.id, meta, now).await?;
    tx.commit().await?;

    if !record.is_verified {
        warn!(employee_id, record_id = record.id, action = %submission.action_type, "Attendance recorded unverified");
    }
    info!(
        employee_id,
        record_id = record.id,
        action = %submission.action_type,
        late_minutes = record.late_minutes,
        early_leave_minutes = record.early_leave_minutes,
        "Attendance recorded"
    );

    Ok(SubmissionOutcome {
        action: submission.action_type,
        verified: record.is_verified,
        distance_meters: geo.distance_meters,
        within_geofence: geo.within_geofence,
        late_minutes: record.late_minutes,
        early_leave_minutes: record.early_leave_minutes,
        work_hours: record.work_hours,
        notes: record.render_notes(),
        record,
    })
}

pub async fn today(
    pool: &MySqlPool,
    settings: &AttendanceSettings,
    employee_id: u64,
    now: DateTime<Utc>,
) -> AppResult<Option<AttendanceRecord>> {
    let mut conn = pool.acquire().await?;
    find_day(&mut conn, employee_id, local_date(now, settings), false).await
}

pub async fn history(
    pool: &MySqlPool,
    employee_id: u64,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    per_page: u64,
    offset: u64,
) -> AppResult<(Vec<AttendanceRecord>, i64)> {
    if let (Some(from), Some(to)) = (from, to) {
        if to < from {
            return Err(AppError::bad_request("`to` cannot be before `from`"));
        }
    }

    const RANGE: &str = "employee_id = ? AND (? IS NULL OR date >= ?) AND (? IS NULL OR date <= ?)";

    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM attendance_records WHERE {RANGE}"
    ))
    .bind(employee_id)
    .bind(from)
    .bind(from)
    .bind(to)
    .bind(to)
    .fetch_one(pool)
    .await?;

    let sql = format!(
        r#"
        SELECT {RECORD_COLUMNS}
        FROM attendance_records
        WHERE {RANGE}
        ORDER BY date DESC
        LIMIT ? OFFSET ?
        "#
    );
    let records = sqlx::query_as::<_, AttendanceRecord>(&sql)
        .bind(employee_id)
        .bind(from)
        .bind(from)
        .bind(to)
        .bind(to)
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok((records, total))
}

/// Administrative escape hatch; normal flows never delete records.
pub async fn delete_record(pool: &MySqlPool, record_id: u64) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM attendance_records WHERE id = ?")
        .bind(record_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found(format!("Attendance record {record_id} not found")));
    }
    info!(record_id, "Attendance record deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn office() -> AttendanceSettings {
        AttendanceSettings {
            office_latitude: 23.8103,
            office_longitude: 90.4125,
            geofence_radius_meters: 100.0,
            ..AttendanceSettings::default()
        }
    }

    #[test]
    fn no_coordinates_means_no_reading() {
        assert_eq!(measure(&office(), None, None).unwrap(), GeoReading::default());
    }

    #[test]
    fn half_a_position_is_rejected() {
        assert!(matches!(
            measure(&office(), Some(23.0), None),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            measure(&office(), Some(123.0), Some(90.0)),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn distance_is_noted_inside_and_outside() {
        let inside = measure(&office(), Some(23.8103), Some(90.4125)).unwrap();
        assert_eq!(inside.distance_meters, Some(0.0));
        assert_eq!(inside.within_geofence, Some(true));

        // roughly 1.1 km north
        let outside = measure(&office(), Some(23.8203), Some(90.4125)).unwrap();
        assert_eq!(outside.within_geofence, Some(false));
        assert!(outside.distance_meters.unwrap() > 1000.0);
    }

    #[test]
    fn strict_geofence_forbids_outside_positions() {
        let settings = AttendanceSettings {
            geofence_strict: true,
            ..office()
        };
        assert!(matches!(
            measure(&settings, Some(23.8203), Some(90.4125)),
            Err(AppError::Forbidden(_))
        ));
        assert!(measure(&settings, Some(23.8104), Some(90.4125)).is_ok());
    }
}
