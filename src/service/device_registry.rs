use chrono::{DateTime, Utc};
use sqlx::MySqlConnection;
use tracing::{info, warn};

use crate::error::{AppError, AppResult, is_integrity_violation};
use crate::model::device::{Device, DeviceMetadata, DeviceResolution, DeviceStatus};

const DEVICE_COLUMNS: &str = r#"
    id, employee_id, device_fingerprint, device_name, device_type, os, browser,
    status, is_primary, last_used_at, last_used_ip, last_user_agent, created_at
"#;

/// How a known or unknown fingerprint is treated when a challenge is requested.
pub fn resolve(existing: Option<&Device>) -> AppResult<DeviceResolution> {
    match existing.map(|d| d.status) {
        None => Ok(DeviceResolution::New),
        Some(DeviceStatus::Active) => Ok(DeviceResolution::Registered),
        Some(DeviceStatus::Inactive) => Ok(DeviceResolution::Pending),
        Some(DeviceStatus::Blocked) => Err(AppError::forbidden("This device has been blocked")),
    }
}

pub async fn find(conn: &mut MySqlConnection, device_id: u64) -> AppResult<Option<Device>> {
    let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?");
    Ok(sqlx::query_as::<_, Device>(&sql)
        .bind(device_id)
        .fetch_optional(&mut *conn)
        .await?)
}

pub async fn find_by_fingerprint(
    conn: &mut MySqlConnection,
    employee_id: u64,
    fingerprint: &str,
) -> AppResult<Option<Device>> {
    let sql = format!(
        "SELECT {DEVICE_COLUMNS} FROM devices WHERE employee_id = ? AND device_fingerprint = ?"
    );
    Ok(sqlx::query_as::<_, Device>(&sql)
        .bind(employee_id)
        .bind(fingerprint)
        .fetch_optional(&mut *conn)
        .await?)
}

pub async fn list_for_employee(conn: &mut MySqlConnection, employee_id: u64) -> AppResult<Vec<Device>> {
    let sql = format!(
        "SELECT {DEVICE_COLUMNS} FROM devices WHERE employee_id = ? ORDER BY is_primary DESC, id"
    );
    Ok(sqlx::query_as::<_, Device>(&sql)
        .bind(employee_id)
        .fetch_all(&mut *conn)
        .await?)
}

async fn get(conn: &mut MySqlConnection, device_id: u64) -> AppResult<Device> {
    find(conn, device_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Device {device_id} not found")))
}

/// Last-used bookkeeping, done on every use of a known device.
pub async fn touch(
    conn: &mut MySqlConnection,
    device_id: u64,
    meta: &DeviceMetadata,
    now: DateTime<Utc>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE devices
        SET last_used_at = ?, last_used_ip = ?, last_user_agent = ?
        WHERE id = ?
        "#,
    )
    .bind(now)
    .bind(meta.ip.as_deref())
    .bind(meta.user_agent.as_deref())
    .bind(device_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert(
    conn: &mut MySqlConnection,
    employee_id: u64,
    fingerprint: &str,
    meta: &DeviceMetadata,
    is_primary: bool,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO devices
            (employee_id, device_fingerprint, device_name, device_type, os, browser,
             status, is_primary, last_used_at, last_used_ip, last_user_agent)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(fingerprint)
    .bind(meta.device_name.as_deref())
    .bind(meta.device_type.as_deref())
    .bind(meta.os.as_deref())
    .bind(meta.browser.as_deref())
    .bind(DeviceStatus::Active.as_ref())
    .bind(is_primary)
    .bind(now)
    .bind(meta.ip.as_deref())
    .bind(meta.user_agent.as_deref())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_id())
}

/// Looks up the fingerprint for the employee, auto-registering unseen devices
/// as active. Blocked devices are refused.
pub async fn resolve_or_register(
    conn: &mut MySqlConnection,
    employee_id: u64,
    fingerprint: &str,
    meta: &DeviceMetadata,
    now: DateTime<Utc>,
) -> AppResult<(Device, DeviceResolution)> {
    let existing = find_by_fingerprint(conn, employee_id, fingerprint).await?;
    let resolution = resolve(existing.as_ref()).inspect_err(|_| {
        warn!(employee_id, "Challenge requested from a blocked device");
    })?;

    let device_id = match existing {
        Some(device) => {
            touch(conn, device.id, meta, now).await?;
            device.id
        }
        None => {
            let id = insert(conn, employee_id, fingerprint, meta, false, now).await?;
            info!(employee_id, device_id = id, "New device registered");
            id
        }
    };

    Ok((get(conn, device_id).await?, resolution))
}

pub async fn register_explicit(
    conn: &mut MySqlConnection,
    employee_id: u64,
    fingerprint: &str,
    meta: &DeviceMetadata,
    is_primary: bool,
    now: DateTime<Utc>,
) -> AppResult<Device> {
    if find_by_fingerprint(conn, employee_id, fingerprint).await?.is_some() {
        return Err(AppError::bad_request("Device is already registered"));
    }

    if is_primary {
        sqlx::query("UPDATE devices SET is_primary = FALSE WHERE employee_id = ?")
            .bind(employee_id)
            .execute(&mut *conn)
            .await?;
    }

    let device_id = insert(conn, employee_id, fingerprint, meta, is_primary, now)
        .await
        .map_err(|e| {
            if is_integrity_violation(&e) {
                AppError::bad_request("Device is already registered")
            } else {
                AppError::Database(e)
            }
        })?;

    info!(employee_id, device_id, is_primary, "Device registered");
    get(conn, device_id).await
}

/// Direct overwrite; no transition rules between statuses.
pub async fn set_status(
    conn: &mut MySqlConnection,
    device_id: u64,
    status: DeviceStatus,
) -> AppResult<Device> {
    let previous = get(conn, device_id).await?;

    sqlx::query("UPDATE devices SET status = ? WHERE id = ?")
        .bind(status.as_ref())
        .bind(device_id)
        .execute(&mut *conn)
        .await?;

    info!(device_id, from = %previous.status, to = %status, "Device status changed");
    get(conn, device_id).await
}

pub async fn delete(conn: &mut MySqlConnection, device_id: u64) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM devices WHERE id = ?")
        .bind(device_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found(format!("Device {device_id} not found")));
    }
    info!(device_id, "Device deleted");
    Ok(())
}

/// Submission-time check: the device must already be known and not blocked.
/// Returns the device and whether it counts as known (active).
pub async fn validate_for_submission(
    conn: &mut MySqlConnection,
    employee_id: u64,
    fingerprint: &str,
) -> AppResult<(Device, bool)> {
    let device = find_by_fingerprint(conn, employee_id, fingerprint)
        .await?
        .ok_or_else(|| AppError::forbidden("Device is not registered; request a challenge first"))?;

    match device.status {
        DeviceStatus::Blocked => Err(AppError::forbidden("This device has been blocked")),
        DeviceStatus::Active => Ok((device, true)),
        DeviceStatus::Inactive => Ok((device, false)),
    }
}
