use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sqlx::MySqlConnection;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::model::challenge::{ActionType, Challenge, IssuedChallenge};

const TOKEN_BYTES: usize = 32;

/// 256 random bits, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Supersedes every unused challenge of the employee and issues a fresh one.
/// Run inside a transaction that holds the employee lock so the
/// invalidate-then-insert pair is atomic.
pub async fn issue(
    conn: &mut MySqlConnection,
    employee_id: u64,
    device_fingerprint: &str,
    action_type: ActionType,
    ttl_seconds: i64,
    now: DateTime<Utc>,
) -> AppResult<IssuedChallenge> {
    let superseded = sqlx::query(
        "UPDATE attendance_challenges SET is_used = TRUE WHERE employee_id = ? AND is_used = FALSE",
    )
    .bind(employee_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if superseded > 0 {
        debug!(employee_id, superseded, "Superseded unused challenges");
    }

    let token = generate_token();
    let expires_at = now + Duration::seconds(ttl_seconds);

    sqlx::query(
        r#"
        INSERT INTO attendance_challenges
            (employee_id, token, action_type, device_fingerprint, expires_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(&token)
    .bind(action_type.as_ref())
    .bind(device_fingerprint)
    .bind(expires_at)
    .execute(&mut *conn)
    .await?;

    info!(employee_id, action = %action_type, %expires_at, "Attendance challenge issued");
    Ok(IssuedChallenge { token, expires_at })
}

/// Validates a submitted token and marks it used.
pub async fn consume(
    conn: &mut MySqlConnection,
    employee_id: u64,
    token: &str,
    device_fingerprint: &str,
    action_type: ActionType,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let challenge = sqlx::query_as::<_, Challenge>(
        r#"
        SELECT id, employee_id, token, action_type, device_fingerprint, expires_at, is_used
        FROM attendance_challenges
        WHERE token = ?
        FOR UPDATE
        "#,
    )
    .bind(token)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Challenge not found"))?;

    challenge.validate(employee_id, device_fingerprint, action_type, now)?;

    sqlx::query("UPDATE attendance_challenges SET is_used = TRUE WHERE id = ?")
        .bind(challenge.id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_64_hex_chars_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
