use anyhow::{Context, Result, anyhow};
use chrono::{FixedOffset, NaiveTime, Offset, Utc};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

use crate::utils::geo_time;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
    /// Take the client address from `Forwarded` / `X-Forwarded-For` instead of the socket peer.
    pub trust_proxy_headers: bool,

    pub attendance: AttendanceSettings,
    pub default_annual_leave_limit: i32,
}

/// Office schedule and verification knobs used by the attendance flow.
#[derive(Clone, Debug)]
pub struct AttendanceSettings {
    pub office_latitude: f64,
    pub office_longitude: f64,
    pub geofence_radius_meters: f64,
    /// Reject submissions outside the radius instead of only noting the distance.
    pub geofence_strict: bool,
    pub standard_check_in_minutes: i32,
    pub standard_check_out_minutes: i32,
    pub late_tolerance_minutes: i32,
    pub early_leave_tolerance_minutes: i32,
    pub office_offset: FixedOffset,
    pub challenge_ttl_seconds: i64,
}

impl Default for AttendanceSettings {
    fn default() -> Self {
        Self {
            office_latitude: 0.0,
            office_longitude: 0.0,
            geofence_radius_meters: 100.0,
            geofence_strict: false,
            standard_check_in_minutes: 8 * 60,
            standard_check_out_minutes: 17 * 60,
            late_tolerance_minutes: 15,
            early_leave_tolerance_minutes: 15,
            office_offset: Utc.fix(),
            challenge_ttl_seconds: 180,
        }
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key} has an invalid value {raw:?}: {e}")),
        Err(_) => Ok(default),
    }
}

fn clock_minutes_or(key: &str, default: &str) -> Result<i32> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    let time = NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S")
        .map_err(|e| anyhow!("{key} must be HH:MM:SS, got {raw:?}: {e}"))?;
    Ok(geo_time::minutes_of(time))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let offset_minutes: i32 = parse_or("OFFICE_UTC_OFFSET_MINUTES", 0)?;
        let office_offset = FixedOffset::east_opt(offset_minutes * 60)
            .ok_or_else(|| anyhow!("OFFICE_UTC_OFFSET_MINUTES out of range: {offset_minutes}"))?;

        let attendance = AttendanceSettings {
            office_latitude: parse_or("OFFICE_LATITUDE", 0.0)?,
            office_longitude: parse_or("OFFICE_LONGITUDE", 0.0)?,
            geofence_radius_meters: parse_or("GEOFENCE_RADIUS_METERS", 100.0)?,
            geofence_strict: parse_or("GEOFENCE_STRICT", false)?,
            standard_check_in_minutes: clock_minutes_or("STANDARD_CHECK_IN", "08:00:00")?,
            standard_check_out_minutes: clock_minutes_or("STANDARD_CHECK_OUT", "17:00:00")?,
            late_tolerance_minutes: parse_or("LATE_TOLERANCE_MINUTES", 15)?,
            early_leave_tolerance_minutes: parse_or("EARLY_LEAVE_TOLERANCE_MINUTES", 15)?,
            office_offset,
            challenge_ttl_seconds: parse_or("CHALLENGE_TTL_SECONDS", 180)?, // 3 min
        };

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: parse_or("ACCESS_TOKEN_TTL", 900)?, // default 15 min
            refresh_token_ttl: parse_or("REFRESH_TOKEN_TTL", 604800)?, // default 7 days

            rate_login_per_min: parse_or("RATE_LOGIN_PER_MIN", 60)?,
            rate_refresh_per_min: parse_or("RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: parse_or("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api/v1".to_string()),
            trust_proxy_headers: parse_or("TRUST_PROXY_HEADERS", false)?,

            attendance,
            default_annual_leave_limit: parse_or("DEFAULT_ANNUAL_LEAVE_LIMIT", 12)?,
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            database_url: "mysql://localhost/hrm_test".into(),
            jwt_secret: "test-secret".into(),
            server_addr: "127.0.0.1:0".into(),
            access_token_ttl: 900,
            refresh_token_ttl: 604800,
            rate_login_per_min: 60,
            rate_refresh_per_min: 30,
            rate_protected_per_min: 1000,
            api_prefix: "/api/v1".into(),
            trust_proxy_headers: false,
            attendance: AttendanceSettings::default(),
            default_annual_leave_limit: 12,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_values_become_minutes() {
        // unset keys fall back to the default
        assert_eq!(clock_minutes_or("HRM_TEST_UNSET_CLOCK", "08:30:00").unwrap(), 510);
        assert!(clock_minutes_or("HRM_TEST_UNSET_CLOCK", "8am").is_err());
    }

    #[test]
    fn missing_numeric_keys_use_defaults() {
        assert_eq!(parse_or("HRM_TEST_UNSET_NUMBER", 42u32).unwrap(), 42);
        assert!(required("HRM_TEST_UNSET_REQUIRED").is_err());
    }
}
