use chrono::{NaiveTime, Timelike};

use crate::error::{AppError, AppResult};

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance between two WGS84 points, in meters.
pub fn haversine_distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Inclusive: a point exactly on the boundary is inside.
pub fn within_geofence(distance_meters: f64, radius_meters: f64) -> bool {
    distance_meters <= radius_meters
}

/// Parses `HH:mm:ss` (or `HH:mm`) into minutes since midnight, ignoring seconds.
pub fn minutes_since_midnight(value: &str) -> AppResult<i32> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map(minutes_of)
        .map_err(|_| AppError::bad_request(format!("Invalid time of day: {value:?}")))
}

pub fn minutes_of(time: NaiveTime) -> i32 {
    (time.hour() * 60 + time.minute()) as i32
}

pub fn late_minutes(check_in: NaiveTime, standard_minutes: i32, tolerance_minutes: i32) -> i32 {
    (minutes_of(check_in) - (standard_minutes + tolerance_minutes)).max(0)
}

pub fn early_leave_minutes(check_out: NaiveTime, standard_minutes: i32, tolerance_minutes: i32) -> i32 {
    ((standard_minutes - tolerance_minutes) - minutes_of(check_out)).max(0)
}

/// Half-up rounding to two decimals (inputs here are never negative).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Hours between two instants given in milliseconds, rounded to two decimals.
pub fn hours_between_ms(millis: i64) -> f64 {
    round2(millis as f64 / 3_600_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn haversine_is_symmetric_and_zero_on_same_point() {
        let (a_lat, a_lon) = (23.8103, 90.4125);
        let (b_lat, b_lon) = (23.7806, 90.2794);

        let ab = haversine_distance_meters(a_lat, a_lon, b_lat, b_lon);
        let ba = haversine_distance_meters(b_lat, b_lon, a_lat, a_lon);
        assert!((ab - ba).abs() < 1e-6);
        assert_eq!(haversine_distance_meters(a_lat, a_lon, a_lat, a_lon), 0.0);
    }

    #[test]
    fn haversine_matches_known_distance() {
        // one degree of latitude along a meridian
        let d = haversine_distance_meters(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_194.9).abs() < 1.0, "got {d}");
    }

    #[test]
    fn geofence_boundary_is_inclusive() {
        assert!(within_geofence(100.0, 100.0));
        assert!(within_geofence(99.9, 100.0));
        assert!(!within_geofence(100.01, 100.0));
    }

    #[test]
    fn minutes_since_midnight_ignores_seconds() {
        assert_eq!(minutes_since_midnight("08:15:59").unwrap(), 495);
        assert_eq!(minutes_since_midnight("00:00:00").unwrap(), 0);
        assert_eq!(minutes_since_midnight("17:30").unwrap(), 1050);
        assert!(minutes_since_midnight("25:00:00").is_err());
        assert!(minutes_since_midnight("soon").is_err());
    }

    #[test]
    fn late_minutes_zero_at_tolerance_boundary() {
        let standard = 8 * 60;
        assert_eq!(late_minutes(t(7, 50), standard, 15), 0);
        assert_eq!(late_minutes(t(8, 15), standard, 15), 0);
        assert_eq!(late_minutes(t(8, 16), standard, 15), 1);
        assert_eq!(late_minutes(t(9, 0), standard, 15), 45);
    }

    #[test]
    fn early_leave_minutes_zero_at_tolerance_boundary() {
        let standard = 17 * 60;
        assert_eq!(early_leave_minutes(t(16, 45), standard, 15), 0);
        assert_eq!(early_leave_minutes(t(16, 44), standard, 15), 1);
        assert_eq!(early_leave_minutes(t(18, 0), standard, 15), 0);
        assert_eq!(early_leave_minutes(t(12, 0), standard, 0), 300);
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round2(1.005_000_1), 1.01);
        assert_eq!(round2(7.999), 8.0);
        assert_eq!(hours_between_ms(5_400_000), 1.5);
        assert_eq!(hours_between_ms(1_000), 0.0);
        assert_eq!(hours_between_ms(30_600_000), 8.5);
    }
}
