use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    CheckIn,
    CheckOut,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Challenge {
    pub id: u64,
    pub employee_id: u64,
    pub token: String,
    #[sqlx(try_from = "String")]
    pub action_type: ActionType,
    pub device_fingerprint: String,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
}

impl Challenge {
    /// Checks a submitted token against what it was issued for.
    pub fn validate(
        &self,
        employee_id: u64,
        device_fingerprint: &str,
        action_type: ActionType,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if self.employee_id != employee_id {
            return Err(AppError::forbidden("Challenge was issued to another employee"));
        }
        if self.is_used {
            return Err(AppError::bad_request("Challenge has already been used"));
        }
        if now >= self.expires_at {
            return Err(AppError::bad_request("Challenge has expired"));
        }
        if self.device_fingerprint != device_fingerprint {
            return Err(AppError::bad_request("Challenge was issued for a different device"));
        }
        if self.action_type != action_type {
            return Err(AppError::bad_request(format!(
                "Challenge was issued for {}, not {}",
                self.action_type, action_type
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IssuedChallenge {
    #[schema(example = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08")]
    pub token: String,
    #[schema(value_type = String, format = "date-time")]
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn challenge(now: DateTime<Utc>) -> Challenge {
        Challenge {
            id: 1,
            employee_id: 10,
            token: "abc".into(),
            action_type: ActionType::CheckIn,
            device_fingerprint: "fp-1".into(),
            expires_at: now + Duration::seconds(180),
            is_used: false,
        }
    }

    #[test]
    fn accepts_matching_fresh_challenge() {
        let now = Utc::now();
        assert!(challenge(now).validate(10, "fp-1", ActionType::CheckIn, now).is_ok());
    }

    #[test]
    fn rejects_foreign_used_expired_and_mismatched() {
        let now = Utc::now();
        let c = challenge(now);

        assert!(matches!(
            c.validate(11, "fp-1", ActionType::CheckIn, now),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            c.validate(10, "fp-2", ActionType::CheckIn, now),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            c.validate(10, "fp-1", ActionType::CheckOut, now),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            c.validate(10, "fp-1", ActionType::CheckIn, now + Duration::seconds(180)),
            Err(AppError::BadRequest(_))
        ));

        let used = Challenge { is_used: true, ..c };
        assert!(matches!(
            used.validate(10, "fp-1", ActionType::CheckIn, now),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn action_type_wire_names() {
        assert_eq!(ActionType::CheckIn.as_ref(), "CHECK_IN");
        assert_eq!("CHECK_OUT".parse::<ActionType>().unwrap(), ActionType::CheckOut);
        let v = serde_json::to_value(ActionType::CheckOut).unwrap();
        assert_eq!(v, serde_json::json!("CHECK_OUT"));
    }
}
