use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Inactive,
    Blocked,
}

/// How a fingerprint was recognised when a challenge was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema, AsRefStr, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceResolution {
    /// Known and active.
    Registered,
    /// Known but not active; attendance is recorded unverified.
    Pending,
    /// Seen for the first time and auto-registered as active.
    New,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Device {
    #[schema(example = 7)]
    pub id: u64,
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = "b1946ac92492d2347c6235b4d2611184")]
    pub device_fingerprint: String,
    #[schema(example = "Pixel 8", nullable = true)]
    pub device_name: Option<String>,
    #[schema(example = "mobile", nullable = true)]
    pub device_type: Option<String>,
    #[schema(example = "Android 15", nullable = true)]
    pub os: Option<String>,
    #[schema(example = "Chrome", nullable = true)]
    pub browser: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: DeviceStatus,
    pub is_primary: bool,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_used_ip: Option<String>,
    pub last_user_agent: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl Device {
    /// Name shown in verification notes.
    pub fn label(&self) -> String {
        self.device_name
            .clone()
            .unwrap_or_else(|| format!("device #{}", self.id))
    }
}

/// Client supplied description of a device, plus request context.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct DeviceMetadata {
    pub device_name: Option<String>,
    pub device_type: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    #[serde(skip)]
    pub ip: Option<String>,
    #[serde(skip)]
    pub user_agent: Option<String>,
}
