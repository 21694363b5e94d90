use crate::api::attendance::{AttendanceListResponse, HistoryQuery};
use crate::api::device::{RegisterDevice, UpdateDeviceStatus};
use crate::api::hr_request::DecisionNote;
use crate::model::attendance::{AttendanceRecord, VerificationFact};
use crate::model::challenge::{ActionType, IssuedChallenge};
use crate::model::device::{Device, DeviceMetadata, DeviceResolution, DeviceStatus};
use crate::model::hr_request::{
    HrRequest, LateEarlyType, LeaveBalance, LeaveType, RequestHeader, RequestPayload, RequestStatus,
    RequestType, UpdateRequest,
};
use crate::models::{LoginReqDto, TokenPair};
use crate::service::attendance_recorder::{
    ChallengeGrant, ChallengeRequest, Submission, SubmissionOutcome,
};
use crate::service::hr_request_engine::{
    CreateLateEarly, CreateLeave, CreateOvertime, RequestFilter, RequestPage,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

/// Registers the `bearer_auth` scheme referenced by protected paths.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Attendance API",
        version = "1.0.0",
        description = r#"
## Attendance & HR Requests

Verified attendance and employee self-service requests.

### Attendance
- Request a one-time **challenge** bound to a device and an action
- **Submit** the check-in or check-out with photo and position
- Late arrival / early leave minutes and work hours are computed on the server

### Devices
- Devices are recognised by fingerprint and auto-registered on first use
- Super admins can deactivate or block a device

### HR requests
- **Leave**, **overtime** and **late/early** requests
- Approval by a super admin or a more senior manager of the same department
- Annual leave balance per year

### Security
All endpoints except `/auth/*` require a **JWT Bearer** access token.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::attendance::request_challenge,
        crate::api::attendance::submit,
        crate::api::attendance::today,
        crate::api::attendance::history,
        crate::api::attendance::delete_record,

        crate::api::device::list_devices,
        crate::api::device::register_device,
        crate::api::device::set_device_status,
        crate::api::device::delete_device,

        crate::api::hr_request::list_requests,
        crate::api::hr_request::get_request,
        crate::api::hr_request::create_leave,
        crate::api::hr_request::create_overtime,
        crate::api::hr_request::create_late_early,
        crate::api::hr_request::update_request,
        crate::api::hr_request::delete_request,
        crate::api::hr_request::approve_request,
        crate::api::hr_request::reject_request,
        crate::api::hr_request::cancel_request,
        crate::api::hr_request::leave_balance
    ),
    components(
        schemas(
            LoginReqDto,
            TokenPair,
            ActionType,
            IssuedChallenge,
            ChallengeRequest,
            ChallengeGrant,
            Submission,
            SubmissionOutcome,
            VerificationFact,
            AttendanceRecord,
            AttendanceListResponse,
            HistoryQuery,
            Device,
            DeviceMetadata,
            DeviceStatus,
            DeviceResolution,
            RegisterDevice,
            UpdateDeviceStatus,
            RequestType,
            RequestStatus,
            LeaveType,
            LateEarlyType,
            RequestHeader,
            RequestPayload,
            HrRequest,
            RequestPage,
            RequestFilter,
            CreateLeave,
            CreateOvertime,
            CreateLateEarly,
            UpdateRequest,
            DecisionNote,
            LeaveBalance
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login and token rotation"),
        (name = "Attendance", description = "Challenge based check-in and check-out"),
        (name = "Device", description = "Device registry"),
        (name = "Request", description = "Leave, overtime and late/early requests"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route_and_the_bearer_scheme() {
        let doc = ApiDoc::openapi();
        for path in [
            "/auth/login",
            "/api/v1/attendance/challenge",
            "/api/v1/attendance/submit",
            "/api/v1/devices/{id}/status",
            "/api/v1/requests/{id}/approve",
            "/api/v1/requests/leave-balance",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
