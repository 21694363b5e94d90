pub mod attendance_recorder;
pub mod challenge_issuer;
pub mod device_registry;
pub mod employees;
pub mod hr_request_engine;
pub mod policy;
