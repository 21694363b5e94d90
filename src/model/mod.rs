pub mod attendance;
pub mod challenge;
pub mod device;
pub mod employee;
pub mod hr_request;
pub mod role;

/// Lets a strum-parsed enum be read straight out of a VARCHAR column with
/// `#[sqlx(try_from = "String")]`.
macro_rules! string_column {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl TryFrom<String> for $ty {
                type Error = strum::ParseError;

                fn try_from(value: String) -> Result<Self, Self::Error> {
                    value.parse()
                }
            }
        )+
    };
}

string_column!(
    device::DeviceStatus,
    challenge::ActionType,
    hr_request::RequestStatus,
    hr_request::RequestType,
    hr_request::LeaveType,
    hr_request::LateEarlyType,
);
