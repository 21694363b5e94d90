use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The slice of an employee row the attendance and request flows need.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Employee {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = "EMP-001")]
    pub employee_code: String,

    #[schema(example = "John Doe")]
    pub full_name: String,

    #[schema(example = 10, nullable = true)]
    pub department_id: Option<u64>,

    #[schema(example = 3, nullable = true)]
    pub position_id: Option<u64>,

    /// Level of the current position; 1 is top management.
    #[schema(example = 3, nullable = true)]
    pub position_level: Option<i32>,

    #[schema(example = 12, nullable = true)]
    pub annual_leave_limit: Option<i32>,
}

/// Where an employee currently sits in the organisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub department_id: u64,
    pub position_level: i32,
}

impl Employee {
    /// `None` unless both the department and the position are resolvable.
    pub fn placement(&self) -> Option<Placement> {
        match (self.department_id, self.position_id, self.position_level) {
            (Some(department_id), Some(_), Some(position_level)) => Some(Placement {
                department_id,
                position_level,
            }),
            _ => None,
        }
    }
}
