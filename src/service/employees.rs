use sqlx::MySqlConnection;

use crate::auth::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::model::employee::Employee;
use crate::service::policy::Actor;

const EMPLOYEE_SELECT: &str = r#"
    SELECT
        e.id,
        e.employee_code,
        e.full_name,
        e.department_id,
        e.position_id,
        p.level AS position_level,
        e.annual_leave_limit
    FROM employees e
    LEFT JOIN positions p ON p.id = e.position_id
    WHERE e.id = ?
"#;

pub async fn find(conn: &mut MySqlConnection, employee_id: u64) -> AppResult<Employee> {
    sqlx::query_as::<_, Employee>(EMPLOYEE_SELECT)
        .bind(employee_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Employee {employee_id} not found")))
}

/// Row lock on the employee for the rest of the transaction. Every
/// read-then-write invariant scoped to one employee (one record per day,
/// one unused challenge, non-overlapping leave) takes this lock first.
pub async fn lock(conn: &mut MySqlConnection, employee_id: u64) -> AppResult<()> {
    let found = sqlx::query_scalar::<_, u64>("SELECT id FROM employees WHERE id = ? FOR UPDATE")
        .bind(employee_id)
        .fetch_optional(&mut *conn)
        .await?;

    match found {
        Some(_) => Ok(()),
        None => Err(AppError::not_found(format!("Employee {employee_id} not found"))),
    }
}

/// Role plus current placement of the caller, for policy checks.
pub async fn actor_for(conn: &mut MySqlConnection, auth: &AuthUser) -> AppResult<Actor> {
    let placement = match auth.employee_id {
        Some(id) => find(conn, id).await?.placement(),
        None => None,
    };
    Ok(Actor {
        role: auth.role,
        placement,
    })
}
