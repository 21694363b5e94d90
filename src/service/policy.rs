use crate::model::employee::Placement;
use crate::model::role::Role;

/// Resolved facts about whoever is acting or being acted upon.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub role: Role,
    pub placement: Option<Placement>,
}

/// Super admins may approve anything. Managers may approve requests from the
/// same department whose author ranks strictly below them (a larger level
/// number). Everyone else may not approve.
pub fn can_approve(approver: &Actor, requester: Option<Placement>) -> bool {
    match approver.role {
        Role::SuperAdmin => true,
        Role::Manager => match (approver.placement, requester) {
            (Some(mine), Some(theirs)) => outranks_in_department(mine, theirs),
            _ => false,
        },
        Role::Employee => false,
    }
}

/// Visibility follows the approval rule; owners always see their own requests
/// and that case is handled by the caller.
pub fn can_view(viewer: &Actor, requester: Option<Placement>) -> bool {
    can_approve(viewer, requester)
}

fn outranks_in_department(mine: Placement, theirs: Placement) -> bool {
    mine.department_id == theirs.department_id && theirs.position_level > mine.position_level
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPT_A: u64 = 1;
    const DEPT_B: u64 = 2;

    fn at(department_id: u64, position_level: i32) -> Option<Placement> {
        Some(Placement {
            department_id,
            position_level,
        })
    }

    fn actor(role: Role, placement: Option<Placement>) -> Actor {
        Actor { role, placement }
    }

    #[test]
    fn manager_needs_same_department_and_strictly_lower_rank() {
        let manager = actor(Role::Manager, at(DEPT_A, 3));

        assert!(!can_approve(&manager, at(DEPT_A, 3)), "equal level");
        assert!(!can_approve(&manager, at(DEPT_B, 5)), "other department");
        assert!(!can_approve(&manager, at(DEPT_A, 2)), "higher rank");
        assert!(can_approve(&manager, at(DEPT_A, 5)));
    }

    #[test]
    fn super_admin_approves_anyone() {
        let admin = actor(Role::SuperAdmin, None);
        assert!(can_approve(&admin, at(DEPT_A, 3)));
        assert!(can_approve(&admin, at(DEPT_B, 5)));
        assert!(can_approve(&admin, None));
    }

    #[test]
    fn unresolvable_placements_deny_managers() {
        assert!(!can_approve(&actor(Role::Manager, None), at(DEPT_A, 5)));
        assert!(!can_approve(&actor(Role::Manager, at(DEPT_A, 3)), None));
    }

    #[test]
    fn employees_never_approve_or_view_others() {
        let employee = actor(Role::Employee, at(DEPT_A, 1));
        assert!(!can_approve(&employee, at(DEPT_A, 5)));
        assert!(!can_view(&employee, at(DEPT_A, 5)));
    }

    #[test]
    fn visibility_matches_approval() {
        let manager = actor(Role::Manager, at(DEPT_A, 3));
        assert!(can_view(&manager, at(DEPT_A, 4)));
        assert!(!can_view(&manager, at(DEPT_A, 3)));
    }
}
