use std::fmt;
use std::str::FromStr;

use crate::error::{RetentionError, RetentionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Mentor,
    User,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Role::Admin),
            "mentor" => Ok(Role::Mentor),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role `{other}` (expected admin, mentor or user)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ComputeOne,
    ComputeAll,
    ReadAlerts,
    UpdateAlert,
    ReadDashboard,
    ImportStudents,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::ComputeOne => "compute a risk score",
            Action::ComputeAll => "recompute all risk scores",
            Action::ReadAlerts => "read alerts",
            Action::UpdateAlert => "update alerts",
            Action::ReadDashboard => "read risk data",
            Action::ImportStudents => "import students",
        };
        f.write_str(label)
    }
}

/// Capability check consulted by the service boundary before any work.
pub trait AccessPolicy {
    fn authorize(&self, caller: Option<&Caller>, action: Action) -> RetentionResult<()>;
}

/// Any signed-in caller may read and score single students; bulk
/// recompute and imports need an admin.
#[derive(Debug, Clone, Copy, Default)]
pub struct RolePolicy;

impl AccessPolicy for RolePolicy {
    fn authorize(&self, caller: Option<&Caller>, action: Action) -> RetentionResult<()> {
        let caller = caller.ok_or(RetentionError::Authentication)?;

        let allowed = match action {
            Action::ComputeAll | Action::ImportStudents => caller.role == Role::Admin,
            Action::ComputeOne
            | Action::ReadAlerts
            | Action::UpdateAlert
            | Action::ReadDashboard => true,
        };

        if allowed {
            Ok(())
        } else {
            Err(RetentionError::Authorization {
                user_id: caller.user_id.clone(),
                action,
            })
        }
    }
}
