// src/policy.rs

//! Role and ownership rules, one constant per guarded operation.
//!
//! A `Policy` is a list of grants. A caller passes when any grant matches:
//! the role matches (or the grant accepts every role) and, for owner-only
//! grants, the caller's id is one of the resource owners handed to `check`.

use crate::{error::ApiError, middleware::auth_context::AuthContext, models::UserRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub role: Option<UserRole>,
    pub owner_only: bool,
}

impl Grant {
    pub const fn role(role: UserRole) -> Self {
        Grant {
            role: Some(role),
            owner_only: false,
        }
    }

    pub const fn owner_with_role(role: UserRole) -> Self {
        Grant {
            role: Some(role),
            owner_only: true,
        }
    }

    pub const fn any_owner() -> Self {
        Grant {
            role: None,
            owner_only: true,
        }
    }

    fn allows(&self, role: UserRole, user_id: i64, owners: &[i64]) -> bool {
        let role_ok = self.role.is_none_or(|r| r == role);
        let owner_ok = !self.owner_only || owners.contains(&user_id);
        role_ok && owner_ok
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Policy {
    pub name: &'static str,
    pub grants: &'static [Grant],
    pub denied_message: &'static str,
}

impl Policy {
    pub fn allows(&self, role: UserRole, user_id: i64, owners: &[i64]) -> bool {
        self.grants.iter().any(|g| g.allows(role, user_id, owners))
    }

    pub fn check(&self, auth: &AuthContext, owners: &[i64]) -> Result<(), ApiError> {
        if self.allows(auth.role, auth.user_id, owners) {
            Ok(())
        } else {
            tracing::warn!(
                "policy {} denied user {} ({})",
                self.name,
                auth.user_id,
                auth.role
            );
            Err(ApiError::Forbidden(self.denied_message.into()))
        }
    }
}

const UNAUTHORIZED_ACCESS: &str = "Unauthorized access.";

/// `GET /therapist/{id}/patients`
pub const LIST_THERAPIST_PATIENTS: Policy = Policy {
    name: "therapist.patients",
    grants: &[Grant::owner_with_role(UserRole::Therapist)],
    denied_message: UNAUTHORIZED_ACCESS,
};

/// `GET /patient/{id}/therapists`
pub const LIST_PATIENT_THERAPISTS: Policy = Policy {
    name: "patient.therapists",
    grants: &[Grant::owner_with_role(UserRole::Patient)],
    denied_message: UNAUTHORIZED_ACCESS,
};

/// `GET /appointments/user/{id}`. Therapists always pass and see their own
/// therapist-side appointments whatever the path says.
pub const LIST_USER_APPOINTMENTS: Policy = Policy {
    name: "appointments.by_user",
    grants: &[
        Grant::role(UserRole::Therapist),
        Grant::owner_with_role(UserRole::Patient),
    ],
    denied_message: UNAUTHORIZED_ACCESS,
};

/// `PATCH /chat/messages/{id}/status`; owners are sender and recipient.
pub const UPDATE_MESSAGE_STATUS: Policy = Policy {
    name: "chat.message_status",
    grants: &[Grant::any_owner()],
    denied_message: "You are not authorized to update this message.",
};

/// Enable, disable and delete user accounts.
pub const MANAGE_USERS: Policy = Policy {
    name: "users.manage",
    grants: &[Grant::role(UserRole::Admin)],
    denied_message: "Only admins can manage user accounts.",
};
