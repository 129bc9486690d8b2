use serde::{Deserialize, Serialize};

use crate::error::{BookingError, BookingResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    #[default]
    User,
}

/// Identity of whoever is calling, as vouched for by the upstream gateway.
/// Anonymous callers have no user id and may only browse.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Caller {
    pub user_id: Option<String>,
    pub role: Role,
}

impl Caller {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            role: Role::User,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            role: Role::Admin,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn user_id(&self) -> BookingResult<&str> {
        self.user_id.as_deref().ok_or(BookingError::Unauthenticated)
    }

    pub fn require_admin(&self) -> BookingResult<()> {
        match (self.role, &self.user_id) {
            (_, None) => Err(BookingError::Unauthenticated),
            (Role::Admin, Some(_)) => Ok(()),
            (Role::User, Some(_)) => Err(BookingError::Forbidden),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_role_without_identity_is_unauthenticated() {
        let nameless = Caller {
            user_id: None,
            role: Role::Admin,
        };
        assert!(matches!(nameless.require_admin(), Err(BookingError::Unauthenticated)));
        assert!(matches!(Caller::user("u1").require_admin(), Err(BookingError::Forbidden)));
        assert!(Caller::admin("ops").require_admin().is_ok());
    }
}
