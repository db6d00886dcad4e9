//! Identity types shared by the token layer and request handlers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Driver,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Driver => "driver",
            Self::Admin => "admin",
        }
    }
}

/// JWT claim set. `sub` is the driver id (or an admin identifier).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

/// The authenticated caller, injected into request extensions.
#[derive(Debug, Clone)]
pub struct Identity {
    pub subject: String,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True when the caller may act on the given driver's resources.
    pub fn can_act_for(&self, driver_id: &str) -> bool {
        self.is_admin() || self.subject == driver_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_acts_for_anyone() {
        let admin = Identity {
            subject: "ops-1".to_string(),
            role: Role::Admin,
        };
        assert!(admin.can_act_for("any-driver"));

        let driver = Identity {
            subject: "d1".to_string(),
            role: Role::Driver,
        };
        assert!(driver.can_act_for("d1"));
        assert!(!driver.can_act_for("d2"));
    }
}
