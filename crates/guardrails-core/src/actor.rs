//! Actors and roles
//!
//! Identity is always passed in explicitly; nothing here reads ambient
//! session state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::types::OrgId;

/// Role of a member within an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Member,
}

impl Role {
    /// Admins and managers may author rules and resolve suggestions
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::Admin | Self::Manager)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "member" => Ok(Self::Member),
            other => Err(Error::forbidden(other, "act in an organization")),
        }
    }
}

/// The caller of an operation: which org, which user, which role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub org_id: OrgId,
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(org_id: impl Into<OrgId>, user_id: impl Into<String>, role: Role) -> Self {
        Self {
            org_id: org_id.into(),
            user_id: user_id.into(),
            role,
        }
    }

    /// Fail with [`Error::Forbidden`] unless the actor is an admin or manager
    pub fn require_privileged(&self, operation: &str) -> Result<()> {
        if self.role.is_privileged() {
            Ok(())
        } else {
            Err(Error::forbidden(self.role, operation))
        }
    }
}
