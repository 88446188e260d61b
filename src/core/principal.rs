//! Roles and the authenticated principal the service acts for

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::core::identity::EntityId;

/// User roles for authorization
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Everything, including reference data and user management
    Administrator,
    /// Entity CRUD, comments and relationships
    User,
    /// Read-only on entities; own comments and resolution
    Commenter,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::User => "user",
            Role::Commenter => "commenter",
        }
    }

    /// Check whether this role grants a permission
    pub fn allows(&self, permission: Permission) -> bool {
        match self {
            Role::Administrator => true,
            Role::User => !matches!(
                permission,
                Permission::ManageReferenceData
                    | Permission::ManageUsers
                    | Permission::ReconcileStatus
            ),
            Role::Commenter => matches!(
                permission,
                Permission::Read | Permission::Comment | Permission::ResolveComment
            ),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "administrator" | "admin" => Ok(Role::Administrator),
            "user" => Ok(Role::User),
            "commenter" => Ok(Role::Commenter),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Coarse-grained operations the role matrix is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Read,
    WriteEntities,
    DeleteEntities,
    Comment,
    ResolveComment,
    ManageRelationships,
    ManageReferenceData,
    ManageUsers,
    ReconcileStatus,
}

impl Permission {
    pub fn describe(&self) -> &'static str {
        match self {
            Permission::Read => "read entities",
            Permission::WriteEntities => "create or modify entities",
            Permission::DeleteEntities => "delete entities",
            Permission::Comment => "write comments",
            Permission::ResolveComment => "resolve comments",
            Permission::ManageRelationships => "manage requirement relationships",
            Permission::ManageReferenceData => "manage reference data",
            Permission::ManageUsers => "manage users",
            Permission::ReconcileStatus => "reconcile statuses",
        }
    }
}

/// The authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: EntityId,
    pub username: String,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: EntityId, username: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            username: username.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Administrator
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.role.allows(permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_administrator_can_do_everything() {
        for p in [
            Permission::Read,
            Permission::ManageReferenceData,
            Permission::ManageUsers,
            Permission::ReconcileStatus,
            Permission::DeleteEntities,
        ] {
            assert!(Role::Administrator.allows(p));
        }
    }

    #[test]
    fn test_user_cannot_touch_reference_data() {
        assert!(Role::User.allows(Permission::WriteEntities));
        assert!(Role::User.allows(Permission::ManageRelationships));
        assert!(!Role::User.allows(Permission::ManageReferenceData));
        assert!(!Role::User.allows(Permission::ManageUsers));
    }

    #[test]
    fn test_commenter_is_read_only_on_entities() {
        assert!(Role::Commenter.allows(Permission::Read));
        assert!(Role::Commenter.allows(Permission::Comment));
        assert!(Role::Commenter.allows(Permission::ResolveComment));
        assert!(!Role::Commenter.allows(Permission::WriteEntities));
        assert!(!Role::Commenter.allows(Permission::ManageRelationships));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Administrator);
        assert_eq!("commenter".parse::<Role>().unwrap(), Role::Commenter);
        assert!("guest".parse::<Role>().is_err());
    }
}
