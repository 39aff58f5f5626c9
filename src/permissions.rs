// ABOUTME: Role-based permission table consulted by every vault-scoped handler
// ABOUTME: Roles are per-vault (stored on the membership row), never global to a user

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[sea_orm(string_value = "owner")]
    Owner,
    #[sea_orm(string_value = "contributor")]
    Contributor,
    #[sea_orm(string_value = "viewer")]
    Viewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "vault:create")]
    VaultCreate,
    #[serde(rename = "vault:read")]
    VaultRead,
    #[serde(rename = "vault:update")]
    VaultUpdate,
    #[serde(rename = "vault:delete")]
    VaultDelete,
    #[serde(rename = "source:create")]
    SourceCreate,
    #[serde(rename = "source:read")]
    SourceRead,
    #[serde(rename = "source:delete")]
    SourceDelete,
}

const OWNER_PERMISSIONS: &[Permission] = &[
    Permission::VaultCreate,
    Permission::VaultRead,
    Permission::VaultUpdate,
    Permission::VaultDelete,
    Permission::SourceCreate,
    Permission::SourceRead,
    Permission::SourceDelete,
];

const CONTRIBUTOR_PERMISSIONS: &[Permission] = &[
    Permission::VaultRead,
    Permission::VaultUpdate,
    Permission::SourceCreate,
    Permission::SourceRead,
];

const VIEWER_PERMISSIONS: &[Permission] = &[Permission::VaultRead, Permission::SourceRead];

impl Role {
    pub const ALL: [Role; 3] = [Role::Owner, Role::Contributor, Role::Viewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Contributor => "contributor",
            Role::Viewer => "viewer",
        }
    }

    /// Every action this role is allowed to perform.
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            Role::Owner => OWNER_PERMISSIONS,
            Role::Contributor => CONTRIBUTOR_PERMISSIONS,
            Role::Viewer => VIEWER_PERMISSIONS,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "contributor" => Ok(Role::Contributor),
            "viewer" => Ok(Role::Viewer),
            other => Err(format!(
                "Invalid role '{}'. Must be owner, contributor, or viewer",
                other
            )),
        }
    }
}

impl Permission {
    pub const ALL: [Permission; 7] = [
        Permission::VaultCreate,
        Permission::VaultRead,
        Permission::VaultUpdate,
        Permission::VaultDelete,
        Permission::SourceCreate,
        Permission::SourceRead,
        Permission::SourceDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::VaultCreate => "vault:create",
            Permission::VaultRead => "vault:read",
            Permission::VaultUpdate => "vault:update",
            Permission::VaultDelete => "vault:delete",
            Permission::SourceCreate => "source:create",
            Permission::SourceRead => "source:read",
            Permission::SourceDelete => "source:delete",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pure lookup against the fixed table; anything not listed is denied.
pub fn check_permission(role: Role, permission: Permission) -> bool {
    role.permissions().contains(&permission)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_has_every_permission() {
        for permission in Permission::ALL {
            assert!(check_permission(Role::Owner, permission), "{}", permission);
        }
    }

    #[test]
    fn test_contributor_permissions() {
        let allowed = [
            Permission::VaultRead,
            Permission::VaultUpdate,
            Permission::SourceCreate,
            Permission::SourceRead,
        ];
        for permission in Permission::ALL {
            assert_eq!(
                check_permission(Role::Contributor, permission),
                allowed.contains(&permission),
                "{}",
                permission
            );
        }
    }

    #[test]
    fn test_viewer_is_read_only() {
        for permission in Permission::ALL {
            let expected = matches!(permission, Permission::VaultRead | Permission::SourceRead);
            assert_eq!(check_permission(Role::Viewer, permission), expected);
        }
    }

    #[test]
    fn test_only_owner_may_delete() {
        let deleters: Vec<Role> = Role::ALL
            .into_iter()
            .filter(|role| {
                check_permission(*role, Permission::VaultDelete)
                    || check_permission(*role, Permission::SourceDelete)
            })
            .collect();
        assert_eq!(deleters, vec![Role::Owner]);
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("owner".parse::<Role>().unwrap(), Role::Owner);
        assert_eq!("viewer".parse::<Role>().unwrap(), Role::Viewer);
        assert!("admin".parse::<Role>().is_err());
        assert!("Owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&Permission::SourceDelete).unwrap(),
            "\"source:delete\""
        );
        assert_eq!(serde_json::to_string(&Role::Contributor).unwrap(), "\"contributor\"");
    }
}
