use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MemberPrivilege, OrgRole, Permit, Status, SystemRole, TeamRole};

/// Name of the distinguished administrator account.
pub const ROOT_USER: &str = "root";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(skip)]
    pub salt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub system_role: SystemRole,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.name == ROOT_USER
    }

    #[must_use]
    pub fn is_sys_admin(&self) -> bool {
        self.system_role == SystemRole::SysAdmin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub name: String,
    pub member_privilege: MemberPrivilege,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgMembership {
    pub user_name: String,
    pub org_name: String,
    pub role: OrgRole,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub org_name: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMembership {
    pub team_id: String,
    pub user_name: String,
    pub role: TeamRole,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A repository lives in exactly one namespace, which is either an
/// organization name or a user name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub namespace: String,
    pub name: String,
    pub is_org_owned: bool,
    pub is_public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRepoGrant {
    pub team_id: String,
    pub repo_id: String,
    pub permit: Permit,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Replacement credentials produced by [`crate::auth::password::hash_new`].
#[derive(Debug, Clone)]
pub struct PasswordChange {
    pub password_hash: String,
    pub salt: String,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub real_name: Option<String>,
    pub comment: Option<String>,
    pub password: Option<PasswordChange>,
}

#[derive(Debug, Clone, Default)]
pub struct OrganizationPatch {
    pub member_privilege: Option<MemberPrivilege>,
}

#[derive(Debug, Clone, Default)]
pub struct TeamPatch {
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RepositoryPatch {
    pub is_public: Option<bool>,
    pub comment: Option<String>,
}
