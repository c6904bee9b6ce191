mod schema;
mod sqlite;
mod unit_of_work;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::lifecycle::{CascadeReport, EntityRef, Transition};
use crate::types::*;

/// Store defines the database interface.
///
/// Update operations only touch business fields and require the target to be
/// active; status changes go exclusively through [`Store::transition`].
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, name: &str) -> Result<Option<User>>;
    fn list_users(&self, cursor: &str, limit: i32) -> Result<Vec<User>>;
    fn update_user(&self, name: &str, patch: &UserPatch) -> Result<()>;
    fn delete_user(&self, name: &str) -> Result<bool>;

    // Organization operations
    fn create_organization(&self, org: &Organization) -> Result<()>;
    /// Inserts an organization together with its first administrator, or neither.
    fn create_organization_with_admin(&self, org: &Organization, admin: &OrgMembership)
    -> Result<()>;
    fn get_organization(&self, name: &str) -> Result<Option<Organization>>;
    fn list_organizations(&self, cursor: &str, limit: i32) -> Result<Vec<Organization>>;
    fn update_organization(&self, name: &str, patch: &OrganizationPatch) -> Result<()>;
    fn delete_organization(&self, name: &str) -> Result<bool>;

    // Organization membership operations
    fn create_org_membership(&self, membership: &OrgMembership) -> Result<()>;
    fn get_org_membership(&self, user_name: &str, org_name: &str)
    -> Result<Option<OrgMembership>>;
    fn list_org_memberships(&self, org_name: &str) -> Result<Vec<OrgMembership>>;
    fn list_user_org_memberships(&self, user_name: &str) -> Result<Vec<OrgMembership>>;
    fn update_org_membership_role(&self, user_name: &str, org_name: &str, role: OrgRole)
    -> Result<()>;
    fn delete_org_membership(&self, user_name: &str, org_name: &str) -> Result<bool>;

    // Team operations
    fn create_team(&self, team: &Team) -> Result<()>;
    fn get_team(&self, org_name: &str, name: &str) -> Result<Option<Team>>;
    fn list_teams(&self, org_name: &str) -> Result<Vec<Team>>;
    fn update_team(&self, org_name: &str, name: &str, patch: &TeamPatch) -> Result<()>;
    fn delete_team(&self, org_name: &str, name: &str) -> Result<bool>;

    // Team membership operations
    fn create_team_membership(&self, membership: &TeamMembership) -> Result<()>;
    fn get_team_membership(&self, team_id: &str, user_name: &str)
    -> Result<Option<TeamMembership>>;
    fn list_team_memberships(&self, team_id: &str) -> Result<Vec<TeamMembership>>;
    fn update_team_membership_role(&self, team_id: &str, user_name: &str, role: TeamRole)
    -> Result<()>;
    fn delete_team_membership(&self, team_id: &str, user_name: &str) -> Result<bool>;

    // Repository operations
    fn create_repository(&self, repo: &Repository) -> Result<()>;
    fn get_repository(&self, namespace: &str, name: &str) -> Result<Option<Repository>>;
    fn list_repositories(&self, namespace: &str) -> Result<Vec<Repository>>;
    fn update_repository(&self, namespace: &str, name: &str, patch: &RepositoryPatch)
    -> Result<()>;
    fn delete_repository(&self, namespace: &str, name: &str) -> Result<bool>;

    // Team repository grant operations
    fn create_team_repo_grant(&self, grant: &TeamRepoGrant) -> Result<()>;
    fn get_team_repo_grant(&self, team_id: &str, repo_id: &str) -> Result<Option<TeamRepoGrant>>;
    fn list_team_repo_grants(&self, team_id: &str) -> Result<Vec<TeamRepoGrant>>;
    fn update_team_repo_grant_permit(&self, team_id: &str, repo_id: &str, permit: Permit)
    -> Result<()>;
    fn delete_team_repo_grant(&self, team_id: &str, repo_id: &str) -> Result<bool>;

    /// Activates or deactivates an entity together with its cascade set, in
    /// one transaction. Nothing is written if any step fails.
    fn transition(&self, entity: &EntityRef, transition: Transition) -> Result<CascadeReport>;
}
