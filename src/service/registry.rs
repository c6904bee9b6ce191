use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::validation::{validate_namespace_name, validate_repo_name, validate_team_name};
use crate::auth::password;
use crate::authz::{
    ORG_ADMINS, TEAM_ADMINS, require_namespace_admin, require_org_role, require_sys_admin,
    require_team_role,
};
use crate::error::{Error, Result};
use crate::lifecycle::{CascadeReport, EntityRef, Transition};
use crate::store::Store;
use crate::types::*;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub real_name: Option<String>,
    pub comment: Option<String>,
    pub system_role: SystemRole,
}

#[derive(Debug, Clone)]
pub struct NewRepository {
    pub namespace: String,
    pub name: String,
    pub is_public: bool,
    pub comment: Option<String>,
}

/// Privileged registry operations. Every method takes the authenticated
/// acting user and checks it before touching the store.
#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn Store>,
}

impl Registry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    fn team(&self, org_name: &str, name: &str) -> Result<Team> {
        self.store.get_team(org_name, name)?.ok_or(Error::NotFound)
    }

    fn org_repository(&self, org_name: &str, name: &str) -> Result<Repository> {
        self.store
            .get_repository(org_name, name)?
            .filter(|r| r.is_org_owned)
            .ok_or(Error::NotFound)
    }

    fn found(deleted: bool) -> Result<()> {
        if deleted { Ok(()) } else { Err(Error::NotFound) }
    }

    // Users

    pub fn get_user(&self, name: &str) -> Result<User> {
        self.store.get_user(name)?.ok_or(Error::NotFound)
    }

    /// Users ordered by name, starting after `cursor` (empty for the first page).
    pub fn list_users(&self, cursor: &str, limit: i32) -> Result<Vec<User>> {
        self.store.list_users(cursor, limit)
    }

    /// Organizations `name` belongs to, including suspended memberships.
    pub fn list_user_organizations(&self, name: &str) -> Result<Vec<OrgMembership>> {
        self.store.list_user_org_memberships(name)
    }

    pub fn create_user(&self, actor: &User, new: NewUser) -> Result<User> {
        require_sys_admin(actor)?;
        validate_namespace_name(&new.name)?;

        let credentials = password::hash_new(&new.password);
        let now = Utc::now();
        let user = User {
            name: new.name,
            email: new.email,
            password_hash: credentials.password_hash,
            salt: credentials.salt,
            real_name: new.real_name,
            comment: new.comment,
            system_role: new.system_role,
            status: Status::Active,
            created_at: now,
            updated_at: now,
        };
        self.store.create_user(&user)?;

        tracing::info!("created user '{}'", user.name);
        Ok(user)
    }

    pub fn update_user(&self, actor: &User, name: &str, patch: &UserPatch) -> Result<()> {
        if actor.name != name {
            require_sys_admin(actor)?;
        }
        self.store.update_user(name, patch)
    }

    pub fn change_password(&self, actor: &User, name: &str, new_password: &str) -> Result<()> {
        let patch = UserPatch {
            password: Some(password::hash_new(new_password)),
            ..Default::default()
        };
        self.update_user(actor, name, &patch)
    }

    pub fn delete_user(&self, actor: &User, name: &str) -> Result<()> {
        require_sys_admin(actor)?;
        if name == ROOT_USER {
            return Err(Error::ConstraintViolation(
                "the root user cannot be deleted".to_string(),
            ));
        }
        Self::found(self.store.delete_user(name)?)?;

        tracing::info!("deleted user '{}'", name);
        Ok(())
    }

    pub fn deactivate_user(&self, actor: &User, name: &str) -> Result<CascadeReport> {
        require_sys_admin(actor)?;
        if name == ROOT_USER {
            return Err(Error::ConstraintViolation(
                "the root user cannot be deactivated".to_string(),
            ));
        }
        self.store
            .transition(&EntityRef::user(name), Transition::Deactivate)
    }

    pub fn activate_user(&self, actor: &User, name: &str) -> Result<CascadeReport> {
        require_sys_admin(actor)?;
        self.store
            .transition(&EntityRef::user(name), Transition::Activate)
    }

    // Organizations

    pub fn get_organization(&self, name: &str) -> Result<Organization> {
        self.store.get_organization(name)?.ok_or(Error::NotFound)
    }

    pub fn list_organizations(&self, cursor: &str, limit: i32) -> Result<Vec<Organization>> {
        self.store.list_organizations(cursor, limit)
    }

    /// Creates an organization with the acting user as its first OrgAdmin.
    pub fn create_organization(
        &self,
        actor: &User,
        name: &str,
        member_privilege: MemberPrivilege,
    ) -> Result<Organization> {
        validate_namespace_name(name)?;

        let now = Utc::now();
        let org = Organization {
            name: name.to_string(),
            member_privilege,
            status: Status::Active,
            created_at: now,
            updated_at: now,
        };
        let membership = OrgMembership {
            user_name: actor.name.clone(),
            org_name: org.name.clone(),
            role: OrgRole::OrgAdmin,
            status: Status::Active,
            created_at: now,
            updated_at: now,
        };
        self.store.create_organization_with_admin(&org, &membership)?;

        tracing::info!("created organization '{}' owned by '{}'", org.name, actor.name);
        Ok(org)
    }

    pub fn update_organization(
        &self,
        actor: &User,
        name: &str,
        patch: &OrganizationPatch,
    ) -> Result<()> {
        require_org_role(self.store(), actor, name, ORG_ADMINS)?;
        self.store.update_organization(name, patch)
    }

    pub fn delete_organization(&self, actor: &User, name: &str) -> Result<()> {
        require_org_role(self.store(), actor, name, ORG_ADMINS)?;
        Self::found(self.store.delete_organization(name)?)?;

        tracing::info!("deleted organization '{}'", name);
        Ok(())
    }

    pub fn deactivate_organization(&self, actor: &User, name: &str) -> Result<CascadeReport> {
        require_org_role(self.store(), actor, name, ORG_ADMINS)?;
        self.store
            .transition(&EntityRef::organization(name), Transition::Deactivate)
    }

    pub fn activate_organization(&self, actor: &User, name: &str) -> Result<CascadeReport> {
        require_org_role(self.store(), actor, name, ORG_ADMINS)?;
        self.store
            .transition(&EntityRef::organization(name), Transition::Activate)
    }

    // Organization memberships

    pub fn add_org_member(
        &self,
        actor: &User,
        org_name: &str,
        user_name: &str,
        role: OrgRole,
    ) -> Result<OrgMembership> {
        require_org_role(self.store(), actor, org_name, ORG_ADMINS)?;

        let now = Utc::now();
        let membership = OrgMembership {
            user_name: user_name.to_string(),
            org_name: org_name.to_string(),
            role,
            status: Status::Active,
            created_at: now,
            updated_at: now,
        };
        self.store.create_org_membership(&membership)?;
        Ok(membership)
    }

    pub fn update_org_member_role(
        &self,
        actor: &User,
        org_name: &str,
        user_name: &str,
        role: OrgRole,
    ) -> Result<()> {
        require_org_role(self.store(), actor, org_name, ORG_ADMINS)?;
        self.store
            .update_org_membership_role(user_name, org_name, role)
    }

    pub fn remove_org_member(&self, actor: &User, org_name: &str, user_name: &str) -> Result<()> {
        require_org_role(self.store(), actor, org_name, ORG_ADMINS)?;
        Self::found(self.store.delete_org_membership(user_name, org_name)?)
    }

    pub fn list_org_members(&self, org_name: &str) -> Result<Vec<OrgMembership>> {
        self.store.list_org_memberships(org_name)
    }

    pub fn deactivate_org_membership(
        &self,
        actor: &User,
        org_name: &str,
        user_name: &str,
    ) -> Result<CascadeReport> {
        require_org_role(self.store(), actor, org_name, ORG_ADMINS)?;
        self.store.transition(
            &EntityRef::org_membership(org_name, user_name),
            Transition::Deactivate,
        )
    }

    pub fn activate_org_membership(
        &self,
        actor: &User,
        org_name: &str,
        user_name: &str,
    ) -> Result<CascadeReport> {
        require_org_role(self.store(), actor, org_name, ORG_ADMINS)?;
        self.store.transition(
            &EntityRef::org_membership(org_name, user_name),
            Transition::Activate,
        )
    }

    // Teams

    pub fn create_team(
        &self,
        actor: &User,
        org_name: &str,
        name: &str,
        comment: Option<String>,
    ) -> Result<Team> {
        require_org_role(self.store(), actor, org_name, ORG_ADMINS)?;
        validate_team_name(name)?;

        let now = Utc::now();
        let team = Team {
            id: Uuid::new_v4().to_string(),
            org_name: org_name.to_string(),
            name: name.to_string(),
            comment,
            status: Status::Active,
            created_at: now,
            updated_at: now,
        };
        self.store.create_team(&team)?;
        Ok(team)
    }

    pub fn list_teams(&self, org_name: &str) -> Result<Vec<Team>> {
        self.store.list_teams(org_name)
    }

    pub fn update_team(
        &self,
        actor: &User,
        org_name: &str,
        name: &str,
        patch: &TeamPatch,
    ) -> Result<()> {
        require_team_role(self.store(), actor, org_name, name, TEAM_ADMINS)?;
        self.store.update_team(org_name, name, patch)
    }

    pub fn delete_team(&self, actor: &User, org_name: &str, name: &str) -> Result<()> {
        require_org_role(self.store(), actor, org_name, ORG_ADMINS)?;
        Self::found(self.store.delete_team(org_name, name)?)
    }

    pub fn deactivate_team(&self, actor: &User, org_name: &str, name: &str) -> Result<CascadeReport> {
        require_org_role(self.store(), actor, org_name, ORG_ADMINS)?;
        self.store
            .transition(&EntityRef::team(org_name, name), Transition::Deactivate)
    }

    pub fn activate_team(&self, actor: &User, org_name: &str, name: &str) -> Result<CascadeReport> {
        require_org_role(self.store(), actor, org_name, ORG_ADMINS)?;
        self.store
            .transition(&EntityRef::team(org_name, name), Transition::Activate)
    }

    // Team memberships

    pub fn add_team_member(
        &self,
        actor: &User,
        org_name: &str,
        team_name: &str,
        user_name: &str,
        role: TeamRole,
    ) -> Result<TeamMembership> {
        require_team_role(self.store(), actor, org_name, team_name, TEAM_ADMINS)?;
        let team = self.team(org_name, team_name)?;

        let now = Utc::now();
        let membership = TeamMembership {
            team_id: team.id,
            user_name: user_name.to_string(),
            role,
            status: Status::Active,
            created_at: now,
            updated_at: now,
        };
        self.store.create_team_membership(&membership)?;
        Ok(membership)
    }

    pub fn update_team_member_role(
        &self,
        actor: &User,
        org_name: &str,
        team_name: &str,
        user_name: &str,
        role: TeamRole,
    ) -> Result<()> {
        require_team_role(self.store(), actor, org_name, team_name, TEAM_ADMINS)?;
        let team = self.team(org_name, team_name)?;
        self.store
            .update_team_membership_role(&team.id, user_name, role)
    }

    pub fn remove_team_member(
        &self,
        actor: &User,
        org_name: &str,
        team_name: &str,
        user_name: &str,
    ) -> Result<()> {
        require_team_role(self.store(), actor, org_name, team_name, TEAM_ADMINS)?;
        let team = self.team(org_name, team_name)?;
        Self::found(self.store.delete_team_membership(&team.id, user_name)?)
    }

    pub fn list_team_members(&self, org_name: &str, team_name: &str) -> Result<Vec<TeamMembership>> {
        let team = self.team(org_name, team_name)?;
        self.store.list_team_memberships(&team.id)
    }

    // Team repository grants

    pub fn grant_team_repository(
        &self,
        actor: &User,
        org_name: &str,
        team_name: &str,
        repo_name: &str,
        permit: Permit,
    ) -> Result<TeamRepoGrant> {
        require_team_role(self.store(), actor, org_name, team_name, TEAM_ADMINS)?;
        let team = self.team(org_name, team_name)?;
        let repo = self.org_repository(org_name, repo_name)?;

        let now = Utc::now();
        let grant = TeamRepoGrant {
            team_id: team.id,
            repo_id: repo.id,
            permit,
            status: Status::Active,
            created_at: now,
            updated_at: now,
        };
        self.store.create_team_repo_grant(&grant)?;
        Ok(grant)
    }

    pub fn update_team_repository_permit(
        &self,
        actor: &User,
        org_name: &str,
        team_name: &str,
        repo_name: &str,
        permit: Permit,
    ) -> Result<()> {
        require_team_role(self.store(), actor, org_name, team_name, TEAM_ADMINS)?;
        let team = self.team(org_name, team_name)?;
        let repo = self.org_repository(org_name, repo_name)?;
        self.store
            .update_team_repo_grant_permit(&team.id, &repo.id, permit)
    }

    pub fn revoke_team_repository(
        &self,
        actor: &User,
        org_name: &str,
        team_name: &str,
        repo_name: &str,
    ) -> Result<()> {
        require_team_role(self.store(), actor, org_name, team_name, TEAM_ADMINS)?;
        let team = self.team(org_name, team_name)?;
        let repo = self.org_repository(org_name, repo_name)?;
        Self::found(self.store.delete_team_repo_grant(&team.id, &repo.id)?)
    }

    pub fn list_team_repositories(
        &self,
        org_name: &str,
        team_name: &str,
    ) -> Result<Vec<TeamRepoGrant>> {
        let team = self.team(org_name, team_name)?;
        self.store.list_team_repo_grants(&team.id)
    }

    // Repositories

    /// Whether `namespace` names an organization rather than a user. Names
    /// are shared, so at most one of the two exists.
    fn is_org_namespace(&self, namespace: &str) -> Result<bool> {
        Ok(self.store.get_organization(namespace)?.is_some())
    }

    fn require_repository_admin(&self, actor: &User, namespace: &str) -> Result<bool> {
        let is_org_owned = self.is_org_namespace(namespace)?;
        require_namespace_admin(self.store(), actor, namespace, is_org_owned)?;
        Ok(is_org_owned)
    }

    pub fn get_repository(&self, namespace: &str, name: &str) -> Result<Repository> {
        self.store
            .get_repository(namespace, name)?
            .ok_or(Error::NotFound)
    }

    pub fn list_repositories(&self, namespace: &str) -> Result<Vec<Repository>> {
        self.store.list_repositories(namespace)
    }

    pub fn create_repository(&self, actor: &User, new: NewRepository) -> Result<Repository> {
        let is_org_owned = self.require_repository_admin(actor, &new.namespace)?;
        validate_repo_name(&new.name)?;

        let now = Utc::now();
        let repo = Repository {
            id: Uuid::new_v4().to_string(),
            namespace: new.namespace,
            name: new.name,
            is_org_owned,
            is_public: new.is_public,
            comment: new.comment,
            status: Status::Active,
            created_at: now,
            updated_at: now,
        };
        self.store.create_repository(&repo)?;
        Ok(repo)
    }

    pub fn update_repository(
        &self,
        actor: &User,
        namespace: &str,
        name: &str,
        patch: &RepositoryPatch,
    ) -> Result<()> {
        self.require_repository_admin(actor, namespace)?;
        self.store.update_repository(namespace, name, patch)
    }

    pub fn delete_repository(&self, actor: &User, namespace: &str, name: &str) -> Result<()> {
        self.require_repository_admin(actor, namespace)?;
        Self::found(self.store.delete_repository(namespace, name)?)?;

        tracing::info!("deleted repository '{}/{}'", namespace, name);
        Ok(())
    }

    pub fn deactivate_repository(
        &self,
        actor: &User,
        namespace: &str,
        name: &str,
    ) -> Result<CascadeReport> {
        self.require_repository_admin(actor, namespace)?;
        self.store
            .transition(&EntityRef::repository(namespace, name), Transition::Deactivate)
    }

    pub fn activate_repository(
        &self,
        actor: &User,
        namespace: &str,
        name: &str,
    ) -> Result<CascadeReport> {
        self.require_repository_admin(actor, namespace)?;
        self.store
            .transition(&EntityRef::repository(namespace, name), Transition::Activate)
    }
}
