//! Role resolution over the System → Organization → Team hierarchy.
//!
//! The resolvers only read. Callers compare the resolved role against an
//! operation's allow-set with [`require`]; any mismatch, including "no role
//! at all", surfaces as the same [`Error::Unauthorized`].

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{OrgRole, Role, User};

/// Organization-level administration: update, delete, suspend, membership.
pub const ORG_ADMINS: &[Role] = &[Role::SysAdmin, Role::OrgAdmin];

/// Team-level administration: team updates, team members, repository grants.
pub const TEAM_ADMINS: &[Role] = &[Role::SysAdmin, Role::OrgAdmin, Role::TeamAdmin];

/// Effective role of `user` in organization `org_name`.
///
/// SysAdmin short-circuits, even for organizations that do not exist.
pub fn resolve_org_permission(
    store: &dyn Store,
    user: &User,
    org_name: &str,
) -> Result<Option<Role>> {
    if user.is_sys_admin() {
        return Ok(Some(Role::SysAdmin));
    }

    Ok(store
        .get_org_membership(&user.name, org_name)?
        .map(|m| Role::from(m.role)))
}

/// Effective role of `user` in team `team_name` of `org_name`.
///
/// An OrgAdmin of the organization administers every team in it without a
/// team membership row.
pub fn resolve_team_permission(
    store: &dyn Store,
    user: &User,
    org_name: &str,
    team_name: &str,
) -> Result<Option<Role>> {
    if user.is_sys_admin() {
        return Ok(Some(Role::SysAdmin));
    }

    if let Some(membership) = store.get_org_membership(&user.name, org_name)? {
        if membership.role == OrgRole::OrgAdmin {
            return Ok(Some(Role::OrgAdmin));
        }
    }

    let Some(team) = store.get_team(org_name, team_name)? else {
        return Ok(None);
    };
    Ok(store
        .get_team_membership(&team.id, &user.name)?
        .map(|m| Role::from(m.role)))
}

/// Checks a resolved role against an allow-set.
pub fn require(resolved: Option<Role>, allowed: &[Role]) -> Result<Role> {
    match resolved {
        Some(role) if allowed.contains(&role) => Ok(role),
        _ => Err(Error::Unauthorized),
    }
}

pub fn require_sys_admin(user: &User) -> Result<()> {
    if user.is_sys_admin() {
        Ok(())
    } else {
        Err(Error::Unauthorized)
    }
}

pub fn require_org_role(
    store: &dyn Store,
    user: &User,
    org_name: &str,
    allowed: &[Role],
) -> Result<Role> {
    require(resolve_org_permission(store, user, org_name)?, allowed)
}

pub fn require_team_role(
    store: &dyn Store,
    user: &User,
    org_name: &str,
    team_name: &str,
    allowed: &[Role],
) -> Result<Role> {
    require(
        resolve_team_permission(store, user, org_name, team_name)?,
        allowed,
    )
}

/// Management rights over a repository in `namespace`. Personal
/// repositories belong to the user whose name is the namespace; no
/// membership lookup is involved.
pub fn require_namespace_admin(
    store: &dyn Store,
    user: &User,
    namespace: &str,
    is_org_owned: bool,
) -> Result<()> {
    if is_org_owned {
        require_org_role(store, user, namespace, ORG_ADMINS).map(|_| ())
    } else if user.name == namespace {
        Ok(())
    } else {
        require_sys_admin(user)
    }
}
