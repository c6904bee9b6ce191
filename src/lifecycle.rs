//! Activate/deactivate state machine and its cascade table.
//!
//! Every entity kind declares the relation rows that depend on it
//! ([`cascade_set`]). A transition checks the guard, flips the entity and
//! then flips every dependent row, all through one [`UnitOfWork`]. The store
//! decides how the unit of work maps onto a transaction; this module never
//! touches storage directly.

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::types::Status;

/// Identifies one entity whose status can be transitioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityRef {
    User { name: String },
    Organization { name: String },
    Team { org: String, name: String },
    OrgMembership { org: String, user: String },
    Repository { namespace: String, name: String },
}

impl EntityRef {
    pub fn user(name: impl Into<String>) -> Self {
        Self::User { name: name.into() }
    }

    pub fn organization(name: impl Into<String>) -> Self {
        Self::Organization { name: name.into() }
    }

    pub fn team(org: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Team {
            org: org.into(),
            name: name.into(),
        }
    }

    pub fn org_membership(org: impl Into<String>, user: impl Into<String>) -> Self {
        Self::OrgMembership {
            org: org.into(),
            user: user.into(),
        }
    }

    pub fn repository(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Repository {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User { name } => write!(f, "user '{name}'"),
            Self::Organization { name } => write!(f, "organization '{name}'"),
            Self::Team { org, name } => write!(f, "team '{org}/{name}'"),
            Self::OrgMembership { org, user } => write!(f, "membership of '{user}' in '{org}'"),
            Self::Repository { namespace, name } => write!(f, "repository '{namespace}/{name}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Activate,
    Deactivate,
}

impl Transition {
    /// Status the entity must currently hold for the transition to proceed.
    #[must_use]
    pub const fn required(self) -> Status {
        match self {
            Self::Activate => Status::Inactive,
            Self::Deactivate => Status::Active,
        }
    }

    #[must_use]
    pub const fn target(self) -> Status {
        match self {
            Self::Activate => Status::Active,
            Self::Deactivate => Status::Inactive,
        }
    }

    fn guard_violation(self) -> Error {
        match self {
            Self::Activate => Error::AlreadyActive,
            Self::Deactivate => Error::NotActive,
        }
    }
}

/// Relation tables a cascade can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    OrgMemberships,
    Teams,
    TeamMemberships,
    Repositories,
    TeamRepoGrants,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OrgMemberships => "org memberships",
            Self::Teams => "teams",
            Self::TeamMemberships => "team memberships",
            Self::Repositories => "repositories",
            Self::TeamRepoGrants => "team repository grants",
        };
        f.write_str(name)
    }
}

/// A set of dependent rows, described by how they relate to the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    OrgMembershipsOfOrg { org: String },
    RepositoriesOfOrg { org: String },
    TeamsOfOrg { org: String },
    TeamMembershipsOfOrg { org: String },
    TeamRepoGrantsOfOrg { org: String },
    TeamMembershipsOfTeam { org: String, team: String },
    TeamRepoGrantsOfTeam { org: String, team: String },
    TeamMembershipsOfUserInOrg { org: String, user: String },
    TeamRepoGrantsOfRepository { namespace: String, name: String },
    RepositoriesOfUser { user: String },
    OrgMembershipsOfUser { user: String },
    TeamMembershipsOfUser { user: String },
}

impl Selector {
    #[must_use]
    pub fn relation(&self) -> Relation {
        match self {
            Self::OrgMembershipsOfOrg { .. } | Self::OrgMembershipsOfUser { .. } => {
                Relation::OrgMemberships
            }
            Self::RepositoriesOfOrg { .. } | Self::RepositoriesOfUser { .. } => {
                Relation::Repositories
            }
            Self::TeamsOfOrg { .. } => Relation::Teams,
            Self::TeamMembershipsOfOrg { .. }
            | Self::TeamMembershipsOfTeam { .. }
            | Self::TeamMembershipsOfUserInOrg { .. }
            | Self::TeamMembershipsOfUser { .. } => Relation::TeamMemberships,
            Self::TeamRepoGrantsOfOrg { .. }
            | Self::TeamRepoGrantsOfTeam { .. }
            | Self::TeamRepoGrantsOfRepository { .. } => Relation::TeamRepoGrants,
        }
    }
}

/// Rows that follow `entity` through every status transition.
///
/// Organizations reach two hops down so that no team, team membership or
/// grant of a suspended organization stays individually active.
#[must_use]
pub fn cascade_set(entity: &EntityRef) -> Vec<Selector> {
    match entity {
        EntityRef::Organization { name } => vec![
            Selector::OrgMembershipsOfOrg { org: name.clone() },
            Selector::RepositoriesOfOrg { org: name.clone() },
            Selector::TeamsOfOrg { org: name.clone() },
            Selector::TeamMembershipsOfOrg { org: name.clone() },
            Selector::TeamRepoGrantsOfOrg { org: name.clone() },
        ],
        EntityRef::Team { org, name } => vec![
            Selector::TeamMembershipsOfTeam {
                org: org.clone(),
                team: name.clone(),
            },
            Selector::TeamRepoGrantsOfTeam {
                org: org.clone(),
                team: name.clone(),
            },
        ],
        EntityRef::OrgMembership { org, user } => vec![Selector::TeamMembershipsOfUserInOrg {
            org: org.clone(),
            user: user.clone(),
        }],
        EntityRef::Repository { namespace, name } => {
            vec![Selector::TeamRepoGrantsOfRepository {
                namespace: namespace.clone(),
                name: name.clone(),
            }]
        }
        EntityRef::User { name } => vec![
            Selector::RepositoriesOfUser { user: name.clone() },
            Selector::OrgMembershipsOfUser { user: name.clone() },
            Selector::TeamMembershipsOfUser { user: name.clone() },
        ],
    }
}

/// Storage operations a transition needs. Implementations are expected to
/// run every call of one transition inside a single transaction and to roll
/// it back if [`apply_transition`] returns an error.
pub trait UnitOfWork {
    /// Current status of the entity, or `None` if it does not exist.
    fn status(&mut self, entity: &EntityRef) -> Result<Option<Status>>;

    fn set_status(&mut self, entity: &EntityRef, status: Status) -> Result<()>;

    /// Sets `status` on every row the selector reaches, returning the row count.
    fn set_selected_status(&mut self, selector: &Selector, status: Status) -> Result<usize>;
}

/// Outcome of a committed transition.
#[derive(Debug, Clone, Serialize)]
pub struct CascadeReport {
    pub entity: EntityRef,
    pub status: Status,
    pub cascaded: Vec<(Relation, usize)>,
}

impl CascadeReport {
    /// Number of rows of `relation` touched by the cascade.
    #[must_use]
    pub fn rows(&self, relation: Relation) -> usize {
        self.cascaded
            .iter()
            .filter(|(r, _)| *r == relation)
            .map(|(_, n)| n)
            .sum()
    }

    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.cascaded.iter().map(|(_, n)| n).sum()
    }
}

/// Runs the guard check, the entity write and the cascade writes in order.
///
/// Activation restores every row in the cascade set, including rows that
/// were deactivated on their own before the parent was.
pub fn apply_transition<U: UnitOfWork + ?Sized>(
    uow: &mut U,
    entity: &EntityRef,
    transition: Transition,
) -> Result<CascadeReport> {
    let current = uow.status(entity)?.ok_or(Error::NotFound)?;
    if current != transition.required() {
        return Err(transition.guard_violation());
    }

    let target = transition.target();
    uow.set_status(entity, target)?;

    let mut cascaded = Vec::new();
    for selector in cascade_set(entity) {
        let rows = uow.set_selected_status(&selector, target)?;
        cascaded.push((selector.relation(), rows));
    }

    Ok(CascadeReport {
        entity: entity.clone(),
        status: target,
        cascaded,
    })
}
