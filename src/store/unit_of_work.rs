use chrono::Utc;
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension};

use super::sqlite::format_datetime;
use crate::error::{Error, Result};
use crate::lifecycle::{EntityRef, Selector, UnitOfWork};
use crate::types::Status;

/// Runs cascade writes against a connection that is already inside a
/// transaction. Committing or rolling back is left to the caller.
pub(super) struct SqliteUnitOfWork<'c> {
    conn: &'c Connection,
    now: String,
}

impl<'c> SqliteUnitOfWork<'c> {
    pub(super) fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            now: format_datetime(&Utc::now()),
        }
    }
}

/// Table and named-key predicate identifying one entity row.
fn entity_key(entity: &EntityRef) -> (&'static str, &'static str, Vec<(&'static str, &str)>) {
    match entity {
        EntityRef::User { name } => ("users", "name = :name", vec![(":name", name.as_str())]),
        EntityRef::Organization { name } => (
            "organizations",
            "name = :name",
            vec![(":name", name.as_str())],
        ),
        EntityRef::Team { org, name } => (
            "teams",
            "org_name = :org AND name = :name",
            vec![(":org", org.as_str()), (":name", name.as_str())],
        ),
        EntityRef::OrgMembership { org, user } => (
            "org_memberships",
            "org_name = :org AND user_name = :user",
            vec![(":org", org.as_str()), (":user", user.as_str())],
        ),
        EntityRef::Repository { namespace, name } => (
            "repositories",
            "namespace = :namespace AND name = :name",
            vec![(":namespace", namespace.as_str()), (":name", name.as_str())],
        ),
    }
}

/// UPDATE statement for a selector. `?1` is the status, `?2` the update
/// timestamp, the returned keys bind from `?3` onwards.
fn selector_update(selector: &Selector) -> (&'static str, Vec<&str>) {
    match selector {
        Selector::OrgMembershipsOfOrg { org } => (
            "UPDATE org_memberships SET status = ?1, updated_at = ?2 WHERE org_name = ?3",
            vec![org.as_str()],
        ),
        Selector::RepositoriesOfOrg { org } => (
            "UPDATE repositories SET status = ?1, updated_at = ?2
             WHERE namespace = ?3 AND is_org_owned = 1",
            vec![org.as_str()],
        ),
        Selector::TeamsOfOrg { org } => (
            "UPDATE teams SET status = ?1, updated_at = ?2 WHERE org_name = ?3",
            vec![org.as_str()],
        ),
        Selector::TeamMembershipsOfOrg { org } => (
            "UPDATE team_memberships SET status = ?1, updated_at = ?2
             WHERE team_id IN (SELECT id FROM teams WHERE org_name = ?3)",
            vec![org.as_str()],
        ),
        Selector::TeamRepoGrantsOfOrg { org } => (
            "UPDATE team_repo_grants SET status = ?1, updated_at = ?2
             WHERE team_id IN (SELECT id FROM teams WHERE org_name = ?3)",
            vec![org.as_str()],
        ),
        Selector::TeamMembershipsOfTeam { org, team } => (
            "UPDATE team_memberships SET status = ?1, updated_at = ?2
             WHERE team_id IN (SELECT id FROM teams WHERE org_name = ?3 AND name = ?4)",
            vec![org.as_str(), team.as_str()],
        ),
        Selector::TeamRepoGrantsOfTeam { org, team } => (
            "UPDATE team_repo_grants SET status = ?1, updated_at = ?2
             WHERE team_id IN (SELECT id FROM teams WHERE org_name = ?3 AND name = ?4)",
            vec![org.as_str(), team.as_str()],
        ),
        Selector::TeamMembershipsOfUserInOrg { org, user } => (
            "UPDATE team_memberships SET status = ?1, updated_at = ?2
             WHERE user_name = ?3 AND team_id IN (SELECT id FROM teams WHERE org_name = ?4)",
            vec![user.as_str(), org.as_str()],
        ),
        Selector::TeamRepoGrantsOfRepository { namespace, name } => (
            "UPDATE team_repo_grants SET status = ?1, updated_at = ?2
             WHERE repo_id IN (SELECT id FROM repositories WHERE namespace = ?3 AND name = ?4)",
            vec![namespace.as_str(), name.as_str()],
        ),
        Selector::RepositoriesOfUser { user } => (
            "UPDATE repositories SET status = ?1, updated_at = ?2
             WHERE namespace = ?3 AND is_org_owned = 0",
            vec![user.as_str()],
        ),
        Selector::OrgMembershipsOfUser { user } => (
            "UPDATE org_memberships SET status = ?1, updated_at = ?2 WHERE user_name = ?3",
            vec![user.as_str()],
        ),
        Selector::TeamMembershipsOfUser { user } => (
            "UPDATE team_memberships SET status = ?1, updated_at = ?2 WHERE user_name = ?3",
            vec![user.as_str()],
        ),
    }
}

impl UnitOfWork for SqliteUnitOfWork<'_> {
    fn status(&mut self, entity: &EntityRef) -> Result<Option<Status>> {
        let (table, predicate, keys) = entity_key(entity);
        let sql = format!("SELECT status FROM {table} WHERE {predicate}");
        let params: Vec<(&str, &dyn ToSql)> =
            keys.iter().map(|(n, v)| (*n, v as &dyn ToSql)).collect();

        self.conn
            .query_row(&sql, params.as_slice(), |row| row.get(0))
            .optional()
            .map_err(Error::from)
    }

    fn set_status(&mut self, entity: &EntityRef, status: Status) -> Result<()> {
        let (table, predicate, keys) = entity_key(entity);
        let sql =
            format!("UPDATE {table} SET status = :status, updated_at = :now WHERE {predicate}");
        let mut params: Vec<(&str, &dyn ToSql)> = vec![(":status", &status), (":now", &self.now)];
        params.extend(keys.iter().map(|(n, v)| (*n, v as &dyn ToSql)));

        let rows = self.conn.execute(&sql, params.as_slice())?;
        if rows != 1 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn set_selected_status(&mut self, selector: &Selector, status: Status) -> Result<usize> {
        let (sql, keys) = selector_update(selector);

        let mut params: Vec<&dyn ToSql> = vec![&status, &self.now];
        params.extend(keys.iter().map(|k| k as &dyn ToSql));

        Ok(self.conn.execute(sql, params.as_slice())?)
    }
}
