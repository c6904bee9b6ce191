use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use super::Store;
use super::schema::SCHEMA;
use super::unit_of_work::SqliteUnitOfWork;
use crate::error::{Error, Result};
use crate::lifecycle::{self, CascadeReport, EntityRef, Transition};
use crate::types::*;

const SELECT_USER: &str = "SELECT name, email, password_hash, salt, real_name, comment,
    system_role, status, created_at, updated_at FROM users";
const SELECT_ORGANIZATION: &str =
    "SELECT name, member_privilege, status, created_at, updated_at FROM organizations";
const SELECT_ORG_MEMBERSHIP: &str =
    "SELECT user_name, org_name, role, status, created_at, updated_at FROM org_memberships";
const SELECT_TEAM: &str =
    "SELECT id, org_name, name, comment, status, created_at, updated_at FROM teams";
const SELECT_TEAM_MEMBERSHIP: &str =
    "SELECT team_id, user_name, role, status, created_at, updated_at FROM team_memberships";
const SELECT_REPOSITORY: &str = "SELECT id, namespace, name, is_org_owned, is_public, comment,
    status, created_at, updated_at FROM repositories";
const SELECT_GRANT: &str =
    "SELECT team_id, repo_id, permit, status, created_at, updated_at FROM team_repo_grants";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        // Other processes may hold the write lock while they run a transition
        conn.busy_timeout(Duration::from_secs(5))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

pub(super) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Maps insert failures onto domain errors: duplicate keys become
/// `AlreadyExists`, dangling references become `NotFound`.
fn insert_error(err: rusqlite::Error) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            match e.extended_code {
                rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE => {
                    Error::AlreadyExists
                }
                rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Error::NotFound,
                _ => Error::ConstraintViolation(err.to_string()),
            }
        }
        _ => Error::from(err),
    }
}

/// Resolves an UPDATE guarded by `status = 0` that touched no row: the target
/// is either missing or inactive.
fn guard_failure<P: rusqlite::Params>(conn: &Connection, status_sql: &str, params: P) -> Error {
    match conn
        .query_row(status_sql, params, |row| row.get::<_, Status>(0))
        .optional()
    {
        Ok(Some(_)) => Error::NotActive,
        Ok(None) => Error::NotFound,
        Err(e) => Error::from(e),
    }
}

/// Checks that the parent row a new child hangs off is present and Active.
fn require_active<P: rusqlite::Params>(
    conn: &Connection,
    status_sql: &str,
    params: P,
) -> Result<()> {
    match conn
        .query_row(status_sql, params, |row| row.get::<_, Status>(0))
        .optional()?
    {
        Some(Status::Active) => Ok(()),
        Some(Status::Inactive) => Err(Error::NotActive),
        None => Err(Error::NotFound),
    }
}

fn insert_organization(conn: &Connection, org: &Organization) -> Result<()> {
    if exists(conn, "SELECT 1 FROM users WHERE name = ?1", params![org.name])? {
        return Err(Error::ConstraintViolation(format!(
            "name '{}' is already used by a user",
            org.name
        )));
    }

    conn.execute(
        "INSERT INTO organizations (name, member_privilege, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            org.name,
            org.member_privilege,
            org.status,
            format_datetime(&org.created_at),
            format_datetime(&org.updated_at),
        ],
    )
    .map_err(insert_error)?;
    Ok(())
}

fn insert_org_membership(conn: &Connection, membership: &OrgMembership) -> Result<()> {
    require_active(
        conn,
        "SELECT status FROM organizations WHERE name = ?1",
        params![membership.org_name],
    )?;
    require_active(
        conn,
        "SELECT status FROM users WHERE name = ?1",
        params![membership.user_name],
    )?;

    conn.execute(
        "INSERT INTO org_memberships (user_name, org_name, role, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            membership.user_name,
            membership.org_name,
            membership.role,
            membership.status,
            format_datetime(&membership.created_at),
            format_datetime(&membership.updated_at),
        ],
    )
    .map_err(insert_error)?;
    Ok(())
}

fn exists<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<bool> {
    Ok(conn
        .query_row(sql, params, |_| Ok(()))
        .optional()?
        .is_some())
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        name: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        salt: row.get(3)?,
        real_name: row.get(4)?,
        comment: row.get(5)?,
        system_role: row.get(6)?,
        status: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
        updated_at: parse_datetime(&row.get::<_, String>(9)?),
    })
}

fn organization_from_row(row: &Row<'_>) -> rusqlite::Result<Organization> {
    Ok(Organization {
        name: row.get(0)?,
        member_privilege: row.get(1)?,
        status: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        updated_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn org_membership_from_row(row: &Row<'_>) -> rusqlite::Result<OrgMembership> {
    Ok(OrgMembership {
        user_name: row.get(0)?,
        org_name: row.get(1)?,
        role: row.get(2)?,
        status: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn team_from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        org_name: row.get(1)?,
        name: row.get(2)?,
        comment: row.get(3)?,
        status: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn team_membership_from_row(row: &Row<'_>) -> rusqlite::Result<TeamMembership> {
    Ok(TeamMembership {
        team_id: row.get(0)?,
        user_name: row.get(1)?,
        role: row.get(2)?,
        status: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn repository_from_row(row: &Row<'_>) -> rusqlite::Result<Repository> {
    Ok(Repository {
        id: row.get(0)?,
        namespace: row.get(1)?,
        name: row.get(2)?,
        is_org_owned: row.get(3)?,
        is_public: row.get(4)?,
        comment: row.get(5)?,
        status: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        updated_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn grant_from_row(row: &Row<'_>) -> rusqlite::Result<TeamRepoGrant> {
    Ok(TeamRepoGrant {
        team_id: row.get(0)?,
        repo_id: row.get(1)?,
        permit: row.get(2)?,
        status: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

impl SqliteStore {
    fn query_one<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Option<T>>
    where
        P: rusqlite::Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.conn();
        conn.query_row(sql, params, map)
            .optional()
            .map_err(Error::from)
    }

    fn query_all<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Vec<T>>
    where
        P: rusqlite::Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, map)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Runs a status-guarded UPDATE and reports `NotFound`/`NotActive` when
    /// it matched nothing. The check runs under the same connection lock.
    fn guarded_update(
        &self,
        update_sql: &str,
        update_params: &[&dyn ToSql],
        status_sql: &str,
        key_params: &[&dyn ToSql],
    ) -> Result<()> {
        let conn = self.conn();
        let rows = conn.execute(update_sql, update_params)?;
        if rows == 0 {
            return Err(guard_failure(&conn, status_sql, key_params));
        }
        Ok(())
    }
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !user.is_root()
            && exists(
                &tx,
                "SELECT 1 FROM organizations WHERE name = ?1",
                params![user.name],
            )?
        {
            return Err(Error::ConstraintViolation(format!(
                "name '{}' is already used by an organization",
                user.name
            )));
        }

        tx.execute(
            "INSERT INTO users (name, email, password_hash, salt, real_name, comment,
                                system_role, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                user.name,
                user.email,
                user.password_hash,
                user.salt,
                user.real_name,
                user.comment,
                user.system_role,
                user.status,
                format_datetime(&user.created_at),
                format_datetime(&user.updated_at),
            ],
        )
        .map_err(insert_error)?;

        tx.commit()?;
        Ok(())
    }

    fn get_user(&self, name: &str) -> Result<Option<User>> {
        self.query_one(
            &format!("{SELECT_USER} WHERE name = ?1"),
            params![name],
            user_from_row,
        )
    }

    fn list_users(&self, cursor: &str, limit: i32) -> Result<Vec<User>> {
        self.query_all(
            &format!("{SELECT_USER} WHERE name > ?1 ORDER BY name LIMIT ?2"),
            params![cursor, limit],
            user_from_row,
        )
    }

    fn update_user(&self, name: &str, patch: &UserPatch) -> Result<()> {
        let (password_hash, salt) = match &patch.password {
            Some(change) => (Some(&change.password_hash), Some(&change.salt)),
            None => (None, None),
        };
        let now = format_datetime(&Utc::now());

        self.guarded_update(
            "UPDATE users SET
                email = COALESCE(?1, email),
                real_name = COALESCE(?2, real_name),
                comment = COALESCE(?3, comment),
                password_hash = COALESCE(?4, password_hash),
                salt = COALESCE(?5, salt),
                updated_at = ?6
             WHERE name = ?7 AND status = 0",
            params![
                patch.email,
                patch.real_name,
                patch.comment,
                password_hash,
                salt,
                now,
                name
            ],
            "SELECT status FROM users WHERE name = ?1",
            params![name],
        )
    }

    fn delete_user(&self, name: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM repositories WHERE namespace = ?1 AND is_org_owned = 0",
            params![name],
        )?;
        let rows = tx.execute("DELETE FROM users WHERE name = ?1", params![name])?;

        tx.commit()?;
        Ok(rows > 0)
    }

    // Organization operations

    fn create_organization(&self, org: &Organization) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_organization(&tx, org)?;
        tx.commit()?;
        Ok(())
    }

    fn create_organization_with_admin(
        &self,
        org: &Organization,
        admin: &OrgMembership,
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_organization(&tx, org)?;
        insert_org_membership(&tx, admin)?;
        tx.commit()?;
        Ok(())
    }

    fn get_organization(&self, name: &str) -> Result<Option<Organization>> {
        self.query_one(
            &format!("{SELECT_ORGANIZATION} WHERE name = ?1"),
            params![name],
            organization_from_row,
        )
    }

    fn list_organizations(&self, cursor: &str, limit: i32) -> Result<Vec<Organization>> {
        self.query_all(
            &format!("{SELECT_ORGANIZATION} WHERE name > ?1 ORDER BY name LIMIT ?2"),
            params![cursor, limit],
            organization_from_row,
        )
    }

    fn update_organization(&self, name: &str, patch: &OrganizationPatch) -> Result<()> {
        self.guarded_update(
            "UPDATE organizations SET
                member_privilege = COALESCE(?1, member_privilege),
                updated_at = ?2
             WHERE name = ?3 AND status = 0",
            params![
                patch.member_privilege,
                format_datetime(&Utc::now()),
                name
            ],
            "SELECT status FROM organizations WHERE name = ?1",
            params![name],
        )
    }

    fn delete_organization(&self, name: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM repositories WHERE namespace = ?1 AND is_org_owned = 1",
            params![name],
        )?;
        let rows = tx.execute("DELETE FROM organizations WHERE name = ?1", params![name])?;

        tx.commit()?;
        Ok(rows > 0)
    }

    // Organization membership operations

    fn create_org_membership(&self, membership: &OrgMembership) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_org_membership(&tx, membership)?;
        tx.commit()?;
        Ok(())
    }

    fn get_org_membership(
        &self,
        user_name: &str,
        org_name: &str,
    ) -> Result<Option<OrgMembership>> {
        self.query_one(
            &format!("{SELECT_ORG_MEMBERSHIP} WHERE user_name = ?1 AND org_name = ?2"),
            params![user_name, org_name],
            org_membership_from_row,
        )
    }

    fn list_org_memberships(&self, org_name: &str) -> Result<Vec<OrgMembership>> {
        self.query_all(
            &format!("{SELECT_ORG_MEMBERSHIP} WHERE org_name = ?1 ORDER BY user_name"),
            params![org_name],
            org_membership_from_row,
        )
    }

    fn list_user_org_memberships(&self, user_name: &str) -> Result<Vec<OrgMembership>> {
        self.query_all(
            &format!("{SELECT_ORG_MEMBERSHIP} WHERE user_name = ?1 ORDER BY org_name"),
            params![user_name],
            org_membership_from_row,
        )
    }

    fn update_org_membership_role(
        &self,
        user_name: &str,
        org_name: &str,
        role: OrgRole,
    ) -> Result<()> {
        self.guarded_update(
            "UPDATE org_memberships SET role = ?1, updated_at = ?2
             WHERE user_name = ?3 AND org_name = ?4 AND status = 0",
            params![role, format_datetime(&Utc::now()), user_name, org_name],
            "SELECT status FROM org_memberships WHERE user_name = ?1 AND org_name = ?2",
            params![user_name, org_name],
        )
    }

    fn delete_org_membership(&self, user_name: &str, org_name: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        // Team members must stay org members
        tx.execute(
            "DELETE FROM team_memberships
             WHERE user_name = ?1 AND team_id IN (SELECT id FROM teams WHERE org_name = ?2)",
            params![user_name, org_name],
        )?;
        let rows = tx.execute(
            "DELETE FROM org_memberships WHERE user_name = ?1 AND org_name = ?2",
            params![user_name, org_name],
        )?;

        tx.commit()?;
        Ok(rows > 0)
    }

    // Team operations

    fn create_team(&self, team: &Team) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        require_active(
            &tx,
            "SELECT status FROM organizations WHERE name = ?1",
            params![team.org_name],
        )?;

        tx.execute(
            "INSERT INTO teams (id, org_name, name, comment, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                team.id,
                team.org_name,
                team.name,
                team.comment,
                team.status,
                format_datetime(&team.created_at),
                format_datetime(&team.updated_at),
            ],
        )
        .map_err(insert_error)?;

        tx.commit()?;
        Ok(())
    }

    fn get_team(&self, org_name: &str, name: &str) -> Result<Option<Team>> {
        self.query_one(
            &format!("{SELECT_TEAM} WHERE org_name = ?1 AND name = ?2"),
            params![org_name, name],
            team_from_row,
        )
    }

    fn list_teams(&self, org_name: &str) -> Result<Vec<Team>> {
        self.query_all(
            &format!("{SELECT_TEAM} WHERE org_name = ?1 ORDER BY name"),
            params![org_name],
            team_from_row,
        )
    }

    fn update_team(&self, org_name: &str, name: &str, patch: &TeamPatch) -> Result<()> {
        self.guarded_update(
            "UPDATE teams SET comment = COALESCE(?1, comment), updated_at = ?2
             WHERE org_name = ?3 AND name = ?4 AND status = 0",
            params![patch.comment, format_datetime(&Utc::now()), org_name, name],
            "SELECT status FROM teams WHERE org_name = ?1 AND name = ?2",
            params![org_name, name],
        )
    }

    fn delete_team(&self, org_name: &str, name: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM teams WHERE org_name = ?1 AND name = ?2",
            params![org_name, name],
        )?;
        Ok(rows > 0)
    }

    // Team membership operations

    fn create_team_membership(&self, membership: &TeamMembership) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (org_name, team_status): (String, Status) = tx
            .query_row(
                "SELECT org_name, status FROM teams WHERE id = ?1",
                params![membership.team_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or(Error::NotFound)?;
        if !team_status.is_active() {
            return Err(Error::NotActive);
        }

        let org_membership: Option<Status> = tx
            .query_row(
                "SELECT status FROM org_memberships WHERE user_name = ?1 AND org_name = ?2",
                params![membership.user_name, org_name],
                |row| row.get(0),
            )
            .optional()?;
        match org_membership {
            Some(Status::Active) => {}
            Some(Status::Inactive) => return Err(Error::NotActive),
            None => {
                return Err(Error::ConstraintViolation(format!(
                    "user '{}' is not a member of organization '{}'",
                    membership.user_name, org_name
                )));
            }
        }

        tx.execute(
            "INSERT INTO team_memberships (team_id, user_name, role, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                membership.team_id,
                membership.user_name,
                membership.role,
                membership.status,
                format_datetime(&membership.created_at),
                format_datetime(&membership.updated_at),
            ],
        )
        .map_err(insert_error)?;

        tx.commit()?;
        Ok(())
    }

    fn get_team_membership(
        &self,
        team_id: &str,
        user_name: &str,
    ) -> Result<Option<TeamMembership>> {
        self.query_one(
            &format!("{SELECT_TEAM_MEMBERSHIP} WHERE team_id = ?1 AND user_name = ?2"),
            params![team_id, user_name],
            team_membership_from_row,
        )
    }

    fn list_team_memberships(&self, team_id: &str) -> Result<Vec<TeamMembership>> {
        self.query_all(
            &format!("{SELECT_TEAM_MEMBERSHIP} WHERE team_id = ?1 ORDER BY user_name"),
            params![team_id],
            team_membership_from_row,
        )
    }

    fn update_team_membership_role(
        &self,
        team_id: &str,
        user_name: &str,
        role: TeamRole,
    ) -> Result<()> {
        self.guarded_update(
            "UPDATE team_memberships SET role = ?1, updated_at = ?2
             WHERE team_id = ?3 AND user_name = ?4 AND status = 0",
            params![role, format_datetime(&Utc::now()), team_id, user_name],
            "SELECT status FROM team_memberships WHERE team_id = ?1 AND user_name = ?2",
            params![team_id, user_name],
        )
    }

    fn delete_team_membership(&self, team_id: &str, user_name: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM team_memberships WHERE team_id = ?1 AND user_name = ?2",
            params![team_id, user_name],
        )?;
        Ok(rows > 0)
    }

    // Repository operations

    fn create_repository(&self, repo: &Repository) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let owner_sql = if repo.is_org_owned {
            "SELECT status FROM organizations WHERE name = ?1"
        } else {
            "SELECT status FROM users WHERE name = ?1"
        };
        require_active(&tx, owner_sql, params![repo.namespace])?;

        tx.execute(
            "INSERT INTO repositories (id, namespace, name, is_org_owned, is_public, comment,
                                       status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                repo.id,
                repo.namespace,
                repo.name,
                repo.is_org_owned,
                repo.is_public,
                repo.comment,
                repo.status,
                format_datetime(&repo.created_at),
                format_datetime(&repo.updated_at),
            ],
        )
        .map_err(insert_error)?;

        tx.commit()?;
        Ok(())
    }

    fn get_repository(&self, namespace: &str, name: &str) -> Result<Option<Repository>> {
        self.query_one(
            &format!("{SELECT_REPOSITORY} WHERE namespace = ?1 AND name = ?2"),
            params![namespace, name],
            repository_from_row,
        )
    }

    fn list_repositories(&self, namespace: &str) -> Result<Vec<Repository>> {
        self.query_all(
            &format!("{SELECT_REPOSITORY} WHERE namespace = ?1 ORDER BY name"),
            params![namespace],
            repository_from_row,
        )
    }

    fn update_repository(
        &self,
        namespace: &str,
        name: &str,
        patch: &RepositoryPatch,
    ) -> Result<()> {
        self.guarded_update(
            "UPDATE repositories SET
                is_public = COALESCE(?1, is_public),
                comment = COALESCE(?2, comment),
                updated_at = ?3
             WHERE namespace = ?4 AND name = ?5 AND status = 0",
            params![
                patch.is_public,
                patch.comment,
                format_datetime(&Utc::now()),
                namespace,
                name
            ],
            "SELECT status FROM repositories WHERE namespace = ?1 AND name = ?2",
            params![namespace, name],
        )
    }

    fn delete_repository(&self, namespace: &str, name: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM repositories WHERE namespace = ?1 AND name = ?2",
            params![namespace, name],
        )?;
        Ok(rows > 0)
    }

    // Team repository grant operations

    fn create_team_repo_grant(&self, grant: &TeamRepoGrant) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (team_org, team_status): (String, Status) = tx
            .query_row(
                "SELECT org_name, status FROM teams WHERE id = ?1",
                params![grant.team_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or(Error::NotFound)?;

        let (namespace, is_org_owned, repo_status): (String, bool, Status) = tx
            .query_row(
                "SELECT namespace, is_org_owned, status FROM repositories WHERE id = ?1",
                params![grant.repo_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
            .ok_or(Error::NotFound)?;

        if !is_org_owned || namespace != team_org {
            return Err(Error::ConstraintViolation(format!(
                "repository must belong to organization '{team_org}'"
            )));
        }
        if !team_status.is_active() || !repo_status.is_active() {
            return Err(Error::NotActive);
        }

        tx.execute(
            "INSERT INTO team_repo_grants (team_id, repo_id, permit, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                grant.team_id,
                grant.repo_id,
                grant.permit,
                grant.status,
                format_datetime(&grant.created_at),
                format_datetime(&grant.updated_at),
            ],
        )
        .map_err(insert_error)?;

        tx.commit()?;
        Ok(())
    }

    fn get_team_repo_grant(&self, team_id: &str, repo_id: &str) -> Result<Option<TeamRepoGrant>> {
        self.query_one(
            &format!("{SELECT_GRANT} WHERE team_id = ?1 AND repo_id = ?2"),
            params![team_id, repo_id],
            grant_from_row,
        )
    }

    fn list_team_repo_grants(&self, team_id: &str) -> Result<Vec<TeamRepoGrant>> {
        self.query_all(
            &format!("{SELECT_GRANT} WHERE team_id = ?1 ORDER BY repo_id"),
            params![team_id],
            grant_from_row,
        )
    }

    fn update_team_repo_grant_permit(
        &self,
        team_id: &str,
        repo_id: &str,
        permit: Permit,
    ) -> Result<()> {
        self.guarded_update(
            "UPDATE team_repo_grants SET permit = ?1, updated_at = ?2
             WHERE team_id = ?3 AND repo_id = ?4 AND status = 0",
            params![permit, format_datetime(&Utc::now()), team_id, repo_id],
            "SELECT status FROM team_repo_grants WHERE team_id = ?1 AND repo_id = ?2",
            params![team_id, repo_id],
        )
    }

    fn delete_team_repo_grant(&self, team_id: &str, repo_id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM team_repo_grants WHERE team_id = ?1 AND repo_id = ?2",
            params![team_id, repo_id],
        )?;
        Ok(rows > 0)
    }

    // Status transitions

    fn transition(&self, entity: &EntityRef, transition: Transition) -> Result<CascadeReport> {
        let mut conn = self.conn();
        // IMMEDIATE takes the write lock before the guard read, so a concurrent
        // transition on the same row observes the committed result.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let report = {
            let mut uow = SqliteUnitOfWork::new(&tx);
            lifecycle::apply_transition(&mut uow, entity, transition)?
        };

        tx.commit()?;

        tracing::info!(
            "{} is now {} ({} dependent rows updated)",
            report.entity,
            report.status,
            report.total_rows()
        );
        Ok(report)
    }
}
