pub const SCHEMA: &str = r#"
-- Users and organizations share one namespace; the store checks collisions
-- across both tables on insert.
CREATE TABLE IF NOT EXISTS users (
    name TEXT PRIMARY KEY,
    email TEXT NOT NULL,
    password_hash TEXT NOT NULL,   -- hex(md5(hex(md5(password)) || hex(md5(salt))))
    salt TEXT NOT NULL,            -- hex of 16 random bytes
    real_name TEXT,
    comment TEXT,
    system_role INTEGER NOT NULL DEFAULT 1,
    status INTEGER NOT NULL DEFAULT 0,  -- 0 = active, 1 = inactive
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS organizations (
    name TEXT PRIMARY KEY,
    member_privilege INTEGER NOT NULL DEFAULT 1,
    status INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS org_memberships (
    user_name TEXT NOT NULL REFERENCES users(name) ON DELETE CASCADE,
    org_name TEXT NOT NULL REFERENCES organizations(name) ON DELETE CASCADE,
    role INTEGER NOT NULL,
    status INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (user_name, org_name)
);

-- Team names are scoped per organization
CREATE TABLE IF NOT EXISTS teams (
    id TEXT PRIMARY KEY,
    org_name TEXT NOT NULL REFERENCES organizations(name) ON DELETE CASCADE,
    name TEXT NOT NULL,
    comment TEXT,
    status INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(org_name, name)
);

-- A team member must also hold a membership in the team's organization
CREATE TABLE IF NOT EXISTS team_memberships (
    team_id TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    user_name TEXT NOT NULL REFERENCES users(name) ON DELETE CASCADE,
    role INTEGER NOT NULL,
    status INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (team_id, user_name)
);

-- Repositories live in a user or organization namespace. The owner cannot be
-- a foreign key since it may point at either table; owner deletion removes
-- repositories explicitly.
CREATE TABLE IF NOT EXISTS repositories (
    id TEXT PRIMARY KEY,
    namespace TEXT NOT NULL,
    name TEXT NOT NULL,
    is_org_owned INTEGER NOT NULL DEFAULT 0,
    is_public INTEGER NOT NULL DEFAULT 0,
    comment TEXT,
    status INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(namespace, name)
);

-- Team access to repositories of the same organization
CREATE TABLE IF NOT EXISTS team_repo_grants (
    team_id TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    repo_id TEXT NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    permit INTEGER NOT NULL,
    status INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (team_id, repo_id)
);

-- Create indexes
CREATE INDEX IF NOT EXISTS idx_org_memberships_org ON org_memberships(org_name);
CREATE INDEX IF NOT EXISTS idx_teams_org ON teams(org_name);
CREATE INDEX IF NOT EXISTS idx_team_memberships_user ON team_memberships(user_name);
CREATE INDEX IF NOT EXISTS idx_repositories_namespace ON repositories(namespace);
CREATE INDEX IF NOT EXISTS idx_team_repo_grants_repo ON team_repo_grants(repo_id);
"#;
