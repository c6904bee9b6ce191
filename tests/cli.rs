//! CLI integration tests for hubkeeper administration commands.
//!
//! Each test uses an isolated temp directory for the database, ensuring tests
//! can run in parallel safely.

#![allow(deprecated)] // Command::cargo_bin deprecation only affects custom build dirs

use std::path::Path;

use assert_cmd::Command;
use assert_fs::TempDir;
use predicates::prelude::*;
use serde_json::Value;

const ROOT_PASSWORD: &str = "root-secret";

struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    fn data_dir_str(&self) -> String {
        self.data_dir().to_string_lossy().to_string()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("hubkeeper").expect("failed to find binary");
        cmd.env("NO_COLOR", "1");
        cmd.args(["--data-dir", &self.data_dir_str()]);
        cmd
    }

    fn init(&self) -> assert_cmd::assert::Assert {
        self.cmd()
            .args([
                "init",
                "--root-password",
                ROOT_PASSWORD,
                "--non-interactive",
            ])
            .assert()
    }

    /// Runs a command as root.
    fn as_root(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.cmd()
            .args(args)
            .args(["--password", ROOT_PASSWORD])
            .assert()
    }

    /// Runs a command as `user`.
    fn as_user(&self, user: &str, password: &str, args: &[&str]) -> assert_cmd::assert::Assert {
        self.cmd()
            .args(args)
            .args(["--as", user, "--password", password])
            .assert()
    }

    fn add_user(&self, name: &str, password: &str) {
        self.as_root(&[
            "user",
            "add",
            name,
            "--email",
            &format!("{name}@example.com"),
            "--user-password",
            password,
        ])
        .success()
        .stdout(predicate::str::contains(format!("Created user '{name}'")));
    }

    fn show_user(&self, name: &str) -> Value {
        let output = self
            .cmd()
            .args(["user", "show", name])
            .output()
            .expect("failed to run command");

        serde_json::from_slice(&output.stdout).expect("failed to parse JSON")
    }
}

#[test]
fn test_init_creates_database() {
    let ctx = TestContext::new();

    ctx.init()
        .success()
        .stdout(predicate::str::contains("Initialized database"))
        .stdout(predicate::str::contains("Created user 'root'"));

    assert!(ctx.data_dir().join("hubkeeper.db").exists());

    let root = ctx.show_user("root");
    assert_eq!(root["system_role"], "sys_admin");
    assert_eq!(root["status"], "active");
    assert!(root.get("password_hash").is_none());
}

#[test]
fn test_init_twice_fails() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.init()
        .failure()
        .stderr(predicate::str::contains("Already initialized"));
}

#[test]
fn test_init_non_interactive_requires_password() {
    let ctx = TestContext::new();

    ctx.cmd()
        .args(["init", "--non-interactive"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--root-password is required"));
}

#[test]
fn test_commands_require_init() {
    let ctx = TestContext::new();

    ctx.cmd()
        .args(["user", "show", "root"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not initialized"));
}

#[test]
fn test_login() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.cmd()
        .args(["login", "root", "--password", ROOT_PASSWORD])
        .assert()
        .success()
        .stdout(predicate::str::contains("Authenticated as 'root'"));

    ctx.cmd()
        .args(["login", "root", "--password", "wrong"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid credentials"));

    ctx.cmd()
        .args(["login", "nobody", "--password", "whatever"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid credentials"));
}

#[test]
fn test_user_add_and_login() {
    let ctx = TestContext::new();
    ctx.init().success();
    ctx.add_user("alice", "alice-pw");

    let alice = ctx.show_user("alice");
    assert_eq!(alice["email"], "alice@example.com");
    assert_eq!(alice["system_role"], "sys_member");

    ctx.cmd()
        .args(["login", "alice", "--password", "alice-pw"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Authenticated as 'alice'"));
}

#[test]
fn test_user_add_requires_sys_admin() {
    let ctx = TestContext::new();
    ctx.init().success();
    ctx.add_user("alice", "alice-pw");

    ctx.cmd()
        .args([
            "user",
            "add",
            "mallory",
            "--email",
            "mallory@example.com",
            "--user-password",
            "pw",
            "--as",
            "alice",
            "--password",
            "alice-pw",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unauthorized"));
}

#[test]
fn test_org_team_and_repo_add() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.as_root(&["org", "add", "acme", "--privilege", "write"])
        .success()
        .stdout(predicate::str::contains("Created organization 'acme'"));
    ctx.as_root(&["team", "add", "acme", "dev", "--comment", "developers"])
        .success()
        .stdout(predicate::str::contains("Created team 'acme/dev'"));
    ctx.as_root(&["repo", "add", "acme", "api", "--public"])
        .success()
        .stdout(predicate::str::contains("Created repository 'acme/api'"));

    // Organization names share the user namespace
    ctx.as_root(&["org", "add", "root"])
        .failure()
        .stderr(predicate::str::contains("constraint violation"));
}

#[test]
fn test_list_commands() {
    let ctx = TestContext::new();
    ctx.init().success();
    ctx.add_user("alice", "alice-pw");
    ctx.add_user("bob", "bob-pw");
    ctx.as_root(&["org", "add", "acme"]).success();
    ctx.as_root(&["team", "add", "acme", "dev"]).success();

    let output = ctx
        .cmd()
        .args(["user", "list", "--after", "alice", "--limit", "1"])
        .output()
        .expect("failed to run command");
    let users: Value = serde_json::from_slice(&output.stdout).expect("failed to parse JSON");
    assert_eq!(users.as_array().map(Vec::len), Some(1));
    assert_eq!(users[0]["name"], "bob");

    ctx.cmd()
        .args(["org", "members", "acme"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"role\": \"org_admin\""));

    ctx.cmd()
        .args(["team", "list", "acme"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"dev\""));

    ctx.cmd()
        .args(["team", "list", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_org_add_rejects_unknown_privilege() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.as_root(&["org", "add", "acme", "--privilege", "admin"])
        .failure()
        .stderr(predicate::str::contains("Unknown privilege 'admin'"));
}

#[test]
fn test_suspend_and_restore_organization() {
    let ctx = TestContext::new();
    ctx.init().success();
    ctx.as_root(&["org", "add", "acme"]).success();
    ctx.as_root(&["team", "add", "acme", "dev"]).success();
    ctx.as_root(&["repo", "add", "acme", "api"]).success();

    ctx.as_root(&["suspend", "org", "acme"])
        .success()
        .stdout(predicate::str::contains("organization 'acme' is now inactive"))
        .stdout(predicate::str::contains("teams: 1"))
        .stdout(predicate::str::contains("repositories: 1"));

    ctx.as_root(&["suspend", "org", "acme"])
        .failure()
        .stderr(predicate::str::contains("not active"));

    ctx.as_root(&["restore", "org", "acme"])
        .success()
        .stdout(predicate::str::contains("organization 'acme' is now active"));

    ctx.as_root(&["restore", "org", "acme"])
        .failure()
        .stderr(predicate::str::contains("already active"));
}

/// acme is administered by owen; alice is a member of acme and of team dev.
fn with_owned_org() -> TestContext {
    let ctx = TestContext::new();
    ctx.init().success();
    for name in ["owen", "alice", "mallory"] {
        ctx.add_user(name, &format!("{name}-pw"));
    }

    ctx.as_user("owen", "owen-pw", &["org", "add", "acme"])
        .success();
    ctx.as_user("owen", "owen-pw", &["org", "add-member", "acme", "alice"])
        .success()
        .stdout(predicate::str::contains(
            "Added 'alice' to organization 'acme' as org_member",
        ));
    ctx.as_user("owen", "owen-pw", &["team", "add", "acme", "dev"])
        .success();
    ctx.as_user("owen", "owen-pw", &["team", "add-member", "acme", "dev", "alice"])
        .success()
        .stdout(predicate::str::contains(
            "Added 'alice' to team 'acme/dev' as team_member",
        ));
    ctx.as_user("owen", "owen-pw", &["repo", "add", "acme", "api"])
        .success();
    ctx
}

#[test]
fn test_org_admin_suspends_membership() {
    let ctx = with_owned_org();

    ctx.as_user("owen", "owen-pw", &["suspend", "member", "acme", "alice"])
        .success()
        .stdout(predicate::str::contains(
            "membership of 'alice' in 'acme' is now inactive",
        ))
        .stdout(predicate::str::contains("team memberships: 1"));

    // The actor flags may also come before the target
    ctx.cmd()
        .args([
            "restore",
            "--as",
            "owen",
            "--password",
            "owen-pw",
            "member",
            "acme",
            "alice",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "membership of 'alice' in 'acme' is now active",
        ));
}

#[test]
fn test_org_admin_suspends_team_and_repository() {
    let ctx = with_owned_org();

    ctx.as_user("owen", "owen-pw", &["suspend", "team", "acme", "dev"])
        .success()
        .stdout(predicate::str::contains("team 'acme/dev' is now inactive"));
    ctx.as_user("owen", "owen-pw", &["restore", "team", "acme", "dev"])
        .success()
        .stdout(predicate::str::contains("team 'acme/dev' is now active"));

    ctx.as_user("owen", "owen-pw", &["suspend", "repo", "acme", "api"])
        .success()
        .stdout(predicate::str::contains("repository 'acme/api' is now inactive"));
    ctx.as_user("owen", "owen-pw", &["restore", "repo", "acme", "api"])
        .success()
        .stdout(predicate::str::contains("repository 'acme/api' is now active"));
}

#[test]
fn test_suspend_requires_permission() {
    let ctx = with_owned_org();

    ctx.as_user("mallory", "mallory-pw", &["suspend", "member", "acme", "alice"])
        .failure()
        .stderr(predicate::str::contains("unauthorized"));
    ctx.as_user("mallory", "mallory-pw", &["suspend", "team", "acme", "dev"])
        .failure()
        .stderr(predicate::str::contains("unauthorized"));
    // Organization administrators are not system administrators
    ctx.as_user("owen", "owen-pw", &["suspend", "user", "alice"])
        .failure()
        .stderr(predicate::str::contains("unauthorized"));
    ctx.as_user("owen", "wrong", &["suspend", "member", "acme", "alice"])
        .failure()
        .stderr(predicate::str::contains("invalid credentials"));
}

#[test]
fn test_suspended_organization_accepts_no_new_teams() {
    let ctx = with_owned_org();

    ctx.as_user("owen", "owen-pw", &["suspend", "org", "acme"])
        .success();
    ctx.as_user("owen", "owen-pw", &["team", "add", "acme", "ops"])
        .failure()
        .stderr(predicate::str::contains("not active"));
}

#[test]
fn test_suspended_user_cannot_login() {
    let ctx = TestContext::new();
    ctx.init().success();
    ctx.add_user("alice", "alice-pw");

    ctx.as_root(&["suspend", "user", "alice"])
        .success()
        .stdout(predicate::str::contains("user 'alice' is now inactive"));

    ctx.cmd()
        .args(["login", "alice", "--password", "alice-pw"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("user is inactive"));

    ctx.as_root(&["restore", "user", "alice"]).success();
    ctx.cmd()
        .args(["login", "alice", "--password", "alice-pw"])
        .assert()
        .success();
}

#[test]
fn test_root_cannot_be_suspended() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.as_root(&["suspend", "user", "root"])
        .failure()
        .stderr(predicate::str::contains("constraint violation"));
}

#[test]
fn test_config_file_selects_data_dir() {
    let ctx = TestContext::new();
    let data_dir = ctx.data_dir().join("from-config");
    let config_path = ctx.data_dir().join("hubkeeper.toml");
    std::fs::write(
        &config_path,
        format!(
            "data_dir = {:?}\n\n[authn]\nmode = \"authn_db\"\n",
            data_dir.to_string_lossy()
        ),
    )
    .expect("failed to write config");

    Command::cargo_bin("hubkeeper")
        .expect("failed to find binary")
        .args(["--config", &config_path.to_string_lossy()])
        .args(["init", "--root-password", ROOT_PASSWORD, "--non-interactive"])
        .assert()
        .success();

    assert!(data_dir.join("hubkeeper.db").exists());
}

#[test]
fn test_config_file_rejects_unknown_mode() {
    let ctx = TestContext::new();
    let config_path = ctx.data_dir().join("hubkeeper.toml");
    std::fs::write(&config_path, "[authn]\nmode = \"authn_kerberos\"\n")
        .expect("failed to write config");

    Command::cargo_bin("hubkeeper")
        .expect("failed to find binary")
        .args(["--config", &config_path.to_string_lossy()])
        .args(["user", "show", "root"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("authn_kerberos"));
}
