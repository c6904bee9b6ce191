use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hubkeeper::auth::{Authenticator, Authn, password};
use hubkeeper::config::ServerConfig;
use hubkeeper::lifecycle::CascadeReport;
use hubkeeper::service::{NewRepository, NewUser, Registry};
use hubkeeper::store::{SqliteStore, Store};
use hubkeeper::types::{MemberPrivilege, OrgRole, ROOT_USER, Status, SystemRole, TeamRole, User};

#[derive(Parser)]
#[command(name = "hubkeeper")]
#[command(about = "Registry authorization and lifecycle administration", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory holding the database; overrides the config file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and the root administrator
    Init {
        /// Password for the root user (prompted if omitted)
        #[arg(long)]
        root_password: Option<String>,

        /// Skip interactive prompts
        #[arg(long)]
        non_interactive: bool,
    },

    /// Check credentials against the configured authentication backend
    Login {
        username: String,

        #[arg(long)]
        password: Option<String>,
    },

    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Manage organizations
    Org {
        #[command(subcommand)]
        command: OrgCommands,
    },

    /// Manage teams
    Team {
        #[command(subcommand)]
        command: TeamCommands,
    },

    /// Manage repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },

    /// Deactivate an entity and everything that depends on it
    Suspend {
        #[command(subcommand)]
        target: Target,

        #[command(flatten)]
        actor: Actor,
    },

    /// Reactivate an entity and everything that depends on it
    Restore {
        #[command(subcommand)]
        target: Target,

        #[command(flatten)]
        actor: Actor,
    },
}

/// Credentials of the user performing a privileged command.
#[derive(Args)]
struct Actor {
    /// User to act as
    #[arg(long = "as", value_name = "USER", global = true, default_value = ROOT_USER)]
    acting_user: String,

    /// Password of the acting user (prompted if omitted)
    #[arg(long, global = true)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user
    Add {
        name: String,

        #[arg(long)]
        email: String,

        /// Initial password for the new user
        #[arg(long)]
        user_password: String,

        #[arg(long)]
        real_name: Option<String>,

        /// Grant the system administrator role
        #[arg(long)]
        admin: bool,

        #[command(flatten)]
        actor: Actor,
    },

    /// Print a user record
    Show { name: String },

    /// List users ordered by name
    List {
        #[command(flatten)]
        page: Page,
    },
}

/// Name-ordered pagination.
#[derive(Args)]
struct Page {
    /// Start after this name
    #[arg(long, default_value = "")]
    after: String,

    #[arg(long, default_value_t = 100)]
    limit: i32,
}

#[derive(Subcommand)]
enum OrgCommands {
    /// Create an organization owned by the acting user
    Add {
        name: String,

        /// Default member access: write, read or none
        #[arg(long, default_value = "read")]
        privilege: String,

        #[command(flatten)]
        actor: Actor,
    },

    /// List organizations ordered by name
    List {
        #[command(flatten)]
        page: Page,
    },

    /// List the members of an organization
    Members { org: String },

    /// Add a user to an organization
    AddMember {
        org: String,
        user: String,

        /// Make the user an organization administrator
        #[arg(long)]
        admin: bool,

        #[command(flatten)]
        actor: Actor,
    },
}

#[derive(Subcommand)]
enum TeamCommands {
    /// Create a team in an organization
    Add {
        org: String,
        name: String,

        #[arg(long)]
        comment: Option<String>,

        #[command(flatten)]
        actor: Actor,
    },

    /// List the teams of an organization
    List { org: String },

    /// List the members of a team
    Members { org: String, name: String },

    /// Add an organization member to a team
    AddMember {
        org: String,
        name: String,
        user: String,

        /// Make the user a team administrator
        #[arg(long)]
        admin: bool,

        #[command(flatten)]
        actor: Actor,
    },
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Create a repository in a user or organization namespace
    Add {
        namespace: String,
        name: String,

        #[arg(long)]
        public: bool,

        #[arg(long)]
        comment: Option<String>,

        #[command(flatten)]
        actor: Actor,
    },

    /// List the repositories in a namespace
    List { namespace: String },
}

#[derive(Subcommand)]
enum Target {
    User { name: String },
    Org { name: String },
    Team { org: String, name: String },
    Member { org: String, user: String },
    Repo { namespace: String, name: String },
}

fn load_config(cli: &Cli) -> anyhow::Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    Ok(config)
}

fn open_store(config: &ServerConfig) -> anyhow::Result<Arc<SqliteStore>> {
    let db_path = config.db_path();
    if !db_path.exists() {
        bail!("Not initialized. Run 'hubkeeper init' first to create the database.");
    }
    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;
    Ok(Arc::new(store))
}

/// Store-backed services for every command except `init`.
struct Context {
    authn: Authn,
    registry: Registry,
}

impl Context {
    fn open(config: &ServerConfig) -> anyhow::Result<Self> {
        let store = open_store(config)?;
        let authn = Authn::from_config(&config.authn, store.clone(), None)?;
        info!("Using {} authentication", authn.strategy_name());
        Ok(Self {
            authn,
            registry: Registry::new(store),
        })
    }
}

#[cfg(unix)]
fn set_restrictive_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

fn prompt_password(message: &str) -> anyhow::Result<String> {
    Ok(inquire::Password::new(message)
        .without_confirmation()
        .prompt()?)
}

fn run_init(
    config: &ServerConfig,
    root_password: Option<String>,
    non_interactive: bool,
) -> anyhow::Result<()> {
    fs::create_dir_all(&config.data_dir)?;

    let db_path = config.db_path();
    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    #[cfg(unix)]
    set_restrictive_permissions(&db_path);

    if store.get_user(ROOT_USER)?.is_some() {
        bail!("Already initialized. Database exists at: {}", db_path.display());
    }

    let root_password = match root_password {
        Some(pw) => pw,
        None if non_interactive => bail!("--root-password is required with --non-interactive"),
        None => inquire::Password::new("Root password:").prompt()?,
    };
    if root_password.is_empty() {
        bail!("Root password cannot be empty");
    }

    let credentials = password::hash_new(&root_password);
    let now = Utc::now();
    store.create_user(&User {
        name: ROOT_USER.to_string(),
        email: "root@localhost".to_string(),
        password_hash: credentials.password_hash,
        salt: credentials.salt,
        real_name: None,
        comment: Some("system administrator".to_string()),
        system_role: SystemRole::SysAdmin,
        status: Status::Active,
        created_at: now,
        updated_at: now,
    })?;

    println!("Initialized database at {}", db_path.display());
    println!("Created user '{ROOT_USER}'");
    Ok(())
}

/// Authenticates the acting user through the configured backend.
fn authenticate(authn: &Authn, actor: &Actor) -> anyhow::Result<User> {
    let password = match &actor.password {
        Some(pw) => pw.clone(),
        None => prompt_password(&format!("Password for {}:", actor.acting_user))?,
    };
    Ok(authn.authenticate(&actor.acting_user, &password)?)
}

fn print_report(report: &CascadeReport) {
    println!("{} is now {}", report.entity, report.status);
    for (relation, rows) in &report.cascaded {
        println!("  {relation}: {rows}");
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_transition(
    registry: &Registry,
    actor: &User,
    target: Target,
    suspend: bool,
) -> anyhow::Result<CascadeReport> {
    let report = match (target, suspend) {
        (Target::User { name }, true) => registry.deactivate_user(actor, &name)?,
        (Target::User { name }, false) => registry.activate_user(actor, &name)?,
        (Target::Org { name }, true) => registry.deactivate_organization(actor, &name)?,
        (Target::Org { name }, false) => registry.activate_organization(actor, &name)?,
        (Target::Team { org, name }, true) => registry.deactivate_team(actor, &org, &name)?,
        (Target::Team { org, name }, false) => registry.activate_team(actor, &org, &name)?,
        (Target::Member { org, user }, true) => {
            registry.deactivate_org_membership(actor, &org, &user)?
        }
        (Target::Member { org, user }, false) => {
            registry.activate_org_membership(actor, &org, &user)?
        }
        (Target::Repo { namespace, name }, true) => {
            registry.deactivate_repository(actor, &namespace, &name)?
        }
        (Target::Repo { namespace, name }, false) => {
            registry.activate_repository(actor, &namespace, &name)?
        }
    };
    Ok(report)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hubkeeper=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Init {
            root_password,
            non_interactive,
        } => {
            run_init(&config, root_password, non_interactive)?;
        }
        Commands::Login { username, password } => {
            let ctx = Context::open(&config)?;
            let actor = Actor {
                acting_user: username,
                password,
            };
            let user = authenticate(&ctx.authn, &actor)?;
            println!("Authenticated as '{}'", user.name);
            print_json(&user)?;
        }
        Commands::User { command } => {
            let ctx = Context::open(&config)?;
            match command {
                UserCommands::Add {
                    name,
                    email,
                    user_password,
                    real_name,
                    admin,
                    actor,
                } => {
                    let actor = authenticate(&ctx.authn, &actor)?;
                    let system_role = if admin {
                        SystemRole::SysAdmin
                    } else {
                        SystemRole::SysMember
                    };
                    let user = ctx.registry.create_user(
                        &actor,
                        NewUser {
                            name,
                            email,
                            password: user_password,
                            real_name,
                            comment: None,
                            system_role,
                        },
                    )?;
                    println!("Created user '{}'", user.name);
                }
                UserCommands::Show { name } => {
                    let user = ctx.registry.get_user(&name)?;
                    print_json(&user)?;
                }
                UserCommands::List { page } => {
                    print_json(&ctx.registry.list_users(&page.after, page.limit)?)?;
                }
            }
        }
        Commands::Org { command } => {
            let ctx = Context::open(&config)?;
            match command {
                OrgCommands::Add {
                    name,
                    privilege,
                    actor,
                } => {
                    let Some(privilege) = MemberPrivilege::parse(&privilege) else {
                        bail!("Unknown privilege '{privilege}'. Expected write, read or none.");
                    };
                    let actor = authenticate(&ctx.authn, &actor)?;
                    let org = ctx.registry.create_organization(&actor, &name, privilege)?;
                    println!("Created organization '{}'", org.name);
                }
                OrgCommands::List { page } => {
                    print_json(&ctx.registry.list_organizations(&page.after, page.limit)?)?;
                }
                OrgCommands::Members { org } => {
                    ctx.registry.get_organization(&org)?;
                    print_json(&ctx.registry.list_org_members(&org)?)?;
                }
                OrgCommands::AddMember {
                    org,
                    user,
                    admin,
                    actor,
                } => {
                    let actor = authenticate(&ctx.authn, &actor)?;
                    let role = if admin {
                        OrgRole::OrgAdmin
                    } else {
                        OrgRole::OrgMember
                    };
                    ctx.registry.add_org_member(&actor, &org, &user, role)?;
                    println!("Added '{user}' to organization '{org}' as {role}");
                }
            }
        }
        Commands::Team { command } => {
            let ctx = Context::open(&config)?;
            match command {
                TeamCommands::Add {
                    org,
                    name,
                    comment,
                    actor,
                } => {
                    let actor = authenticate(&ctx.authn, &actor)?;
                    let team = ctx.registry.create_team(&actor, &org, &name, comment)?;
                    println!("Created team '{}/{}'", team.org_name, team.name);
                }
                TeamCommands::List { org } => {
                    ctx.registry.get_organization(&org)?;
                    print_json(&ctx.registry.list_teams(&org)?)?;
                }
                TeamCommands::Members { org, name } => {
                    print_json(&ctx.registry.list_team_members(&org, &name)?)?;
                }
                TeamCommands::AddMember {
                    org,
                    name,
                    user,
                    admin,
                    actor,
                } => {
                    let actor = authenticate(&ctx.authn, &actor)?;
                    let role = if admin {
                        TeamRole::TeamAdmin
                    } else {
                        TeamRole::TeamMember
                    };
                    ctx.registry
                        .add_team_member(&actor, &org, &name, &user, role)?;
                    println!("Added '{user}' to team '{org}/{name}' as {role}");
                }
            }
        }
        Commands::Repo { command } => {
            let ctx = Context::open(&config)?;
            match command {
                RepoCommands::Add {
                    namespace,
                    name,
                    public,
                    comment,
                    actor,
                } => {
                    let actor = authenticate(&ctx.authn, &actor)?;
                    let repo = ctx.registry.create_repository(
                        &actor,
                        NewRepository {
                            namespace,
                            name,
                            is_public: public,
                            comment,
                        },
                    )?;
                    println!("Created repository '{}/{}'", repo.namespace, repo.name);
                }
                RepoCommands::List { namespace } => {
                    print_json(&ctx.registry.list_repositories(&namespace)?)?;
                }
            }
        }
        Commands::Suspend { target, actor } => {
            let ctx = Context::open(&config)?;
            let actor = authenticate(&ctx.authn, &actor)?;
            print_report(&run_transition(&ctx.registry, &actor, target, true)?);
        }
        Commands::Restore { target, actor } => {
            let ctx = Context::open(&config)?;
            let actor = authenticate(&ctx.authn, &actor)?;
            print_report(&run_transition(&ctx.registry, &actor, target, false)?);
        }
    }

    Ok(())
}
