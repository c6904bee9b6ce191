mod ldap;
mod local;
pub mod password;
mod sso;
mod tls;

use std::sync::Arc;

pub use ldap::{DirectoryClient, DirectorySession, LdapAuthenticator, escape_filter_value};
pub use local::LocalAuthenticator;
pub use sso::SsoAuthenticator;
pub use tls::TlsSettings;

use crate::config::{AuthnConfig, AuthnMode};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{ROOT_USER, User};

/// A credential-verification strategy.
pub trait Authenticator: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    fn authenticate(&self, username: &str, password: &str) -> Result<User>;
}

/// The process-wide authenticator.
///
/// Built once at startup from configuration and never reconfigured; share it
/// behind an `Arc`. Logins for `root` always go to the local database so the
/// administrator keeps access when the external identity provider is down.
pub struct Authn {
    strategy: Box<dyn Authenticator>,
    local: LocalAuthenticator,
}

impl Authn {
    pub fn new(strategy: Box<dyn Authenticator>, store: Arc<dyn Store>) -> Self {
        Self {
            strategy,
            local: LocalAuthenticator::new(store),
        }
    }

    /// Selects the strategy named by `config.mode`. LDAP needs a wire client;
    /// selecting it without one is a configuration error.
    pub fn from_config(
        config: &AuthnConfig,
        store: Arc<dyn Store>,
        directory: Option<Arc<dyn DirectoryClient>>,
    ) -> Result<Self> {
        let mode = config.mode()?;
        let strategy: Box<dyn Authenticator> = match mode {
            AuthnMode::Database => Box::new(LocalAuthenticator::new(Arc::clone(&store))),
            AuthnMode::Ldap => {
                let ldap = config
                    .ldap
                    .as_ref()
                    .ok_or_else(|| missing_section("authn.ldap", mode))?;
                let directory = directory.ok_or_else(|| {
                    Error::Config("authn_ldap requires an LDAP directory client".to_string())
                })?;
                Box::new(LdapAuthenticator::new(ldap, directory, Arc::clone(&store))?)
            }
            AuthnMode::HuaweiW3 => {
                let sso = config
                    .huaweiw3
                    .as_ref()
                    .ok_or_else(|| missing_section("authn.huaweiw3", mode))?;
                Box::new(SsoAuthenticator::new(sso, Arc::clone(&store))?)
            }
        };

        tracing::debug!("authentication strategy: {}", strategy.name());
        Ok(Self::new(strategy, store))
    }

    #[must_use]
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }
}

fn missing_section(section: &str, mode: AuthnMode) -> Error {
    Error::Config(format!("[{section}] is required for mode {}", mode.as_str()))
}

impl Authenticator for Authn {
    fn name(&self) -> &'static str {
        self.strategy.name()
    }

    fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        if username == ROOT_USER {
            tracing::debug!("routing root login to the local database");
            return self.local.authenticate(username, password);
        }
        self.strategy.authenticate(username, password)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::TempDir;

    use super::ldap::testing::{FakeDirectory, SERVICE_DN, SERVICE_PASSWORD};
    use super::*;
    use crate::config::{LdapConfig, LdapTransport, SsoConfig};
    use crate::store::SqliteStore;
    use crate::types::{Status, SystemRole, UserPatch};

    fn store_with_users(temp: &TempDir) -> Arc<dyn Store> {
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        for (name, role, pw) in [
            (ROOT_USER, SystemRole::SysAdmin, "root"),
            ("alice", SystemRole::SysMember, "alice-local"),
        ] {
            let change = password::hash_new(pw);
            store
                .create_user(&User {
                    name: name.to_string(),
                    email: format!("{name}@example.com"),
                    password_hash: change.password_hash,
                    salt: change.salt,
                    real_name: None,
                    comment: None,
                    system_role: role,
                    status: Status::Active,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                })
                .unwrap();
        }
        Arc::new(store)
    }

    fn ldap_authn_config() -> AuthnConfig {
        AuthnConfig {
            mode: "authn_ldap".to_string(),
            ldap: Some(LdapConfig {
                address: "ldap.example.com:636".to_string(),
                transport: LdapTransport::Tls,
                base_dn: "dc=example,dc=com".to_string(),
                filter: "(uid=%s)".to_string(),
                bind_dn: SERVICE_DN.to_string(),
                bind_password: SERVICE_PASSWORD.to_string(),
                insecure_skip_verify: false,
                ca_cert_file: None,
            }),
            huaweiw3: None,
        }
    }

    #[test]
    fn test_local_mode() {
        let temp = TempDir::new().unwrap();
        let store = store_with_users(&temp);
        let authn = Authn::from_config(&AuthnConfig::default(), store, None).unwrap();

        assert_eq!(authn.strategy_name(), "local");
        assert_eq!(authn.authenticate("alice", "alice-local").unwrap().name, "alice");
        assert!(matches!(
            authn.authenticate("alice", "wrong"),
            Err(Error::InvalidCredentials)
        ));
        // Unknown users look exactly like wrong passwords
        assert!(matches!(
            authn.authenticate("nobody", "wrong"),
            Err(Error::InvalidCredentials)
        ));
    }

    #[test]
    fn test_local_mode_inactive_user() {
        let temp = TempDir::new().unwrap();
        let store = store_with_users(&temp);
        store
            .transition(
                &crate::lifecycle::EntityRef::user("alice"),
                crate::lifecycle::Transition::Deactivate,
            )
            .unwrap();
        let authn = Authn::from_config(&AuthnConfig::default(), store, None).unwrap();

        assert!(matches!(
            authn.authenticate("alice", "alice-local"),
            Err(Error::UserInactive)
        ));
    }

    #[test]
    fn test_password_change_takes_effect() {
        let temp = TempDir::new().unwrap();
        let store = store_with_users(&temp);
        let patch = UserPatch {
            password: Some(password::hash_new("rotated")),
            ..Default::default()
        };
        store.update_user("alice", &patch).unwrap();
        let authn = Authn::from_config(&AuthnConfig::default(), store, None).unwrap();

        assert!(authn.authenticate("alice", "rotated").is_ok());
        assert!(authn.authenticate("alice", "alice-local").is_err());
    }

    #[test]
    fn test_root_bypasses_ldap() {
        let temp = TempDir::new().unwrap();
        let store = store_with_users(&temp);
        let directory = FakeDirectory::new().with_entry(
            "uid=root,ou=people,dc=example,dc=com",
            "root",
            "directory-root",
        );
        let authn = Authn::from_config(
            &ldap_authn_config(),
            store,
            Some(Arc::new(directory.clone())),
        )
        .unwrap();

        assert_eq!(authn.strategy_name(), "ldap");
        assert!(authn.authenticate(ROOT_USER, "root").unwrap().is_sys_admin());
        assert!(matches!(
            authn.authenticate(ROOT_USER, "directory-root"),
            Err(Error::InvalidCredentials)
        ));
        assert!(directory.transports().is_empty());
    }

    #[test]
    fn test_non_root_goes_to_ldap() {
        let temp = TempDir::new().unwrap();
        let store = store_with_users(&temp);
        let directory = FakeDirectory::new().with_entry(
            "uid=alice,ou=people,dc=example,dc=com",
            "alice",
            "directory-alice",
        );
        let authn =
            Authn::from_config(&ldap_authn_config(), store, Some(Arc::new(directory))).unwrap();

        assert!(authn.authenticate("alice", "directory-alice").is_ok());
        assert!(matches!(
            authn.authenticate("alice", "alice-local"),
            Err(Error::InvalidCredentials)
        ));
    }

    #[test]
    fn test_root_bypasses_sso() {
        let temp = TempDir::new().unwrap();
        let store = store_with_users(&temp);
        let config = AuthnConfig {
            mode: "authn_huaweiw3".to_string(),
            ldap: None,
            // Nothing listens here; root must never reach it
            huaweiw3: Some(SsoConfig {
                endpoint_addr: "http://127.0.0.1:9/login".to_string(),
                insecure_skip_verify: false,
                ca_cert_file: None,
                redirect: String::new(),
                timeout_secs: 1,
            }),
        };
        let authn = Authn::from_config(&config, store, None).unwrap();

        assert_eq!(authn.strategy_name(), "huaweiw3");
        assert_eq!(authn.authenticate(ROOT_USER, "root").unwrap().name, ROOT_USER);
    }

    #[test]
    fn test_ldap_without_client_is_fatal() {
        let temp = TempDir::new().unwrap();
        let store = store_with_users(&temp);

        assert!(matches!(
            Authn::from_config(&ldap_authn_config(), store, None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_section_is_fatal() {
        let temp = TempDir::new().unwrap();
        let store = store_with_users(&temp);
        let config = AuthnConfig {
            mode: "authn_huaweiw3".to_string(),
            ldap: None,
            huaweiw3: None,
        };

        assert!(matches!(
            Authn::from_config(&config, store, None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_unknown_mode_is_fatal() {
        let temp = TempDir::new().unwrap();
        let store = store_with_users(&temp);
        let config = AuthnConfig {
            mode: "authn_oidc".to_string(),
            ..AuthnConfig::default()
        };

        assert!(matches!(
            Authn::from_config(&config, store, None),
            Err(Error::Config(_))
        ));
    }
}
