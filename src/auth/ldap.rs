use std::sync::Arc;

use super::Authenticator;
use super::local::active_local_user;
use super::tls::TlsSettings;
use crate::config::{LdapConfig, LdapTransport};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::User;

/// Wire-level LDAP client. The protocol implementation lives outside this
/// crate; anything that can connect, bind and search plugs in here.
///
/// Implementations report unreachable servers and TLS failures as
/// [`Error::Transport`].
pub trait DirectoryClient: Send + Sync {
    fn connect(
        &self,
        address: &str,
        transport: LdapTransport,
        tls: &TlsSettings,
    ) -> Result<Box<dyn DirectorySession>>;
}

/// One open directory connection.
pub trait DirectorySession {
    /// Returns [`Error::InvalidCredentials`] when the directory rejects the bind.
    fn bind(&mut self, dn: &str, password: &str) -> Result<()>;

    /// Distinguished names of every entry under `base_dn` matching `filter`.
    fn search(&mut self, base_dn: &str, filter: &str) -> Result<Vec<String>>;
}

/// Escapes a value for use inside an LDAP search filter (RFC 4515).
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            c => escaped.push(c),
        }
    }
    escaped
}

pub struct LdapAuthenticator {
    config: LdapConfig,
    tls: TlsSettings,
    client: Arc<dyn DirectoryClient>,
    store: Arc<dyn Store>,
}

impl LdapAuthenticator {
    pub fn new(
        config: &LdapConfig,
        client: Arc<dyn DirectoryClient>,
        store: Arc<dyn Store>,
    ) -> Result<Self> {
        if !config.filter.contains("%s") {
            return Err(Error::Config(
                "ldap filter must contain a %s placeholder for the username".to_string(),
            ));
        }
        let tls = TlsSettings::load(config.insecure_skip_verify, config.ca_cert_file.as_deref())?;

        Ok(Self {
            config: config.clone(),
            tls,
            client,
            store,
        })
    }

    fn find_user_dn(&self, session: &mut dyn DirectorySession, username: &str) -> Result<String> {
        session
            .bind(&self.config.bind_dn, &self.config.bind_password)
            .map_err(|e| match e {
                Error::InvalidCredentials => {
                    Error::AuthenticationBackend("directory rejected the service bind".to_string())
                }
                other => other,
            })?;

        let filter = self
            .config
            .filter
            .replace("%s", &escape_filter_value(username));
        let mut entries = session.search(&self.config.base_dn, &filter)?;

        if entries.len() != 1 {
            tracing::debug!(
                "ldap search for '{}' returned {} entries",
                username,
                entries.len()
            );
            return Err(Error::InvalidCredentials);
        }
        Ok(entries.remove(0))
    }
}

impl Authenticator for LdapAuthenticator {
    fn name(&self) -> &'static str {
        "ldap"
    }

    fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        // An empty password turns the bind into an unauthenticated one
        if password.is_empty() {
            return Err(Error::InvalidCredentials);
        }

        let mut session = self
            .client
            .connect(&self.config.address, self.config.transport, &self.tls)
            .inspect_err(|e| tracing::warn!("ldap connection to {} failed: {e}", self.config.address))?;

        let user_dn = self.find_user_dn(session.as_mut(), username)?;
        session.bind(&user_dn, password)?;

        active_local_user(self.store.as_ref(), username)
    }
}
