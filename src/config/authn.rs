use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Which credential-verification strategy the process runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthnMode {
    Database,
    Ldap,
    HuaweiW3,
}

impl AuthnMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "authn_db" => Ok(Self::Database),
            "authn_ldap" => Ok(Self::Ldap),
            "authn_huaweiw3" => Ok(Self::HuaweiW3),
            other => Err(Error::Config(format!(
                "unknown authentication mode '{other}' (expected authn_db, authn_ldap or authn_huaweiw3)"
            ))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Database => "authn_db",
            Self::Ldap => "authn_ldap",
            Self::HuaweiW3 => "authn_huaweiw3",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthnConfig {
    pub mode: String,
    pub ldap: Option<LdapConfig>,
    pub huaweiw3: Option<SsoConfig>,
}

impl AuthnConfig {
    pub fn mode(&self) -> Result<AuthnMode> {
        AuthnMode::parse(&self.mode)
    }
}

impl Default for AuthnConfig {
    fn default() -> Self {
        Self {
            mode: AuthnMode::Database.as_str().to_string(),
            ldap: None,
            huaweiw3: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LdapTransport {
    #[default]
    Plain,
    StartTls,
    Tls,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LdapConfig {
    pub address: String,
    #[serde(default)]
    pub transport: LdapTransport,
    pub base_dn: String,
    /// Search filter; `%s` is replaced by the escaped username.
    pub filter: String,
    pub bind_dn: String,
    pub bind_password: String,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    #[serde(default)]
    pub ca_cert_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SsoConfig {
    pub endpoint_addr: String,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    #[serde(default)]
    pub ca_cert_file: Option<PathBuf>,
    #[serde(default)]
    pub redirect: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}
