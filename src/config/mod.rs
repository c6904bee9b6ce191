mod authn;
mod server;

pub use authn::{AuthnConfig, AuthnMode, LdapConfig, LdapTransport, SsoConfig};
pub use server::ServerConfig;
