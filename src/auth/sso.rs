use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Serialize;

use super::Authenticator;
use super::local::active_local_user;
use super::tls::TlsSettings;
use crate::config::SsoConfig;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::User;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    auth_method: &'a str,
    redirect: &'a str,
}

/// Delegates password checks to an external SSO endpoint (Huawei W3).
///
/// Only the status code of the SSO response is trusted; the returned user is
/// always the local record, which must already exist and be active.
pub struct SsoAuthenticator {
    client: Client,
    endpoint: String,
    redirect: String,
    store: Arc<dyn Store>,
}

impl SsoAuthenticator {
    pub fn new(config: &SsoConfig, store: Arc<dyn Store>) -> Result<Self> {
        let tls = TlsSettings::load(config.insecure_skip_verify, config.ca_cert_file.as_deref())?;

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(tls.insecure_skip_verify);
        if let Some(pem) = &tls.ca_cert_pem {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| Error::Config(format!("invalid CA certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build SSO client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint_addr.clone(),
            redirect: config.redirect.clone(),
            store,
        })
    }
}

impl Authenticator for SsoAuthenticator {
    fn name(&self) -> &'static str {
        "huaweiw3"
    }

    fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let user = active_local_user(self.store.as_ref(), username)?;

        let body = LoginRequest {
            username,
            password,
            auth_method: "password",
            redirect: &self.redirect,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|e| {
                tracing::warn!("SSO request to {} failed: {e}", self.endpoint);
                Error::AuthenticationBackend(e.to_string())
            })?;

        let status = resp.status();
        if status != StatusCode::OK {
            tracing::warn!("SSO login for '{}' rejected with {}", username, status);
            return Err(Error::AuthenticationBackend(format!(
                "SSO endpoint returned {status}"
            )));
        }

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    use chrono::Utc;
    use tempfile::TempDir;

    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{Status, SystemRole};

    /// Serves one request with `status_line` and sends the request body back
    /// through the returned channel.
    fn one_shot_server(status_line: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();
            tx.send(String::from_utf8(body).unwrap()).unwrap();

            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            )
            .unwrap();
        });

        (format!("http://{addr}/login"), rx)
    }

    fn sso_config(endpoint: String) -> SsoConfig {
        SsoConfig {
            endpoint_addr: endpoint,
            insecure_skip_verify: false,
            ca_cert_file: None,
            redirect: "https://registry.example.com".to_string(),
            timeout_secs: 5,
        }
    }

    fn store_with(temp: &TempDir, name: &str, status: Status) -> Arc<dyn Store> {
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        store
            .create_user(&User {
                name: name.to_string(),
                email: format!("{name}@example.com"),
                password_hash: String::new(),
                salt: String::new(),
                real_name: None,
                comment: None,
                system_role: SystemRole::SysMember,
                status,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_accepted_login() {
        let temp = TempDir::new().unwrap();
        let store = store_with(&temp, "alice", Status::Active);
        let (endpoint, body) = one_shot_server("200 OK");
        let authn = SsoAuthenticator::new(&sso_config(endpoint), store).unwrap();

        let user = authn.authenticate("alice", "w3-pass").unwrap();
        assert_eq!(user.name, "alice");

        let sent: serde_json::Value = serde_json::from_str(&body.recv().unwrap()).unwrap();
        assert_eq!(sent["username"], "alice");
        assert_eq!(sent["password"], "w3-pass");
        assert_eq!(sent["authMethod"], "password");
        assert_eq!(sent["redirect"], "https://registry.example.com");
    }

    #[test]
    fn test_rejected_login() {
        let temp = TempDir::new().unwrap();
        let store = store_with(&temp, "alice", Status::Active);
        let (endpoint, _body) = one_shot_server("401 Unauthorized");
        let authn = SsoAuthenticator::new(&sso_config(endpoint), store).unwrap();

        assert!(matches!(
            authn.authenticate("alice", "w3-pass"),
            Err(Error::AuthenticationBackend(_))
        ));
    }

    #[test]
    fn test_unreachable_endpoint() {
        let temp = TempDir::new().unwrap();
        let store = store_with(&temp, "alice", Status::Active);
        // Bind then drop to get a port nothing listens on
        let addr = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let authn =
            SsoAuthenticator::new(&sso_config(format!("http://{addr}/login")), store).unwrap();

        assert!(matches!(
            authn.authenticate("alice", "w3-pass"),
            Err(Error::AuthenticationBackend(_))
        ));
    }

    #[test]
    fn test_local_record_checked_first() {
        let temp = TempDir::new().unwrap();
        let store = store_with(&temp, "alice", Status::Inactive);
        // No server: the request must never be sent
        let authn =
            SsoAuthenticator::new(&sso_config("http://127.0.0.1:9/login".to_string()), store)
                .unwrap();

        assert!(matches!(
            authn.authenticate("alice", "w3-pass"),
            Err(Error::UserInactive)
        ));
        assert!(matches!(
            authn.authenticate("mallory", "w3-pass"),
            Err(Error::InvalidCredentials)
        ));
    }
}
