use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

const PEM_CERT_MARKER: &str = "-----BEGIN CERTIFICATE-----";

/// Certificate verification options shared by the directory and SSO backends.
#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    pub insecure_skip_verify: bool,
    /// PEM-encoded CA bundle to trust in addition to the system roots.
    pub ca_cert_pem: Option<Vec<u8>>,
}

impl TlsSettings {
    /// Loads the pinned CA file, if any. An unreadable file or one without a
    /// PEM certificate is a configuration error.
    pub fn load(insecure_skip_verify: bool, ca_cert_file: Option<&Path>) -> Result<Self> {
        let ca_cert_pem = match ca_cert_file {
            Some(path) => {
                let pem = fs::read(path).map_err(|e| {
                    Error::Config(format!("cannot read CA certificate {}: {e}", path.display()))
                })?;
                if !String::from_utf8_lossy(&pem).contains(PEM_CERT_MARKER) {
                    return Err(Error::Config(format!(
                        "{} does not contain a PEM certificate",
                        path.display()
                    )));
                }
                Some(pem)
            }
            None => None,
        };

        if insecure_skip_verify {
            tracing::warn!("TLS certificate verification is disabled");
        }

        Ok(Self {
            insecure_skip_verify,
            ca_cert_pem,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_no_ca_file() {
        let tls = TlsSettings::load(false, None).unwrap();
        assert!(tls.ca_cert_pem.is_none());
        assert!(!tls.insecure_skip_verify);
    }

    #[test]
    fn test_missing_ca_file() {
        let err = TlsSettings::load(false, Some(Path::new("/nonexistent/ca.pem"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_ca_file_without_certificate() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a certificate").unwrap();

        let err = TlsSettings::load(false, Some(file.path())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_ca_file_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{PEM_CERT_MARKER}\nMIIB\n-----END CERTIFICATE-----").unwrap();

        let tls = TlsSettings::load(true, Some(file.path())).unwrap();
        assert!(tls.insecure_skip_verify);
        assert!(tls.ca_cert_pem.is_some());
    }
}
