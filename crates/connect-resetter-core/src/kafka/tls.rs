//! TLS setup for broker connections.
//!
//! Loads an optional CA bundle and an optional client certificate/key pair
//! for mTLS. Without a CA bundle the public webpki roots are trusted.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::debug;

use crate::config::SecurityConfig;
use crate::error::KafkaError;
use crate::Result;

/// Build a rustls `ClientConfig` from the security settings.
pub fn build_tls_config(security: &SecurityConfig) -> Result<ClientConfig> {
    let root_store = build_root_store(security.ssl_ca_location.as_deref())?;
    let builder = ClientConfig::builder().with_root_certificates(root_store);

    let config = match (
        &security.ssl_certificate_location,
        &security.ssl_key_location,
    ) {
        (Some(cert_path), Some(key_path)) => {
            debug!(
                "Configuring mTLS with cert={}, key={}",
                cert_path.display(),
                key_path.display()
            );

            let certs = load_certificates(cert_path)?;
            let key = load_private_key(key_path)?;

            builder.with_client_auth_cert(certs, key).map_err(|e| {
                KafkaError::TlsConfig(format!("Invalid client certificate or key: {}", e))
            })?
        }
        (Some(only), None) | (None, Some(only)) => {
            return Err(incomplete_pair(security, only).into());
        }
        (None, None) => builder.with_no_client_auth(),
    };

    Ok(config)
}

fn incomplete_pair(security: &SecurityConfig, given: &Path) -> KafkaError {
    let (present, missing) = if security.ssl_certificate_location.is_some() {
        ("ssl_certificate_location", "ssl_key_location")
    } else {
        ("ssl_key_location", "ssl_certificate_location")
    };
    KafkaError::TlsConfig(format!(
        "{} ({}) is set but {} is not; mTLS needs both",
        present,
        given.display(),
        missing
    ))
}

fn build_root_store(ca_path: Option<&Path>) -> Result<RootCertStore> {
    let Some(path) = ca_path else {
        debug!("No CA bundle configured, trusting webpki roots");
        return Ok(RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        });
    };

    let mut root_store = RootCertStore::empty();
    for cert in load_certificates(path)? {
        root_store.add(cert).map_err(|e| KafkaError::CertificateLoad {
            path: path.display().to_string(),
            message: format!("Rejected CA certificate: {}", e),
        })?;
    }

    debug!(
        "Loaded {} CA certificate(s) from {}",
        root_store.len(),
        path.display()
    );
    Ok(root_store)
}

/// Load all certificates from a PEM file.
fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| KafkaError::CertificateLoad {
        path: path.display().to_string(),
        message: format!("Failed to open file: {}", e),
    })?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| KafkaError::CertificateLoad {
            path: path.display().to_string(),
            message: format!("Failed to parse PEM certificates: {}", e),
        })?;

    if certs.is_empty() {
        return Err(KafkaError::CertificateLoad {
            path: path.display().to_string(),
            message: "No certificates found in file".to_string(),
        }
        .into());
    }

    Ok(certs)
}

/// Load the first private key (PKCS#1, PKCS#8 or SEC1) from a PEM file.
fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| KafkaError::PrivateKeyLoad {
        path: path.display().to_string(),
        message: format!("Failed to open file: {}", e),
    })?;

    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| KafkaError::PrivateKeyLoad {
            path: path.display().to_string(),
            message: format!("Failed to parse PEM private key: {}", e),
        })?
        .ok_or_else(|| {
            KafkaError::PrivateKeyLoad {
                path: path.display().to_string(),
                message: "No private key found in file".to_string(),
            }
            .into()
        })
}
