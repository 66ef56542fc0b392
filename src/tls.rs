//! TLS acceptor setup using rustls.

use crate::config::TlsSettings;
use anyhow::Context;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::rustls::{self, ServerConfig as RustlsConfig};
use tokio_rustls::TlsAcceptor;
use tracing::info;

/// Build a TLS acceptor from the configured certificate, or from a freshly
/// generated self-signed one.
pub fn acceptor(settings: &TlsSettings) -> anyhow::Result<TlsAcceptor> {
    let (certs, key) = if settings.generate {
        self_signed()?
    } else {
        let cert_path = settings
            .cert_file
            .as_deref()
            .context("no certificate file configured")?;
        let key_path = settings
            .key_file
            .as_deref()
            .context("no key file configured")?;
        info!(cert = %cert_path.display(), key = %key_path.display(), "Loading TLS certificate");
        (load_certs(cert_path)?, load_key(key_path)?)
    };

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = RustlsConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .context("unsupported TLS protocol versions")?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("invalid certificate or key")?;

    // Enable ALPN for HTTP/2 and HTTP/1.1
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &Path) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .with_context(|| format!("could not open certificate file {}", path.display()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("could not parse certificate file {}", path.display()))?;
    if certs.is_empty() {
        anyhow::bail!("no certificates found in {}", path.display());
    }
    Ok(certs)
}

fn load_key(path: &Path) -> anyhow::Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .with_context(|| format!("could not open key file {}", path.display()))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .with_context(|| format!("could not parse key file {}", path.display()))?
        .with_context(|| format!("no private key found in {}", path.display()))
}

/// Generate a self-signed certificate for `localhost` and this host.
fn self_signed() -> anyhow::Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let mut names = vec!["localhost".to_string(), "127.0.0.1".to_string()];
    if let Some(host) = hostname::get().ok().and_then(|h| h.into_string().ok()) {
        if !host.is_empty() && !names.contains(&host) {
            names.push(host);
        }
    }

    info!(names = ?names, "Generating self-signed TLS certificate");
    let certified = rcgen::generate_simple_self_signed(names)
        .context("could not generate self-signed certificate")?;

    let cert = certified.cert.der().clone();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()));
    Ok((vec![cert], key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn test_generated_certificate() {
        let settings = TlsSettings {
            enabled: true,
            generate: true,
            ..TlsSettings::default()
        };
        assert!(acceptor(&settings).is_ok());
    }

    #[test]
    fn test_certificate_from_files() {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();

        let mut cert_file = tempfile::NamedTempFile::new().unwrap();
        cert_file.write_all(certified.cert.pem().as_bytes()).unwrap();
        let mut key_file = tempfile::NamedTempFile::new().unwrap();
        key_file
            .write_all(certified.key_pair.serialize_pem().as_bytes())
            .unwrap();

        let settings = TlsSettings {
            enabled: true,
            cert_file: Some(cert_file.path().to_path_buf()),
            key_file: Some(key_file.path().to_path_buf()),
            generate: false,
        };
        assert!(acceptor(&settings).is_ok());
    }

    #[test]
    fn test_missing_files() {
        let settings = TlsSettings {
            enabled: true,
            cert_file: Some(PathBuf::from("/nonexistent/cert.pem")),
            key_file: Some(PathBuf::from("/nonexistent/key.pem")),
            generate: false,
        };
        assert!(acceptor(&settings).is_err());
    }

    #[test]
    fn test_empty_certificate_file() {
        let cert_file = tempfile::NamedTempFile::new().unwrap();
        assert!(load_certs(cert_file.path()).is_err());
    }
}
