use std::path::Path;

use anyhow::{bail, Context, Result};

/// Names a generated certificate is valid for when none are given.
pub const DEFAULT_NAMES: &[&str] = &["localhost", "127.0.0.1"];

/// PEM-encoded certificate and private key.
pub struct CertPair {
    pub cert_pem: String,
    pub key_pem: String,
}

/// Generates a self-signed certificate for `names`. IP addresses become IP
/// subject alternative names, everything else a DNS name.
pub fn generate(names: &[String]) -> Result<CertPair> {
    let names = if names.is_empty() {
        DEFAULT_NAMES.iter().map(|n| n.to_string()).collect()
    } else {
        names.to_vec()
    };

    let certified = rcgen::generate_simple_self_signed(names)
        .context("Failed to generate certificate")?;

    Ok(CertPair {
        cert_pem: certified.cert.pem(),
        key_pem: certified.key_pair.serialize_pem(),
    })
}

/// Writes a new pair to `cert_path` / `key_path`.
///
/// Refuses to overwrite existing files unless `force` is set.
pub fn write_pair(cert_path: &Path, key_path: &Path, names: &[String], force: bool) -> Result<()> {
    if !force {
        for path in [cert_path, key_path] {
            if path.exists() {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
        }
    }

    let pair = generate(names)?;
    std::fs::write(cert_path, pair.cert_pem)
        .with_context(|| format!("Failed to write {}", cert_path.display()))?;
    std::fs::write(key_path, pair.key_pem)
        .with_context(|| format!("Failed to write {}", key_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mxrpc_common::transport::TlsConfig;

    #[test]
    fn test_written_pair_loads() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("server.crt");
        let key = dir.path().join("server.key");

        write_pair(&cert, &key, &[], false).unwrap();

        let tls = TlsConfig::new(&cert, &key);
        assert_eq!(tls.load_certs().unwrap().len(), 1);
        assert!(tls.load_key().is_ok());
        assert!(tls.server_config().is_ok());
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("server.crt");
        let key = dir.path().join("server.key");
        std::fs::write(&cert, "existing").unwrap();

        assert!(write_pair(&cert, &key, &[], false).is_err());
        assert_eq!(std::fs::read_to_string(&cert).unwrap(), "existing");

        write_pair(&cert, &key, &["worker-1".to_string()], true).unwrap();
        assert!(std::fs::read_to_string(&cert).unwrap().contains("BEGIN CERTIFICATE"));
    }
}
