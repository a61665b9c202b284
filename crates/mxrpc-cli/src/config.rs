use anyhow::{bail, Result};
use mxrpc_common::transport::tls::{DEFAULT_CERT_PATH, DEFAULT_KEY_PATH};
use mxrpc_common::transport::TlsConfig;

pub const CERT_ENV: &str = "MXRPC_CERT";
pub const KEY_ENV: &str = "MXRPC_KEY";
pub const CA_ENV: &str = "MXRPC_CA";
pub const PORT_ENV: &str = "PORT";

/// TLS flags as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct TlsArgs {
    pub cert: Option<String>,
    pub key: Option<String>,
    pub ca: Option<String>,
    pub server_name: Option<String>,
}

impl TlsArgs {
    /// Fills unset flags from the environment, then from the defaults.
    pub fn resolve(self) -> TlsConfig {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    pub fn resolve_with(self, env: impl Fn(&str) -> Option<String>) -> TlsConfig {
        let cert = self
            .cert
            .or_else(|| env(CERT_ENV))
            .unwrap_or_else(|| DEFAULT_CERT_PATH.to_string());
        let key = self
            .key
            .or_else(|| env(KEY_ENV))
            .unwrap_or_else(|| DEFAULT_KEY_PATH.to_string());

        let mut config = TlsConfig::new(cert, key);
        if let Some(ca) = self.ca.or_else(|| env(CA_ENV)) {
            config = config.with_ca(ca);
        }
        if let Some(name) = self.server_name {
            config = config.with_server_name(name);
        }
        config
    }
}

/// The worker's listen address: `--bind`, else `0.0.0.0:$PORT`.
pub fn worker_bind_addr(bind: Option<String>, port: Option<String>) -> Result<String> {
    match (bind, port) {
        (Some(bind), _) => Ok(bind),
        (None, Some(port)) => match port.trim().parse::<u16>() {
            Ok(port) => Ok(format!("0.0.0.0:{}", port)),
            Err(_) => bail!("Invalid {}: '{}'", PORT_ENV, port),
        },
        (None, None) => bail!("No bind address: pass --bind or set {}", PORT_ENV),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_tls_defaults() {
        let config = TlsArgs::default().resolve_with(no_env);
        assert_eq!(config.cert_path, PathBuf::from("server.crt"));
        assert_eq!(config.key_path, PathBuf::from("server.key"));
        assert!(config.ca_path.is_none());
    }

    #[test]
    fn test_tls_env_fallback_and_flag_precedence() {
        let env = |name: &str| match name {
            CERT_ENV => Some("/etc/mxrpc/node.crt".to_string()),
            CA_ENV => Some("/etc/mxrpc/ca.crt".to_string()),
            _ => None,
        };
        let args = TlsArgs {
            key: Some("mine.key".to_string()),
            ..Default::default()
        };

        let config = args.resolve_with(env);
        assert_eq!(config.cert_path, PathBuf::from("/etc/mxrpc/node.crt"));
        assert_eq!(config.key_path, PathBuf::from("mine.key"));
        assert_eq!(config.ca_path, Some(PathBuf::from("/etc/mxrpc/ca.crt")));
    }

    #[test]
    fn test_worker_bind_addr() {
        assert_eq!(
            worker_bind_addr(Some("127.0.0.1:7000".into()), Some("5001".into())).unwrap(),
            "127.0.0.1:7000"
        );
        assert_eq!(worker_bind_addr(None, Some("5001".into())).unwrap(), "0.0.0.0:5001");
        assert!(worker_bind_addr(None, Some("http".into())).is_err());
        assert!(worker_bind_addr(None, None).is_err());
    }
}
