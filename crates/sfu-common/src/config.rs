//! Process-wide configuration, loaded once at start-up.
//!
//! Layered the same way as the rest of this codebase's services: built-in
//! defaults, an optional config file, then environment variables — but
//! scoped to exactly what the SFU needs (§6.2): a bind address and an
//! optional TLS certificate/key pair.

use std::path::PathBuf;
use std::sync::OnceLock;

use serde::Deserialize;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host, e.g. "0.0.0.0" or a specific IP. TLS cert/key paths are
    /// derived from this IP when not explicitly overridden.
    pub host: String,
    pub port: u16,
    /// Explicit TLS certificate path. When unset, derived as `<host>.pem`.
    pub tls_cert: Option<PathBuf>,
    /// Explicit TLS key path. When unset, derived as `<host>-key.pem`.
    pub tls_key: Option<PathBuf>,
}

impl ServerConfig {
    /// Resolve the certificate path to probe, explicit override or derived
    /// from the bind host per §6.2.
    pub fn resolved_tls_cert(&self) -> PathBuf {
        self.tls_cert
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.pem", self.host)))
    }

    /// Resolve the private key path to probe, explicit override or derived
    /// from the bind host per §6.2.
    pub fn resolved_tls_key(&self) -> PathBuf {
        self.tls_key
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}-key.pem", self.host)))
    }
}

/// Load configuration from defaults, an optional `config.toml`, and
/// `SFU__`-prefixed environment variables. Idempotent after the first call;
/// the first caller's sources win for the lifetime of the process.
pub fn init() -> anyhow::Result<&'static AppConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }

    dotenvy::dotenv().ok();

    let builder = config::Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8443)?
        .add_source(config::File::with_name("config").required(false))
        .add_source(
            config::Environment::with_prefix("SFU")
                .separator("__")
                .try_parsing(true),
        );

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    Ok(CONFIG.get_or_init(|| cfg))
}

/// Access the already-initialized global configuration. Panics if `init`
/// hasn't run; only `main` is expected to call `init` directly.
pub fn get() -> &'static AppConfig {
    CONFIG.get().expect("config::init() must run before config::get()")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_tls_paths_derive_from_host_when_unset() {
        let server = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8443,
            tls_cert: None,
            tls_key: None,
        };
        assert_eq!(server.resolved_tls_cert(), PathBuf::from("127.0.0.1.pem"));
        assert_eq!(server.resolved_tls_key(), PathBuf::from("127.0.0.1-key.pem"));
    }

    #[test]
    fn resolved_tls_paths_respect_explicit_override() {
        let server = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8443,
            tls_cert: Some(PathBuf::from("custom.pem")),
            tls_key: Some(PathBuf::from("custom-key.pem")),
        };
        assert_eq!(server.resolved_tls_cert(), PathBuf::from("custom.pem"));
        assert_eq!(server.resolved_tls_key(), PathBuf::from("custom-key.pem"));
    }
}
