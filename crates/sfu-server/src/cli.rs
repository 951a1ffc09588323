//! Command-line overrides for the process-wide configuration (§6.2). Every
//! flag is optional; unset flags fall through to `config::get()`.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "sfu-server", about = "WebRTC selective forwarding unit")]
pub struct Cli {
    /// Bind host, overriding the configured server.host.
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port, overriding the configured server.port.
    #[arg(long)]
    pub port: Option<u16>,

    /// TLS certificate path, overriding the host-derived default.
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key path, overriding the host-derived default.
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}
