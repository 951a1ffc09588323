mod cli;
mod handler;

use std::net::SocketAddr;

use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use sfu_core::{engine, Coordinator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let cli = cli::Cli::parse();
    let config = sfu_common::config::init()?;

    let host = cli.host.unwrap_or_else(|| config.server.host.clone());
    let port = cli.port.unwrap_or(config.server.port);
    let bind_addr: SocketAddr = format!("{host}:{port}").parse()?;

    let tls_cert = cli.tls_cert.unwrap_or_else(|| config.server.resolved_tls_cert());
    let tls_key = cli.tls_key.unwrap_or_else(|| config.server.resolved_tls_key());

    let api = engine::build_api().map_err(|e| {
        let err = sfu_common::SfuError::FatalInit(e.to_string());
        tracing::error!(kind = err.kind(), "{err}");
        err
    })?;
    let coordinator = Coordinator::new(api);
    let router = handler::build_router(coordinator);

    if tls_cert.exists() && tls_key.exists() {
        tracing::info!(%bind_addr, cert = %tls_cert.display(), "starting TLS signaling listener");
        let tls_config = RustlsConfig::from_pem_file(&tls_cert, &tls_key).await?;
        axum_server::bind_rustls(bind_addr, tls_config)
            .serve(router.into_make_service())
            .await?;
    } else {
        tracing::info!(%bind_addr, "no TLS certificate/key pair found, starting plaintext signaling listener");
        let listener = tokio::net::TcpListener::bind(bind_addr).await?;
        axum::serve(listener, router).await?;
    }

    Ok(())
}
