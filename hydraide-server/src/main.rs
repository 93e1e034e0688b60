//! Process entrypoint: parses [`config::Config`], installs tracing, builds
//! the [`hydraide_hydra::Hydra`] registry, and serves the Gateway over
//! gRPC until SIGINT/SIGTERM, at which point it drains in-flight requests
//! and flushes every summoned Swamp before exiting. Bootstrap shape is
//! grounded in `connector-init`'s `run()`: clap args, a pre-registered
//! Unix signal future, `Server::builder()...serve_with_shutdown`.

mod config;
mod error;
mod guard;
mod logging;
mod service;
mod streams;

use std::path::Path;

use clap::Parser;
use hydraide_hydra::Hydra;
use hydraide_proto::wire::gateway_server::GatewayServer;
use tokio::signal::unix::{signal, SignalKind};
use tonic::transport::{Identity, Server, ServerTlsConfig};

use config::Config;
use service::GatewayService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config::parse();
    logging::install(&cfg.log_level);

    let addr: std::net::SocketAddr = format!("0.0.0.0:{}", cfg.server_port).parse()?;

    // Registered before anything async starts, so a signal-setup failure
    // (e.g. no permission to install a handler) surfaces immediately.
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let hydra = Hydra::new(cfg.root_path.clone(), cfg.island_count);

    let gateway = GatewayService::new(
        hydra.clone(),
        cfg.close_after_idle(),
        cfg.write_interval(),
        cfg.default_file_size,
    );
    let gateway_server = GatewayServer::new(gateway)
        .max_decoding_message_size(cfg.grpc_max_message_size)
        .max_encoding_message_size(cfg.grpc_max_message_size);

    let shutdown = async move {
        tokio::select! {
            _ = sigint.recv() => tracing::info!("caught SIGINT, shutting down"),
            _ = sigterm.recv() => tracing::info!("caught SIGTERM, shutting down"),
            _ = sigquit.recv() => tracing::info!("caught SIGQUIT, shutting down"),
        }
    };

    tracing::info!(%addr, root = %cfg.root_path.display(), islands = cfg.island_count, "hydraide-server starting");

    // spec §4.L keepalive: ping idle connections after 4 minutes, time out
    // the ping at 20s, and drop a connection after 5 minutes of inactivity.
    let mut builder = Server::builder()
        .http2_keepalive_interval(Some(std::time::Duration::from_secs(240)))
        .http2_keepalive_timeout(Some(std::time::Duration::from_secs(20)))
        .tcp_keepalive(Some(std::time::Duration::from_secs(300)));
    if let Some(tls) = load_tls(&cfg)? {
        builder = builder.tls_config(tls)?;
    }

    builder.add_service(gateway_server).serve_with_shutdown(addr, shutdown).await?;

    tracing::info!("drain started: waiting for in-flight operations and flushing swamps");
    hydra.stop_hydra().await;
    tracing::info!("shutdown complete");

    Ok(())
}

/// Builds a TLS identity from `tls_cert_file`/`tls_key_file` when both are
/// set. Neither set means serve plaintext (e.g. behind a terminating
/// proxy); `clap`'s `requires` already rejects the key-without-cert case.
fn load_tls(cfg: &Config) -> Result<Option<ServerTlsConfig>, Box<dyn std::error::Error>> {
    let (Some(cert_path), Some(key_path)) = (&cfg.tls_cert_file, &cfg.tls_key_file) else {
        return Ok(None);
    };
    let identity = load_identity(cert_path, key_path)?;
    Ok(Some(ServerTlsConfig::new().identity(identity)))
}

fn load_identity(cert_path: &Path, key_path: &Path) -> std::io::Result<Identity> {
    let cert = std::fs::read(cert_path)?;
    let key = std::fs::read(key_path)?;
    Ok(Identity::from_pem(cert, key))
}
