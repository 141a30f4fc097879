//! s3-path-proxy -- path-addressed HTTP gateway to S3-compatible storage.
//!
//! The process holds no per-request state between requests. SIGTERM/SIGINT
//! stop accepting connections and give in-flight requests up to
//! `server.shutdown_timeout` seconds to finish.

use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use s3_path_proxy::config::{self, Config};
use s3_path_proxy::storage::aws::S3BackendFactory;

/// Command-line arguments for the gateway.
#[derive(Parser, Debug)]
#[command(
    name = "s3-path-proxy",
    version,
    about = "Path-addressed HTTP gateway to S3-compatible object storage"
)]
struct Cli {
    /// Path to an optional YAML configuration file.
    #[arg(short, long)]
    config: Option<String>,

    /// Address to listen on.
    #[arg(long)]
    listen_addr: Option<String>,

    /// Port to listen on.
    #[arg(long)]
    listen_port: Option<u16>,

    /// PEM private key. Enables HTTPS; requires --tls-cert.
    #[arg(long)]
    tls_key: Option<String>,

    /// PEM certificate chain. Requires --tls-key.
    #[arg(long)]
    tls_cert: Option<String>,
}

impl Cli {
    /// Load the config file, if any, and apply flag overrides on top.
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => config::load_config(path)?,
            None => Config::default(),
        };
        if let Some(host) = self.listen_addr {
            config.server.host = host;
        }
        if let Some(port) = self.listen_port {
            config.server.port = port;
        }
        if self.tls_key.is_some() {
            config.server.tls_key = self.tls_key;
        }
        if self.tls_cert.is_some() {
            config.server.tls_cert = self.tls_cert;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(config: &Config) {
    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.into_config()?;

    init_tracing(&config);

    // Compile the path grammar up front so a bad pattern fails at startup.
    s3_path_proxy::grammar::grammar();

    if config.observability.metrics {
        s3_path_proxy::metrics::init_metrics();
        s3_path_proxy::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let addr = config.server.resolve_listen_addr().await?;
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let tls = match (&config.server.tls_key, &config.server.tls_cert) {
        (Some(key), Some(cert)) => Some(RustlsConfig::from_pem_file(cert, key).await?),
        _ => None,
    };

    let state = Arc::new(s3_path_proxy::AppState {
        config,
        factory: Arc::new(S3BackendFactory),
    });
    let app = s3_path_proxy::server::app(state);

    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone(), shutdown_timeout));

    match tls {
        Some(tls) => {
            info!("s3-path-proxy listening on https://{}", addr);
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!("s3-path-proxy listening on http://{}", addr);
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
    }

    info!("s3-path-proxy shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then start a graceful shutdown.
async fn shutdown_signal(handle: Handle, timeout: Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
    handle.graceful_shutdown(Some(timeout));
}
