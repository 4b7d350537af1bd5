use anyhow::{Context, Result};
use clap::Parser;
use live_verify::http::SignalingMode;
use live_verify::{create_router, AppState, Config, FsBlobStore, InMemoryRepository};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "live-verify", version, about = "Live identity verification sessions")]
struct Args {
    /// Configuration file, without extension
    #[arg(long, default_value = "config/live-verify")]
    config: String,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    info!("Live Verify v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let blob_root = cfg.blob_root();
    info!("Blob storage: {}", blob_root.display());

    let signaling = match &cfg.signaling.nats_url {
        Some(url) => {
            info!("Connecting to NATS at {}", url);
            let client = async_nats::connect(url.as_str())
                .await
                .context("Failed to connect to NATS")?;
            SignalingMode::Nats(client)
        }
        None => {
            info!("No NATS URL configured, answering calls in-process");
            SignalingMode::Loopback
        }
    };

    let state = AppState::new(
        &cfg,
        Arc::new(InMemoryRepository::new()),
        Arc::new(FsBlobStore::new(blob_root)),
        signaling,
    );
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app).await.context("HTTP server failed")?;

    Ok(())
}
