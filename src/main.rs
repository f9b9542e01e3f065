use anyhow::{Context, Result};
use clap::Parser;
use mitra_voice::{create_router, AppState, Config};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "mitra-voice", about = "Voice consultation engine")]
struct Cli {
    /// Path to the configuration file (without extension)
    #[arg(long, default_value = "config/mitra-voice")]
    config: String,

    /// Override the HTTP listen port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut cfg = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Could not load config {}: {} (using defaults)", cli.config, e);
            Config::default()
        }
    };
    if let Some(port) = cli.port {
        cfg.service.http.port = port;
    }

    info!("{} starting", cfg.service.name);
    info!("Live endpoint: {}", cfg.live.endpoint);
    if cfg.recording.enabled {
        info!("Consultation recording enabled: {}", cfg.recording.output_dir);
    }

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let state = AppState::new(cfg);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .context("HTTP server error")?;

    Ok(())
}
