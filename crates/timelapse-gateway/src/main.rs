use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use timelapse_core::config::TimelapseConfig;
use timelapse_providers::{HttpImageCapture, SunriseSunsetClient};
use timelapse_scheduler::{DayPlanner, DriverSettings, SolarTimesProvider, SystemClock};
use tracing::{error, info, warn};

mod app;
mod fleet;
mod http;
mod store;

/// Webcam timelapse capture scheduler.
#[derive(Debug, Parser)]
#[command(version = env!("TIMELAPSE_BUILD_VERSION"), about)]
struct Args {
    /// Config file (default: $TIMELAPSE_CONFIG, then ~/.timelapse/timelapse.toml).
    #[arg(long)]
    config: Option<String>,

    /// Override `server.port`.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "timelapse_gateway=info,timelapse_scheduler=info,timelapse_providers=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    let args = Args::parse();

    // load config: --config > TIMELAPSE_CONFIG env > ~/.timelapse/timelapse.toml
    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var("TIMELAPSE_CONFIG").ok());
    let mut config = TimelapseConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        TimelapseConfig::default()
    });
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate().context("invalid configuration")?;

    // collaborators shared by every camera
    let solar = Arc::new(SunriseSunsetClient::from_config(&config.solar)?);
    let timezone = timelapse_providers::timezone_resolver(&config.timezone)?;
    info!(solar = solar.name(), timezone = timezone.name(), "providers ready");
    let capture = Arc::new(HttpImageCapture::from_config(&config.capture)?);
    let planner = DayPlanner::new(solar, timezone);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let fleet = fleet::Fleet::new(
        planner,
        capture,
        Arc::new(SystemClock),
        DriverSettings::from(&config.capture),
        shutdown_rx,
    );

    let store = store::CameraStore::load(&config.store.path)
        .with_context(|| format!("cannot read camera store {}", config.store.path))?;

    // a camera with a bad definition never starts; the rest still do
    let mut launched = 0usize;
    for (name, camera) in store.list() {
        match camera.to_definition(name) {
            Ok(definition) => {
                fleet.launch(definition).await;
                launched += 1;
            }
            Err(e) => error!(camera = %name, error = %e, "skipping camera with invalid definition"),
        }
    }
    if store.is_empty() {
        info!(path = %store.path().display(), "no cameras configured yet; add one with POST /cameras");
    } else {
        info!(cameras = store.len(), launched, "camera drivers started");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let state = Arc::new(app::AppState::new(store, fleet));
    let router = app::build_router(Arc::clone(&state));

    info!(version = env!("TIMELAPSE_BUILD_VERSION"), "Timelapse gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // signal every driver loop and wait for them to exit
    let _ = shutdown_tx.send(true);
    state.fleet.join_all().await;
    info!("Timelapse gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for ctrl-c; shutting down");
    }
    info!("shutdown requested");
}
