use anyhow::Context;
use mimalloc::MiMalloc;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use showtime_booking::{app, config::Config, services::CleanupService, AppState};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.app.rust_log)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if config.app.log_format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::load().context("failed to load configuration")?;
    init_tracing(&config);

    info!(environment = %config.app.environment, "Starting Showtime Booking API");
    if config.is_production() && !config.payment.require_confirmation {
        warn!("payment confirmation is disabled in production");
    }

    let state = AppState::connect(config.clone()).await?;

    // --- Start background tasks ---

    // Sweep expired seat holds
    CleanupService::new(
        state.holds.clone(),
        state.clock.clone(),
        Duration::from_secs(config.booking.hold_sweep_seconds.max(1)),
    )
    .spawn();

    // --- Start the web server ---

    let host: std::net::IpAddr = config
        .app
        .host
        .parse()
        .with_context(|| format!("invalid app.host '{}'", config.app.host))?;
    let addr = SocketAddr::from((host, config.app.port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app(state).into_make_service()).await?;
    Ok(())
}
