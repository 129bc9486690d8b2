pub mod cache;
pub mod clock;
pub mod config;
pub mod controllers;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use cache::{MemorySeatHolds, RedisSeatHolds, SeatHolds};
use clock::{Clock, SystemClock};
use services::{CatalogService, PaymentVerifier, ReservationService, ShowtimeLocks};
use store::{BookingStore, MemoryStore, PgBookingStore};

// Shared state for the whole application
pub struct AppState {
    pub config: config::Config,
    pub store: Arc<dyn BookingStore>,
    pub holds: Arc<dyn SeatHolds>,
    pub clock: Arc<dyn Clock>,
    pub reservations: ReservationService,
    pub catalog: CatalogService,
}

impl AppState {
    pub fn with_backends(
        config: config::Config,
        store: Arc<dyn BookingStore>,
        holds: Arc<dyn SeatHolds>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let locks = Arc::new(ShowtimeLocks::new());
        let reservations = ReservationService::new(
            store.clone(),
            holds.clone(),
            locks.clone(),
            clock.clone(),
            PaymentVerifier::from_config(&config.payment),
            &config.booking,
        );
        let catalog = CatalogService::new(
            store.clone(),
            holds.clone(),
            locks,
            clock.clone(),
            config.app.utc_offset_minutes,
        );

        Arc::new(Self {
            config,
            store,
            holds,
            clock,
            reservations,
            catalog,
        })
    }

    /// Process-local store and holds; nothing survives a restart.
    pub fn in_memory(config: config::Config) -> Arc<Self> {
        Self::with_backends(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MemorySeatHolds::new()),
            Arc::new(SystemClock),
        )
    }

    /// Connects the configured backends, falling back to in-memory ones for
    /// whatever is not configured.
    pub async fn connect(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let store: Arc<dyn BookingStore> = match &config.database.url {
            Some(url) => {
                let store = PgBookingStore::connect(url, config.database.pool_size).await?;
                store.run_migrations().await?;
                info!("Database connected");
                Arc::new(store)
            }
            None => {
                info!("No database configured, using the in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        let holds: Arc<dyn SeatHolds> = match &config.redis.url {
            Some(url) => {
                let holds = RedisSeatHolds::connect(url).await?;
                info!("Redis connected");
                Arc::new(holds)
            }
            None => {
                info!("No Redis configured, keeping seat holds in process");
                Arc::new(MemorySeatHolds::new())
            }
        };

        Ok(Self::with_backends(config, store, holds, Arc::new(SystemClock)))
    }
}

/// The full HTTP application: health routes plus the API under `/api`.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Showtime Booking API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
