pub mod cache;
pub mod clock;
pub mod config;
pub mod controllers;
pub mod database;
pub mod directory;
pub mod error;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;
pub mod store;

use std::sync::Arc;
use tokio::task;

use crate::cache::templates::{PgSeatTemplateSource, SeatTemplateCache};
use crate::directory::{PgShowtimeCatalog, PgUserDirectory, UserDirectory};
use crate::services::{ReservationLifecycle, ShowtimeSeeder};
use crate::store::PgBookingStore;

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub db: database::Database,
    pub redis: redis_client::RedisClient,
    pub cache: cache::CacheService,
    pub templates: Arc<SeatTemplateCache>,
    pub users: Arc<dyn UserDirectory>,
    pub reservations: Arc<ReservationLifecycle<PgBookingStore>>,
    pub seeder: Arc<ShowtimeSeeder<PgBookingStore>>,
    pub config: config::Config,
}

impl AppState {
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let db = database::Database::new(&config.database.url, config.database.pool_size).await?;
        db.run_migrations().await?;

        let redis = redis_client::RedisClient::new(&config.redis.url).await?;

        let store = Arc::new(PgBookingStore::new(db.pool.clone()));
        let showtimes = Arc::new(PgShowtimeCatalog::new(db.pool.clone()));
        let users: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(db.pool.clone()));

        let cache = cache::CacheService::new(
            redis.clone(),
            store.as_ref().clone(),
            config.redis.seat_map_ttl_secs,
            config.booking.hold_window(),
        );
        let templates = Arc::new(SeatTemplateCache::new(Arc::new(PgSeatTemplateSource::new(
            db.pool.clone(),
        ))));

        let reservations = Arc::new(ReservationLifecycle::new(
            store.clone(),
            showtimes.clone(),
            users.clone(),
            config.booking.clone(),
        ));
        let seeder = Arc::new(ShowtimeSeeder::new(store, showtimes, templates.clone()));

        let state = Arc::new(Self {
            db,
            redis,
            cache,
            templates,
            users,
            reservations,
            seeder,
            config,
        });

        let state_for_bg = state.clone();
        task::spawn(async move {
            // Warmup шаблонов в фоне
            state_for_bg.templates.warmup().await;
        });

        Ok(state)
    }
}
