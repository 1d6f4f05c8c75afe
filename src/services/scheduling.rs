//! Посев мест сеанса из шаблонов зала.

use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::templates::SeatTemplateCache;
use crate::directory::ShowtimeCatalog;
use crate::error::BookingResult;
use crate::store::BookingStore;

pub struct ShowtimeSeeder<S: BookingStore> {
    store: Arc<S>,
    showtimes: Arc<dyn ShowtimeCatalog>,
    templates: Arc<SeatTemplateCache>,
}

impl<S: BookingStore> ShowtimeSeeder<S> {
    pub fn new(
        store: Arc<S>,
        showtimes: Arc<dyn ShowtimeCatalog>,
        templates: Arc<SeatTemplateCache>,
    ) -> Self {
        Self { store, showtimes, templates }
    }

    /// Создаёт по одному свободному месту на шаблон зала сеанса. Цена места
    /// берётся из базовой цены шаблона. Сеанс, у которого места уже есть,
    /// не трогается, возвращается 0.
    pub async fn seed(&self, showtime_id: i64) -> BookingResult<usize> {
        let showtime = self.showtimes.find_by_id(showtime_id).await?;
        let templates = self.templates.get(showtime.screen_id).await?;
        if templates.is_empty() {
            warn!(
                "Screen {} has no seat templates, showtime {} left without seats",
                showtime.screen_id, showtime_id
            );
            return Ok(0);
        }

        let created = self.store.seed_showtime_seats(showtime_id, &templates).await?;
        if created > 0 {
            info!("🪑 Seeded {} seats for showtime {}", created, showtime_id);
        } else {
            info!("Showtime {} already has seats, nothing to seed", showtime_id);
        }
        Ok(created)
    }
}
