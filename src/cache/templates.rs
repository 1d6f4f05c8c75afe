//! Кеш шаблонов мест по залам.
//!
//! Шаблоны меняются редко, а читаются при каждом посеве мест сеанса, поэтому
//! держим их в памяти процесса. Кеш принадлежит `AppState`, глобального
//! состояния нет.

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::BookingResult;
use crate::models::SeatTemplate;

#[async_trait]
pub trait SeatTemplateSource: Send + Sync {
    async fn load_screen(&self, screen_id: i64) -> BookingResult<Vec<SeatTemplate>>;

    async fn screen_ids(&self) -> BookingResult<Vec<i64>>;
}

#[derive(Clone)]
pub struct PgSeatTemplateSource {
    pool: PgPool,
}

impl PgSeatTemplateSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SeatTemplateSource for PgSeatTemplateSource {
    async fn load_screen(&self, screen_id: i64) -> BookingResult<Vec<SeatTemplate>> {
        let templates = sqlx::query_as::<_, SeatTemplate>(
            "SELECT screen_id, seat_row, seat_number, seat_type, base_price
             FROM seat_templates
             WHERE screen_id = $1
             ORDER BY seat_row, seat_number",
        )
        .bind(screen_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(templates)
    }

    async fn screen_ids(&self) -> BookingResult<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT DISTINCT screen_id FROM seat_templates ORDER BY screen_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}

pub struct SeatTemplateCache {
    source: Arc<dyn SeatTemplateSource>,
    screens: RwLock<HashMap<i64, Arc<Vec<SeatTemplate>>>>,
}

impl SeatTemplateCache {
    pub fn new(source: Arc<dyn SeatTemplateSource>) -> Self {
        Self {
            source,
            screens: RwLock::new(HashMap::new()),
        }
    }

    /// Шаблоны зала. Пустой зал не кешируется, чтобы не запомнить промах.
    pub async fn get(&self, screen_id: i64) -> BookingResult<Arc<Vec<SeatTemplate>>> {
        let cached = self.screens.read().get(&screen_id).cloned();
        if let Some(cached) = cached {
            return Ok(cached);
        }

        let loaded = Arc::new(self.source.load_screen(screen_id).await?);
        if !loaded.is_empty() {
            self.screens.write().insert(screen_id, loaded.clone());
        }
        Ok(loaded)
    }

    // Прогрев при старте
    pub async fn warmup(&self) {
        let screen_ids = match self.source.screen_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Seat template warmup skipped: {}", e);
                return;
            }
        };

        let mut loaded = 0;
        for screen_id in screen_ids {
            match self.get(screen_id).await {
                Ok(_) => loaded += 1,
                Err(e) => warn!("Failed to load seat templates for screen {}: {}", screen_id, e),
            }
        }
        info!("Seat templates cached for {} screens", loaded);
    }

    pub fn invalidate(&self, screen_id: i64) {
        self.screens.write().remove(&screen_id);
        info!("Invalidated seat templates for screen {}", screen_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rust_decimal::Decimal;

    #[derive(Default)]
    struct CountingSource {
        loads: Mutex<u32>,
        rows: Mutex<Vec<SeatTemplate>>,
    }

    #[async_trait]
    impl SeatTemplateSource for CountingSource {
        async fn load_screen(&self, screen_id: i64) -> BookingResult<Vec<SeatTemplate>> {
            *self.loads.lock() += 1;
            Ok(self
                .rows
                .lock()
                .iter()
                .filter(|t| t.screen_id == screen_id)
                .cloned()
                .collect())
        }

        async fn screen_ids(&self) -> BookingResult<Vec<i64>> {
            Ok(vec![1])
        }
    }

    fn template(seat_number: i32, price: i64) -> SeatTemplate {
        SeatTemplate {
            screen_id: 1,
            seat_row: "A".into(),
            seat_number,
            seat_type: "STANDARD".into(),
            base_price: Decimal::new(price, 2),
        }
    }

    #[tokio::test]
    async fn second_read_is_served_from_memory() {
        let source = Arc::new(CountingSource::default());
        source.rows.lock().push(template(1, 900));
        let cache = SeatTemplateCache::new(source.clone());

        cache.warmup().await;
        let templates = cache.get(1).await.unwrap();

        assert_eq!(templates.len(), 1);
        assert_eq!(*source.loads.lock(), 1);
    }

    #[tokio::test]
    async fn invalidate_picks_up_changed_templates() {
        let source = Arc::new(CountingSource::default());
        source.rows.lock().push(template(1, 900));
        let cache = SeatTemplateCache::new(source.clone());
        cache.get(1).await.unwrap();

        source.rows.lock().push(template(2, 1200));
        assert_eq!(cache.get(1).await.unwrap().len(), 1);

        cache.invalidate(1);
        assert_eq!(cache.get(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_screen_is_not_remembered() {
        let source = Arc::new(CountingSource::default());
        let cache = SeatTemplateCache::new(source.clone());

        assert!(cache.get(7).await.unwrap().is_empty());
        assert!(cache.get(7).await.unwrap().is_empty());
        assert_eq!(*source.loads.lock(), 2);
    }
}
