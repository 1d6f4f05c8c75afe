//! Периодический возврат мест с истёкших удержаний.
//!
//! Запускается из `main` как отдельная задача. Ошибка одного прохода только
//! логируется: следующий тик снова увидит те же брони.

use futures::FutureExt;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::cache::CacheService;
use crate::services::reservation::ReservationLifecycle;
use crate::store::BookingStore;

pub struct HoldExpirySweeper<S: BookingStore> {
    lifecycle: Arc<ReservationLifecycle<S>>,
    cache: Option<CacheService>,
    interval: Duration,
}

impl<S: BookingStore> HoldExpirySweeper<S> {
    pub fn new(lifecycle: Arc<ReservationLifecycle<S>>) -> Self {
        let interval = lifecycle.policy().sweep_interval();
        Self { lifecycle, cache: None, interval }
    }

    /// Сбрасывать кеш схемы зала для сеансов, где освободились места.
    pub fn with_cache(mut self, cache: CacheService) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Один проход. Возвращает число истёкших броней, ошибки не пробрасывает.
    pub async fn run_once(&self) -> usize {
        let outcome = AssertUnwindSafe(self.lifecycle.process_expired_holds())
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(expired)) if expired.is_empty() => {
                debug!("🧹 Sweep found no expired holds");
                0
            }
            Ok(Ok(expired)) => {
                info!("🧹 Sweep expired {} reservations", expired.len());
                if let Some(cache) = &self.cache {
                    let showtimes: BTreeSet<i64> = expired.iter().map(|r| r.showtime_id).collect();
                    for showtime_id in showtimes {
                        cache.invalidate_seats(showtime_id).await;
                    }
                }
                expired.len()
            }
            Ok(Err(e)) => {
                error!("Sweep failed, will retry on next tick: {}", e);
                0
            }
            Err(_) => {
                error!("Sweep panicked, will retry on next tick");
                0
            }
        }
    }

    /// Запускает цикл до сигнала `true` в `shutdown`.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("🧹 Hold expiry sweeper started, every {:?}", self.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    // watch::Ref не Send, поэтому гасим его внутри блока
                    _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
                }
            }
            info!("🧹 Hold expiry sweeper stopped");
        })
    }
}
