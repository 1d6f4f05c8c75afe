use chrono::{DateTime, Duration, Utc};
use redis::AsyncCommands;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::BookingResult;
use crate::models::{SeatRecord, SeatStatus};
use crate::redis_client::RedisClient;
use crate::store::{BookingStore, PgBookingStore};

pub mod templates;

/// Место в карте зала, как её видит покупатель.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatMapEntry {
    pub seat_id: i64,
    pub seat_row: String,
    pub seat_number: i32,
    pub seat_type: String,
    pub price: Decimal,
    pub status: SeatStatus,
}

impl SeatMapEntry {
    // Истёкшее удержание показываем свободным: его заберёт первый же запрос
    pub fn from_record(seat: &SeatRecord, hold_window: Duration, now: DateTime<Utc>) -> Self {
        let status = if seat.hold_expired(hold_window, now) {
            SeatStatus::Available
        } else {
            seat.status
        };
        Self {
            seat_id: seat.id,
            seat_row: seat.seat_row.clone(),
            seat_number: seat.seat_number,
            seat_type: seat.seat_type.clone(),
            price: seat.price,
            status,
        }
    }
}

/// Redis-кеш карты мест сеанса. Ошибки Redis не ломают чтение: при любой
/// проблеме идём в базу.
#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
    store: PgBookingStore,
    ttl_secs: u64,
    hold_window: Duration,
}

impl CacheService {
    pub fn new(redis: RedisClient, store: PgBookingStore, ttl_secs: u64, hold_window: Duration) -> Self {
        Self { redis, store, ttl_secs, hold_window }
    }

    // Получить карту мест сеанса
    pub async fn get_seat_map(&self, showtime_id: i64) -> BookingResult<Vec<SeatMapEntry>> {
        let now = Utc::now();

        // Сначала пробуем кеш
        if let Ok(seats) = self.get_seats_from_cache(showtime_id).await {
            debug!("Seat map for showtime {} served from cache", showtime_id);
            return Ok(self.to_entries(&seats, now));
        }

        // Если кеш не работает - идем в БД
        let seats = self.store.seats_for_showtime(showtime_id).await?;
        if let Err(e) = self.save_seats_to_cache(showtime_id, &seats).await {
            warn!("Failed to cache seat map for showtime {}: {}", showtime_id, e);
        }
        Ok(self.to_entries(&seats, now))
    }

    // Инвалидировать кеш мест
    pub async fn invalidate_seats(&self, showtime_id: i64) {
        let key = seats_key(showtime_id);
        let mut conn = self.redis.conn.clone();
        let result: Result<(), _> = conn.del(&key).await;
        match result {
            Ok(()) => info!("Invalidated seats cache for showtime {}", showtime_id),
            Err(e) => warn!("Failed to invalidate seats cache for showtime {}: {}", showtime_id, e),
        }
    }

    fn to_entries(&self, seats: &[SeatRecord], now: DateTime<Utc>) -> Vec<SeatMapEntry> {
        seats
            .iter()
            .map(|s| SeatMapEntry::from_record(s, self.hold_window, now))
            .collect()
    }

    async fn get_seats_from_cache(&self, showtime_id: i64) -> Result<Vec<SeatRecord>, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        let data: String = conn.get(seats_key(showtime_id)).await?;
        let seats: Vec<SeatRecord> = serde_json::from_str(&data).map_err(|_| {
            redis::RedisError::from((redis::ErrorKind::TypeError, "Parse error"))
        })?;
        Ok(seats)
    }

    async fn save_seats_to_cache(&self, showtime_id: i64, seats: &[SeatRecord]) -> Result<(), redis::RedisError> {
        let data = serde_json::to_string(seats).map_err(|_| {
            redis::RedisError::from((redis::ErrorKind::TypeError, "Serialize error"))
        })?;
        let mut conn = self.redis.conn.clone();
        conn.set_ex(seats_key(showtime_id), data, self.ttl_secs).await
    }
}

fn seats_key(showtime_id: i64) -> String {
    format!("seats:{}", showtime_id)
}
