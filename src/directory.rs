//! Внешние справочники: покупатели и каталог сеансов.
//!
//! Ядро бронирования только читает их. CRUD каталога и учётных записей
//! живёт в других сервисах.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::{BookingError, BookingResult};
use crate::models::showtime::ShowtimeRow;
use crate::models::{Customer, Showtime};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Активный покупатель или `UserNotFound`.
    async fn find_by_id(&self, customer_id: i64) -> BookingResult<Customer>;
}

#[async_trait]
pub trait ShowtimeCatalog: Send + Sync {
    /// Сеанс или `ShowtimeNotFound`.
    async fn find_by_id(&self, showtime_id: i64) -> BookingResult<Showtime>;
}

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_id(&self, customer_id: i64) -> BookingResult<Customer> {
        sqlx::query_as::<_, Customer>(
            "SELECT id, email, full_name, is_active
             FROM customers
             WHERE id = $1 AND is_active = true",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(BookingError::UserNotFound(customer_id))
    }
}

#[derive(Clone)]
pub struct PgShowtimeCatalog {
    pool: PgPool,
}

impl PgShowtimeCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShowtimeCatalog for PgShowtimeCatalog {
    async fn find_by_id(&self, showtime_id: i64) -> BookingResult<Showtime> {
        let row = sqlx::query_as::<_, ShowtimeRow>(
            "SELECT id, screen_id, movie_title, start_time, status, available_seats
             FROM showtimes WHERE id = $1",
        )
        .bind(showtime_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(BookingError::ShowtimeNotFound(showtime_id))?;

        Showtime::try_from(row)
    }
}
