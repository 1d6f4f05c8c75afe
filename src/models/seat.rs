use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::error::BookingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Available,
    Held,
    Reserved,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "AVAILABLE",
            SeatStatus::Held => "HELD",
            SeatStatus::Reserved => "RESERVED",
        }
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(SeatStatus::Available),
            "HELD" => Ok(SeatStatus::Held),
            "RESERVED" => Ok(SeatStatus::Reserved),
            other => Err(BookingError::Internal(format!("unknown seat status '{}'", other))),
        }
    }
}

/// Одно физическое место на одном сеансе.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatRecord {
    pub id: i64,
    pub showtime_id: i64,
    pub seat_row: String,
    pub seat_number: i32,
    pub seat_type: String,
    pub price: Decimal,
    pub status: SeatStatus,
    pub held_at: Option<DateTime<Utc>>,
    pub held_by: Option<i64>,
    /// Обратная ссылка на бронь, без владения. Чистится при освобождении.
    pub reservation_id: Option<i64>,
    pub retired: bool,
}

impl SeatRecord {
    /// Удержание истекло строго после `held_at + hold_window`.
    pub fn hold_expired(&self, hold_window: Duration, now: DateTime<Utc>) -> bool {
        match (self.status, self.held_at) {
            (SeatStatus::Held, Some(held_at)) => held_at + hold_window < now,
            _ => false,
        }
    }

    pub fn hold(&mut self, holder: i64, now: DateTime<Utc>) {
        self.status = SeatStatus::Held;
        self.held_at = Some(now);
        self.held_by = Some(holder);
    }

    pub fn reserve(&mut self) {
        self.status = SeatStatus::Reserved;
        self.held_at = None;
        self.held_by = None;
    }

    pub fn release(&mut self) {
        self.status = SeatStatus::Available;
        self.held_at = None;
        self.held_by = None;
        self.reservation_id = None;
    }
}

// Строка из таблицы seats, статус хранится текстом
#[derive(Debug, FromRow)]
pub struct SeatRow {
    pub id: i64,
    pub showtime_id: i64,
    pub seat_row: String,
    pub seat_number: i32,
    pub seat_type: String,
    pub price: Decimal,
    pub status: String,
    pub held_at: Option<DateTime<Utc>>,
    pub held_by: Option<i64>,
    pub reservation_id: Option<i64>,
    pub retired: bool,
}

impl TryFrom<SeatRow> for SeatRecord {
    type Error = BookingError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        Ok(SeatRecord {
            id: row.id,
            showtime_id: row.showtime_id,
            seat_row: row.seat_row,
            seat_number: row.seat_number,
            seat_type: row.seat_type,
            price: row.price,
            status: row.status.parse()?,
            held_at: row.held_at,
            held_by: row.held_by,
            reservation_id: row.reservation_id,
            retired: row.retired,
        })
    }
}
