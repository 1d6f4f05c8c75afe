use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::error::BookingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    PendingPayment,
    Confirmed,
    Cancelled,
    Expired,
    Refunded,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::PendingPayment => "PENDING_PAYMENT",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
            ReservationStatus::Expired => "EXPIRED",
            ReservationStatus::Refunded => "REFUNDED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Cancelled | ReservationStatus::Expired | ReservationStatus::Refunded
        )
    }

    /// Разрешённые переходы машины состояний брони.
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (PendingPayment, Confirmed)
                | (PendingPayment, Expired)
                | (Confirmed, Cancelled)
                | (Confirmed, Refunded)
        )
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_PAYMENT" => Ok(ReservationStatus::PendingPayment),
            "CONFIRMED" => Ok(ReservationStatus::Confirmed),
            "CANCELLED" => Ok(ReservationStatus::Cancelled),
            "EXPIRED" => Ok(ReservationStatus::Expired),
            "REFUNDED" => Ok(ReservationStatus::Refunded),
            other => Err(BookingError::Internal(format!(
                "unknown reservation status '{}'",
                other
            ))),
        }
    }
}

/// Место в брони с ценой, зафиксированной в момент удержания.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ReservationSeat {
    pub seat_id: i64,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: i64,
    pub booking_reference: String,
    pub customer_id: i64,
    pub showtime_id: i64,
    pub status: ReservationStatus,
    pub total_price: Decimal,
    pub seats: Vec<ReservationSeat>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn seat_ids(&self) -> Vec<i64> {
        self.seats.iter().map(|s| s.seat_id).collect()
    }
}

/// Данные для вставки новой брони (id выдаёт хранилище).
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub booking_reference: String,
    pub customer_id: i64,
    pub showtime_id: i64,
    pub total_price: Decimal,
    pub seats: Vec<ReservationSeat>,
    pub created_at: DateTime<Utc>,
}

impl NewReservation {
    pub fn into_reservation(self, id: i64) -> Reservation {
        Reservation {
            id,
            booking_reference: self.booking_reference,
            customer_id: self.customer_id,
            showtime_id: self.showtime_id,
            status: ReservationStatus::PendingPayment,
            total_price: self.total_price,
            seats: self.seats,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct ReservationRow {
    pub id: i64,
    pub booking_reference: String,
    pub customer_id: i64,
    pub showtime_id: i64,
    pub status: String,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReservationRow {
    pub fn into_reservation(self, seats: Vec<ReservationSeat>) -> Result<Reservation, BookingError> {
        Ok(Reservation {
            id: self.id,
            booking_reference: self.booking_reference,
            customer_id: self.customer_id,
            showtime_id: self.showtime_id,
            status: self.status.parse()?,
            total_price: self.total_price,
            seats,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
