use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

use crate::error::BookingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShowtimeStatus {
    Scheduled,
    Cancelled,
    Completed,
}

impl ShowtimeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShowtimeStatus::Scheduled => "SCHEDULED",
            ShowtimeStatus::Cancelled => "CANCELLED",
            ShowtimeStatus::Completed => "COMPLETED",
        }
    }
}

impl FromStr for ShowtimeStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(ShowtimeStatus::Scheduled),
            "CANCELLED" => Ok(ShowtimeStatus::Cancelled),
            "COMPLETED" => Ok(ShowtimeStatus::Completed),
            other => Err(BookingError::Internal(format!("unknown showtime status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Showtime {
    pub id: i64,
    pub screen_id: i64,
    pub movie_title: String,
    pub start_time: DateTime<Utc>,
    pub status: ShowtimeStatus,
    /// Счётчик свободных мест, меняется только вместе со статусами мест.
    pub available_seats: i32,
}

impl Showtime {
    /// Причина, по которой на сеанс нельзя бронировать, если она есть.
    pub fn unbookable_reason(&self, now: DateTime<Utc>) -> Option<String> {
        if self.status != ShowtimeStatus::Scheduled {
            return Some(format!("showtime {} is {}", self.id, self.status.as_str()));
        }
        if self.start_time <= now {
            return Some(format!("showtime {} has already started", self.id));
        }
        if self.available_seats <= 0 {
            return Some(format!("showtime {} is sold out", self.id));
        }
        None
    }
}

#[derive(Debug, FromRow)]
pub struct ShowtimeRow {
    pub id: i64,
    pub screen_id: i64,
    pub movie_title: String,
    pub start_time: DateTime<Utc>,
    pub status: String,
    pub available_seats: i32,
}

impl TryFrom<ShowtimeRow> for Showtime {
    type Error = BookingError;

    fn try_from(row: ShowtimeRow) -> Result<Self, Self::Error> {
        Ok(Showtime {
            id: row.id,
            screen_id: row.screen_id,
            movie_title: row.movie_title,
            start_time: row.start_time,
            status: row.status.parse()?,
            available_seats: row.available_seats,
        })
    }
}
