//! Ошибки бизнес-уровня бронирования.
//!
//! Один тегированный enum вместо иерархии исключений: каждая ветка несёт
//! сообщение с контекстом, а [`ErrorKind`] позволяет явно сопоставить ошибку
//! на границе, где она превращается в HTTP-ответ.

use thiserror::Error;

/// Тип ошибки без полезной нагрузки, удобный для `match` на границе API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SeatNotFound,
    SeatUnavailable,
    InvalidReservation,
    InvalidCancellation,
    UnauthorizedAccess,
    ShowtimeNotBookable,
    ShowtimeNotFound,
    UserNotFound,
    ReservationNotFound,
    Storage,
    Internal,
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("seat not found: {0}")]
    SeatNotFound(String),

    #[error("seat unavailable: {0}")]
    SeatUnavailable(String),

    #[error("invalid reservation: {0}")]
    InvalidReservation(String),

    #[error("invalid cancellation: {0}")]
    InvalidCancellation(String),

    #[error("unauthorized access: {0}")]
    UnauthorizedAccess(String),

    #[error("showtime not bookable: {0}")]
    ShowtimeNotBookable(String),

    #[error("showtime not found: {0}")]
    ShowtimeNotFound(i64),

    #[error("user not found: {0}")]
    UserNotFound(i64),

    #[error("reservation not found: {0}")]
    ReservationNotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SeatNotFound(_) => ErrorKind::SeatNotFound,
            Self::SeatUnavailable(_) => ErrorKind::SeatUnavailable,
            Self::InvalidReservation(_) => ErrorKind::InvalidReservation,
            Self::InvalidCancellation(_) => ErrorKind::InvalidCancellation,
            Self::UnauthorizedAccess(_) => ErrorKind::UnauthorizedAccess,
            Self::ShowtimeNotBookable(_) => ErrorKind::ShowtimeNotBookable,
            Self::ShowtimeNotFound(_) => ErrorKind::ShowtimeNotFound,
            Self::UserNotFound(_) => ErrorKind::UserNotFound,
            Self::ReservationNotFound(_) => ErrorKind::ReservationNotFound,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Ошибки, которые видит клиент как отказ по бизнес-правилам.
    pub fn is_business(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Storage | ErrorKind::Internal)
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
