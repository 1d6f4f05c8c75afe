pub mod admin;
pub mod bookings;
pub mod payment;
pub mod showtimes;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::{BookingError, ErrorKind};

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(bookings::routes())
        .merge(showtimes::routes())
        .merge(payment::routes())
        .nest("/admin", admin::routes())
}

#[derive(Serialize)]
pub struct ApiError {
    success: bool,
    kind: &'static str,
    message: String,
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::SeatNotFound
        | ErrorKind::ShowtimeNotFound
        | ErrorKind::UserNotFound
        | ErrorKind::ReservationNotFound => StatusCode::NOT_FOUND,
        ErrorKind::SeatUnavailable => StatusCode::CONFLICT,
        ErrorKind::InvalidReservation
        | ErrorKind::InvalidCancellation
        | ErrorKind::ShowtimeNotBookable => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::UnauthorizedAccess => StatusCode::FORBIDDEN,
        ErrorKind::Storage | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn kind_name(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::SeatNotFound => "SEAT_NOT_FOUND",
        ErrorKind::SeatUnavailable => "SEAT_UNAVAILABLE",
        ErrorKind::InvalidReservation => "INVALID_RESERVATION",
        ErrorKind::InvalidCancellation => "INVALID_CANCELLATION",
        ErrorKind::UnauthorizedAccess => "UNAUTHORIZED_ACCESS",
        ErrorKind::ShowtimeNotBookable => "SHOWTIME_NOT_BOOKABLE",
        ErrorKind::ShowtimeNotFound => "SHOWTIME_NOT_FOUND",
        ErrorKind::UserNotFound => "USER_NOT_FOUND",
        ErrorKind::ReservationNotFound => "RESERVATION_NOT_FOUND",
        ErrorKind::Storage | ErrorKind::Internal => "INTERNAL",
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);

        // Детали ошибок базы наружу не отдаём
        let message = if self.is_business() {
            self.to_string()
        } else {
            tracing::error!("Request failed: {:?}", self);
            "Внутренняя ошибка сервера".to_string()
        };

        (
            status,
            Json(ApiError {
                success: false,
                kind: kind_name(kind),
                message,
            }),
        )
            .into_response()
    }
}

/// Ошибка валидации тела запроса.
pub fn validation_error(errors: validator::ValidationErrors) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            success: false,
            kind: "VALIDATION",
            message: errors.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_map_to_client_statuses() {
        let cases = [
            (BookingError::SeatNotFound("1".into()), StatusCode::NOT_FOUND),
            (BookingError::SeatUnavailable("1".into()), StatusCode::CONFLICT),
            (BookingError::InvalidCancellation("late".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (BookingError::ShowtimeNotBookable("past".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (BookingError::UnauthorizedAccess("x".into()), StatusCode::FORBIDDEN),
            (BookingError::ReservationNotFound("AB12CD34".into()), StatusCode::NOT_FOUND),
            (BookingError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
