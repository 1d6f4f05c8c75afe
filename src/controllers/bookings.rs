use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::controllers::validation_error;
use crate::error::BookingError;
use crate::middleware::AuthUser;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reservations", post(create_reservation))
        .route("/reservations/{booking_reference}", get(get_reservation))
        .route("/reservations/{booking_reference}/cancel", patch(cancel_reservation))
}

// POST /api/reservations
#[derive(Debug, Deserialize, Validate)]
pub struct CreateReservationRequest {
    #[validate(range(min = 1, message = "showtime_id должен быть > 0"))]
    pub showtime_id: i64,
    #[validate(length(min = 1, message = "нужно выбрать хотя бы одно место"))]
    pub seat_ids: Vec<i64>,
}

async fn create_reservation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateReservationRequest>,
) -> Result<Response, BookingError> {
    if let Err(errors) = req.validate() {
        return Ok(validation_error(errors));
    }

    let reservation = state
        .reservations
        .create(user.customer_id, req.showtime_id, &req.seat_ids)
        .await?;
    state.cache.invalidate_seats(reservation.showtime_id).await;

    Ok((StatusCode::CREATED, Json(reservation)).into_response())
}

// GET /api/reservations/{booking_reference}
async fn get_reservation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(booking_reference): Path<String>,
) -> Result<impl IntoResponse, BookingError> {
    let reservation = state
        .reservations
        .find_by_booking_reference(&booking_reference)
        .await?;

    // Чужую бронь не показываем, как будто её нет
    if reservation.customer_id != user.customer_id {
        return Err(BookingError::ReservationNotFound(booking_reference));
    }
    Ok(Json(reservation))
}

// PATCH /api/reservations/{booking_reference}/cancel
async fn cancel_reservation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(booking_reference): Path<String>,
) -> Result<impl IntoResponse, BookingError> {
    let reservation = state
        .reservations
        .cancel(&booking_reference, user.customer_id)
        .await?;
    state.cache.invalidate_seats(reservation.showtime_id).await;

    Ok(Json(reservation))
}
