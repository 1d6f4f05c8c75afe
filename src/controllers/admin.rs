use axum::{
    extract::{Path, State},
    routing::{delete, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::BookingError;
use crate::middleware::AdminAuth;
use crate::models::Reservation;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reservations/{reservation_id}/cancel", patch(cancel_reservation))
        .route("/reservations/{reservation_id}/refund", patch(refund_reservation))
        .route("/showtimes/{showtime_id}/seats", post(seed_showtime_seats))
        .route("/screens/{screen_id}/templates", delete(invalidate_templates))
}

// PATCH /api/admin/reservations/{reservation_id}/cancel
async fn cancel_reservation(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(reservation_id): Path<i64>,
) -> Result<Json<Reservation>, BookingError> {
    let reservation = state.reservations.cancel_by_admin(reservation_id).await?;
    state.cache.invalidate_seats(reservation.showtime_id).await;
    Ok(Json(reservation))
}

// PATCH /api/admin/reservations/{reservation_id}/refund
async fn refund_reservation(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(reservation_id): Path<i64>,
) -> Result<Json<Reservation>, BookingError> {
    let reservation = state.reservations.refund(reservation_id).await?;
    state.cache.invalidate_seats(reservation.showtime_id).await;
    Ok(Json(reservation))
}

// POST /api/admin/showtimes/{showtime_id}/seats
async fn seed_showtime_seats(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(showtime_id): Path<i64>,
) -> Result<Json<Value>, BookingError> {
    let created = state.seeder.seed(showtime_id).await?;
    if created > 0 {
        state.cache.invalidate_seats(showtime_id).await;
    }
    Ok(Json(json!({ "showtime_id": showtime_id, "created": created })))
}

// DELETE /api/admin/screens/{screen_id}/templates
async fn invalidate_templates(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(screen_id): Path<i64>,
) -> Json<Value> {
    state.templates.invalidate(screen_id);
    Json(json!({ "screen_id": screen_id, "invalidated": true }))
}
