use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::cache::SeatMapEntry;
use crate::error::BookingError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/showtimes/{showtime_id}/seats", get(get_seat_map))
}

#[derive(Debug, Serialize)]
pub struct SeatMapResponse {
    pub showtime_id: i64,
    pub available: usize,
    pub seats: Vec<SeatMapEntry>,
}

// GET /api/showtimes/{showtime_id}/seats
async fn get_seat_map(
    State(state): State<Arc<AppState>>,
    Path(showtime_id): Path<i64>,
) -> Result<Json<SeatMapResponse>, BookingError> {
    let seats = state.cache.get_seat_map(showtime_id).await?;
    if seats.is_empty() {
        return Err(BookingError::ShowtimeNotFound(showtime_id));
    }

    let available = seats
        .iter()
        .filter(|s| s.status == crate::models::SeatStatus::Available)
        .count();
    Ok(Json(SeatMapResponse { showtime_id, available, seats }))
}
