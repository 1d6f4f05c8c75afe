//! Точка входа для результата оплаты.
//!
//! Сам платёжный шлюз живёт снаружи: он присылает сюда только итог по брони.

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::error::BookingError;
use crate::middleware::AdminAuth;
use crate::models::Reservation;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/payments/callback", post(payment_callback))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Deserialize)]
pub struct PaymentCallback {
    pub reservation_id: i64,
    pub outcome: PaymentOutcome,
}

// POST /api/payments/callback
async fn payment_callback(
    State(state): State<Arc<AppState>>,
    _service: AdminAuth,
    Json(callback): Json<PaymentCallback>,
) -> Result<Json<Reservation>, BookingError> {
    info!(
        "💳 Payment callback for reservation {}: {:?}",
        callback.reservation_id, callback.outcome
    );

    let reservation = match callback.outcome {
        PaymentOutcome::Succeeded => {
            let confirmed = state.reservations.confirm_payment(callback.reservation_id).await?;
            state.cache.invalidate_seats(confirmed.showtime_id).await;
            confirmed
        }
        PaymentOutcome::Failed | PaymentOutcome::Cancelled => {
            state
                .reservations
                .record_payment_failure(callback.reservation_id)
                .await?
        }
    };
    Ok(Json(reservation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_outcome_parses_lowercase() {
        let callback: PaymentCallback =
            serde_json::from_str(r#"{"reservation_id": 12, "outcome": "succeeded"}"#).unwrap();
        assert_eq!(callback.outcome, PaymentOutcome::Succeeded);
        assert!(serde_json::from_str::<PaymentCallback>(
            r#"{"reservation_id": 12, "outcome": "SUCCESS"}"#
        )
        .is_err());
    }
}
