use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Шаблон места в зале, из которого создаются места сеанса.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SeatTemplate {
    pub screen_id: i64,
    pub seat_row: String,
    pub seat_number: i32,
    pub seat_type: String,
    pub base_price: Decimal,
}
