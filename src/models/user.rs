use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Customer {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub is_active: bool,
}
