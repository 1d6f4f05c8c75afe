use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use std::sync::Arc;
use tracing::warn;

use crate::error::ErrorKind;

/// Заголовок, который проставляет шлюз аутентификации перед этим сервисом.
pub const CUSTOMER_HEADER: &str = "x-customer-id";
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub customer_id: i64,
    pub email: String,
}

// Покупатель из заголовка, проверенный по справочнику
impl FromRequestParts<Arc<crate::AppState>> for AuthUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let customer_id: i64 = parts
            .headers
            .get(CUSTOMER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let customer = state.users.find_by_id(customer_id).await.map_err(|e| {
            if e.kind() == ErrorKind::UserNotFound {
                warn!("Request with unknown or inactive customer {}", customer_id);
                StatusCode::UNAUTHORIZED
            } else {
                tracing::error!("Customer lookup failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })?;

        Ok(AuthUser {
            customer_id: customer.id,
            email: customer.email,
        })
    }
}

/// Доступ к административным и служебным маршрутам.
#[derive(Debug, Clone, Copy)]
pub struct AdminAuth;

impl FromRequestParts<Arc<crate::AppState>> for AdminAuth {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        if token != state.config.app.admin_token {
            warn!("Rejected admin request with a wrong token");
            return Err(StatusCode::FORBIDDEN);
        }
        Ok(AdminAuth)
    }
}
