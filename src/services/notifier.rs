//! Уведомления о переходах брони.
//!
//! Отправка не блокирует и не ломает переход: событие уходит в отдельную
//! задачу, ошибка только логируется.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::Reservation;

#[derive(Debug, Clone)]
pub enum BookingEvent {
    Confirmed(Reservation),
    Cancelled(Reservation),
    Expired(Reservation),
    Refunded(Reservation),
}

impl BookingEvent {
    pub fn reservation(&self) -> &Reservation {
        match self {
            BookingEvent::Confirmed(r)
            | BookingEvent::Cancelled(r)
            | BookingEvent::Expired(r)
            | BookingEvent::Refunded(r) => r,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BookingEvent::Confirmed(_) => "confirmed",
            BookingEvent::Cancelled(_) => "cancelled",
            BookingEvent::Expired(_) => "expired",
            BookingEvent::Refunded(_) => "refunded",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: BookingEvent) -> anyhow::Result<()>;
}

/// Пишет событие в лог. Реальная рассылка писем подключается снаружи.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: BookingEvent) -> anyhow::Result<()> {
        let reservation = event.reservation();
        info!(
            "📨 Reservation {} {} (customer {})",
            reservation.booking_reference,
            event.name(),
            reservation.customer_id
        );
        Ok(())
    }
}

pub fn dispatch(notifier: Arc<dyn Notifier>, event: BookingEvent) {
    tokio::spawn(async move {
        let reference = event.reservation().booking_reference.clone();
        let name = event.name();
        if let Err(e) = notifier.notify(event).await {
            warn!("Notification '{}' for {} failed: {:?}", name, reference, e);
        }
    });
}
