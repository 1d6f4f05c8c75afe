//! Жизненный цикл брони: создание, оплата, отмена, возврат и истечение.
//!
//! Каждая операция выполняется в одной транзакции хранилища. Любая ошибка
//! до `commit` роняет транзакцию, и частичное состояние не сохраняется.
//! Уведомления отправляются только после успешного коммита.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::BookingPolicy;
use crate::directory::{ShowtimeCatalog, UserDirectory};
use crate::error::{BookingError, BookingResult};
use crate::models::{
    NewReservation, Reservation, ReservationSeat, ReservationStatus, SeatStatus,
};
use crate::services::booking_reference::{BookingReferenceGenerator, ReferenceGenerator};
use crate::services::notifier::{dispatch, BookingEvent, LogNotifier, Notifier};
use crate::services::seat_lock::SeatLockGateway;
use crate::store::{BookingStore, StoreTx};

pub struct ReservationLifecycle<S: BookingStore> {
    store: Arc<S>,
    showtimes: Arc<dyn ShowtimeCatalog>,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    references: Arc<dyn ReferenceGenerator>,
    gateway: SeatLockGateway,
    policy: BookingPolicy,
}

impl<S: BookingStore> ReservationLifecycle<S> {
    pub fn new(
        store: Arc<S>,
        showtimes: Arc<dyn ShowtimeCatalog>,
        users: Arc<dyn UserDirectory>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            store,
            showtimes,
            users,
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
            references: Arc::new(BookingReferenceGenerator),
            gateway: SeatLockGateway::new(&policy),
            policy,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_reference_generator(mut self, references: Arc<dyn ReferenceGenerator>) -> Self {
        self.references = references;
        self
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Удерживает места и создаёт бронь в статусе PENDING_PAYMENT.
    pub async fn create(
        &self,
        customer_id: i64,
        showtime_id: i64,
        seat_ids: &[i64],
    ) -> BookingResult<Reservation> {
        let customer = self.users.find_by_id(customer_id).await.inspect_err(|e| {
            warn!("Booking rejected, customer {} lookup failed: {}", customer_id, e);
        })?;
        let showtime = self.showtimes.find_by_id(showtime_id).await.inspect_err(|e| {
            warn!("Booking rejected, showtime {} lookup failed: {}", showtime_id, e);
        })?;

        let now = self.clock.now();
        if let Some(reason) = showtime.unbookable_reason(now) {
            return Err(BookingError::ShowtimeNotBookable(reason));
        }

        let mut tx = self.store.begin().await?;
        let locked = self
            .gateway
            .lock_and_validate(&mut tx, seat_ids, showtime.id, customer.id, now)
            .await?;

        // Цена фиксируется на момент удержания
        let seats: Vec<ReservationSeat> = locked
            .seats
            .iter()
            .map(|s| ReservationSeat { seat_id: s.id, price: s.price })
            .collect();
        let total_price: Decimal = seats.iter().map(|s| s.price).sum();

        let new = NewReservation {
            booking_reference: String::new(),
            customer_id: customer.id,
            showtime_id: showtime.id,
            total_price,
            seats,
            created_at: now,
        };
        let reservation = self.insert_with_unique_reference(&mut tx, new).await?;
        tx.commit().await?;

        info!(
            "🎫 Reservation {} created for customer {}: {} seats on showtime {}, total {}",
            reservation.booking_reference,
            customer.id,
            reservation.seats.len(),
            showtime.id,
            reservation.total_price
        );
        Ok(reservation)
    }

    async fn insert_with_unique_reference(
        &self,
        tx: &mut S::Tx,
        mut new: NewReservation,
    ) -> BookingResult<Reservation> {
        for attempt in 1..=self.policy.max_reference_attempts {
            new.booking_reference = self.references.generate();
            if let Some(reservation) = tx.insert_reservation(&new).await? {
                return Ok(reservation);
            }
            debug!(
                "Booking reference {} already taken (attempt {}/{})",
                new.booking_reference, attempt, self.policy.max_reference_attempts
            );
        }
        Err(BookingError::Internal(format!(
            "could not allocate a unique booking reference in {} attempts",
            self.policy.max_reference_attempts
        )))
    }

    /// Отмена подтверждённой брони её владельцем не позже чем за окно отмены.
    pub async fn cancel(
        &self,
        booking_reference: &str,
        customer_id: i64,
    ) -> BookingResult<Reservation> {
        let mut tx = self.store.begin().await?;
        let reservation = tx
            .lock_reservation_by_reference(booking_reference)
            .await?
            .ok_or_else(|| BookingError::ReservationNotFound(booking_reference.to_string()))?;

        if reservation.customer_id != customer_id {
            warn!(
                "Customer {} tried to cancel reservation {} of customer {}",
                customer_id, booking_reference, reservation.customer_id
            );
            return Err(BookingError::UnauthorizedAccess(format!(
                "reservation {} belongs to another customer",
                booking_reference
            )));
        }
        ensure_transition(&reservation, ReservationStatus::Cancelled)
            .map_err(BookingError::InvalidCancellation)?;

        let showtime = self.showtimes.find_by_id(reservation.showtime_id).await?;
        let now = self.clock.now();
        let deadline = showtime.start_time - self.policy.cancel_window();
        if now >= deadline {
            return Err(BookingError::InvalidCancellation(format!(
                "reservation {} can only be cancelled before {}",
                booking_reference, deadline
            )));
        }

        let cancelled = self
            .close_with_release(tx, reservation, ReservationStatus::Cancelled, now)
            .await?;
        dispatch(self.notifier.clone(), BookingEvent::Cancelled(cancelled.clone()));
        Ok(cancelled)
    }

    /// Административная отмена: без проверки владельца и окна отмены.
    pub async fn cancel_by_admin(&self, reservation_id: i64) -> BookingResult<Reservation> {
        let mut tx = self.store.begin().await?;
        let reservation = lock_by_id(&mut tx, reservation_id).await?;
        ensure_transition(&reservation, ReservationStatus::Cancelled)
            .map_err(BookingError::InvalidCancellation)?;

        let now = self.clock.now();
        let cancelled = self
            .close_with_release(tx, reservation, ReservationStatus::Cancelled, now)
            .await?;
        dispatch(self.notifier.clone(), BookingEvent::Cancelled(cancelled.clone()));
        Ok(cancelled)
    }

    pub async fn refund(&self, reservation_id: i64) -> BookingResult<Reservation> {
        let mut tx = self.store.begin().await?;
        let reservation = lock_by_id(&mut tx, reservation_id).await?;
        ensure_transition(&reservation, ReservationStatus::Refunded)
            .map_err(BookingError::InvalidCancellation)?;

        let now = self.clock.now();
        let refunded = self
            .close_with_release(tx, reservation, ReservationStatus::Refunded, now)
            .await?;
        dispatch(self.notifier.clone(), BookingEvent::Refunded(refunded.clone()));
        Ok(refunded)
    }

    pub async fn find_by_booking_reference(
        &self,
        booking_reference: &str,
    ) -> BookingResult<Reservation> {
        self.store
            .find_reservation_by_reference(booking_reference)
            .await?
            .ok_or_else(|| BookingError::ReservationNotFound(booking_reference.to_string()))
    }

    pub async fn find_by_id(&self, reservation_id: i64) -> BookingResult<Reservation> {
        self.store
            .find_reservation(reservation_id)
            .await?
            .ok_or_else(|| BookingError::ReservationNotFound(reservation_id.to_string()))
    }

    /// Успешная оплата: места переходят в RESERVED, бронь в CONFIRMED.
    ///
    /// Если хотя бы одно место уже перехвачено после истечения удержания,
    /// бронь остаётся в PENDING_PAYMENT и позже истечёт через sweeper.
    pub async fn confirm_payment(&self, reservation_id: i64) -> BookingResult<Reservation> {
        let mut tx = self.store.begin().await?;
        let mut reservation = lock_by_id(&mut tx, reservation_id).await?;
        ensure_transition(&reservation, ReservationStatus::Confirmed)
            .map_err(BookingError::InvalidReservation)?;

        let mut seats = tx.lock_linked_seats(&[reservation.id]).await?;
        let linked: Vec<i64> = seats.iter().map(|s| s.id).collect();
        let lost: Vec<i64> = reservation
            .seat_ids()
            .into_iter()
            .filter(|id| !linked.contains(id))
            .chain(seats.iter().filter(|s| s.status != SeatStatus::Held).map(|s| s.id))
            .collect();
        if !lost.is_empty() {
            warn!(
                "Payment for reservation {} arrived after seats {:?} were taken",
                reservation.booking_reference, lost
            );
            return Err(BookingError::SeatUnavailable(format!(
                "seats {:?} of reservation {} are no longer held",
                lost, reservation.booking_reference
            )));
        }

        for seat in seats.iter_mut() {
            seat.reserve();
        }
        tx.save_seats(&seats).await?;

        let now = self.clock.now();
        tx.set_reservation_status(reservation.id, ReservationStatus::Confirmed, now)
            .await?;
        tx.commit().await?;

        reservation.status = ReservationStatus::Confirmed;
        reservation.updated_at = now;
        info!(
            "✅ Reservation {} confirmed, {} seats reserved",
            reservation.booking_reference,
            seats.len()
        );
        dispatch(self.notifier.clone(), BookingEvent::Confirmed(reservation.clone()));
        Ok(reservation)
    }

    /// Неуспешная оплата ничего не меняет: бронь ждёт истечения удержания.
    pub async fn record_payment_failure(&self, reservation_id: i64) -> BookingResult<Reservation> {
        let reservation = self.find_by_id(reservation_id).await?;
        if reservation.status != ReservationStatus::PendingPayment {
            return Err(BookingError::InvalidReservation(format!(
                "reservation {} is {}, not awaiting payment",
                reservation.booking_reference, reservation.status
            )));
        }
        info!(
            "💳 Payment failed for reservation {}, seats stay held until expiry",
            reservation.booking_reference
        );
        Ok(reservation)
    }

    pub async fn process_expired_holds(&self) -> BookingResult<Vec<Reservation>> {
        self.process_expired_holds_at(self.clock.now()).await
    }

    /// Переводит в EXPIRED брони, созданные не позже `now - hold_window`,
    /// и освобождает их места. Брони обрабатываются пачками по
    /// `sweep_batch_size`, каждая пачка в своей транзакции, пока не придёт
    /// неполная пачка. Повторный запуск ничего не делает: истёкшие брони уже
    /// вышли из PENDING_PAYMENT.
    pub async fn process_expired_holds_at(
        &self,
        now: DateTime<Utc>,
    ) -> BookingResult<Vec<Reservation>> {
        let cutoff = now - self.policy.hold_window();
        let limit = self.policy.sweep_batch_size.max(1);

        let mut expired = Vec::new();
        loop {
            let batch = self.expire_batch(cutoff, limit, now).await?;
            let full = batch.len() as i64 >= limit;
            expired.extend(batch);
            if !full {
                break;
            }
        }
        Ok(expired)
    }

    async fn expire_batch(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
        now: DateTime<Utc>,
    ) -> BookingResult<Vec<Reservation>> {
        let mut tx = self.store.begin().await?;
        let mut expired = tx.lock_expired_pending(cutoff, limit).await?;
        if expired.is_empty() {
            return Ok(expired);
        }

        let ids: Vec<i64> = expired.iter().map(|r| r.id).collect();
        let released = release_seats(&mut tx, &ids).await?;
        for reservation in expired.iter_mut() {
            tx.set_reservation_status(reservation.id, ReservationStatus::Expired, now)
                .await?;
            reservation.status = ReservationStatus::Expired;
            reservation.updated_at = now;
        }
        tx.commit().await?;

        info!(
            "⏰ Expired {} reservations, {} seats returned to sale",
            expired.len(),
            released
        );
        for reservation in &expired {
            dispatch(self.notifier.clone(), BookingEvent::Expired(reservation.clone()));
        }
        Ok(expired)
    }

    async fn close_with_release(
        &self,
        mut tx: S::Tx,
        mut reservation: Reservation,
        next: ReservationStatus,
        now: DateTime<Utc>,
    ) -> BookingResult<Reservation> {
        let released = release_seats(&mut tx, &[reservation.id]).await?;
        tx.set_reservation_status(reservation.id, next, now).await?;
        tx.commit().await?;

        reservation.status = next;
        reservation.updated_at = now;
        info!(
            "Reservation {} {}, {} seats released",
            reservation.booking_reference, next, released
        );
        Ok(reservation)
    }
}

async fn lock_by_id<T: StoreTx>(tx: &mut T, reservation_id: i64) -> BookingResult<Reservation> {
    tx.lock_reservation(reservation_id)
        .await?
        .ok_or_else(|| BookingError::ReservationNotFound(reservation_id.to_string()))
}

fn ensure_transition(reservation: &Reservation, next: ReservationStatus) -> Result<(), String> {
    if reservation.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(format!(
            "reservation {} is {} and cannot become {}",
            reservation.booking_reference, reservation.status, next
        ))
    }
}

/// Общий путь освобождения мест: все места, которые всё ещё ссылаются на
/// эти брони, становятся AVAILABLE, счётчик каждого сеанса растёт на
/// число реально освобождённых мест. Возвращает это число.
async fn release_seats<T: StoreTx>(tx: &mut T, reservation_ids: &[i64]) -> BookingResult<usize> {
    let mut seats = tx.lock_linked_seats(reservation_ids).await?;
    let mut deltas: BTreeMap<i64, i32> = BTreeMap::new();
    let mut released = 0;

    for seat in seats.iter_mut() {
        if seat.status != SeatStatus::Available {
            *deltas.entry(seat.showtime_id).or_insert(0) += 1;
            released += 1;
        }
        seat.release();
    }

    tx.save_seats(&seats).await?;
    for (showtime_id, delta) in deltas {
        tx.adjust_availability(showtime_id, delta).await?;
    }
    Ok(released)
}
