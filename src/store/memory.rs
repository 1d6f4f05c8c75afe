//! Хранилище в памяти процесса с теми же гарантиями блокировок, что и Postgres.
//!
//! Каждая строка места и брони имеет свой асинхронный мьютекс: `lock_*`
//! ждёт, пока строку не отпустит другая транзакция. Изменения копятся в
//! транзакции и применяются одним шагом под общим локом таблиц в `commit`.
//! Используется тестами и для локального запуска без базы.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};

use super::{BookingStore, StoreTx};
use crate::cache::templates::SeatTemplateSource;
use crate::directory::{ShowtimeCatalog, UserDirectory};
use crate::error::{BookingError, BookingResult};
use crate::models::{
    Customer, NewReservation, Reservation, ReservationStatus, SeatRecord, SeatStatus, SeatTemplate,
    Showtime,
};

#[derive(Default)]
struct RowLocks {
    rows: Mutex<HashMap<i64, Arc<RowMutex<()>>>>,
}

impl RowLocks {
    fn handle(&self, id: i64) -> Arc<RowMutex<()>> {
        self.rows.lock().entry(id).or_default().clone()
    }

    async fn lock(&self, id: i64) -> OwnedMutexGuard<()> {
        self.handle(id).lock_owned().await
    }

    fn try_lock(&self, id: i64) -> Option<OwnedMutexGuard<()>> {
        self.handle(id).try_lock_owned().ok()
    }
}

#[derive(Default)]
struct Tables {
    customers: HashMap<i64, Customer>,
    showtimes: HashMap<i64, Showtime>,
    templates: BTreeMap<i64, Vec<SeatTemplate>>,
    seats: BTreeMap<i64, SeatRecord>,
    reservations: BTreeMap<i64, Reservation>,
    // Занятые коды: закоммиченные и захваченные открытыми транзакциями
    references: HashSet<String>,
    next_seat_id: i64,
    next_reservation_id: i64,
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Tables>,
    seat_locks: RowLocks,
    reservation_locks: RowLocks,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_customer(&self, customer: Customer) {
        self.shared.tables.lock().customers.insert(customer.id, customer);
    }

    pub fn add_showtime(&self, showtime: Showtime) {
        self.shared.tables.lock().showtimes.insert(showtime.id, showtime);
    }

    pub fn add_templates(&self, screen_id: i64, templates: Vec<SeatTemplate>) {
        self.shared.tables.lock().templates.insert(screen_id, templates);
    }

    /// Меняет цену места в обход транзакций (как правка каталога цен).
    pub fn set_seat_price(&self, seat_id: i64, price: rust_decimal::Decimal) {
        if let Some(seat) = self.shared.tables.lock().seats.get_mut(&seat_id) {
            seat.price = price;
        }
    }

    pub fn set_showtime_status(&self, showtime_id: i64, status: crate::models::ShowtimeStatus) {
        if let Some(showtime) = self.shared.tables.lock().showtimes.get_mut(&showtime_id) {
            showtime.status = status;
        }
    }

    pub fn seat(&self, seat_id: i64) -> Option<SeatRecord> {
        self.shared.tables.lock().seats.get(&seat_id).cloned()
    }

    pub fn reservations(&self) -> Vec<Reservation> {
        self.shared.tables.lock().reservations.values().cloned().collect()
    }

    pub fn available_counter(&self, showtime_id: i64) -> Option<i32> {
        self.shared
            .tables
            .lock()
            .showtimes
            .get(&showtime_id)
            .map(|s| s.available_seats)
    }

    /// Число мест в статусе AVAILABLE, посчитанное полным сканом.
    pub fn count_available(&self, showtime_id: i64) -> i32 {
        self.shared
            .tables
            .lock()
            .seats
            .values()
            .filter(|s| s.showtime_id == showtime_id && s.status == SeatStatus::Available)
            .count() as i32
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> BookingResult<MemoryTx> {
        Ok(MemoryTx {
            shared: self.shared.clone(),
            seat_guards: HashMap::new(),
            reservation_guards: HashMap::new(),
            seats: BTreeMap::new(),
            reservations: BTreeMap::new(),
            availability: BTreeMap::new(),
            claimed_references: Vec::new(),
            committed: false,
        })
    }

    async fn find_showtime(&self, showtime_id: i64) -> BookingResult<Option<Showtime>> {
        Ok(self.shared.tables.lock().showtimes.get(&showtime_id).cloned())
    }

    async fn find_reservation(&self, reservation_id: i64) -> BookingResult<Option<Reservation>> {
        Ok(self.shared.tables.lock().reservations.get(&reservation_id).cloned())
    }

    async fn find_reservation_by_reference(
        &self,
        booking_reference: &str,
    ) -> BookingResult<Option<Reservation>> {
        Ok(self
            .shared
            .tables
            .lock()
            .reservations
            .values()
            .find(|r| r.booking_reference == booking_reference)
            .cloned())
    }

    async fn seats_for_showtime(&self, showtime_id: i64) -> BookingResult<Vec<SeatRecord>> {
        let tables = self.shared.tables.lock();
        let mut seats: Vec<SeatRecord> = tables
            .seats
            .values()
            .filter(|s| s.showtime_id == showtime_id && !s.retired)
            .cloned()
            .collect();
        seats.sort_by(|a, b| (&a.seat_row, a.seat_number).cmp(&(&b.seat_row, b.seat_number)));
        Ok(seats)
    }

    async fn seed_showtime_seats(
        &self,
        showtime_id: i64,
        templates: &[SeatTemplate],
    ) -> BookingResult<usize> {
        let mut tables = self.shared.tables.lock();
        if !tables.showtimes.contains_key(&showtime_id) {
            return Err(BookingError::ShowtimeNotFound(showtime_id));
        }
        if templates.is_empty() || tables.seats.values().any(|s| s.showtime_id == showtime_id) {
            return Ok(0);
        }

        for template in templates {
            tables.next_seat_id += 1;
            let id = tables.next_seat_id;
            tables.seats.insert(
                id,
                SeatRecord {
                    id,
                    showtime_id,
                    seat_row: template.seat_row.clone(),
                    seat_number: template.seat_number,
                    seat_type: template.seat_type.clone(),
                    price: template.base_price,
                    status: SeatStatus::Available,
                    held_at: None,
                    held_by: None,
                    reservation_id: None,
                    retired: false,
                },
            );
        }
        if let Some(showtime) = tables.showtimes.get_mut(&showtime_id) {
            showtime.available_seats = templates.len() as i32;
        }
        Ok(templates.len())
    }
}

pub struct MemoryTx {
    shared: Arc<Shared>,
    seat_guards: HashMap<i64, OwnedMutexGuard<()>>,
    reservation_guards: HashMap<i64, OwnedMutexGuard<()>>,
    seats: BTreeMap<i64, SeatRecord>,
    reservations: BTreeMap<i64, Reservation>,
    availability: BTreeMap<i64, i32>,
    claimed_references: Vec<String>,
    committed: bool,
}

impl MemoryTx {
    fn read_seat(&self, seat_id: i64) -> Option<SeatRecord> {
        self.seats
            .get(&seat_id)
            .cloned()
            .or_else(|| self.shared.tables.lock().seats.get(&seat_id).cloned())
    }

    fn read_reservation(&self, reservation_id: i64) -> Option<Reservation> {
        self.reservations
            .get(&reservation_id)
            .cloned()
            .or_else(|| self.shared.tables.lock().reservations.get(&reservation_id).cloned())
    }

    // Блокировки берутся по возрастанию id, уже взятые не перезахватываются
    async fn acquire_seats(&mut self, seat_ids: &[i64]) {
        let mut ordered: Vec<i64> = seat_ids.to_vec();
        ordered.sort_unstable();
        ordered.dedup();
        for id in ordered {
            if !self.seat_guards.contains_key(&id) {
                let guard = self.shared.seat_locks.lock(id).await;
                self.seat_guards.insert(id, guard);
            }
        }
    }

    async fn acquire_reservation(&mut self, reservation_id: i64) {
        if !self.reservation_guards.contains_key(&reservation_id) {
            let guard = self.shared.reservation_locks.lock(reservation_id).await;
            self.reservation_guards.insert(reservation_id, guard);
        }
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if self.committed || self.claimed_references.is_empty() {
            return;
        }
        let mut tables = self.shared.tables.lock();
        for reference in self.claimed_references.drain(..) {
            tables.references.remove(&reference);
        }
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_seats(&mut self, seat_ids: &[i64]) -> BookingResult<Vec<SeatRecord>> {
        self.acquire_seats(seat_ids).await;

        let mut ordered: Vec<i64> = seat_ids.to_vec();
        ordered.sort_unstable();
        ordered.dedup();
        Ok(ordered.into_iter().filter_map(|id| self.read_seat(id)).collect())
    }

    async fn save_seats(&mut self, seats: &[SeatRecord]) -> BookingResult<()> {
        for seat in seats {
            if !self.seat_guards.contains_key(&seat.id) {
                return Err(BookingError::Internal(format!(
                    "seat {} written without holding its lock",
                    seat.id
                )));
            }
            self.seats.insert(seat.id, seat.clone());
        }
        Ok(())
    }

    async fn adjust_availability(&mut self, showtime_id: i64, delta: i32) -> BookingResult<()> {
        if !self.shared.tables.lock().showtimes.contains_key(&showtime_id) {
            return Err(BookingError::ShowtimeNotFound(showtime_id));
        }
        *self.availability.entry(showtime_id).or_insert(0) += delta;
        Ok(())
    }

    async fn insert_reservation(
        &mut self,
        reservation: &NewReservation,
    ) -> BookingResult<Option<Reservation>> {
        let id = {
            let mut tables = self.shared.tables.lock();
            if !tables.references.insert(reservation.booking_reference.clone()) {
                return Ok(None);
            }
            tables.next_reservation_id += 1;
            tables.next_reservation_id
        };
        self.claimed_references.push(reservation.booking_reference.clone());

        for link in &reservation.seats {
            let mut seat = self.read_seat(link.seat_id).ok_or_else(|| {
                BookingError::SeatNotFound(format!("seat {} vanished mid-transaction", link.seat_id))
            })?;
            seat.reservation_id = Some(id);
            self.save_seats(std::slice::from_ref(&seat)).await?;
        }

        let created = reservation.clone().into_reservation(id);
        self.reservations.insert(id, created.clone());
        Ok(Some(created))
    }

    async fn lock_reservation(&mut self, reservation_id: i64) -> BookingResult<Option<Reservation>> {
        if self.read_reservation(reservation_id).is_none() {
            return Ok(None);
        }
        self.acquire_reservation(reservation_id).await;
        Ok(self.read_reservation(reservation_id))
    }

    async fn lock_reservation_by_reference(
        &mut self,
        booking_reference: &str,
    ) -> BookingResult<Option<Reservation>> {
        let id = self
            .shared
            .tables
            .lock()
            .reservations
            .values()
            .find(|r| r.booking_reference == booking_reference)
            .map(|r| r.id);

        match id {
            Some(id) => self.lock_reservation(id).await,
            None => Ok(None),
        }
    }

    async fn lock_expired_pending(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> BookingResult<Vec<Reservation>> {
        let mut candidates: Vec<(DateTime<Utc>, i64)> = self
            .shared
            .tables
            .lock()
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::PendingPayment && r.created_at <= cutoff)
            .map(|r| (r.created_at, r.id))
            .collect();
        candidates.sort();

        let mut locked = Vec::new();
        for (_, id) in candidates {
            if locked.len() as i64 >= limit {
                break;
            }
            // SKIP LOCKED: чужие заблокированные строки пропускаем
            let Some(guard) = self.shared.reservation_locks.try_lock(id) else {
                continue;
            };
            self.reservation_guards.insert(id, guard);
            match self.read_reservation(id) {
                Some(r) if r.status == ReservationStatus::PendingPayment => locked.push(r),
                _ => {
                    self.reservation_guards.remove(&id);
                }
            }
        }
        Ok(locked)
    }

    async fn lock_linked_seats(&mut self, reservation_ids: &[i64]) -> BookingResult<Vec<SeatRecord>> {
        let wanted: HashSet<i64> = reservation_ids.iter().copied().collect();
        let candidates: Vec<i64> = {
            let tables = self.shared.tables.lock();
            tables
                .seats
                .values()
                .chain(self.seats.values())
                .filter(|s| s.reservation_id.is_some_and(|r| wanted.contains(&r)))
                .map(|s| s.id)
                .collect()
        };

        self.acquire_seats(&candidates).await;

        // Перепроверяем после блокировки: ссылка могла смениться
        let mut seats: Vec<SeatRecord> = candidates
            .into_iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter_map(|id| self.read_seat(id))
            .filter(|s| s.reservation_id.is_some_and(|r| wanted.contains(&r)))
            .collect();
        seats.sort_by_key(|s| s.id);
        Ok(seats)
    }

    async fn set_reservation_status(
        &mut self,
        reservation_id: i64,
        status: ReservationStatus,
        now: DateTime<Utc>,
    ) -> BookingResult<()> {
        let is_own = self.reservations.contains_key(&reservation_id);
        if !is_own && !self.reservation_guards.contains_key(&reservation_id) {
            return Err(BookingError::Internal(format!(
                "reservation {} updated without holding its lock",
                reservation_id
            )));
        }
        let mut reservation = self
            .read_reservation(reservation_id)
            .ok_or_else(|| BookingError::ReservationNotFound(reservation_id.to_string()))?;
        reservation.status = status;
        reservation.updated_at = now;
        self.reservations.insert(reservation_id, reservation);
        Ok(())
    }

    async fn commit(mut self) -> BookingResult<()> {
        {
            let mut tables = self.shared.tables.lock();

            // Аналог CHECK (available_seats >= 0)
            for (showtime_id, delta) in &self.availability {
                let current = tables
                    .showtimes
                    .get(showtime_id)
                    .map(|s| s.available_seats)
                    .unwrap_or(0);
                if current + delta < 0 {
                    return Err(BookingError::Internal(format!(
                        "availability counter of showtime {} would drop below zero",
                        showtime_id
                    )));
                }
            }

            for (showtime_id, delta) in std::mem::take(&mut self.availability) {
                if let Some(showtime) = tables.showtimes.get_mut(&showtime_id) {
                    showtime.available_seats += delta;
                }
            }
            for (id, seat) in std::mem::take(&mut self.seats) {
                tables.seats.insert(id, seat);
            }
            for (id, reservation) in std::mem::take(&mut self.reservations) {
                tables.reservations.insert(id, reservation);
            }
            self.committed = true;
        }

        self.seat_guards.clear();
        self.reservation_guards.clear();
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_by_id(&self, customer_id: i64) -> BookingResult<Customer> {
        self.shared
            .tables
            .lock()
            .customers
            .get(&customer_id)
            .filter(|c| c.is_active)
            .cloned()
            .ok_or(BookingError::UserNotFound(customer_id))
    }
}

#[async_trait]
impl ShowtimeCatalog for MemoryStore {
    async fn find_by_id(&self, showtime_id: i64) -> BookingResult<Showtime> {
        self.shared
            .tables
            .lock()
            .showtimes
            .get(&showtime_id)
            .cloned()
            .ok_or(BookingError::ShowtimeNotFound(showtime_id))
    }
}

#[async_trait]
impl SeatTemplateSource for MemoryStore {
    async fn load_screen(&self, screen_id: i64) -> BookingResult<Vec<SeatTemplate>> {
        Ok(self
            .shared
            .tables
            .lock()
            .templates
            .get(&screen_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn screen_ids(&self) -> BookingResult<Vec<i64>> {
        Ok(self.shared.tables.lock().templates.keys().copied().collect())
    }
}
