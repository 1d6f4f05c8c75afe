//! Хранилище мест и броней.
//!
//! [`StoreTx`]: одна транзакция реляционного хранилища. Блокировки строк,
//! взятые через `lock_*`, держатся до `commit` или до drop транзакции
//! (drop без `commit` = откат). Это единственный примитив сериализации:
//! статус места читается только после того, как его строка заблокирована.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BookingResult;
use crate::models::{
    NewReservation, Reservation, ReservationStatus, SeatRecord, SeatTemplate, Showtime,
};

pub use memory::MemoryStore;
pub use postgres::PgBookingStore;

#[async_trait]
pub trait BookingStore: Send + Sync + 'static {
    type Tx: StoreTx + 'static;

    async fn begin(&self) -> BookingResult<Self::Tx>;

    async fn find_showtime(&self, showtime_id: i64) -> BookingResult<Option<Showtime>>;

    async fn find_reservation(&self, reservation_id: i64) -> BookingResult<Option<Reservation>>;

    async fn find_reservation_by_reference(
        &self,
        booking_reference: &str,
    ) -> BookingResult<Option<Reservation>>;

    /// Все действующие (не списанные) места сеанса, по рядам и номерам.
    async fn seats_for_showtime(&self, showtime_id: i64) -> BookingResult<Vec<SeatRecord>>;

    /// Создаёт места сеанса по шаблонам и выставляет счётчик свободных мест.
    /// Если у сеанса уже есть места, ничего не делает и возвращает 0.
    async fn seed_showtime_seats(
        &self,
        showtime_id: i64,
        templates: &[SeatTemplate],
    ) -> BookingResult<usize>;
}

#[async_trait]
pub trait StoreTx: Send {
    /// Эксклюзивно блокирует строки мест в порядке возрастания id и
    /// возвращает найденные. Отсутствующие id просто не попадают в результат.
    async fn lock_seats(&mut self, seat_ids: &[i64]) -> BookingResult<Vec<SeatRecord>>;

    async fn save_seats(&mut self, seats: &[SeatRecord]) -> BookingResult<()>;

    async fn adjust_availability(&mut self, showtime_id: i64, delta: i32) -> BookingResult<()>;

    /// `None`, если код брони уже занят. Транзакция при этом остаётся рабочей.
    async fn insert_reservation(
        &mut self,
        reservation: &NewReservation,
    ) -> BookingResult<Option<Reservation>>;

    async fn lock_reservation(&mut self, reservation_id: i64) -> BookingResult<Option<Reservation>>;

    async fn lock_reservation_by_reference(
        &mut self,
        booking_reference: &str,
    ) -> BookingResult<Option<Reservation>>;

    /// PENDING_PAYMENT брони с `created_at <= cutoff`. Строки, заблокированные
    /// другими транзакциями, пропускаются.
    async fn lock_expired_pending(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> BookingResult<Vec<Reservation>>;

    /// Места, у которых обратная ссылка указывает на одну из броней.
    async fn lock_linked_seats(&mut self, reservation_ids: &[i64]) -> BookingResult<Vec<SeatRecord>>;

    async fn set_reservation_status(
        &mut self,
        reservation_id: i64,
        status: ReservationStatus,
        now: DateTime<Utc>,
    ) -> BookingResult<()>;

    async fn commit(self) -> BookingResult<()>;
}
