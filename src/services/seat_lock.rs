//! Блокировка и проверка мест перед удержанием.
//!
//! Единственная точка синхронизации всей системы: статус места читается
//! только после того, как его строка заблокирована в текущей транзакции.
//! Конкурент за пересекающийся набор мест ждёт коммита или отката первой
//! транзакции и видит уже итоговое состояние.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::config::BookingPolicy;
use crate::error::{BookingError, BookingResult};
use crate::models::{SeatRecord, SeatStatus};
use crate::store::StoreTx;

/// Места, переведённые в HELD, в порядке запроса.
#[derive(Debug, Clone)]
pub struct LockedSeats {
    pub seats: Vec<SeatRecord>,
    /// Сколько из них было AVAILABLE до вызова (на столько уменьшен счётчик).
    pub newly_held: usize,
}

#[derive(Debug, Clone)]
pub struct SeatLockGateway {
    hold_window: Duration,
    max_seats: usize,
}

impl SeatLockGateway {
    pub fn new(policy: &BookingPolicy) -> Self {
        Self {
            hold_window: policy.hold_window(),
            max_seats: policy.max_seats_per_booking,
        }
    }

    pub async fn lock_and_validate<T: StoreTx>(
        &self,
        tx: &mut T,
        seat_ids: &[i64],
        showtime_id: i64,
        requester_id: i64,
        now: DateTime<Utc>,
    ) -> BookingResult<LockedSeats> {
        self.check_count(seat_ids)?;

        let locked = tx.lock_seats(seat_ids).await?;
        let mut by_id: HashMap<i64, SeatRecord> = locked.into_iter().map(|s| (s.id, s)).collect();

        let missing: Vec<i64> = seat_ids
            .iter()
            .copied()
            .filter(|id| by_id.get(id).map_or(true, |s| s.retired))
            .collect();
        if !missing.is_empty() {
            return Err(BookingError::SeatNotFound(format!("seats {:?} do not exist", missing)));
        }

        if let Some(foreign) = by_id.values().find(|s| s.showtime_id != showtime_id) {
            return Err(BookingError::InvalidReservation(format!(
                "seat {} belongs to showtime {}, not {}",
                foreign.id, foreign.showtime_id, showtime_id
            )));
        }

        let mut seats = Vec::with_capacity(seat_ids.len());
        let mut newly_held = 0;
        for id in seat_ids {
            let Some(mut seat) = by_id.remove(id) else {
                return Err(BookingError::SeatNotFound(format!("seat {} does not exist", id)));
            };
            if self.claimable(&seat, requester_id, now)? == SeatStatus::Available {
                newly_held += 1;
            }
            seat.hold(requester_id, now);
            seats.push(seat);
        }

        tx.save_seats(&seats).await?;
        if newly_held > 0 {
            tx.adjust_availability(showtime_id, -(newly_held as i32)).await?;
        }

        debug!(
            "Held {} seats for customer {} on showtime {} ({} newly taken)",
            seats.len(),
            requester_id,
            showtime_id,
            newly_held
        );
        Ok(LockedSeats { seats, newly_held })
    }

    fn check_count(&self, seat_ids: &[i64]) -> BookingResult<()> {
        if seat_ids.is_empty() || seat_ids.len() > self.max_seats {
            return Err(BookingError::InvalidReservation(format!(
                "a booking must contain between 1 and {} seats, got {}",
                self.max_seats,
                seat_ids.len()
            )));
        }
        let unique: HashSet<&i64> = seat_ids.iter().collect();
        if unique.len() != seat_ids.len() {
            return Err(BookingError::InvalidReservation(
                "the same seat is requested more than once".to_string(),
            ));
        }
        Ok(())
    }

    /// Проверка одного уже заблокированного места. Возвращает статус,
    /// из которого место будет переведено в HELD.
    fn claimable(
        &self,
        seat: &SeatRecord,
        requester_id: i64,
        now: DateTime<Utc>,
    ) -> BookingResult<SeatStatus> {
        match seat.status {
            SeatStatus::Available => Ok(SeatStatus::Available),
            SeatStatus::Reserved => Err(BookingError::SeatUnavailable(format!(
                "seat {} is already reserved",
                seat.id
            ))),
            SeatStatus::Held if seat.hold_expired(self.hold_window, now) => {
                debug!("Reclaiming expired hold on seat {}", seat.id);
                Ok(SeatStatus::Held)
            }
            SeatStatus::Held if seat.held_by == Some(requester_id) => Ok(SeatStatus::Held),
            SeatStatus::Held => Err(BookingError::SeatUnavailable(format!(
                "seat {} is held by another customer",
                seat.id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ShowtimeStatus, SeatTemplate, Showtime};
    use crate::store::{BookingStore, MemoryStore};
    use rust_decimal::Decimal;

    async fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_showtime(Showtime {
            id: 1,
            screen_id: 1,
            movie_title: "Mirror".into(),
            start_time: Utc::now() + Duration::days(1),
            status: ShowtimeStatus::Scheduled,
            available_seats: 0,
        });
        store.add_showtime(Showtime {
            id: 2,
            screen_id: 1,
            movie_title: "Mirror".into(),
            start_time: Utc::now() + Duration::days(2),
            status: ShowtimeStatus::Scheduled,
            available_seats: 0,
        });
        let templates: Vec<SeatTemplate> = (1..=12)
            .map(|n| SeatTemplate {
                screen_id: 1,
                seat_row: "A".into(),
                seat_number: n,
                seat_type: "STANDARD".into(),
                base_price: Decimal::new(850, 2),
            })
            .collect();
        // места 1..=12 у сеанса 1, 13..=24 у сеанса 2
        store.seed_showtime_seats(1, &templates).await.unwrap();
        store.seed_showtime_seats(2, &templates).await.unwrap();
        store
    }

    fn gateway() -> SeatLockGateway {
        SeatLockGateway::new(&BookingPolicy::default())
    }

    async fn hold(store: &MemoryStore, ids: &[i64], who: i64, at: DateTime<Utc>) -> BookingResult<LockedSeats> {
        let mut tx = store.begin().await?;
        let locked = gateway().lock_and_validate(&mut tx, ids, 1, who, at).await?;
        tx.commit().await?;
        Ok(locked)
    }

    #[tokio::test]
    async fn holds_available_seats_and_decrements_counter() {
        let store = store().await;
        let now = Utc::now();
        let locked = hold(&store, &[3, 1], 7, now).await.unwrap();

        assert_eq!(locked.newly_held, 2);
        assert_eq!(locked.seats.iter().map(|s| s.id).collect::<Vec<_>>(), vec![3, 1]);
        let seat = store.seat(1).unwrap();
        assert_eq!(seat.status, SeatStatus::Held);
        assert_eq!(seat.held_by, Some(7));
        assert_eq!(seat.held_at, Some(now));
        assert_eq!(store.available_counter(1), Some(10));
    }

    #[tokio::test]
    async fn rejects_bad_seat_counts() {
        let store = store().await;
        let now = Utc::now();
        let too_many: Vec<i64> = (1..=11).collect();

        for ids in [vec![], too_many, vec![1, 1]] {
            let err = hold(&store, &ids, 7, now).await.unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::InvalidReservation);
        }
    }

    #[tokio::test]
    async fn unknown_seat_is_not_found_and_foreign_seat_is_invalid() {
        let store = store().await;
        let now = Utc::now();

        let err = hold(&store, &[1, 999], 7, now).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::SeatNotFound);

        let err = hold(&store, &[1, 13], 7, now).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidReservation);
        assert_eq!(store.seat(1).unwrap().status, SeatStatus::Available);
    }

    #[tokio::test]
    async fn fresh_hold_of_another_customer_blocks() {
        let store = store().await;
        let now = Utc::now();
        hold(&store, &[2], 7, now).await.unwrap();

        let err = hold(&store, &[2], 8, now + Duration::minutes(4)).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::SeatUnavailable);
    }

    #[tokio::test]
    async fn own_fresh_hold_is_idempotent_and_costs_nothing() {
        let store = store().await;
        let now = Utc::now();
        hold(&store, &[2], 7, now).await.unwrap();

        let again = hold(&store, &[2, 4], 7, now + Duration::minutes(1)).await.unwrap();
        assert_eq!(again.newly_held, 1);
        assert_eq!(store.available_counter(1), Some(10));
        assert_eq!(store.seat(2).unwrap().held_at, Some(now + Duration::minutes(1)));
    }

    #[tokio::test]
    async fn expired_hold_is_reclaimable_by_anyone() {
        let store = store().await;
        let now = Utc::now();
        hold(&store, &[5], 7, now).await.unwrap();

        let later = now + Duration::minutes(5) + Duration::seconds(1);
        let taken = hold(&store, &[5], 8, later).await.unwrap();
        assert_eq!(taken.newly_held, 0);
        assert_eq!(store.seat(5).unwrap().held_by, Some(8));
        assert_eq!(store.available_counter(1), Some(11));
    }

    #[tokio::test]
    async fn hold_exactly_at_window_edge_still_blocks_others() {
        let store = store().await;
        let now = Utc::now();
        hold(&store, &[5], 7, now).await.unwrap();

        let err = hold(&store, &[5], 8, now + Duration::minutes(5)).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::SeatUnavailable);
    }

    #[tokio::test]
    async fn reserved_seat_is_unavailable_even_to_its_owner() {
        let store = store().await;
        let now = Utc::now();
        {
            let mut tx = store.begin().await.unwrap();
            let mut seats = tx.lock_seats(&[6]).await.unwrap();
            seats[0].hold(7, now);
            seats[0].reserve();
            tx.save_seats(&seats).await.unwrap();
            tx.adjust_availability(1, -1).await.unwrap();
            tx.commit().await.unwrap();
        }

        let err = hold(&store, &[6], 7, now).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::SeatUnavailable);
    }
}
