use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashMap;

use super::{BookingStore, StoreTx};
use crate::error::{BookingError, BookingResult};
use crate::models::reservation::ReservationRow;
use crate::models::seat::SeatRow;
use crate::models::showtime::ShowtimeRow;
use crate::models::{
    NewReservation, Reservation, ReservationSeat, ReservationStatus, SeatRecord, SeatStatus,
    SeatTemplate, Showtime,
};

const SEAT_COLUMNS: &str = "id, showtime_id, seat_row, seat_number, seat_type, price, status, \
     held_at, held_by, reservation_id, retired";

const RESERVATION_COLUMNS: &str =
    "id, booking_reference, customer_id, showtime_id, status, total_price, created_at, updated_at";

#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_seats(rows: Vec<SeatRow>) -> BookingResult<Vec<SeatRecord>> {
    rows.into_iter().map(SeatRecord::try_from).collect()
}

// Подтягивает места броней одним запросом и собирает доменные объекты
async fn attach_seats<'e, E>(
    executor: E,
    rows: Vec<ReservationRow>,
) -> BookingResult<Vec<Reservation>>
where
    E: sqlx::PgExecutor<'e>,
{
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let links: Vec<(i64, i64, rust_decimal::Decimal)> = sqlx::query_as(
        "SELECT reservation_id, seat_id, price
         FROM reservation_seats
         WHERE reservation_id = ANY($1)
         ORDER BY reservation_id, position",
    )
    .bind(&ids)
    .fetch_all(executor)
    .await?;

    let mut by_reservation: HashMap<i64, Vec<ReservationSeat>> = HashMap::new();
    for (reservation_id, seat_id, price) in links {
        by_reservation
            .entry(reservation_id)
            .or_default()
            .push(ReservationSeat { seat_id, price });
    }

    rows.into_iter()
        .map(|row| {
            let seats = by_reservation.remove(&row.id).unwrap_or_default();
            row.into_reservation(seats)
        })
        .collect()
}

#[async_trait]
impl BookingStore for PgBookingStore {
    type Tx = PgStoreTx;

    async fn begin(&self) -> BookingResult<PgStoreTx> {
        let tx = self.pool.begin().await?;
        Ok(PgStoreTx { tx })
    }

    async fn find_showtime(&self, showtime_id: i64) -> BookingResult<Option<Showtime>> {
        let row = sqlx::query_as::<_, ShowtimeRow>(
            "SELECT id, screen_id, movie_title, start_time, status, available_seats
             FROM showtimes WHERE id = $1",
        )
        .bind(showtime_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Showtime::try_from).transpose()
    }

    async fn find_reservation(&self, reservation_id: i64) -> BookingResult<Option<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM reservations WHERE id = $1",
            RESERVATION_COLUMNS
        ))
        .bind(reservation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(attach_seats(&self.pool, rows).await?.pop())
    }

    async fn find_reservation_by_reference(
        &self,
        booking_reference: &str,
    ) -> BookingResult<Option<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM reservations WHERE booking_reference = $1",
            RESERVATION_COLUMNS
        ))
        .bind(booking_reference)
        .fetch_all(&self.pool)
        .await?;

        Ok(attach_seats(&self.pool, rows).await?.pop())
    }

    async fn seats_for_showtime(&self, showtime_id: i64) -> BookingResult<Vec<SeatRecord>> {
        let rows = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {} FROM seats
             WHERE showtime_id = $1 AND NOT retired
             ORDER BY seat_row, seat_number",
            SEAT_COLUMNS
        ))
        .bind(showtime_id)
        .fetch_all(&self.pool)
        .await?;

        into_seats(rows)
    }

    async fn seed_showtime_seats(
        &self,
        showtime_id: i64,
        templates: &[SeatTemplate],
    ) -> BookingResult<usize> {
        let mut tx = self.pool.begin().await?;

        // Блокируем сеанс, чтобы два параллельных посева не задвоили места
        let exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM showtimes WHERE id = $1 FOR UPDATE")
                .bind(showtime_id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(BookingError::ShowtimeNotFound(showtime_id));
        }

        let already: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM seats WHERE showtime_id = $1")
            .bind(showtime_id)
            .fetch_one(&mut *tx)
            .await?;
        if already > 0 || templates.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO seats (showtime_id, seat_row, seat_number, seat_type, price, status) ",
        );
        builder.push_values(templates, |mut b, t| {
            b.push_bind(showtime_id)
                .push_bind(&t.seat_row)
                .push_bind(t.seat_number)
                .push_bind(&t.seat_type)
                .push_bind(t.base_price)
                .push_bind(SeatStatus::Available.as_str());
        });
        let inserted = builder.build().execute(&mut *tx).await?.rows_affected();

        sqlx::query("UPDATE showtimes SET available_seats = $2 WHERE id = $1")
            .bind(showtime_id)
            .bind(inserted as i32)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(inserted as usize)
    }
}

pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn lock_seats(&mut self, seat_ids: &[i64]) -> BookingResult<Vec<SeatRecord>> {
        let rows = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {} FROM seats WHERE id = ANY($1) ORDER BY id FOR UPDATE",
            SEAT_COLUMNS
        ))
        .bind(seat_ids)
        .fetch_all(&mut *self.tx)
        .await?;

        into_seats(rows)
    }

    async fn save_seats(&mut self, seats: &[SeatRecord]) -> BookingResult<()> {
        for seat in seats {
            sqlx::query(
                "UPDATE seats
                 SET status = $2, held_at = $3, held_by = $4, reservation_id = $5, updated_at = NOW()
                 WHERE id = $1",
            )
            .bind(seat.id)
            .bind(seat.status.as_str())
            .bind(seat.held_at)
            .bind(seat.held_by)
            .bind(seat.reservation_id)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn adjust_availability(&mut self, showtime_id: i64, delta: i32) -> BookingResult<()> {
        let updated = sqlx::query(
            "UPDATE showtimes SET available_seats = available_seats + $2 WHERE id = $1",
        )
        .bind(showtime_id)
        .bind(delta)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(BookingError::ShowtimeNotFound(showtime_id));
        }
        Ok(())
    }

    async fn insert_reservation(
        &mut self,
        reservation: &NewReservation,
    ) -> BookingResult<Option<Reservation>> {
        // ON CONFLICT не обрывает транзакцию, в отличие от нарушения UNIQUE
        let id: Option<i64> = sqlx::query_scalar(
            "INSERT INTO reservations
                 (booking_reference, customer_id, showtime_id, status, total_price, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6)
             ON CONFLICT (booking_reference) DO NOTHING
             RETURNING id",
        )
        .bind(&reservation.booking_reference)
        .bind(reservation.customer_id)
        .bind(reservation.showtime_id)
        .bind(ReservationStatus::PendingPayment.as_str())
        .bind(reservation.total_price)
        .bind(reservation.created_at)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(id) = id else {
            return Ok(None);
        };

        for (position, seat) in reservation.seats.iter().enumerate() {
            sqlx::query(
                "INSERT INTO reservation_seats (reservation_id, seat_id, price, position)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(id)
            .bind(seat.seat_id)
            .bind(seat.price)
            .bind(position as i32)
            .execute(&mut *self.tx)
            .await?;
        }

        let seat_ids: Vec<i64> = reservation.seats.iter().map(|s| s.seat_id).collect();
        sqlx::query("UPDATE seats SET reservation_id = $1 WHERE id = ANY($2)")
            .bind(id)
            .bind(&seat_ids)
            .execute(&mut *self.tx)
            .await?;

        Ok(Some(reservation.clone().into_reservation(id)))
    }

    async fn lock_reservation(&mut self, reservation_id: i64) -> BookingResult<Option<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM reservations WHERE id = $1 FOR UPDATE",
            RESERVATION_COLUMNS
        ))
        .bind(reservation_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(attach_seats(&mut *self.tx, rows).await?.pop())
    }

    async fn lock_reservation_by_reference(
        &mut self,
        booking_reference: &str,
    ) -> BookingResult<Option<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM reservations WHERE booking_reference = $1 FOR UPDATE",
            RESERVATION_COLUMNS
        ))
        .bind(booking_reference)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(attach_seats(&mut *self.tx, rows).await?.pop())
    }

    async fn lock_expired_pending(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> BookingResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM reservations
             WHERE status = $1 AND created_at <= $2
             ORDER BY created_at
             LIMIT $3
             FOR UPDATE SKIP LOCKED",
            RESERVATION_COLUMNS
        ))
        .bind(ReservationStatus::PendingPayment.as_str())
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;

        attach_seats(&mut *self.tx, rows).await
    }

    async fn lock_linked_seats(&mut self, reservation_ids: &[i64]) -> BookingResult<Vec<SeatRecord>> {
        let rows = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {} FROM seats WHERE reservation_id = ANY($1) ORDER BY id FOR UPDATE",
            SEAT_COLUMNS
        ))
        .bind(reservation_ids)
        .fetch_all(&mut *self.tx)
        .await?;

        into_seats(rows)
    }

    async fn set_reservation_status(
        &mut self,
        reservation_id: i64,
        status: ReservationStatus,
        now: DateTime<Utc>,
    ) -> BookingResult<()> {
        sqlx::query("UPDATE reservations SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(reservation_id)
            .bind(status.as_str())
            .bind(now)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self) -> BookingResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
