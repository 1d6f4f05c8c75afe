mod common;

use chrono::Duration;
use rust_decimal::Decimal;

use common::{Cinema, SEAT_PRICE, SHOWTIME};
use showtime_booking::error::ErrorKind;
use showtime_booking::models::{ReservationStatus, SeatStatus, ShowtimeStatus};

fn stored_status(cinema: &Cinema, reservation_id: i64) -> ReservationStatus {
    cinema
        .store
        .reservations()
        .into_iter()
        .find(|r| r.id == reservation_id)
        .map(|r| r.status)
        .unwrap()
}

#[tokio::test]
async fn create_snapshots_prices_at_hold_time() {
    let cinema = Cinema::new(5, 1).await;

    let created = cinema.lifecycle.create(1, SHOWTIME, &[2, 1]).await.unwrap();
    cinema.store.set_seat_price(1, Decimal::new(9900, 2));
    cinema.store.set_seat_price(2, Decimal::new(9900, 2));

    let found = cinema
        .lifecycle
        .find_by_booking_reference(&created.booking_reference)
        .await
        .unwrap();
    assert_eq!(found.status, ReservationStatus::PendingPayment);
    assert_eq!(found.total_price, Decimal::new(SEAT_PRICE * 2, 2));
    assert_eq!(found.seat_ids(), vec![2, 1]);
    assert!(found.seats.iter().all(|s| s.price == Decimal::new(SEAT_PRICE, 2)));
}

#[tokio::test]
async fn create_rejects_unbookable_showtimes() {
    let cinema = Cinema::new(5, 1).await;
    cinema.store.set_showtime_status(SHOWTIME, ShowtimeStatus::Cancelled);
    let err = cinema.lifecycle.create(1, SHOWTIME, &[1]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShowtimeNotBookable);

    let started = Cinema::starting_in(5, 1, Duration::minutes(-1)).await;
    let err = started.lifecycle.create(1, SHOWTIME, &[1]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShowtimeNotBookable);

    let err = cinema.lifecycle.create(1, 404, &[1]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShowtimeNotFound);
}

#[tokio::test]
async fn sold_out_showtime_is_not_bookable() {
    let cinema = Cinema::new(2, 2).await;
    cinema.lifecycle.create(1, SHOWTIME, &[1, 2]).await.unwrap();

    let err = cinema.lifecycle.create(2, SHOWTIME, &[1]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShowtimeNotBookable);
}

#[tokio::test]
async fn sweep_before_the_hold_window_leaves_reservation_alone() {
    let cinema = Cinema::new(5, 1).await;
    let created = cinema.lifecycle.create(1, SHOWTIME, &[1, 2]).await.unwrap();

    let just_before = cinema.start + Duration::minutes(5) - Duration::seconds(1);
    let expired = cinema.lifecycle.process_expired_holds_at(just_before).await.unwrap();

    assert!(expired.is_empty());
    assert_eq!(stored_status(&cinema, created.id), ReservationStatus::PendingPayment);
    assert_eq!(cinema.counter(), 3);
}

#[tokio::test]
async fn sweep_at_the_hold_window_expires_and_releases() {
    let cinema = Cinema::new(5, 1).await;
    let created = cinema.lifecycle.create(1, SHOWTIME, &[1, 2]).await.unwrap();

    let at_window = cinema.start + Duration::minutes(5);
    let expired = cinema.lifecycle.process_expired_holds_at(at_window).await.unwrap();

    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].status, ReservationStatus::Expired);
    assert_eq!(stored_status(&cinema, created.id), ReservationStatus::Expired);
    for seat_id in [1, 2] {
        let seat = cinema.store.seat(seat_id).unwrap();
        assert_eq!(seat.status, SeatStatus::Available);
        assert_eq!(seat.held_by, None);
        assert_eq!(seat.reservation_id, None);
    }
    assert_eq!(cinema.counter(), 5);

    // повторный проход ничего не находит
    let again = cinema
        .lifecycle
        .process_expired_holds_at(at_window + Duration::minutes(1))
        .await
        .unwrap();
    assert!(again.is_empty());
    assert_eq!(cinema.counter(), 5);
}

#[tokio::test]
async fn expired_hold_can_be_reclaimed_by_another_customer_before_the_sweep() {
    let cinema = Cinema::new(5, 2).await;
    let stale = cinema.lifecycle.create(1, SHOWTIME, &[1, 2]).await.unwrap();

    cinema.clock.advance(Duration::minutes(5) + Duration::seconds(1));
    let fresh = cinema.lifecycle.create(2, SHOWTIME, &[2, 3]).await.unwrap();

    assert_eq!(cinema.store.seat(2).unwrap().reservation_id, Some(fresh.id));
    assert_eq!(cinema.counter(), 2);

    // Sweeper закрывает старую бронь и освобождает только место 1
    let expired = cinema.lifecycle.process_expired_holds().await.unwrap();
    assert_eq!(expired.iter().map(|r| r.id).collect::<Vec<_>>(), vec![stale.id]);
    assert_eq!(cinema.store.seat(1).unwrap().status, SeatStatus::Available);
    assert_eq!(cinema.store.seat(2).unwrap().status, SeatStatus::Held);
    assert_eq!(cinema.store.seat(2).unwrap().held_by, Some(2));
    assert_eq!(cinema.counter(), 3);
    assert!(cinema.counter_matches_seats());
}

#[tokio::test]
async fn holder_can_rebook_own_expired_hold_with_a_fresh_window() {
    let cinema = Cinema::new(5, 2).await;
    cinema.lifecycle.create(1, SHOWTIME, &[1]).await.unwrap();

    cinema.clock.advance(Duration::minutes(6));
    let rebooked = cinema.lifecycle.create(1, SHOWTIME, &[1]).await.unwrap();
    assert_eq!(cinema.store.seat(1).unwrap().held_at, Some(cinema.start + Duration::minutes(6)));

    // другой покупатель не может забрать свежее удержание
    cinema.clock.advance(Duration::minutes(4));
    let err = cinema.lifecycle.create(2, SHOWTIME, &[1]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SeatUnavailable);
    assert_eq!(cinema.store.seat(1).unwrap().reservation_id, Some(rebooked.id));
    assert!(cinema.counter_matches_seats());
}

#[tokio::test]
async fn fresh_hold_blocks_other_customers() {
    let cinema = Cinema::new(5, 2).await;
    cinema.lifecycle.create(1, SHOWTIME, &[1]).await.unwrap();

    cinema.clock.advance(Duration::minutes(5));
    let err = cinema.lifecycle.create(2, SHOWTIME, &[1, 2]).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SeatUnavailable);
    assert_eq!(cinema.store.seat(2).unwrap().status, SeatStatus::Available);
}

#[tokio::test]
async fn confirm_reserves_seats_and_refund_releases_them() {
    let cinema = Cinema::new(5, 1).await;
    let created = cinema.lifecycle.create(1, SHOWTIME, &[1, 2]).await.unwrap();

    let confirmed = cinema.lifecycle.confirm_payment(created.id).await.unwrap();
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    let seat = cinema.store.seat(1).unwrap();
    assert_eq!(seat.status, SeatStatus::Reserved);
    assert_eq!(seat.held_at, None);
    assert_eq!(cinema.counter(), 3);

    // подтверждённая бронь не истекает
    let expired = cinema
        .lifecycle
        .process_expired_holds_at(cinema.start + Duration::hours(1))
        .await
        .unwrap();
    assert!(expired.is_empty());

    let refunded = cinema.lifecycle.refund(created.id).await.unwrap();
    assert_eq!(refunded.status, ReservationStatus::Refunded);
    assert_eq!(cinema.store.seat(1).unwrap().status, SeatStatus::Available);
    assert_eq!(cinema.counter(), 5);

    let err = cinema.lifecycle.refund(created.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidCancellation);
}

#[tokio::test]
async fn late_payment_after_seats_were_taken_is_rejected() {
    let cinema = Cinema::new(5, 2).await;
    let stale = cinema.lifecycle.create(1, SHOWTIME, &[1]).await.unwrap();

    cinema.clock.advance(Duration::minutes(6));
    cinema.lifecycle.create(2, SHOWTIME, &[1]).await.unwrap();

    let err = cinema.lifecycle.confirm_payment(stale.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SeatUnavailable);
    assert_eq!(stored_status(&cinema, stale.id), ReservationStatus::PendingPayment);
}

#[tokio::test]
async fn confirm_twice_is_invalid() {
    let cinema = Cinema::new(5, 1).await;
    let created = cinema.lifecycle.create(1, SHOWTIME, &[1]).await.unwrap();
    cinema.lifecycle.confirm_payment(created.id).await.unwrap();

    let err = cinema.lifecycle.confirm_payment(created.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidReservation);
}

#[tokio::test]
async fn cancel_inside_the_window_succeeds_and_releases_seats() {
    let cinema = Cinema::new(5, 1).await;
    let created = cinema.lifecycle.create(1, SHOWTIME, &[1, 2, 3]).await.unwrap();
    cinema.lifecycle.confirm_payment(created.id).await.unwrap();

    // сеанс через сутки, до дедлайна ещё 22 часа
    let cancelled = cinema
        .lifecycle
        .cancel(&created.booking_reference, 1)
        .await
        .unwrap();

    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(cinema.counter(), 5);
    assert!(cinema.counter_matches_seats());
}

#[tokio::test]
async fn cancel_at_or_after_the_deadline_fails() {
    let cinema = Cinema::starting_in(5, 1, Duration::hours(3)).await;
    let created = cinema.lifecycle.create(1, SHOWTIME, &[1]).await.unwrap();
    cinema.lifecycle.confirm_payment(created.id).await.unwrap();

    cinema.clock.advance(Duration::hours(1));
    let err = cinema
        .lifecycle
        .cancel(&created.booking_reference, 1)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidCancellation);
    assert_eq!(stored_status(&cinema, created.id), ReservationStatus::Confirmed);
    assert_eq!(cinema.store.seat(1).unwrap().status, SeatStatus::Reserved);
}

#[tokio::test]
async fn cancel_just_before_the_deadline_succeeds() {
    let cinema = Cinema::starting_in(5, 1, Duration::hours(3)).await;
    let created = cinema.lifecycle.create(1, SHOWTIME, &[1]).await.unwrap();
    cinema.lifecycle.confirm_payment(created.id).await.unwrap();

    cinema.clock.advance(Duration::hours(1) - Duration::seconds(1));
    let cancelled = cinema.lifecycle.cancel(&created.booking_reference, 1).await;
    assert!(cancelled.is_ok());
}

#[tokio::test]
async fn cancelling_a_pending_reservation_always_fails() {
    let cinema = Cinema::new(5, 1).await;
    let created = cinema.lifecycle.create(1, SHOWTIME, &[1]).await.unwrap();

    let err = cinema
        .lifecycle
        .cancel(&created.booking_reference, 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidCancellation);

    let err = cinema.lifecycle.cancel_by_admin(created.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidCancellation);
    assert_eq!(cinema.store.seat(1).unwrap().status, SeatStatus::Held);
}

#[tokio::test]
async fn cancel_by_someone_else_is_unauthorized() {
    let cinema = Cinema::new(5, 2).await;
    let created = cinema.lifecycle.create(1, SHOWTIME, &[1]).await.unwrap();
    cinema.lifecycle.confirm_payment(created.id).await.unwrap();

    let err = cinema
        .lifecycle
        .cancel(&created.booking_reference, 2)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnauthorizedAccess);

    let err = cinema.lifecycle.cancel("NOPE0000", 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReservationNotFound);
}

#[tokio::test]
async fn admin_cancel_ignores_owner_and_window() {
    let cinema = Cinema::starting_in(5, 1, Duration::hours(1)).await;
    let created = cinema.lifecycle.create(1, SHOWTIME, &[1, 2]).await.unwrap();
    cinema.lifecycle.confirm_payment(created.id).await.unwrap();

    let cancelled = cinema.lifecycle.cancel_by_admin(created.id).await.unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(cinema.counter(), 5);

    // из терминального состояния выхода нет
    let err = cinema.lifecycle.cancel_by_admin(created.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidCancellation);
    let err = cinema.lifecycle.confirm_payment(created.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidReservation);
}
