pub mod booking_reference;
pub mod notifier;
pub mod reservation;
pub mod scheduling;
pub mod seat_lock;
pub mod sweeper;

pub use booking_reference::{BookingReferenceGenerator, ReferenceGenerator};
pub use notifier::{BookingEvent, LogNotifier, Notifier};
pub use reservation::ReservationLifecycle;
pub use scheduling::ShowtimeSeeder;
pub use seat_lock::{LockedSeats, SeatLockGateway};
pub use sweeper::HoldExpirySweeper;
