pub mod user;
pub mod showtime;
pub mod seat;
pub mod reservation;
pub mod template;

pub use user::Customer;
pub use showtime::{Showtime, ShowtimeStatus};
pub use seat::{SeatRecord, SeatStatus};
pub use reservation::{NewReservation, Reservation, ReservationSeat, ReservationStatus};
pub use template::SeatTemplate;
