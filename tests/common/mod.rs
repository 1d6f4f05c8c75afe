#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;

use showtime_booking::clock::ManualClock;
use showtime_booking::config::BookingPolicy;
use showtime_booking::models::{Customer, SeatTemplate, Showtime, ShowtimeStatus};
use showtime_booking::services::{ReferenceGenerator, ReservationLifecycle};
use showtime_booking::store::{BookingStore, MemoryStore};

pub const SHOWTIME: i64 = 1;
pub const SEAT_PRICE: i64 = 1200;

pub struct Cinema {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub lifecycle: Arc<ReservationLifecycle<MemoryStore>>,
    pub start: DateTime<Utc>,
}

impl Cinema {
    /// Сеанс через сутки с `seats` местами по 12.00 и `customers` покупателями
    /// с id 1..=customers.
    pub async fn new(seats: i32, customers: i64) -> Self {
        Self::build(seats, customers, Duration::days(1), None).await
    }

    pub async fn with_references(seats: i32, references: Vec<&str>) -> Self {
        let scripted: Arc<dyn ReferenceGenerator> = Arc::new(ScriptedReferences::new(references));
        Self::build(seats, 2, Duration::days(1), Some(scripted)).await
    }

    pub async fn starting_in(seats: i32, customers: i64, starts_in: Duration) -> Self {
        Self::build(seats, customers, starts_in, None).await
    }

    async fn build(
        seats: i32,
        customers: i64,
        starts_in: Duration,
        references: Option<Arc<dyn ReferenceGenerator>>,
    ) -> Self {
        let store = MemoryStore::new();
        let start = Utc::now();

        for id in 1..=customers {
            store.add_customer(Customer {
                id,
                email: format!("customer{}@example.com", id),
                full_name: format!("Customer {}", id),
                is_active: true,
            });
        }
        store.add_showtime(Showtime {
            id: SHOWTIME,
            screen_id: 1,
            movie_title: "The Sacrifice".into(),
            start_time: start + starts_in,
            status: ShowtimeStatus::Scheduled,
            available_seats: 0,
        });
        let templates: Vec<SeatTemplate> = (1..=seats)
            .map(|n| SeatTemplate {
                screen_id: 1,
                seat_row: "A".into(),
                seat_number: n,
                seat_type: "STANDARD".into(),
                base_price: Decimal::new(SEAT_PRICE, 2),
            })
            .collect();
        store.seed_showtime_seats(SHOWTIME, &templates).await.unwrap();

        let clock = Arc::new(ManualClock::new(start));
        let shared = Arc::new(store.clone());
        let mut lifecycle = ReservationLifecycle::new(
            shared.clone(),
            shared.clone(),
            shared,
            BookingPolicy::default(),
        )
        .with_clock(clock.clone());
        if let Some(references) = references {
            lifecycle = lifecycle.with_reference_generator(references);
        }

        Cinema {
            store,
            clock,
            lifecycle: Arc::new(lifecycle),
            start,
        }
    }

    pub fn counter(&self) -> i32 {
        self.store.available_counter(SHOWTIME).unwrap()
    }

    pub fn counter_matches_seats(&self) -> bool {
        self.counter() == self.store.count_available(SHOWTIME)
    }
}

/// Выдаёт коды по списку, дальше повторяет последний.
pub struct ScriptedReferences {
    queue: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl ScriptedReferences {
    pub fn new(references: Vec<&str>) -> Self {
        Self {
            queue: Mutex::new(references.into_iter().map(String::from).collect()),
            last: Mutex::new("ZZZZ9999".to_string()),
        }
    }
}

impl ReferenceGenerator for ScriptedReferences {
    fn generate(&self) -> String {
        match self.queue.lock().pop_front() {
            Some(next) => {
                *self.last.lock() = next.clone();
                next
            }
            None => self.last.lock().clone(),
        }
    }
}
