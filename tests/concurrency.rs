mod common;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use showtime_booking::cache::MemorySeatHolds;
use showtime_booking::clock::SystemClock;
use showtime_booking::config::Config;
use showtime_booking::error::{BookingError, BookingResult};
use showtime_booking::models::{Caller, Cinema, Movie, SeatId, Showtime, Theater, Ticket};
use showtime_booking::services::reservation::ReserveRequest;
use showtime_booking::store::{BookingStore, CascadeReport, CommitOutcome, MemoryStore, ShowtimeQuery};
use showtime_booking::AppState;

use common::{labels, seeded_state};

fn request(showtime_id: Uuid, seats: &[&str]) -> ReserveRequest {
    ReserveRequest {
        showtime_id,
        seats: labels(seats),
        payment: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_buyers_one_seat_exactly_one_wins() {
    let (state, screen) = seeded_state(Config::default()).await;
    let showtime_id = screen.showtime.id;

    let handles: Vec<_> = (0..64)
        .map(|i| {
            let state = state.clone();
            tokio::spawn(async move {
                state
                    .reservations
                    .reserve(request(showtime_id, &["A1"]), &Caller::user(format!("user-{}", i)))
                    .await
            })
        })
        .collect();

    let mut wins = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(BookingError::SeatUnavailable(seats)) => assert_eq!(seats, vec![SeatId::new("A", 1)]),
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }
    assert_eq!(wins, 1);

    let showtime = state.store.showtime(showtime_id).await.unwrap().unwrap();
    let a1 = showtime
        .reserved_seats
        .iter()
        .filter(|r| r.seat == SeatId::new("A", 1))
        .count();
    assert_eq!(a1, 1);
    assert_eq!(state.store.tickets_for_showtime(showtime_id).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn overlapping_requests_never_double_sell() {
    let (state, screen) = seeded_state(Config::default()).await;
    let showtime_id = screen.showtime.id;

    // Each request wants two neighbouring seats; neighbours overlap.
    let handles: Vec<_> = (1..10u32)
        .map(|n| {
            let state = state.clone();
            tokio::spawn(async move {
                let seats = vec![format!("B{}", n), format!("B{}", n + 1)];
                state
                    .reservations
                    .reserve(
                        ReserveRequest {
                            showtime_id,
                            seats,
                            payment: None,
                        },
                        &Caller::user(format!("user-{}", n)),
                    )
                    .await
            })
        })
        .collect();

    let mut sold = 0;
    for handle in handles {
        if let Ok(ticket) = handle.await.unwrap() {
            sold += ticket.seats.len();
        }
    }

    let showtime = state.store.showtime(showtime_id).await.unwrap().unwrap();
    assert_eq!(showtime.reserved_seats.len(), sold);
    let mut seats: Vec<_> = showtime.reserved_seats.iter().map(|r| r.seat.clone()).collect();
    seats.sort();
    seats.dedup();
    assert_eq!(seats.len(), sold);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disjoint_requests_all_succeed() {
    let (state, screen) = seeded_state(Config::default()).await;
    let showtime_id = screen.showtime.id;

    let handles: Vec<_> = (1..=10u32)
        .map(|n| {
            let state = state.clone();
            tokio::spawn(async move {
                state
                    .reservations
                    .reserve(
                        ReserveRequest {
                            showtime_id,
                            seats: vec![format!("C{}", n)],
                            payment: None,
                        },
                        &Caller::user(format!("user-{}", n)),
                    )
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    let showtime = state.store.showtime(showtime_id).await.unwrap().unwrap();
    assert_eq!(showtime.reserved_seats.len(), 10);
}

/// Store whose first commits report a concurrent writer.
struct RacyStore {
    inner: MemoryStore,
    conflicts_left: AtomicU32,
}

#[async_trait]
impl BookingStore for RacyStore {
    async fn insert_cinema(&self, cinema: &Cinema) -> BookingResult<()> {
        self.inner.insert_cinema(cinema).await
    }
    async fn cinema(&self, id: Uuid) -> BookingResult<Option<Cinema>> {
        self.inner.cinema(id).await
    }
    async fn list_cinemas(&self) -> BookingResult<Vec<Cinema>> {
        self.inner.list_cinemas().await
    }
    async fn insert_theater(&self, theater: &Theater) -> BookingResult<()> {
        self.inner.insert_theater(theater).await
    }
    async fn theater(&self, id: Uuid) -> BookingResult<Option<Theater>> {
        self.inner.theater(id).await
    }
    async fn insert_movie(&self, movie: &Movie) -> BookingResult<()> {
        self.inner.insert_movie(movie).await
    }
    async fn movie(&self, id: Uuid) -> BookingResult<Option<Movie>> {
        self.inner.movie(id).await
    }
    async fn list_movies(&self) -> BookingResult<Vec<Movie>> {
        self.inner.list_movies().await
    }
    async fn update_movie(&self, movie: &Movie) -> BookingResult<bool> {
        self.inner.update_movie(movie).await
    }
    async fn insert_showtimes(&self, showtimes: &[Showtime]) -> BookingResult<()> {
        self.inner.insert_showtimes(showtimes).await
    }
    async fn showtime(&self, id: Uuid) -> BookingResult<Option<Showtime>> {
        self.inner.showtime(id).await
    }
    async fn list_showtimes(&self, query: &ShowtimeQuery) -> BookingResult<Vec<Showtime>> {
        self.inner.list_showtimes(query).await
    }
    async fn set_release(&self, id: Uuid, is_release: bool) -> BookingResult<Option<Showtime>> {
        self.inner.set_release(id, is_release).await
    }
    async fn commit_reservation(&self, ticket: &Ticket) -> BookingResult<CommitOutcome> {
        let left = self.conflicts_left.load(Ordering::SeqCst);
        if left > 0 {
            self.conflicts_left.store(left - 1, Ordering::SeqCst);
            return Err(BookingError::VersionConflict(ticket.showtime_id));
        }
        self.inner.commit_reservation(ticket).await
    }
    async fn tickets_for_user(&self, user_id: &str) -> BookingResult<Vec<Ticket>> {
        self.inner.tickets_for_user(user_id).await
    }
    async fn tickets_for_showtime(&self, showtime_id: Uuid) -> BookingResult<Vec<Ticket>> {
        self.inner.tickets_for_showtime(showtime_id).await
    }
    async fn delete_showtime(&self, id: Uuid) -> BookingResult<Option<CascadeReport>> {
        self.inner.delete_showtime(id).await
    }
    async fn delete_movie(&self, id: Uuid) -> BookingResult<Option<CascadeReport>> {
        self.inner.delete_movie(id).await
    }
    async fn delete_theater(&self, id: Uuid) -> BookingResult<Option<CascadeReport>> {
        self.inner.delete_theater(id).await
    }
    async fn delete_cinema(&self, id: Uuid) -> BookingResult<Option<CascadeReport>> {
        self.inner.delete_cinema(id).await
    }
}

async fn racy_state(conflicts: u32) -> (Arc<AppState>, Uuid) {
    let store = Arc::new(RacyStore {
        inner: MemoryStore::new(),
        conflicts_left: AtomicU32::new(conflicts),
    });
    let screen = common::seed(store.as_ref()).await;
    let state = AppState::with_backends(
        Config::default(),
        store,
        Arc::new(MemorySeatHolds::new()),
        Arc::new(SystemClock),
    );
    (state, screen.showtime.id)
}

#[tokio::test]
async fn transient_commit_conflicts_are_retried() {
    // default budget is three attempts
    let (state, showtime_id) = racy_state(2).await;
    let ticket = state
        .reservations
        .reserve(request(showtime_id, &["D1"]), &Caller::user("u1"))
        .await
        .unwrap();
    assert_eq!(ticket.seats, vec![SeatId::new("D", 1)]);
}

#[tokio::test]
async fn persistent_commit_conflicts_surface_as_unavailable() {
    let (state, showtime_id) = racy_state(3).await;
    let err = state
        .reservations
        .reserve(request(showtime_id, &["D1"]), &Caller::user("u1"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::SeatUnavailable(_)));

    let showtime = state.store.showtime(showtime_id).await.unwrap().unwrap();
    assert!(showtime.reserved_seats.is_empty());
}
