//! Persistence seam for the booking core.
//!
//! [`BookingStore::commit_reservation`] is the only write that touches a
//! showtime's reserved seats. Every implementation must perform its
//! availability check and its insert as one atomic step.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::BookingResult;
use crate::models::{Cinema, Movie, SeatId, Showtime, Theater, Ticket};

pub use memory::MemoryStore;
pub use postgres::PgBookingStore;

#[derive(Debug, Clone, Default)]
pub struct ShowtimeQuery {
    pub movie_id: Option<Uuid>,
    pub theater_id: Option<Uuid>,
    /// Inclusive lower bound on `start_time`.
    pub starts_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `start_time`.
    pub starts_before: Option<DateTime<Utc>>,
    pub released_only: bool,
}

impl ShowtimeQuery {
    pub fn matches(&self, showtime: &Showtime) -> bool {
        self.movie_id.map_or(true, |id| id == showtime.movie_id)
            && self.theater_id.map_or(true, |id| id == showtime.theater_id)
            && self.starts_from.map_or(true, |from| showtime.start_time >= from)
            && self.starts_before.map_or(true, |until| showtime.start_time < until)
            && (!self.released_only || showtime.is_release)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// Nothing was written; these seats were already reserved.
    Conflict(Vec<SeatId>),
}

/// What a cascading delete removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub cinemas: u64,
    pub theaters: u64,
    pub movies: u64,
    pub showtimes: u64,
    pub tickets: u64,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert_cinema(&self, cinema: &Cinema) -> BookingResult<()>;
    async fn cinema(&self, id: Uuid) -> BookingResult<Option<Cinema>>;
    /// All cinemas ordered by name.
    async fn list_cinemas(&self) -> BookingResult<Vec<Cinema>>;

    async fn insert_theater(&self, theater: &Theater) -> BookingResult<()>;
    async fn theater(&self, id: Uuid) -> BookingResult<Option<Theater>>;

    async fn insert_movie(&self, movie: &Movie) -> BookingResult<()>;
    async fn movie(&self, id: Uuid) -> BookingResult<Option<Movie>>;
    /// All movies ordered by name.
    async fn list_movies(&self) -> BookingResult<Vec<Movie>>;
    /// Overwrites name and length. `false` when the movie does not exist.
    async fn update_movie(&self, movie: &Movie) -> BookingResult<bool>;

    /// Stores a batch of showtimes, all or none.
    async fn insert_showtimes(&self, showtimes: &[Showtime]) -> BookingResult<()>;
    async fn showtime(&self, id: Uuid) -> BookingResult<Option<Showtime>>;
    /// Matching showtimes ordered by start time.
    async fn list_showtimes(&self, query: &ShowtimeQuery) -> BookingResult<Vec<Showtime>>;
    async fn set_release(&self, id: Uuid, is_release: bool) -> BookingResult<Option<Showtime>>;

    /// Adds the ticket's seats to its showtime only if none of them is reserved yet,
    /// and stores the ticket in the same step.
    ///
    /// Returns `ShowtimeNotFound` if the showtime is gone and `VersionConflict`
    /// when a concurrent writer got in between and the caller should retry.
    async fn commit_reservation(&self, ticket: &Ticket) -> BookingResult<CommitOutcome>;

    async fn tickets_for_user(&self, user_id: &str) -> BookingResult<Vec<Ticket>>;
    async fn tickets_for_showtime(&self, showtime_id: Uuid) -> BookingResult<Vec<Ticket>>;

    // Cascading deletes. `None` when the root record does not exist; otherwise
    // everything under it is gone, or nothing is.
    async fn delete_showtime(&self, id: Uuid) -> BookingResult<Option<CascadeReport>>;
    async fn delete_movie(&self, id: Uuid) -> BookingResult<Option<CascadeReport>>;
    async fn delete_theater(&self, id: Uuid) -> BookingResult<Option<CascadeReport>>;
    async fn delete_cinema(&self, id: Uuid) -> BookingResult<Option<CascadeReport>>;
}
