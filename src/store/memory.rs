use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{BookingStore, CascadeReport, CommitOutcome, ShowtimeQuery};
use crate::error::{BookingError, BookingResult};
use crate::models::{Cinema, Movie, ReservedSeat, Showtime, Theater, Ticket};

#[derive(Default)]
struct Tables {
    cinemas: HashMap<Uuid, Cinema>,
    theaters: HashMap<Uuid, Theater>,
    movies: HashMap<Uuid, Movie>,
    showtimes: HashMap<Uuid, Showtime>,
    tickets: HashMap<Uuid, Ticket>,
}

impl Tables {
    /// Removes the given showtimes and their tickets. Callers hold the write lock,
    /// so the whole cascade is applied at once.
    fn remove_showtimes(&mut self, ids: &HashSet<Uuid>, report: &mut CascadeReport) {
        for id in ids {
            if self.showtimes.remove(id).is_some() {
                report.showtimes += 1;
            }
        }
        let before = self.tickets.len();
        self.tickets.retain(|_, t| !ids.contains(&t.showtime_id));
        report.tickets += (before - self.tickets.len()) as u64;
    }

    fn showtimes_where(&self, pred: impl Fn(&Showtime) -> bool) -> HashSet<Uuid> {
        self.showtimes
            .values()
            .filter(|s| pred(s))
            .map(|s| s.id)
            .collect()
    }
}

/// Process-local store. Used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_cinema(&self, cinema: &Cinema) -> BookingResult<()> {
        self.tables.write().await.cinemas.insert(cinema.id, cinema.clone());
        Ok(())
    }

    async fn cinema(&self, id: Uuid) -> BookingResult<Option<Cinema>> {
        Ok(self.tables.read().await.cinemas.get(&id).cloned())
    }

    async fn list_cinemas(&self) -> BookingResult<Vec<Cinema>> {
        let mut cinemas: Vec<Cinema> = self.tables.read().await.cinemas.values().cloned().collect();
        cinemas.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(cinemas)
    }

    async fn insert_theater(&self, theater: &Theater) -> BookingResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.cinemas.contains_key(&theater.cinema_id) {
            return Err(BookingError::CinemaNotFound(theater.cinema_id));
        }
        tables.theaters.insert(theater.id, theater.clone());
        Ok(())
    }

    async fn theater(&self, id: Uuid) -> BookingResult<Option<Theater>> {
        Ok(self.tables.read().await.theaters.get(&id).cloned())
    }

    async fn insert_movie(&self, movie: &Movie) -> BookingResult<()> {
        self.tables.write().await.movies.insert(movie.id, movie.clone());
        Ok(())
    }

    async fn movie(&self, id: Uuid) -> BookingResult<Option<Movie>> {
        Ok(self.tables.read().await.movies.get(&id).cloned())
    }

    async fn list_movies(&self) -> BookingResult<Vec<Movie>> {
        let mut movies: Vec<Movie> = self.tables.read().await.movies.values().cloned().collect();
        movies.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(movies)
    }

    async fn update_movie(&self, movie: &Movie) -> BookingResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.movies.get_mut(&movie.id) {
            Some(stored) => {
                *stored = movie.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_showtimes(&self, showtimes: &[Showtime]) -> BookingResult<()> {
        let mut tables = self.tables.write().await;
        // Check references for the whole batch before inserting any of it
        for showtime in showtimes {
            if !tables.movies.contains_key(&showtime.movie_id) {
                return Err(BookingError::MovieNotFound(showtime.movie_id));
            }
            if !tables.theaters.contains_key(&showtime.theater_id) {
                return Err(BookingError::TheaterNotFound(showtime.theater_id));
            }
        }
        for showtime in showtimes {
            tables.showtimes.insert(showtime.id, showtime.clone());
        }
        Ok(())
    }

    async fn showtime(&self, id: Uuid) -> BookingResult<Option<Showtime>> {
        Ok(self.tables.read().await.showtimes.get(&id).cloned())
    }

    async fn list_showtimes(&self, query: &ShowtimeQuery) -> BookingResult<Vec<Showtime>> {
        let tables = self.tables.read().await;
        let mut found: Vec<Showtime> = tables
            .showtimes
            .values()
            .filter(|s| query.matches(s))
            .cloned()
            .collect();
        found.sort_by_key(|s| (s.start_time, s.id));
        Ok(found)
    }

    async fn set_release(&self, id: Uuid, is_release: bool) -> BookingResult<Option<Showtime>> {
        let mut tables = self.tables.write().await;
        Ok(tables.showtimes.get_mut(&id).map(|showtime| {
            showtime.is_release = is_release;
            showtime.clone()
        }))
    }

    async fn commit_reservation(&self, ticket: &Ticket) -> BookingResult<CommitOutcome> {
        let mut tables = self.tables.write().await;
        let showtime = tables
            .showtimes
            .get_mut(&ticket.showtime_id)
            .ok_or(BookingError::ShowtimeNotFound(ticket.showtime_id))?;

        let taken: Vec<_> = showtime
            .conflicts(&ticket.seats)
            .into_iter()
            .cloned()
            .collect();
        if !taken.is_empty() {
            debug!(showtime_id = %ticket.showtime_id, conflicts = taken.len(), "in-memory commit refused");
            return Ok(CommitOutcome::Conflict(taken));
        }

        showtime
            .reserved_seats
            .extend(ticket.seats.iter().map(|seat| ReservedSeat {
                seat: seat.clone(),
                user_id: ticket.user_id.clone(),
            }));
        tables.tickets.insert(ticket.id, ticket.clone());
        Ok(CommitOutcome::Committed)
    }

    async fn tickets_for_user(&self, user_id: &str) -> BookingResult<Vec<Ticket>> {
        let tables = self.tables.read().await;
        let mut tickets: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tickets)
    }

    async fn tickets_for_showtime(&self, showtime_id: Uuid) -> BookingResult<Vec<Ticket>> {
        let tables = self.tables.read().await;
        let mut tickets: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| t.showtime_id == showtime_id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.created_at);
        Ok(tickets)
    }

    async fn delete_showtime(&self, id: Uuid) -> BookingResult<Option<CascadeReport>> {
        let mut tables = self.tables.write().await;
        if !tables.showtimes.contains_key(&id) {
            return Ok(None);
        }
        let mut report = CascadeReport::default();
        tables.remove_showtimes(&HashSet::from([id]), &mut report);
        Ok(Some(report))
    }

    async fn delete_movie(&self, id: Uuid) -> BookingResult<Option<CascadeReport>> {
        let mut tables = self.tables.write().await;
        if tables.movies.remove(&id).is_none() {
            return Ok(None);
        }
        let mut report = CascadeReport {
            movies: 1,
            ..Default::default()
        };
        let doomed = tables.showtimes_where(|s| s.movie_id == id);
        tables.remove_showtimes(&doomed, &mut report);
        Ok(Some(report))
    }

    async fn delete_theater(&self, id: Uuid) -> BookingResult<Option<CascadeReport>> {
        let mut tables = self.tables.write().await;
        if tables.theaters.remove(&id).is_none() {
            return Ok(None);
        }
        let mut report = CascadeReport {
            theaters: 1,
            ..Default::default()
        };
        let doomed = tables.showtimes_where(|s| s.theater_id == id);
        tables.remove_showtimes(&doomed, &mut report);
        Ok(Some(report))
    }

    async fn delete_cinema(&self, id: Uuid) -> BookingResult<Option<CascadeReport>> {
        let mut tables = self.tables.write().await;
        if tables.cinemas.remove(&id).is_none() {
            return Ok(None);
        }
        let theater_ids: HashSet<Uuid> = tables
            .theaters
            .values()
            .filter(|t| t.cinema_id == id)
            .map(|t| t.id)
            .collect();
        tables.theaters.retain(|tid, _| !theater_ids.contains(tid));

        let mut report = CascadeReport {
            cinemas: 1,
            theaters: theater_ids.len() as u64,
            ..Default::default()
        };
        let doomed = tables.showtimes_where(|s| theater_ids.contains(&s.theater_id));
        tables.remove_showtimes(&doomed, &mut report);
        Ok(Some(report))
    }
}
