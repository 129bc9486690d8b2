//! Cinemas, theaters, movies and their showtimes.
//!
//! Everything here except browsing is admin-only. Deletes cascade down the
//! ownership chain and are all-or-nothing in the store.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::SeatHolds;
use crate::clock::Clock;
use crate::error::{BookingError, BookingResult};
use crate::models::{Caller, Cinema, Movie, PricingPolicy, SeatMap, Showtime, Theater};
use crate::services::reservation::ShowtimeLocks;
use crate::services::scheduler::{self, Rounding};
use crate::store::{BookingStore, CascadeReport, ShowtimeQuery};

pub const DEFAULT_GAP: &str = "00:10";

#[derive(Debug, Clone, Deserialize)]
pub struct NewTheater {
    pub cinema_id: Uuid,
    pub number: i32,
    pub last_row: String,
    pub columns: u32,
    pub pricing: Option<PricingPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewShowtimes {
    pub movie_id: Uuid,
    pub theater_id: Uuid,
    /// First screening, with the offset of the cinema's local time.
    pub start_time: DateTime<FixedOffset>,
    #[serde(default = "one_day")]
    pub repeat_days: u32,
    #[serde(default)]
    pub is_release: bool,
}

fn one_day() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShowtimeFilter {
    pub movie_id: Option<Uuid>,
    pub theater_id: Option<Uuid>,
    /// Calendar day in the service's local offset.
    pub date: Option<NaiveDate>,
}

/// A movie with upcoming screenings and how many there are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShowingMovie {
    #[serde(flatten)]
    pub movie: Movie,
    pub upcoming_showtimes: usize,
}

pub struct CatalogService {
    store: Arc<dyn BookingStore>,
    holds: Arc<dyn SeatHolds>,
    locks: Arc<ShowtimeLocks>,
    clock: Arc<dyn Clock>,
    local_offset: FixedOffset,
}

impl CatalogService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        holds: Arc<dyn SeatHolds>,
        locks: Arc<ShowtimeLocks>,
        clock: Arc<dyn Clock>,
        utc_offset_minutes: i32,
    ) -> Self {
        let local_offset = FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| {
            warn!(utc_offset_minutes, "UTC offset out of range, using UTC");
            Utc.fix()
        });
        Self {
            store,
            holds,
            locks,
            clock,
            local_offset,
        }
    }

    pub async fn create_cinema(&self, name: &str, caller: &Caller) -> BookingResult<Cinema> {
        caller.require_admin()?;
        let cinema = Cinema::new(name.trim());
        self.store.insert_cinema(&cinema).await?;
        info!(cinema_id = %cinema.id, name = %cinema.name, "cinema created");
        Ok(cinema)
    }

    pub async fn list_cinemas(&self) -> BookingResult<Vec<Cinema>> {
        self.store.list_cinemas().await
    }

    pub async fn theater(&self, id: Uuid) -> BookingResult<Theater> {
        self.store.theater(id).await?.ok_or(BookingError::TheaterNotFound(id))
    }

    pub async fn create_theater(&self, new: NewTheater, caller: &Caller) -> BookingResult<Theater> {
        caller.require_admin()?;
        let seat_map = SeatMap::new(new.last_row, new.columns)?;
        let pricing = match new.pricing {
            Some(policy) => {
                policy.validate()?;
                Some(policy.normalized())
            }
            None => None,
        };

        let theater = Theater::new(new.cinema_id, new.number, seat_map, pricing);
        self.store.insert_theater(&theater).await?;
        info!(
            theater_id = %theater.id,
            cinema_id = %theater.cinema_id,
            seats = theater.seat_map.total_seats(),
            "theater created"
        );
        Ok(theater)
    }

    pub async fn create_movie(&self, name: &str, length_minutes: i32, caller: &Caller) -> BookingResult<Movie> {
        caller.require_admin()?;
        if length_minutes <= 0 {
            return Err(BookingError::InvalidSchedule(format!(
                "movie length must be positive, got {} minutes",
                length_minutes
            )));
        }
        let movie = Movie::new(name.trim(), length_minutes);
        self.store.insert_movie(&movie).await?;
        info!(movie_id = %movie.id, name = %movie.name, "movie created");
        Ok(movie)
    }

    pub async fn list_movies(&self) -> BookingResult<Vec<Movie>> {
        self.store.list_movies().await
    }

    pub async fn movie(&self, id: Uuid) -> BookingResult<Movie> {
        self.store.movie(id).await?.ok_or(BookingError::MovieNotFound(id))
    }

    /// Renames a movie or changes its running time. Existing showtimes keep their
    /// start times.
    pub async fn update_movie(
        &self,
        id: Uuid,
        name: Option<&str>,
        length_minutes: Option<i32>,
        caller: &Caller,
    ) -> BookingResult<Movie> {
        caller.require_admin()?;
        let mut movie = self.movie(id).await?;
        if let Some(name) = name {
            movie.name = name.trim().to_string();
        }
        if let Some(length) = length_minutes {
            if length <= 0 {
                return Err(BookingError::InvalidSchedule(format!(
                    "movie length must be positive, got {} minutes",
                    length
                )));
            }
            movie.length_minutes = length;
        }

        if !self.store.update_movie(&movie).await? {
            return Err(BookingError::MovieNotFound(id));
        }
        info!(movie_id = %id, name = %movie.name, length_minutes = movie.length_minutes, "movie updated");
        Ok(movie)
    }

    /// Movies with screenings still ahead, most screenings first. Admins also
    /// count unreleased showtimes.
    pub async fn showing_movies(&self, caller: &Caller) -> BookingResult<Vec<ShowingMovie>> {
        let upcoming = self
            .store
            .list_showtimes(&ShowtimeQuery {
                starts_from: Some(self.clock.now()),
                released_only: !caller.is_admin(),
                ..Default::default()
            })
            .await?;

        let mut counts: HashMap<Uuid, usize> = HashMap::new();
        for showtime in &upcoming {
            *counts.entry(showtime.movie_id).or_default() += 1;
        }

        let mut showing: Vec<ShowingMovie> = self
            .store
            .list_movies()
            .await?
            .into_iter()
            .filter_map(|movie| {
                counts.get(&movie.id).map(|&upcoming_showtimes| ShowingMovie {
                    movie,
                    upcoming_showtimes,
                })
            })
            .collect();
        // list_movies is name-ordered and the sort is stable, so ties stay alphabetical
        showing.sort_by(|a, b| b.upcoming_showtimes.cmp(&a.upcoming_showtimes));
        Ok(showing)
    }

    /// Creates one showtime per day for `repeat_days` days, all at the wall-clock
    /// time of the first one.
    pub async fn create_showtimes(&self, new: NewShowtimes, caller: &Caller) -> BookingResult<Vec<Showtime>> {
        caller.require_admin()?;
        self.store
            .movie(new.movie_id)
            .await?
            .ok_or(BookingError::MovieNotFound(new.movie_id))?;
        self.store
            .theater(new.theater_id)
            .await?
            .ok_or(BookingError::TheaterNotFound(new.theater_id))?;

        let showtimes: Vec<Showtime> = scheduler::daily_start_times(&new.start_time, new.repeat_days)?
            .into_iter()
            .map(|start| Showtime::new(new.movie_id, new.theater_id, start.with_timezone(&Utc), new.is_release))
            .collect();
        self.store.insert_showtimes(&showtimes).await?;

        info!(
            movie_id = %new.movie_id,
            theater_id = %new.theater_id,
            count = showtimes.len(),
            "showtimes created"
        );
        Ok(showtimes)
    }

    fn day_bounds(&self, date: NaiveDate) -> BookingResult<(DateTime<Utc>, DateTime<Utc>)> {
        let out_of_range = || BookingError::InvalidSchedule(format!("date {} is out of range", date));
        let start = self
            .local_offset
            .from_local_datetime(&date.and_time(NaiveTime::MIN))
            .single()
            .ok_or_else(out_of_range)?;
        let end = start + Duration::days(1);
        Ok((start.with_timezone(&Utc), end.with_timezone(&Utc)))
    }

    /// Showtimes ordered by start. Non-admins see released, upcoming ones only.
    pub async fn list_showtimes(&self, filter: &ShowtimeFilter, caller: &Caller) -> BookingResult<Vec<Showtime>> {
        let mut query = ShowtimeQuery {
            movie_id: filter.movie_id,
            theater_id: filter.theater_id,
            released_only: !caller.is_admin(),
            ..Default::default()
        };
        if let Some(date) = filter.date {
            let (from, before) = self.day_bounds(date)?;
            query.starts_from = Some(from);
            query.starts_before = Some(before);
        }

        let mut showtimes = self.store.list_showtimes(&query).await?;
        if !caller.is_admin() {
            let now = self.clock.now();
            showtimes.retain(|s| !s.is_past(now));
        }
        Ok(showtimes)
    }

    pub async fn showtime(&self, id: Uuid, caller: &Caller) -> BookingResult<Showtime> {
        self.store
            .showtime(id)
            .await?
            .filter(|s| s.is_release || caller.is_admin())
            .ok_or(BookingError::ShowtimeNotFound(id))
    }

    /// Idempotent: setting the current value again is not an error.
    pub async fn set_release(&self, id: Uuid, is_release: bool, caller: &Caller) -> BookingResult<Showtime> {
        caller.require_admin()?;
        let showtime = self
            .store
            .set_release(id, is_release)
            .await?
            .ok_or(BookingError::ShowtimeNotFound(id))?;
        info!(showtime_id = %id, is_release, "showtime release updated");
        Ok(showtime)
    }

    async fn drop_holds(&self, showtime_ids: &[Uuid]) {
        let cleared = join_all(showtime_ids.iter().map(|&id| async move {
            self.locks.forget(id);
            (id, self.holds.clear_showtime(id).await)
        }))
        .await;
        for (id, result) in cleared {
            if let Err(e) = result {
                warn!(showtime_id = %id, "failed to clear seat holds: {:?}", e);
            }
        }
    }

    async fn showtime_ids(&self, query: ShowtimeQuery) -> BookingResult<Vec<Uuid>> {
        Ok(self
            .store
            .list_showtimes(&query)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect())
    }

    pub async fn delete_showtime(&self, id: Uuid, caller: &Caller) -> BookingResult<CascadeReport> {
        caller.require_admin()?;
        let report = self
            .store
            .delete_showtime(id)
            .await?
            .ok_or(BookingError::ShowtimeNotFound(id))?;
        self.drop_holds(&[id]).await;
        info!(showtime_id = %id, tickets = report.tickets, "showtime deleted");
        Ok(report)
    }

    pub async fn delete_movie(&self, id: Uuid, caller: &Caller) -> BookingResult<CascadeReport> {
        caller.require_admin()?;
        let doomed = self
            .showtime_ids(ShowtimeQuery {
                movie_id: Some(id),
                ..Default::default()
            })
            .await?;
        let report = self
            .store
            .delete_movie(id)
            .await?
            .ok_or(BookingError::MovieNotFound(id))?;
        self.drop_holds(&doomed).await;
        info!(movie_id = %id, showtimes = report.showtimes, tickets = report.tickets, "movie deleted");
        Ok(report)
    }

    pub async fn delete_theater(&self, id: Uuid, caller: &Caller) -> BookingResult<CascadeReport> {
        caller.require_admin()?;
        let doomed = self
            .showtime_ids(ShowtimeQuery {
                theater_id: Some(id),
                ..Default::default()
            })
            .await?;
        let report = self
            .store
            .delete_theater(id)
            .await?
            .ok_or(BookingError::TheaterNotFound(id))?;
        self.drop_holds(&doomed).await;
        info!(theater_id = %id, showtimes = report.showtimes, tickets = report.tickets, "theater deleted");
        Ok(report)
    }

    /// Holds on the cinema's showtimes are not cleared here; they lapse with
    /// their TTL and cannot be turned into reservations once the showtime is gone.
    pub async fn delete_cinema(&self, id: Uuid, caller: &Caller) -> BookingResult<CascadeReport> {
        caller.require_admin()?;
        let report = self
            .store
            .delete_cinema(id)
            .await?
            .ok_or(BookingError::CinemaNotFound(id))?;
        info!(
            cinema_id = %id,
            theaters = report.theaters,
            showtimes = report.showtimes,
            tickets = report.tickets,
            "cinema deleted"
        );
        Ok(report)
    }

    /// Start of the next screening after `current_start` of `movie_id` on the
    /// same screen.
    pub async fn next_slot(
        &self,
        current_start: NaiveDateTime,
        movie_id: Uuid,
        gap: Option<&str>,
        rounding: Rounding,
        caller: &Caller,
    ) -> BookingResult<NaiveDateTime> {
        caller.require_admin()?;
        let movie = self
            .store
            .movie(movie_id)
            .await?
            .ok_or(BookingError::MovieNotFound(movie_id))?;
        let gap = scheduler::parse_gap(gap.unwrap_or(DEFAULT_GAP))?;
        scheduler::next_slot(current_start, i64::from(movie.length_minutes), gap, rounding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemorySeatHolds;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn service(now: DateTime<Utc>) -> CatalogService {
        CatalogService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemorySeatHolds::new()),
            Arc::new(ShowtimeLocks::new()),
            Arc::new(ManualClock::new(now)),
            180,
        )
    }

    async fn screen(catalog: &CatalogService, admin: &Caller) -> (Movie, Theater) {
        let cinema = catalog.create_cinema("Rex", admin).await.unwrap();
        let theater = catalog
            .create_theater(
                NewTheater {
                    cinema_id: cinema.id,
                    number: 1,
                    last_row: "h".into(),
                    columns: 12,
                    pricing: None,
                },
                admin,
            )
            .await
            .unwrap();
        let movie = catalog.create_movie("Alien", 117, admin).await.unwrap();
        (movie, theater)
    }

    fn local(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[tokio::test]
    async fn admin_only_operations_reject_users() {
        let catalog = service(Utc::now());
        let err = catalog.create_cinema("Rex", &Caller::user("u1")).await.unwrap_err();
        assert!(matches!(err, BookingError::Forbidden));
        let err = catalog.create_cinema("Rex", &Caller::anonymous()).await.unwrap_err();
        assert!(matches!(err, BookingError::Unauthenticated));
    }

    #[tokio::test]
    async fn invalid_pricing_is_rejected_at_theater_creation() {
        let catalog = service(Utc::now());
        let admin = Caller::admin("ops");
        let cinema = catalog.create_cinema("Rex", &admin).await.unwrap();
        let err = catalog
            .create_theater(
                NewTheater {
                    cinema_id: cinema.id,
                    number: 2,
                    last_row: "H".into(),
                    columns: 10,
                    pricing: Some(PricingPolicy::Sectioned {
                        sections: vec![crate::models::PricingSection {
                            row_start: "A".into(),
                            row_end: "C".into(),
                            price: 500,
                        }],
                        default_price: None,
                    }),
                },
                &admin,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::PricingConfigInvalid(_)));
    }

    #[tokio::test]
    async fn repeats_showtimes_daily() {
        let catalog = service(Utc::now());
        let admin = Caller::admin("ops");
        let (movie, theater) = screen(&catalog, &admin).await;

        let created = catalog
            .create_showtimes(
                NewShowtimes {
                    movie_id: movie.id,
                    theater_id: theater.id,
                    start_time: local("2030-03-01T19:30:00+03:00"),
                    repeat_days: 3,
                    is_release: true,
                },
                &admin,
            )
            .await
            .unwrap();
        assert_eq!(created.len(), 3);
        assert_eq!(created[2].start_time - created[0].start_time, Duration::days(2));
    }

    #[tokio::test]
    async fn users_only_see_released_upcoming_showtimes() {
        let now = local("2030-03-02T12:00:00+03:00").with_timezone(&Utc);
        let catalog = service(now);
        let admin = Caller::admin("ops");
        let (movie, theater) = screen(&catalog, &admin).await;

        for (start, is_release) in [
            ("2030-03-02T10:00:00+03:00", true),
            ("2030-03-02T18:00:00+03:00", true),
            ("2030-03-02T21:00:00+03:00", false),
            ("2030-03-03T18:00:00+03:00", true),
        ] {
            catalog
                .create_showtimes(
                    NewShowtimes {
                        movie_id: movie.id,
                        theater_id: theater.id,
                        start_time: local(start),
                        repeat_days: 1,
                        is_release,
                    },
                    &admin,
                )
                .await
                .unwrap();
        }

        let today = ShowtimeFilter {
            date: NaiveDate::from_ymd_opt(2030, 3, 2),
            ..Default::default()
        };
        assert_eq!(catalog.list_showtimes(&today, &admin).await.unwrap().len(), 3);
        let visible = catalog.list_showtimes(&today, &Caller::user("u1")).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].start_time, local("2030-03-02T18:00:00+03:00"));

        let all = catalog
            .list_showtimes(&ShowtimeFilter::default(), &Caller::anonymous())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].start_time < all[1].start_time);
    }

    #[tokio::test]
    async fn release_toggle_is_idempotent() {
        let catalog = service(Utc::now());
        let admin = Caller::admin("ops");
        let (movie, theater) = screen(&catalog, &admin).await;
        let created = catalog
            .create_showtimes(
                NewShowtimes {
                    movie_id: movie.id,
                    theater_id: theater.id,
                    start_time: local("2030-03-01T19:30:00+03:00"),
                    repeat_days: 1,
                    is_release: false,
                },
                &admin,
            )
            .await
            .unwrap();
        let id = created[0].id;

        let user = Caller::user("u1");
        assert!(catalog.showtime(id, &user).await.is_err());
        assert!(catalog.set_release(id, true, &admin).await.unwrap().is_release);
        assert!(catalog.set_release(id, true, &admin).await.unwrap().is_release);
        assert!(catalog.showtime(id, &user).await.is_ok());
        assert!(!catalog.set_release(id, false, &admin).await.unwrap().is_release);
    }

    #[tokio::test]
    async fn next_slot_uses_movie_length_and_default_gap() {
        let catalog = service(Utc::now());
        let admin = Caller::admin("ops");
        let (movie, _) = screen(&catalog, &admin).await;

        let current = NaiveDate::from_ymd_opt(2030, 3, 1)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap();
        // 18:00 + 117 + 10 = 20:07, rounded up to 20:10
        let next = catalog
            .next_slot(current, movie.id, None, Rounding::Round5, &admin)
            .await
            .unwrap();
        assert_eq!(next.time(), NaiveTime::from_hms_opt(20, 10, 0).unwrap());
    }

    #[tokio::test]
    async fn next_slot_rejects_an_oversized_gap() {
        let catalog = Arc::new(service(Utc::now()));
        let admin = Caller::admin("ops");
        let (movie, _) = screen(&catalog, &admin).await;
        let current = NaiveDate::from_ymd_opt(2030, 1, 1)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap();

        let task = {
            let catalog = catalog.clone();
            tokio::spawn(async move {
                catalog
                    .next_slot(current, movie.id, Some("200000000000:00"), Rounding::Round5, &admin)
                    .await
            })
        };
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, BookingError::InvalidSchedule(_)));
    }

    #[tokio::test]
    async fn showing_movies_counts_upcoming_screenings() {
        let now = local("2030-03-02T12:00:00+03:00").with_timezone(&Utc);
        let catalog = service(now);
        let admin = Caller::admin("ops");
        let (alien, theater) = screen(&catalog, &admin).await;
        let brazil = catalog.create_movie("Brazil", 132, &admin).await.unwrap();
        catalog.create_movie("Cube", 90, &admin).await.unwrap();

        for (movie, start, days, is_release) in [
            (alien.id, "2030-03-02T18:00:00+03:00", 1, true),
            (brazil.id, "2030-03-02T20:00:00+03:00", 3, true),
            (brazil.id, "2030-03-01T20:00:00+03:00", 1, true),
            (alien.id, "2030-03-03T10:00:00+03:00", 2, false),
        ] {
            catalog
                .create_showtimes(
                    NewShowtimes {
                        movie_id: movie,
                        theater_id: theater.id,
                        start_time: local(start),
                        repeat_days: days,
                        is_release,
                    },
                    &admin,
                )
                .await
                .unwrap();
        }

        let public = catalog.showing_movies(&Caller::anonymous()).await.unwrap();
        let summary: Vec<_> = public.iter().map(|m| (m.movie.name.as_str(), m.upcoming_showtimes)).collect();
        assert_eq!(summary, vec![("Brazil", 3), ("Alien", 1)]);

        let everything = catalog.showing_movies(&admin).await.unwrap();
        let summary: Vec<_> = everything.iter().map(|m| (m.movie.name.as_str(), m.upcoming_showtimes)).collect();
        assert_eq!(summary, vec![("Alien", 3), ("Brazil", 3)]);
    }

    #[tokio::test]
    async fn update_movie_keeps_unchanged_fields() {
        let catalog = service(Utc::now());
        let admin = Caller::admin("ops");
        let (movie, _) = screen(&catalog, &admin).await;

        let updated = catalog
            .update_movie(movie.id, None, Some(126), &admin)
            .await
            .unwrap();
        assert_eq!(updated.name, "Alien");
        assert_eq!(catalog.movie(movie.id).await.unwrap().length_minutes, 126);

        let err = catalog.update_movie(movie.id, None, Some(0), &admin).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidSchedule(_)));
        let err = catalog
            .update_movie(Uuid::new_v4(), Some("Aliens"), None, &admin)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::MovieNotFound(_)));
        let err = catalog
            .update_movie(movie.id, Some("Aliens"), None, &Caller::user("u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Forbidden));
    }
}
