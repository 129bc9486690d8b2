#![allow(dead_code)]

use chrono::{Duration, Utc};
use std::sync::Arc;

use showtime_booking::config::Config;
use showtime_booking::models::{Caller, Cinema, Movie, SeatMap, Showtime, Theater};
use showtime_booking::store::BookingStore;
use showtime_booking::AppState;

pub struct Screen {
    pub cinema: Cinema,
    pub theater: Theater,
    pub movie: Movie,
    pub showtime: Showtime,
}

pub fn admin() -> Caller {
    Caller::admin("ops")
}

pub fn labels(seats: &[&str]) -> Vec<String> {
    seats.iter().map(|s| s.to_string()).collect()
}

/// Cinema with one 10x10 theater and a released showtime two hours from now.
pub async fn seed(store: &dyn BookingStore) -> Screen {
    let cinema = Cinema::new("Odeon");
    let theater = Theater::new(cinema.id, 1, SeatMap::new("J", 10).unwrap(), None);
    let movie = Movie::new("Vertigo", 128);
    let showtime = Showtime::new(movie.id, theater.id, Utc::now() + Duration::hours(2), true);

    store.insert_cinema(&cinema).await.unwrap();
    store.insert_theater(&theater).await.unwrap();
    store.insert_movie(&movie).await.unwrap();
    store.insert_showtimes(std::slice::from_ref(&showtime)).await.unwrap();

    Screen {
        cinema,
        theater,
        movie,
        showtime,
    }
}

pub async fn seeded_state(config: Config) -> (Arc<AppState>, Screen) {
    let state = AppState::in_memory(config);
    let screen = seed(state.store.as_ref()).await;
    (state, screen)
}
