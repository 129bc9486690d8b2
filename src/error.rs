use uuid::Uuid;

use crate::models::SeatId;

fn join_seats(seats: &[SeatId]) -> String {
    seats
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    /// Seat labels that are malformed, duplicated or outside the seat map.
    #[error("invalid seats: {}", .0.join(", "))]
    InvalidSeat(Vec<String>),

    #[error("seats already taken: {}", join_seats(.0))]
    SeatUnavailable(Vec<SeatId>),

    #[error("showtime {0} not found")]
    ShowtimeNotFound(Uuid),

    #[error("showtime {0} has already started")]
    ShowtimePast(Uuid),

    #[error("invalid pricing policy: {0}")]
    PricingConfigInvalid(String),

    #[error("invalid seat map: {0}")]
    InvalidSeatMap(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("movie {0} not found")]
    MovieNotFound(Uuid),

    #[error("theater {0} not found")]
    TheaterNotFound(Uuid),

    #[error("cinema {0} not found")]
    CinemaNotFound(Uuid),

    #[error("payment rejected: {0}")]
    PaymentRejected(String),

    #[error("caller identity required")]
    Unauthenticated,

    #[error("admin role required")]
    Forbidden,

    /// Transient write conflict reported by a store; retried by the reservation service.
    #[error("concurrent modification of showtime {0}")]
    VersionConflict(Uuid),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for BookingError {
    fn from(err: sqlx::Error) -> Self {
        BookingError::Storage(err.to_string())
    }
}

impl From<redis::RedisError> for BookingError {
    fn from(err: redis::RedisError) -> Self {
        BookingError::Storage(err.to_string())
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
