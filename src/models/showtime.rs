use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SeatId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedSeat {
    pub seat: SeatId,
    pub user_id: String,
}

/// One screening of a movie in a theater.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Showtime {
    pub id: Uuid,
    pub movie_id: Uuid,
    pub theater_id: Uuid,
    pub start_time: DateTime<Utc>,
    /// Unreleased showtimes are visible and bookable by admins only.
    pub is_release: bool,
    pub reserved_seats: Vec<ReservedSeat>,
}

impl Showtime {
    pub fn new(movie_id: Uuid, theater_id: Uuid, start_time: DateTime<Utc>, is_release: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            movie_id,
            theater_id,
            start_time,
            is_release,
            reserved_seats: Vec::new(),
        }
    }

    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_time
    }

    pub fn is_reserved(&self, seat: &SeatId) -> bool {
        self.reserved_seats.iter().any(|r| &r.seat == seat)
    }

    /// Requested seats that are already taken, in request order.
    pub fn conflicts<'a>(&self, seats: &'a [SeatId]) -> Vec<&'a SeatId> {
        seats.iter().filter(|s| self.is_reserved(s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn past_is_relative_to_start() {
        let start = Utc::now();
        let showtime = Showtime::new(Uuid::new_v4(), Uuid::new_v4(), start, true);
        assert!(!showtime.is_past(start - Duration::minutes(1)));
        assert!(showtime.is_past(start));
        assert!(showtime.is_past(start + Duration::minutes(1)));
    }

    #[test]
    fn reports_conflicting_seats() {
        let mut showtime = Showtime::new(Uuid::new_v4(), Uuid::new_v4(), Utc::now(), true);
        showtime.reserved_seats.push(ReservedSeat {
            seat: SeatId::new("B", 3),
            user_id: "u1".into(),
        });
        let wanted = vec![SeatId::new("B", 2), SeatId::new("B", 3)];
        assert_eq!(showtime.conflicts(&wanted), vec![&SeatId::new("B", 3)]);
    }
}
