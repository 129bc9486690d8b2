//! Short-lived seat holds.
//!
//! A hold keeps a seat for one user while they pay. It never replaces a
//! reservation: it only stops other users from committing the seat until it
//! expires or is released.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::BookingResult;
use crate::models::SeatId;

pub use self::memory::MemorySeatHolds;
pub use self::redis::RedisSeatHolds;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldOutcome {
    Held { expires_at: DateTime<Utc> },
    /// Nothing was held; these seats belong to other users.
    Conflict(Vec<SeatId>),
}

#[async_trait]
pub trait SeatHolds: Send + Sync {
    /// Holds every seat for `user_id`, or none of them. Seats the user already
    /// holds are refreshed.
    async fn try_hold(
        &self,
        showtime_id: Uuid,
        seats: &[SeatId],
        user_id: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> BookingResult<HoldOutcome>;

    /// Live holds on a showtime: seat → holding user.
    async fn holders(&self, showtime_id: Uuid, now: DateTime<Utc>) -> BookingResult<HashMap<SeatId, String>>;

    /// Drops the user's holds on these seats. Holds of other users are left alone.
    async fn release(&self, showtime_id: Uuid, seats: &[SeatId], user_id: &str) -> BookingResult<usize>;

    /// Drops every hold on a showtime (used when the showtime is deleted).
    async fn clear_showtime(&self, showtime_id: Uuid) -> BookingResult<usize>;

    /// Removes expired entries. Backends with native expiry return 0.
    async fn purge_expired(&self, now: DateTime<Utc>) -> usize;
}
