use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{HoldOutcome, SeatHolds};
use crate::error::{BookingError, BookingResult};
use crate::models::SeatId;

#[derive(Debug, Clone)]
struct Hold {
    user_id: String,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemorySeatHolds {
    holds: Mutex<HashMap<(Uuid, SeatId), Hold>>,
}

impl MemorySeatHolds {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> BookingResult<std::sync::MutexGuard<'_, HashMap<(Uuid, SeatId), Hold>>> {
        self.holds
            .lock()
            .map_err(|_| BookingError::Storage("seat hold table poisoned".to_string()))
    }
}

#[async_trait]
impl SeatHolds for MemorySeatHolds {
    async fn try_hold(
        &self,
        showtime_id: Uuid,
        seats: &[SeatId],
        user_id: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> BookingResult<HoldOutcome> {
        let mut holds = self.lock()?;

        let conflicts: Vec<SeatId> = seats
            .iter()
            .filter(|seat| {
                holds
                    .get(&(showtime_id, (*seat).clone()))
                    .is_some_and(|h| h.expires_at > now && h.user_id != user_id)
            })
            .cloned()
            .collect();
        if !conflicts.is_empty() {
            return Ok(HoldOutcome::Conflict(conflicts));
        }

        let expires_at = now + ttl;
        for seat in seats {
            holds.insert(
                (showtime_id, seat.clone()),
                Hold {
                    user_id: user_id.to_string(),
                    expires_at,
                },
            );
        }
        Ok(HoldOutcome::Held { expires_at })
    }

    async fn holders(&self, showtime_id: Uuid, now: DateTime<Utc>) -> BookingResult<HashMap<SeatId, String>> {
        let holds = self.lock()?;
        Ok(holds
            .iter()
            .filter(|((sid, _), hold)| *sid == showtime_id && hold.expires_at > now)
            .map(|((_, seat), hold)| (seat.clone(), hold.user_id.clone()))
            .collect())
    }

    async fn release(&self, showtime_id: Uuid, seats: &[SeatId], user_id: &str) -> BookingResult<usize> {
        let mut holds = self.lock()?;
        let mut released = 0;
        for seat in seats {
            let key = (showtime_id, seat.clone());
            if holds.get(&key).is_some_and(|h| h.user_id == user_id) {
                holds.remove(&key);
                released += 1;
            }
        }
        Ok(released)
    }

    async fn clear_showtime(&self, showtime_id: Uuid) -> BookingResult<usize> {
        let mut holds = self.lock()?;
        let before = holds.len();
        holds.retain(|(sid, _), _| *sid != showtime_id);
        Ok(before - holds.len())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let Ok(mut holds) = self.lock() else {
            return 0;
        };
        let before = holds.len();
        holds.retain(|_, hold| hold.expires_at > now);
        before - holds.len()
    }
}
