use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{HoldOutcome, SeatHolds};
use crate::error::BookingResult;
use crate::models::SeatId;

// Deletes the key only while it still belongs to the releasing user.
const RELEASE_IF_OWNER: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

fn hold_key(showtime_id: Uuid, seat: &SeatId) -> String {
    format!("hold:{}:{}", showtime_id, seat)
}

/// Holds stored as one Redis key per seat, `hold:{showtime}:{seat}`, whose value is
/// the holding user. Expiry is left to Redis (`SET NX EX`).
#[derive(Clone)]
pub struct RedisSeatHolds {
    conn: MultiplexedConnection,
}

impl RedisSeatHolds {
    pub async fn connect(redis_url: &str) -> redis::RedisResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self { conn })
    }

    async fn release_key(&self, key: &str, user_id: &str) -> redis::RedisResult<i64> {
        let mut conn = self.conn.clone();
        let script = redis::Script::new(RELEASE_IF_OWNER);
        let removed: i64 = script.key(key).arg(user_id).invoke_async(&mut conn).await?;
        Ok(removed)
    }

    // Cursor-driven SCAN; KEYS would block the server on large keyspaces.
    async fn scan_keys(&self, pattern: &str) -> redis::RedisResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                return Ok(keys);
            }
            cursor = next;
        }
    }
}

#[async_trait]
impl SeatHolds for RedisSeatHolds {
    async fn try_hold(
        &self,
        showtime_id: Uuid,
        seats: &[SeatId],
        user_id: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> BookingResult<HoldOutcome> {
        let ttl_secs = ttl.num_seconds().max(1) as u64;
        let mut conn = self.conn.clone();
        let mut acquired: Vec<String> = Vec::new();
        let mut conflicts: Vec<SeatId> = Vec::new();

        for seat in seats {
            let key = hold_key(showtime_id, seat);

            // SET NX EX: atomic claim with expiry
            let claimed: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(user_id)
                .arg("NX")
                .arg("EX")
                .arg(ttl_secs)
                .query_async(&mut conn)
                .await?;
            if claimed.is_some() {
                acquired.push(key);
                continue;
            }

            let holder: Option<String> = conn.get(&key).await?;
            match holder {
                Some(holder) if holder == user_id => {
                    let _: bool = conn.expire(&key, ttl_secs as i64).await?;
                }
                // expired between SET and GET; the next attempt will get it
                None => conflicts.push(seat.clone()),
                Some(_) => conflicts.push(seat.clone()),
            }
        }

        if conflicts.is_empty() {
            return Ok(HoldOutcome::Held {
                expires_at: now + Duration::seconds(ttl_secs as i64),
            });
        }

        // Give back what this call took so the hold stays all-or-nothing
        for key in &acquired {
            if let Err(e) = self.release_key(key, user_id).await {
                warn!("failed to roll back seat hold {}: {:?}", key, e);
            }
        }
        debug!(%showtime_id, conflicts = conflicts.len(), "seat hold refused");
        Ok(HoldOutcome::Conflict(conflicts))
    }

    async fn holders(&self, showtime_id: Uuid, _now: DateTime<Utc>) -> BookingResult<HashMap<SeatId, String>> {
        let prefix = format!("hold:{}:", showtime_id);
        let keys = self.scan_keys(&format!("{}*", prefix)).await?;
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut conn = self.conn.clone();
        let users: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(&mut conn).await?;
        Ok(keys
            .iter()
            .zip(users)
            .filter_map(|(key, user)| {
                let seat: SeatId = key.strip_prefix(&prefix)?.parse().ok()?;
                Some((seat, user?))
            })
            .collect())
    }

    async fn release(&self, showtime_id: Uuid, seats: &[SeatId], user_id: &str) -> BookingResult<usize> {
        let mut released = 0;
        for seat in seats {
            released += self.release_key(&hold_key(showtime_id, seat), user_id).await? as usize;
        }
        Ok(released)
    }

    async fn clear_showtime(&self, showtime_id: Uuid) -> BookingResult<usize> {
        let keys = self.scan_keys(&format!("hold:{}:*", showtime_id)).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed: usize = conn.del(&keys).await?;
        Ok(removed)
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> usize {
        0
    }
}
