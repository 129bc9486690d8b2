use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::SeatHolds;
use crate::clock::Clock;

/// Periodically drops expired seat holds from backends that do not expire
/// entries on their own.
pub struct CleanupService {
    holds: Arc<dyn SeatHolds>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl CleanupService {
    pub fn new(holds: Arc<dyn SeatHolds>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self { holds, clock, interval }
    }

    /// One sweep. Returns how many holds were removed.
    pub async fn run_once(&self) -> usize {
        let purged = self.holds.purge_expired(self.clock.now()).await;
        if purged > 0 {
            info!("🧹 Purged {} expired seat holds", purged);
        } else {
            debug!("no expired seat holds to purge");
        }
        purged
    }

    /// Runs the sweep forever on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemorySeatHolds;
    use crate::clock::ManualClock;
    use crate::models::SeatId;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn sweep_removes_only_expired_holds() {
        let now = Utc::now();
        let holds = Arc::new(MemorySeatHolds::new());
        let clock = Arc::new(ManualClock::new(now));
        let showtime = Uuid::new_v4();

        holds
            .try_hold(showtime, &[SeatId::new("A", 1)], "u1", chrono::Duration::seconds(30), now)
            .await
            .unwrap();
        holds
            .try_hold(showtime, &[SeatId::new("A", 2)], "u2", chrono::Duration::minutes(10), now)
            .await
            .unwrap();

        let cleanup = CleanupService::new(holds.clone(), clock.clone(), Duration::from_secs(60));
        assert_eq!(cleanup.run_once().await, 0);

        clock.advance(chrono::Duration::minutes(1));
        assert_eq!(cleanup.run_once().await, 1);
        assert_eq!(holds.holders(showtime, clock.now()).await.unwrap().len(), 1);
    }
}
