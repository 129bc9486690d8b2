use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SeatId;

/// Result of a successful reservation. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub showtime_id: Uuid,
    pub user_id: String,
    pub seats: Vec<SeatId>,
    pub seat_total: u32,
    pub service_fee: u32,
    pub total_price: u32,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
