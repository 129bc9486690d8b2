use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PricingPolicy, SeatMap};

/// A screen inside a cinema, with its seating grid and pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theater {
    pub id: Uuid,
    pub cinema_id: Uuid,
    pub number: i32,
    pub seat_map: SeatMap,
    pub pricing: Option<PricingPolicy>,
}

impl Theater {
    pub fn new(cinema_id: Uuid, number: i32, seat_map: SeatMap, pricing: Option<PricingPolicy>) -> Self {
        Self {
            id: Uuid::new_v4(),
            cinema_id,
            number,
            seat_map,
            pricing,
        }
    }
}
