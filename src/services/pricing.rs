//! Seat pricing.
//!
//! This is the only place a seat price is computed: the seat plan, the quote
//! endpoint and the reservation commit all go through [`PricingEngine`], so the
//! amount shown to a customer is the amount written on the ticket.

use serde::Serialize;

use crate::error::{BookingError, BookingResult};
use crate::models::{PricingPolicy, SeatId, SeatMap};

pub const DEFAULT_LOWER_PRICE: u32 = 300;
pub const DEFAULT_MIDDLE_PRICE: u32 = 200;
pub const DEFAULT_UPPER_PRICE: u32 = 100;
pub const DEFAULT_SERVICE_FEE: u32 = 40;
/// Totals are stored as signed 32-bit integers.
pub const MAX_TOTAL_PRICE: u32 = i32::MAX as u32;

/// Built-in bands for theaters without a policy: A–F, G–Q, everything else.
///
/// Labels are compared as whole strings, so two-letter rows fall into the band
/// their spelling sorts into: "AB" is in A–F, "GA" in G–Q, while "FA" sorts
/// between "F" and "G" and lands in the last band.
pub fn fallback_price(row: &str) -> u32 {
    if ("A"..="F").contains(&row) {
        DEFAULT_LOWER_PRICE
    } else if ("G"..="Q").contains(&row) {
        DEFAULT_MIDDLE_PRICE
    } else {
        DEFAULT_UPPER_PRICE
    }
}

/// Price of one seat. Pure: same inputs, same price.
pub fn price_of(seat: &SeatId, policy: Option<&PricingPolicy>, seat_map: &SeatMap) -> u32 {
    let row = seat.row.as_str();

    match policy {
        None => fallback_price(row),
        Some(PricingPolicy::Sectioned {
            sections,
            default_price,
        }) => sections
            .iter()
            .find(|section| section.covers(row))
            .map(|section| section.price)
            .or(*default_price)
            .unwrap_or_else(|| fallback_price(row)),
        Some(PricingPolicy::Tiered {
            lower,
            middle,
            upper,
        }) => {
            // zero counts as unset, like an empty field in the admin form
            let or_default = |price: &Option<u32>, default: u32| {
                price.filter(|p| *p > 0).unwrap_or(default)
            };
            let section_size = seat_map.row_count().div_ceil(3);
            let ordinal = seat.row_ordinal().unwrap_or(u32::MAX);

            if ordinal <= section_size {
                or_default(lower, DEFAULT_LOWER_PRICE)
            } else if ordinal <= section_size * 2 {
                or_default(middle, DEFAULT_MIDDLE_PRICE)
            } else {
                or_default(upper, DEFAULT_UPPER_PRICE)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatPrice {
    pub seat: SeatId,
    pub price: u32,
}

/// Price breakdown for a set of seats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceQuote {
    pub seats: Vec<SeatPrice>,
    pub seat_total: u32,
    pub service_fee: u32,
    pub total_price: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct PricingEngine {
    service_fee: u32,
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_FEE)
    }
}

impl PricingEngine {
    pub fn new(service_fee: u32) -> Self {
        Self { service_fee }
    }

    pub fn service_fee(&self) -> u32 {
        self.service_fee
    }

    pub fn price_of(&self, seat: &SeatId, policy: Option<&PricingPolicy>, seat_map: &SeatMap) -> u32 {
        price_of(seat, policy, seat_map)
    }

    /// Totals must fit a signed 32-bit amount; larger ones are a pricing error.
    pub fn quote(
        &self,
        seats: &[SeatId],
        policy: Option<&PricingPolicy>,
        seat_map: &SeatMap,
    ) -> BookingResult<PriceQuote> {
        let seats: Vec<SeatPrice> = seats
            .iter()
            .map(|seat| SeatPrice {
                seat: seat.clone(),
                price: price_of(seat, policy, seat_map),
            })
            .collect();

        let too_large = || BookingError::PricingConfigInvalid("total price is too large".to_string());
        let seat_total = seats
            .iter()
            .try_fold(0u32, |total, s| total.checked_add(s.price))
            .ok_or_else(too_large)?;
        let total_price = seat_total
            .checked_add(self.service_fee)
            .filter(|total| *total <= MAX_TOTAL_PRICE)
            .ok_or_else(too_large)?;

        Ok(PriceQuote {
            seats,
            seat_total,
            service_fee: self.service_fee,
            total_price,
        })
    }
}
