use serde::{Deserialize, Serialize};

use super::seat::row_to_ordinal;
use crate::error::BookingError;

/// Highest price a policy may assign to one seat.
pub const MAX_SEAT_PRICE: u32 = i32::MAX as u32 / 100;

/// A contiguous row range sold at one price. Bounds are inclusive and compared as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingSection {
    pub row_start: String,
    pub row_end: String,
    pub price: u32,
}

impl PricingSection {
    pub fn covers(&self, row: &str) -> bool {
        self.row_start.as_str() <= row && row <= self.row_end.as_str()
    }
}

/// How a theater prices its seats. A theater without a policy uses the
/// built-in row bands (see `services::pricing`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PricingPolicy {
    Sectioned {
        sections: Vec<PricingSection>,
        default_price: Option<u32>,
    },
    /// Rows split into thirds: front, middle and back.
    Tiered {
        lower: Option<u32>,
        middle: Option<u32>,
        upper: Option<u32>,
    },
}

impl PricingPolicy {
    pub fn validate(&self) -> Result<(), BookingError> {
        if let Some(price) = self.prices().find(|p| *p > MAX_SEAT_PRICE) {
            return Err(BookingError::PricingConfigInvalid(format!(
                "price {} exceeds the maximum of {}",
                price, MAX_SEAT_PRICE
            )));
        }

        let PricingPolicy::Sectioned {
            sections,
            default_price,
        } = self
        else {
            return Ok(());
        };

        if !sections.is_empty() && default_price.is_none() {
            return Err(BookingError::PricingConfigInvalid(
                "sectioned pricing needs a default_price".to_string(),
            ));
        }

        for section in sections {
            if row_to_ordinal(&section.row_start).is_none()
                || row_to_ordinal(&section.row_end).is_none()
            {
                return Err(BookingError::PricingConfigInvalid(format!(
                    "section {}..{} has an invalid row label",
                    section.row_start, section.row_end
                )));
            }
            if section.row_start > section.row_end {
                return Err(BookingError::PricingConfigInvalid(format!(
                    "section {}..{} starts after it ends",
                    section.row_start, section.row_end
                )));
            }
        }
        Ok(())
    }

    fn prices(&self) -> Box<dyn Iterator<Item = u32> + '_> {
        match self {
            PricingPolicy::Sectioned {
                sections,
                default_price,
            } => Box::new(sections.iter().map(|s| s.price).chain(*default_price)),
            PricingPolicy::Tiered { lower, middle, upper } => {
                Box::new([*lower, *middle, *upper].into_iter().flatten())
            }
        }
    }

    /// Upper-cases row bounds so lexicographic comparison matches seat labels.
    pub fn normalized(mut self) -> Self {
        if let PricingPolicy::Sectioned { sections, .. } = &mut self {
            for section in sections.iter_mut() {
                section.row_start.make_ascii_uppercase();
                section.row_end.make_ascii_uppercase();
            }
        }
        self
    }
}
