use serde::{Deserialize, Serialize};

use super::seat::{ordinal_to_row, row_to_ordinal, SeatId};
use crate::error::BookingError;

pub const MAX_COLUMNS: u32 = 50;

/// Seating grid of a theater: rows "A" through `last_row`, seats 1 through `columns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatMap {
    pub last_row: String,
    pub columns: u32,
}

impl SeatMap {
    pub fn new(last_row: impl Into<String>, columns: u32) -> Result<Self, BookingError> {
        let map = Self {
            last_row: last_row.into().to_ascii_uppercase(),
            columns,
        };
        map.validate()?;
        Ok(map)
    }

    pub fn validate(&self) -> Result<(), BookingError> {
        if row_to_ordinal(&self.last_row).is_none() {
            return Err(BookingError::InvalidSeatMap(format!(
                "last row '{}' must be one or two letters (A..ZZ)",
                self.last_row
            )));
        }
        if !(1..=MAX_COLUMNS).contains(&self.columns) {
            return Err(BookingError::InvalidSeatMap(format!(
                "column count {} must be between 1 and {}",
                self.columns, MAX_COLUMNS
            )));
        }
        Ok(())
    }

    pub fn row_count(&self) -> u32 {
        row_to_ordinal(&self.last_row).unwrap_or(0)
    }

    pub fn total_seats(&self) -> u32 {
        self.row_count() * self.columns
    }

    pub fn contains(&self, seat: &SeatId) -> bool {
        let in_rows = seat
            .row_ordinal()
            .is_some_and(|ordinal| ordinal <= self.row_count());
        in_rows && (1..=self.columns).contains(&seat.number)
    }

    /// Every seat of the grid, row by row.
    pub fn seats(&self) -> impl Iterator<Item = SeatId> + '_ {
        (1..=self.row_count())
            .filter_map(ordinal_to_row)
            .flat_map(move |row| (1..=self.columns).map(move |n| SeatId::new(row.clone(), n)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_seats_uses_two_letter_ordinals() {
        let map = SeatMap::new("J", 20).unwrap();
        assert_eq!(map.total_seats(), 200);

        let map = SeatMap::new("AB", 10).unwrap();
        assert_eq!(map.row_count(), 28);
        assert_eq!(map.total_seats(), 280);
        assert_eq!(map.seats().count(), 280);
    }

    #[test]
    fn bounds() {
        let map = SeatMap::new("C", 5).unwrap();
        assert!(map.contains(&SeatId::new("A", 1)));
        assert!(map.contains(&SeatId::new("C", 5)));
        assert!(!map.contains(&SeatId::new("C", 6)));
        assert!(!map.contains(&SeatId::new("D", 1)));
        assert!(!map.contains(&SeatId::new("A", 0)));
        assert!(!map.contains(&SeatId::new("AA", 1)));
    }

    #[test]
    fn rejects_bad_dimensions() {
        assert!(SeatMap::new("A", 0).is_err());
        assert!(SeatMap::new("A", 51).is_err());
        assert!(SeatMap::new("AAA", 10).is_err());
        assert!(SeatMap::new("", 10).is_err());
    }

    #[test]
    fn seats_enumerate_in_order() {
        let map = SeatMap::new("B", 2).unwrap();
        let labels: Vec<String> = map.seats().map(|s| s.to_string()).collect();
        assert_eq!(labels, vec!["A1", "A2", "B1", "B2"]);
    }
}
