use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Highest ordinal a row label can reach: "ZZ" = 26 * 26 + 26.
pub const MAX_ROW_ORDINAL: u32 = 702;

/// Spreadsheet-style row label to its 1-based ordinal.
///
/// "A" → 1, "Z" → 26, "AA" → 27, "AZ" → 52, "ZZ" → 702.
/// Anything other than one or two ASCII letters has no ordinal.
pub fn row_to_ordinal(row: &str) -> Option<u32> {
    let bytes = row.as_bytes();
    let letter = |b: u8| -> Option<u32> {
        let up = b.to_ascii_uppercase();
        up.is_ascii_uppercase().then(|| u32::from(up - b'A') + 1)
    };

    match bytes {
        [single] => letter(*single),
        [first, second] => Some(26 * letter(*first)? + letter(*second)?),
        _ => None,
    }
}

/// Inverse of [`row_to_ordinal`] for 1..=702.
pub fn ordinal_to_row(ordinal: u32) -> Option<String> {
    let to_char = |n: u32| char::from(b'A' + (n - 1) as u8);

    match ordinal {
        1..=26 => Some(to_char(ordinal).to_string()),
        27..=MAX_ROW_ORDINAL => {
            // 27 is "AA": the second letter cycles fastest
            let first = (ordinal - 1) / 26;
            let second = ordinal - first * 26;
            Some(format!("{}{}", to_char(first), to_char(second)))
        }
        _ => None,
    }
}

/// A physical seat: row label plus 1-based column number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeatId {
    pub row: String,
    pub number: u32,
}

impl SeatId {
    pub fn new(row: impl Into<String>, number: u32) -> Self {
        Self {
            row: row.into().to_ascii_uppercase(),
            number,
        }
    }

    pub fn row_ordinal(&self) -> Option<u32> {
        row_to_ordinal(&self.row)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a seat label (expected row letters followed by a number, e.g. A1 or AB12)")]
pub struct SeatParseError(pub String);

impl FromStr for SeatId {
    type Err = SeatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_alphabetic())
            .ok_or_else(|| SeatParseError(s.to_string()))?;
        let (row, number) = trimmed.split_at(split);

        if row_to_ordinal(row).is_none() {
            return Err(SeatParseError(s.to_string()));
        }
        let number: u32 = number
            .parse()
            .map_err(|_| SeatParseError(s.to_string()))?;

        Ok(SeatId::new(row, number))
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.number)
    }
}

// Rows sort by ordinal (so "Z" < "AA"), then by seat number.
impl Ord for SeatId {
    fn cmp(&self, other: &Self) -> Ordering {
        let key = |s: &SeatId| (s.row.len(), s.row.clone(), s.number);
        key(self).cmp(&key(other))
    }
}

impl PartialOrd for SeatId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Over the wire a seat is its label, "A1".
impl Serialize for SeatId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SeatId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
