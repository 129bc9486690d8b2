//! Showtime generation.
//!
//! Two helpers used when an admin fills a theater's schedule:
//! [`daily_start_times`] repeats one screening on consecutive calendar days, and
//! [`next_slot`] proposes the start of the following screening on the same screen.

use chrono::{DateTime, Days, Duration, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::BookingError;

pub const MAX_REPEAT_DAYS: u32 = 31;

/// Longest accepted cleaning gap, in minutes.
pub const MAX_GAP_MINUTES: i64 = 24 * 60;

/// How the auto-advanced start time is rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    None,
    #[default]
    Round5,
    Round10,
}

impl Rounding {
    fn step_minutes(self) -> Option<i64> {
        match self {
            Rounding::None => None,
            Rounding::Round5 => Some(5),
            Rounding::Round10 => Some(10),
        }
    }
}

/// `repeat_days` start instants, one per calendar day, all at the wall-clock
/// time of `first_start` in its own time zone.
///
/// A wall-clock time that occurs twice on a day (clocks going back) resolves to
/// the earlier instant; one that is skipped (clocks going forward) moves to the
/// first minute that exists after it.
pub fn daily_start_times<Tz: TimeZone>(
    first_start: &DateTime<Tz>,
    repeat_days: u32,
) -> Result<Vec<DateTime<Tz>>, BookingError> {
    if !(1..=MAX_REPEAT_DAYS).contains(&repeat_days) {
        return Err(BookingError::InvalidSchedule(format!(
            "repeat must be between 1 and {} days, got {}",
            MAX_REPEAT_DAYS, repeat_days
        )));
    }

    let tz = first_start.timezone();
    let local = first_start.naive_local();

    (0..repeat_days)
        .map(|day| {
            let wall_clock = local
                .checked_add_days(Days::new(u64::from(day)))
                .ok_or_else(|| BookingError::InvalidSchedule("date out of range".to_string()))?;
            resolve_local(&tz, wall_clock)
        })
        .collect()
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, wall_clock: NaiveDateTime) -> Result<DateTime<Tz>, BookingError> {
    let mut candidate = wall_clock;
    // DST gaps are at most a few hours wide
    for _ in 0..=180 {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(instant) => return Ok(instant),
            LocalResult::Ambiguous(earliest, _) => return Ok(earliest),
            LocalResult::None => candidate += Duration::minutes(1),
        }
    }
    Err(BookingError::InvalidSchedule(format!(
        "{} does not exist in the local time zone",
        wall_clock
    )))
}

/// Suggested start of the next screening: end of this one plus the cleaning gap,
/// optionally rounded up to a 5 or 10 minute boundary. Rounding only ever moves
/// the time later; 24:00 rolls over to 00:00 of the next day.
pub fn next_slot(
    current_start: NaiveDateTime,
    movie_length_minutes: i64,
    gap: Duration,
    rounding: Rounding,
) -> Result<NaiveDateTime, BookingError> {
    let out_of_range = || BookingError::InvalidSchedule(format!("next slot after {} is out of range", current_start));

    let unrounded = Duration::try_minutes(movie_length_minutes)
        .and_then(|length| length.checked_add(&gap))
        .and_then(|offset| current_start.checked_add_signed(offset))
        .ok_or_else(out_of_range)?;

    let Some(step) = rounding.step_minutes() else {
        return Ok(unrounded);
    };

    let step_seconds = step * 60;
    let second_of_day = i64::from(unrounded.time().num_seconds_from_midnight());
    let rounded = (second_of_day + step_seconds - 1) / step_seconds * step_seconds;

    unrounded
        .date()
        .and_time(NaiveTime::MIN)
        .checked_add_signed(Duration::seconds(rounded))
        .ok_or_else(out_of_range)
}

/// Parses a cleaning gap written as "HH:MM", at most 24:00.
pub fn parse_gap(raw: &str) -> Result<Duration, BookingError> {
    let invalid = || BookingError::InvalidSchedule(format!("gap '{}' must look like HH:MM", raw));

    let (hours, minutes) = raw.trim().split_once(':').ok_or_else(invalid)?;
    let hours: i64 = hours.parse().map_err(|_| invalid())?;
    let minutes: i64 = minutes.parse().map_err(|_| invalid())?;
    if hours < 0 || !(0..60).contains(&minutes) {
        return Err(invalid());
    }

    let total = hours
        .checked_mul(60)
        .and_then(|m| m.checked_add(minutes))
        .filter(|m| *m <= MAX_GAP_MINUTES)
        .ok_or_else(|| BookingError::InvalidSchedule(format!("gap '{}' is longer than 24:00", raw)))?;
    Ok(Duration::minutes(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, Utc};
    use chrono_tz::Europe::Berlin;

    fn at(date: (i32, u32, u32), hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn three_daily_repeats_keep_wall_clock() {
        let first = Utc.from_utc_datetime(&at((2024, 3, 30), 18, 0));
        let starts = daily_start_times(&first, 3).unwrap();

        assert_eq!(starts.len(), 3);
        for (i, start) in starts.iter().enumerate() {
            assert_eq!(start.time(), NaiveTime::from_hms_opt(18, 0, 0).unwrap());
            assert_eq!(start.date_naive(), first.date_naive() + Days::new(i as u64));
        }
    }

    #[test]
    fn repeats_use_offset_wall_clock() {
        let ist = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        let first = ist.from_local_datetime(&at((2024, 12, 31), 21, 30)).unwrap();
        let starts = daily_start_times(&first, 2).unwrap();
        assert_eq!(starts[1].naive_local(), at((2025, 1, 1), 21, 30));
    }

    #[test]
    fn repeat_bounds() {
        let first = Utc::now();
        assert!(daily_start_times(&first, 0).is_err());
        assert!(daily_start_times(&first, 32).is_err());
        assert_eq!(daily_start_times(&first, 31).unwrap().len(), 31);
    }

    #[test]
    fn next_slot_already_on_boundary() {
        let next = next_slot(at((2024, 5, 1), 18, 0), 125, Duration::minutes(10), Rounding::Round5).unwrap();
        assert_eq!(next, at((2024, 5, 1), 20, 15));
    }

    #[test]
    fn next_slot_rounds_up() {
        let start = at((2024, 5, 1), 18, 7);
        assert_eq!(
            next_slot(start, 125, Duration::minutes(10), Rounding::None).unwrap(),
            at((2024, 5, 1), 20, 22)
        );
        assert_eq!(
            next_slot(start, 125, Duration::minutes(10), Rounding::Round5).unwrap(),
            at((2024, 5, 1), 20, 25)
        );
        assert_eq!(
            next_slot(start, 125, Duration::minutes(10), Rounding::Round10).unwrap(),
            at((2024, 5, 1), 20, 30)
        );
    }

    #[test]
    fn next_slot_carries_past_midnight() {
        let next = next_slot(at((2024, 5, 1), 21, 48), 120, Duration::minutes(10), Rounding::Round10).unwrap();
        // 23:58 rounds to 24:00
        assert_eq!(next, at((2024, 5, 2), 0, 0));
    }

    #[test]
    fn rounding_never_moves_earlier() {
        let start = at((2024, 5, 1), 10, 0);
        for length in 60..200 {
            for rounding in [Rounding::None, Rounding::Round5, Rounding::Round10] {
                let unrounded = next_slot(start, length, Duration::minutes(15), Rounding::None).unwrap();
                assert!(next_slot(start, length, Duration::minutes(15), rounding).unwrap() >= unrounded);
            }
        }
    }

    #[test]
    fn gap_parsing() {
        assert_eq!(parse_gap("00:10").unwrap(), Duration::minutes(10));
        assert_eq!(parse_gap("1:05").unwrap(), Duration::minutes(65));
        assert!(parse_gap("10").is_err());
        assert!(parse_gap("00:75").is_err());
        assert!(parse_gap("aa:bb").is_err());
        assert_eq!(parse_gap("24:00").unwrap(), Duration::hours(24));
        assert!(parse_gap("24:01").is_err());
    }

    #[test]
    fn oversized_gaps_are_errors() {
        for raw in ["200000000000:00", "9223372036854775807:00"] {
            assert!(matches!(parse_gap(raw), Err(BookingError::InvalidSchedule(_))), "gap {}", raw);
        }
    }

    #[test]
    fn next_slot_at_the_end_of_time_is_an_error() {
        let result = next_slot(NaiveDateTime::MAX, 120, Duration::minutes(10), Rounding::Round5);
        assert!(matches!(result, Err(BookingError::InvalidSchedule(_))));
    }

    #[test]
    fn spring_forward_gap_moves_to_first_valid_minute() {
        // Berlin skips 02:00-03:00 on 2024-03-31
        let first = Berlin.with_ymd_and_hms(2024, 3, 30, 2, 30, 0).unwrap();
        let starts = daily_start_times(&first, 2).unwrap();

        assert_eq!(starts[0].naive_local(), at((2024, 3, 30), 2, 30));
        assert_eq!(starts[1].naive_local(), at((2024, 3, 31), 3, 0));
        assert_eq!(starts[1].naive_utc(), at((2024, 3, 31), 1, 0));
    }

    #[test]
    fn fall_back_fold_takes_the_earlier_instant() {
        // Berlin repeats 02:00-03:00 on 2024-10-27
        let first = Berlin.with_ymd_and_hms(2024, 10, 26, 2, 30, 0).unwrap();
        let starts = daily_start_times(&first, 2).unwrap();

        assert_eq!(starts[1].naive_local(), at((2024, 10, 27), 2, 30));
        // still on CEST, UTC+2
        assert_eq!(starts[1].naive_utc(), at((2024, 10, 27), 0, 30));
        assert_eq!(starts[1] - starts[0], Duration::hours(24));
    }
}
