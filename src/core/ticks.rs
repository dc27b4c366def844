//! ADV time domain.
//!
//! Timestamps are fixed-point tick counts since the ADV domain zero,
//! 2010-01-01T00:00:00Z. One tick is 100 microseconds, so a second holds
//! [`TICKS_PER_SECOND`] ticks. Calendar arithmetic is delegated to the
//! `time` crate.

use std::fmt;

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

use crate::util::{Error, Result};

/// Tick count since the domain zero.
pub type Ticks = i64;

/// Ticks in one second.
pub const TICKS_PER_SECOND: i64 = 10_000;

/// Microseconds in one tick.
pub const MICROS_PER_TICK: i64 = 100;

/// Unix timestamp of the domain zero (2010-01-01T00:00:00Z).
pub const DOMAIN_ZERO_UNIX_SECONDS: i64 = 1_262_304_000;

/// Broken-down UTC calendar time with tick resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CalendarTime {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Sub-second part in ticks (0..=9999).
    pub sub_second: u16,
}

impl CalendarTime {
    /// Create calendar fields without validation.
    pub fn new(year: i32, month: u8, day: u8, hour: u8, minute: u8, second: u8, sub_second: u16) -> Self {
        Self { year, month, day, hour, minute, second, sub_second }
    }

    /// Convert to ticks, see [`to_ticks`].
    pub fn to_ticks(&self) -> Result<Ticks> {
        to_ticks(
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.sub_second,
        )
    }
}

impl fmt::Display for CalendarTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:04}Z",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.sub_second
        )
    }
}

/// Convert UTC calendar fields to ticks.
///
/// `sub_second` is in ticks. Fails with [`Error::Range`] when any field is
/// outside its calendar range (including invalid days such as Feb 30).
pub fn to_ticks(
    year: i32,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    sub_second: u16,
) -> Result<Ticks> {
    if i64::from(sub_second) >= TICKS_PER_SECOND {
        return Err(Error::range(format!("sub-second {} exceeds {}", sub_second, TICKS_PER_SECOND - 1)));
    }
    let month = Month::try_from(month).map_err(|e| Error::range(e.to_string()))?;
    let date = Date::from_calendar_date(year, month, day).map_err(|e| Error::range(e.to_string()))?;
    let time = Time::from_hms(hour, minute, second).map_err(|e| Error::range(e.to_string()))?;

    let unix = PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp();
    Ok((unix - DOMAIN_ZERO_UNIX_SECONDS) * TICKS_PER_SECOND + i64::from(sub_second))
}

/// Convert ticks back to UTC calendar fields.
///
/// Exact inverse of [`to_ticks`]. Fails only when the tick value lies outside
/// the calendar range supported by `time`.
pub fn from_ticks(ticks: Ticks) -> Result<CalendarTime> {
    let seconds = ticks.div_euclid(TICKS_PER_SECOND);
    let sub_second = ticks.rem_euclid(TICKS_PER_SECOND) as u16;

    let unix = seconds
        .checked_add(DOMAIN_ZERO_UNIX_SECONDS)
        .ok_or_else(|| Error::range(format!("tick value {} overflows", ticks)))?;
    let dt = OffsetDateTime::from_unix_timestamp(unix).map_err(|e| Error::range(e.to_string()))?;

    Ok(CalendarTime {
        year: dt.year(),
        month: u8::from(dt.month()),
        day: dt.day(),
        hour: dt.hour(),
        minute: dt.minute(),
        second: dt.second(),
        sub_second,
    })
}

/// Convert a high-resolution Unix time (seconds + microseconds) to ticks.
///
/// Microseconds are floored to whole ticks.
pub fn from_high_res_system_time(seconds: i64, microseconds: u32) -> Result<Ticks> {
    if microseconds >= 1_000_000 {
        return Err(Error::range(format!("microseconds {} exceeds 999999", microseconds)));
    }
    seconds
        .checked_sub(DOMAIN_ZERO_UNIX_SECONDS)
        .and_then(|s| s.checked_mul(TICKS_PER_SECOND))
        .and_then(|t| t.checked_add(i64::from(microseconds) / MICROS_PER_TICK))
        .ok_or_else(|| Error::range(format!("unix time {} overflows tick range", seconds)))
}

/// Current system time in ticks.
pub fn now_ticks() -> Ticks {
    let now = OffsetDateTime::now_utc();
    (now.unix_timestamp() - DOMAIN_ZERO_UNIX_SECONDS) * TICKS_PER_SECOND
        + i64::from(now.microsecond()) / MICROS_PER_TICK
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_domain_zero() {
        assert_eq!(to_ticks(2010, 1, 1, 0, 0, 0, 0).unwrap(), 0);
        assert_eq!(from_ticks(0).unwrap(), CalendarTime::new(2010, 1, 1, 0, 0, 0, 0));
    }

    #[test]
    fn test_known_instant() {
        // 2012-02-29T12:30:15.1234 is a leap day
        let ticks = to_ticks(2012, 2, 29, 12, 30, 15, 1234).unwrap();
        let expected_days = 365 + 365 + 31 + 28;
        let expected = (expected_days * 86_400 + 12 * 3600 + 30 * 60 + 15) * TICKS_PER_SECOND + 1234;
        assert_eq!(ticks, expected);
        assert_eq!(from_ticks(ticks).unwrap().to_string(), "2012-02-29T12:30:15.1234Z");
    }

    #[test]
    fn test_before_domain_zero() {
        let ticks = to_ticks(2009, 12, 31, 23, 59, 59, 9999).unwrap();
        assert_eq!(ticks, -1);
        assert_eq!(from_ticks(-1).unwrap(), CalendarTime::new(2009, 12, 31, 23, 59, 59, 9999));
    }

    #[test]
    fn test_out_of_range_fields() {
        assert!(matches!(to_ticks(2011, 2, 29, 0, 0, 0, 0), Err(Error::Range(_))));
        assert!(matches!(to_ticks(2011, 13, 1, 0, 0, 0, 0), Err(Error::Range(_))));
        assert!(matches!(to_ticks(2011, 0, 1, 0, 0, 0, 0), Err(Error::Range(_))));
        assert!(matches!(to_ticks(2011, 1, 1, 24, 0, 0, 0), Err(Error::Range(_))));
        assert!(matches!(to_ticks(2011, 1, 1, 0, 60, 0, 0), Err(Error::Range(_))));
        assert!(matches!(to_ticks(2011, 1, 1, 0, 0, 60, 0), Err(Error::Range(_))));
        assert!(matches!(to_ticks(2011, 1, 1, 0, 0, 0, 10_000), Err(Error::Range(_))));
    }

    #[test]
    fn test_from_ticks_overflow() {
        assert!(matches!(from_ticks(i64::MAX), Err(Error::Range(_))));
    }

    #[test]
    fn test_high_res_system_time() {
        let ticks = from_high_res_system_time(DOMAIN_ZERO_UNIX_SECONDS + 2, 123_456).unwrap();
        assert_eq!(ticks, 2 * TICKS_PER_SECOND + 1234);
        assert!(from_high_res_system_time(0, 1_000_000).is_err());
    }

    #[test]
    fn test_now_is_after_domain_zero() {
        assert!(now_ticks() > 0);
    }

    proptest! {
        #[test]
        fn prop_calendar_round_trip(
            year in 1900i32..2200,
            month in 1u8..=12,
            day in 1u8..=31,
            hour in 0u8..24,
            minute in 0u8..60,
            second in 0u8..60,
            sub in 0u16..10_000,
        ) {
            // Invalid days (e.g. April 31) are range errors, everything else round-trips.
            if let Ok(ticks) = to_ticks(year, month, day, hour, minute, second, sub) {
                let back = from_ticks(ticks).unwrap();
                prop_assert_eq!(back, CalendarTime::new(year, month, day, hour, minute, second, sub));
            } else {
                prop_assert!(day > 28);
            }
        }

        #[test]
        fn prop_ticks_round_trip(ticks in -3_000_000_000_000i64..6_000_000_000_000) {
            let fields = from_ticks(ticks).unwrap();
            prop_assert_eq!(fields.to_ticks().unwrap(), ticks);
        }
    }
}
