//! Service-day time handling for GTFS schedules.
//!
//! GTFS stop times are written as "HH:MM:SS" measured from the start of
//! the service day, and may run past "24:00:00" for trips that cross
//! midnight. A `ServiceTime` only becomes a wall-clock instant once it is
//! paired with a service date and the agency time zone.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;

/// A wall-clock instant in the agency time zone.
pub type LocalTime = DateTime<Tz>;

/// Error returned when parsing an invalid time or date string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time: {reason}")]
pub struct TimeError {
    reason: &'static str,
}

impl TimeError {
    fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

/// Seconds after the start of a GTFS service day.
///
/// # Examples
///
/// ```
/// use rail_arrivals::domain::ServiceTime;
///
/// let t = ServiceTime::parse("22:30:00").unwrap();
/// assert_eq!(t.to_string(), "22:30:00");
///
/// // Times past midnight stay on the same service day
/// let late = ServiceTime::parse("25:10:00").unwrap();
/// assert!(late > t);
///
/// assert!(ServiceTime::parse("22:30").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceTime(u32);

impl ServiceTime {
    /// Create from a number of seconds after the start of the service day.
    pub fn from_secs(secs: u32) -> Self {
        Self(secs)
    }

    /// Create from hours, minutes and seconds.
    pub fn from_hms(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self(hours * 3600 + minutes * 60 + seconds)
    }

    /// Parse a GTFS "H:MM:SS" or "HH:MM:SS" time.
    ///
    /// Hours may exceed 23. Surrounding whitespace is ignored because some
    /// feeds pad single-digit hours with a space.
    pub fn parse(s: &str) -> Result<Self, TimeError> {
        let mut parts = s.trim().split(':');
        let (Some(h), Some(m), Some(sec), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TimeError::new("expected H:MM:SS format"));
        };

        if h.is_empty() || m.len() != 2 || sec.len() != 2 {
            return Err(TimeError::new("expected H:MM:SS format"));
        }

        let hours: u32 = h.parse().map_err(|_| TimeError::new("invalid hour digits"))?;
        let minutes: u32 = m
            .parse()
            .map_err(|_| TimeError::new("invalid minute digits"))?;
        let seconds: u32 = sec
            .parse()
            .map_err(|_| TimeError::new("invalid second digits"))?;

        if minutes > 59 {
            return Err(TimeError::new("minute must be 0-59"));
        }
        if seconds > 59 {
            return Err(TimeError::new("second must be 0-59"));
        }
        if hours > 47 {
            return Err(TimeError::new("hour must be 0-47"));
        }

        Ok(Self::from_hms(hours, minutes, seconds))
    }

    /// Seconds after the start of the service day.
    pub fn as_secs(&self) -> u32 {
        self.0
    }

    /// Resolve to a wall-clock instant on the given service day.
    ///
    /// GTFS measures service time from "noon minus 12 hours", which differs
    /// from midnight on daylight-saving transition days.
    pub fn on(&self, service_date: NaiveDate, tz: Tz) -> Option<LocalTime> {
        let noon = service_date.and_time(NaiveTime::from_hms_opt(12, 0, 0)?);
        let noon = tz.from_local_datetime(&noon).earliest()?;
        let start = noon - Duration::hours(12);
        start.checked_add_signed(Duration::seconds(i64::from(self.0)))
    }
}

impl fmt::Display for ServiceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.0 / 3600,
            (self.0 % 3600) / 60,
            self.0 % 60
        )
    }
}

/// Parse a GTFS date in "YYYYMMDD" format.
///
/// # Examples
///
/// ```
/// use rail_arrivals::domain::parse_service_date;
/// use chrono::NaiveDate;
///
/// assert_eq!(
///     parse_service_date("20240315").unwrap(),
///     NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
/// );
/// assert!(parse_service_date("2024-03-15").is_err());
/// ```
pub fn parse_service_date(s: &str) -> Result<NaiveDate, TimeError> {
    let s = s.trim();
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TimeError::new("expected YYYYMMDD format"));
    }
    NaiveDate::parse_from_str(s, "%Y%m%d").map_err(|_| TimeError::new("invalid calendar date"))
}

/// Format an instant as "HH:MM" in its own time zone.
pub fn clock(t: &LocalTime) -> String {
    t.format("%H:%M").to_string()
}
