//! Service calendars (calendar.txt and calendar_dates.txt).

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};

/// A weekly service pattern with a validity range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyService {
    /// Monday first.
    pub days: [bool; 7],
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// A single-date exception to the weekly pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceException {
    Added,
    Removed,
}

/// Answers "does service X run on date D".
#[derive(Debug, Clone, Default)]
pub struct ServiceCalendar {
    weekly: HashMap<String, WeeklyService>,
    exceptions: HashMap<String, Vec<(NaiveDate, ServiceException)>>,
}

impl ServiceCalendar {
    pub fn new(
        weekly: HashMap<String, WeeklyService>,
        exceptions: HashMap<String, Vec<(NaiveDate, ServiceException)>>,
    ) -> Self {
        Self { weekly, exceptions }
    }

    /// Returns true if the archive carried no calendar data at all.
    pub fn is_empty(&self) -> bool {
        self.weekly.is_empty() && self.exceptions.is_empty()
    }

    /// Check whether `service_id` runs on `date`.
    ///
    /// Exceptions override the weekly pattern. An archive without any
    /// calendar tables is treated as running every service every day.
    pub fn is_active(&self, service_id: &str, date: NaiveDate) -> bool {
        if self.is_empty() {
            return true;
        }

        if let Some(exceptions) = self.exceptions.get(service_id)
            && let Some((_, kind)) = exceptions.iter().find(|(d, _)| *d == date)
        {
            return *kind == ServiceException::Added;
        }

        self.weekly.get(service_id).is_some_and(|w| {
            date >= w.start_date
                && date <= w.end_date
                && w.days[date.weekday().num_days_from_monday() as usize]
        })
    }
}
