//! GTFS archive unpacking and table parsing.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::{RouteId, ServiceTime, StopId, TripId, parse_service_date};

use super::calendar::{ServiceCalendar, ServiceException, WeeklyService};
use super::error::ScheduleError;
use super::snapshot::ScheduleSnapshot;
use super::types::{Route, ScheduledStopTime, ScheduledTrip, Stop};

const STOPS: &str = "stops.txt";
const ROUTES: &str = "routes.txt";
const TRIPS: &str = "trips.txt";
const STOP_TIMES: &str = "stop_times.txt";
const CALENDAR: &str = "calendar.txt";
const CALENDAR_DATES: &str = "calendar_dates.txt";

#[derive(Debug, Deserialize)]
struct StopRecord {
    stop_id: String,
    #[serde(default)]
    stop_name: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    stop_lat: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    stop_lon: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RouteRecord {
    route_id: String,
    #[serde(default)]
    route_short_name: Option<String>,
    #[serde(default)]
    route_long_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TripRecord {
    route_id: String,
    service_id: String,
    trip_id: String,
    #[serde(default)]
    trip_headsign: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    direction_id: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct StopTimeRecord {
    trip_id: String,
    #[serde(default)]
    arrival_time: Option<String>,
    #[serde(default)]
    departure_time: Option<String>,
    stop_id: String,
    stop_sequence: u32,
}

#[derive(Debug, Deserialize)]
struct CalendarRecord {
    service_id: String,
    monday: u8,
    tuesday: u8,
    wednesday: u8,
    thursday: u8,
    friday: u8,
    saturday: u8,
    sunday: u8,
    start_date: String,
    end_date: String,
}

#[derive(Debug, Deserialize)]
struct CalendarDateRecord {
    service_id: String,
    date: String,
    exception_type: u8,
}

/// Unpack a GTFS zip archive and build a schedule snapshot from it.
pub fn parse_archive(bytes: &[u8], loaded_at: DateTime<Utc>) -> Result<ScheduleSnapshot, ScheduleError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    let tables = GtfsTables {
        stops: read_required(&mut archive, STOPS)?,
        routes: read_required(&mut archive, ROUTES)?,
        trips: read_required(&mut archive, TRIPS)?,
        stop_times: read_required(&mut archive, STOP_TIMES)?,
        calendar: read_optional(&mut archive, CALENDAR)?,
        calendar_dates: read_optional(&mut archive, CALENDAR_DATES)?,
    };

    tables.build(loaded_at)
}

/// Raw text of the GTFS tables, before parsing.
#[derive(Debug, Default)]
pub struct GtfsTables {
    pub stops: String,
    pub routes: String,
    pub trips: String,
    pub stop_times: String,
    pub calendar: Option<String>,
    pub calendar_dates: Option<String>,
}

impl GtfsTables {
    /// Parse every table and index the result.
    pub fn build(&self, loaded_at: DateTime<Utc>) -> Result<ScheduleSnapshot, ScheduleError> {
        let stops = parse_stops(&self.stops)?;
        let routes = parse_routes(&self.routes)?;
        let mut stop_times = parse_stop_times(&self.stop_times)?;

        let mut trips = Vec::new();
        for record in records::<TripRecord>(&self.trips, TRIPS)? {
            let stop_times = stop_times.remove(record.trip_id.as_str()).unwrap_or_default();
            if stop_times.is_empty() {
                debug!(trip_id = %record.trip_id, "trip has no stop times");
            }
            trips.push(ScheduledTrip {
                id: TripId::new(record.trip_id),
                route_id: RouteId::new(record.route_id),
                service_id: record.service_id,
                headsign: non_empty(record.trip_headsign),
                direction_id: record.direction_id,
                stop_times,
            });
        }

        if !stop_times.is_empty() {
            warn!(
                orphaned = stop_times.len(),
                "stop_times.txt references trips missing from trips.txt"
            );
        }

        let calendar = ServiceCalendar::new(
            match &self.calendar {
                Some(text) => parse_calendar(text)?,
                None => HashMap::new(),
            },
            match &self.calendar_dates {
                Some(text) => parse_calendar_dates(text)?,
                None => HashMap::new(),
            },
        );

        Ok(ScheduleSnapshot::new(stops, routes, trips, calendar, loaded_at))
    }
}

fn read_required<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    table: &'static str,
) -> Result<String, ScheduleError> {
    read_optional(archive, table)?.ok_or(ScheduleError::MissingTable(table))
}

fn read_optional<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    table: &'static str,
) -> Result<Option<String>, ScheduleError> {
    let mut file = match archive.by_name(table) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|source| ScheduleError::Io { table, source })?;

    Ok(Some(content))
}

/// Deserialize every row of a table, tolerating a UTF-8 BOM and padding.
fn records<T: for<'de> Deserialize<'de>>(
    text: &str,
    table: &'static str,
) -> Result<Vec<T>, ScheduleError> {
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|source| ScheduleError::Csv { table, source })
}

fn parse_stops(text: &str) -> Result<Vec<Stop>, ScheduleError> {
    Ok(records::<StopRecord>(text, STOPS)?
        .into_iter()
        .map(|r| Stop {
            name: non_empty(r.stop_name).unwrap_or_else(|| r.stop_id.clone()),
            id: StopId::new(r.stop_id),
            lat: r.stop_lat,
            lon: r.stop_lon,
        })
        .collect())
}

fn parse_routes(text: &str) -> Result<Vec<Route>, ScheduleError> {
    Ok(records::<RouteRecord>(text, ROUTES)?
        .into_iter()
        .map(|r| Route {
            id: RouteId::new(r.route_id),
            short_name: non_empty(r.route_short_name),
            long_name: non_empty(r.route_long_name),
        })
        .collect())
}

fn parse_stop_times(text: &str) -> Result<HashMap<String, Vec<ScheduledStopTime>>, ScheduleError> {
    let mut by_trip: HashMap<String, Vec<ScheduledStopTime>> = HashMap::new();

    for record in records::<StopTimeRecord>(text, STOP_TIMES)? {
        let arrival = parse_optional_time(record.arrival_time)?;
        let departure = parse_optional_time(record.departure_time)?;

        by_trip
            .entry(record.trip_id)
            .or_default()
            .push(ScheduledStopTime {
                stop_id: StopId::new(record.stop_id),
                sequence: record.stop_sequence,
                arrival,
                departure,
            });
    }

    for times in by_trip.values_mut() {
        times.sort_by_key(|st| st.sequence);
    }

    Ok(by_trip)
}

fn parse_optional_time(value: Option<String>) -> Result<Option<ServiceTime>, ScheduleError> {
    match non_empty(value) {
        Some(v) => ServiceTime::parse(&v)
            .map(Some)
            .map_err(|source| ScheduleError::InvalidTime {
                table: STOP_TIMES,
                value: v,
                source,
            }),
        None => Ok(None),
    }
}

fn parse_calendar(text: &str) -> Result<HashMap<String, WeeklyService>, ScheduleError> {
    let mut weekly = HashMap::new();

    for r in records::<CalendarRecord>(text, CALENDAR)? {
        let start_date = calendar_date(&r.start_date, CALENDAR)?;
        let end_date = calendar_date(&r.end_date, CALENDAR)?;
        let days = [
            r.monday, r.tuesday, r.wednesday, r.thursday, r.friday, r.saturday, r.sunday,
        ]
        .map(|d| d == 1);

        weekly.insert(
            r.service_id,
            WeeklyService {
                days,
                start_date,
                end_date,
            },
        );
    }

    Ok(weekly)
}

fn parse_calendar_dates(
    text: &str,
) -> Result<HashMap<String, Vec<(NaiveDate, ServiceException)>>, ScheduleError> {
    let mut exceptions: HashMap<String, Vec<(NaiveDate, ServiceException)>> = HashMap::new();

    for r in records::<CalendarDateRecord>(text, CALENDAR_DATES)? {
        let kind = match r.exception_type {
            1 => ServiceException::Added,
            2 => ServiceException::Removed,
            other => {
                debug!(service_id = %r.service_id, exception_type = other, "ignoring unknown exception type");
                continue;
            }
        };
        let date = calendar_date(&r.date, CALENDAR_DATES)?;
        exceptions.entry(r.service_id).or_default().push((date, kind));
    }

    Ok(exceptions)
}

fn calendar_date(value: &str, table: &'static str) -> Result<NaiveDate, ScheduleError> {
    parse_service_date(value).map_err(|source| ScheduleError::InvalidTime {
        table,
        value: value.to_string(),
        source,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
