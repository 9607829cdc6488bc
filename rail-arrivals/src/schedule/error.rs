//! Static schedule error types.

use crate::domain::TimeError;

/// Errors that can occur while fetching or indexing the static schedule.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// HTTP request for the archive failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Archive server returned an error status
    #[error("schedule download returned status {status}")]
    Status { status: u16 },

    /// The archive could not be opened or read
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A required table is absent from the archive
    #[error("archive is missing {0}")]
    MissingTable(&'static str),

    /// A table could not be read as CSV
    #[error("failed to parse {table}: {source}")]
    Csv {
        table: &'static str,
        #[source]
        source: csv::Error,
    },

    /// A stop time or calendar date could not be parsed
    #[error("invalid time {value:?} in {table}: {source}")]
    InvalidTime {
        table: &'static str,
        value: String,
        #[source]
        source: TimeError,
    },

    /// Reading an archive member failed
    #[error("I/O error reading {table}: {source}")]
    Io {
        table: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A refresh failed while an earlier snapshot is still being served
    #[error("static schedule is stale: {0}")]
    Stale(#[source] Box<ScheduleError>),
}

impl ScheduleError {
    /// Returns true if this failure left a previous snapshot in service.
    pub fn is_stale(&self) -> bool {
        matches!(self, ScheduleError::Stale(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ScheduleError::MissingTable("stop_times.txt");
        assert_eq!(err.to_string(), "archive is missing stop_times.txt");

        let err = ScheduleError::Status { status: 503 };
        assert_eq!(err.to_string(), "schedule download returned status 503");

        let err = ScheduleError::Stale(Box::new(ScheduleError::Status { status: 500 }));
        assert!(err.is_stale());
        assert!(err.to_string().contains("stale"));
    }
}
