//! Error conditions callers may want to branch on.
//!
//! Operations in this crate return [`eyre::Result`]. When one of the conditions below is the
//! root cause, it can be recovered with [`eyre::Report::downcast_ref`]:
//!
//! ```no_run
//! # fn f(report: eyre::Report) {
//! use youtube_analytics::AnalyticsError;
//! if let Some(AnalyticsError::InsufficientScope { missing }) = report.downcast_ref::<AnalyticsError>() {
//!     eprintln!("re-run `yt-analytics auth`, missing: {missing:?}");
//! }
//! # }
//! ```

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsError {
    /// The user token was not granted every scope the client was asked to require.
    InsufficientScope {
        /// Full scope URLs that were requested but not granted.
        missing: Vec<String>,
    },
    /// The decoded report response lacks a field every report carries.
    MalformedResponse { field: &'static str },
    /// The API answered with a non-success status.
    Http {
        status: reqwest::StatusCode,
        /// The raw response body, passed through uninterpreted.
        body: String,
    },
}

impl fmt::Display for AnalyticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientScope { missing } => {
                write!(f, "token lacks required scope(s): {}", missing.join(" "))
            }
            Self::MalformedResponse { field } => {
                write!(f, "report response is missing `{field}`")
            }
            Self::Http { status, body } => {
                write!(f, "YouTube Analytics API request failed with status {status}: {body}")
            }
        }
    }
}

impl std::error::Error for AnalyticsError {}
