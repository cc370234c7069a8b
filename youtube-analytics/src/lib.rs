//! A client for YouTube Analytics reports.
//!
//! [`YouTubeAnalytics`] turns a date range, metrics, a dimension and optional filters into a
//! `reports.query` request for one channel and returns the table as a [`QueryResult`], which
//! can be saved as JSON or as spreadsheet-friendly CSV.
//!
//! ```no_run
//! # async fn run() -> eyre::Result<()> {
//! use jiff::civil::date;
//! use youtube_analytics::{Dimension, Metric, YouTubeAnalytics};
//!
//! let yt = YouTubeAnalytics::new("UC...", "client_secret.json", "token.json", None)?;
//! let report = yt
//!     .query(date(2023, 1, 1), &[Metric::Views], Dimension::Day, None, None)
//!     .await?;
//! report.save_as_csv("views.csv")?;
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod error;
pub mod oauth;
pub mod scopes;

pub use analytics::client::{AppSource, BASE_URL, UserSource, YouTubeAnalytics};
pub use analytics::params::{Dimension, Filters, Metric, ReportQuery};
pub use analytics::report::{ColumnHeader, QueryResult};
pub use error::AnalyticsError;
pub use scopes::Scope;
