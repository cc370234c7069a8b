//! The YouTube Analytics API: report parameters, the client, and report exports.

pub mod client;
pub mod params;
pub mod report;
