//! Report query parameters: metrics, dimensions, filters and the date range.

use indexmap::IndexMap;
use jiff::civil::Date;
use std::fmt;
use std::str::FromStr;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $key:literal {
            $($(#[$vmeta:meta])* $variant:ident => $wire:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// The query parameter this value is sent under.
            pub const PARAM: &'static str = $key;

            /// The value's name on the wire.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = eyre::Report;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| eyre::eyre!(concat!("unknown ", $key, " value: {}"), s))
            }
        }
    };
}

wire_enum! {
    /// A measured quantity within a report.
    ///
    /// See: <https://developers.google.com/youtube/analytics/metrics>
    Metric, "metrics" {
        Views => "views",
        Likes => "likes",
        Dislikes => "dislikes",
        /// Minutes watched, as estimated by YouTube.
        WatchTime => "estimatedMinutesWatched",
        SubsGained => "subscribersGained",
        SubsLost => "subscribersLost",
        Comments => "comments",
        Shares => "shares",
        /// Average playback length in seconds.
        AverageViewDuration => "averageViewDuration",
    }
}

wire_enum! {
    /// A grouping axis for a report.
    ///
    /// See: <https://developers.google.com/youtube/analytics/dimensions>
    Dimension, "dimensions" {
        Day => "day",
        Month => "month",
        Country => "country",
        Video => "video",
        DeviceType => "deviceType",
        TrafficSource => "insightTrafficSourceType",
    }
}

/// Report filters, serialized as `key==value` pairs joined by `;` in insertion order.
///
/// Keys are unique; inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters(IndexMap<String, String>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl fmt::Display) -> &mut Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    /// Builder-style [`Self::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.insert(key, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Filters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.iter().enumerate() {
            if i != 0 {
                f.write_str(";")?;
            }
            write!(f, "{key}=={value}")?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: fmt::Display> FromIterator<(K, V)> for Filters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut filters = Self::new();
        for (k, v) in iter {
            filters.insert(k, v);
        }
        filters
    }
}

/// The end date to send for a report.
///
/// Monthly reports must end on the first day of a month, so the end date is moved to the first
/// day of the month following `end`'s month. Every other dimension sends `end` as given.
pub fn report_end_date(end: Date, dimension: Dimension) -> eyre::Result<Date> {
    if dimension != Dimension::Month {
        return Ok(end);
    }
    let normalized = end
        .last_of_month()
        .tomorrow()
        .map_err(|e| eyre::eyre!("no month follows {end}: {e}"))?;
    tracing::debug!(%end, %normalized, "moved monthly report end date to first of next month");
    Ok(normalized)
}

/// One `reports.query` request, ready to be turned into query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportQuery {
    pub channel_id: String,
    pub start_date: Date,
    /// Already normalized with [`report_end_date`].
    pub end_date: Date,
    pub metrics: Vec<Metric>,
    pub dimension: Dimension,
    pub filters: Option<Filters>,
}

impl ReportQuery {
    /// Builds a query, applying the end date rules for `dimension`.
    pub fn new(
        channel_id: impl Into<String>,
        since: Date,
        end_date: Date,
        metrics: &[Metric],
        dimension: Dimension,
        filters: Option<Filters>,
    ) -> eyre::Result<Self> {
        eyre::ensure!(!metrics.is_empty(), "a report needs at least one metric");
        Ok(Self {
            channel_id: channel_id.into(),
            start_date: since,
            end_date: report_end_date(end_date, dimension)?,
            metrics: metrics.to_vec(),
            dimension,
            filters,
        })
    }

    /// The query parameters, in the order they are sent.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("startDate", self.start_date.to_string()),
            ("endDate", self.end_date.to_string()),
            ("ids", format!("channel=={}", self.channel_id)),
            (Metric::PARAM, join(&self.metrics)),
        ];
        if let Some(filters) = self.filters.as_ref().filter(|f| !f.is_empty()) {
            params.push(("filters", filters.to_string()));
        }
        params.push((Dimension::PARAM, self.dimension.to_string()));
        params
    }

    pub fn param(&self, key: &str) -> Option<String> {
        self.to_params()
            .into_iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }
}

fn join(metrics: &[Metric]) -> String {
    metrics
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::civil::date;
    use pretty_assertions::assert_eq;

    #[test]
    fn day_end_date_untouched() {
        assert_eq!(
            report_end_date(date(2023, 3, 15), Dimension::Day).unwrap(),
            date(2023, 3, 15)
        );
    }

    #[test]
    fn month_end_date_moves_to_next_month() {
        assert_eq!(
            report_end_date(date(2023, 3, 15), Dimension::Month).unwrap(),
            date(2023, 4, 1)
        );
        assert_eq!(
            report_end_date(date(2023, 3, 1), Dimension::Month).unwrap(),
            date(2023, 4, 1)
        );
        assert_eq!(
            report_end_date(date(2023, 12, 31), Dimension::Month).unwrap(),
            date(2024, 1, 1)
        );
        assert_eq!(
            report_end_date(date(2024, 2, 29), Dimension::Month).unwrap(),
            date(2024, 3, 1)
        );
    }

    #[test]
    fn single_filter() {
        let filters = Filters::new().with("video", "abc123");
        assert_eq!(filters.to_string(), "video==abc123");
    }

    #[test]
    fn filters_keep_insertion_order() {
        let filters = Filters::new().with("video", "abc").with("country", "US");
        assert_eq!(filters.to_string(), "video==abc;country==US");

        let filters: Filters = [("country", "US"), ("video", "abc")].into_iter().collect();
        assert_eq!(filters.to_string(), "country==US;video==abc");
    }

    #[test]
    fn filters_replace_in_place() {
        let filters = Filters::new()
            .with("video", "abc")
            .with("country", "US")
            .with("video", 42);
        assert_eq!(filters.len(), 2);
        assert_eq!(filters.to_string(), "video==42;country==US");
    }

    #[test]
    fn params_in_order() {
        let query = ReportQuery::new(
            "UC123",
            date(2023, 1, 1),
            date(2023, 1, 31),
            &[Metric::Views, Metric::WatchTime],
            Dimension::Day,
            Some(Filters::new().with("country", "US")),
        )
        .unwrap();
        assert_eq!(
            query.to_params(),
            vec![
                ("startDate", "2023-01-01".to_string()),
                ("endDate", "2023-01-31".to_string()),
                ("ids", "channel==UC123".to_string()),
                ("metrics", "views,estimatedMinutesWatched".to_string()),
                ("filters", "country==US".to_string()),
                ("dimensions", "day".to_string()),
            ]
        );
    }

    #[test]
    fn empty_filters_are_omitted() {
        let query = ReportQuery::new(
            "UC123",
            date(2023, 1, 1),
            date(2023, 3, 15),
            &[Metric::Likes],
            Dimension::Month,
            Some(Filters::new()),
        )
        .unwrap();
        assert_eq!(query.param("filters"), None);
        assert_eq!(query.param("endDate").as_deref(), Some("2023-04-01"));
        assert_eq!(query.param("dimensions").as_deref(), Some("month"));
    }

    #[test]
    fn dimension_always_sent_last() {
        let query = ReportQuery::new(
            "UC123",
            date(2023, 1, 1),
            date(2023, 1, 31),
            &[Metric::Views],
            Dimension::Country,
            None,
        )
        .unwrap();
        let params = query.to_params();
        assert_eq!(params.len(), 5);
        assert_eq!(params.last(), Some(&("dimensions", "country".to_string())));
    }

    #[test]
    fn metrics_required() {
        assert!(
            ReportQuery::new("c", date(2023, 1, 1), date(2023, 1, 2), &[], Dimension::Day, None)
                .is_err()
        );
    }

    #[test]
    fn wire_names_parse_back() {
        for metric in Metric::ALL {
            assert_eq!(metric.as_str().parse::<Metric>().unwrap(), *metric);
        }
        for dimension in Dimension::ALL {
            assert_eq!(dimension.to_string().parse::<Dimension>().unwrap(), *dimension);
        }
        assert!("7DayTotals".parse::<Dimension>().is_err());
    }
}
