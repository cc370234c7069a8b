//! OAuth 2.0 scopes understood by the YouTube Analytics API.

use crate::error::AnalyticsError;
use std::fmt;
use std::str::FromStr;

const SCOPE_PREFIX: &str = "https://www.googleapis.com/auth/";

/// An authorization scope granting access to a category of YouTube data.
///
/// See: <https://developers.google.com/youtube/analytics/reference/reports/query#auth>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// View YouTube Analytics reports.
    Analytics,
    /// View monetary and non-monetary YouTube Analytics reports.
    Monetary,
    /// Manage the YouTube account.
    YouTube,
    /// View and manage assets and associated content on YouTube.
    YouTubePartner,
    /// View the YouTube account.
    YouTubeReadOnly,
}

impl Scope {
    pub const ALL: [Scope; 5] = [
        Scope::Analytics,
        Scope::Monetary,
        Scope::YouTube,
        Scope::YouTubePartner,
        Scope::YouTubeReadOnly,
    ];

    /// Scopes requested when the caller does not ask for anything specific.
    pub const DEFAULT: [Scope; 3] = [Scope::Analytics, Scope::Monetary, Scope::YouTubeReadOnly];

    /// The short name, i.e. the part after `https://www.googleapis.com/auth/`.
    pub const fn name(self) -> &'static str {
        match self {
            Scope::Analytics => "yt-analytics.readonly",
            Scope::Monetary => "yt-analytics-monetary.readonly",
            Scope::YouTube => "youtube",
            Scope::YouTubePartner => "youtubepartner",
            Scope::YouTubeReadOnly => "youtube.readonly",
        }
    }

    pub fn url(self) -> String {
        format!("{SCOPE_PREFIX}{}", self.name())
    }

    pub fn to_oauth(self) -> oauth2::Scope {
        oauth2::Scope::new(self.url())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(SCOPE_PREFIX)?;
        f.write_str(self.name())
    }
}

impl FromStr for Scope {
    type Err = eyre::Report;

    /// Accepts either the short name (`youtube.readonly`) or the full scope URL.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix(SCOPE_PREFIX).unwrap_or(s);
        Scope::ALL
            .into_iter()
            .find(|scope| scope.name() == name)
            .ok_or_else(|| eyre::eyre!("unknown YouTube Analytics scope: {s}"))
    }
}

/// Joins scopes the way Google presents them in a single `scope` string.
pub fn join(scopes: &[Scope]) -> String {
    scopes
        .iter()
        .map(|s| s.url())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Checks that `granted` covers every scope in `requested`.
///
/// Fails with [`AnalyticsError::InsufficientScope`] listing what is missing.
pub fn verify(granted: &[oauth2::Scope], requested: &[Scope]) -> Result<(), AnalyticsError> {
    let missing: Vec<String> = requested
        .iter()
        .map(|scope| scope.url())
        .filter(|url| !granted.iter().any(|g| **g == *url))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AnalyticsError::InsufficientScope { missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn granted(scopes: &[Scope]) -> Vec<oauth2::Scope> {
        scopes.iter().map(|s| s.to_oauth()).collect()
    }

    #[test]
    fn default_scopes_joined() {
        assert_eq!(
            join(&Scope::DEFAULT),
            "https://www.googleapis.com/auth/yt-analytics.readonly \
             https://www.googleapis.com/auth/yt-analytics-monetary.readonly \
             https://www.googleapis.com/auth/youtube.readonly"
        );
    }

    #[test]
    fn parse_short_and_full_names() {
        assert_eq!("youtube".parse::<Scope>().unwrap(), Scope::YouTube);
        assert_eq!(
            "https://www.googleapis.com/auth/youtubepartner"
                .parse::<Scope>()
                .unwrap(),
            Scope::YouTubePartner
        );
        assert!("youtube.force-ssl".parse::<Scope>().is_err());
    }

    #[test]
    fn superset_is_accepted() {
        let all = granted(&Scope::ALL);
        assert_eq!(verify(&all, &Scope::DEFAULT), Ok(()));
    }

    #[test]
    fn narrower_grant_reports_missing() {
        let only_analytics = granted(&[Scope::Analytics]);
        assert_eq!(
            verify(&only_analytics, &Scope::DEFAULT),
            Err(AnalyticsError::InsufficientScope {
                missing: vec![Scope::Monetary.url(), Scope::YouTubeReadOnly.url()],
            })
        );
    }

    #[test]
    fn nothing_granted() {
        assert!(verify(&[], &[Scope::Analytics]).is_err());
        assert_eq!(verify(&[], &[]), Ok(()));
    }
}
