//! Fetches Belgian balancing metrics for one day and normalizes them onto a
//! common civil-time axis.
//!
//! Two providers are queried: the Elia open data catalog (system imbalance,
//! ACE, marginal prices and the settlement imbalance price) and TransnetBW's
//! PICASSO cross-border marginal price export. [`Dashboard::fetch_bundle`]
//! returns all three series for a date; [`chart`] turns them into PNG charts.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub mod chart;
pub mod dashboard;
pub mod error;
pub mod fetch;
pub mod normalize;
pub mod table;

pub use dashboard::{Config, Dashboard, GridBundle, Render};
pub use error::{DashboardError, FetchError, ParseError};
pub use fetch::CbmpOutcome;
pub use normalize::{CanonicalRow, NormalizedSeries};
pub use table::RawTable;

/// All series are expressed in this zone, whatever the source encoding.
pub const CIVIL_TIMEZONE: Tz = chrono_tz::Europe::Brussels;

/// Upstream data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Elia open data catalog, CSV exports per dataset.
    Elia,
    /// TransnetBW PICASSO cross-border marginal prices.
    TransnetBw,
}

impl Provider {
    /// Returns the production endpoint for the given provider.
    pub const fn default_endpoint(&self) -> &'static str {
        match self {
            Provider::Elia => "https://opendata.elia.be/api/explore/v2.1/catalog/datasets",
            Provider::TransnetBw => "https://api.transnetbw.de/picasso-cbmp/csv",
        }
    }
}

/// A calendar day in the civil timezone. Only `YYYY-MM-DD` is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryDate(NaiveDate);

impl QueryDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// The day before today, as seen in the civil timezone.
    pub fn yesterday() -> Self {
        let today = Utc::now().with_timezone(&CIVIL_TIMEZONE).date_naive();
        Self(today.pred_opt().unwrap_or(today))
    }

    /// Start of this day and of the next one, both civil midnight.
    pub fn day_span(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let next = self.0.succ_opt().unwrap_or(self.0);
        (civil_midnight(self.0), civil_midnight(next))
    }
}

fn civil_midnight(date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::default());
    CIVIL_TIMEZONE
        .from_local_datetime(&midnight)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

impl FromStr for QueryDate {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let shaped = s.len() == 10
            && s.bytes().enumerate().all(|(i, b)| match i {
                4 | 7 => b == b'-',
                _ => b.is_ascii_digit(),
            });
        if !shaped {
            return Err(DashboardError::InvalidDate(s.to_owned()));
        }

        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| DashboardError::InvalidDate(s.to_owned()))
    }
}

impl fmt::Display for QueryDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl Serialize for QueryDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_date_round_trips_display() {
        let date: QueryDate = "2024-03-31".parse().unwrap();

        assert_eq!(date.date(), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
        assert_eq!(date.to_string(), "2024-03-31");
    }

    #[test]
    fn test_query_date_rejects_other_formats() {
        for input in ["2024-3-31", "31-03-2024", "2024/03/31", "2024-02-30", "", "2024-03-31T00:00"] {
            assert!(
                matches!(input.parse::<QueryDate>(), Err(DashboardError::InvalidDate(_))),
                "accepted {input}"
            );
        }
    }

    #[test]
    fn test_day_span_is_civil() {
        let date: QueryDate = "2024-06-01".parse().unwrap();
        let (start, end) = date.day_span();

        assert_eq!(start, Utc.with_ymd_and_hms(2024, 5, 31, 22, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 6, 1, 22, 0, 0).unwrap());
    }

    #[test]
    fn test_day_span_spring_forward_is_23_hours() {
        let date: QueryDate = "2024-03-31".parse().unwrap();
        let (start, end) = date.day_span();

        assert_eq!(end - start, chrono::Duration::hours(23));
    }

    #[test]
    fn test_provider_endpoints() {
        assert!(Provider::Elia.default_endpoint().starts_with("https://opendata.elia.be/"));
        assert!(Provider::TransnetBw
            .default_endpoint()
            .ends_with("/picasso-cbmp/csv"));
    }

    #[test]
    fn test_query_date_serializes_as_string() {
        let date: QueryDate = "2024-01-05".parse().unwrap();

        assert_eq!(serde_json::to_string(&date).unwrap(), "\"2024-01-05\"");
    }
}
