use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{report, DashboardError, FetchError, ParseError};
use crate::normalize::{CanonicalRow, NormalizedSeries};
use crate::table::{coerce_number, parse_instant, RawTable};
use crate::{QueryDate, CIVIL_TIMEZONE};

pub const CBMP_TIMESTAMP: &str = "Zeit (ISO 8601)";
pub const CBMP_POSITIVE: &str = "ELIA_POS";
pub const CBMP_NEGATIVE: &str = "ELIA_NEG";

async fn get_text(client: &Client, url: &str, query: &[(&str, String)]) -> Result<String, FetchError> {
    let response = client.get(url).query(query).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: response.url().to_string(),
            status: status.as_u16(),
        });
    }

    Ok(response.text().await?)
}

/// Downloads one Elia catalog dataset for `date` as a raw table.
///
/// The export is filtered on the `datetime` field for the given day, with
/// Dutch labels and `;` as delimiter. HTTP and parse failures are returned
/// to the caller.
pub async fn fetch_elia_csv(
    client: &Client,
    base_url: &str,
    dataset: &str,
    date: QueryDate,
) -> Result<RawTable, DashboardError> {
    let url = format!("{}/{}/exports/csv", base_url.trim_end_matches('/'), dataset);
    let query = [
        ("lang", "nl".to_owned()),
        ("refine", format!("datetime:\"{date}\"")),
        ("timezone", CIVIL_TIMEZONE.name().to_owned()),
        ("use_labels", "true".to_owned()),
        ("delimiter", ";".to_owned()),
    ];

    let body = get_text(client, &url, &query).await?;
    let table = RawTable::from_csv(&body, b';')?;

    debug!(dataset, %date, rows = table.len(), "fetched elia export");

    Ok(table)
}

/// Result of asking TransnetBW for cross-border marginal prices.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CbmpOutcome {
    /// The provider answered; the series may still hold zero rows. Rows
    /// whose timestamp does not parse are dropped.
    Available(NormalizedSeries),
    /// Fetching or parsing failed.
    Unavailable { reason: String },
}

impl CbmpOutcome {
    pub fn is_available(&self) -> bool {
        matches!(self, CbmpOutcome::Available(_))
    }

    pub fn series(&self) -> Option<&NormalizedSeries> {
        match self {
            CbmpOutcome::Available(series) => Some(series),
            CbmpOutcome::Unavailable { .. } => None,
        }
    }

    /// Collapses both cases into a series; unavailable data becomes an empty
    /// series with the usual two price columns.
    pub fn into_series(self) -> NormalizedSeries {
        match self {
            CbmpOutcome::Available(series) => series,
            CbmpOutcome::Unavailable { .. } => NormalizedSeries::empty(cbmp_metrics()),
        }
    }
}

fn cbmp_metrics() -> Vec<String> {
    vec![CBMP_POSITIVE.to_owned(), CBMP_NEGATIVE.to_owned()]
}

/// Fetches cross-border marginal prices for `date`.
///
/// Never fails: any network, HTTP or parse problem is logged and reported
/// as [`CbmpOutcome::Unavailable`].
pub async fn fetch_cbmp(client: &Client, url: &str, date: QueryDate) -> CbmpOutcome {
    let query = [("date", date.to_string()), ("lang", "de".to_owned())];

    let result = match get_text(client, url, &query).await {
        Ok(body) => parse_cbmp(&body).map_err(DashboardError::from),
        Err(err) => Err(err.into()),
    };

    match result {
        Ok(series) => {
            debug!(%date, rows = series.len(), "fetched cbmp");
            CbmpOutcome::Available(series)
        }
        Err(err) => {
            let reason = report(&err);
            warn!(%date, %reason, "cbmp data unavailable");
            CbmpOutcome::Unavailable { reason }
        }
    }
}

// Accepts a decimal comma when the cell has no decimal point.
fn coerce_price(cell: &str) -> Option<f64> {
    coerce_number(cell).or_else(|| {
        if cell.contains('.') {
            None
        } else {
            coerce_number(&cell.replace(',', "."))
        }
    })
}

/// Parses a TransnetBW CBMP export. Rows whose timestamp cannot be parsed
/// are skipped; price cells that are not numbers become `None`.
pub fn parse_cbmp(text: &str) -> Result<NormalizedSeries, ParseError> {
    let raw = RawTable::from_csv(text, b';')?;

    let column = |name: &'static str, candidates: &'static [&'static str]| {
        raw.headers()
            .iter()
            .position(|h| h == name)
            .ok_or(ParseError::MissingColumn {
                field: name,
                candidates,
            })
    };
    let timestamp = column(CBMP_TIMESTAMP, &[CBMP_TIMESTAMP])?;
    let positive = column(CBMP_POSITIVE, &[CBMP_POSITIVE])?;
    let negative = column(CBMP_NEGATIVE, &[CBMP_NEGATIVE])?;

    let mut skipped = 0;
    let rows = (0..raw.len())
        .filter_map(|row| {
            let Some(instant) = parse_instant(raw.cell(row, timestamp)) else {
                skipped += 1;
                return None;
            };
            Some(CanonicalRow {
                timestamp: instant.with_timezone(&CIVIL_TIMEZONE),
                fields: vec![
                    coerce_price(raw.cell(row, positive)),
                    coerce_price(raw.cell(row, negative)),
                ],
            })
        })
        .collect::<Vec<_>>();

    if skipped > 0 {
        warn!(skipped, "cbmp rows without a usable timestamp");
    }

    Ok(NormalizedSeries::from_rows(cbmp_metrics(), rows))
}
