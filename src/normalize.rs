//! Turns raw provider tables into canonical civil-time series.
//!
//! Every dataset is described by a [`DatasetSchema`]: an explicit mapping from
//! canonical field names to the header aliases accepted for them, plus the
//! header sample the aliases were last checked against.

use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use serde::Serialize;
use std::iter;

use crate::error::ParseError;
use crate::table::{coerce_number, parse_instant, resolve_column, RawTable};
use crate::CIVIL_TIMEZONE;

/// Name of the timestamp column in every normalized series.
pub const TIMESTAMP_COLUMN: &str = "Datetime";

pub const SYSTEM_IMBALANCE: &str = "System imbalance";
pub const AREA_CONTROL_ERROR: &str = "Area control error";
pub const MARGINAL_INCREMENTAL_PRICE: &str = "Marginal incremental price";
pub const MARGINAL_DECREMENTAL_PRICE: &str = "Marginal decremental price";
pub const IMBALANCE_PRICE_FIELD: &str = "Imbalance price";

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Canonical name used in the normalized series.
    pub name: &'static str,
    /// Case-insensitive substrings, tried in order.
    pub aliases: &'static [&'static str],
    /// Header this field resolved to in the recorded sample.
    pub recorded: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct DatasetSchema {
    /// Catalog dataset identifier on the provider side.
    pub dataset: &'static str,
    pub timestamp: FieldSpec,
    pub fields: &'static [FieldSpec],
    /// Added to every timestamp after conversion to civil time.
    pub shift_minutes: i64,
    pub sample_headers: &'static [&'static str],
}

const TIMESTAMP_FIELD: FieldSpec = FieldSpec {
    name: TIMESTAMP_COLUMN,
    aliases: &["datetime", "tijdstip"],
    recorded: "Datetime",
};

/// Current system imbalance, ACE and the marginal activation prices (ods133).
pub const IMBALANCE: DatasetSchema = DatasetSchema {
    dataset: "ods133",
    timestamp: TIMESTAMP_FIELD,
    fields: &[
        FieldSpec {
            name: SYSTEM_IMBALANCE,
            aliases: &["system imbalance"],
            recorded: "System imbalance",
        },
        FieldSpec {
            name: AREA_CONTROL_ERROR,
            aliases: &["area control error", "ACE"],
            recorded: "Area control error",
        },
        FieldSpec {
            name: MARGINAL_INCREMENTAL_PRICE,
            aliases: &["marginal incremental"],
            recorded: "Marginal incremental price",
        },
        FieldSpec {
            name: MARGINAL_DECREMENTAL_PRICE,
            aliases: &["marginal decremental"],
            recorded: "Marginal decremental price",
        },
    ],
    shift_minutes: 0,
    sample_headers: &[
        "Datetime",
        "Resolution code",
        "Quality status",
        "Area control error",
        "System imbalance",
        "Alpha",
        "Alpha'",
        "Marginal incremental price",
        "Marginal decremental price",
        "Strategic reserve price",
    ],
};

/// Quarter-hour settlement imbalance price (ods134). The provider stamps a
/// period at its start; the chart needs it at its end.
pub const IMBALANCE_PRICE: DatasetSchema = DatasetSchema {
    dataset: "ods134",
    timestamp: TIMESTAMP_FIELD,
    fields: &[FieldSpec {
        name: IMBALANCE_PRICE_FIELD,
        aliases: &["imbalance price"],
        recorded: "Imbalance price",
    }],
    shift_minutes: 15,
    sample_headers: &[
        "Datetime",
        "Resolution code",
        "Quality status",
        "Net regulation volume",
        "System imbalance",
        "Alpha",
        "Alpha'",
        "Marginal incremental price",
        "Marginal decremental price",
        "Imbalance price",
    ],
};

impl DatasetSchema {
    pub fn metric_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.to_owned()).collect()
    }

    /// Verifies that every alias list still lands on the recorded header.
    pub fn check_sample(&self) -> Result<(), ParseError> {
        for field in iter::once(&self.timestamp).chain(self.fields) {
            let found = resolve_column(self.sample_headers, field.aliases);
            if found != Some(field.recorded) {
                return Err(ParseError::SchemaDrift {
                    dataset: self.dataset,
                    field: field.name,
                    expected: field.recorded,
                    found: found.map(str::to_owned),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRow {
    pub timestamp: DateTime<Tz>,
    /// One value per metric of the owning series, in the same order.
    pub fields: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedSeries {
    metrics: Vec<String>,
    rows: Vec<CanonicalRow>,
}

impl NormalizedSeries {
    pub fn empty(metrics: Vec<String>) -> Self {
        Self {
            metrics,
            rows: Vec::new(),
        }
    }

    pub fn empty_for(schema: &DatasetSchema) -> Self {
        Self::empty(schema.metric_names())
    }

    /// Builds a series and sorts it ascending by timestamp. The sort is
    /// stable, so rows sharing an instant keep their source order.
    pub fn from_rows(metrics: Vec<String>, mut rows: Vec<CanonicalRow>) -> Self {
        rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Self { metrics, rows }
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn rows(&self) -> &[CanonicalRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `(timestamp, value)` pairs for one metric, or `None` if the series has
    /// no such metric.
    pub fn values<'a>(
        &'a self,
        metric: &str,
    ) -> Option<impl Iterator<Item = (DateTime<Tz>, Option<f64>)> + 'a> {
        let index = self.metrics.iter().position(|m| m == metric)?;
        Some(
            self.rows
                .iter()
                .map(move |row| (row.timestamp, row.fields.get(index).copied().flatten())),
        )
    }

    /// Renders the series back into a raw table: RFC 3339 timestamps with
    /// offset, missing values as empty cells.
    pub fn to_raw_table(&self) -> RawTable {
        let headers = iter::once(TIMESTAMP_COLUMN.to_owned())
            .chain(self.metrics.iter().cloned())
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                iter::once(row.timestamp.to_rfc3339())
                    .chain(
                        row.fields
                            .iter()
                            .map(|v| v.map(|n| n.to_string()).unwrap_or_default()),
                    )
                    .collect()
            })
            .collect();
        RawTable::new(headers, rows)
    }
}

/// Normalizes `raw` according to `schema`.
///
/// Every field must resolve to a column, otherwise this fails with
/// [`ParseError::MissingColumn`]. Timestamps without an offset are read as
/// UTC; an unparseable timestamp fails the whole table. Numeric cells that do
/// not parse become `None` and the row is kept.
pub fn normalize(schema: &DatasetSchema, raw: &RawTable) -> Result<NormalizedSeries, ParseError> {
    let resolve = |field: &FieldSpec| {
        raw.resolve(field.aliases).ok_or(ParseError::MissingColumn {
            field: field.name,
            candidates: field.aliases,
        })
    };

    let timestamp_index = resolve(&schema.timestamp)?;
    let metric_indices = schema
        .fields
        .iter()
        .map(resolve)
        .collect::<Result<Vec<_>, _>>()?;
    let shift = Duration::minutes(schema.shift_minutes);

    let rows = (0..raw.len())
        .map(|row| {
            let cell = raw.cell(row, timestamp_index);
            let instant =
                parse_instant(cell).ok_or_else(|| ParseError::InvalidTimestamp(cell.to_owned()))?;

            Ok(CanonicalRow {
                timestamp: instant.with_timezone(&CIVIL_TIMEZONE) + shift,
                fields: metric_indices
                    .iter()
                    .map(|&column| coerce_number(raw.cell(row, column)))
                    .collect(),
            })
        })
        .collect::<Result<Vec<_>, ParseError>>()?;

    tracing::debug!(dataset = schema.dataset, rows = rows.len(), "normalized");

    Ok(NormalizedSeries::from_rows(schema.metric_names(), rows))
}
