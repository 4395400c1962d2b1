//! Untyped delimited tables as they come off the wire, plus the loose
//! helpers used to pull typed values out of them.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use csv::{ReaderBuilder, Trim};

use crate::error::ParseError;

/// Header row plus string cells, exactly as parsed. Nothing is coerced yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Parses delimiter-separated text with a header row. Header names are
    /// trimmed, cell values are kept verbatim.
    pub fn from_csv(text: &str, delimiter: u8) -> Result<Self, ParseError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .trim(Trim::Headers)
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()?
            .iter()
            .map(str::to_owned)
            .collect::<Vec<_>>();

        let rows = reader
            .records()
            .map(|record| Ok(record?.iter().map(str::to_owned).collect()))
            .collect::<Result<Vec<Vec<String>>, csv::Error>>()?;

        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// A table without rows or without columns carries no data.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.headers.is_empty()
    }

    /// Index of the column picked by [`resolve_column`].
    pub fn resolve(&self, candidates: &[&str]) -> Option<usize> {
        let name = resolve_column(&self.headers, candidates)?;
        self.headers.iter().position(|h| h == name)
    }

    /// Cell at (`row`, `column`), `""` when the row is short.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Cells of column `index`, top to bottom. Short rows yield `""`.
    pub fn column(&self, index: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(index).map(String::as_str).unwrap_or(""))
    }
}

/// Returns the first column whose name contains one of `candidates`,
/// ignoring case. Candidates are tried in order, and for each candidate the
/// columns are scanned in table order, so an earlier candidate always wins
/// over a later one regardless of where its column sits.
pub fn resolve_column<'a, S: AsRef<str>>(columns: &'a [S], candidates: &[&str]) -> Option<&'a str> {
    candidates.iter().find_map(|candidate| {
        let needle = candidate.to_lowercase();
        columns
            .iter()
            .map(|column| column.as_ref())
            .find(|column| column.to_lowercase().contains(&needle))
    })
}

/// Lenient numeric coercion: anything that does not parse as a number
/// becomes `None`. `NaN` is treated as missing.
pub fn coerce_number(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|number| !number.is_nan())
}

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parses an instant. Values with an offset (or `Z`) are taken as given,
/// values without one are assumed to be UTC.
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    let with_offset = OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::<FixedOffset>::parse_from_str(value, format).ok());
    if let Some(parsed) = with_offset {
        return Some(parsed.with_timezone(&Utc));
    }

    let value = value.strip_suffix('Z').unwrap_or(value);
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_resolve_column_ignores_case() {
        let cols = columns(&["Datetime", "System Imbalance", "Quality status"]);

        assert_eq!(resolve_column(&cols, &["system imbalance"]), Some("System Imbalance"));
        assert_eq!(resolve_column(&cols, &["DATETIME", "tijdstip"]), Some("Datetime"));
    }

    #[test]
    fn test_resolve_column_not_found() {
        let cols = columns(&["Datetime", "Resolution code"]);

        assert_eq!(resolve_column(&cols, &["marginal incremental"]), None);
        assert_eq!(resolve_column::<String>(&[], &["datetime"]), None);
    }

    #[test]
    fn test_resolve_column_candidate_order_beats_column_order() {
        // "area control error" is the first candidate, so its column wins even
        // when "ACE (raw)" appears earlier in the header.
        let cols = columns(&["Datetime", "ACE (raw)", "Net Area Control Error Adjusted"]);
        assert_eq!(
            resolve_column(&cols, &["area control error", "ACE"]),
            Some("Net Area Control Error Adjusted")
        );

        let cols = columns(&["Datetime", "Net Area Control Error Adjusted", "ACE (raw)"]);
        assert_eq!(
            resolve_column(&cols, &["area control error", "ACE"]),
            Some("Net Area Control Error Adjusted")
        );
    }

    #[test]
    fn test_resolve_column_first_column_in_table_order() {
        let cols = columns(&["Price A (imbalance price)", "Imbalance price"]);

        assert_eq!(
            resolve_column(&cols, &["imbalance price"]),
            Some("Price A (imbalance price)")
        );
    }

    #[test]
    fn test_resolve_column_result_contains_a_candidate() {
        let cols = columns(&["Tijdstip", "SI", "Surface", "ACE"]);
        let candidates = ["area control error", "ace"];

        let found = resolve_column(&cols, &candidates).unwrap();
        assert!(candidates
            .iter()
            .any(|c| found.to_lowercase().contains(&c.to_lowercase())));
        // deterministic
        assert_eq!(resolve_column(&cols, &candidates), Some(found));
        assert_eq!(found, "Surface");
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number("n/a"), None);
        assert_eq!(coerce_number(""), None);
        assert_eq!(coerce_number("123.4"), Some(123.4));
        assert_eq!(coerce_number("-5"), Some(-5.0));
        assert_eq!(coerce_number(" 42 "), Some(42.0));
        assert_eq!(coerce_number("NaN"), None);
    }

    #[test]
    fn test_parse_instant_offset_and_naive_agree() {
        let expected = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();

        assert_eq!(parse_instant("2024-06-01T10:00:00+00:00"), Some(expected));
        assert_eq!(parse_instant("2024-06-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_instant("2024-06-01T12:00:00+02:00"), Some(expected));
        assert_eq!(parse_instant("2024-06-01 12:00:00+02:00"), Some(expected));
        assert_eq!(parse_instant("2024-06-01T10:00:00"), Some(expected));
        assert_eq!(parse_instant("2024-06-01 10:00"), Some(expected));
        assert_eq!(parse_instant("2024-06-01T10:00:00.000"), Some(expected));
    }

    #[test]
    fn test_parse_instant_rejects_garbage() {
        assert_eq!(parse_instant("gisteren"), None);
        assert_eq!(parse_instant(""), None);
        assert_eq!(parse_instant("2024-13-01T00:00:00"), None);
    }

    #[test]
    fn test_from_csv_trims_headers_and_keeps_rows() {
        let text = "\u{feff} Datetime ; System imbalance \n2024-06-01T10:00:00+02:00;12.5\n2024-06-01T10:15:00+02:00;\n";
        let table = RawTable::from_csv(text, b';').unwrap();

        assert_eq!(table.headers(), ["Datetime", "System imbalance"]);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.column(1).collect::<Vec<_>>(),
            vec!["12.5", ""]
        );
        assert_eq!(table.resolve(&["system imbalance"]), Some(1));
    }

    #[test]
    fn test_from_csv_empty_body() {
        let table = RawTable::from_csv("", b';').unwrap();

        assert!(table.is_empty());
        assert!(table.headers().is_empty());
    }

    #[test]
    fn test_from_csv_ragged_rows_fail() {
        let text = "a;b\n1;2\n1;2;3\n";

        assert!(matches!(
            RawTable::from_csv(text, b';'),
            Err(ParseError::Csv(_))
        ));
    }

    #[test]
    fn test_header_only_table_is_empty() {
        let table = RawTable::from_csv("Datetime;Imbalance price\n", b';').unwrap();

        assert!(table.is_empty());
        assert_eq!(table.headers().len(), 2);
    }
}
