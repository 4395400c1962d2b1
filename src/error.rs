use thiserror::Error;

/// Network or HTTP level failure while talking to an upstream provider.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("http request error")]
    Reqwest(#[from] reqwest::Error),
    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },
}

/// The response body could not be turned into a usable table.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("malformed delimited text")]
    Csv(#[from] csv::Error),
    #[error("no column matches {field} (tried {candidates:?})")]
    MissingColumn {
        field: &'static str,
        candidates: &'static [&'static str],
    },
    #[error("unparseable timestamp '{0}'")]
    InvalidTimestamp(String),
    #[error("{dataset}: {field} resolves to {found:?}, expected '{expected}'")]
    SchemaDrift {
        dataset: &'static str,
        field: &'static str,
        expected: &'static str,
        found: Option<String>,
    },
}

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("building http client failed")]
    Client(#[source] reqwest::Error),
    #[error("chart generation failed: {0}")]
    Chart(String),
    #[error("io error")]
    Io(#[from] std::io::Error),
    #[error("json encoding failed")]
    Json(#[from] serde_json::Error),
}

/// Formats an error together with its chain of sources, outermost first.
pub fn report(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
