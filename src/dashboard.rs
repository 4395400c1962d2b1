use reqwest::Client;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::DashboardError;
use crate::fetch::{fetch_cbmp, fetch_elia_csv, CbmpOutcome};
use crate::normalize::{normalize, DatasetSchema, NormalizedSeries, IMBALANCE, IMBALANCE_PRICE};
use crate::table::RawTable;
use crate::{Provider, QueryDate};

#[derive(Debug, Clone)]
pub struct Config {
    /// Base of the Elia catalog, datasets are appended as path segments.
    pub elia_base_url: String,
    pub cbmp_url: String,
    /// Applied to every request made through the shared client.
    pub timeout: Duration,
    /// PNG width in pixels; heights are fixed per chart.
    pub chart_width: u32,
    /// Horizontal guide lines on the price chart.
    pub guides: Vec<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            elia_base_url: Provider::Elia.default_endpoint().to_owned(),
            cbmp_url: Provider::TransnetBw.default_endpoint().to_owned(),
            timeout: Duration::from_secs(30),
            chart_width: 1200,
            guides: vec![200.0, -200.0],
        }
    }
}

/// Everything one render needs, normalized to civil time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridBundle {
    pub date: QueryDate,
    /// System imbalance, ACE, MIP and MDP.
    pub imbalance: NormalizedSeries,
    /// Settlement imbalance price, stamped at period end.
    pub imbalance_price: NormalizedSeries,
    pub cbmp: CbmpOutcome,
}

#[derive(Debug)]
pub enum Render {
    Current(GridBundle),
    /// A newer render started while this one was in flight; its data is
    /// dropped.
    Superseded { generation: u64 },
}

/// Generation number handed out when a render starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTicket(u64);

impl RenderTicket {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

/// Long-lived entry point: one HTTP client and configuration shared by all
/// renders of the process.
#[derive(Debug)]
pub struct Dashboard {
    client: Client,
    config: Config,
    generation: AtomicU64,
}

impl Dashboard {
    /// Builds the shared client. Fails if a recorded dataset header sample no
    /// longer matches its alias lists.
    pub fn new(config: Config) -> Result<Self, DashboardError> {
        IMBALANCE.check_sample()?;
        IMBALANCE_PRICE.check_sample()?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(DashboardError::Client)?;

        Ok(Self {
            client,
            config,
            generation: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetches and normalizes the three series for `date`.
    ///
    /// The two Elia datasets are fetched concurrently and both must succeed;
    /// the CBMP fetch runs alongside and only ever degrades to
    /// [`CbmpOutcome::Unavailable`].
    pub async fn fetch_bundle(&self, date: QueryDate) -> Result<GridBundle, DashboardError> {
        let base = &self.config.elia_base_url;
        let elia = async {
            tokio::try_join!(
                fetch_elia_csv(&self.client, base, IMBALANCE.dataset, date),
                fetch_elia_csv(&self.client, base, IMBALANCE_PRICE.dataset, date),
            )
        };
        let cbmp = fetch_cbmp(&self.client, &self.config.cbmp_url, date);

        let (elia, cbmp) = tokio::join!(elia, cbmp);
        let (raw_imbalance, raw_price) = elia?;

        let bundle = GridBundle {
            date,
            imbalance: normalize_or_empty(&IMBALANCE, &raw_imbalance)?,
            imbalance_price: normalize_or_empty(&IMBALANCE_PRICE, &raw_price)?,
            cbmp,
        };

        info!(
            %date,
            imbalance = bundle.imbalance.len(),
            imbalance_price = bundle.imbalance_price.len(),
            cbmp_available = bundle.cbmp.is_available(),
            "bundle ready"
        );

        Ok(bundle)
    }

    /// Starts a new render; every earlier ticket stops being current.
    pub fn begin_render(&self) -> RenderTicket {
        RenderTicket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: RenderTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }

    /// [`fetch_bundle`](Self::fetch_bundle) guarded by a render generation:
    /// if another render began meanwhile, the result is discarded.
    pub async fn render(&self, date: QueryDate) -> Result<Render, DashboardError> {
        let ticket = self.begin_render();
        let bundle = self.fetch_bundle(date).await?;

        if self.is_current(ticket) {
            Ok(Render::Current(bundle))
        } else {
            debug!(generation = ticket.0, %date, "discarding stale render");
            Ok(Render::Superseded {
                generation: ticket.0,
            })
        }
    }
}

fn normalize_or_empty(schema: &DatasetSchema, raw: &RawTable) -> Result<NormalizedSeries, DashboardError> {
    if raw.is_empty() {
        debug!(dataset = schema.dataset, "no rows");
        return Ok(NormalizedSeries::empty_for(schema));
    }
    Ok(normalize(schema, raw)?)
}
