use clap::Parser;
use elia_balancing::chart::{price_chart, render_png, si_ace_chart};
use elia_balancing::error::report;
use elia_balancing::{CbmpOutcome, Config, Dashboard, DashboardError, Provider, QueryDate, Render};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Render SI/ACE and balancing price charts for one or more days.
#[derive(Debug, Parser)]
#[command(name = "elia-balancing", version)]
struct Cli {
    /// Day to render (YYYY-MM-DD), repeatable; defaults to yesterday in Brussels
    #[arg(short, long = "date")]
    dates: Vec<QueryDate>,

    /// First guide line on the price chart
    #[arg(long, default_value_t = 200.0, allow_negative_numbers = true)]
    line1: f64,

    /// Second guide line on the price chart
    #[arg(long, default_value_t = -200.0, allow_negative_numbers = true)]
    line2: f64,

    /// Output directory for the PNG files
    #[arg(short, long, default_value = "charts")]
    output: PathBuf,

    /// Chart width in pixels
    #[arg(long, default_value_t = 1200)]
    width: u32,

    /// Also print the normalized series as JSON on stdout
    #[arg(long)]
    json: bool,

    #[arg(long, env = "ELIA_BASE_URL", default_value = Provider::Elia.default_endpoint())]
    elia_base_url: String,

    #[arg(long, env = "CBMP_URL", default_value = Provider::TransnetBw.default_endpoint())]
    cbmp_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "ELIA_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            elia_base_url: self.elia_base_url.clone(),
            cbmp_url: self.cbmp_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            chart_width: self.width,
            guides: vec![self.line1, self.line2],
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %report(&err), "render failed");
            eprintln!("Error: {}", report(&err));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), DashboardError> {
    let dashboard = Dashboard::new(cli.config())?;

    let dates = if cli.dates.is_empty() {
        vec![QueryDate::yesterday()]
    } else {
        cli.dates.clone()
    };
    let nested = dates.len() > 1;

    for date in dates {
        let bundle = match dashboard.render(date).await? {
            Render::Current(bundle) => bundle,
            Render::Superseded { generation } => {
                info!(generation, %date, "render superseded");
                continue;
            }
        };

        if let CbmpOutcome::Unavailable { reason } = &bundle.cbmp {
            warn!(%date, "CBMP chart lines omitted");
            eprintln!("warning: CBMP data unavailable for {date}: {reason}");
        }

        if cli.json {
            println!("{}", serde_json::to_string_pretty(&bundle)?);
        }

        let output = if nested {
            cli.output.join(date.to_string())
        } else {
            cli.output.clone()
        };
        tokio::fs::create_dir_all(&output).await?;

        let config = dashboard.config();
        for spec in [si_ace_chart(&bundle), price_chart(&bundle, &config.guides)] {
            let path = output.join(spec.file_name);
            render_png(&spec, &path, config.chart_width)?;
            info!(path = %path.display(), "chart written");
        }
    }

    Ok(())
}
