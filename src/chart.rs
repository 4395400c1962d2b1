//! Line charts for a [`GridBundle`], rendered to PNG with plotters.
//!
//! Building a [`ChartSpec`] is pure; only [`render_png`] touches the
//! filesystem.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use plotters::prelude::*;
use std::path::Path;

use crate::dashboard::GridBundle;
use crate::error::DashboardError;
use crate::fetch::{CBMP_NEGATIVE, CBMP_POSITIVE};
use crate::normalize::{
    NormalizedSeries, AREA_CONTROL_ERROR, IMBALANCE_PRICE_FIELD, MARGINAL_DECREMENTAL_PRICE,
    MARGINAL_INCREMENTAL_PRICE, SYSTEM_IMBALANCE,
};
use crate::CIVIL_TIMEZONE;

pub const SI_ACE_FILE: &str = "SI_ACE.png";
pub const PRICE_FILE: &str = "CBMP_Pricing.png";

const GRAY: (u8, u8, u8) = (128, 128, 128);
const ORANGE: (u8, u8, u8) = (255, 165, 0);
const LIGHT_BLUE: (u8, u8, u8) = (173, 216, 230);
const PALETTE: [(u8, u8, u8); 5] = [
    (99, 110, 250),
    (239, 85, 59),
    (0, 204, 150),
    (171, 99, 250),
    (255, 161, 90),
];

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSpec {
    pub name: String,
    pub color: (u8, u8, u8),
    pub points: Vec<(DateTime<Tz>, Option<f64>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub title: String,
    pub file_name: &'static str,
    pub height: u32,
    pub series: Vec<SeriesSpec>,
    /// Y values of horizontal guide lines.
    pub guides: Vec<f64>,
    pub x_range: (DateTime<Utc>, DateTime<Utc>),
}

fn series_spec(series: &NormalizedSeries, metric: &str, name: &str, color: (u8, u8, u8)) -> SeriesSpec {
    SeriesSpec {
        name: name.to_owned(),
        color,
        points: series
            .values(metric)
            .map(|values| values.collect())
            .unwrap_or_default(),
    }
}

/// Span covered by the data, or the civil day when there is none.
fn x_range(series: &[SeriesSpec], fallback: (DateTime<Utc>, DateTime<Utc>)) -> (DateTime<Utc>, DateTime<Utc>) {
    let stamps = series
        .iter()
        .flat_map(|s| s.points.iter())
        .filter(|(_, value)| value.is_some())
        .map(|(stamp, _)| stamp.with_timezone(&Utc));

    let range = stamps.fold(None, |acc: Option<(DateTime<Utc>, DateTime<Utc>)>, stamp| match acc {
        None => Some((stamp, stamp)),
        Some((low, high)) => Some((low.min(stamp), high.max(stamp))),
    });

    match range {
        Some((low, high)) if low < high => (low, high),
        Some((low, _)) => (low - chrono::Duration::minutes(15), low + chrono::Duration::minutes(15)),
        None => fallback,
    }
}

/// System imbalance and ACE.
pub fn si_ace_chart(bundle: &GridBundle) -> ChartSpec {
    let series = vec![
        series_spec(&bundle.imbalance, SYSTEM_IMBALANCE, "SI (MW)", GRAY),
        series_spec(&bundle.imbalance, AREA_CONTROL_ERROR, "ACE (MW)", ORANGE),
    ];

    ChartSpec {
        title: "System Imbalance (SI) & ACE".to_owned(),
        file_name: SI_ACE_FILE,
        height: 500,
        x_range: x_range(&series, bundle.date.day_span()),
        series,
        guides: Vec::new(),
    }
}

/// Marginal prices, imbalance price and, when available, CBMP with guides.
pub fn price_chart(bundle: &GridBundle, guides: &[f64]) -> ChartSpec {
    let mut series = vec![
        series_spec(&bundle.imbalance, MARGINAL_INCREMENTAL_PRICE, "MIP", PALETTE[0]),
        series_spec(&bundle.imbalance, MARGINAL_DECREMENTAL_PRICE, "MDP", PALETTE[1]),
        series_spec(&bundle.imbalance_price, IMBALANCE_PRICE_FIELD, "Imbalance Price", PALETTE[2]),
    ];
    let mut title = "CBMP / MIP / MDP / Imbalance".to_owned();
    let mut guide_lines = Vec::new();

    match bundle.cbmp.series() {
        Some(cbmp) if !cbmp.is_empty() => {
            series.push(series_spec(cbmp, CBMP_POSITIVE, CBMP_POSITIVE, PALETTE[3]));
            series.push(series_spec(cbmp, CBMP_NEGATIVE, CBMP_NEGATIVE, PALETTE[4]));
            guide_lines.extend_from_slice(guides);
        }
        Some(_) => {}
        None => title.push_str(" (CBMP unavailable)"),
    }

    ChartSpec {
        title,
        file_name: PRICE_FILE,
        height: 700,
        x_range: x_range(&series, bundle.date.day_span()),
        series,
        guides: guide_lines,
    }
}

/// Splits a series at missing values so gaps are not bridged.
pub fn segments(points: &[(DateTime<Tz>, Option<f64>)]) -> Vec<Vec<(DateTime<Utc>, f64)>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();

    for (stamp, value) in points {
        match value {
            Some(value) if value.is_finite() => current.push((stamp.with_timezone(&Utc), *value)),
            _ => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }

    segments
}

/// Y axis bounds covering every value and guide, with 5% padding.
pub fn value_range(spec: &ChartSpec) -> (f64, f64) {
    let values = spec
        .series
        .iter()
        .flat_map(|s| s.points.iter().filter_map(|(_, v)| *v))
        .chain(spec.guides.iter().copied())
        .filter(|v| v.is_finite());

    let (low, high) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(low, high), v| {
        (low.min(v), high.max(v))
    });

    if low > high {
        return (-1.0, 1.0);
    }
    if low == high {
        return (low - 1.0, high + 1.0);
    }
    let pad = (high - low) * 0.05;
    (low - pad, high + pad)
}

/// One bold grid line per hour of the range; with three light lines in
/// between, the grid falls on quarter hours.
pub fn hour_labels((start, end): (DateTime<Utc>, DateTime<Utc>)) -> usize {
    let minutes = (end - start).num_minutes().max(0);
    let hours = (minutes + 59) / 60;
    hours.clamp(1, 25) as usize
}

fn chart_error<E: std::fmt::Display>(what: &'static str) -> impl Fn(E) -> DashboardError {
    move |e| DashboardError::Chart(format!("{what}: {e}"))
}

/// Draws `spec` into a PNG file at `path`.
pub fn render_png(spec: &ChartSpec, path: &Path, width: u32) -> Result<(), DashboardError> {
    let root = BitMapBackend::new(path, (width, spec.height)).into_drawing_area();

    root.fill(&WHITE)
        .map_err(chart_error("failed to fill background"))?;

    let (start, end) = spec.x_range;
    let (low, high) = value_range(spec);

    let mut chart = ChartBuilder::on(&root)
        .caption(&spec.title, ("sans-serif", 28).into_font())
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(start..end, low..high)
        .map_err(chart_error("failed to build chart"))?;

    chart
        .configure_mesh()
        .x_labels(hour_labels(spec.x_range))
        .x_max_light_lines(3)
        .x_label_formatter(&|x| x.with_timezone(&CIVIL_TIMEZONE).format("%H:%M").to_string())
        .x_desc(format!("Time ({})", CIVIL_TIMEZONE.name()))
        .draw()
        .map_err(chart_error("failed to draw mesh"))?;

    let mut labelled = false;
    for series in &spec.series {
        let (r, g, b) = series.color;
        let color = RGBColor(r, g, b);

        for (index, segment) in segments(&series.points).into_iter().enumerate() {
            let drawn = chart
                .draw_series(LineSeries::new(segment, color.stroke_width(2)))
                .map_err(chart_error("failed to draw series"))?;
            if index == 0 {
                drawn
                    .label(series.name.clone())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
                labelled = true;
            }
        }
    }

    let (r, g, b) = LIGHT_BLUE;
    for &y in &spec.guides {
        chart
            .draw_series(LineSeries::new(vec![(start, y), (end, y)], RGBColor(r, g, b).stroke_width(1)))
            .map_err(chart_error("failed to draw guide"))?;
    }

    if labelled {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .margin(10)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(chart_error("failed to draw legend"))?;
    }

    root.present()
        .map_err(chart_error("failed to write png"))?;

    Ok(())
}
