#![allow(clippy::const_is_empty)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::type_complexity)]

// Core modules
pub mod analysis;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod models;
pub mod utils;

// The forecasting engine
pub mod engine;

// Orchestration and hand-off
pub mod export;
pub mod pipeline;

// Re-export commonly used types
pub use analysis::{RevisionRecord, RevisionSummary, Revisions, compute_revisions};
pub use data::{CachedSource, HttpSource, MemorySource, VintageParser, VintageSource, fetch_range};
pub use domain::{IdentifierRange, Observation, Periodicity, ReferencePeriod, Vintage, VintageId};
pub use engine::{ForecastEngine, ForecastResult, ModelOrder, forecast};
pub use error::{FatalConfigError, FetchError, FitError, ParseError, PipelineError};
pub use models::{Completeness, ConflictWarning, CurrentSeries, Panel, PanelBuilder, consolidate};
pub use pipeline::{RunReport, RunSettings, run_pipeline};

// CLI argument parsing
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{InformationCriterion, OrderSelection};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// First release number to fetch (default: newest configured release)
    #[arg(long)]
    pub start: Option<u32>,

    /// Last release number to fetch, inclusive
    #[arg(long)]
    pub end: Option<u32>,

    /// Pause between network requests, in seconds
    #[arg(long)]
    pub delay_secs: Option<u64>,

    /// Number of future periods to forecast
    #[arg(long)]
    pub horizon: Option<usize>,

    /// Two-sided confidence level of the forecast intervals, e.g. 0.95
    #[arg(long)]
    pub confidence: Option<f64>,

    /// Fixed model order "p,d,q" instead of the automatic search
    #[arg(long, value_parser = parse_order)]
    pub order: Option<ModelOrder>,

    /// Information criterion used to rank candidate models
    #[arg(long)]
    pub criterion: Option<InformationCriterion>,

    /// Directory holding the raw vintage cache
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Ignore the cache and download every vintage again
    #[arg(long, default_value_t = false)]
    pub refresh: bool,

    /// Use cached vintages only, never the network
    #[arg(long, default_value_t = false, conflicts_with = "refresh")]
    pub offline: bool,

    /// Where the consolidated CSV and the JSON report are written
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Download URL with `{id}` in place of the release number
    #[arg(long)]
    pub url_template: Option<String>,
}

/// "1,1,1" -> ARIMA(1,1,1)
fn parse_order(raw: &str) -> Result<ModelOrder, String> {
    let parts: Vec<usize> = raw
        .split(',')
        .map(|p| p.trim().parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid order '{}': {}", raw, e))?;
    match parts.as_slice() {
        [p, d, q] => Ok(ModelOrder::new(*p, *d, *q)),
        _ => Err(format!("expected three comma-separated integers, got '{}'", raw)),
    }
}

impl Cli {
    /// Defaults from the config consts, overridden by whatever was given on the command line.
    pub fn run_settings(&self) -> RunSettings {
        let mut settings = RunSettings::default();
        if let Some(start) = self.start {
            settings.range.from = start;
        }
        if let Some(end) = self.end {
            settings.range.to = end;
        }
        if let Some(delay) = self.delay_secs {
            settings.fetch.delay = Duration::from_secs(delay);
        }
        if let Some(template) = &self.url_template {
            settings.fetch.url_template = template.clone();
        }
        if let Some(horizon) = self.horizon {
            settings.horizon = horizon;
        }
        if let Some(confidence) = self.confidence {
            settings.forecast.confidence_level = confidence;
        }
        if let Some(order) = self.order {
            settings.forecast.selection = OrderSelection::Fixed(order);
        }
        if let Some(criterion) = self.criterion {
            settings.forecast.criterion = criterion;
        }
        if let Some(dir) = &self.cache_dir {
            settings.cache_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            settings.output_dir = dir.clone();
        }
        settings.refresh = self.refresh;
        settings.offline = self.offline;
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_defaults() {
        let cli = Cli::parse_from([
            "vacancy-vintages",
            "--start",
            "60",
            "--end",
            "58",
            "--order",
            "1,1,1",
            "--criterion",
            "BIC",
            "--delay-secs",
            "0",
        ]);
        let settings = cli.run_settings();
        assert_eq!(settings.range, IdentifierRange::new(60, 58));
        assert_eq!(settings.forecast.selection, OrderSelection::Fixed(ModelOrder::new(1, 1, 1)));
        assert_eq!(settings.forecast.criterion, InformationCriterion::Bic);
        assert!(settings.fetch.delay.is_zero());
        assert_eq!(settings.horizon, config::FORECAST.default_horizon);
    }

    #[test]
    fn test_bad_order_is_rejected() {
        assert!(parse_order("1,1").is_err());
        assert!(parse_order("a,1,1").is_err());
        assert_eq!(parse_order(" 2, 0 ,1").unwrap(), ModelOrder::new(2, 0, 1));
    }
}
