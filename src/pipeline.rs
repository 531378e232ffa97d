//! End-to-end run: fetch → parse → consolidate → revisions → forecast.
//!
//! Each stage accumulates its per-item failures next to its results, so the
//! returned `RunReport` always says how much of the requested data was used.

use std::path::PathBuf;
use std::time::Duration;

use crate::analysis::{
    HorizonSummary, RevisionSummary, Revisions, compute_revisions, summarise_by_horizon,
};
use crate::config::{FORECAST, FetchSettings, ForecastSettings, PERSISTENCE, SOURCE};
use crate::data::{FetchFailure, FormatEra, SkippedRow, VintageParser, VintageSource, fetch_range};
use crate::domain::{IdentifierRange, Vintage, VintageId};
use crate::engine::{ForecastEngine, ForecastResult};
use crate::error::{FatalConfigError, ParseError, PipelineError};
use crate::models::{CurrentSeries, Panel, PanelBuilder};

/// Runtime settings for one run. `Default` reads the config consts.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub range: IdentifierRange,
    pub forecast: ForecastSettings,
    pub horizon: usize,
    pub fetch: FetchSettings,
    pub cache_dir: PathBuf,
    /// Ignore cached files and download everything again
    pub refresh: bool,
    /// Serve from the cache only
    pub offline: bool,
    pub output_dir: PathBuf,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            range: IdentifierRange::new(SOURCE.range.start, SOURCE.range.end),
            forecast: ForecastSettings::default(),
            horizon: FORECAST.default_horizon,
            fetch: FetchSettings::default(),
            cache_dir: PathBuf::from(PERSISTENCE.cache.directory),
            refresh: false,
            offline: false,
            output_dir: PathBuf::from("."),
        }
    }
}

impl RunSettings {
    pub fn delay(&self) -> Duration {
        self.fetch.delay
    }
}

/// A vintage whose file was fetched but could not be used at all.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedVintage {
    pub id: VintageId,
    pub error: ParseError,
}

/// Per-vintage parse outcome.
#[derive(Debug, Clone)]
pub struct ParsedSummary {
    pub vintage: Vintage,
    pub era: FormatEra,
    pub observations: usize,
    pub skipped: Vec<SkippedRow>,
    pub ignored: usize,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub attempted: usize,
    pub retrieved: Vec<VintageId>,
    pub fetch_failures: Vec<FetchFailure>,
    pub parsed: Vec<ParsedSummary>,
    pub rejected: Vec<RejectedVintage>,
    pub panel: Panel,
    pub current_series: CurrentSeries,
    pub revisions: Revisions,
    pub revision_summary: RevisionSummary,
    pub horizon_summaries: Vec<HorizonSummary>,
    /// Forecasting problems stay inside the report; the rest of the run is still valid
    pub forecast: Result<ForecastResult, FatalConfigError>,
}

impl RunReport {
    pub fn skipped_rows(&self) -> usize {
        self.parsed.iter().map(|p| p.skipped.len()).sum()
    }
}

pub async fn run_pipeline(
    source: &dyn VintageSource,
    settings: &RunSettings,
) -> Result<RunReport, PipelineError> {
    // 1. Acquisition
    let fetched = fetch_range(source, settings.range, settings.delay()).await;
    if fetched.retrieved.is_empty() {
        log::error!("⚠️  No vintages retrieved ({} attempted)", fetched.attempted);
        return Err(PipelineError::NoVintages {
            attempted: fetched.attempted,
        });
    }
    if !fetched.failures.is_empty() {
        log::warn!(
            "⚠️  Continuing without {} vintages: {:?}",
            fetched.failures.len(),
            fetched.missing_ids()
        );
    }

    // 2. Parse + consolidate
    let periodicity = settings.forecast.periodicity;
    let parser = VintageParser::new(periodicity);
    let mut builder = PanelBuilder::new(periodicity).expect_vintages(fetched.attempted);
    let mut parsed = Vec::with_capacity(fetched.retrieved.len());
    let mut rejected = Vec::new();

    for raw in &fetched.retrieved {
        match parser.parse(raw.id, &raw.bytes) {
            Ok(vintage) => {
                let ingest = builder.ingest(&vintage);
                log::info!(
                    "{} ({:?} era, released {}): {} observations, {} skipped, {} ignored, {} new cells",
                    raw.id,
                    vintage.era,
                    vintage.vintage.released,
                    vintage.observations.len(),
                    vintage.skipped.len(),
                    vintage.ignored,
                    ingest.inserted
                );
                parsed.push(ParsedSummary {
                    vintage: vintage.vintage,
                    era: vintage.era,
                    observations: vintage.observations.len(),
                    skipped: vintage.skipped,
                    ignored: vintage.ignored,
                });
            }
            Err(error) => {
                log::warn!("⚠️  Rejecting {}: {}", raw.id, error);
                rejected.push(RejectedVintage { id: raw.id, error });
            }
        }
    }
    let panel = builder.build();
    let current_series = panel.current_series();

    // 3. Revisions
    let revisions = compute_revisions(&panel);
    let revision_summary = RevisionSummary::from_records(&revisions.first_to_latest);
    let horizon_summaries = summarise_by_horizon(&revisions);

    // 4. Forecast
    let engine = ForecastEngine::new(settings.forecast.clone());
    let forecast = engine
        .forecast(&current_series, settings.horizon)
        .map(|mut result| {
            result.completeness.vintages_requested = panel.vintages_requested();
            result.completeness.vintages_used = panel.contributing_vintages().len();
            result
        });
    match &forecast {
        Ok(result) if !result.completeness.is_complete() => log::warn!(
            "⚠️  Partial run: {} of {} vintages, {} of {} periods used",
            result.completeness.vintages_used,
            result.completeness.vintages_requested,
            result.completeness.periods_used,
            result.completeness.periods_available
        ),
        Ok(_) => {}
        Err(e) => log::error!("⚠️  Forecast not produced: {}", e),
    }

    Ok(RunReport {
        attempted: fetched.attempted,
        retrieved: fetched.retrieved.iter().map(|r| r.id).collect(),
        fetch_failures: fetched.failures,
        parsed,
        rejected,
        panel,
        current_series,
        revisions,
        revision_summary,
        horizon_summaries,
        forecast,
    })
}
