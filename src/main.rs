use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::runtime::Runtime;

use vacancy_vintages::export::export_all;
use vacancy_vintages::{
    CachedSource, Cli, HttpSource, RunReport, RunSettings, VintageSource, run_pipeline,
};

fn build_source(settings: &RunSettings) -> Result<Box<dyn VintageSource>> {
    if settings.offline {
        log::info!("Offline: serving vintages from {}", settings.cache_dir.display());
        return Ok(Box::new(CachedSource::offline(&settings.cache_dir)));
    }
    let http = HttpSource::new(settings.fetch.clone()).context("Failed to build HTTP client")?;
    Ok(Box::new(
        CachedSource::new(&settings.cache_dir, Box::new(http)).refreshing(settings.refresh),
    ))
}

fn main() -> ExitCode {
    // A. Init Logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    // B. Parse Args
    let args = Cli::parse();
    #[cfg(debug_assertions)]
    log::info!("Parsed arguments: {:?}", args);
    let settings = args.run_settings();

    match run(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            log::error!("⚠️  {:#}", failure.error());
            if failure.is_fatal() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
    }
}

/// Where a run stopped.
#[derive(Debug)]
enum RunFailure {
    /// No vintage could be retrieved: the source, the runtime or every fetch failed
    Acquisition(anyhow::Error),
    /// The run produced its report but writing it failed
    Export(anyhow::Error),
}

impl RunFailure {
    fn error(&self) -> &anyhow::Error {
        match self {
            RunFailure::Acquisition(e) | RunFailure::Export(e) => e,
        }
    }

    fn is_fatal(&self) -> bool {
        matches!(self, RunFailure::Acquisition(_))
    }
}

fn run(settings: &RunSettings) -> Result<(), RunFailure> {
    let report = acquire(settings).map_err(RunFailure::Acquisition)?;

    log::info!(
        "Run complete: {}/{} vintages retrieved, {} rejected, {} conflicts, {} periods in current series",
        report.retrieved.len(),
        report.attempted,
        report.rejected.len(),
        report.panel.conflicts().len(),
        report.current_series.len()
    );
    if let Ok(forecast) = &report.forecast {
        for point in &forecast.points {
            log::info!(
                "{}: {:.0} [{:.0}, {:.0}]",
                point.period,
                point.point,
                point.lower,
                point.upper
            );
        }
    }

    // D. Presentation hand-off
    export_all(&report, &settings.output_dir).map_err(RunFailure::Export)?;
    Ok(())
}

fn acquire(settings: &RunSettings) -> Result<RunReport> {
    let source = build_source(settings)?;
    let rt = Runtime::new().context("Failed to create Tokio runtime")?;

    // C. Fetch, reconcile, analyse, forecast
    let report = rt.block_on(run_pipeline(source.as_ref(), settings))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vacancy_vintages::PipelineError;

    #[test]
    fn test_only_acquisition_failures_are_fatal() {
        assert!(RunFailure::Acquisition(anyhow::anyhow!("client")).is_fatal());
        assert!(RunFailure::Acquisition(PipelineError::NoVintages { attempted: 3 }.into()).is_fatal());
        assert!(!RunFailure::Export(anyhow::anyhow!("disk full")).is_fatal());
    }

    #[test]
    fn test_offline_run_with_empty_cache_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RunSettings {
            range: vacancy_vintages::IdentifierRange::new(2, 1),
            cache_dir: dir.path().to_path_buf(),
            offline: true,
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let failure = run(&settings).unwrap_err();
        assert!(failure.is_fatal());
        assert!(failure.error().downcast_ref::<PipelineError>().is_some());
    }
}
