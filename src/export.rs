//! Hand-off to presentation: the long-form panel as CSV and a JSON report of
//! the derived views.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::analysis::{HorizonSummary, RevisionRecord, RevisionSummary};
use crate::config::PERSISTENCE;
use crate::domain::{ReferencePeriod, VintageId};
use crate::engine::ForecastResult;
use crate::models::{ConflictWarning, ConsolidationWarning, CurrentSeries, Panel};
use crate::pipeline::RunReport;

#[derive(Serialize)]
struct ConsolidatedRow {
    #[serde(rename = "MonthLabel")]
    month_label: String,
    #[serde(rename = "Value")]
    value: f64,
    #[serde(rename = "Vintage")]
    vintage: String,
    #[serde(rename = "VintageId")]
    vintage_id: String,
}

/// Write every panel cell, one row per (period, vintage), periods ascending and
/// vintages in release order. `;` separated.
pub fn write_consolidated_csv(panel: &Panel, path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .context(format!("Failed to create directory: {}", parent.display()))?;
    }
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .context(format!("Failed to create file: {}", path.display()))?;

    let mut rows = 0;
    for (period, cells) in panel.rows() {
        for (vintage, value) in cells {
            writer
                .serialize(ConsolidatedRow {
                    month_label: period.label(),
                    value: *value,
                    vintage: vintage.released.format("%Y-%m-%d").to_string(),
                    vintage_id: vintage.id.to_string(),
                })
                .context(format!("Failed to write row for {}", period))?;
            rows += 1;
        }
    }
    writer
        .flush()
        .context(format!("Failed to flush {}", path.display()))?;
    Ok(rows)
}

#[derive(Serialize)]
struct FailureView {
    id: VintageId,
    error: String,
}

#[derive(Serialize)]
struct AcquisitionView {
    attempted: usize,
    retrieved: Vec<VintageId>,
    failed: Vec<FailureView>,
    rejected: Vec<FailureView>,
    skipped_rows: usize,
}

/// Serializable snapshot of a `RunReport`.
#[derive(Serialize)]
struct ReportView<'a> {
    acquisition: AcquisitionView,
    vintages_in_panel: usize,
    periods_in_panel: usize,
    conflicts: &'a [ConflictWarning],
    warnings: &'a [ConsolidationWarning],
    current_series: &'a CurrentSeries,
    revisions: &'a [RevisionRecord],
    excluded_periods: &'a [ReferencePeriod],
    revision_summary: &'a RevisionSummary,
    revision_by_horizon: &'a [HorizonSummary],
    forecast: Option<&'a ForecastResult>,
    forecast_error: Option<String>,
}

impl<'a> ReportView<'a> {
    fn from_report(report: &'a RunReport) -> Self {
        let (forecast, forecast_error) = match &report.forecast {
            Ok(result) => (Some(result), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            acquisition: AcquisitionView {
                attempted: report.attempted,
                retrieved: report.retrieved.clone(),
                failed: report
                    .fetch_failures
                    .iter()
                    .map(|f| FailureView {
                        id: f.id,
                        error: f.error.to_string(),
                    })
                    .collect(),
                rejected: report
                    .rejected
                    .iter()
                    .map(|r| FailureView {
                        id: r.id,
                        error: r.error.to_string(),
                    })
                    .collect(),
                skipped_rows: report.skipped_rows(),
            },
            vintages_in_panel: report.panel.vintage_count(),
            periods_in_panel: report.panel.periods().count(),
            conflicts: report.panel.conflicts(),
            warnings: report.panel.warnings(),
            current_series: &report.current_series,
            revisions: &report.revisions.first_to_latest,
            excluded_periods: &report.revisions.excluded_periods,
            revision_summary: &report.revision_summary,
            revision_by_horizon: &report.horizon_summaries,
            forecast,
            forecast_error,
        }
    }
}

pub fn write_report_json(report: &RunReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .context(format!("Failed to create directory: {}", parent.display()))?;
    }
    let file = File::create(path).context(format!("Failed to create file: {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &ReportView::from_report(report))
        .context(format!("Failed to serialize report to: {}", path.display()))
}

/// Write both outputs into `directory` under their configured names.
pub fn export_all(report: &RunReport, directory: &Path) -> Result<(PathBuf, PathBuf)> {
    let csv_path = directory.join(PERSISTENCE.reports.consolidated_filename);
    let json_path = directory.join(PERSISTENCE.reports.report_filename);

    let rows = write_consolidated_csv(&report.panel, &csv_path)?;
    log::info!("✅ Consolidated panel written: {} ({} rows)", csv_path.display(), rows);
    write_report_json(report, &json_path)?;
    log::info!("✅ Report written: {}", json_path.display());
    Ok((csv_path, json_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Observation, Periodicity, Vintage};
    use crate::models::consolidate;
    use chrono::NaiveDate;

    fn panel() -> Panel {
        let v1 = Vintage::new(VintageId(57), NaiveDate::from_ymd_opt(2024, 3, 12).unwrap());
        let v2 = Vintage::new(VintageId(58), NaiveDate::from_ymd_opt(2024, 4, 16).unwrap());
        let jan = ReferencePeriod::monthly(2024, 1).unwrap();
        let feb = ReferencePeriod::monthly(2024, 2).unwrap();
        consolidate(
            Periodicity::Monthly,
            [
                vec![
                    Observation { period: jan, vintage: v1, value: 908.0 },
                    Observation { period: feb, vintage: v1, value: 916.0 },
                ],
                vec![Observation { period: jan, vintage: v2, value: 911.0 }],
            ],
        )
    }

    #[test]
    fn test_consolidated_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("panel.csv");
        let rows = write_consolidated_csv(&panel(), &path).unwrap();
        assert_eq!(rows, 3);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "MonthLabel;Value;Vintage;VintageId");
        assert_eq!(lines[1], "Jan 2024;908.0;2024-03-12;v57");
        assert_eq!(lines[2], "Jan 2024;911.0;2024-04-16;v58");
        assert_eq!(lines[3], "Feb 2024;916.0;2024-03-12;v57");
    }
}
