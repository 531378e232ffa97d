use std::collections::BTreeMap;

use argminmax::ArgMinMax;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::config::DEBUG_FLAGS;
use crate::domain::{ReferencePeriod, Vintage};
use crate::models::Panel;

// Revisions smaller than this are reported as unchanged
const UNCHANGED_TOLERANCE: f64 = 1e-9;

/// How one period's value moved between two vintages.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RevisionRecord {
    pub period: ReferencePeriod,
    pub from: Vintage,
    pub to: Vintage,
    pub initial_value: f64,
    pub latest_value: f64,
    pub absolute_revision: f64,
    /// `None` when the initial value is zero
    pub relative_revision: Option<f64>,
    /// Vintages elapsed between `from` and `to`, counting only vintages that reported the period
    pub horizon: usize,
}

impl RevisionRecord {
    fn between(period: ReferencePeriod, from: (Vintage, f64), to: (Vintage, f64), horizon: usize) -> Self {
        let absolute_revision = to.1 - from.1;
        Self {
            period,
            from: from.0,
            to: to.0,
            initial_value: from.1,
            latest_value: to.1,
            absolute_revision,
            relative_revision: (from.1 != 0.0).then(|| absolute_revision / from.1),
            horizon,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Revisions {
    /// One record per period with at least two vintages
    pub first_to_latest: Vec<RevisionRecord>,
    /// `n - 1` step records per period (vintage k-1 to k), horizon = k
    pub by_horizon: Vec<RevisionRecord>,
    /// Periods reported by a single vintage; they carry no revision
    pub excluded_periods: Vec<ReferencePeriod>,
}

/// Build every revision record the panel supports.
pub fn compute_revisions(panel: &Panel) -> Revisions {
    let mut revisions = Revisions::default();

    for (period, row) in panel.rows() {
        let history: Vec<(Vintage, f64)> = row.iter().map(|(v, x)| (*v, *x)).collect();
        if history.len() < 2 {
            revisions.excluded_periods.push(*period);
            continue;
        }
        let (first, last) = (history[0], history[history.len() - 1]);
        revisions
            .first_to_latest
            .push(RevisionRecord::between(*period, first, last, history.len() - 1));

        for (k, step) in history.windows(2).enumerate() {
            revisions
                .by_horizon
                .push(RevisionRecord::between(*period, step[0], step[1], k + 1));
        }
    }

    if DEBUG_FLAGS.print_revisions {
        for record in &revisions.first_to_latest {
            log::info!(
                "{}: {} -> {} ({:+}) over {} vintages",
                record.period,
                record.initial_value,
                record.latest_value,
                record.absolute_revision,
                record.horizon
            );
        }
    }
    log::info!(
        "Revisions: {} periods revised, {} single-vintage periods excluded",
        revisions.first_to_latest.len(),
        revisions.excluded_periods.len()
    );
    revisions
}

/// Compare any two vintages on the periods both of them report.
pub fn compare_vintages(panel: &Panel, a: &Vintage, b: &Vintage) -> Vec<RevisionRecord> {
    let (from, to) = if a <= b { (*a, *b) } else { (*b, *a) };

    panel
        .rows()
        .filter_map(|(period, row)| {
            let initial = *row.get(&from)?;
            let latest = *row.get(&to)?;
            let horizon = row.range(from..=to).count().saturating_sub(1);
            Some(RevisionRecord::between(*period, (from, initial), (to, latest), horizon))
        })
        .collect()
}

/// Extreme revision and where it happened.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RevisionExtreme {
    pub period: ReferencePeriod,
    pub revision: f64,
}

/// Aggregates over included records only. The statistics are `None` when
/// `included_periods` is zero (and `volatility` when it is below two).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RevisionSummary {
    pub included_periods: usize,
    pub mean: Option<f64>,
    pub mean_absolute: Option<f64>,
    pub volatility: Option<f64>,
    pub upward: usize,
    pub downward: usize,
    pub unchanged: usize,
    pub largest_upward: Option<RevisionExtreme>,
    pub largest_downward: Option<RevisionExtreme>,
}

impl RevisionSummary {
    pub fn from_records(records: &[RevisionRecord]) -> Self {
        let moves: Vec<f64> = records.iter().map(|r| r.absolute_revision).collect();
        let count = moves.len();

        let upward = moves.iter().filter(|m| **m > UNCHANGED_TOLERANCE).count();
        let downward = moves.iter().filter(|m| **m < -UNCHANGED_TOLERANCE).count();

        let (largest_upward, largest_downward) = if count == 0 {
            (None, None)
        } else {
            let (min_idx, max_idx) = moves.as_slice().argminmax();
            let extreme = |idx: usize| RevisionExtreme {
                period: records[idx].period,
                revision: moves[idx],
            };
            (
                (moves[max_idx] > UNCHANGED_TOLERANCE).then(|| extreme(max_idx)),
                (moves[min_idx] < -UNCHANGED_TOLERANCE).then(|| extreme(min_idx)),
            )
        };

        Self {
            included_periods: count,
            mean: (count > 0).then(|| moves.iter().mean()),
            mean_absolute: (count > 0).then(|| moves.iter().map(|m| m.abs()).mean()),
            volatility: (count > 1).then(|| moves.iter().std_dev()),
            upward,
            downward,
            unchanged: count - upward - downward,
            largest_upward,
            largest_downward,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HorizonSummary {
    pub horizon: usize,
    pub summary: RevisionSummary,
}

/// One summary per step horizon, ascending.
pub fn summarise_by_horizon(revisions: &Revisions) -> Vec<HorizonSummary> {
    let grouped: BTreeMap<usize, Vec<RevisionRecord>> = revisions
        .by_horizon
        .iter()
        .copied()
        .into_group_map_by(|r| r.horizon)
        .into_iter()
        .collect();

    grouped
        .into_iter()
        .map(|(horizon, records)| HorizonSummary {
            horizon,
            summary: RevisionSummary::from_records(&records),
        })
        .collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RevisionPathPoint {
    pub vintage: Vintage,
    pub value: f64,
    pub change: Option<f64>,
}

/// Value of one period in every vintage that reported it, in publication order.
pub fn revision_path(panel: &Panel, period: &ReferencePeriod) -> Vec<RevisionPathPoint> {
    let history = panel.vintages_for(period);
    let mut previous: Option<f64> = None;
    history
        .into_iter()
        .map(|(vintage, value)| {
            let point = RevisionPathPoint {
                vintage,
                value,
                change: previous.map(|p| value - p),
            };
            previous = Some(value);
            point
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Observation, Periodicity, VintageId};
    use crate::models::consolidate;
    use chrono::NaiveDate;

    fn vintage(id: u32) -> Vintage {
        Vintage::new(VintageId(id), NaiveDate::from_ymd_opt(2024, 6, id).unwrap())
    }

    fn obs(month: u32, id: u32, value: f64) -> Observation {
        Observation {
            period: ReferencePeriod::monthly(2024, month).unwrap(),
            vintage: vintage(id),
            value,
        }
    }

    /// Jan in 3 vintages, Feb in 2, Mar in 1.
    fn panel() -> Panel {
        consolidate(
            Periodicity::Monthly,
            vec![
                vec![obs(1, 1, 100.0)],
                vec![obs(1, 2, 104.0), obs(2, 2, 200.0)],
                vec![obs(1, 3, 103.0), obs(2, 3, 190.0), obs(3, 3, 300.0)],
            ],
        )
    }

    #[test]
    fn test_record_counts_follow_vintage_counts() {
        let revisions = compute_revisions(&panel());

        assert_eq!(revisions.first_to_latest.len(), 2);
        // Jan: 2 steps, Feb: 1 step
        assert_eq!(revisions.by_horizon.len(), 3);
        assert_eq!(
            revisions.excluded_periods,
            vec![ReferencePeriod::monthly(2024, 3).unwrap()]
        );

        let jan = &revisions.first_to_latest[0];
        assert_eq!(jan.initial_value, 100.0);
        assert_eq!(jan.latest_value, 103.0);
        assert_eq!(jan.absolute_revision, 3.0);
        assert_eq!(jan.relative_revision, Some(0.03));
        assert_eq!(jan.horizon, 2);
    }

    #[test]
    fn test_single_vintage_periods_do_not_bias_summary() {
        let revisions = compute_revisions(&panel());
        let summary = RevisionSummary::from_records(&revisions.first_to_latest);

        assert_eq!(summary.included_periods, 2);
        assert_eq!(summary.mean, Some(-3.5));
        assert_eq!(summary.mean_absolute, Some(6.5));
        assert_eq!(summary.upward, 1);
        assert_eq!(summary.downward, 1);
        assert_eq!(summary.largest_downward.unwrap().revision, -10.0);
        assert!(summary.volatility.unwrap() > 0.0);
    }

    #[test]
    fn test_empty_summary_has_no_statistics() {
        let summary = RevisionSummary::from_records(&[]);
        assert_eq!(summary.included_periods, 0);
        assert_eq!(summary.mean, None);
        assert_eq!(summary.volatility, None);
        assert!(summary.largest_upward.is_none());
    }

    #[test]
    fn test_by_horizon() {
        let summaries = summarise_by_horizon(&compute_revisions(&panel()));
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].horizon, 1);
        assert_eq!(summaries[0].summary.included_periods, 2);
        assert_eq!(summaries[1].summary.included_periods, 1);
        assert_eq!(summaries[1].summary.mean, Some(-1.0));
    }

    #[test]
    fn test_compare_any_two_vintages() {
        let panel = panel();
        let records = compare_vintages(&panel, &vintage(3), &vintage(1));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].absolute_revision, 3.0);
        assert_eq!(records[0].horizon, 2);
    }

    #[test]
    fn test_revision_path() {
        let path = revision_path(&panel(), &ReferencePeriod::monthly(2024, 1).unwrap());
        let changes: Vec<Option<f64>> = path.iter().map(|p| p.change).collect();
        assert_eq!(changes, vec![None, Some(4.0), Some(-1.0)]);
    }
}
