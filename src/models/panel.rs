//! The multi-vintage panel.
//!
//! Built once per run through `PanelBuilder` (append-only), then read-only.
//! Every projection orders vintages by release date, never by the order in
//! which files happened to be ingested.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::data::parser::ParsedVintage;
use crate::domain::{Observation, Periodicity, ReferencePeriod, Vintage, VintageId};
use crate::models::timeseries::{CurrentSeries, SeriesPoint};

/// Two ingested sources disagreed on one `(period, vintage)` cell.
/// The later-ingested value was kept.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConflictWarning {
    pub period: ReferencePeriod,
    pub vintage: Vintage,
    pub previous_value: f64,
    pub kept_value: f64,
}

/// Everything else consolidation noticed and acted on.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ConsolidationWarning {
    /// Observation for a period that starts after its vintage was released; dropped
    PrePublication {
        period: ReferencePeriod,
        vintage: Vintage,
    },
    /// A higher release number was published earlier than a lower one
    OrderingMismatch { earlier_id: VintageId, later_id: VintageId },
    /// Observation of another frequency; dropped
    PeriodicityMismatch {
        period: ReferencePeriod,
        vintage: Vintage,
    },
    /// The same release number seen with two release dates; the later date was kept
    ReleaseDateChanged {
        id: VintageId,
        dropped: Vintage,
        kept: Vintage,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    periodicity: Periodicity,
    cells: BTreeMap<ReferencePeriod, BTreeMap<Vintage, f64>>,
    vintages: BTreeSet<Vintage>,
    vintages_requested: usize,
    conflicts: Vec<ConflictWarning>,
    warnings: Vec<ConsolidationWarning>,
}

impl Panel {
    pub fn periodicity(&self) -> Periodicity {
        self.periodicity
    }

    /// Number of `(period, vintage)` cells.
    pub fn len(&self) -> usize {
        self.cells.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// All reference periods, ascending.
    pub fn periods(&self) -> impl Iterator<Item = &ReferencePeriod> {
        self.cells.keys()
    }

    /// All ingested vintages in publication order.
    pub fn vintages(&self) -> impl Iterator<Item = &Vintage> {
        self.vintages.iter()
    }

    pub fn vintage_count(&self) -> usize {
        self.vintages.len()
    }

    /// Vintages that own at least one cell. A registered vintage whose
    /// observations were all skipped or dropped does not count.
    pub fn contributing_vintages(&self) -> BTreeSet<Vintage> {
        self.cells.values().flat_map(|row| row.keys().copied()).collect()
    }

    pub fn latest_vintage(&self) -> Option<Vintage> {
        self.vintages.last().copied()
    }

    pub fn find_vintage(&self, id: VintageId) -> Option<Vintage> {
        self.vintages.iter().find(|v| v.id == id).copied()
    }

    /// Requested vintage count for completeness reporting (falls back to what was ingested).
    pub fn vintages_requested(&self) -> usize {
        self.vintages_requested.max(self.vintages.len())
    }

    pub fn conflicts(&self) -> &[ConflictWarning] {
        &self.conflicts
    }

    pub fn warnings(&self) -> &[ConsolidationWarning] {
        &self.warnings
    }

    pub fn value(&self, period: &ReferencePeriod, vintage: &Vintage) -> Option<f64> {
        self.cells.get(period)?.get(vintage).copied()
    }

    /// Values reported for one period, in publication order.
    pub fn vintages_for(&self, period: &ReferencePeriod) -> Vec<(Vintage, f64)> {
        self.cells
            .get(period)
            .map(|row| row.iter().map(|(v, x)| (*v, *x)).collect())
            .unwrap_or_default()
    }

    /// Per-period rows, for the revision analysis.
    pub fn rows(&self) -> impl Iterator<Item = (&ReferencePeriod, &BTreeMap<Vintage, f64>)> {
        self.cells.iter()
    }

    /// Latest published value for every period.
    pub fn current_series(&self) -> CurrentSeries {
        self.project(|row| row.iter().next_back())
    }

    /// The series as it was known right after `vintage` was released.
    pub fn as_of(&self, vintage: &Vintage) -> CurrentSeries {
        self.project(|row| row.range(..=*vintage).next_back())
    }

    fn project<'a>(
        &'a self,
        pick: impl Fn(&'a BTreeMap<Vintage, f64>) -> Option<(&'a Vintage, &'a f64)>,
    ) -> CurrentSeries {
        let points = self
            .cells
            .iter()
            .filter_map(|(period, row)| {
                pick(row).map(|(vintage, value)| SeriesPoint {
                    period: *period,
                    value: *value,
                    vintage: Some(*vintage),
                })
            })
            .collect();
        CurrentSeries::new(self.periodicity, points)
    }
}

/// Accumulates parsed vintages into a `Panel`.
#[derive(Debug, Clone)]
pub struct PanelBuilder {
    panel: Panel,
    ids: HashMap<VintageId, Vintage>,
}

/// What one ingest call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub inserted: usize,
    pub unchanged: usize,
    pub conflicts: usize,
    pub dropped: usize,
}

impl PanelBuilder {
    pub fn new(periodicity: Periodicity) -> Self {
        Self {
            panel: Panel {
                periodicity,
                cells: BTreeMap::new(),
                vintages: BTreeSet::new(),
                vintages_requested: 0,
                conflicts: Vec::new(),
                warnings: Vec::new(),
            },
            ids: HashMap::new(),
        }
    }

    pub fn expect_vintages(mut self, requested: usize) -> Self {
        self.panel.vintages_requested = requested;
        self
    }

    /// Register a vintage even if it contributed no observations.
    pub fn register(&mut self, vintage: Vintage) {
        match self.ids.get(&vintage.id).copied() {
            None => {
                self.ids.insert(vintage.id, vintage);
                self.panel.vintages.insert(vintage);
            }
            Some(previous) if previous != vintage => {
                let (dropped, kept) = if vintage.released > previous.released {
                    (previous, vintage)
                } else {
                    (vintage, previous)
                };
                if kept != previous {
                    self.rekey(previous, kept);
                }
                let warning = ConsolidationWarning::ReleaseDateChanged {
                    id: vintage.id,
                    dropped,
                    kept,
                };
                // Every observation of a re-dated file passes through here
                if !self.panel.warnings.contains(&warning) {
                    log::warn!(
                        "⚠️  {} seen with release dates {} and {}; keeping {}",
                        vintage.id,
                        previous.released,
                        vintage.released,
                        kept.released
                    );
                    self.panel.warnings.push(warning);
                }
            }
            Some(_) => {}
        }
    }

    fn rekey(&mut self, previous: Vintage, kept: Vintage) {
        for row in self.panel.cells.values_mut() {
            if let Some(value) = row.remove(&previous) {
                row.insert(kept, value);
            }
        }
        self.panel.vintages.remove(&previous);
        self.panel.vintages.insert(kept);
        self.ids.insert(kept.id, kept);
    }

    pub fn ingest(&mut self, parsed: &ParsedVintage) -> IngestSummary {
        self.register(parsed.vintage);
        self.ingest_observations(&parsed.observations)
    }

    /// Merge one observation set. Later calls win on conflicting cells.
    pub fn ingest_observations(&mut self, observations: &[Observation]) -> IngestSummary {
        let mut summary = IngestSummary::default();

        for obs in observations {
            self.register(obs.vintage);
            // Re-dated releases are stored under the later of their dates
            let vintage = self.ids.get(&obs.vintage.id).copied().unwrap_or(obs.vintage);

            if obs.period.periodicity != self.panel.periodicity {
                self.panel
                    .warnings
                    .push(ConsolidationWarning::PeriodicityMismatch {
                        period: obs.period,
                        vintage,
                    });
                summary.dropped += 1;
                continue;
            }
            if obs.period.first_day() > vintage.released {
                log::warn!(
                    "⚠️  Dropping {} from {}: period starts after the release date",
                    obs.period,
                    vintage
                );
                self.panel.warnings.push(ConsolidationWarning::PrePublication {
                    period: obs.period,
                    vintage,
                });
                summary.dropped += 1;
                continue;
            }

            let row = self.panel.cells.entry(obs.period).or_default();
            match row.insert(vintage, obs.value) {
                None => summary.inserted += 1,
                Some(previous) if previous == obs.value => summary.unchanged += 1,
                Some(previous) => {
                    log::warn!(
                        "⚠️  Conflict for {} in {}: {} replaced by {}",
                        obs.period,
                        vintage,
                        previous,
                        obs.value
                    );
                    self.panel.conflicts.push(ConflictWarning {
                        period: obs.period,
                        vintage,
                        previous_value: previous,
                        kept_value: obs.value,
                    });
                    summary.conflicts += 1;
                }
            }
        }
        summary
    }

    pub fn build(mut self) -> Panel {
        // Publication order must agree with release numbering
        let mut by_id: Vec<Vintage> = self.panel.vintages.iter().copied().collect();
        by_id.sort_by_key(|v| v.id);
        for pair in by_id.windows(2) {
            if pair[1].released < pair[0].released {
                log::warn!(
                    "⚠️  {} was released before {} ({} < {}); ordering by release date",
                    pair[1].id,
                    pair[0].id,
                    pair[1].released,
                    pair[0].released
                );
                self.panel
                    .warnings
                    .push(ConsolidationWarning::OrderingMismatch {
                        earlier_id: pair[0].id,
                        later_id: pair[1].id,
                    });
            }
        }

        log::info!(
            "Panel consolidated: {} vintages, {} periods, {} cells, {} conflicts, {} warnings",
            self.panel.vintages.len(),
            self.panel.cells.len(),
            self.panel.len(),
            self.panel.conflicts.len(),
            self.panel.warnings.len()
        );
        self.panel
    }
}

/// Merge observation sets, in ingestion order, into a panel.
pub fn consolidate<S: AsRef<[Observation]>>(
    periodicity: Periodicity,
    sets: impl IntoIterator<Item = S>,
) -> Panel {
    let mut builder = PanelBuilder::new(periodicity);
    for set in sets {
        builder.ingest_observations(set.as_ref());
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn vintage(id: u32, month: u32) -> Vintage {
        Vintage::new(VintageId(id), NaiveDate::from_ymd_opt(2024, month, 15).unwrap())
    }

    fn obs(month: u32, vintage: Vintage, value: f64) -> Observation {
        Observation {
            period: ReferencePeriod::monthly(2024, month).unwrap(),
            vintage,
            value,
        }
    }

    fn three_vintage_sets() -> Vec<Vec<Observation>> {
        let (v1, v2, v3) = (vintage(1, 3), vintage(2, 4), vintage(3, 5));
        vec![
            vec![obs(1, v1, 900.0), obs(2, v1, 910.0)],
            vec![obs(1, v2, 905.0), obs(2, v2, 912.0), obs(3, v2, 920.0)],
            vec![obs(2, v3, 915.0), obs(3, v3, 918.0), obs(4, v3, 925.0)],
        ]
    }

    #[test]
    fn test_current_series_takes_latest_vintage() {
        let panel = consolidate(Periodicity::Monthly, three_vintage_sets());
        let current = panel.current_series();

        assert_eq!(current.values(), vec![905.0, 915.0, 918.0, 925.0]);
        assert_eq!(current.points()[0].vintage, Some(vintage(2, 4)));
        for point in current.points() {
            let latest = panel.vintages_for(&point.period).last().copied().unwrap();
            assert_eq!(point.value, latest.1);
        }
    }

    #[test]
    fn test_as_of_projection() {
        let panel = consolidate(Periodicity::Monthly, three_vintage_sets());
        let first = panel.as_of(&vintage(1, 3));
        assert_eq!(first.values(), vec![900.0, 910.0]);

        let second = panel.as_of(&vintage(2, 4));
        assert_eq!(second.values(), vec![905.0, 912.0, 920.0]);
    }

    #[test]
    fn test_reingesting_identical_vintage_is_noop() {
        let sets = three_vintage_sets();
        let once = consolidate(Periodicity::Monthly, sets.clone());

        let mut twice_sets = sets.clone();
        twice_sets.push(sets[1].clone());
        let twice = consolidate(Periodicity::Monthly, twice_sets);

        assert_eq!(once, twice);
        assert!(twice.conflicts().is_empty());
    }

    #[test]
    fn test_conflicting_value_later_ingest_wins() {
        let v2 = vintage(2, 4);
        let panel = consolidate(
            Periodicity::Monthly,
            vec![vec![obs(1, v2, 905.0)], vec![obs(1, v2, 907.0)]],
        );

        assert_eq!(panel.value(&ReferencePeriod::monthly(2024, 1).unwrap(), &v2), Some(907.0));
        assert_eq!(panel.conflicts().len(), 1);
        assert_eq!(panel.conflicts()[0].previous_value, 905.0);
        assert_eq!(panel.conflicts()[0].kept_value, 907.0);
    }

    #[test]
    fn test_pre_publication_observation_dropped() {
        let v = vintage(1, 3);
        let panel = consolidate(Periodicity::Monthly, vec![vec![obs(2, v, 1.0), obs(6, v, 2.0)]]);

        assert_eq!(panel.len(), 1);
        assert!(matches!(
            panel.warnings()[0],
            ConsolidationWarning::PrePublication { .. }
        ));
    }

    #[test]
    fn test_release_order_beats_ingest_order_and_id_order() {
        // v10 was released after v11
        let (late, early) = (vintage(10, 6), vintage(11, 4));
        let panel = consolidate(
            Periodicity::Monthly,
            vec![vec![obs(1, late, 2.0)], vec![obs(1, early, 1.0)]],
        );

        assert_eq!(panel.current_series().values(), vec![2.0]);
        assert_eq!(panel.latest_vintage(), Some(late));
        assert!(panel.warnings().contains(&ConsolidationWarning::OrderingMismatch {
            earlier_id: VintageId(10),
            later_id: VintageId(11),
        }));
    }

    #[test]
    fn test_periodicity_mismatch_dropped() {
        let v = vintage(1, 12);
        let quarter = Observation {
            period: ReferencePeriod::quarterly(2024, 1).unwrap(),
            vintage: v,
            value: 1.0,
        };
        let panel = consolidate(Periodicity::Monthly, vec![vec![quarter]]);
        assert!(panel.is_empty());
        assert_eq!(panel.vintage_count(), 1);
    }

    #[test]
    fn test_release_date_change_keeps_later_date() {
        let (june, april) = (vintage(5, 6), vintage(5, 4));
        let panel = consolidate(
            Periodicity::Monthly,
            vec![vec![obs(1, june, 900.0)], vec![obs(2, april, 910.0), obs(3, april, 920.0)]],
        );

        assert_eq!(panel.find_vintage(VintageId(5)), Some(june));
        assert_eq!(panel.vintage_count(), 1);
        assert_eq!(panel.value(&ReferencePeriod::monthly(2024, 2).unwrap(), &june), Some(910.0));
        assert_eq!(
            panel.warnings(),
            &[ConsolidationWarning::ReleaseDateChanged {
                id: VintageId(5),
                dropped: april,
                kept: june,
            }]
        );

        // Earlier date first: cells move to the later date
        let panel = consolidate(
            Periodicity::Monthly,
            vec![vec![obs(1, april, 900.0)], vec![obs(2, june, 910.0)]],
        );
        assert_eq!(panel.find_vintage(VintageId(5)), Some(june));
        assert_eq!(panel.value(&ReferencePeriod::monthly(2024, 1).unwrap(), &june), Some(900.0));
        assert!(panel.warnings().contains(&ConsolidationWarning::ReleaseDateChanged {
            id: VintageId(5),
            dropped: april,
            kept: june,
        }));
    }

    #[test]
    fn test_contributing_vintages_ignore_empty_ones() {
        let (v1, v2) = (vintage(1, 3), vintage(2, 4));
        let mut builder = PanelBuilder::new(Periodicity::Monthly).expect_vintages(2);
        builder.ingest_observations(&[obs(1, v1, 900.0)]);
        builder.register(v2);
        let panel = builder.build();

        assert_eq!(panel.vintage_count(), 2);
        assert_eq!(panel.contributing_vintages().len(), 1);
        assert!(panel.contributing_vintages().contains(&v1));
    }

    #[test]
    fn test_requested_count_reported() {
        let builder = PanelBuilder::new(Periodicity::Monthly).expect_vintages(5);
        let panel = builder.build();
        assert_eq!(panel.vintages_requested(), 5);
        assert!(panel.current_series().is_empty());
    }
}
