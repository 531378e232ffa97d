use serde::{Deserialize, Serialize};

use crate::domain::{Periodicity, ReferencePeriod, Vintage};

// ============================================================================
// CurrentSeries: one value per reference period, as known at some vintage
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub period: ReferencePeriod,
    pub value: f64,
    /// Vintage the value was taken from (`None` for series built from raw values)
    pub vintage: Option<Vintage>,
}

/// A projection of the panel. Never edited in place: rebuild it from the panel
/// (or from values) instead.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CurrentSeries {
    pub periodicity: Periodicity,
    points: Vec<SeriesPoint>,
}

impl CurrentSeries {
    /// Points are sorted by period; duplicates keep the last one supplied.
    pub fn new(periodicity: Periodicity, mut points: Vec<SeriesPoint>) -> Self {
        points.retain(|p| p.period.periodicity == periodicity);
        points.sort_by(|a, b| a.period.cmp(&b.period));
        points.reverse();
        points.dedup_by(|later, earlier| later.period == earlier.period);
        points.reverse();
        Self {
            periodicity,
            points,
        }
    }

    /// Contiguous series starting at `start`.
    pub fn from_values(start: ReferencePeriod, values: &[f64]) -> Self {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, value)| SeriesPoint {
                period: start.offset(i as i64),
                value: *value,
                vintage: None,
            })
            .collect();
        Self {
            periodicity: start.periodicity,
            points,
        }
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn periods(&self) -> Vec<ReferencePeriod> {
        self.points.iter().map(|p| p.period).collect()
    }

    pub fn first_period(&self) -> Option<ReferencePeriod> {
        self.points.first().map(|p| p.period)
    }

    pub fn last_period(&self) -> Option<ReferencePeriod> {
        self.points.last().map(|p| p.period)
    }

    pub fn get(&self, period: &ReferencePeriod) -> Option<&SeriesPoint> {
        self.points
            .binary_search_by(|p| p.period.cmp(period))
            .ok()
            .map(|idx| &self.points[idx])
    }

    /// Number of missing periods between the first and last point.
    pub fn gap_count(&self) -> usize {
        self.points
            .windows(2)
            .map(|w| (w[1].period.ordinal() - w[0].period.ordinal() - 1).max(0) as usize)
            .sum()
    }

    /// Longest run of consecutive periods ending at the last point.
    /// A model can only be fitted on an unbroken history.
    pub fn contiguous_tail(&self) -> CurrentSeries {
        let mut start = self.points.len().saturating_sub(1);
        while start > 0 && self.points[start - 1].period.is_followed_by(&self.points[start].period) {
            start -= 1;
        }
        Self {
            periodicity: self.periodicity,
            points: self.points[start.min(self.points.len())..].to_vec(),
        }
    }
}

// ============================================================================
// Completeness: how much of the requested data actually made it through
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Completeness {
    pub vintages_requested: usize,
    pub vintages_used: usize,
    /// Periods in the current series
    pub periods_available: usize,
    /// Periods the model was fitted on
    pub periods_used: usize,
}

impl Completeness {
    pub fn is_complete(&self) -> bool {
        self.vintages_used == self.vintages_requested
            && self.periods_used == self.periods_available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jan(year: i32) -> ReferencePeriod {
        ReferencePeriod::monthly(year, 1).unwrap()
    }

    #[test]
    fn test_from_values_is_contiguous() {
        let series = CurrentSeries::from_values(ReferencePeriod::monthly(2023, 11).unwrap(), &[1.0, 2.0, 3.0]);
        let periods = series.periods();
        assert_eq!(periods[2], jan(2024));
        assert_eq!(series.gap_count(), 0);
        assert_eq!(series.contiguous_tail().len(), 3);
    }

    #[test]
    fn test_contiguous_tail_after_gap() {
        let points = [0_i64, 1, 4, 5, 6]
            .iter()
            .map(|offset| SeriesPoint {
                period: jan(2020).offset(*offset),
                value: *offset as f64,
                vintage: None,
            })
            .collect();
        let series = CurrentSeries::new(Periodicity::Monthly, points);

        assert_eq!(series.gap_count(), 2);
        let tail = series.contiguous_tail();
        assert_eq!(tail.values(), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_new_sorts_and_deduplicates() {
        let p = |offset: i64, value: f64| SeriesPoint {
            period: jan(2020).offset(offset),
            value,
            vintage: None,
        };
        let series = CurrentSeries::new(Periodicity::Monthly, vec![p(2, 3.0), p(0, 1.0), p(2, 9.0)]);
        assert_eq!(series.values(), vec![1.0, 9.0]);
        assert_eq!(series.get(&jan(2020).offset(2)).unwrap().value, 9.0);
    }

    #[test]
    fn test_completeness() {
        let full = Completeness {
            vintages_requested: 3,
            vintages_used: 3,
            periods_available: 10,
            periods_used: 10,
        };
        assert!(full.is_complete());
        assert!(!Completeness { vintages_used: 2, ..full }.is_complete());
    }
}
