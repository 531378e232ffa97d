use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::period::ReferencePeriod;

/// The publisher's release number, e.g. the `117` in `.../previous/v117`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VintageId(pub u32);

impl fmt::Display for VintageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// One publication release. Ordered by release date, then by id, so two
/// releases on the same day still have a stable order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Vintage {
    pub released: NaiveDate,
    pub id: VintageId,
}

impl Vintage {
    pub fn new(id: VintageId, released: NaiveDate) -> Self {
        Self { released, id }
    }
}

impl fmt::Display for Vintage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.released)
    }
}

/// Closed range of release numbers, walked in the direction given.
/// `117..=58` walks newest to oldest, `58..=117` oldest to newest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierRange {
    pub from: u32,
    pub to: u32,
}

impl IdentifierRange {
    pub fn new(from: u32, to: u32) -> Self {
        Self { from, to }
    }

    pub fn len(&self) -> usize {
        self.from.abs_diff(self.to) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn ids(&self) -> Vec<VintageId> {
        if self.from >= self.to {
            (self.to..=self.from).rev().map(VintageId).collect()
        } else {
            (self.from..=self.to).map(VintageId).collect()
        }
    }
}

/// A single reported value: one reference period as published in one vintage.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub period: ReferencePeriod,
    pub vintage: Vintage,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_range_direction() {
        let newest_first = IdentifierRange::new(117, 115);
        assert_eq!(
            newest_first.ids(),
            vec![VintageId(117), VintageId(116), VintageId(115)]
        );
        assert_eq!(newest_first.len(), 3);

        let oldest_first = IdentifierRange::new(58, 60);
        assert_eq!(oldest_first.ids(), vec![VintageId(58), VintageId(59), VintageId(60)]);
        assert_eq!(IdentifierRange::new(7, 7).ids(), vec![VintageId(7)]);
    }

    #[test]
    fn test_vintage_orders_by_release_date_first() {
        let older = Vintage::new(VintageId(90), date(2023, 1, 10));
        let newer_low_id = Vintage::new(VintageId(80), date(2023, 2, 14));
        assert!(older < newer_low_id);

        let same_day_a = Vintage::new(VintageId(1), date(2023, 3, 1));
        let same_day_b = Vintage::new(VintageId(2), date(2023, 3, 1));
        assert!(same_day_a < same_day_b);
    }
}
