use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::error::ParseError;

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumIter, Display,
)]
pub enum Periodicity {
    Monthly,
    Quarterly,
}

impl Periodicity {
    /// Number of periods in one calendar year.
    pub fn periods_per_year(&self) -> u32 {
        match self {
            Periodicity::Monthly => 12,
            Periodicity::Quarterly => 4,
        }
    }

    /// Seasonal lag used when looking for annual seasonality.
    pub fn seasonal_period(&self) -> usize {
        self.periods_per_year() as usize
    }
}

/// The calendar period an observation describes (not when it was published).
///
/// `index` is 1-based: month 1..=12 or quarter 1..=4.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferencePeriod {
    pub periodicity: Periodicity,
    pub year: i32,
    pub index: u32,
}

impl ReferencePeriod {
    pub fn monthly(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self {
            periodicity: Periodicity::Monthly,
            year,
            index: month,
        })
    }

    pub fn quarterly(year: i32, quarter: u32) -> Option<Self> {
        (1..=4).contains(&quarter).then_some(Self {
            periodicity: Periodicity::Quarterly,
            year,
            index: quarter,
        })
    }

    /// Parse the period labels used across publication eras.
    ///
    /// Accepted: `2024 FEB`, `2024 Feb`, `FEB 2024`, `2024-02`, `2024 Q1`.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let text = raw.trim().trim_matches('"').trim();
        let bad = || ParseError::BadPeriod(raw.trim().to_string());

        if let Some((year, month)) = text.split_once('-') {
            let year: i32 = year.trim().parse().map_err(|_| bad())?;
            let month: u32 = month.trim().parse().map_err(|_| bad())?;
            return Self::monthly(year, month).ok_or_else(bad);
        }

        let mut parts = text.split_whitespace();
        let (first, second) = match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(b), None) => (a, b),
            _ => return Err(bad()),
        };

        let (year_part, tag) = if first.chars().all(|c| c.is_ascii_digit()) {
            (first, second)
        } else {
            (second, first)
        };
        if year_part.len() != 4 {
            return Err(bad());
        }
        let year: i32 = year_part.parse().map_err(|_| bad())?;
        let tag = tag.to_ascii_uppercase();

        if let Some(quarter) = tag.strip_prefix('Q') {
            let quarter: u32 = quarter.parse().map_err(|_| bad())?;
            return Self::quarterly(year, quarter).ok_or_else(bad);
        }

        let month = MONTHS
            .iter()
            .position(|m| *m == tag)
            .ok_or_else(bad)?;
        Self::monthly(year, month as u32 + 1).ok_or_else(bad)
    }

    /// First calendar day covered by this period.
    pub fn first_day(&self) -> NaiveDate {
        let month = match self.periodicity {
            Periodicity::Monthly => self.index,
            Periodicity::Quarterly => (self.index - 1) * 3 + 1,
        };
        // index is validated at construction so the date always exists
        NaiveDate::from_ymd_opt(self.year, month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn from_date(date: NaiveDate, periodicity: Periodicity) -> Self {
        let index = match periodicity {
            Periodicity::Monthly => date.month(),
            Periodicity::Quarterly => (date.month() - 1) / 3 + 1,
        };
        Self {
            periodicity,
            year: date.year(),
            index,
        }
    }

    /// Sequential position on a single axis; consecutive periods differ by 1.
    pub fn ordinal(&self) -> i64 {
        self.year as i64 * self.periodicity.periods_per_year() as i64 + (self.index as i64 - 1)
    }

    pub fn succ(&self) -> Self {
        self.offset(1)
    }

    pub fn offset(&self, steps: i64) -> Self {
        let per_year = self.periodicity.periods_per_year() as i64;
        let position = self.ordinal() + steps;
        Self {
            periodicity: self.periodicity,
            year: position.div_euclid(per_year) as i32,
            index: position.rem_euclid(per_year) as u32 + 1,
        }
    }

    /// `true` if `other` directly follows `self` on the same periodicity.
    pub fn is_followed_by(&self, other: &ReferencePeriod) -> bool {
        self.periodicity == other.periodicity && other.ordinal() - self.ordinal() == 1
    }

    /// Human label in the form used by the consolidated export, e.g. `Feb 2024`.
    pub fn label(&self) -> String {
        match self.periodicity {
            Periodicity::Monthly => {
                let tag = MONTHS[(self.index - 1) as usize];
                format!("{}{} {}", &tag[..1], tag[1..].to_lowercase(), self.year)
            }
            Periodicity::Quarterly => format!("{} Q{}", self.year, self.index),
        }
    }
}

impl PartialOrd for ReferencePeriod {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReferencePeriod {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.periodicity
            .cmp(&other.periodicity)
            .then(self.year.cmp(&other.year))
            .then(self.index.cmp(&other.index))
    }
}

impl fmt::Display for ReferencePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_era_formats() {
        let feb = ReferencePeriod::monthly(2024, 2).unwrap();
        assert_eq!(ReferencePeriod::parse("2024 FEB").unwrap(), feb);
        assert_eq!(ReferencePeriod::parse("\"2024 Feb\"").unwrap(), feb);
        assert_eq!(ReferencePeriod::parse("Feb 2024").unwrap(), feb);
        assert_eq!(ReferencePeriod::parse("2024-02").unwrap(), feb);
        assert_eq!(
            ReferencePeriod::parse("2001 Q2").unwrap(),
            ReferencePeriod::quarterly(2001, 2).unwrap()
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ReferencePeriod::parse("2024").is_err());
        assert!(ReferencePeriod::parse("2024 FOO").is_err());
        assert!(ReferencePeriod::parse("2024-13").is_err());
        assert!(ReferencePeriod::parse("2024 Q5").is_err());
        assert!(ReferencePeriod::parse("24 FEB").is_err());
    }

    #[test]
    fn test_succ_rolls_over_year() {
        let dec = ReferencePeriod::monthly(2023, 12).unwrap();
        assert_eq!(dec.succ(), ReferencePeriod::monthly(2024, 1).unwrap());
        assert!(dec.is_followed_by(&dec.succ()));

        let q4 = ReferencePeriod::quarterly(2023, 4).unwrap();
        assert_eq!(q4.succ(), ReferencePeriod::quarterly(2024, 1).unwrap());
        assert_eq!(q4.succ().first_day(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn test_label() {
        assert_eq!(ReferencePeriod::monthly(2024, 2).unwrap().label(), "Feb 2024");
        assert_eq!(ReferencePeriod::quarterly(2024, 3).unwrap().label(), "2024 Q3");
    }
}
