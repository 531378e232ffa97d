//! Turns one raw vintage file into observations.
//!
//! Publication layouts changed over the years. Each known layout is declared once
//! in `FORMAT_ERAS`; a file is matched to an era by its signature (a header row
//! naming the period/value columns, or a key/value release-date row) instead of
//! guessing column names at runtime. When several signatures match, the era whose
//! release numbers cover the vintage id wins.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::config::DEBUG_FLAGS;
use crate::domain::{Observation, Periodicity, ReferencePeriod, Vintage, VintageId};
use crate::error::ParseError;
use crate::utils::TimeUtils;
use crate::utils::time_utils::find_date;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, Display)]
pub enum FormatEra {
    /// Metadata as `"label","value"` rows followed by `"2024 FEB","911"` data rows
    KeyValue,
    /// Metadata rows, then a header row (`Date,Value`) and ISO-style periods
    Tabular,
}

/// Column names of a tabular era's header row (matched case-insensitively).
pub struct HeaderSchema {
    pub period_columns: &'static [&'static str],
    pub value_columns: &'static [&'static str],
}

/// Declared layout of one format era.
pub struct FormatSchema {
    pub era: FormatEra,
    /// Release numbers published in this layout
    pub ids: RangeInclusive<u32>,
    /// First-cell labels of the row carrying the release date
    pub release_date_labels: &'static [&'static str],
    /// chrono formats tried, in order, on that row
    pub release_date_formats: &'static [&'static str],
    /// `None` for eras without a header row
    pub header: Option<HeaderSchema>,
}

pub const FORMAT_ERAS: &[FormatSchema] = &[
    FormatSchema {
        era: FormatEra::Tabular,
        ids: 200..=u32::MAX,
        release_date_labels: &["release date", "release_date", "published"],
        release_date_formats: &[
            TimeUtils::STANDARD_TIME_FORMAT,
            TimeUtils::RELEASE_DATE_FORMAT,
            "%d %B %Y",
        ],
        header: Some(HeaderSchema {
            period_columns: &["date", "period", "month", "reference period"],
            value_columns: &["value", "vacancies", "ap2y", "level"],
        }),
    },
    FormatSchema {
        era: FormatEra::KeyValue,
        ids: 0..=199,
        release_date_labels: &["release date"],
        release_date_formats: &[
            TimeUtils::RELEASE_DATE_FORMAT,
            "%d %B %Y",
            TimeUtils::STANDARD_TIME_FORMAT,
        ],
        header: None,
    },
];

/// A data-looking row that could not be turned into an observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub line: u64,
    pub raw: String,
    #[serde(skip)]
    pub reason: Option<ParseError>,
}

/// Everything recovered from one vintage file.
#[derive(Debug, Clone)]
pub struct ParsedVintage {
    pub vintage: Vintage,
    pub era: FormatEra,
    pub observations: Vec<Observation>,
    pub skipped: Vec<SkippedRow>,
    /// Valid periods of another frequency (annual, quarterly in a monthly run)
    pub ignored: usize,
}

/// Parses files for a single target periodicity.
#[derive(Debug, Clone, Copy)]
pub struct VintageParser {
    periodicity: Periodicity,
}

impl Default for VintageParser {
    fn default() -> Self {
        Self::new(Periodicity::Monthly)
    }
}

enum RowClass {
    Observation(ReferencePeriod, f64),
    Ignored,
    Skipped(ParseError),
}

impl VintageParser {
    pub fn new(periodicity: Periodicity) -> Self {
        Self { periodicity }
    }

    pub fn periodicity(&self) -> Periodicity {
        self.periodicity
    }

    /// Parse one vintage file. Bad rows are collected, not fatal; only a file
    /// without a release date is rejected since its observations could not be
    /// placed in publication order.
    pub fn parse(&self, id: VintageId, raw: &[u8]) -> Result<ParsedVintage, ParseError> {
        let records = read_records(raw);
        let (schema, header) = select_schema(id, &records);

        let released = records
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .find(|(_, cells)| is_release_date_row(schema, cells))
            .and_then(|(_, cells)| find_date(&cells[1..].join(","), schema.release_date_formats))
            .ok_or(ParseError::MissingReleaseDate(id))?;
        let vintage = Vintage::new(id, released);

        let (period_col, value_col, data_start) = match header {
            Some((index, period_col, value_col)) => (period_col, value_col, index + 1),
            None => (0, 1, 0),
        };

        let mut parsed = ParsedVintage {
            vintage,
            era: schema.era,
            observations: Vec::new(),
            skipped: Vec::new(),
            ignored: 0,
        };

        for (position, record) in records.iter().enumerate().skip(data_start) {
            let (line, cells) = match record {
                Ok(row) => row,
                Err((line, error)) => {
                    parsed.skipped.push(SkippedRow {
                        line: *line,
                        raw: String::new(),
                        reason: Some(error.clone()),
                    });
                    continue;
                }
            };
            if header.is_none() && is_release_date_row(schema, cells) {
                continue;
            }
            let Some(period_cell) = cells.get(period_col) else {
                continue;
            };
            if !looks_like_period(period_cell) {
                // metadata
                continue;
            }

            let value_cell = cells.get(value_col).map(String::as_str).unwrap_or("");
            match self.classify(period_cell, value_cell) {
                RowClass::Observation(period, value) => parsed.observations.push(Observation {
                    period,
                    vintage,
                    value,
                }),
                RowClass::Ignored => parsed.ignored += 1,
                RowClass::Skipped(reason) => {
                    if DEBUG_FLAGS.print_skipped_rows {
                        log::info!("{} row {} skipped: {}", id, position + 1, reason);
                    }
                    parsed.skipped.push(SkippedRow {
                        line: *line,
                        raw: cells.join(","),
                        reason: Some(reason),
                    });
                }
            }
        }

        log::info!(
            "Parsed {} ({:?} era, released {}): {} rows kept, {} skipped, {} other-frequency",
            id,
            parsed.era,
            released,
            parsed.observations.len(),
            parsed.skipped.len(),
            parsed.ignored
        );
        Ok(parsed)
    }

    fn classify(&self, period_cell: &str, value_cell: &str) -> RowClass {
        let trimmed = period_cell.trim();
        // Annual rows ("2002") are valid data of another frequency
        if trimmed.len() == 4 && trimmed.chars().all(|c| c.is_ascii_digit()) {
            return RowClass::Ignored;
        }
        let period = match ReferencePeriod::parse(trimmed) {
            Ok(period) => period,
            Err(e) => return RowClass::Skipped(e),
        };
        if period.periodicity != self.periodicity {
            return RowClass::Ignored;
        }
        match parse_value(value_cell) {
            Ok(value) => RowClass::Observation(period, value),
            Err(e) => RowClass::Skipped(e),
        }
    }
}

type Record = Result<(u64, Vec<String>), (u64, ParseError)>;

fn read_records(raw: &[u8]) -> Vec<Record> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(raw);

    reader
        .records()
        .enumerate()
        .map(|(i, record)| {
            let fallback_line = i as u64 + 1;
            match record {
                Ok(rec) => {
                    let line = rec.position().map(|p| p.line()).unwrap_or(fallback_line);
                    Ok((line, rec.iter().map(str::to_string).collect()))
                }
                Err(e) => Err((fallback_line, ParseError::Csv(e.to_string()))),
            }
        })
        .collect()
}

type HeaderPosition = (usize, usize, usize);

/// Pick the era by file signature, then by vintage id when zero or several
/// signatures match. Returns the schema and, for a matched header row,
/// `(header_index, period_col, value_col)`.
fn select_schema(id: VintageId, records: &[Record]) -> (&'static FormatSchema, Option<HeaderPosition>) {
    let matches: Vec<(&'static FormatSchema, Option<HeaderPosition>)> = FORMAT_ERAS
        .iter()
        .filter_map(|schema| match &schema.header {
            Some(header) => find_header(header, records).map(|position| (schema, Some(position))),
            None => records
                .iter()
                .filter_map(|r| r.as_ref().ok())
                .any(|(_, cells)| is_release_date_row(schema, cells))
                .then_some((schema, None)),
        })
        .collect();
    let covers_id = |schema: &FormatSchema| schema.ids.contains(&id.0);

    match matches.as_slice() {
        [] => (
            FORMAT_ERAS.iter().find(|s| covers_id(s)).unwrap_or(&FORMAT_ERAS[0]),
            None,
        ),
        [only] => *only,
        several => several
            .iter()
            .find(|(schema, _)| covers_id(schema))
            .copied()
            .unwrap_or(several[0]),
    }
}

fn find_header(header: &HeaderSchema, records: &[Record]) -> Option<HeaderPosition> {
    records.iter().enumerate().find_map(|(index, record)| {
        let (_, cells) = record.as_ref().ok()?;
        let find = |names: &[&str]| {
            cells
                .iter()
                .position(|c| names.iter().any(|n| c.eq_ignore_ascii_case(n)))
        };
        Some((index, find(header.period_columns)?, find(header.value_columns)?))
    })
}

fn is_release_date_row(schema: &FormatSchema, cells: &[String]) -> bool {
    cells.len() > 1
        && cells.first().is_some_and(|first| {
            let first = first.to_ascii_lowercase();
            schema
                .release_date_labels
                .iter()
                .any(|label| first.starts_with(label))
        })
}

/// Data rows start with a year (`2024 FEB`, `2024-02`) or a month name then a year (`Feb 2024`).
fn looks_like_period(cell: &str) -> bool {
    let cell = cell.trim();
    let bytes = cell.as_bytes();
    if bytes.len() >= 4 && bytes[..4].iter().all(u8::is_ascii_digit) {
        return true;
    }
    let mut parts = cell.split_whitespace();
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(m), Some(y), None)
            if m.len() == 3
                && m.chars().all(|c| c.is_ascii_alphabetic())
                && y.len() == 4
                && y.chars().all(|c| c.is_ascii_digit())
    )
}

fn parse_value(cell: &str) -> Result<f64, ParseError> {
    let cleaned: String = cell
        .chars()
        .filter(|c| !matches!(c, '"' | ',' | ' '))
        .collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::BadValue(cell.to_string()))
}
