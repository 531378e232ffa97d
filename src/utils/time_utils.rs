use chrono::{DateTime, Local, NaiveDate};

pub struct TimeUtils;

impl TimeUtils {
    pub const MS_IN_S: i64 = 1000;
    pub const STANDARD_TIME_FORMAT: &'static str = "%Y-%m-%d";
    // Release dates in the publisher's metadata block, e.g. "13-08-2024"
    pub const RELEASE_DATE_FORMAT: &'static str = "%d-%m-%Y";
}

/// Find the first token in `text` that parses as a date in any of `formats`.
/// Tokens are split on whitespace, commas and quotes so `"Release date","13-08-2024"`
/// and `Release date: 13 August 2024` both work.
pub fn find_date(text: &str, formats: &[&str]) -> Option<NaiveDate> {
    let tokens: Vec<&str> = text
        .split(|c: char| c == ',' || c == '"' || c == ':' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();

    for format in formats {
        // Single-token formats
        for token in &tokens {
            if let Ok(date) = NaiveDate::parse_from_str(token, format) {
                return Some(date);
            }
        }
        // Formats with spaces ("%d %B %Y") need a window of three tokens
        for window in tokens.windows(3) {
            let joined = window.join(" ");
            if let Ok(date) = NaiveDate::parse_from_str(&joined, format) {
                return Some(date);
            }
        }
    }
    None
}

pub fn epoch_ms_to_utc(epoch_ms: i64) -> String {
    // Used for display purposes
    match DateTime::from_timestamp(epoch_ms / TimeUtils::MS_IN_S, 0) {
        Some(dt) => dt.format(TimeUtils::STANDARD_TIME_FORMAT).to_string(),
        None => String::from("invalid timestamp"),
    }
}

pub fn local_now_as_timestamp_ms() -> i64 {
    Local::now().timestamp_millis()
}

pub fn how_many_seconds_ago(past_timestamp_ms: i64) -> i64 {
    // How many seconds ago was the event described by `past_timestamp_ms` ?
    (local_now_as_timestamp_ms() - past_timestamp_ms) / TimeUtils::MS_IN_S
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_release_date_in_metadata_row() {
        let line = "\"Release date\",\"13-08-2024\"";
        assert_eq!(
            find_date(line, &[TimeUtils::RELEASE_DATE_FORMAT]),
            NaiveDate::from_ymd_opt(2024, 8, 13)
        );
    }

    #[test]
    fn test_find_spelled_out_date() {
        let line = "Release Date: 13 August 2024";
        assert_eq!(
            find_date(line, &["%Y-%m-%d", "%d %B %Y"]),
            NaiveDate::from_ymd_opt(2024, 8, 13)
        );
    }

    #[test]
    fn test_no_date() {
        assert_eq!(find_date("\"Title\",\"Vacancies\"", &["%d-%m-%Y"]), None);
    }
}
