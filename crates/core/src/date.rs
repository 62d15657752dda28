//! Calendar date handling for ledger records.
//!
//! Records always carry their date as `DD-MM-YYYY`. Remote payloads and user
//! input may use `DD/MM/YYYY`, ISO `YYYY-MM-DD`, or a full ISO timestamp; the
//! separator decides how the parts are read.

use chrono::{Datelike, NaiveDate};

use crate::error::{DomainError, DomainResult};

/// `strftime` pattern of the canonical on-device date.
pub const CANONICAL_FORMAT: &str = "%d-%m-%Y";

/// `strftime` pattern used on the wire for outbound requests.
pub const ISO_FORMAT: &str = "%Y-%m-%d";

/// Parse a date in any accepted form.
///
/// Returns `None` for anything that is not a real calendar date, including
/// strings that mix `/` and `-` within the date part.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    // Drop a time component (`2026-03-05T10:00:00Z`, `05/03/2026 10:00`).
    let date_part = trimmed.split(['T', ' ']).next()?;

    let sep = match (date_part.contains('/'), date_part.contains('-')) {
        (true, false) => '/',
        (false, true) => '-',
        _ => return None,
    };

    let parts: Vec<&str> = date_part.split(sep).collect();
    if parts.len() != 3 {
        return None;
    }
    if parts
        .iter()
        .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    let (year, month, day) = if parts[0].len() == 4 {
        (parts[0], parts[1], parts[2])
    } else if parts[2].len() == 4 {
        (parts[2], parts[1], parts[0])
    } else {
        return None;
    };

    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// Format a date in the canonical `DD-MM-YYYY` form.
pub fn format_date(date: NaiveDate) -> String {
    date.format(CANONICAL_FORMAT).to_string()
}

/// Normalize a date string to `DD-MM-YYYY`, using `fallback` when the input
/// cannot be parsed. Never panics.
pub fn normalize_date(input: &str, fallback: NaiveDate) -> String {
    format_date(parse_date(input).unwrap_or(fallback))
}

/// Strict normalization for user input: malformed dates are rejected.
pub fn normalize_user_date(input: &str) -> DomainResult<String> {
    parse_date(input)
        .map(format_date)
        .ok_or_else(|| DomainError::validation(format!("unrecognized date '{input}'")))
}

/// Convert any accepted form to ISO `YYYY-MM-DD`.
pub fn to_iso(input: &str) -> Option<String> {
    parse_date(input).map(|d| d.format(ISO_FORMAT).to_string())
}

/// Calendar year of a date string, if it parses.
pub fn year_of(input: &str) -> Option<i32> {
    parse_date(input).map(|d| d.year())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fallback() -> NaiveDate {
        NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()
    }

    #[test]
    fn accepted_forms_normalize_to_canonical() {
        assert_eq!(normalize_date("05-03-2026", fallback()), "05-03-2026");
        assert_eq!(normalize_date("05/03/2026", fallback()), "05-03-2026");
        assert_eq!(normalize_date("2026-03-05", fallback()), "05-03-2026");
        assert_eq!(normalize_date("2026-03-05T13:45:00.000Z", fallback()), "05-03-2026");
        assert_eq!(normalize_date("5/3/2026", fallback()), "05-03-2026");
    }

    #[test]
    fn malformed_input_falls_back() {
        assert_eq!(normalize_date("05/03-2026", fallback()), "01-01-2000");
        assert_eq!(normalize_date("31-02-2026", fallback()), "01-01-2000");
        assert_eq!(normalize_date("", fallback()), "01-01-2000");
        assert_eq!(normalize_date("yesterday", fallback()), "01-01-2000");
    }

    #[test]
    fn user_dates_are_strict() {
        assert_eq!(normalize_user_date("2025-12-31").unwrap(), "31-12-2025");
        assert!(matches!(
            normalize_user_date("05/03-2026"),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn iso_and_year() {
        assert_eq!(to_iso("05-03-2026").as_deref(), Some("2026-03-05"));
        assert_eq!(year_of("05/03/2024"), Some(2024));
        assert_eq!(year_of("nope"), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: every accepted spelling of one calendar date normalizes
        /// to the same canonical string, and normalizing is idempotent.
        #[test]
        fn spellings_of_one_date_agree(y in 1900i32..2100, m in 1u32..=12, d in 1u32..=28) {
            let canonical = format!("{d:02}-{m:02}-{y}");
            let slashed = format!("{d:02}/{m:02}/{y}");
            let iso = format!("{y}-{m:02}-{d:02}");

            let a = normalize_date(&canonical, fallback());
            let b = normalize_date(&slashed, fallback());
            let c = normalize_date(&iso, fallback());

            prop_assert_eq!(&a, &canonical);
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(&a, &c);
            prop_assert_eq!(normalize_date(&a, fallback()), a);
        }

        /// Property: arbitrary input never panics and always yields a
        /// canonical-looking date.
        #[test]
        fn arbitrary_input_is_safe(s in ".{0,24}") {
            let out = normalize_date(&s, fallback());
            prop_assert_eq!(out.len(), 10);
            prop_assert!(parse_date(&out).is_some());
        }
    }
}
