//! Archive file names
//!
//! `archive_2026-01.zip` covers a calendar month, `archive_2026-01-21.zip`
//! a single day and `archive_2026-01-01_2026-01-14.zip` an explicit range.

use std::fmt;

use chrono::{Datelike, Months, NaiveDate};

use super::entry::DATE_FORMAT;

const ARCHIVE_PREFIX: &str = "archive_";
const ARCHIVE_SUFFIX: &str = ".zip";
const RANGE_SEPARATOR: char = '_';

/// The period an archive covers, as encoded in its file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveName {
    Day(NaiveDate),
    /// Year and month of a full calendar month
    Month(i32, u32),
    Range(NaiveDate, NaiveDate),
}

impl ArchiveName {
    /// Pick the name for archiving `[from, to]`
    ///
    /// A range that is exactly one calendar month only gets the month form
    /// when full-month archiving is on.
    pub fn for_range(from: NaiveDate, to: NaiveDate, full_month: bool) -> Self {
        if from == to {
            return ArchiveName::Day(from);
        }
        if full_month && from.day() == 1 && Some(to) == last_day_of_month(from) {
            return ArchiveName::Month(from.year(), from.month());
        }
        ArchiveName::Range(from, to)
    }

    /// Parse an archive file name, `None` for anything else
    pub fn parse(file_name: &str) -> Option<Self> {
        let token = file_name
            .strip_prefix(ARCHIVE_PREFIX)?
            .strip_suffix(ARCHIVE_SUFFIX)?;

        if let Some((from, to)) = token.split_once(RANGE_SEPARATOR) {
            let from = NaiveDate::parse_from_str(from, DATE_FORMAT).ok()?;
            let to = NaiveDate::parse_from_str(to, DATE_FORMAT).ok()?;
            return Some(ArchiveName::Range(from, to));
        }

        if let Ok(date) = NaiveDate::parse_from_str(token, DATE_FORMAT) {
            return Some(ArchiveName::Day(date));
        }

        let (year, month) = token.split_once('-')?;
        if year.len() != 4 || month.len() != 2 {
            return None;
        }
        let year: i32 = year.parse().ok()?;
        let month: u32 = month.parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, 1)?;
        Some(ArchiveName::Month(year, month))
    }

    /// First day covered
    pub fn start_date(&self) -> Option<NaiveDate> {
        match *self {
            ArchiveName::Day(date) => Some(date),
            ArchiveName::Month(year, month) => NaiveDate::from_ymd_opt(year, month, 1),
            ArchiveName::Range(from, _) => Some(from),
        }
    }

    /// Last day covered (the later bound for ranges)
    pub fn end_date(&self) -> Option<NaiveDate> {
        match *self {
            ArchiveName::Day(date) => Some(date),
            ArchiveName::Month(year, month) => {
                NaiveDate::from_ymd_opt(year, month, 1).and_then(last_day_of_month)
            }
            ArchiveName::Range(from, to) => Some(from.max(to)),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}{}{}", ARCHIVE_PREFIX, self, ARCHIVE_SUFFIX)
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveName::Day(date) => write!(f, "{}", date.format(DATE_FORMAT)),
            ArchiveName::Month(year, month) => write!(f, "{:04}-{:02}", year, month),
            ArchiveName::Range(from, to) => write!(
                f,
                "{}{}{}",
                from.format(DATE_FORMAT),
                RANGE_SEPARATOR,
                to.format(DATE_FORMAT)
            ),
        }
    }
}

/// First day of the month `date` falls in
pub fn first_day_of_month(date: NaiveDate) -> Option<NaiveDate> {
    date.with_day(1)
}

/// Last day of the month `date` falls in
pub fn last_day_of_month(date: NaiveDate) -> Option<NaiveDate> {
    first_day_of_month(date)?
        .checked_add_months(Months::new(1))?
        .pred_opt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_for_range_single_day() {
        let name = ArchiveName::for_range(date(2026, 1, 21), date(2026, 1, 21), true);
        assert_eq!(name, ArchiveName::Day(date(2026, 1, 21)));
        assert_eq!(name.file_name(), "archive_2026-01-21.zip");
    }

    #[test]
    fn test_for_range_full_month() {
        let name = ArchiveName::for_range(date(2024, 2, 1), date(2024, 2, 29), true);
        assert_eq!(name, ArchiveName::Month(2024, 2));
        assert_eq!(name.file_name(), "archive_2024-02.zip");
    }

    #[test]
    fn test_for_range_month_without_flag_is_range() {
        let name = ArchiveName::for_range(date(2026, 3, 1), date(2026, 3, 31), false);
        assert_eq!(name.file_name(), "archive_2026-03-01_2026-03-31.zip");
    }

    #[test]
    fn test_for_range_partial_month_is_range() {
        let name = ArchiveName::for_range(date(2026, 3, 2), date(2026, 3, 31), true);
        assert_eq!(name, ArchiveName::Range(date(2026, 3, 2), date(2026, 3, 31)));
    }

    #[test]
    fn test_parse_all_forms() {
        assert_eq!(
            ArchiveName::parse("archive_2026-01-21.zip"),
            Some(ArchiveName::Day(date(2026, 1, 21)))
        );
        assert_eq!(
            ArchiveName::parse("archive_2026-01.zip"),
            Some(ArchiveName::Month(2026, 1))
        );
        assert_eq!(
            ArchiveName::parse("archive_2026-01-01_2026-01-14.zip"),
            Some(ArchiveName::Range(date(2026, 1, 1), date(2026, 1, 14)))
        );
    }

    #[test]
    fn test_parse_rejects_other_files() {
        assert_eq!(ArchiveName::parse("archive_2026-13.zip"), None);
        assert_eq!(ArchiveName::parse("archive_26-01.zip"), None);
        assert_eq!(ArchiveName::parse("archive_2026-01-21.tar"), None);
        assert_eq!(ArchiveName::parse("log_2026-01-21.log"), None);
        assert_eq!(ArchiveName::parse("archive_2026-01-01_nope.zip"), None);
    }

    #[test]
    fn test_end_dates() {
        assert_eq!(ArchiveName::Month(2026, 12).end_date(), Some(date(2026, 12, 31)));
        assert_eq!(ArchiveName::Month(2023, 2).end_date(), Some(date(2023, 2, 28)));
        assert_eq!(
            ArchiveName::Range(date(2026, 1, 1), date(2026, 1, 14)).end_date(),
            Some(date(2026, 1, 14))
        );
        assert_eq!(ArchiveName::Month(2026, 12).start_date(), Some(date(2026, 12, 1)));
    }
}
