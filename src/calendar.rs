// Reporting-period boundaries for a run date.
//
// The reporting week is the Monday-Sunday week before the run date. The
// fiscal year starts on the 1st of the fiscal month; year-to-date starts on
// the Monday on or before that day, and months follow a 4-5-4 week pattern
// from there.

use crate::error::{ReportError, Result};
use crate::fetch::QueryParams;
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

const PATTERN_454: [i64; 12] = [4, 5, 4, 4, 5, 4, 4, 5, 4, 4, 5, 4];

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportDates {
    pub run_date: NaiveDate,
    pub wtd_start: NaiveDate,
    pub end: NaiveDate,
    pub mtd_start: NaiveDate,
    pub ytd_start: NaiveDate,
    pub fiscal_year_start: NaiveDate,
    pub fiscal_year_end: NaiveDate,
}

impl ReportDates {
    pub fn resolve(run_date: NaiveDate, fiscal_start_month: u32) -> Result<Self> {
        if !(1..=12).contains(&fiscal_start_month) {
            return Err(ReportError::Config(format!(
                "fiscal year start month {} is not a month",
                fiscal_start_month
            )));
        }
        let this_monday = run_date - Duration::days(run_date.weekday().num_days_from_monday() as i64);
        let wtd_start = this_monday - Duration::days(7);
        let end = wtd_start + Duration::days(6);
        let (fiscal_year_start, fiscal_year_end) = fiscal_year(end, fiscal_start_month)?;
        let ytd_start = monday_on_or_before(fiscal_year_start);
        let mtd_start = month_start_454(end, ytd_start, fiscal_year_end);
        Ok(ReportDates {
            run_date,
            wtd_start,
            end,
            mtd_start,
            ytd_start,
            fiscal_year_start,
            fiscal_year_end,
        })
    }

    /// Week of the fiscal year the reporting week starts in, counting from 1.
    /// The year is the one holding the week's Sunday, never the run date's.
    pub fn fiscal_week_number(&self) -> i64 {
        (self.wtd_start - self.fiscal_year_start)
            .num_days()
            .div_euclid(7)
            + 1
    }

    /// Query parameters for the fetch collaborator.
    pub fn to_params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        let iso = |d: NaiveDate| d.format(DATE_FORMAT).to_string();
        params.insert("start_date".to_string(), iso(self.wtd_start));
        params.insert("wtd_start_date".to_string(), iso(self.wtd_start));
        params.insert("end_date".to_string(), iso(self.end));
        params.insert("mtd_start_date".to_string(), iso(self.mtd_start));
        params.insert("ytd_start_date".to_string(), iso(self.ytd_start));
        params
    }

    pub fn week_range(&self) -> String {
        format!(
            "{} to {}",
            self.wtd_start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

/// The fiscal year containing `date`. The first day of the fiscal month
/// still belongs to the previous year.
fn fiscal_year(date: NaiveDate, start_month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let year = if date.month() > start_month || (date.month() == start_month && date.day() > 1) {
        date.year()
    } else {
        date.year() - 1
    };
    let start = ymd(year, start_month, 1)?;
    let next = ymd(year + 1, start_month, 1)?;
    Ok((start, next - Duration::days(1)))
}

fn ymd(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| ReportError::InvalidDate(format!("{}-{:02}-{:02}", year, month, day)))
}

fn monday_on_or_before(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Start of the 4-5-4 month containing `end`. The last month gets a fifth
/// week when the fiscal year ends on the weekday the year started on.
fn month_start_454(end: NaiveDate, year_start_monday: NaiveDate, fiscal_year_end: NaiveDate) -> NaiveDate {
    let mut pattern = PATTERN_454;
    if fiscal_year_end.weekday() == year_start_monday.weekday() {
        pattern[11] += 1;
    }
    let mut month_start = year_start_monday;
    for weeks in pattern {
        let month_end = month_start + Duration::weeks(weeks);
        if month_start <= end && end < month_end {
            return month_start;
        }
        month_start = month_end;
    }
    year_start_monday
}
