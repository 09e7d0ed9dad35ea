// Weekly retail scorecard: fetched warehouse extracts are shaped into an
// ordered list of titled tables (store and region views, item rankings,
// daily sales, loyalty KPIs) and rendered as CSV, a workbook and previews.

pub mod arith;
pub mod assembler;
pub mod calendar;
pub mod config;
pub mod derive;
pub mod error;
pub mod fetch;
pub mod grouping;
pub mod layout;
pub mod output;
pub mod present;
pub mod reports;
pub mod totals;
pub mod types;
pub mod util;

pub use assembler::{assemble, build_report_table, ReportDefinition, Step};
pub use calendar::ReportDates;
pub use config::ReportConfig;
pub use error::{ReportError, Result};
pub use fetch::{CachedFetcher, CsvDirFetcher, Fetcher, QueryParams, StaticFetcher};
pub use types::{ReportEntry, ReportTable};
