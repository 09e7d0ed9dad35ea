// Renderer: one CSV per table, a combined workbook, a JSON catalog and the
// console previews.

use crate::calendar::ReportDates;
use crate::error::Result;
use crate::present::{display_rows, format_cell};
use crate::types::{Cell, EntryStatus, FormatHint, ReportEntry, RowRole};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tabled::{builder::Builder, settings::Style};
use tracing::info;

pub const NO_DATA: &str = "No data available";
pub const WORKBOOK_FILE: &str = "scorecard.xlsx";
pub const CATALOG_FILE: &str = "catalog.json";

/// File name of an entry's CSV: position plus a slug of the title.
pub fn csv_file_name(position: usize, title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    format!("{:02}_{}.csv", position, slug.trim_matches('_'))
}

/// Display values of one entry. Placeholders get a single message row.
pub fn write_csv(path: &Path, entry: &ReportEntry) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_path(path)?;
    if entry.has_data() {
        wtr.write_record(&entry.table.columns)?;
        for row in display_rows(&entry.table) {
            wtr.write_record(&row)?;
        }
    } else {
        wtr.write_record([NO_DATA])?;
        if let EntryStatus::Failed { reason } = &entry.status {
            wtr.write_record([reason.as_str()])?;
        }
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct CatalogItem<'a> {
    position: usize,
    title: &'a str,
    status: &'a EntryStatus,
    rows: usize,
    columns: &'a [String],
    format_hints: &'a BTreeMap<String, FormatHint>,
    file: String,
}

#[derive(Debug, Serialize)]
struct Catalog<'a> {
    dates: &'a ReportDates,
    fiscal_week: i64,
    tables: Vec<CatalogItem<'a>>,
}

pub fn write_json(path: &Path, dates: &ReportDates, entries: &[ReportEntry]) -> Result<()> {
    let catalog = Catalog {
        dates,
        fiscal_week: dates.fiscal_week_number(),
        tables: entries
            .iter()
            .enumerate()
            .map(|(i, e)| CatalogItem {
                position: i + 1,
                title: &e.title,
                status: &e.status,
                rows: e.table.len(),
                columns: &e.table.columns,
                format_hints: e.format_hints(),
                file: csv_file_name(i + 1, &e.title),
            })
            .collect(),
    };
    let s = serde_json::to_string_pretty(&catalog)?;
    std::fs::write(path, s)?;
    Ok(())
}

fn number_format(hint: FormatHint) -> Option<&'static str> {
    match hint {
        FormatHint::Text => None,
        FormatHint::Number => Some("#,##0"),
        FormatHint::TwoDecimal => Some("#,##0.00"),
        FormatHint::Currency => Some("\"R\" #,##0.00"),
        FormatHint::Percentage | FormatHint::PercentagePoints => Some("0.0%"),
    }
}

fn cell_format(hint: FormatHint, bold: bool) -> Format {
    let mut format = Format::new();
    if let Some(num) = number_format(hint) {
        format = format.set_num_format(num);
    }
    if bold {
        format = format.set_bold();
    }
    format
}

/// Percentage points are stored as fractions so the sheet's `%` format
/// shows them unchanged.
fn sheet_value(n: f64, hint: FormatHint) -> f64 {
    match hint {
        FormatHint::PercentagePoints => n / 100.0,
        _ => n,
    }
}

fn write_value(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &Cell,
    hint: FormatHint,
    bold: bool,
) -> Result<()> {
    let format = cell_format(hint, bold);
    match (cell, hint) {
        (Cell::Null, _) => {}
        (Cell::Number(_), FormatHint::Text) => {
            sheet.write_string_with_format(row, col, format_cell(cell, hint), &format)?;
        }
        (Cell::Number(n), _) if n.is_finite() => {
            sheet.write_number_with_format(row, col, sheet_value(*n, hint), &format)?;
        }
        (Cell::Text(_), h) if h != FormatHint::Text => match cell.as_number() {
            Some(n) => {
                sheet.write_number_with_format(row, col, sheet_value(n, hint), &format)?;
            }
            None => {
                sheet.write_blank(row, col, &format)?;
            }
        },
        _ => {
            sheet.write_string_with_format(row, col, cell.label(), &format)?;
        }
    }
    Ok(())
}

/// All tables stacked on one sheet: title, header, rows, two blank rows.
pub fn write_workbook(path: &Path, heading: &str, entries: &[ReportEntry]) -> Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Scorecard")?;
    sheet.set_column_width(0, 45)?;
    for col in 1..12u16 {
        sheet.set_column_width(col, 16)?;
    }

    let bold = Format::new().set_bold();
    let title = Format::new().set_bold().set_font_size(13);
    sheet.write_string_with_format(0, 0, heading, &title)?;

    let mut r: u32 = 2;
    for entry in entries {
        sheet.write_string_with_format(r, 0, &entry.title, &title)?;
        r += 1;
        if !entry.has_data() {
            sheet.write_string(r, 0, NO_DATA)?;
            r += 3;
            continue;
        }
        let table = &entry.table;
        for (c, name) in table.columns.iter().enumerate() {
            sheet.write_string_with_format(r, c as u16, name, &bold)?;
        }
        r += 1;
        for row in &table.rows {
            let strong = matches!(row.role, RowRole::Total | RowRole::SectionHeader);
            for (c, cell) in row.cells.iter().enumerate() {
                write_value(sheet, r, c as u16, cell, table.hint_for(row, c), strong)?;
            }
            r += 1;
        }
        r += 2;
    }

    workbook.save(path)?;
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WrittenFiles {
    pub tables: Vec<PathBuf>,
    pub workbook: PathBuf,
    pub catalog: PathBuf,
}

/// Write every output of a run under `dir`.
pub fn write_outputs(dir: &Path, dates: &ReportDates, entries: &[ReportEntry]) -> Result<WrittenFiles> {
    std::fs::create_dir_all(dir)?;
    let mut written = WrittenFiles {
        workbook: dir.join(WORKBOOK_FILE),
        catalog: dir.join(CATALOG_FILE),
        ..WrittenFiles::default()
    };
    for (i, entry) in entries.iter().enumerate() {
        let path = dir.join(csv_file_name(i + 1, &entry.title));
        write_csv(&path, entry)?;
        written.tables.push(path);
    }
    let heading = format!(
        "Weekly Scorecard, week {} ({})",
        dates.fiscal_week_number(),
        dates.week_range()
    );
    write_workbook(&written.workbook, &heading, entries)?;
    write_json(&written.catalog, dates, entries)?;
    info!(
        dir = %dir.display(),
        tables = written.tables.len(),
        "outputs written"
    );
    Ok(written)
}

/// Markdown rendering of the first `max_rows` rows.
pub fn render_preview(entry: &ReportEntry, max_rows: usize) -> String {
    if !entry.has_data() {
        return format!("({})", NO_DATA);
    }
    let mut builder = Builder::default();
    builder.push_record(entry.table.columns.iter().cloned());
    for row in display_rows(&entry.table).into_iter().take(max_rows) {
        builder.push_record(row);
    }
    let mut table = builder.build();
    table.with(Style::markdown());
    table.to_string()
}

pub fn preview_table(position: usize, entry: &ReportEntry, max_rows: usize, file: Option<&Path>) {
    println!("\nReport {}: {}\n", position, entry.title);
    println!("{}\n", render_preview(entry, max_rows));
    if let EntryStatus::Failed { reason } = &entry.status {
        println!("Reason: {}\n", reason);
    }
    if let Some(f) = file {
        println!("(Full table exported to {})", f.display());
    }
}
