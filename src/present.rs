// Presentation tagging: choose, rename and order the columns of a computed
// table, attach format hints, and turn values into display strings.
//
// Values stay numeric up to `format_cell`; nothing here feeds back into a
// computation.

use crate::error::{ReportError, Result};
use crate::types::{Cell, FormatHint, MetricTable, RawTable, ReportTable, RowRole, TOTAL_KEY};
use crate::util::{format_number, format_percent, parse_f64_safe};
use tracing::debug;

/// One output column of [`tabulate`].
#[derive(Debug, Clone, Copy)]
pub enum Column<'a> {
    /// The table's key, under a display title.
    Key(&'a str),
    /// `(attribute, title)`
    Attribute(&'a str, &'a str),
    /// `(measure, title)`
    Measure(&'a str, &'a str),
}

/// Select, rename and reorder. Data rows come first, then footer rows
/// tagged as totals.
pub fn tabulate(table: &MetricTable, plan: &[Column]) -> Result<ReportTable> {
    enum Source {
        Key,
        Attribute(String),
        Measure(usize),
    }

    let mut sources = Vec::with_capacity(plan.len());
    let mut out = ReportTable::new(Vec::with_capacity(plan.len()));
    for column in plan {
        match column {
            Column::Key(title) => {
                sources.push(Source::Key);
                out.columns.push(title.to_string());
                out.hints.insert(title.to_string(), FormatHint::Text);
            }
            Column::Attribute(name, title) => {
                if !table.attribute_columns.iter().any(|a| a == name) {
                    return Err(ReportError::missing_column(name, &table.attribute_columns));
                }
                sources.push(Source::Attribute(name.to_string()));
                out.columns.push(title.to_string());
                out.hints.insert(title.to_string(), FormatHint::Text);
            }
            Column::Measure(name, title) => {
                sources.push(Source::Measure(table.measure_index(name)?));
                out.columns.push(title.to_string());
                let hint = table.hints.get(*name).copied().unwrap_or(FormatHint::Number);
                out.hints.insert(title.to_string(), hint);
            }
        }
    }

    let data = table.rows.iter().map(|r| (RowRole::Data, r));
    let footer = table.footer.iter().map(|r| (RowRole::Total, r));
    for (role, row) in data.chain(footer) {
        let cells = sources
            .iter()
            .map(|s| match s {
                Source::Key => Cell::Text(row.key.clone()),
                Source::Attribute(name) => Cell::Text(row.attribute(name).unwrap_or("").to_string()),
                Source::Measure(idx) => Cell::Number(row.values.get(*idx).copied().unwrap_or(0.0)),
            })
            .collect();
        out.push(role, cells, None);
    }
    Ok(out)
}

/// Present a warehouse-computed table as delivered. Columns titled with `%`
/// hold percentage points, as do rows whose label carries `%`; text columns
/// are tagged as text; a row labelled `Total` is a total row.
pub fn passthrough(raw: &RawTable) -> ReportTable {
    let mut out = ReportTable::new(raw.columns.clone());
    for (i, name) in raw.columns.iter().enumerate() {
        if name.contains('%') {
            out.hints.insert(name.clone(), FormatHint::PercentagePoints);
        } else if (0..raw.len()).all(|r| matches!(raw.cell(r, i), Cell::Text(_) | Cell::Null)) {
            out.hints.insert(name.clone(), FormatHint::Text);
        }
    }
    for (r, cells) in raw.rows.iter().enumerate() {
        let label = raw.cell(r, 0).label();
        let role = if label.eq_ignore_ascii_case(TOTAL_KEY) {
            RowRole::Total
        } else {
            RowRole::Data
        };
        let hint = label.contains('%').then_some(FormatHint::PercentagePoints);
        out.push(role, cells.clone(), hint);
    }
    out
}

/// Display string of one cell. Text that should be numeric renders blank.
pub fn format_cell(cell: &Cell, hint: FormatHint) -> String {
    let n = match (cell, hint) {
        (Cell::Null, _) => return String::new(),
        (_, FormatHint::Text) | (Cell::Bool(_), _) => return cell.label(),
        (Cell::Number(n), _) => *n,
        (Cell::Text(s), _) => match parse_f64_safe(Some(s)) {
            Some(n) => n,
            None => {
                debug!(value = %s, ?hint, "non-numeric value in numeric column, leaving blank");
                return String::new();
            }
        },
    };
    if !n.is_finite() {
        return String::new();
    }
    match hint {
        FormatHint::Number => format_number(n, 0),
        FormatHint::TwoDecimal => format_number(n, 2),
        FormatHint::Currency => format!("R {}", format_number(n, 2)),
        FormatHint::Percentage => format_percent(n * 100.0, 1),
        FormatHint::PercentagePoints => format_percent(n, 1),
        FormatHint::Text => cell.label(),
    }
}

/// Every row of a table as display strings, in column order.
pub fn display_rows(table: &ReportTable) -> Vec<Vec<String>> {
    table
        .rows
        .iter()
        .map(|row| {
            (0..table.columns.len())
                .map(|c| {
                    let cell = row.cells.get(c).unwrap_or(&Cell::Null);
                    format_cell(cell, table.hint_for(row, c))
                })
                .collect()
        })
        .collect()
}
