// Synthetic footer rows: the `Total` row, subset totals and averages.
//
// Footers are computed from the data rows only. Additive measures are summed,
// composite measures are rebuilt from their summed components, and recorded
// derivations (growth, contribution, ratios) are re-evaluated on the footer
// rather than summed.

use crate::derive::refresh_footer;
use crate::error::{ReportError, Result};
use crate::types::{MetricRow, MetricTable, TOTAL_KEY};
use crate::util::average;
use tracing::debug;

/// `measure = sum(components)` on the total row.
#[derive(Debug, Clone, Copy)]
pub struct CompositeFormula<'a> {
    pub measure: &'a str,
    pub components: &'a [&'a str],
}

pub fn append_total_row(table: &MetricTable, composites: &[CompositeFormula]) -> Result<MetricTable> {
    append_total_row_with(table, composites, &[])
}

/// Like [`append_total_row`], with explicit values for measures that cannot
/// be summed at all (distinct counts over the underlying rows).
pub fn append_total_row_with(
    table: &MetricTable,
    composites: &[CompositeFormula],
    overrides: &[(&str, f64)],
) -> Result<MetricTable> {
    let mut sums = column_sums(table, |_| true);
    for formula in composites {
        let idx = table.measure_index(formula.measure)?;
        let mut value = 0.0;
        for component in formula.components {
            value += sums[table.measure_index(component)?];
        }
        sums[idx] = value;
    }
    for (measure, value) in overrides {
        sums[table.measure_index(measure)?] = *value;
    }
    push_footer(table, TOTAL_KEY, sums)
}

/// Footer summing only the data rows that satisfy `predicate`.
pub fn append_subset_total<F>(table: &MetricTable, label: &str, predicate: F) -> Result<MetricTable>
where
    F: Fn(&MetricRow) -> bool,
{
    let sums = column_sums(table, predicate);
    push_footer(table, label, sums)
}

/// Footer holding the per-row mean of every measure.
pub fn append_average_row(table: &MetricTable, label: &str) -> Result<MetricTable> {
    let means = (0..table.measures.len())
        .map(|i| {
            let column: Vec<f64> = table
                .denominator_rows()
                .map(|r| r.values.get(i).copied().unwrap_or(0.0))
                .collect();
            average(&column)
        })
        .collect();
    push_footer(table, label, means)
}

fn column_sums<F>(table: &MetricTable, predicate: F) -> Vec<f64>
where
    F: Fn(&MetricRow) -> bool,
{
    let mut sums = vec![0.0; table.measures.len()];
    for row in table.denominator_rows().filter(|r| predicate(*r)) {
        for (sum, v) in sums.iter_mut().zip(&row.values) {
            *sum += v;
        }
    }
    sums
}

fn push_footer(table: &MetricTable, label: &str, values: Vec<f64>) -> Result<MetricTable> {
    if table.footer_row(label).is_some() {
        return Err(ReportError::TotalAlreadyPresent(label.to_string()));
    }
    let mut out = table.clone();
    out.footer.push(MetricRow::new(label, values));
    refresh_footer(&mut out)?;
    debug!(key = %out.key_column, footer = label, "appended footer row");
    Ok(out)
}
