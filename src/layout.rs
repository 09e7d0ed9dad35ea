// Long (Section, Metric, Type) layouts for the KPI tables.
//
// A wide metric table (one row per tier, store group or period) is turned
// into one display row per (metric, value type), grouped by section, with a
// header row per section. Header insertion for the first section is a
// caller decision.

use crate::error::{ReportError, Result};
use crate::types::{
    Cell, FormatHint, MetricRow, MetricTable, RawTable, ReportTable, RowRole, SectionRow, SectionedReport,
    ValueType,
};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

pub const INDENT: &str = "    ";

/// Measure columns of a period-transposed table.
pub const CURRENT_COLUMN: &str = "Current";
pub const PREVIOUS_COLUMN: &str = "Previous";

#[derive(Debug, Clone, Copy)]
pub struct LayoutSpec<'a> {
    /// `(measure, metric, type)`: which measure feeds which display row.
    pub cells: &'a [(&'a str, &'a str, ValueType)],
    pub metric_order: &'a [&'a str],
    pub type_order: &'a [ValueType],
    /// Metric -> section.
    pub sections: &'a [(&'a str, &'a str)],
    /// Row keys to use as value columns, in order. `None` keeps data rows
    /// then footer rows as they are.
    pub column_order: Option<&'a [&'a str]>,
    pub first_section_header: bool,
}

/// Pivot a wide table into a sectioned layout. Each row key becomes a value
/// column; each `cells` entry becomes one display row.
pub fn pivot_wide_to_sectioned(table: &MetricTable, spec: &LayoutSpec) -> Result<SectionedReport> {
    if has_section_columns(table) {
        return Err(ReportError::AlreadySectioned);
    }
    let sections: BTreeMap<&str, &str> = spec.sections.iter().copied().collect();

    let source: Vec<&MetricRow> = table.rows.iter().chain(table.footer.iter()).collect();
    let value_columns: Vec<String> = match spec.column_order {
        Some(order) => order.iter().map(|c| c.to_string()).collect(),
        None => source.iter().map(|r| r.key.clone()).collect(),
    };
    let column_rows: Vec<Option<&MetricRow>> = value_columns
        .iter()
        .map(|c| {
            let row = source.iter().find(|r| &r.key == c).copied();
            if row.is_none() {
                debug!(column = %c, "no row for layout column, leaving it blank");
            }
            row
        })
        .collect();

    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(spec.cells.len());
    for (measure, metric, value_type) in spec.cells {
        if !seen.insert((*metric, *value_type)) {
            return Err(ReportError::DuplicateCell {
                metric: metric.to_string(),
                value_type: value_type.label().to_string(),
            });
        }
        let section = sections
            .get(metric)
            .ok_or_else(|| ReportError::UnmappedMetric(metric.to_string()))?;
        let idx = table.measure_index(measure)?;
        rows.push(SectionRow {
            section: section.to_string(),
            metric: metric.to_string(),
            value_type: Some(*value_type),
            values: column_rows
                .iter()
                .map(|r| r.and_then(|r| r.values.get(idx).copied()))
                .collect(),
            hint: Some(row_hint(table, measure, *value_type)),
            is_header: false,
        });
    }

    let section_rank = section_ranks(spec.metric_order, &rows);
    let metric_rank = |m: &str| spec.metric_order.iter().position(|o| *o == m).unwrap_or(usize::MAX);
    let type_rank = |t: Option<ValueType>| {
        t.and_then(|t| spec.type_order.iter().position(|o| *o == t))
            .unwrap_or(usize::MAX)
    };
    rows.sort_by_key(|r| {
        (
            section_rank.get(r.section.as_str()).copied().unwrap_or(usize::MAX),
            metric_rank(&r.metric),
            type_rank(r.value_type),
        )
    });

    Ok(with_section_headers(
        value_columns,
        BTreeMap::new(),
        rows,
        spec.first_section_header,
    ))
}

fn row_hint(table: &MetricTable, measure: &str, value_type: ValueType) -> FormatHint {
    match value_type {
        ValueType::Growth => FormatHint::Percentage,
        _ => table.hints.get(measure).copied().unwrap_or(FormatHint::Number),
    }
}

/// Sections rank by where their first metric sits in the metric order, then
/// by first appearance for metrics outside it.
fn section_ranks(metric_order: &[&str], rows: &[SectionRow]) -> BTreeMap<String, usize> {
    let mut ordered: Vec<(usize, usize, &str)> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let m = metric_order.iter().position(|o| *o == r.metric).unwrap_or(usize::MAX);
            (m, i, r.section.as_str())
        })
        .collect();
    ordered.sort();
    let mut ranks = BTreeMap::new();
    for (_, _, section) in ordered {
        let next = ranks.len();
        ranks.entry(section.to_string()).or_insert(next);
    }
    ranks
}

fn with_section_headers(
    value_columns: Vec<String>,
    column_hints: BTreeMap<String, FormatHint>,
    rows: Vec<SectionRow>,
    first_section_header: bool,
) -> SectionedReport {
    let width = value_columns.len();
    let mut laid_out = Vec::with_capacity(rows.len() + 4);
    let mut previous: Option<String> = None;
    for row in rows {
        if previous.as_deref() != Some(row.section.as_str()) {
            if previous.is_some() || first_section_header {
                laid_out.push(SectionRow::header(&row.section, width));
            }
            previous = Some(row.section.clone());
        }
        laid_out.push(row);
    }
    SectionedReport {
        value_columns,
        column_hints,
        rows: laid_out,
    }
}

/// Turn a one-row-per-period table into one row per metric with
/// [`CURRENT_COLUMN`] and [`PREVIOUS_COLUMN`] measures. Metrics keep the
/// source column order.
pub fn transpose_periods(
    raw: &RawTable,
    period_column: &str,
    current_key: &str,
    previous_key: &str,
) -> Result<MetricTable> {
    let period_idx = raw.column_index(period_column)?;
    let periods: Vec<String> = (0..raw.len()).map(|i| raw.cell(i, period_idx).label()).collect();
    let find = |key: &str| {
        periods
            .iter()
            .position(|p| p.eq_ignore_ascii_case(key))
            .ok_or_else(|| ReportError::missing_column(key, &periods))
    };
    let current = find(current_key)?;
    let previous = find(previous_key)?;

    let mut table = MetricTable::new(
        "Metric",
        vec![CURRENT_COLUMN.to_string(), PREVIOUS_COLUMN.to_string()],
        CURRENT_COLUMN,
    );
    for (col, name) in raw.columns.iter().enumerate() {
        if col == period_idx {
            continue;
        }
        let value = |row: usize| -> Result<f64> {
            match raw.cell(row, col) {
                Cell::Null => Ok(0.0),
                cell => cell.as_number().ok_or_else(|| ReportError::NotNumeric {
                    column: name.clone(),
                    row,
                    value: cell.label(),
                }),
            }
        };
        table
            .rows
            .push(MetricRow::new(name.clone(), vec![value(current)?, value(previous)?]));
    }
    Ok(table)
}

#[derive(Debug, Clone, Copy)]
pub struct SectionGrouping<'a> {
    /// Row key -> section.
    pub sections: &'a [(&'a str, &'a str)],
    /// Row key -> display label; unlisted keys show as-is.
    pub labels: &'a [(&'a str, &'a str)],
    /// Row key -> hint for its value cells.
    pub row_hints: &'a [(&'a str, FormatHint)],
    /// Measure -> column title, in display order.
    pub columns: &'a [(&'a str, &'a str)],
    pub first_section_header: bool,
}

/// Lay out a one-row-per-metric table in sections, keeping row order within
/// each section.
pub fn group_into_sections(table: &MetricTable, grouping: &SectionGrouping) -> Result<SectionedReport> {
    if has_section_columns(table) {
        return Err(ReportError::AlreadySectioned);
    }
    let sections: BTreeMap<&str, &str> = grouping.sections.iter().copied().collect();
    let labels: BTreeMap<&str, &str> = grouping.labels.iter().copied().collect();
    let row_hints: BTreeMap<&str, FormatHint> = grouping.row_hints.iter().copied().collect();
    let measure_idx = grouping
        .columns
        .iter()
        .map(|(m, _)| table.measure_index(m))
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let section = sections
            .get(row.key.as_str())
            .ok_or_else(|| ReportError::UnmappedMetric(row.key.clone()))?;
        rows.push(SectionRow {
            section: section.to_string(),
            metric: labels.get(row.key.as_str()).copied().unwrap_or(row.key.as_str()).to_string(),
            value_type: None,
            values: measure_idx.iter().map(|i| row.values.get(*i).copied()).collect(),
            hint: row_hints.get(row.key.as_str()).copied(),
            is_header: false,
        });
    }

    let mut first_seen: Vec<String> = Vec::new();
    for r in &rows {
        if !first_seen.contains(&r.section) {
            first_seen.push(r.section.clone());
        }
    }
    rows.sort_by_key(|r| first_seen.iter().position(|s| *s == r.section));

    let column_hints = grouping
        .columns
        .iter()
        .filter_map(|(m, title)| table.hints.get(*m).map(|h| (title.to_string(), *h)))
        .collect();
    Ok(with_section_headers(
        grouping.columns.iter().map(|(_, t)| t.to_string()).collect(),
        column_hints,
        rows,
        grouping.first_section_header,
    ))
}

/// A transposed table is keyed by `Metric`; only `Section` or `Type` mark
/// one that has already been laid out.
fn has_section_columns(table: &MetricTable) -> bool {
    ["Section", "Type"]
        .iter()
        .any(|c| table.key_column == *c || table.attribute_columns.iter().any(|a| a == c))
}

/// Collapse Metric and Type into one display column: the first row of a
/// metric shows the metric, later rows show the indented type. Header rows
/// show the section name.
pub fn indent_repeated_metric(report: &SectionedReport, label_column: &str) -> ReportTable {
    let mut columns = vec![label_column.to_string()];
    columns.extend(report.value_columns.iter().cloned());
    let mut table = ReportTable::new(columns);
    table.hints = report.column_hints.clone();
    table.hints.insert(label_column.to_string(), FormatHint::Text);

    let mut previous: Option<&str> = None;
    for row in &report.rows {
        if row.is_header {
            table.push(RowRole::SectionHeader, vec![Cell::Text(row.section.clone())], None);
            previous = None;
            continue;
        }
        let label = match (previous, row.value_type) {
            (Some(p), Some(t)) if p == row.metric => format!("{}{}", INDENT, t.label()),
            _ => row.metric.clone(),
        };
        previous = Some(row.metric.as_str());
        let mut cells = vec![Cell::Text(label)];
        cells.extend(row.values.iter().map(|v| Cell::from(*v)));
        table.push(RowRole::Data, cells, row.hint);
    }
    table
}

/// Blank `column` on the data rows of the listed metrics.
pub fn blank_cells(report: &SectionedReport, metrics: &[&str], column: &str) -> Result<SectionedReport> {
    let idx = report.value_index(column)?;
    let mut out = report.clone();
    for row in out.rows.iter_mut().filter(|r| !r.is_header && metrics.contains(&r.metric.as_str())) {
        row.values[idx] = None;
    }
    Ok(out)
}

/// Overwrite `to` with `from` on the data rows of the listed metrics.
pub fn copy_column(report: &SectionedReport, metrics: &[&str], from: &str, to: &str) -> Result<SectionedReport> {
    let src = report.value_index(from)?;
    let dst = report.value_index(to)?;
    let mut out = report.clone();
    for row in out.rows.iter_mut().filter(|r| !r.is_header && metrics.contains(&r.metric.as_str())) {
        row.values[dst] = row.values[src];
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed a flattened layout back in, keyed by `Metric`.
    fn relayout_source(raw: &RawTable) -> Result<MetricTable> {
        let metric = raw.column_index("Metric")?;
        let section = raw.column_index("Section")?;
        let kind = raw.column_index("Type")?;
        let values: Vec<(usize, &String)> = raw
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| ![metric, section, kind].contains(i))
            .collect();
        let mut table = MetricTable::new(
            "Metric",
            values.iter().map(|(_, c)| c.to_string()).collect(),
            values.first().map(|(_, c)| c.as_str()).unwrap_or(""),
        );
        table.attribute_columns = vec!["Section".to_string(), "Type".to_string()];
        for i in 0..raw.len() {
            let mut row = MetricRow::new(
                raw.cell(i, metric).label(),
                values
                    .iter()
                    .map(|(c, _)| raw.cell(i, *c).as_number().unwrap_or(0.0))
                    .collect(),
            );
            row.attributes.insert("Section".to_string(), raw.cell(i, section).label());
            row.attributes.insert("Type".to_string(), raw.cell(i, kind).label());
            table.rows.push(row);
        }
        Ok(table)
    }

    fn tiers() -> MetricTable {
        let mut t = MetricTable::new(
            "TIER_NAME",
            vec!["SALES".into(), "SALES_GROWTH".into(), "SALES_CONTR".into(), "TXN".into()],
            "SALES",
        );
        t.hints.insert("SALES_CONTR".into(), FormatHint::PercentagePoints);
        t.rows.push(MetricRow::new("Green", vec![100.0, 0.1, 25.0, 10.0]));
        t.rows.push(MetricRow::new("Gold", vec![300.0, 0.2, 75.0, 20.0]));
        t.footer.push(MetricRow::new("Total", vec![400.0, 0.15, 100.0, 30.0]));
        t
    }

    const CELLS: [(&str, &str, ValueType); 4] = [
        ("TXN", "Transactions", ValueType::Current),
        ("SALES_CONTR", "Sales", ValueType::Contribution),
        ("SALES", "Sales", ValueType::Current),
        ("SALES_GROWTH", "Sales", ValueType::Growth),
    ];

    fn spec(first_section_header: bool) -> LayoutSpec<'static> {
        LayoutSpec {
            cells: &CELLS,
            metric_order: &["Sales", "Transactions"],
            type_order: &[ValueType::Current, ValueType::Growth, ValueType::Contribution],
            sections: &[("Sales", "Revenue"), ("Transactions", "Traffic")],
            column_order: None,
            first_section_header,
        }
    }

    #[test]
    fn rows_follow_metric_then_type_order() {
        let r = pivot_wide_to_sectioned(&tiers(), &spec(false)).unwrap();
        let order: Vec<(&str, Option<ValueType>)> =
            r.rows.iter().map(|r| (r.metric.as_str(), r.value_type)).collect();
        assert_eq!(
            order,
            vec![
                ("Sales", Some(ValueType::Current)),
                ("Sales", Some(ValueType::Growth)),
                ("Sales", Some(ValueType::Contribution)),
                ("", None),
                ("Transactions", Some(ValueType::Current)),
            ]
        );
        assert_eq!(r.value_columns, vec!["Green", "Gold", "Total"]);
        assert_eq!(r.rows[0].values, vec![Some(100.0), Some(300.0), Some(400.0)]);
        assert_eq!(r.rows[1].hint, Some(FormatHint::Percentage));
        assert_eq!(r.rows[2].hint, Some(FormatHint::PercentagePoints));
    }

    #[test]
    fn header_count_depends_on_first_section_flag() {
        let exempt = pivot_wide_to_sectioned(&tiers(), &spec(false)).unwrap();
        let all = pivot_wide_to_sectioned(&tiers(), &spec(true)).unwrap();
        assert_eq!(exempt.rows.len(), CELLS.len() + 2 - 1);
        assert_eq!(all.rows.len(), CELLS.len() + 2);
        assert!(all.rows[0].is_header && all.rows[0].section == "Revenue");
        assert_eq!(exempt.header_count(), 1);
        assert_eq!(all.data_rows().count(), CELLS.len());
    }

    #[test]
    fn unmapped_metric_is_reported() {
        let mut s = spec(false);
        s.sections = &[("Sales", "Revenue")];
        assert!(matches!(
            pivot_wide_to_sectioned(&tiers(), &s),
            Err(ReportError::UnmappedMetric(m)) if m == "Transactions"
        ));
    }

    #[test]
    fn laying_out_twice_is_rejected() {
        let once = pivot_wide_to_sectioned(&tiers(), &spec(false)).unwrap();
        let again = relayout_source(&once.to_raw_table()).unwrap();
        assert!(matches!(
            pivot_wide_to_sectioned(&again, &spec(false)),
            Err(ReportError::AlreadySectioned)
        ));
    }

    #[test]
    fn transposed_periods_can_be_pivoted() {
        let raw = RawTable::from_rows(
            &["PERIOD", "SALES"],
            vec![
                vec!["CURRENT".into(), Cell::Number(120.0)],
                vec!["PREVIOUS".into(), Cell::Number(100.0)],
            ],
        );
        let t = transpose_periods(&raw, "PERIOD", "CURRENT", "PREVIOUS").unwrap();
        let s = LayoutSpec {
            cells: &[
                (CURRENT_COLUMN, "Sales", ValueType::Current),
                (PREVIOUS_COLUMN, "Sales", ValueType::Previous),
            ],
            metric_order: &["Sales"],
            type_order: &[ValueType::Current, ValueType::Previous],
            sections: &[("Sales", "Revenue")],
            column_order: None,
            first_section_header: false,
        };
        let r = pivot_wide_to_sectioned(&t, &s).unwrap();
        assert_eq!(r.value_columns, vec!["SALES"]);
        assert_eq!(r.rows[0].values, vec![Some(120.0)]);
        assert_eq!(r.rows[1].values, vec![Some(100.0)]);
    }

    #[test]
    fn duplicate_cells_are_rejected() {
        const CELLS_DUP: [(&str, &str, ValueType); 2] = [
            ("SALES", "Sales", ValueType::Current),
            ("TXN", "Sales", ValueType::Current),
        ];
        let mut s = spec(false);
        s.cells = &CELLS_DUP;
        assert!(matches!(
            pivot_wide_to_sectioned(&tiers(), &s),
            Err(ReportError::DuplicateCell { .. })
        ));
    }

    #[test]
    fn missing_layout_column_stays_blank() {
        let mut s = spec(false);
        s.column_order = Some(&["Gold", "Silver"]);
        let r = pivot_wide_to_sectioned(&tiers(), &s).unwrap();
        assert_eq!(r.rows[0].values, vec![Some(300.0), None]);
    }

    #[test]
    fn indentation_compacts_metric_and_type() {
        let r = pivot_wide_to_sectioned(&tiers(), &spec(true)).unwrap();
        let t = indent_repeated_metric(&r, "Metric");
        let labels: Vec<String> = t.rows.iter().map(|r| r.cells[0].label()).collect();
        assert_eq!(
            labels,
            vec![
                "Revenue",
                "Sales",
                "    Growth period on period",
                "    Contribution to total",
                "Traffic",
                "Transactions",
            ]
        );
        assert_eq!(t.rows[0].role, RowRole::SectionHeader);
        assert_eq!(t.rows[1].cells[1], Cell::Number(100.0));
    }

    #[test]
    fn blank_and_copy_adjust_selected_metrics() {
        let r = pivot_wide_to_sectioned(&tiers(), &spec(false)).unwrap();
        let r = blank_cells(&r, &["Sales"], "Gold").unwrap();
        let r = copy_column(&r, &["Sales"], "Green", "Total").unwrap();
        assert_eq!(r.rows[0].values, vec![Some(100.0), None, Some(100.0)]);
        let txn = r.rows.iter().find(|r| r.metric == "Transactions").unwrap();
        assert_eq!(txn.values, vec![Some(10.0), Some(20.0), Some(30.0)]);
    }

    #[test]
    fn periods_transpose_into_metrics() {
        let raw = RawTable::from_rows(
            &["PERIOD", "SALES", "BASKET"],
            vec![
                vec!["PREVIOUS".into(), Cell::Number(80.0), Cell::Number(2.0)],
                vec!["CURRENT".into(), Cell::Number(100.0), Cell::Null],
            ],
        );
        let t = transpose_periods(&raw, "PERIOD", "CURRENT", "PREVIOUS").unwrap();
        assert_eq!(t.keys(), vec!["SALES", "BASKET"]);
        assert_eq!(t.rows[0].values, vec![100.0, 80.0]);
        assert_eq!(t.rows[1].values, vec![0.0, 2.0]);
    }

    #[test]
    fn grouping_keeps_row_order_inside_sections() {
        let mut t = MetricTable::new("Metric", vec!["Current".into()], "Current");
        for (k, v) in [("SALES", 1.0), ("TXN", 2.0), ("SALES_SHARE", 0.5)] {
            t.rows.push(MetricRow::new(k, vec![v]));
        }
        let grouping = SectionGrouping {
            sections: &[("SALES", "Sales"), ("TXN", "Transactions"), ("SALES_SHARE", "Sales")],
            labels: &[("SALES", "Total sales")],
            row_hints: &[("SALES_SHARE", FormatHint::Percentage)],
            columns: &[("Current", "CURRENT")],
            first_section_header: true,
        };
        let r = group_into_sections(&t, &grouping).unwrap();
        let labels: Vec<&str> = r
            .rows
            .iter()
            .map(|r| if r.is_header { r.section.as_str() } else { r.metric.as_str() })
            .collect();
        assert_eq!(labels, vec!["Sales", "Total sales", "SALES_SHARE", "Transactions", "TXN"]);
        assert_eq!(r.rows[2].hint, Some(FormatHint::Percentage));
    }
}
