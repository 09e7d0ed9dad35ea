// Coercion of fetched tables into typed metric tables, plus grouping,
// ordering and subsetting.
//
// Subsetting drops footer rows: a total computed for the full population
// would be wrong for the subset, so views append their own.

use crate::derive::refresh;
use crate::error::{ReportError, Result};
use crate::types::{Cell, FormatHint, MetricRow, MetricTable, RawTable};
use crate::util::{asc, desc, parse_f64_safe};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Which columns of a fetched table play which role.
#[derive(Debug, Clone, Copy)]
pub struct TableSchema<'a> {
    pub key: &'a str,
    pub attributes: &'a [&'a str],
    pub measures: &'a [&'a str],
    pub flags: &'a [&'a str],
    pub primary: &'a str,
    /// Key values that are warehouse-computed summary rows.
    pub footer_keys: &'a [&'a str],
}

impl<'a> TableSchema<'a> {
    pub fn new(key: &'a str, measures: &'a [&'a str], primary: &'a str) -> Self {
        TableSchema {
            key,
            attributes: &[],
            measures,
            flags: &[],
            primary,
            footer_keys: &[],
        }
    }
}

pub fn coerce_metric_table(raw: &RawTable, schema: &TableSchema) -> Result<MetricTable> {
    let key_idx = raw.column_index(schema.key)?;
    let attr_idx = indices(raw, schema.attributes)?;
    let measure_idx = indices(raw, schema.measures)?;
    let flag_idx = indices(raw, schema.flags)?;
    if !schema.measures.contains(&schema.primary) {
        return Err(ReportError::missing_column(schema.primary, &owned(schema.measures)));
    }

    let mut table = MetricTable::new(schema.key, owned(schema.measures), schema.primary);
    table.attribute_columns = owned(schema.attributes);
    table.flag_columns = owned(schema.flags);

    for i in 0..raw.len() {
        let mut values = Vec::with_capacity(measure_idx.len());
        for (name, idx) in schema.measures.iter().zip(&measure_idx) {
            values.push(coerce_number(raw.cell(i, *idx), name, i)?);
        }
        let mut row = MetricRow::new(raw.cell(i, key_idx).label(), values);
        for (name, idx) in schema.attributes.iter().zip(&attr_idx) {
            row.attributes.insert(name.to_string(), raw.cell(i, *idx).label());
        }
        for (name, idx) in schema.flags.iter().zip(&flag_idx) {
            row.flags.insert(name.to_string(), coerce_flag(raw.cell(i, *idx)));
        }
        if schema.footer_keys.contains(&row.key.as_str()) {
            table.footer.push(row);
        } else {
            table.rows.push(row);
        }
    }
    debug!(
        key = schema.key,
        rows = table.rows.len(),
        footer = table.footer.len(),
        "coerced metric table"
    );
    Ok(table)
}

fn indices(raw: &RawTable, names: &[&str]) -> Result<Vec<usize>> {
    names.iter().map(|n| raw.column_index(n)).collect()
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Null and blank become zero; anything else must read as a number.
fn coerce_number(cell: &Cell, column: &str, row: usize) -> Result<f64> {
    match cell {
        Cell::Null => Ok(0.0),
        Cell::Number(n) if n.is_finite() => Ok(*n),
        Cell::Number(_) => Ok(0.0),
        Cell::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Cell::Text(s) if s.trim().is_empty() => Ok(0.0),
        Cell::Text(s) => parse_f64_safe(Some(s)).ok_or_else(|| ReportError::NotNumeric {
            column: column.to_string(),
            row,
            value: s.clone(),
        }),
    }
}

fn coerce_flag(cell: &Cell) -> bool {
    match cell {
        Cell::Bool(b) => *b,
        Cell::Number(n) => *n != 0.0,
        Cell::Text(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "t" | "yes" | "y" | "1"
        ),
        Cell::Null => false,
    }
}

/// Value of `dimension` on a row: the key itself or a named attribute.
fn dimension_value<'r>(table: &MetricTable, row: &'r MetricRow, dimension: &str) -> &'r str {
    if dimension == table.key_column {
        &row.key
    } else {
        row.attribute(dimension).unwrap_or("")
    }
}

fn check_dimension(table: &MetricTable, dimension: &str) -> Result<()> {
    if dimension == table.key_column || table.attribute_columns.iter().any(|a| a == dimension) {
        return Ok(());
    }
    let mut available = vec![table.key_column.clone()];
    available.extend(table.attribute_columns.iter().cloned());
    Err(ReportError::missing_column(dimension, &available))
}

/// Sum every measure per distinct value of `dimension`, then sort descending
/// by the primary measure (ties keep first-appearance order).
pub fn aggregate_by(table: &MetricTable, dimension: &str) -> Result<MetricTable> {
    aggregate_with(table, dimension, &[])
}

/// [`aggregate_by`] that also counts distinct non-blank values of attribute
/// columns per group; each `(output, attribute)` pair becomes a measure.
pub fn aggregate_with(table: &MetricTable, dimension: &str, distinct: &[(&str, &str)]) -> Result<MetricTable> {
    check_dimension(table, dimension)?;
    for (_, attribute) in distinct {
        check_dimension(table, attribute)?;
    }

    let mut out = table.clone();
    out.key_column = dimension.to_string();
    out.attribute_columns.retain(|a| a != dimension);
    out.footer.clear();
    out.rows.clear();

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut seen: Vec<Vec<HashSet<String>>> = Vec::new();

    for row in &table.rows {
        let group = dimension_value(table, row, dimension).to_string();
        let slot = match index.get(&group) {
            Some(slot) => *slot,
            None => {
                let mut first = MetricRow::new(group.clone(), vec![0.0; table.measures.len()]);
                first.attributes = row.attributes.clone();
                first.attributes.remove(dimension);
                out.rows.push(first);
                seen.push(vec![HashSet::new(); distinct.len()]);
                index.insert(group, out.rows.len() - 1);
                out.rows.len() - 1
            }
        };
        let acc = &mut out.rows[slot];
        for (sum, v) in acc.values.iter_mut().zip(&row.values) {
            *sum += v;
        }
        acc.attributes
            .retain(|name, value| row.attribute(name) == Some(value.as_str()));
        for (name, flag) in &row.flags {
            let entry = acc.flags.entry(name.clone()).or_insert(false);
            *entry = *entry || *flag;
        }
        for (i, (_, attribute)) in distinct.iter().enumerate() {
            let value = dimension_value(table, row, attribute).trim();
            if !value.is_empty() {
                seen[slot][i].insert(value.to_string());
            }
        }
    }

    for (i, (output, _)) in distinct.iter().enumerate() {
        let idx = out.ensure_measure(output, Some(FormatHint::Number));
        for (row, sets) in out.rows.iter_mut().zip(&seen) {
            row.values[idx] = sets[i].len() as f64;
        }
    }

    refresh(&mut out)?;
    let primary = out.measure_index(&out.primary)?;
    out.rows.sort_by(|a, b| desc(a.values[primary], b.values[primary]));
    debug!(
        dimension,
        groups = out.rows.len(),
        source_rows = table.rows.len(),
        "aggregated"
    );
    Ok(out)
}

/// Distinct non-blank values of `attribute` across the source rows whose
/// `dimension` value is one of `groups`.
pub fn count_distinct_within(table: &MetricTable, dimension: &str, groups: &[&str], attribute: &str) -> Result<usize> {
    check_dimension(table, dimension)?;
    check_dimension(table, attribute)?;
    let values: HashSet<&str> = table
        .rows
        .iter()
        .filter(|r| groups.contains(&dimension_value(table, r, dimension)))
        .map(|r| dimension_value(table, r, attribute).trim())
        .filter(|v| !v.is_empty())
        .collect();
    Ok(values.len())
}

/// First `n` rows in their current order.
pub fn top_n(table: &MetricTable, n: usize) -> MetricTable {
    let mut out = table.clone();
    out.rows.truncate(n);
    out.footer.clear();
    out
}

/// The `n` weakest rows with a positive primary measure, ascending.
pub fn bottom_n(table: &MetricTable, n: usize) -> MetricTable {
    let mut out = table.clone();
    let primary = table.measure_index(&table.primary).ok();
    let value = |r: &MetricRow| primary.and_then(|i| r.values.get(i).copied()).unwrap_or(0.0);
    out.rows.retain(|r| value(r) > 0.0);
    out.rows.sort_by(|a, b| asc(value(a), value(b)));
    out.rows.truncate(n);
    out.footer.clear();
    out
}

/// Rows whose flag is set; rows without the flag count as unset.
pub fn filter_by_flag(table: &MetricTable, flag: &str) -> Result<MetricTable> {
    if !table.flag_columns.iter().any(|f| f == flag) {
        return Err(ReportError::missing_column(flag, &table.flag_columns));
    }
    let mut out = table.clone();
    out.rows.retain(|r| r.flag(flag));
    out.footer.clear();
    Ok(out)
}

/// Keep rows whose `measure` is strictly positive.
pub fn exclude_non_positive(table: &MetricTable, measure: &str) -> Result<MetricTable> {
    let idx = table.measure_index(measure)?;
    let mut out = table.clone();
    out.rows.retain(|r| r.values.get(idx).copied().unwrap_or(0.0) > 0.0);
    out.footer.clear();
    Ok(out)
}

/// Stable descending sort by `measure`, which becomes the primary measure.
pub fn sort_by_measure(table: &MetricTable, measure: &str) -> Result<MetricTable> {
    let mut out = table.with_primary(measure)?;
    let idx = out.measure_index(measure)?;
    out.rows.sort_by(|a, b| desc(a.values[idx], b.values[idx]));
    Ok(out)
}

/// Ascending by key text; ISO dates sort chronologically.
pub fn sort_by_key(table: &MetricTable) -> MetricTable {
    let mut out = table.clone();
    out.rows.sort_by(|a, b| a.key.cmp(&b.key));
    out
}

/// Stable sort by a fixed category order; unknown values go last.
pub fn order_by_category(table: &MetricTable, dimension: &str, order: &[String]) -> Result<MetricTable> {
    check_dimension(table, dimension)?;
    let rank: BTreeMap<&str, usize> = order.iter().enumerate().map(|(i, c)| (c.as_str(), i)).collect();
    let position = |r: &MetricRow| {
        rank.get(dimension_value(table, r, dimension))
            .copied()
            .unwrap_or(order.len())
    };
    let mut out = table.clone();
    out.rows.sort_by_key(|r| position(r));
    Ok(out)
}

/// Fraction of `measure`'s grand total held by the `n` largest positive rows.
pub fn share_of_top_n(table: &MetricTable, measure: &str, n: usize) -> Result<f64> {
    let idx = table.measure_index(measure)?;
    let mut values: Vec<f64> = table
        .denominator_rows()
        .map(|r| r.values.get(idx).copied().unwrap_or(0.0))
        .collect();
    let total: f64 = values.iter().sum();
    values.retain(|v| *v > 0.0);
    values.sort_by(|a, b| desc(*a, *b));
    let top: f64 = values.iter().take(n).sum();
    Ok(crate::arith::ratio(top, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TOTAL_KEY;

    fn table(rows: &[(&str, f64)]) -> MetricTable {
        let mut t = MetricTable::new("STORE", vec!["REV".into()], "REV");
        for (k, v) in rows {
            t.rows.push(MetricRow::new(*k, vec![*v]));
        }
        t
    }

    fn stores_raw() -> RawTable {
        RawTable::from_rows(
            &["CENTER", "REGION", "CATEGORY", "REV", "UNITS", "IS_NEW"],
            vec![
                vec!["s1".into(), "North".into(), "B".into(), Cell::Number(100.0), "1,000".into(), Cell::Bool(true)],
                vec!["s2".into(), "South".into(), "A +".into(), Cell::Number(300.0), Cell::Null, Cell::Null],
                vec!["s3".into(), "North".into(), "A".into(), Cell::Number(50.0), "".into(), "false".into()],
                vec!["Total".into(), Cell::Null, Cell::Null, Cell::Number(450.0), Cell::Number(1000.0), Cell::Null],
            ],
        )
    }

    fn stores_schema() -> TableSchema<'static> {
        TableSchema {
            key: "CENTER",
            attributes: &["REGION", "CATEGORY"],
            measures: &["REV", "UNITS"],
            flags: &["IS_NEW"],
            primary: "REV",
            footer_keys: &[TOTAL_KEY],
        }
    }

    #[test]
    fn coercion_zeroes_blanks_and_splits_footers() {
        let t = coerce_metric_table(&stores_raw(), &stores_schema()).unwrap();
        assert_eq!(t.keys(), vec!["s1", "s2", "s3"]);
        assert_eq!(t.column("UNITS").unwrap(), vec![1000.0, 0.0, 0.0]);
        assert_eq!(t.footer.len(), 1);
        assert!(t.rows[0].flag("IS_NEW"));
        assert!(!t.rows[1].flag("IS_NEW"));
    }

    #[test]
    fn text_in_a_measure_is_rejected() {
        let raw = RawTable::from_rows(&["K", "V"], vec![vec!["a".into(), "twelve".into()]]);
        let err = coerce_metric_table(&raw, &TableSchema::new("K", &["V"], "V")).unwrap_err();
        assert!(matches!(err, ReportError::NotNumeric { row: 0, .. }));
    }

    #[test]
    fn absent_measure_column_is_a_schema_error() {
        let raw = RawTable::from_rows(&["K", "V"], vec![]);
        let err = coerce_metric_table(&raw, &TableSchema::new("K", &["BUDGET"], "BUDGET")).unwrap_err();
        assert!(matches!(err, ReportError::MissingColumn { .. }));
    }

    #[test]
    fn aggregate_sums_and_sorts_descending() {
        let t = coerce_metric_table(&stores_raw(), &stores_schema()).unwrap();
        let by_region = aggregate_by(&t, "REGION").unwrap();
        assert_eq!(by_region.keys(), vec!["South", "North"]);
        assert_eq!(by_region.column("REV").unwrap(), vec![300.0, 150.0]);
        assert_eq!(by_region.key_column, "REGION");
        assert!(by_region.rows[1].flag("IS_NEW"));
        // Source table untouched.
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn aggregate_keys_are_unique_and_ties_are_stable() {
        let t = table(&[("b", 10.0), ("a", 10.0), ("b", 5.0), ("c", 15.0)]);
        let g = aggregate_by(&t, "STORE").unwrap();
        assert_eq!(g.keys(), vec!["b", "c", "a"]);
    }

    #[test]
    fn distinct_counts_per_group() {
        let t = coerce_metric_table(&stores_raw(), &stores_schema()).unwrap();
        let g = aggregate_with(&t, "REGION", &[("STORES", "CENTER")]).unwrap();
        assert_eq!(g.column("STORES").unwrap(), vec![1.0, 2.0]);
        assert_eq!(count_distinct_within(&t, "REGION", &["North", "South"], "CENTER").unwrap(), 3);
    }

    #[test]
    fn unknown_dimension_fails() {
        let t = table(&[("a", 1.0)]);
        assert!(aggregate_by(&t, "BRAND").is_err());
    }

    #[test]
    fn top_n_on_short_table_returns_everything_in_order() {
        let t = table(&[("a", 1.0), ("b", 5.0), ("c", 3.0), ("d", 2.0), ("e", 4.0)]);
        let top = top_n(&t, 10);
        assert_eq!(top.keys(), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn bottom_n_skips_inactive_rows() {
        let t = table(&[("w", 50.0), ("x", 0.0), ("y", -10.0), ("z", 30.0)]);
        let bottom = bottom_n(&t, 2);
        assert_eq!(bottom.column("REV").unwrap(), vec![30.0, 50.0]);
        let bottom = bottom_n(&t, 10);
        assert!(bottom.column("REV").unwrap().iter().all(|v| *v > 0.0));
    }

    #[test]
    fn flag_filter_treats_missing_as_false() {
        let t = coerce_metric_table(&stores_raw(), &stores_schema()).unwrap();
        assert_eq!(filter_by_flag(&t, "IS_NEW").unwrap().keys(), vec!["s1"]);
        assert!(filter_by_flag(&t, "IS_CLOSED").is_err());
    }

    #[test]
    fn category_order_is_fixed_not_alphabetical() {
        let t = coerce_metric_table(&stores_raw(), &stores_schema()).unwrap();
        let by_cat = aggregate_by(&t, "CATEGORY").unwrap();
        let order: Vec<String> = ["A +", "A", "B", "C"].iter().map(|s| s.to_string()).collect();
        let ordered = order_by_category(&by_cat, "CATEGORY", &order).unwrap();
        assert_eq!(ordered.keys(), vec!["A +", "A", "B"]);
    }

    #[test]
    fn top_share_uses_the_grand_total() {
        let t = table(&[("a", 60.0), ("b", 30.0), ("c", 10.0)]);
        assert!((share_of_top_n(&t, "REV", 2).unwrap() - 0.9).abs() < 1e-9);
        assert_eq!(share_of_top_n(&table(&[]), "REV", 2).unwrap(), 0.0);
    }
}
