// Derived-metric columns: growth, budget variance, contribution, ratios.
//
// Every operation returns a new table. The derivation that produced a column
// is recorded on the table so footer rows (totals, subtotals, averages) can
// recompute it from their own summed components instead of summing it.

use crate::arith::{contribution_pct, growth_pct, ratio, variance_pct};
use crate::error::Result;
use crate::types::{FormatHint, MetricRow, MetricTable};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthBase {
    Previous,
    Budget,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Derivation {
    Growth {
        output: String,
        current: String,
        base: String,
        against: GrowthBase,
    },
    Contribution {
        output: String,
        measure: String,
    },
    Ratio {
        output: String,
        numerator: String,
        denominator: String,
        scale: f64,
    },
}

impl Derivation {
    pub fn output(&self) -> &str {
        match self {
            Derivation::Growth { output, .. }
            | Derivation::Contribution { output, .. }
            | Derivation::Ratio { output, .. } => output,
        }
    }

    pub fn inputs(&self) -> Vec<&String> {
        match self {
            Derivation::Growth { current, base, .. } => vec![current, base],
            Derivation::Contribution { measure, .. } => vec![measure],
            Derivation::Ratio {
                numerator,
                denominator,
                ..
            } => vec![numerator, denominator],
        }
    }

    /// Output followed by inputs.
    pub fn columns(&self) -> Vec<&String> {
        let mut cols = match self {
            Derivation::Growth { output, .. }
            | Derivation::Contribution { output, .. }
            | Derivation::Ratio { output, .. } => vec![output],
        };
        cols.extend(self.inputs());
        cols
    }

    fn evaluate(&self, table: &MetricTable, row: &MetricRow) -> Result<f64> {
        match self {
            Derivation::Growth {
                current,
                base,
                against,
                ..
            } => {
                let c = table.value(row, current)?;
                let b = table.value(row, base)?;
                Ok(match against {
                    GrowthBase::Previous => growth_pct(c, b),
                    GrowthBase::Budget => variance_pct(c, b),
                })
            }
            Derivation::Contribution { measure, .. } => Ok(contribution_pct(
                table.value(row, measure)?,
                denominator(table, measure)?,
            )),
            Derivation::Ratio {
                numerator,
                denominator,
                scale,
                ..
            } => Ok(ratio(table.value(row, numerator)?, table.value(row, denominator)?) * scale),
        }
    }
}

/// `(output, current, base)` plus what the base is.
#[derive(Debug, Clone, Copy)]
pub struct GrowthSpec<'a> {
    pub output: &'a str,
    pub current: &'a str,
    pub base: &'a str,
    pub against: GrowthBase,
}

impl<'a> GrowthSpec<'a> {
    pub fn vs_previous(output: &'a str, current: &'a str, previous: &'a str) -> Self {
        GrowthSpec {
            output,
            current,
            base: previous,
            against: GrowthBase::Previous,
        }
    }

    pub fn vs_budget(output: &'a str, current: &'a str, budget: &'a str) -> Self {
        GrowthSpec {
            output,
            current,
            base: budget,
            against: GrowthBase::Budget,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RatioSpec<'a> {
    pub output: &'a str,
    pub numerator: &'a str,
    pub denominator: &'a str,
    pub scale: f64,
    pub hint: FormatHint,
}

impl<'a> RatioSpec<'a> {
    /// Plain fraction shown as a percentage (`0.015` -> `1.5%`).
    pub fn share(output: &'a str, numerator: &'a str, denominator: &'a str) -> Self {
        RatioSpec {
            output,
            numerator,
            denominator,
            scale: 1.0,
            hint: FormatHint::Percentage,
        }
    }

    /// Per-unit amount such as revenue per store.
    pub fn per(output: &'a str, numerator: &'a str, denominator: &'a str) -> Self {
        RatioSpec {
            output,
            numerator,
            denominator,
            scale: 1.0,
            hint: FormatHint::Number,
        }
    }
}

/// Sum of a measure over the data rows, never counting footer rows or a data
/// row keyed as the total.
pub fn denominator(table: &MetricTable, measure: &str) -> Result<f64> {
    let idx = table.measure_index(measure)?;
    Ok(table
        .denominator_rows()
        .map(|r| r.values.get(idx).copied().unwrap_or(0.0))
        .sum())
}

pub fn add_contribution_columns(table: &MetricTable, pairs: &[(&str, &str)]) -> Result<MetricTable> {
    let mut out = table.clone();
    for (measure, output) in pairs {
        apply(
            &mut out,
            Derivation::Contribution {
                output: output.to_string(),
                measure: measure.to_string(),
            },
            FormatHint::PercentagePoints,
        )?;
    }
    Ok(out)
}

pub fn add_growth_columns(table: &MetricTable, specs: &[GrowthSpec]) -> Result<MetricTable> {
    let mut out = table.clone();
    for spec in specs {
        apply(
            &mut out,
            Derivation::Growth {
                output: spec.output.to_string(),
                current: spec.current.to_string(),
                base: spec.base.to_string(),
                against: spec.against,
            },
            FormatHint::Percentage,
        )?;
    }
    Ok(out)
}

pub fn add_ratio_columns(table: &MetricTable, specs: &[RatioSpec]) -> Result<MetricTable> {
    let mut out = table.clone();
    for spec in specs {
        apply(
            &mut out,
            Derivation::Ratio {
                output: spec.output.to_string(),
                numerator: spec.numerator.to_string(),
                denominator: spec.denominator.to_string(),
                scale: spec.scale,
            },
            spec.hint,
        )?;
    }
    Ok(out)
}

/// Recompute every recorded derivation, in recording order, on footer rows.
pub fn refresh_footer(table: &mut MetricTable) -> Result<()> {
    for derivation in table.derivations.clone() {
        let idx = table.measure_index(derivation.output())?;
        let values = evaluate_rows(table, &table.footer, &derivation)?;
        assign(&mut table.footer, idx, values);
    }
    Ok(())
}

/// Recompute every recorded derivation on data rows and footer rows, e.g.
/// after regrouping has summed the derived columns.
pub fn refresh(table: &mut MetricTable) -> Result<()> {
    for derivation in table.derivations.clone() {
        let idx = table.measure_index(derivation.output())?;
        let rows = evaluate_rows(table, &table.rows, &derivation)?;
        assign(&mut table.rows, idx, rows);
        let footer = evaluate_rows(table, &table.footer, &derivation)?;
        assign(&mut table.footer, idx, footer);
    }
    Ok(())
}

fn apply(table: &mut MetricTable, derivation: Derivation, hint: FormatHint) -> Result<()> {
    for input in derivation.inputs() {
        table.measure_index(input)?;
    }
    let idx = table.ensure_measure(derivation.output(), Some(hint));
    let rows = evaluate_rows(table, &table.rows, &derivation)?;
    assign(&mut table.rows, idx, rows);
    let footer = evaluate_rows(table, &table.footer, &derivation)?;
    assign(&mut table.footer, idx, footer);
    table.derivations.retain(|d| d.output() != derivation.output());
    table.derivations.push(derivation);
    Ok(())
}

fn evaluate_rows(table: &MetricTable, rows: &[MetricRow], derivation: &Derivation) -> Result<Vec<f64>> {
    rows.iter().map(|r| derivation.evaluate(table, r)).collect()
}

fn assign(rows: &mut [MetricRow], idx: usize, values: Vec<f64>) {
    for (row, v) in rows.iter_mut().zip(values) {
        if let Some(slot) = row.values.get_mut(idx) {
            *slot = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::totals::append_total_row;
    use crate::types::TOTAL_KEY;

    fn regions() -> MetricTable {
        let mut t = MetricTable::new(
            "REGION",
            vec!["CURRENT".into(), "PREVIOUS".into(), "BUDGET".into()],
            "CURRENT",
        );
        t.rows.push(MetricRow::new("North", vec![100.0, 50.0, 80.0]));
        t.rows.push(MetricRow::new("South", vec![0.0, 0.0, 0.0]));
        t.rows.push(MetricRow::new("East", vec![300.0, 250.0, 400.0]));
        t
    }

    #[test]
    fn growth_against_zero_base_is_zero() {
        let t = add_growth_columns(&regions(), &[GrowthSpec::vs_previous("GROWTH", "CURRENT", "PREVIOUS")]).unwrap();
        let g = t.column("GROWTH").unwrap();
        assert_eq!(g[0], 1.0);
        assert_eq!(g[1], 0.0);
        assert!(!g.iter().any(|v| v.is_nan()));
        assert_eq!(t.hints["GROWTH"], FormatHint::Percentage);
    }

    #[test]
    fn budget_variance_is_a_fraction() {
        let t = add_growth_columns(&regions(), &[GrowthSpec::vs_budget("VS BUDGET", "CURRENT", "BUDGET")]).unwrap();
        let v = t.column("VS BUDGET").unwrap();
        assert!((v[0] - 0.25).abs() < 1e-9);
        assert!((v[2] + 0.25).abs() < 1e-9);
    }

    #[test]
    fn contributions_sum_to_one_hundred() {
        let t = add_contribution_columns(&regions(), &[("CURRENT", "% CONTR")]).unwrap();
        let sum: f64 = t.column("% CONTR").unwrap().iter().sum();
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn contribution_ignores_an_existing_total() {
        let with_total = append_total_row(&regions(), &[]).unwrap();
        let t = add_contribution_columns(&with_total, &[("CURRENT", "% CONTR")]).unwrap();
        assert!((t.column("% CONTR").unwrap()[0] - 25.0).abs() < 1e-9);
        let total = t.total().unwrap();
        assert!((t.value(total, "% CONTR").unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn stray_total_data_row_is_not_a_denominator() {
        let mut t = regions();
        t.rows.push(MetricRow::new(TOTAL_KEY, vec![400.0, 300.0, 480.0]));
        assert_eq!(denominator(&t, "CURRENT").unwrap(), 400.0);
    }

    #[test]
    fn input_table_is_untouched() {
        let base = regions();
        let _ = add_contribution_columns(&base, &[("CURRENT", "% CONTR")]).unwrap();
        assert_eq!(base, regions());
    }

    #[test]
    fn missing_input_column_fails() {
        let err = add_ratio_columns(&regions(), &[RatioSpec::share("X", "CURRENT", "UNITS")]);
        assert!(err.is_err());
    }

    #[test]
    fn ratios_on_zero_denominators_are_zero() {
        let t = add_ratio_columns(&regions(), &[RatioSpec::share("CUR/BUD", "CURRENT", "BUDGET")]).unwrap();
        assert_eq!(t.column("CUR/BUD").unwrap()[1], 0.0);
        assert!((t.column("CUR/BUD").unwrap()[0] - 1.25).abs() < 1e-9);
    }
}
