use crate::derive::Derivation;
use crate::error::{ReportError, Result};
use crate::util::parse_f64_safe;
use serde::Serialize;
use std::collections::BTreeMap;

/// Key of the synthetic footer row that holds a table's column sums.
pub const TOTAL_KEY: &str = "Total";

static NULL_CELL: Cell = Cell::Null;

/// One value of a fetched result set, as delivered by the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Cell {
    /// Interpret a raw extract field. Blank fields are nulls, `true`/`false`
    /// are booleans, plain numbers are numbers, anything else stays text.
    pub fn from_field(field: &str) -> Cell {
        let s = field.trim();
        if s.is_empty() {
            return Cell::Null;
        }
        if s.eq_ignore_ascii_case("true") {
            return Cell::Bool(true);
        }
        if s.eq_ignore_ascii_case("false") {
            return Cell::Bool(false);
        }
        match s.parse::<f64>() {
            Ok(n) if n.is_finite() => Cell::Number(n),
            _ => Cell::Text(s.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) if n.is_finite() => Some(*n),
            Cell::Text(s) => parse_f64_safe(Some(s)),
            _ => None,
        }
    }

    /// Text form used when a cell acts as a grouping key or label.
    pub fn label(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Bool(b) => b.to_string(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{:.0}", n),
            Cell::Number(n) => n.to_string(),
            Cell::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<Option<f64>> for Cell {
    fn from(v: Option<f64>) -> Self {
        v.map(Cell::Number).unwrap_or(Cell::Null)
    }
}

/// Flat rectangular result set returned by the fetch collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        RawTable {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(columns: &[&str], rows: Vec<Vec<Cell>>) -> Self {
        let mut table = RawTable::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            table.push_row(row);
        }
        table
    }

    /// Append a row, padding short rows with nulls and dropping overflow.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Null);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| ReportError::missing_column(name, &self.columns))
    }

    pub fn cell(&self, row: usize, column: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&NULL_CELL)
    }
}

/// A row of a typed metric table. Measures are addressed through the owning
/// table's `measures` names; `values` is parallel to them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub key: String,
    pub attributes: BTreeMap<String, String>,
    pub values: Vec<f64>,
    pub flags: BTreeMap<String, bool>,
}

impl MetricRow {
    pub fn new(key: impl Into<String>, values: Vec<f64>) -> Self {
        MetricRow {
            key: key.into(),
            attributes: BTreeMap::new(),
            values,
            flags: BTreeMap::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Missing flags read as false.
    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}

/// Typed table used by every transform stage between fetch and layout.
///
/// Data rows and footer rows are kept apart: footer rows (totals, subtotals,
/// averages) never take part in contribution denominators or subsetting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTable {
    pub key_column: String,
    pub attribute_columns: Vec<String>,
    pub flag_columns: Vec<String>,
    pub measures: Vec<String>,
    /// Measure that drives descending order, top-N and bottom-N.
    pub primary: String,
    pub rows: Vec<MetricRow>,
    pub footer: Vec<MetricRow>,
    pub derivations: Vec<Derivation>,
    pub hints: BTreeMap<String, FormatHint>,
}

impl MetricTable {
    pub fn new(key_column: impl Into<String>, measures: Vec<String>, primary: impl Into<String>) -> Self {
        MetricTable {
            key_column: key_column.into(),
            attribute_columns: Vec::new(),
            flag_columns: Vec::new(),
            measures,
            primary: primary.into(),
            rows: Vec::new(),
            footer: Vec::new(),
            derivations: Vec::new(),
            hints: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn measure_index(&self, name: &str) -> Result<usize> {
        self.measures
            .iter()
            .position(|m| m == name)
            .ok_or_else(|| ReportError::missing_column(name, &self.measures))
    }

    pub fn value(&self, row: &MetricRow, name: &str) -> Result<f64> {
        let idx = self.measure_index(name)?;
        Ok(row.values.get(idx).copied().unwrap_or(0.0))
    }

    /// Values of one measure across the data rows.
    pub fn column(&self, name: &str) -> Result<Vec<f64>> {
        let idx = self.measure_index(name)?;
        Ok(self
            .rows
            .iter()
            .map(|r| r.values.get(idx).copied().unwrap_or(0.0))
            .collect())
    }

    pub fn keys(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.key.as_str()).collect()
    }

    /// Data rows that may contribute to a denominator: a stray data row
    /// carrying the total key is never counted.
    pub fn denominator_rows(&self) -> impl Iterator<Item = &MetricRow> {
        self.rows.iter().filter(|r| r.key != TOTAL_KEY)
    }

    pub fn footer_row(&self, key: &str) -> Option<&MetricRow> {
        self.footer.iter().find(|r| r.key == key)
    }

    pub fn total(&self) -> Option<&MetricRow> {
        self.footer_row(TOTAL_KEY)
    }

    /// Register a measure, filling existing rows with zero. Returns its index.
    pub fn ensure_measure(&mut self, name: &str, hint: Option<FormatHint>) -> usize {
        if let Some(hint) = hint {
            self.hints.insert(name.to_string(), hint);
        }
        if let Some(idx) = self.measures.iter().position(|m| m == name) {
            return idx;
        }
        self.measures.push(name.to_string());
        for row in self.rows.iter_mut().chain(self.footer.iter_mut()) {
            row.values.push(0.0);
        }
        self.measures.len() - 1
    }

    pub fn with_primary(&self, name: &str) -> Result<MetricTable> {
        self.measure_index(name)?;
        let mut out = self.clone();
        out.primary = name.to_string();
        Ok(out)
    }

    /// Copy without the named measures. Derivations that produce or read a
    /// dropped measure are forgotten; their already computed values stay.
    pub fn drop_measures(&self, names: &[&str]) -> MetricTable {
        let keep: Vec<usize> = (0..self.measures.len())
            .filter(|i| !names.contains(&self.measures[*i].as_str()))
            .collect();
        let project = |row: &MetricRow| MetricRow {
            values: keep
                .iter()
                .map(|i| row.values.get(*i).copied().unwrap_or(0.0))
                .collect(),
            ..row.clone()
        };
        MetricTable {
            measures: keep.iter().map(|i| self.measures[*i].clone()).collect(),
            rows: self.rows.iter().map(project).collect(),
            footer: self.footer.iter().map(project).collect(),
            derivations: self
                .derivations
                .iter()
                .filter(|d| d.columns().iter().all(|c| !names.contains(&c.as_str())))
                .cloned()
                .collect(),
            hints: self
                .hints
                .iter()
                .filter(|(k, _)| !names.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            ..self.clone()
        }
    }
}

/// How the renderer should present a numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatHint {
    Text,
    /// Thousands separators, no decimals.
    Number,
    TwoDecimal,
    /// Rand amount with two decimals.
    Currency,
    /// Value is a fraction (0.125 renders as 12.5%).
    Percentage,
    /// Value is already scaled by 100 (12.5 renders as 12.5%).
    PercentagePoints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ValueType {
    Current,
    #[serde(rename = "Growth period on period")]
    Growth,
    #[serde(rename = "Contribution to total")]
    Contribution,
    Previous,
    Budget,
}

impl ValueType {
    pub fn label(&self) -> &'static str {
        match self {
            ValueType::Current => "Current",
            ValueType::Growth => "Growth period on period",
            ValueType::Contribution => "Contribution to total",
            ValueType::Previous => "Previous",
            ValueType::Budget => "Budget",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionRow {
    pub section: String,
    pub metric: String,
    pub value_type: Option<ValueType>,
    pub values: Vec<Option<f64>>,
    pub hint: Option<FormatHint>,
    pub is_header: bool,
}

impl SectionRow {
    pub fn header(section: &str, width: usize) -> Self {
        SectionRow {
            section: section.to_string(),
            metric: String::new(),
            value_type: None,
            values: vec![None; width],
            hint: None,
            is_header: true,
        }
    }
}

/// Long-format (Section, Metric, Type) layout; built once, read by the renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionedReport {
    pub value_columns: Vec<String>,
    pub column_hints: BTreeMap<String, FormatHint>,
    pub rows: Vec<SectionRow>,
}

impl SectionedReport {
    pub fn data_rows(&self) -> impl Iterator<Item = &SectionRow> {
        self.rows.iter().filter(|r| !r.is_header)
    }

    pub fn header_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_header).count()
    }

    pub fn value_index(&self, column: &str) -> Result<usize> {
        self.value_columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| ReportError::missing_column(column, &self.value_columns))
    }

    /// Flatten back to a rectangular table with `Section`, `Metric` and
    /// `Type` columns ahead of the value columns.
    pub fn to_raw_table(&self) -> RawTable {
        let mut columns = vec!["Section".to_string(), "Metric".to_string(), "Type".to_string()];
        columns.extend(self.value_columns.iter().cloned());
        let mut table = RawTable::new(columns);
        for row in &self.rows {
            let mut cells = vec![
                Cell::Text(row.section.clone()),
                if row.is_header { Cell::Null } else { Cell::Text(row.metric.clone()) },
                row.value_type
                    .map(|t| Cell::Text(t.label().to_string()))
                    .unwrap_or(Cell::Null),
            ];
            cells.extend(row.values.iter().map(|v| Cell::from(*v)));
            table.push_row(cells);
        }
        table
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowRole {
    Data,
    Total,
    SectionHeader,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub role: RowRole,
    pub cells: Vec<Cell>,
    /// Applies to value cells whose column carries no hint of its own.
    pub hint: Option<FormatHint>,
}

/// Presentation-ready table: numeric cells stay numeric, hints say how to
/// show them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportTable {
    pub columns: Vec<String>,
    pub rows: Vec<ReportRow>,
    pub hints: BTreeMap<String, FormatHint>,
}

impl ReportTable {
    pub fn new(columns: Vec<String>) -> Self {
        ReportTable {
            columns,
            rows: Vec::new(),
            hints: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, role: RowRole, mut cells: Vec<Cell>, hint: Option<FormatHint>) {
        cells.resize(self.columns.len(), Cell::Null);
        self.rows.push(ReportRow { role, cells, hint });
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| ReportError::missing_column(name, &self.columns))
    }

    /// Column hint first, then the row hint, then the cell's own type.
    pub fn hint_for(&self, row: &ReportRow, column: usize) -> FormatHint {
        if let Some(hint) = self.columns.get(column).and_then(|c| self.hints.get(c)) {
            return *hint;
        }
        if let Some(hint) = row.hint {
            return hint;
        }
        match row.cells.get(column) {
            Some(Cell::Number(_)) => FormatHint::Number,
            _ => FormatHint::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Ready,
    NoData,
    Failed { reason: String },
}

/// One titled table of the final document, in document order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub title: String,
    pub table: ReportTable,
    pub status: EntryStatus,
}

impl ReportEntry {
    pub fn ready(title: impl Into<String>, table: ReportTable) -> Self {
        ReportEntry {
            title: title.into(),
            table,
            status: EntryStatus::Ready,
        }
    }

    pub fn no_data(title: impl Into<String>) -> Self {
        ReportEntry {
            title: title.into(),
            table: ReportTable::default(),
            status: EntryStatus::NoData,
        }
    }

    pub fn failed(title: impl Into<String>, reason: impl Into<String>) -> Self {
        ReportEntry {
            title: title.into(),
            table: ReportTable::default(),
            status: EntryStatus::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn has_data(&self) -> bool {
        self.status == EntryStatus::Ready && !self.table.is_empty()
    }

    pub fn format_hints(&self) -> &BTreeMap<String, FormatHint> {
        &self.table.hints
    }
}
