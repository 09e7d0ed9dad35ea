// The weekly scorecard: every table of the document, in document order.
//
// Each table is a `ReportDefinition`: a query template plus the steps that
// shape its result. Several tables share one template (the store and item
// views); the caller's cache makes that a single fetch.

use crate::assembler::{ReportDefinition, Step};
use crate::calendar::{ReportDates, DATE_FORMAT};
use crate::config::ReportConfig;
use crate::derive::{add_contribution_columns, add_growth_columns, add_ratio_columns, GrowthSpec, RatioSpec};
use crate::error::{ReportError, Result};
use crate::grouping::{
    aggregate_by, aggregate_with, bottom_n, coerce_metric_table, count_distinct_within, exclude_non_positive,
    filter_by_flag, order_by_category, share_of_top_n, sort_by_key, sort_by_measure, top_n, TableSchema,
};
use crate::layout::{
    blank_cells, copy_column, group_into_sections, indent_repeated_metric, pivot_wide_to_sectioned,
    transpose_periods, LayoutSpec, SectionGrouping, CURRENT_COLUMN, PREVIOUS_COLUMN,
};
use crate::present::{tabulate, Column};
use crate::totals::{append_average_row, append_subset_total, append_total_row, append_total_row_with, CompositeFormula};
use crate::types::{Cell, FormatHint, MetricTable, ReportTable, RowRole, ValueType};
use crate::util::parse_date_safe;
use once_cell::sync::Lazy;

/// The full scorecard for one run.
pub fn catalog(config: &ReportConfig, dates: &ReportDates) -> Vec<ReportDefinition> {
    let mut defs = vec![
        ReportDefinition::new("Total Business", "total_business"),
        ReportDefinition::new("Corporate Stores Only", "corporate_stores"),
        ReportDefinition::new("Week to Date by Region", "region_wtd"),
        ReportDefinition::new("Month to Date by Region", "region_mtd"),
        ReportDefinition::new("Year to Date by Region", "region_ytd"),
    ];
    defs.push(center_view("Group by Brand", CenterView::Group("BRAND")));
    defs.push(center_view("Group by Region", CenterView::Group("REGION")));
    defs.push(center_view(
        "Group by Category",
        CenterView::Category(config.category_order.clone()),
    ));
    defs.push(center_view(
        &format!("Top {} Stores - Current Sales", config.top_stores),
        CenterView::Top(config.top_stores),
    ));
    defs.push(center_view("ICU Stores - Current Sales", CenterView::Icu(config.bottom_stores)));
    defs.push(center_view("New Stores", CenterView::Flagged("IS_NEW")));
    defs.push(center_view("Closed Stores", CenterView::Flagged("IS_CLOSED")));

    for (line, template) in [("Service", "service_items"), ("Retail", "retail_items")] {
        defs.push(item_view(
            &format!("Top {} {} Items", config.top_items, line),
            template,
            ItemPick::Top(config.top_items),
        ));
        defs.push(item_view(
            &format!("Bottom {} {} Items", config.bottom_items, line),
            template,
            ItemPick::Bottom(config.bottom_items),
        ));
        defs.push(total_lines(&format!("Total Lines {}", line), template, config.top_items));
    }

    defs.extend([
        ReportDefinition::new("Transaction Count Total", "transaction_count_total"),
        ReportDefinition::new("Transaction Count by Region", "transaction_count_region"),
        ReportDefinition::new("Basket Size Total", "basket_size_total"),
        ReportDefinition::new("Basket Size by Region", "basket_size_region"),
    ]);
    defs.push(daily_sales(dates.fiscal_week_number()));
    defs.push(loyalty_kpi(config.first_section_header));
    defs.push(clicks_loyalty(config.first_section_header));
    defs
}

// ---------------------------------------------------------------------------
// Store views
// ---------------------------------------------------------------------------

const CURRENT_TOTAL_REVENUE: &str = "CURRENT_TOTAL_REVENUE";

const STORE_MEASURES: &[&str] = &[
    "CURRENT_SERVICE_REVENUE",
    "CURRENT_RETAIL_REVENUE",
    "CURRENT_TOTAL_REVENUE",
    "PREVIOUS_SERVICE_REVENUE",
    "PREVIOUS_RETAIL_REVENUE",
    "PREVIOUS_TOTAL_REVENUE",
    "SERVICE_BUDGET",
    "RETAIL_BUDGET",
    "TOTAL_BUDGET",
    "CURRENT_STORE_COUNT",
    "PREVIOUS_STORE_COUNT",
];

const STORE_SCHEMA: TableSchema<'static> = TableSchema {
    key: "CENTER",
    attributes: &["BRAND", "REGION", "CATEGORY"],
    measures: STORE_MEASURES,
    flags: &["IS_NEW", "IS_CLOSED"],
    primary: CURRENT_TOTAL_REVENUE,
    footer_keys: &[],
};

const REVENUE_COMPOSITES: &[CompositeFormula<'static>] = &[
    CompositeFormula {
        measure: "CURRENT_TOTAL_REVENUE",
        components: &["CURRENT_SERVICE_REVENUE", "CURRENT_RETAIL_REVENUE"],
    },
    CompositeFormula {
        measure: "PREVIOUS_TOTAL_REVENUE",
        components: &["PREVIOUS_SERVICE_REVENUE", "PREVIOUS_RETAIL_REVENUE"],
    },
    CompositeFormula {
        measure: "TOTAL_BUDGET",
        components: &["SERVICE_BUDGET", "RETAIL_BUDGET"],
    },
];

const STORE_COUNTS: [&str; 2] = ["CURRENT_STORE_COUNT", "PREVIOUS_STORE_COUNT"];

/// Measure columns of every store view, current, previous, budget, growth.
static STORE_COLUMNS: Lazy<Vec<Column<'static>>> = Lazy::new(|| {
    vec![
        Column::Measure("CURRENT_SERVICE_REVENUE", "SERVICE REVENUE CURRENT"),
        Column::Measure("CURRENT_RETAIL_REVENUE", "RETAIL REVENUE CURRENT"),
        Column::Measure("CURRENT_TOTAL_REVENUE", "TOTAL REVENUE CURRENT"),
        Column::Measure("% CURRENT REV CONTR", "% CURRENT REV CONTR"),
        Column::Measure("CURRENT_STORE_COUNT", "STORE COUNT CURRENT"),
        Column::Measure("PREVIOUS_SERVICE_REVENUE", "SERVICE REVENUE PREVIOUS"),
        Column::Measure("PREVIOUS_RETAIL_REVENUE", "RETAIL REVENUE PREVIOUS"),
        Column::Measure("PREVIOUS_TOTAL_REVENUE", "TOTAL REVENUE PREVIOUS"),
        Column::Measure("% PREVIOUS REV CONTR", "% PREVIOUS REV CONTR"),
        Column::Measure("PREVIOUS_STORE_COUNT", "STORE COUNT PREVIOUS"),
        Column::Measure("SERVICE_BUDGET", "SERVICE BUDGET"),
        Column::Measure("RETAIL_BUDGET", "RETAIL BUDGET"),
        Column::Measure("TOTAL_BUDGET", "TOTAL BUDGET"),
        Column::Measure("% TOTAL BUDGET", "% TOTAL BUDGET"),
        Column::Measure("SERVICES CURRENT TO PREVIOUS %", "SERVICES CURRENT TO PREVIOUS %"),
        Column::Measure("RETAIL CURRENT TO PREVIOUS %", "RETAIL CURRENT TO PREVIOUS %"),
        Column::Measure("TOTAL CURRENT TO PREVIOUS %", "TOTAL CURRENT TO PREVIOUS %"),
        Column::Measure("SERVICES REVENUE TO BUDGET %", "SERVICES REVENUE TO BUDGET %"),
        Column::Measure("RETAIL REVENUE TO BUDGET %", "RETAIL REVENUE TO BUDGET %"),
        Column::Measure("TOTAL REVENUE TO BUDGET %", "TOTAL REVENUE TO BUDGET %"),
    ]
});

#[derive(Debug, Clone)]
enum CenterView {
    /// Summed per attribute value.
    Group(&'static str),
    /// Summed per category, in the fixed category order.
    Category(Vec<String>),
    Top(usize),
    Icu(usize),
    Flagged(&'static str),
}

impl CenterView {
    fn key(&self) -> &'static str {
        match self {
            CenterView::Group(dim) => *dim,
            CenterView::Category(_) => "CATEGORY",
            _ => "CENTER",
        }
    }

    /// Store counts only make sense for grouped views.
    fn shows_store_counts(&self) -> bool {
        matches!(self, CenterView::Group(_) | CenterView::Category(_))
    }

    fn select(&self, stores: &MetricTable) -> Result<MetricTable> {
        match self {
            CenterView::Group(dim) => aggregate_by(stores, dim),
            CenterView::Category(order) => order_by_category(&aggregate_by(stores, "CATEGORY")?, "CATEGORY", order),
            CenterView::Top(n) => Ok(top_n(stores, *n)),
            CenterView::Icu(n) => Ok(bottom_n(stores, *n)),
            CenterView::Flagged(flag) => filter_by_flag(stores, flag),
        }
    }
}

fn center_view(title: &str, view: CenterView) -> ReportDefinition {
    let plan: Vec<Column<'static>> = std::iter::once(Column::Key(view.key()))
        .chain(STORE_COLUMNS.iter().copied().filter(|c| {
            view.shows_store_counts() || !matches!(c, Column::Measure(m, _) if STORE_COUNTS.contains(m))
        }))
        .collect();
    ReportDefinition::new(title, "store_pivots")
        .step(Step::raw("coerce", |raw| coerce_metric_table(raw, &STORE_SCHEMA)))
        .step(Step::metric("rank", |t| sort_by_measure(t, CURRENT_TOTAL_REVENUE)))
        .step(Step::metric("select", move |t| view.select(t)))
        .step(Step::metric("derive", store_derivations))
        .step(Step::metric("total", |t| append_total_row(t, REVENUE_COMPOSITES)))
        .step(Step::metric("present", move |t| tabulate(t, &plan)))
}

fn store_derivations(table: &MetricTable) -> Result<MetricTable> {
    let table = add_contribution_columns(
        table,
        &[
            ("CURRENT_TOTAL_REVENUE", "% CURRENT REV CONTR"),
            ("PREVIOUS_TOTAL_REVENUE", "% PREVIOUS REV CONTR"),
            ("TOTAL_BUDGET", "% TOTAL BUDGET"),
        ],
    )?;
    add_growth_columns(
        &table,
        &[
            GrowthSpec::vs_previous(
                "SERVICES CURRENT TO PREVIOUS %",
                "CURRENT_SERVICE_REVENUE",
                "PREVIOUS_SERVICE_REVENUE",
            ),
            GrowthSpec::vs_previous("RETAIL CURRENT TO PREVIOUS %", "CURRENT_RETAIL_REVENUE", "PREVIOUS_RETAIL_REVENUE"),
            GrowthSpec::vs_previous("TOTAL CURRENT TO PREVIOUS %", "CURRENT_TOTAL_REVENUE", "PREVIOUS_TOTAL_REVENUE"),
            GrowthSpec::vs_budget("SERVICES REVENUE TO BUDGET %", "CURRENT_SERVICE_REVENUE", "SERVICE_BUDGET"),
            GrowthSpec::vs_budget("RETAIL REVENUE TO BUDGET %", "CURRENT_RETAIL_REVENUE", "RETAIL_BUDGET"),
            GrowthSpec::vs_budget("TOTAL REVENUE TO BUDGET %", "CURRENT_TOTAL_REVENUE", "TOTAL_BUDGET"),
        ],
    )
}

// ---------------------------------------------------------------------------
// Item views
// ---------------------------------------------------------------------------

const ITEM_MEASURES: &[&str] = &[
    "CURRENT_TOTAL_REVENUE",
    "PREVIOUS_TOTAL_REVENUE",
    "CURRENT_TOTAL_UNITS",
    "PREVIOUS_TOTAL_UNITS",
];

const ITEM_SCHEMA: TableSchema<'static> = TableSchema {
    key: "CATEGORY",
    attributes: &["CURRENT_CENTER", "PREVIOUS_CENTER"],
    measures: ITEM_MEASURES,
    flags: &[],
    primary: CURRENT_TOTAL_REVENUE,
    footer_keys: &[],
};

const STORE_COUNT_CURRENT: &str = "STORE COUNT CURRENT";
const STORE_COUNT_PREVIOUS: &str = "STORE COUNT PREVIOUS";
const AVG_PER_STORE: &str = "AVG REVENUE PER STORE";
const AVG_PER_STORE_PREVIOUS: &str = "AVG REVENUE PER STORE PREVIOUS";

static ITEM_COLUMNS: Lazy<Vec<Column<'static>>> = Lazy::new(|| {
    vec![
        Column::Key("CATEGORY"),
        Column::Measure("CURRENT_TOTAL_REVENUE", "TOTAL REVENUE CURRENT"),
        Column::Measure("PREVIOUS_TOTAL_REVENUE", "TOTAL REVENUE PREVIOUS"),
        Column::Measure("CURRENT_TOTAL_UNITS", "TOTAL UNITS CURRENT"),
        Column::Measure("PREVIOUS_TOTAL_UNITS", "TOTAL UNITS PREVIOUS"),
        Column::Measure(STORE_COUNT_CURRENT, STORE_COUNT_CURRENT),
        Column::Measure(STORE_COUNT_PREVIOUS, STORE_COUNT_PREVIOUS),
        Column::Measure("% CURRENT REV CONTR", "% CURRENT REV CONTR"),
        Column::Measure("% PREVIOUS REV CONTR", "% PREVIOUS REV CONTR"),
        Column::Measure("% CURRENT UNITS CONTR", "% CURRENT UNITS CONTR"),
        Column::Measure("% PREVIOUS UNITS CONTR", "% PREVIOUS UNITS CONTR"),
        Column::Measure("RAND CURRENT TO PREVIOUS %", "RAND CURRENT TO PREVIOUS %"),
        Column::Measure("UNITS CURRENT TO PREVIOUS %", "UNITS CURRENT TO PREVIOUS %"),
        Column::Measure("AVERAGE REVENUE GROWTH PER STORE %", "AVERAGE REVENUE GROWTH PER STORE %"),
    ]
});

#[derive(Debug, Clone, Copy)]
enum ItemPick {
    Top(usize),
    Bottom(usize),
}

fn item_view(title: &str, template: &str, pick: ItemPick) -> ReportDefinition {
    ReportDefinition::new(title, template)
        .step(Step::raw("coerce", |raw| coerce_metric_table(raw, &ITEM_SCHEMA)))
        .step(Step::metric("items", move |t| item_table(t, pick)))
        .step(Step::metric("present", |t| tabulate(t, &ITEM_COLUMNS)))
}

/// Category view of item sales with store counts. The total row counts
/// distinct stores across the picked categories instead of summing counts.
fn item_table(items: &MetricTable, pick: ItemPick) -> Result<MetricTable> {
    let grouped = aggregate_with(
        items,
        "CATEGORY",
        &[
            (STORE_COUNT_CURRENT, "CURRENT_CENTER"),
            (STORE_COUNT_PREVIOUS, "PREVIOUS_CENTER"),
        ],
    )?;
    let selling = exclude_non_positive(&grouped, "CURRENT_TOTAL_UNITS")?;
    let picked = match pick {
        ItemPick::Top(n) => top_n(&selling, n),
        ItemPick::Bottom(n) => bottom_n(&selling, n),
    };

    let table = add_contribution_columns(
        &picked,
        &[
            ("CURRENT_TOTAL_REVENUE", "% CURRENT REV CONTR"),
            ("PREVIOUS_TOTAL_REVENUE", "% PREVIOUS REV CONTR"),
            ("CURRENT_TOTAL_UNITS", "% CURRENT UNITS CONTR"),
            ("PREVIOUS_TOTAL_UNITS", "% PREVIOUS UNITS CONTR"),
        ],
    )?;
    let table = add_ratio_columns(
        &table,
        &[
            RatioSpec::per(AVG_PER_STORE, "CURRENT_TOTAL_REVENUE", STORE_COUNT_CURRENT),
            RatioSpec::per(AVG_PER_STORE_PREVIOUS, "PREVIOUS_TOTAL_REVENUE", STORE_COUNT_PREVIOUS),
        ],
    )?;
    let table = add_growth_columns(
        &table,
        &[
            GrowthSpec::vs_previous("RAND CURRENT TO PREVIOUS %", "CURRENT_TOTAL_REVENUE", "PREVIOUS_TOTAL_REVENUE"),
            GrowthSpec::vs_previous("UNITS CURRENT TO PREVIOUS %", "CURRENT_TOTAL_UNITS", "PREVIOUS_TOTAL_UNITS"),
            GrowthSpec::vs_previous("AVERAGE REVENUE GROWTH PER STORE %", AVG_PER_STORE, AVG_PER_STORE_PREVIOUS),
        ],
    )?;

    let categories = table.keys();
    let current_stores = count_distinct_within(items, "CATEGORY", &categories, "CURRENT_CENTER")?;
    let previous_stores = count_distinct_within(items, "CATEGORY", &categories, "PREVIOUS_CENTER")?;
    let totalled = append_total_row_with(
        &table,
        &[],
        &[
            (STORE_COUNT_CURRENT, current_stores as f64),
            (STORE_COUNT_PREVIOUS, previous_stores as f64),
        ],
    )?;
    Ok(totalled.drop_measures(&[AVG_PER_STORE, AVG_PER_STORE_PREVIOUS]))
}

fn total_lines(title: &str, template: &str, n: usize) -> ReportDefinition {
    ReportDefinition::new(title, template)
        .step(Step::raw("coerce", |raw| coerce_metric_table(raw, &ITEM_SCHEMA)))
        .step(Step::metric("total lines", move |t| total_lines_table(t, n)))
}

/// One line: grand totals per measure and the share the top `n` categories
/// hold of each.
fn total_lines_table(items: &MetricTable, n: usize) -> Result<ReportTable> {
    let grouped = aggregate_by(items, "CATEGORY")?;
    let labels = [
        ("CURRENT_TOTAL_REVENUE", "TOTAL REVENUE CURRENT", "CURRENT REVENUE"),
        ("PREVIOUS_TOTAL_REVENUE", "TOTAL REVENUE PREVIOUS", "PREVIOUS REVENUE"),
        ("CURRENT_TOTAL_UNITS", "TOTAL UNITS CURRENT", "CURRENT UNITS"),
        ("PREVIOUS_TOTAL_UNITS", "TOTAL UNITS PREVIOUS", "PREVIOUS UNITS"),
    ];

    let mut columns = Vec::with_capacity(labels.len() * 2);
    let mut cells = Vec::with_capacity(labels.len() * 2);
    for (measure, title, _) in &labels {
        columns.push(title.to_string());
        cells.push(Cell::Number(grouped.column(measure)?.iter().sum::<f64>()));
    }
    for (measure, _, share) in &labels {
        columns.push(format!("TOP {} {} OVER TOTAL %", n, share));
        cells.push(Cell::Number(share_of_top_n(&grouped, measure, n)?));
    }

    let mut out = ReportTable::new(columns);
    for (i, column) in out.columns.iter().enumerate() {
        let hint = if i < labels.len() {
            FormatHint::Number
        } else {
            FormatHint::Percentage
        };
        out.hints.insert(column.clone(), hint);
    }
    out.push(RowRole::Total, cells, None);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Daily sales
// ---------------------------------------------------------------------------

const DATES_CY: &str = "DATES_CY";
const DAY_NAME: &str = "DAY_NAME";
const SALES_COLUMNS: [&str; 3] = ["SALES_TY", "SALES_LY", "SALES_BUDGET"];
const WEEKEND: [&str; 3] = ["Friday", "Saturday", "Sunday"];
const WEEKEND_LABEL: &str = "Weekend trading (Fri/Sat/Sun)";
const AVERAGE_LABEL: &str = "AVG Sales";

fn daily_sales(week: i64) -> ReportDefinition {
    ReportDefinition::new(format!("Daily Sales Last Week (Week {})", week), "daily_sales")
        .step(Step::raw("coerce", |raw| {
            coerce_metric_table(raw, &TableSchema::new(DATES_CY, &SALES_COLUMNS, "SALES_TY"))
        }))
        .step(Step::metric("calendar days", calendar_days))
        .step(Step::metric("growth", |t| {
            add_growth_columns(
                t,
                &[
                    GrowthSpec::vs_previous("GROWTH_PCT", "SALES_TY", "SALES_LY"),
                    GrowthSpec::vs_budget("BUDGET_PCT", "SALES_TY", "SALES_BUDGET"),
                ],
            )
        }))
        .step(Step::metric("summary rows", |t| {
            let t = append_total_row(t, &[])?;
            let t = append_subset_total(&t, WEEKEND_LABEL, |r| {
                r.attribute(DAY_NAME).map_or(false, |d| WEEKEND.contains(&d))
            })?;
            append_average_row(&t, AVERAGE_LABEL)
        }))
        .step(Step::metric("present", |t| {
            let table = tabulate(
                t,
                &[
                    Column::Attribute(DAY_NAME, "SALES"),
                    Column::Key(DATES_CY),
                    Column::Measure("SALES_TY", "SALES_TY"),
                    Column::Measure("SALES_LY", "SALES_LY"),
                    Column::Measure("SALES_BUDGET", "SALES_BUDGET"),
                    Column::Measure("GROWTH_PCT", "GROWTH_PCT"),
                    Column::Measure("BUDGET_PCT", "BUDGET_PCT"),
                ],
            )?;
            Ok(daily_display(table))
        }))
}

/// Normalise the date key, recompute the weekday from it and order the days
/// chronologically.
fn calendar_days(table: &MetricTable) -> Result<MetricTable> {
    let mut out = table.clone();
    if !out.attribute_columns.iter().any(|a| a == DAY_NAME) {
        out.attribute_columns.push(DAY_NAME.to_string());
    }
    for row in out.rows.iter_mut() {
        let date = parse_date_safe(Some(row.key.as_str())).ok_or_else(|| ReportError::InvalidDate(row.key.clone()))?;
        row.key = date.format(DATE_FORMAT).to_string();
        row.attributes
            .insert(DAY_NAME.to_string(), date.format("%A").to_string());
    }
    Ok(sort_by_key(&out))
}

/// Summary rows carry their label in the day column and no date. Day rows
/// show sales with cents, summary rows without.
fn daily_display(mut table: ReportTable) -> ReportTable {
    for column in SALES_COLUMNS {
        table.hints.remove(column);
    }
    for row in table.rows.iter_mut() {
        if row.role == RowRole::Total {
            row.cells.swap(0, 1);
            row.cells[1] = Cell::Null;
            row.hint = Some(FormatHint::Number);
        } else {
            row.hint = Some(FormatHint::TwoDecimal);
        }
    }
    table
}

// ---------------------------------------------------------------------------
// Loyalty KPI by tier
// ---------------------------------------------------------------------------

const TIER_NAME: &str = "TIER_NAME";

const LOYALTY_MEASURES: &[&str] = &[
    "CURRENT_SALES",
    "PREVIOUS_SALES",
    "CURRENT_TRANSACTIONS",
    "PREVIOUS_TRANSACTIONS",
    "CURRENT_UNIQUE_GUEST_COUNT",
    "PREVIOUS_UNIQUE_GUEST_COUNT",
    "CURRENT_BASKET_SIZE",
    "PREVIOUS_BASKET_SIZE",
    "FREQUENCY_SPEND_ROLLING_12",
    "FREQUENCY_SPEND_ROLLING_12_SERVICE",
    "FREQUENCY_SPEND_ROLLING_12_RETAIL",
    "CURRENT_REDEMPTION_VALUE",
    "PREVIOUS_REDEMPTION_VALUE",
    "CURRENT_BIRTHDAY_DISCOUNT",
    "PREVIOUS_BIRTHDAY_DISCOUNT",
];

const LOYALTY_SCHEMA: TableSchema<'static> = TableSchema {
    key: TIER_NAME,
    attributes: &[],
    measures: LOYALTY_MEASURES,
    flags: &[],
    primary: "CURRENT_SALES",
    footer_keys: &["Total Loyalty", "Total"],
};

const FREQUENCY_MEASURES: [&str; 3] = [
    "FREQUENCY_SPEND_ROLLING_12",
    "FREQUENCY_SPEND_ROLLING_12_SERVICE",
    "FREQUENCY_SPEND_ROLLING_12_RETAIL",
];

const RAND_MEASURES: [&str; 3] = ["CURRENT_SALES", "CURRENT_REDEMPTION_VALUE", "CURRENT_BIRTHDAY_DISCOUNT"];

const TIER_COLUMNS: &[&str] = &["Green", "Blue", "Silver", "Gold", "Total Loyalty", "Non-loyalty", "Total"];

const LOYALTY_CELLS: &[(&str, &str, ValueType)] = &[
    ("CURRENT_SALES", "Sales", ValueType::Current),
    ("SALES_GROWTH", "Sales", ValueType::Growth),
    ("CURRENT_SALES_CONTRIBUTION", "Sales", ValueType::Contribution),
    ("CURRENT_TRANSACTIONS", "Transactions", ValueType::Current),
    ("TRANSACTION_GROWTH", "Transactions", ValueType::Growth),
    ("CURRENT_TRANSACTIONS_CONTRIBUTION", "Transactions", ValueType::Contribution),
    ("CURRENT_UNIQUE_GUEST_COUNT", "Guest Count", ValueType::Current),
    ("GUEST_COUNT_GROWTH", "Guest Count", ValueType::Growth),
    ("CURRENT_UNIQUE_GUEST_COUNT_CONTRIBUTION", "Guest Count", ValueType::Contribution),
    ("CURRENT_BASKET_SIZE", "Basket Size", ValueType::Current),
    ("BASKET_SIZE_GROWTH", "Basket Size", ValueType::Growth),
    ("FREQUENCY_SPEND_ROLLING_12", "Frequency Spend (Rolling 12 months)", ValueType::Current),
    ("FREQUENCY_SPEND_ROLLING_12_RETAIL", "Retail Freq. of Spend (Roll 12 months)", ValueType::Current),
    ("FREQUENCY_SPEND_ROLLING_12_SERVICE", "Service Freq. of Spend (Roll 12 months)", ValueType::Current),
    ("CURRENT_REDEMPTION_VALUE", "Redemption Value", ValueType::Current),
    ("REDEMPTION_VALUE_GROWTH", "Redemption Value", ValueType::Growth),
    ("CURRENT_REDEMPTION_VALUE_CONTRIBUTION", "Redemption Value", ValueType::Contribution),
    ("LOYALTY_COST_PERCENT_CURRENT", "Loyalty Cost % of Sales", ValueType::Current),
    ("LOYALTY_COST_PERCENT_PREVIOUS", "Loyalty Cost % of Sales", ValueType::Previous),
    ("LOYALTY_COST_PERCENT_GROWTH_RATE", "Loyalty Cost % of Sales", ValueType::Growth),
    ("CURRENT_BIRTHDAY_DISCOUNT", "Birthday discount amount", ValueType::Current),
    ("BIRTHDAY_DISCOUNT_GROWTH", "Birthday discount amount", ValueType::Growth),
    ("CURRENT_BIRTHDAY_DISCOUNT_CONTRIBUTION", "Birthday discount amount", ValueType::Contribution),
    ("BIRTHDAY_DISCOUNT_PERCENT_CURRENT", "Birthday discount cost % of sales", ValueType::Current),
    ("BIRTHDAY_DISCOUNT_PERCENT_PREVIOUS", "Birthday discount cost % of sales", ValueType::Previous),
    ("BIRTHDAY_DISCOUNT_PERCENT_GROWTH_RATE", "Birthday discount cost % of sales", ValueType::Growth),
];

const LOYALTY_METRIC_ORDER: &[&str] = &[
    "Sales",
    "Transactions",
    "Guest Count",
    "Basket Size",
    "Frequency Spend (Rolling 12 months)",
    "Retail Freq. of Spend (Roll 12 months)",
    "Service Freq. of Spend (Roll 12 months)",
    "Redemption Value",
    "Loyalty Cost % of Sales",
    "Birthday discount amount",
    "Birthday discount cost % of sales",
];

const LOYALTY_TYPE_ORDER: &[ValueType] = &[
    ValueType::Current,
    ValueType::Previous,
    ValueType::Growth,
    ValueType::Contribution,
];

const LOYALTY_SECTIONS: &[(&str, &str)] = &[
    ("Sales", "Sales"),
    ("Transactions", "Sales"),
    ("Guest Count", "Sales"),
    ("Basket Size", "Sales"),
    ("Frequency Spend (Rolling 12 months)", "Frequency of spend"),
    ("Retail Freq. of Spend (Roll 12 months)", "Frequency of spend"),
    ("Service Freq. of Spend (Roll 12 months)", "Frequency of spend"),
    ("Redemption Value", "Loyalty cost"),
    ("Loyalty Cost % of Sales", "Loyalty cost"),
    ("Birthday discount amount", "Loyalty cost"),
    ("Birthday discount cost % of sales", "Loyalty cost"),
];

/// Programme costs only exist for loyalty members, so the Non-loyalty tier is
/// blank and the grand total equals the loyalty total.
const MEMBER_ONLY_METRICS: &[&str] = &[
    "Redemption Value",
    "Loyalty Cost % of Sales",
    "Birthday discount amount",
    "Birthday discount cost % of sales",
];

fn loyalty_kpi(first_section_header: bool) -> ReportDefinition {
    ReportDefinition::new("Loyalty KPI", "loyalty_kpi")
        .step(Step::raw("coerce", |raw| {
            let mut table = coerce_metric_table(raw, &LOYALTY_SCHEMA)?;
            for measure in FREQUENCY_MEASURES {
                table.hints.insert(measure.to_string(), FormatHint::TwoDecimal);
            }
            for measure in RAND_MEASURES {
                table.hints.insert(measure.to_string(), FormatHint::Currency);
            }
            Ok(table)
        }))
        .step(Step::metric("derive", loyalty_derivations))
        .step(Step::metric("layout", move |t| {
            pivot_wide_to_sectioned(
                t,
                &LayoutSpec {
                    cells: LOYALTY_CELLS,
                    metric_order: LOYALTY_METRIC_ORDER,
                    type_order: LOYALTY_TYPE_ORDER,
                    sections: LOYALTY_SECTIONS,
                    column_order: Some(TIER_COLUMNS),
                    first_section_header,
                },
            )
        }))
        .step(Step::sectioned("member-only metrics", |report| {
            let report = blank_cells(report, MEMBER_ONLY_METRICS, "Non-loyalty")?;
            copy_column(&report, MEMBER_ONLY_METRICS, "Total Loyalty", "Total")
        }))
        .step(Step::sectioned("indent", |report| Ok(indent_repeated_metric(report, "Metric"))))
}

fn loyalty_derivations(table: &MetricTable) -> Result<MetricTable> {
    let table = add_ratio_columns(
        table,
        &[
            RatioSpec::share("LOYALTY_COST_PERCENT_CURRENT", "CURRENT_REDEMPTION_VALUE", "CURRENT_SALES"),
            RatioSpec::share("LOYALTY_COST_PERCENT_PREVIOUS", "PREVIOUS_REDEMPTION_VALUE", "PREVIOUS_SALES"),
            RatioSpec::share("BIRTHDAY_DISCOUNT_PERCENT_CURRENT", "CURRENT_BIRTHDAY_DISCOUNT", "CURRENT_SALES"),
            RatioSpec::share("BIRTHDAY_DISCOUNT_PERCENT_PREVIOUS", "PREVIOUS_BIRTHDAY_DISCOUNT", "PREVIOUS_SALES"),
        ],
    )?;
    let table = add_growth_columns(
        &table,
        &[
            GrowthSpec::vs_previous("SALES_GROWTH", "CURRENT_SALES", "PREVIOUS_SALES"),
            GrowthSpec::vs_previous("TRANSACTION_GROWTH", "CURRENT_TRANSACTIONS", "PREVIOUS_TRANSACTIONS"),
            GrowthSpec::vs_previous(
                "GUEST_COUNT_GROWTH",
                "CURRENT_UNIQUE_GUEST_COUNT",
                "PREVIOUS_UNIQUE_GUEST_COUNT",
            ),
            GrowthSpec::vs_previous("BASKET_SIZE_GROWTH", "CURRENT_BASKET_SIZE", "PREVIOUS_BASKET_SIZE"),
            GrowthSpec::vs_previous(
                "REDEMPTION_VALUE_GROWTH",
                "CURRENT_REDEMPTION_VALUE",
                "PREVIOUS_REDEMPTION_VALUE",
            ),
            GrowthSpec::vs_previous(
                "LOYALTY_COST_PERCENT_GROWTH_RATE",
                "LOYALTY_COST_PERCENT_CURRENT",
                "LOYALTY_COST_PERCENT_PREVIOUS",
            ),
            GrowthSpec::vs_previous(
                "BIRTHDAY_DISCOUNT_GROWTH",
                "CURRENT_BIRTHDAY_DISCOUNT",
                "PREVIOUS_BIRTHDAY_DISCOUNT",
            ),
            GrowthSpec::vs_previous(
                "BIRTHDAY_DISCOUNT_PERCENT_GROWTH_RATE",
                "BIRTHDAY_DISCOUNT_PERCENT_CURRENT",
                "BIRTHDAY_DISCOUNT_PERCENT_PREVIOUS",
            ),
        ],
    )?;
    add_contribution_columns(
        &table,
        &[
            ("CURRENT_SALES", "CURRENT_SALES_CONTRIBUTION"),
            ("CURRENT_TRANSACTIONS", "CURRENT_TRANSACTIONS_CONTRIBUTION"),
            ("CURRENT_UNIQUE_GUEST_COUNT", "CURRENT_UNIQUE_GUEST_COUNT_CONTRIBUTION"),
            ("CURRENT_REDEMPTION_VALUE", "CURRENT_REDEMPTION_VALUE_CONTRIBUTION"),
            ("CURRENT_BIRTHDAY_DISCOUNT", "CURRENT_BIRTHDAY_DISCOUNT_CONTRIBUTION"),
        ],
    )
}

// ---------------------------------------------------------------------------
// Clicks loyalty measures
// ---------------------------------------------------------------------------

const GROWTH_COLUMN: &str = "Growth";

const CLICKS_SECTIONS: &[(&str, &str)] = &[
    ("CLICKS_LOYALTY_SALES", "Sales"),
    ("NON_CLICKS_SALES", "Sales"),
    ("SALES", "Sales"),
    ("CLICKS_LOYALTY_SALES_OVER_TOTAL", "Sales"),
    ("CLICKS_LOYALTY_TRANSACTION_COUNT", "Transactions"),
    ("NON_CLICKS_TRANSACTION_COUNT", "Transactions"),
    ("TOTAL_TRANSACTION_COUNT", "Transactions"),
    ("CLICKS_LOYALTY_TRANSACTIONS_OVER_TOTAL", "Transactions"),
    ("CLICKS_LOYALTY_BASKET_SIZE", "Basket size"),
    ("NON_CLICKS_BASKET_SIZE", "Basket size"),
    ("BASKET_SIZE_TOTAL", "Basket size"),
    ("CLICK_LOYALTY_BASKET_SIZE_OVER_TOTAL", "Basket size"),
    ("CLICKS_LOYALTY_NEW_GUEST_COUNT", "Guests"),
    ("NEW_GUEST_COUNT", "Guests"),
    ("NEW_CLICKS_LOYALTY_GUEST_OVER_NEW_GUESTS", "Guests"),
    ("UNIQUE_GUEST_COUNT", "Guests"),
    ("CLICKS_LOYALTY_NEW_GUESTS_OVER_TOTAL_UNIQUE_GUESTS", "Guests"),
    ("FREQUENCY_OF_SPEND_ROLLING_12_MONTHS", "Guests"),
    ("FREQUENCY_OF_SPEND_ROLLING_12_MONTHS_CLICKS_CLUBCARD", "Guests"),
    ("FREQUENCY_OF_SPEND_ROLLING_12_MONTHS_SERVICE", "Guests"),
    ("FREQUENCY_OF_SPEND_ROLLING_12_MONTHS_RETAIL", "Guests"),
    ("FREQUENCY_OF_SPEND_ROLLING_12_MONTHS_CLICKS_CLUBCARD_SERVICE", "Guests"),
    ("FREQUENCY_OF_SPEND_ROLLING_12_MONTHS_CLICKS_CLUBCARD_RETAIL", "Guests"),
];

const CLICKS_LABELS: &[(&str, &str)] = &[
    ("CLICKS_LOYALTY_SALES", "Clicks loyalty sales"),
    ("NON_CLICKS_SALES", "Non clicks sales"),
    ("SALES", "Total sales"),
    ("CLICKS_LOYALTY_SALES_OVER_TOTAL", "Clicks loyalty sales over total"),
    ("CLICKS_LOYALTY_TRANSACTION_COUNT", "Clicks loyalty transactions count"),
    ("NON_CLICKS_TRANSACTION_COUNT", "Non clicks transactions count"),
    ("TOTAL_TRANSACTION_COUNT", "Total transactions count"),
    ("CLICKS_LOYALTY_TRANSACTIONS_OVER_TOTAL", "Clicks loyalty transactions over total"),
    ("CLICKS_LOYALTY_BASKET_SIZE", "Clicks loyalty basket size"),
    ("NON_CLICKS_BASKET_SIZE", "Non Clicks basket size"),
    ("BASKET_SIZE_TOTAL", "Basket size total"),
    ("CLICK_LOYALTY_BASKET_SIZE_OVER_TOTAL", "Clicks loyalty basket size over total"),
    ("CLICKS_LOYALTY_NEW_GUEST_COUNT", "Clicks loyalty new guest count"),
    ("NEW_GUEST_COUNT", "New guest count"),
    ("NEW_CLICKS_LOYALTY_GUEST_OVER_NEW_GUESTS", "New clicks loyalty guest over new guests"),
    ("UNIQUE_GUEST_COUNT", "Unique guest count"),
    (
        "CLICKS_LOYALTY_NEW_GUESTS_OVER_TOTAL_UNIQUE_GUESTS",
        "Clicks loyalty new guests over total unique guests",
    ),
    (
        "FREQUENCY_OF_SPEND_ROLLING_12_MONTHS",
        "All Transactions Frequency of Spend (Rolling 12 months)",
    ),
    (
        "FREQUENCY_OF_SPEND_ROLLING_12_MONTHS_CLICKS_CLUBCARD",
        "Clicks Clubcard Frequency of Spend (Rolling 12 months)",
    ),
    (
        "FREQUENCY_OF_SPEND_ROLLING_12_MONTHS_SERVICE",
        "All Transactions Frequency of Spend (Rolling 12 months) - Service",
    ),
    (
        "FREQUENCY_OF_SPEND_ROLLING_12_MONTHS_RETAIL",
        "All Transactions Frequency of Spend (Rolling 12 months) - Retail",
    ),
    (
        "FREQUENCY_OF_SPEND_ROLLING_12_MONTHS_CLICKS_CLUBCARD_SERVICE",
        "Clicks Clubcard Frequency of Spend (Rolling 12 months) - Service",
    ),
    (
        "FREQUENCY_OF_SPEND_ROLLING_12_MONTHS_CLICKS_CLUBCARD_RETAIL",
        "Clicks Clubcard Frequency of Spend (Rolling 12 months) - Retail",
    ),
];

const CLICKS_ROW_HINTS: &[(&str, FormatHint)] = &[
    ("CLICKS_LOYALTY_SALES_OVER_TOTAL", FormatHint::Percentage),
    ("CLICKS_LOYALTY_TRANSACTIONS_OVER_TOTAL", FormatHint::Percentage),
    ("CLICK_LOYALTY_BASKET_SIZE_OVER_TOTAL", FormatHint::Percentage),
    ("NEW_CLICKS_LOYALTY_GUEST_OVER_NEW_GUESTS", FormatHint::Percentage),
    ("CLICKS_LOYALTY_NEW_GUESTS_OVER_TOTAL_UNIQUE_GUESTS", FormatHint::Percentage),
    ("FREQUENCY_OF_SPEND_ROLLING_12_MONTHS", FormatHint::TwoDecimal),
    ("FREQUENCY_OF_SPEND_ROLLING_12_MONTHS_CLICKS_CLUBCARD", FormatHint::TwoDecimal),
    ("FREQUENCY_OF_SPEND_ROLLING_12_MONTHS_SERVICE", FormatHint::TwoDecimal),
    ("FREQUENCY_OF_SPEND_ROLLING_12_MONTHS_RETAIL", FormatHint::TwoDecimal),
    ("FREQUENCY_OF_SPEND_ROLLING_12_MONTHS_CLICKS_CLUBCARD_SERVICE", FormatHint::TwoDecimal),
    ("FREQUENCY_OF_SPEND_ROLLING_12_MONTHS_CLICKS_CLUBCARD_RETAIL", FormatHint::TwoDecimal),
];

fn clicks_loyalty(first_section_header: bool) -> ReportDefinition {
    ReportDefinition::new("Clicks Loyalty Measures", "clicks_loyalty")
        .step(Step::raw("transpose", |raw| {
            transpose_periods(raw, "PERIOD", "CURRENT", "PREVIOUS")
        }))
        .step(Step::metric("growth", |t| {
            add_growth_columns(t, &[GrowthSpec::vs_previous(GROWTH_COLUMN, CURRENT_COLUMN, PREVIOUS_COLUMN)])
        }))
        .step(Step::metric("sections", move |t| {
            group_into_sections(
                t,
                &SectionGrouping {
                    sections: CLICKS_SECTIONS,
                    labels: CLICKS_LABELS,
                    row_hints: CLICKS_ROW_HINTS,
                    columns: &[
                        (CURRENT_COLUMN, "Current"),
                        (PREVIOUS_COLUMN, "Previous"),
                        (GROWTH_COLUMN, "Growth"),
                    ],
                    first_section_header,
                },
            )
        }))
        .step(Step::sectioned("indent", |report| Ok(indent_repeated_metric(report, "Metric"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{QueryParams, StaticFetcher};
    use crate::present::display_rows;
    use crate::assembler::build_report_table;
    use crate::types::{EntryStatus, RawTable, ReportEntry, TOTAL_KEY};
    use chrono::NaiveDate;

    fn n(v: f64) -> Cell {
        Cell::Number(v)
    }

    fn build(def: &ReportDefinition, template: &str, raw: RawTable) -> ReportEntry {
        let fetcher = StaticFetcher::new().with_table(template, raw);
        let entry = build_report_table(&fetcher, def, &QueryParams::new());
        assert_eq!(entry.status, EntryStatus::Ready, "{:?}", entry.status);
        entry
    }

    fn column(entry: &ReportEntry, name: &str) -> Vec<Cell> {
        let idx = entry.table.column_index(name).unwrap();
        entry.table.rows.iter().map(|r| r.cells[idx].clone()).collect()
    }

    fn stores() -> RawTable {
        let mut columns = vec!["CENTER", "BRAND", "REGION", "CATEGORY", "IS_NEW", "IS_CLOSED"];
        columns.extend_from_slice(STORE_MEASURES);
        let store = |center: &str, brand: &str, cat: &str, new: bool, service: f64, retail: f64| {
            let mut row: Vec<Cell> = vec![
                center.into(),
                brand.into(),
                "North".into(),
                cat.into(),
                Cell::Bool(new),
                Cell::Bool(false),
            ];
            // extract totals run one ahead of service + retail for trading stores
            let stale = if service + retail > 0.0 { 1.0 } else { 0.0 };
            row.extend([
                n(service),
                n(retail),
                n(service + retail + stale),
                n(service / 2.0),
                n(retail / 2.0),
                n((service + retail) / 2.0),
                n(service),
                n(retail),
                n(service + retail),
                n(1.0),
                n(1.0),
            ]);
            row
        };
        RawTable::from_rows(
            &columns,
            vec![
                store("S1", "Sorbet", "B", false, 100.0, 50.0),
                store("S2", "Sorbet", "A +", true, 300.0, 100.0),
                store("S3", "Candi", "C", false, 0.0, 0.0),
                store("S4", "Candi", "A", false, 40.0, 20.0),
            ],
        )
    }

    #[test]
    fn brand_view_sums_and_totals_from_components() {
        let entry = build(&center_view("Brand", CenterView::Group("BRAND")), "store_pivots", stores());
        assert_eq!(column(&entry, "BRAND"), vec![Cell::from("Sorbet"), "Candi".into(), TOTAL_KEY.into()]);
        // the Total row is rebuilt from service + retail, not from the stale totals
        assert_eq!(column(&entry, "TOTAL REVENUE CURRENT")[2], n(610.0));
        assert_eq!(column(&entry, "STORE COUNT CURRENT")[0], n(2.0));
        assert_eq!(column(&entry, "TOTAL CURRENT TO PREVIOUS %")[2], n(610.0 / 305.0 - 1.0));
    }

    #[test]
    fn category_view_follows_the_fixed_order() {
        let order = vec!["A +".to_string(), "A".into(), "B".into(), "C".into()];
        let entry = build(&center_view("Category", CenterView::Category(order)), "store_pivots", stores());
        let keys: Vec<String> = column(&entry, "CATEGORY").iter().map(Cell::label).collect();
        assert_eq!(keys, vec!["A +", "A", "B", "C", "Total"]);
    }

    #[test]
    fn icu_skips_inactive_stores_and_drops_counts() {
        let entry = build(&center_view("ICU", CenterView::Icu(2)), "store_pivots", stores());
        let keys: Vec<String> = column(&entry, "CENTER").iter().map(Cell::label).collect();
        assert_eq!(keys, vec!["S4", "S1", "Total"]);
        assert!(entry.table.column_index("STORE COUNT CURRENT").is_err());
    }

    #[test]
    fn new_stores_use_the_flag() {
        let entry = build(&center_view("New", CenterView::Flagged("IS_NEW")), "store_pivots", stores());
        let keys: Vec<String> = column(&entry, "CENTER").iter().map(Cell::label).collect();
        assert_eq!(keys, vec!["S2", "Total"]);
        assert_eq!(column(&entry, "% CURRENT REV CONTR")[0], n(100.0));
    }

    fn items() -> RawTable {
        let item = |cat: &str, store: &str, rev: f64, units: f64| -> Vec<Cell> {
            vec![
                cat.into(),
                store.into(),
                store.into(),
                n(rev),
                n(rev / 2.0),
                n(units),
                n(units),
            ]
        };
        RawTable::from_rows(
            &[
                "CATEGORY",
                "CURRENT_CENTER",
                "PREVIOUS_CENTER",
                "CURRENT_TOTAL_REVENUE",
                "PREVIOUS_TOTAL_REVENUE",
                "CURRENT_TOTAL_UNITS",
                "PREVIOUS_TOTAL_UNITS",
            ],
            vec![
                item("Nails", "S1", 100.0, 10.0),
                item("Nails", "S2", 100.0, 10.0),
                item("Brows", "S1", 50.0, 5.0),
                item("Facials", "S3", 30.0, 0.0),
            ],
        )
    }

    #[test]
    fn item_total_counts_distinct_stores() {
        let entry = build(&item_view("Top", "service_items", ItemPick::Top(20)), "service_items", items());
        let keys: Vec<String> = column(&entry, "CATEGORY").iter().map(Cell::label).collect();
        assert_eq!(keys, vec!["Nails", "Brows", "Total"]);
        assert_eq!(column(&entry, STORE_COUNT_CURRENT), vec![n(2.0), n(1.0), n(2.0)]);
        // avg per store: 250/2 now vs 125/2 before
        assert_eq!(column(&entry, "AVERAGE REVENUE GROWTH PER STORE %")[2], n(1.0));
        assert!(entry.table.column_index(AVG_PER_STORE).is_err());
    }

    #[test]
    fn total_lines_report_top_share() {
        let entry = build(&total_lines("Lines", "service_items", 1), "service_items", items());
        assert_eq!(entry.table.len(), 1);
        assert_eq!(column(&entry, "TOTAL REVENUE CURRENT"), vec![n(280.0)]);
        assert_eq!(column(&entry, "TOP 1 CURRENT REVENUE OVER TOTAL %"), vec![n(200.0 / 280.0)]);
        assert_eq!(display_rows(&entry.table)[0][4], "71.4%");
    }

    fn days() -> RawTable {
        let start = NaiveDate::from_ymd_opt(2025, 9, 22).unwrap();
        let mut rows: Vec<Vec<Cell>> = (0..7)
            .map(|i| {
                let date = start + chrono::Duration::days(i);
                vec![
                    date.format("%Y-%m-%d").to_string().into(),
                    "Someday".into(),
                    n(100.0),
                    n(80.0),
                    n(125.0),
                ]
            })
            .collect();
        rows.reverse();
        RawTable::from_rows(&[DATES_CY, DAY_NAME, "SALES_TY", "SALES_LY", "SALES_BUDGET"], rows)
    }

    #[test]
    fn daily_sales_orders_days_and_adds_summaries() {
        let entry = build(&daily_sales(4), "daily_sales", days());
        assert_eq!(entry.title, "Daily Sales Last Week (Week 4)");
        let labels: Vec<String> = column(&entry, "SALES").iter().map(Cell::label).collect();
        assert_eq!(labels[0], "Monday");
        assert_eq!(labels[6], "Sunday");
        assert_eq!(&labels[7..], &["Total", WEEKEND_LABEL, AVERAGE_LABEL]);
        let ty = column(&entry, "SALES_TY");
        assert_eq!(ty[7], n(700.0));
        assert_eq!(ty[8], n(300.0));
        assert_eq!(ty[9], n(100.0));
        assert_eq!(column(&entry, "GROWTH_PCT")[7], n(0.25));
        match column(&entry, "BUDGET_PCT")[7] {
            Cell::Number(v) => assert!((v + 0.2).abs() < 1e-9),
            ref other => panic!("unexpected {:?}", other),
        }
        let shown = display_rows(&entry.table);
        assert_eq!(shown[0][2], "100.00");
        assert_eq!(shown[7][1], "");
        assert_eq!(shown[7][2], "700");
    }

    #[test]
    fn bad_dates_fail_the_table() {
        let raw = RawTable::from_rows(
            &[DATES_CY, "SALES_TY", "SALES_LY", "SALES_BUDGET"],
            vec![vec!["someday".into(), n(1.0), n(1.0), n(1.0)]],
        );
        let fetcher = StaticFetcher::new().with_table("daily_sales", raw);
        let entry = build_report_table(&fetcher, &daily_sales(1), &QueryParams::new());
        assert!(matches!(entry.status, EntryStatus::Failed { .. }));
    }

    fn tiers() -> RawTable {
        let tier = |name: &str, scale: f64| {
            let mut row: Vec<Cell> = vec![name.into()];
            row.extend(LOYALTY_MEASURES.iter().map(|_| n(scale)));
            row
        };
        let mut columns = vec![TIER_NAME];
        columns.extend_from_slice(LOYALTY_MEASURES);
        RawTable::from_rows(
            &columns,
            vec![
                tier("Green", 10.0),
                tier("Blue", 20.0),
                tier("Silver", 30.0),
                tier("Gold", 40.0),
                tier("Total Loyalty", 100.0),
                tier("Non-loyalty", 100.0),
                tier("Total", 200.0),
            ],
        )
    }

    #[test]
    fn loyalty_kpi_lays_out_tiers_by_metric() {
        let entry = build(&loyalty_kpi(false), "loyalty_kpi", tiers());
        assert_eq!(
            entry.table.columns,
            vec!["Metric", "Green", "Blue", "Silver", "Gold", "Total Loyalty", "Non-loyalty", "Total"]
        );
        let first = &entry.table.rows[0];
        assert_eq!(first.cells[0], Cell::from("Sales"));
        assert_eq!(first.cells[7], n(200.0));
        // contribution row of Sales: Gold holds 40 of 200
        let contribution = &entry.table.rows[2];
        assert_eq!(contribution.cells[0], Cell::from("    Contribution to total"));
        assert_eq!(contribution.cells[4], n(20.0));
        // two section breaks, first section exempt
        let headers = entry.table.rows.iter().filter(|r| r.role == RowRole::SectionHeader).count();
        assert_eq!(headers, 2);
    }

    #[test]
    fn member_only_metrics_blank_non_loyalty() {
        let entry = build(&loyalty_kpi(true), "loyalty_kpi", tiers());
        let row = entry
            .table
            .rows
            .iter()
            .find(|r| r.cells[0] == Cell::from("Redemption Value"))
            .unwrap();
        assert_eq!(row.cells[6], Cell::Null);
        assert_eq!(row.cells[7], row.cells[5]);
        assert_eq!(entry.table.rows[0].role, RowRole::SectionHeader);
    }

    #[test]
    fn loyalty_amounts_render_in_rand() {
        let entry = build(&loyalty_kpi(false), "loyalty_kpi", tiers());
        let shown = display_rows(&entry.table);
        let line = |label: &str| shown.iter().find(|r| r[0] == label).unwrap().clone();
        assert_eq!(line("Sales")[7], "R 200.00");
        let redemption = line("Redemption Value");
        assert_eq!(redemption[4], "R 40.00");
        assert_eq!(redemption[6], "");
        assert_eq!(line("Birthday discount amount")[1], "R 10.00");
        // growth and counts keep their own formats
        assert_eq!(line("Transactions")[7], "200");
        assert_eq!(shown[1][1], "0.0%");
    }

    #[test]
    fn clicks_measures_transpose_and_group() {
        let raw = RawTable::from_rows(
            &["PERIOD", "CLICKS_LOYALTY_SALES", "SALES", "CLICKS_LOYALTY_SALES_OVER_TOTAL", "UNIQUE_GUEST_COUNT"],
            vec![
                vec!["CURRENT".into(), n(60.0), n(100.0), n(0.6), n(40.0)],
                vec!["PREVIOUS".into(), n(50.0), n(100.0), n(0.5), n(0.0)],
            ],
        );
        let entry = build(&clicks_loyalty(false), "clicks_loyalty", raw);
        assert_eq!(entry.table.columns, vec!["Metric", "Current", "Previous", "Growth"]);
        let shown = display_rows(&entry.table);
        assert_eq!(shown[0], vec!["Clicks loyalty sales", "60", "50", "20.0%"]);
        assert_eq!(shown[2], vec!["Clicks loyalty sales over total", "60.0%", "50.0%", "20.0%"]);
        assert_eq!(shown[3][0], "Guests");
        assert_eq!(shown[4], vec!["Unique guest count", "40", "0", "0.0%"]);
    }

    #[test]
    fn catalog_order_is_fixed() {
        let config = ReportConfig::default();
        let dates = ReportDates::resolve(NaiveDate::from_ymd_opt(2025, 9, 29).unwrap(), 9).unwrap();
        let titles: Vec<String> = catalog(&config, &dates).into_iter().map(|d| d.title).collect();
        assert_eq!(titles.len(), 25);
        assert_eq!(titles[0], "Total Business");
        assert_eq!(titles[8], "Top 10 Stores - Current Sales");
        assert_eq!(titles[12], "Top 20 Service Items");
        assert_eq!(titles[17], "Total Lines Retail");
        assert_eq!(titles[22], "Daily Sales Last Week (Week 4)");
        assert_eq!(titles[24], "Clicks Loyalty Measures");
    }
}
