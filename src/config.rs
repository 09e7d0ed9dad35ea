use crate::error::{ReportError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Run settings. Every field has a default, so a partial file (or none at
/// all) is enough.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Where the warehouse extracts live.
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Query template id -> extract file pattern with `{param}` placeholders.
    pub templates: BTreeMap<String, String>,
    /// Put a header row before the first section too.
    pub first_section_header: bool,
    pub top_stores: usize,
    pub bottom_stores: usize,
    pub top_items: usize,
    pub bottom_items: usize,
    pub category_order: Vec<String>,
    pub fiscal_year_start_month: u32,
    pub preview_rows: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            templates: default_templates(),
            first_section_header: false,
            top_stores: 10,
            bottom_stores: 10,
            top_items: 20,
            bottom_items: 10,
            category_order: ["A +", "A", "B", "C"].iter().map(|c| c.to_string()).collect(),
            fiscal_year_start_month: 9,
            preview_rows: 3,
        }
    }
}

fn default_templates() -> BTreeMap<String, String> {
    [
        ("total_business", "total_business_{end_date}.csv"),
        ("corporate_stores", "corporate_stores_{end_date}.csv"),
        ("region_wtd", "region_wtd_{end_date}.csv"),
        ("region_mtd", "region_mtd_{end_date}.csv"),
        ("region_ytd", "region_ytd_{end_date}.csv"),
        ("store_pivots", "store_pivots_{end_date}.csv"),
        ("service_items", "service_items_{end_date}.csv"),
        ("retail_items", "retail_items_{end_date}.csv"),
        ("transaction_count_total", "transaction_count_total_{end_date}.csv"),
        ("transaction_count_region", "transaction_count_region_{end_date}.csv"),
        ("basket_size_total", "basket_size_total_{end_date}.csv"),
        ("basket_size_region", "basket_size_region_{end_date}.csv"),
        ("daily_sales", "daily_sales_{end_date}.csv"),
        ("loyalty_kpi", "loyalty_kpi_{end_date}.csv"),
        ("clicks_loyalty", "clicks_loyalty_{end_date}.csv"),
    ]
    .iter()
    .map(|(id, file)| (id.to_string(), file.to_string()))
    .collect()
}

impl ReportConfig {
    /// Read a JSON config file. Templates listed in the file are merged over
    /// the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReportError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let mut config: ReportConfig = serde_json::from_str(&content)
            .map_err(|e| ReportError::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        let mut templates = default_templates();
        templates.append(&mut config.templates);
        config.templates = templates;
        config.validate()?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// The file at `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => ReportConfig::load(p),
            None => Ok(ReportConfig::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=12).contains(&self.fiscal_year_start_month) {
            return Err(ReportError::Config(format!(
                "fiscal_year_start_month must be 1-12, got {}",
                self.fiscal_year_start_month
            )));
        }
        for (name, n) in [
            ("top_stores", self.top_stores),
            ("bottom_stores", self.bottom_stores),
            ("top_items", self.top_items),
            ("bottom_items", self.bottom_items),
        ] {
            if n == 0 {
                return Err(ReportError::Config(format!("{} must be at least 1", name)));
            }
        }
        Ok(())
    }
}
