use crate::error::{ReportError, Result};
use crate::types::{Cell, RawTable};
use crate::util::format_int;
use csv::{ReaderBuilder, Trim};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Named query parameters; dates are ISO `YYYY-MM-DD` strings.
pub type QueryParams = BTreeMap<String, String>;

/// The data source: given a query template and its parameters, a flat table.
/// No matching rows is an empty table, not an error.
pub trait Fetcher {
    fn fetch(&self, template_id: &str, params: &QueryParams) -> Result<RawTable>;
}

impl<F: Fetcher + ?Sized> Fetcher for &F {
    fn fetch(&self, template_id: &str, params: &QueryParams) -> Result<RawTable> {
        (**self).fetch(template_id, params)
    }
}

/// Reads warehouse extracts from CSV files. Each template maps to a file
/// pattern under `root` whose `{param}` placeholders are filled from the
/// query parameters, e.g. `region_wtd_{end_date}.csv`.
#[derive(Debug, Clone)]
pub struct CsvDirFetcher {
    root: PathBuf,
    templates: BTreeMap<String, String>,
}

impl CsvDirFetcher {
    pub fn new(root: impl Into<PathBuf>, templates: BTreeMap<String, String>) -> Self {
        CsvDirFetcher {
            root: root.into(),
            templates,
        }
    }

    pub fn resolve(&self, template_id: &str, params: &QueryParams) -> Result<PathBuf> {
        let pattern = self
            .templates
            .get(template_id)
            .ok_or_else(|| ReportError::UnknownTemplate(template_id.to_string()))?;
        let mut file = pattern.clone();
        for (key, value) in params {
            file = file.replace(&format!("{{{}}}", key), value);
        }
        if file.contains('{') {
            return Err(ReportError::Fetch {
                template: template_id.to_string(),
                reason: format!("unresolved placeholder in '{}'", file),
            });
        }
        Ok(self.root.join(file))
    }
}

impl Fetcher for CsvDirFetcher {
    fn fetch(&self, template_id: &str, params: &QueryParams) -> Result<RawTable> {
        let path = self.resolve(template_id, params)?;
        if !path.exists() {
            return Err(ReportError::Fetch {
                template: template_id.to_string(),
                reason: format!("extract not found: {}", path.display()),
            });
        }
        let (table, skipped) = read_extract(&path)?;
        if skipped > 0 {
            warn!(
                template = template_id,
                skipped = %format_int(skipped),
                "skipped malformed extract records"
            );
        }
        info!(
            template = template_id,
            rows = %format_int(table.len()),
            path = %path.display(),
            "fetched"
        );
        Ok(table)
    }
}

/// Load a CSV extract. Unreadable records are skipped and counted.
pub fn read_extract(path: &Path) -> Result<(RawTable, usize)> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;
    let columns: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    let mut table = RawTable::new(columns);
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = match result {
            Ok(r) => r,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        table.push_row(record.iter().map(Cell::from_field).collect());
    }
    Ok((table, skipped))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

#[derive(Default)]
struct CacheState {
    tables: HashMap<(String, QueryParams), RawTable>,
    stats: CacheStats,
}

/// Memoizes another fetcher by `(template, params)`. Failed fetches are not
/// cached. Owned by the caller for one run; nothing is global.
pub struct CachedFetcher<F> {
    inner: F,
    state: Mutex<CacheState>,
}

impl<F: Fetcher> CachedFetcher<F> {
    pub fn new(inner: F) -> Self {
        CachedFetcher {
            inner,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).stats
    }
}

impl<F: Fetcher> Fetcher for CachedFetcher<F> {
    fn fetch(&self, template_id: &str, params: &QueryParams) -> Result<RawTable> {
        let key = (template_id.to_string(), params.clone());
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(table) = state.tables.get(&key).cloned() {
                state.stats.hits += 1;
                debug!(template = template_id, "cache hit");
                return Ok(table);
            }
            state.stats.misses += 1;
        }
        debug!(template = template_id, "cache miss");
        let table = self.inner.fetch(template_id, params)?;
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .tables
            .insert(key, table.clone());
        Ok(table)
    }
}

/// In-memory fetcher with canned tables and canned failures.
#[derive(Default)]
pub struct StaticFetcher {
    tables: HashMap<String, RawTable>,
    failures: HashMap<String, String>,
    calls: Mutex<usize>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        StaticFetcher::default()
    }

    pub fn with_table(mut self, template_id: &str, table: RawTable) -> Self {
        self.tables.insert(template_id.to_string(), table);
        self
    }

    pub fn with_failure(mut self, template_id: &str, reason: &str) -> Self {
        self.failures.insert(template_id.to_string(), reason.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(&self, template_id: &str, _params: &QueryParams) -> Result<RawTable> {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        if let Some(reason) = self.failures.get(template_id) {
            return Err(ReportError::Fetch {
                template: template_id.to_string(),
                reason: reason.clone(),
            });
        }
        self.tables
            .get(template_id)
            .cloned()
            .ok_or_else(|| ReportError::UnknownTemplate(template_id.to_string()))
    }
}
