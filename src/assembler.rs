// Sequencing of report definitions: fetch, run the steps, collect entries.
//
// The assembler holds no business rules. Each definition names a query
// template and an ordered list of steps; a failure anywhere in one
// definition becomes a placeholder entry and the next definition runs.

use crate::error::{ReportError, Result};
use crate::fetch::{Fetcher, QueryParams};
use crate::present::passthrough;
use crate::types::{MetricTable, RawTable, ReportEntry, ReportTable, SectionedReport};
use crate::util::format_int;
use tracing::{debug, error, info, warn};

/// The table flowing between steps, tagged by stage.
#[derive(Debug, Clone)]
pub enum Frame {
    Raw(RawTable),
    Metric(MetricTable),
    Sectioned(SectionedReport),
    Report(ReportTable),
}

impl Frame {
    pub fn stage(&self) -> &'static str {
        match self {
            Frame::Raw(_) => "raw",
            Frame::Metric(_) => "metric",
            Frame::Sectioned(_) => "sectioned",
            Frame::Report(_) => "report",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Frame::Raw(t) => t.len(),
            Frame::Metric(t) => t.len() + t.footer.len(),
            Frame::Sectioned(t) => t.rows.len(),
            Frame::Report(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mismatch(&self, expected: &'static str) -> ReportError {
        ReportError::StageMismatch {
            expected,
            found: self.stage(),
        }
    }

    pub fn into_raw(self) -> Result<RawTable> {
        match self {
            Frame::Raw(t) => Ok(t),
            other => Err(other.mismatch("raw")),
        }
    }

    pub fn into_metric(self) -> Result<MetricTable> {
        match self {
            Frame::Metric(t) => Ok(t),
            other => Err(other.mismatch("metric")),
        }
    }

    pub fn into_sectioned(self) -> Result<SectionedReport> {
        match self {
            Frame::Sectioned(t) => Ok(t),
            other => Err(other.mismatch("sectioned")),
        }
    }

    /// The finished table. Raw frames are presented as delivered.
    pub fn into_report(self) -> Result<ReportTable> {
        match self {
            Frame::Report(t) => Ok(t),
            Frame::Raw(t) => Ok(passthrough(&t)),
            other => Err(other.mismatch("report")),
        }
    }
}

impl From<RawTable> for Frame {
    fn from(t: RawTable) -> Self {
        Frame::Raw(t)
    }
}

impl From<MetricTable> for Frame {
    fn from(t: MetricTable) -> Self {
        Frame::Metric(t)
    }
}

impl From<SectionedReport> for Frame {
    fn from(t: SectionedReport) -> Self {
        Frame::Sectioned(t)
    }
}

impl From<ReportTable> for Frame {
    fn from(t: ReportTable) -> Self {
        Frame::Report(t)
    }
}

type StepFn = Box<dyn Fn(Frame) -> Result<Frame> + Send + Sync>;

/// One named transform. Steps see their input by reference where they are
/// built from the stage helpers, so they cannot alter the fetched data.
pub struct Step {
    pub name: String,
    run: StepFn,
}

impl Step {
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(Frame) -> Result<Frame> + Send + Sync + 'static,
    {
        Step {
            name: name.to_string(),
            run: Box::new(f),
        }
    }

    pub fn raw<F, T>(name: &str, f: F) -> Self
    where
        F: Fn(&RawTable) -> Result<T> + Send + Sync + 'static,
        T: Into<Frame>,
    {
        Step::new(name, move |frame| f(&frame.into_raw()?).map(Into::into))
    }

    pub fn metric<F, T>(name: &str, f: F) -> Self
    where
        F: Fn(&MetricTable) -> Result<T> + Send + Sync + 'static,
        T: Into<Frame>,
    {
        Step::new(name, move |frame| f(&frame.into_metric()?).map(Into::into))
    }

    pub fn sectioned<F, T>(name: &str, f: F) -> Self
    where
        F: Fn(&SectionedReport) -> Result<T> + Send + Sync + 'static,
        T: Into<Frame>,
    {
        Step::new(name, move |frame| f(&frame.into_sectioned()?).map(Into::into))
    }

    pub fn apply(&self, frame: Frame) -> Result<Frame> {
        (self.run)(frame)
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish()
    }
}

/// A titled table of the document: where its data comes from and how it is
/// shaped.
#[derive(Debug)]
pub struct ReportDefinition {
    pub title: String,
    pub template_id: String,
    pub steps: Vec<Step>,
}

impl ReportDefinition {
    pub fn new(title: impl Into<String>, template_id: &str) -> Self {
        ReportDefinition {
            title: title.into(),
            template_id: template_id.to_string(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}

/// Fetch and shape one table. Never fails: an empty fetch yields a no-data
/// entry and any error yields a failed entry carrying the reason.
pub fn build_report_table<F: Fetcher + ?Sized>(
    fetcher: &F,
    definition: &ReportDefinition,
    params: &QueryParams,
) -> ReportEntry {
    let title = definition.title.as_str();
    let template = definition.template_id.as_str();
    info!(title, template, "building report table");

    let raw = match fetcher.fetch(template, params) {
        Ok(raw) => raw,
        Err(e) => {
            error!(title, template, error = %e, "fetch failed");
            return ReportEntry::failed(title, e.to_string());
        }
    };
    if raw.is_empty() {
        warn!(title, template, "no rows returned");
        return ReportEntry::no_data(title);
    }

    match run_steps(definition, raw) {
        Ok(table) => {
            info!(title, rows = %format_int(table.len()), "report table ready");
            ReportEntry::ready(title, table)
        }
        Err(e) => {
            error!(title, template, error = %e, "transform failed");
            ReportEntry::failed(title, e.to_string())
        }
    }
}

fn run_steps(definition: &ReportDefinition, raw: RawTable) -> Result<ReportTable> {
    let mut frame = Frame::Raw(raw);
    for step in &definition.steps {
        frame = step.apply(frame).map_err(|e| {
            debug!(title = %definition.title, step = %step.name, "step failed");
            e
        })?;
        debug!(
            title = %definition.title,
            step = %step.name,
            stage = frame.stage(),
            rows = frame.len(),
            "step done"
        );
    }
    frame.into_report()
}

/// Build every definition in declared order. The output order is the
/// document order regardless of which tables succeed.
pub fn assemble<F: Fetcher + ?Sized>(
    fetcher: &F,
    definitions: &[ReportDefinition],
    params: &QueryParams,
) -> Vec<ReportEntry> {
    let entries: Vec<ReportEntry> = definitions
        .iter()
        .map(|d| build_report_table(fetcher, d, params))
        .collect();
    let ready = entries.iter().filter(|e| e.has_data()).count();
    info!(
        tables = entries.len(),
        ready,
        placeholders = entries.len() - ready,
        "report assembled"
    );
    entries
}
