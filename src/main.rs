// Entry point and high-level CLI flow.
//
// One run builds the whole scorecard for the reporting week before
// `--run-date`: resolve the period boundaries, fetch every extract once,
// shape each table, write the outputs and print a short preview per table.
use chrono::Local;
use clap::Parser;
use scorecard_report::calendar::ReportDates;
use scorecard_report::config::ReportConfig;
use scorecard_report::error::{ReportError, Result};
use scorecard_report::fetch::{CachedFetcher, CsvDirFetcher};
use scorecard_report::util::{format_int, parse_date_safe};
use scorecard_report::{assemble, output, reports};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "scorecard_report", about = "Build the weekly retail scorecard from warehouse extracts")]
struct Args {
    /// JSON config file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reporting runs cover the Monday-Sunday week before this date (YYYY-MM-DD)
    #[arg(short, long)]
    run_date: Option<String>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Put a header row before the first section of sectioned tables
    #[arg(long)]
    first_section_header: bool,

    /// Rows shown per table in the console preview
    #[arg(short, long)]
    preview_rows: Option<usize>,
}

fn resolve_config(args: &Args) -> Result<ReportConfig> {
    let mut config = ReportConfig::load_or_default(args.config.as_deref())?;
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if args.first_section_header {
        config.first_section_header = true;
    }
    if let Some(n) = args.preview_rows {
        config.preview_rows = n;
    }
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let config = resolve_config(&args)?;
    let run_date = match args.run_date.as_deref() {
        Some(s) => parse_date_safe(Some(s)).ok_or_else(|| ReportError::InvalidDate(s.to_string()))?,
        None => Local::now().date_naive(),
    };
    let dates = ReportDates::resolve(run_date, config.fiscal_year_start_month)?;
    info!(
        run_date = %dates.run_date,
        week = dates.fiscal_week_number(),
        range = %dates.week_range(),
        "resolved reporting period"
    );

    println!("Generating scorecard for {}...", dates.week_range());
    let fetcher = CachedFetcher::new(CsvDirFetcher::new(&config.data_dir, config.templates.clone()));
    let definitions = reports::catalog(&config, &dates);
    let entries = assemble(&fetcher, &definitions, &dates.to_params());
    let stats = fetcher.stats();
    info!(hits = stats.hits, misses = stats.misses, "extract cache");

    let written = output::write_outputs(&config.output_dir, &dates, &entries)?;
    println!("Outputs saved to {}\n", config.output_dir.display());

    for (i, entry) in entries.iter().enumerate() {
        output::preview_table(i + 1, entry, config.preview_rows, written.tables.get(i).map(|p| p.as_path()));
    }

    let ready = entries.iter().filter(|e| e.has_data()).count();
    println!(
        "\n{} of {} tables populated. Workbook: {}",
        format_int(ready),
        format_int(entries.len()),
        written.workbook.display()
    );
    println!("Catalog: {}", written.catalog.display());
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "scorecard run failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
