//! Extract command - run the extraction pipeline over a batch of PDFs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use pricelist_core::batch::resume;
use pricelist_core::extract::restructure_price_variants;
use pricelist_core::models::{BatchStatus, DocumentResult};
use pricelist_core::{
    detect_vendor_code, BatchRunner, DocumentJob, ExtractionPipeline, JsonResultStore, ResultSink,
};

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input directory or glob pattern of PDF files
    #[arg(required = true)]
    input: String,

    /// Output directory for results and status files
    #[arg(short = 'o', long = "out", default_value = "output")]
    output_dir: PathBuf,

    /// Vendor code for every file, instead of detecting it from the filename
    #[arg(long)]
    vendor: Option<String>,

    /// Number of parallel workers (defaults to the configured value)
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Disable the AI extraction strategy
    #[arg(long)]
    no_ai: bool,

    /// Reprocess every file instead of resuming from earlier results
    #[arg(long)]
    fresh: bool,

    /// Also write a case/pallet price CSV
    #[arg(long)]
    csv: bool,
}

/// Persists through the store and advances the progress bar.
struct ProgressSink {
    store: JsonResultStore,
    bar: ProgressBar,
}

impl ResultSink for ProgressSink {
    fn record(&mut self, results: &[DocumentResult], status: &BatchStatus) -> pricelist_core::Result<()> {
        self.bar.set_position(status.completed as u64);
        if let Some(last) = results.last() {
            self.bar.set_message(last.filename.clone());
        }
        self.store.record(results, status)
    }
}

pub async fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut config = super::load_config(config_path)?;
    if let Some(jobs) = args.jobs {
        config.batch.max_workers = jobs;
    }

    let files = collect_pdfs(&args.input)?;
    if files.is_empty() {
        anyhow::bail!("No PDF files found for: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    fs::create_dir_all(&args.output_dir)?;
    let store = JsonResultStore::new(&args.output_dir, &config.batch);

    let mut jobs = Vec::with_capacity(files.len());
    for path in &files {
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let vendor = args
            .vendor
            .clone()
            .unwrap_or_else(|| detect_vendor_code(&filename).to_string());
        debug!("{} -> vendor {}", filename, vendor);
        jobs.push(DocumentJob::new(filename, vendor, fs::read(path)?));
    }

    let previous = if args.fresh { Vec::new() } else { store.load() };
    let (pending, carried) = resume(jobs, previous);
    if !carried.is_empty() {
        println!(
            "{} Resuming: {} files already extracted, {} remaining",
            style("↻").yellow(),
            carried.len(),
            pending.len()
        );
    }

    let bar = ProgressBar::new(files.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?
            .progress_chars("=>-"),
    );

    let runner = BatchRunner::new(&config.batch);
    let use_ai = !args.no_ai;
    let mut sink = ProgressSink { store, bar: bar.clone() };

    let results = tokio::task::spawn_blocking(move || {
        runner.run(
            pending,
            carried,
            || {
                if use_ai {
                    ExtractionPipeline::from_config(&config)
                } else {
                    ExtractionPipeline::new(&config)
                }
            },
            &mut sink,
        )
    })
    .await??;

    bar.finish_with_message("Complete");
    info!("Results written to {}", args.output_dir.display());

    if args.csv {
        let csv_path = args.output_dir.join("price_variants.csv");
        write_price_variants(&csv_path, &results)?;
        println!(
            "{} Price variants written to {}",
            style("✓").green(),
            csv_path.display()
        );
    }

    print_summary(&results, &args.output_dir, start);
    Ok(())
}

/// PDFs under a directory, or matching a glob pattern.
fn collect_pdfs(input: &str) -> anyhow::Result<Vec<PathBuf>> {
    let pattern = if Path::new(input).is_dir() {
        format!("{}/*", input.trim_end_matches('/'))
    } else {
        input.to_string()
    };

    let mut files: Vec<PathBuf> = glob(&pattern)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn write_price_variants(path: &Path, results: &[DocumentResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["vendor", "filename", "product_id", "description", "case_price", "pallet_price"])?;

    for result in results.iter().filter(|r| r.is_success()) {
        for row in restructure_price_variants(&result.data) {
            wtr.write_record([
                result.vendor_name.as_str(),
                result.filename.as_str(),
                &row.product_id.to_string(),
                &row.description,
                &row.case_price.map(|c| c.to_string()).unwrap_or_default(),
                &row.pallet_price.map(|c| c.to_string()).unwrap_or_default(),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

fn print_summary(results: &[DocumentResult], output_dir: &Path, start: Instant) {
    let failed: Vec<&DocumentResult> = results.iter().filter(|r| !r.is_success()).collect();
    let items: usize = results.iter().map(|r| r.data.len()).sum();

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed, {} line items",
        style(results.len() - failed.len()).green(),
        style(failed.len()).red(),
        items
    );
    println!("   Results: {}", output_dir.display());

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.filename,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        println!();
        println!("Rerun the same command to retry only the failed files.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_pdfs_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b_rw_zant.PDF"), b"%PDF").unwrap();
        fs::write(dir.path().join("a_glen_rose.pdf"), b"%PDF").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let files = collect_pdfs(dir.path().to_str().unwrap()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a_glen_rose.pdf", "b_rw_zant.PDF"]);
    }
}
