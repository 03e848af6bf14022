//! Match command - reconcile extracted line items against a reference catalog.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::{info, warn};

use pricelist_core::ai::GeminiClient;
use pricelist_core::batch::write_json_atomic;
use pricelist_core::models::{DocumentResult, MatchSummary, MatchedRecord};
use pricelist_core::{Catalog, LineItem, MatchOptions, PricelistConfig, Reconciler};

/// Arguments for the match command.
#[derive(Args)]
pub struct MatchArgs {
    /// Reference catalog CSV (product code and description columns)
    #[arg(long)]
    catalog: PathBuf,

    /// Results file written by the extract command
    #[arg(short, long, default_value = "output/results.json")]
    results: PathBuf,

    /// Output file for matched records
    #[arg(short, long, default_value = "output/matches.json")]
    output: PathBuf,

    /// Match on identifiers only and never consult the AI
    #[arg(long)]
    id_only: bool,

    /// Do not send absent or ambiguous identifiers to the AI
    #[arg(long)]
    no_ai_fallback: bool,

    /// Send every line item to the AI instead of matching identifiers
    #[arg(long, conflicts_with_all = ["id_only", "no_ai_fallback"])]
    ai_only: bool,
}

pub async fn run(args: MatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = super::load_config(config_path)?;

    let catalog = Catalog::from_path(&args.catalog)?;
    println!(
        "{} Loaded {} catalog entries from {}",
        style("ℹ").blue(),
        catalog.len(),
        args.catalog.display()
    );

    let items = load_items(&args.results)?;
    if items.is_empty() {
        anyhow::bail!("No extracted line items in {}", args.results.display());
    }

    let options = match_options(&args, &config);

    println!(
        "{} Matching {} line items{}",
        style("ℹ").blue(),
        items.len(),
        mode_label(options)
    );

    // Matching may call the AI over a blocking HTTP client.
    let (records, summary) =
        tokio::task::spawn_blocking(move || reconcile(&catalog, &config, &items, options)).await?;

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    write_json_atomic(&args.output, &records)?;
    info!("Matches written to {}", args.output.display());

    print_summary(&summary, &args.output, start);
    Ok(())
}

/// Configured options with the command-line switches applied.
fn match_options(args: &MatchArgs, config: &PricelistConfig) -> MatchOptions {
    let mut options = MatchOptions::from(&config.matching);
    options.use_id_only |= args.id_only;
    if args.no_ai_fallback {
        options.use_ai_fallback = false;
    }
    if args.ai_only {
        options.use_ai_only = true;
        options.use_id_only = false;
    }
    options
}

fn mode_label(options: MatchOptions) -> &'static str {
    if options.use_id_only {
        " (ID only)"
    } else if options.use_ai_only {
        " (AI only)"
    } else {
        ""
    }
}

/// Line items of every successful document, in result order.
fn load_items(path: &Path) -> anyhow::Result<Vec<LineItem>> {
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let results: Vec<DocumentResult> = serde_json::from_str(&content)?;

    Ok(results
        .into_iter()
        .filter(DocumentResult::is_success)
        .flat_map(|r| r.data)
        .collect())
}

fn reconcile(
    catalog: &Catalog,
    config: &PricelistConfig,
    items: &[LineItem],
    options: MatchOptions,
) -> (Vec<MatchedRecord>, MatchSummary) {
    let mut reconciler = Reconciler::new(catalog, &config.matching);

    if !options.use_id_only {
        match GeminiClient::for_matching(&config.ai) {
            Ok(client) => reconciler = reconciler.with_model(Box::new(client)),
            Err(e) => warn!("AI matching unavailable: {}", e),
        }
    }

    reconciler.match_batch(items, options)
}

fn print_summary(summary: &MatchSummary, output: &Path, start: Instant) {
    println!();
    println!(
        "{} Matched {} line items in {:?}",
        style("✓").green(),
        summary.total,
        start.elapsed()
    );
    println!(
        "   {} matched, {} unmatched, average confidence {:.2}",
        style(summary.matched).green(),
        style(summary.unmatched).red(),
        summary.avg_confidence
    );
    println!("   Matches: {}", output.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_items_skips_failed_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let json = r#"[
            {"vendor_name": "RW Zant", "vendor_code": "rw_zant", "filename": "a.pdf", "status": "success",
             "data": [{"product_id": "103387", "description": "BEEF CHUCK", "cost": "$4.99"}],
             "processing_time": 1.0, "completed_at": "2026-01-05T10:00:00Z"},
            {"vendor_name": "RW Zant", "vendor_code": "rw_zant", "filename": "b.pdf", "status": "error",
             "data": [], "error": "all extraction strategies failed",
             "processing_time": 0.5, "completed_at": "2026-01-05T10:00:01Z"}
        ]"#;
        fs::write(&path, json).unwrap();

        let items = load_items(&path).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id.as_str(), "103387");
    }

    #[test]
    fn test_ai_only_switch_overrides_config() {
        let mut config = PricelistConfig::default();
        config.matching.use_id_only = true;
        let args = MatchArgs {
            catalog: PathBuf::from("catalog.csv"),
            results: PathBuf::from("results.json"),
            output: PathBuf::from("matches.json"),
            id_only: false,
            no_ai_fallback: false,
            ai_only: true,
        };

        let options = match_options(&args, &config);
        assert!(options.use_ai_only);
        assert!(!options.use_id_only);
        assert_eq!(mode_label(options), " (AI only)");
    }

    #[test]
    fn test_missing_results_file() {
        assert!(load_items(Path::new("/nonexistent/results.json")).is_err());
    }
}
