//! Models command - fetch and inspect the OCR model files.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;
use futures_util::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use pricelist_core::models::config::OcrConfig;

/// Arguments for the models command.
#[derive(Args)]
pub struct ModelsArgs {
    #[command(subcommand)]
    command: ModelsCommand,
}

#[derive(Subcommand)]
enum ModelsCommand {
    /// Download the configured model files
    Download(DownloadArgs),

    /// Check which model files are present
    Status,

    /// Remove downloaded model files
    Clean {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Args)]
struct DownloadArgs {
    /// Base URL to fetch files from (overrides ocr.download_base_url)
    #[arg(long)]
    base_url: Option<String>,

    /// Output directory (overrides ocr.model_dir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Force re-download even if files exist
    #[arg(short, long)]
    force: bool,
}

pub async fn run(args: ModelsArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;

    match args.command {
        ModelsCommand::Download(download_args) => download_models(download_args, &config.ocr).await,
        ModelsCommand::Status => check_status(&config.ocr),
        ModelsCommand::Clean { yes } => clean_models(&config.ocr, yes),
    }
}

/// Detection model, recognition model and dictionary, in load order.
fn model_files(ocr: &OcrConfig) -> [&str; 3] {
    [ocr.detection_model.as_str(), ocr.recognition_model.as_str(), ocr.dictionary.as_str()]
}

fn file_url(base_url: &str, filename: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), filename)
}

async fn download_models(args: DownloadArgs, ocr: &OcrConfig) -> anyhow::Result<()> {
    let Some(base_url) = args.base_url.or_else(|| ocr.download_base_url.clone()) else {
        anyhow::bail!(
            "No download URL configured. Pass --base-url or run: pricelist config set ocr.download_base_url <url>"
        );
    };

    let output_dir = args.output.unwrap_or_else(|| ocr.model_dir.clone());
    fs::create_dir_all(&output_dir)?;

    println!(
        "{} Downloading OCR models to {}",
        style("ℹ").blue(),
        output_dir.display()
    );
    println!();

    let client = reqwest::Client::builder()
        .user_agent(concat!("pricelist-cli/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let multi_progress = MultiProgress::new();
    let mut success_count = 0;
    let mut skip_count = 0;
    let mut error_count = 0;

    for filename in model_files(ocr) {
        let path = output_dir.join(filename);

        if path.exists() && !args.force {
            println!(
                "  {} {} (already exists, {})",
                style("✓").green(),
                filename,
                format_size(fs::metadata(&path)?.len())
            );
            skip_count += 1;
            continue;
        }

        let pb = multi_progress.add(ProgressBar::new(0));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} {msg:<30} [{bar:25.cyan/blue}] {bytes}/{total_bytes}")?
                .progress_chars("=>-"),
        );
        pb.set_message(filename.to_string());

        match download_file(&client, &file_url(&base_url, filename), &path, &pb).await {
            Ok(()) => {
                pb.finish_with_message(format!("{} {}", style("✓").green(), filename));
                success_count += 1;
            }
            Err(e) => {
                pb.finish_with_message(format!("{} {} - {}", style("✗").red(), filename, e));
                error_count += 1;
            }
        }
    }

    println!();
    if error_count == 0 {
        println!("{} Models ready", style("✓").green().bold());
        println!("   {} downloaded, {} already present", success_count, skip_count);
    } else {
        println!("{} Download completed with errors", style("⚠").yellow().bold());
        println!(
            "   {} downloaded, {} skipped, {} failed",
            success_count, skip_count, error_count
        );
        println!();
        println!("Retry with: pricelist models download --force");
    }

    Ok(())
}

async fn download_file(client: &reqwest::Client, url: &str, path: &Path, pb: &ProgressBar) -> anyhow::Result<()> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        anyhow::bail!("HTTP {}", response.status());
    }

    if let Some(content_length) = response.content_length() {
        pb.set_length(content_length);
    }

    let temp_path = path.with_extension("part");
    let mut file = File::create(&temp_path)?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }

    file.flush()?;
    drop(file);

    fs::rename(&temp_path, path)?;
    Ok(())
}

fn check_status(ocr: &OcrConfig) -> anyhow::Result<()> {
    println!("{}", style("Model Status").bold());
    println!("Directory: {}", ocr.model_dir.display());
    println!();

    let mut all_present = true;
    let mut total_size: u64 = 0;

    for filename in model_files(ocr) {
        let path = ocr.model_path(filename);
        if path.exists() {
            let size = fs::metadata(&path)?.len();
            total_size += size;
            let (mark, note) = if size == 0 {
                all_present = false;
                (style("⚠").yellow(), "empty".to_string())
            } else {
                (style("✓").green(), format_size(size))
            };
            println!("    {} {:<25} {:>10}", mark, filename, note);
        } else {
            all_present = false;
            println!("    {} {:<25} {:>10}", style("✗").red(), filename, "missing");
        }
    }

    println!();
    if all_present {
        println!("{} Ready ({} total)", style("✓").green(), format_size(total_size));
    } else {
        println!(
            "{} OCR extraction unavailable. Run: pricelist models download",
            style("⚠").yellow()
        );
    }

    Ok(())
}

fn clean_models(ocr: &OcrConfig, yes: bool) -> anyhow::Result<()> {
    let present: Vec<PathBuf> = model_files(ocr)
        .iter()
        .map(|f| ocr.model_path(f))
        .filter(|p| p.exists())
        .collect();

    if present.is_empty() {
        println!("{} No model files to remove", style("ℹ").blue());
        return Ok(());
    }

    if !yes {
        println!("This will remove:");
        for path in &present {
            println!("  {}", path.display());
        }
        println!();
        println!("Run with --yes to confirm.");
        return Ok(());
    }

    for path in &present {
        fs::remove_file(path)?;
        println!("{} Removed {}", style("✓").green(), path.display());
    }

    Ok(())
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_url_joins_cleanly() {
        assert_eq!(file_url("https://host/models/", "det.onnx"), "https://host/models/det.onnx");
        assert_eq!(file_url("https://host/models", "det.onnx"), "https://host/models/det.onnx");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
