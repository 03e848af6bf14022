//! End-to-end invocations of the pricelist binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_pricelist"))
}

/// Config that keeps OCR models and the AI service out of reach.
fn offline_config(dir: &Path) -> String {
    let path = dir.join("config.json");
    let config = serde_json::json!({
        "ocr": { "model_dir": dir.join("no-models") },
        "ai": { "api_key": "" },
        "batch": { "max_workers": 2 }
    });
    fs::write(&path, config.to_string()).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_help_lists_commands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("extract"))
        .stdout(predicate::str::contains("match"))
        .stdout(predicate::str::contains("models"));
}

#[test]
fn test_extract_without_pdfs_fails() {
    let dir = TempDir::new().unwrap();
    let config = offline_config(dir.path());
    let input = dir.path().join("empty");
    fs::create_dir_all(&input).unwrap();

    cli()
        .args(["--config", &config, "extract"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No PDF files found"));
}

#[test]
fn test_extract_records_failed_document() {
    let dir = TempDir::new().unwrap();
    let config = offline_config(dir.path());
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("rw_zant_2026.pdf"), b"not really a pdf").unwrap();

    cli()
        .args(["--config", &config, "extract", "--no-ai", "-o"])
        .arg(&output)
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 failed"));

    let results: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(output.join("results.json")).unwrap()).unwrap();
    assert_eq!(results[0]["filename"], "rw_zant_2026.pdf");
    assert_eq!(results[0]["vendor_code"], "rw_zant");
    assert_eq!(results[0]["status"], "error");

    let status: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(output.join("status.json")).unwrap()).unwrap();
    assert_eq!(status["status"], "completed");
    assert_eq!(status["total"], 1);
}

#[test]
fn test_match_id_only() {
    let dir = TempDir::new().unwrap();
    let config = offline_config(dir.path());
    let catalog = dir.path().join("catalog.csv");
    let results = dir.path().join("results.json");
    let output = dir.path().join("matches.json");

    fs::write(&catalog, "Product Code,Product Name\n103387,BEEF CHUCK 80/20\n200100,PORK BUTT\n").unwrap();
    fs::write(
        &results,
        r#"[{"vendor_name": "RW Zant", "vendor_code": "rw_zant", "filename": "a.pdf", "status": "success",
            "data": [
                {"product_id": "103387", "description": "BEEF CHUCK", "cost": "$4.99"},
                {"product_id": "999999", "description": "MYSTERY", "cost": "$1.00"}
            ],
            "processing_time": 1.0, "completed_at": "2026-01-05T10:00:00Z"}]"#,
    )
    .unwrap();

    cli()
        .args(["--config", &config, "match", "--id-only", "--catalog"])
        .arg(&catalog)
        .arg("--results")
        .arg(&results)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 matched, 1 unmatched"));

    let matches: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(matches[0]["match"]["matched_id"], "103387");
    assert_eq!(matches[1]["match"]["matched_id"], "NO_MATCH");
}

#[test]
fn test_match_ai_only_without_service() {
    let dir = TempDir::new().unwrap();
    let config = offline_config(dir.path());
    let catalog = dir.path().join("catalog.csv");
    let results = dir.path().join("results.json");
    let output = dir.path().join("matches.json");

    fs::write(&catalog, "Product Code,Product Name\n103387,BEEF CHUCK 80/20\n").unwrap();
    fs::write(
        &results,
        r#"[{"vendor_name": "RW Zant", "vendor_code": "rw_zant", "filename": "a.pdf", "status": "success",
            "data": [{"product_id": "103387", "description": "BEEF CHUCK", "cost": "$4.99"}],
            "processing_time": 1.0, "completed_at": "2026-01-05T10:00:00Z"}]"#,
    )
    .unwrap();

    // The identifier would match, but AI-only mode never takes the id path.
    cli()
        .env_remove("GEMINI_API_KEY")
        .args(["--config", &config, "match", "--ai-only", "--catalog"])
        .arg(&catalog)
        .arg("--results")
        .arg(&results)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("(AI only)"))
        .stdout(predicate::str::contains("0 matched, 1 unmatched"));

    let matches: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(matches[0]["match"]["matched_id"], "NO_MATCH");

    cli()
        .args(["--config", &config, "match", "--ai-only", "--id-only", "--catalog"])
        .arg(&catalog)
        .assert()
        .failure();
}

#[test]
fn test_models_download_requires_url() {
    let dir = TempDir::new().unwrap();
    let config = offline_config(dir.path());

    cli()
        .args(["--config", &config, "models", "download"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No download URL configured"));
}
