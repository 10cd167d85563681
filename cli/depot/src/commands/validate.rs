//! `depot validate <prefix> [--json] [--discard]`.

use anyhow::{Context, Result};
use depot_registry::{FileStatus, FileValidation, Repository, ValidationReport};

/// Validate the batch under `prefix`. Fails when any file does not pass.
pub async fn run(repository: &Repository, prefix: &str, json: bool, discard: bool) -> Result<()> {
    let report = repository
        .validate(prefix)
        .await
        .with_context(|| format!("validating {prefix}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    if report.passed() {
        return Ok(());
    }

    if discard {
        let deleted = repository
            .discard(prefix)
            .await
            .with_context(|| format!("discarding {prefix}"))?;
        eprintln!("Discarded {} files under {prefix}", deleted.len());
    }
    report.into_result()?;
    Ok(())
}

fn print_report(report: &ValidationReport) {
    if report.files.is_empty() {
        println!("No artifacts under {}", report.prefix);
        return;
    }
    for file in &report.files {
        println!("{:<14} {}", status_label(file), file.key);
    }
    let failed = report.failures().count();
    println!();
    println!(
        "{} files checked, {} passed, {} failed",
        report.files.len(),
        report.files.len() - failed,
        failed
    );
}

fn status_label(file: &FileValidation) -> String {
    match file.status {
        FileStatus::Valid => "ok".to_string(),
        FileStatus::MissingChecksums => "no checksums".to_string(),
        FileStatus::Mismatch => {
            let algorithms: Vec<String> = file.mismatched.iter().map(ToString::to_string).collect();
            format!("bad {}", algorithms.join(","))
        }
    }
}
