use anyhow::Result;
use colored::*;
use datalint_sdk::{
    FormatVerdict, ScanReport, ScannedFile, SniffReport, ValidationResult, ValidationStatus,
};
use serde_json::json;

pub fn print_sniff_report(path: &str, report: &SniffReport, format: &str) -> Result<()> {
    match format {
        "json" => print_json(&json!({ "path": path, "report": report })),
        _ => {
            print_text_sniff(path, report);
            Ok(())
        }
    }
}

fn print_text_sniff(path: &str, report: &SniffReport) {
    println!("{} {}", "✓".green().bold(), path.bold());
    println!("  Format:    {}", report.format.to_string().cyan());
    println!("  Type:      {}", report.dataset_type);
    if let Some(dialect) = &report.dialect {
        println!(
            "  Dialect:   {:?} delimiter, {} columns, {}",
            dialect.delimiter as char,
            dialect.columns,
            if dialect.has_header {
                "with header"
            } else {
                "no header"
            }
        );
    }
    println!("  Inspected: {} bytes", report.bytes_inspected);
}

pub fn print_validation_result(path: &str, result: &ValidationResult, format: &str) -> Result<()> {
    match format {
        "json" => print_json(&json!({
            "path": path,
            "passed": result.passed(),
            "result": result,
        })),
        _ => {
            print_text_validation(path, result);
            Ok(())
        }
    }
}

fn print_text_validation(path: &str, result: &ValidationResult) {
    println!("\n{}", "═".repeat(60));
    println!("{}", "  VALIDATION REPORT".bold());
    println!("{}", "═".repeat(60));
    println!("\n  File:   {}", path);
    println!("  Format: {}", result.format);

    match result.status {
        ValidationStatus::Valid => println!(
            "\n{} {}",
            "✓".green().bold(),
            "Validation PASSED".green().bold()
        ),
        ValidationStatus::Partial { confidence } => println!(
            "\n{} {} {}",
            "✓".yellow().bold(),
            "Validation PASSED on a sample".yellow().bold(),
            format!("({:.1}% of bytes checked)", confidence * 100.0).yellow()
        ),
        ValidationStatus::Mismatch => println!(
            "\n{} {}",
            "✗".red().bold(),
            "Validation FAILED".red().bold()
        ),
    }

    let errors: Vec<_> = result.errors().collect();
    let warnings: Vec<_> = result.warnings().collect();

    if !errors.is_empty() {
        println!("\n{}", "Errors:".red().bold());
        for (i, error) in errors.iter().enumerate() {
            println!("  {}. {}", i + 1, error.to_string().red());
        }
    }

    if !warnings.is_empty() {
        println!("\n{}", "Warnings:".yellow().bold());
        for (i, warning) in warnings.iter().enumerate() {
            println!("  {}. {}", i + 1, warning.to_string().yellow());
        }
    }

    println!("\n{}", "Summary:".bold());
    println!("  Records checked: {}", result.stats.records_checked);
    println!(
        "  Bytes checked:   {} / {}",
        result.stats.bytes_checked, result.stats.bytes_total
    );
    println!("  Total errors:    {}", errors.len());
    println!("  Total warnings:  {}", warnings.len());
    println!("{}", "═".repeat(60));
}

pub fn print_scan_report(report: &ScanReport, format: &str) -> Result<()> {
    match format {
        "json" => print_json(&json!({
            "report": report,
            "summary": {
                "file_count": report.files.len(),
                "invalid_count": report.invalid_count(),
                "by_split": report.by_split(),
            }
        })),
        _ => {
            print_text_scan(report);
            Ok(())
        }
    }
}

fn describe(file: &ScannedFile) -> String {
    if let Some(error) = &file.error {
        return error.clone();
    }
    let Some(outcome) = &file.outcome else {
        return "not inspected".to_string();
    };
    if let Some(FormatVerdict::Unrecognized { reason }) = &outcome.verdict {
        return format!("unrecognized: {}", reason);
    }
    match (&outcome.validation, outcome.format()) {
        (Some(result), Some(format)) => {
            let errors = result.errors().count();
            if errors > 0 {
                format!("{} ({} errors)", format, errors)
            } else {
                format.to_string()
            }
        }
        (None, Some(format)) => format.to_string(),
        _ => "unknown".to_string(),
    }
}

fn describe_image(file: &ScannedFile) -> String {
    match (&file.image, file.is_corrupted) {
        (Some(image), _) => format!(
            " {}x{}x{}",
            image.width, image.height, image.channels
        ),
        (None, true) => " (corrupted)".to_string(),
        (None, false) => String::new(),
    }
}

fn print_text_scan(report: &ScanReport) {
    println!("\n{}", "═".repeat(60));
    println!("{}", "  DATASET SCAN".bold());
    println!("{}", "═".repeat(60));
    println!("\n  Root: {}\n", report.root.display());

    for file in &report.files {
        let mark = if file.is_valid() {
            "✓".green().bold()
        } else {
            "✗".red().bold()
        };
        let detail = format!("{}{}", describe(file), describe_image(file));
        let detail = if file.is_valid() {
            detail.normal()
        } else {
            detail.red()
        };
        println!(
            "  {} {} [{}] {}",
            mark, file.relative_path, file.split, detail
        );
    }

    println!("\n{}", "Summary:".bold());
    println!("  Files:   {}", report.files.len());
    println!("  Invalid: {}", report.invalid_count());
    for (split, count) in report.by_split() {
        println!("  {:<8} {}", format!("{}:", split), count);
    }
    println!("{}", "═".repeat(60));
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
