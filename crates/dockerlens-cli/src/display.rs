use colored::*;
use dockerlens_core::analyzer::report::{Finding, Recommendation, Report, ScanStatus, Severity};
use dockerlens_core::docker::{ContainerError, ContainerInfo};
use similar::{ChangeTag, TextDiff};

/// Print a full analysis report to the terminal.
pub fn print_report(report: &Report, source: &str) {
    println!();
    println!(
        "{}",
        format!(
            " dockerlens v{} — Analysis of {}",
            env!("CARGO_PKG_VERSION"),
            source
        )
        .bold()
    );
    println!();

    println!(" {}", "Summary".bold().underline());
    if report.is_static != Some(true) {
        println!(
            " {} Image size: {:.1} MB",
            "|-".dimmed(),
            report.summary.image_size_mb
        );
    }
    println!(" {} Layers: {}", "|-".dimmed(), report.summary.layer_count);
    println!(
        " {} Base image: {}",
        "|-".dimmed(),
        report.image_analysis.base_image.cyan()
    );
    println!(" {} Runtime: {}", "|-".dimmed(), report.runtime.as_str().cyan());
    println!(
        " {} Runs as root: {}",
        "|-".dimmed(),
        if report.summary.runs_as_root {
            "yes".red().bold().to_string()
        } else {
            "no".green().to_string()
        }
    );
    println!(
        " {} Security scan: {}",
        "|-".dimmed(),
        scan_status_label(report.summary.security_scan_status)
    );
    println!();

    println!(" {}", "=".repeat(60).dimmed());
    println!();

    if report.findings.is_empty() {
        println!(
            " {} No issues found. This build definition looks clean!",
            "OK".green().bold()
        );
    } else {
        for finding in &report.findings {
            print_finding(finding);
            println!();
        }
    }

    println!(" {}", "=".repeat(60).dimmed());
    println!();

    match &report.recommendation {
        Recommendation::Ai(rec) => {
            println!(" {}", "AI-optimized Dockerfile available".bold().underline());
            for line in &rec.explanation {
                println!(" {} {}", "|-".dimmed(), line);
            }
        }
        Recommendation::Suggested(s) => {
            println!(" {}", "Suggested hardened Dockerfile".bold().underline());
            for line in &s.explanation {
                println!(" {} {}", "|-".dimmed(), line);
            }
            println!(" {} {}", "|-".dimmed(), s.disclaimer.dimmed());
        }
    }
    println!();
    println!(
        " Run {} to print the full suggestion",
        format!("dockerlens suggest {}", source).cyan()
    );
    println!();
}

fn print_finding(finding: &Finding) {
    let severity = severity_label(finding.severity);
    println!(" {} [{}] {}", severity, finding.id.dimmed(), finding.message.bold());
    println!("   {} {}", "|".dimmed(), finding.recommendation);
}

fn severity_label(severity: Severity) -> String {
    match severity {
        Severity::Critical => "CRITICAL".red().bold().to_string(),
        Severity::High => "HIGH".red().to_string(),
        Severity::Medium => "MEDIUM".yellow().to_string(),
        Severity::Low => "LOW".blue().to_string(),
    }
}

fn scan_status_label(status: ScanStatus) -> String {
    match status {
        ScanStatus::Ok => "ok".green().to_string(),
        ScanStatus::Error => "error".red().to_string(),
        ScanStatus::Skipped => "skipped".dimmed().to_string(),
    }
}

/// Print a diff between the original and suggested Dockerfile.
pub fn print_diff(original: &str, suggested: &str, filename: &str) {
    println!();
    println!("{}", format!(" dockerlens — Diff for {}", filename).bold());
    println!();

    let diff = TextDiff::from_lines(original, suggested);
    let mut has_changes = false;

    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Delete => {
                has_changes = true;
                print!("{}", format!("- {}", change).red());
            }
            ChangeTag::Insert => {
                has_changes = true;
                print!("{}", format!("+ {}", change).green());
            }
            ChangeTag::Equal => {
                print!("  {}", change);
            }
        }
    }

    if !has_changes {
        println!(" {}", "No changes suggested.".green());
    }
    println!();
}

/// Print the container listing, successes first, then per-item failures.
pub fn print_containers(containers: &[ContainerInfo], errors: &[ContainerError]) {
    println!();
    println!(
        " {:<14} {:<24} {:<30} {:>12} {:>12}",
        "ID".bold(),
        "NAME".bold(),
        "IMAGE".bold(),
        "IMAGE MB".bold(),
        "MEM MB".bold()
    );
    for c in containers {
        println!(
            " {:<14} {:<24} {:<30} {:>12.1} {:>12.1}",
            c.id, c.name, c.image, c.image_size_mb, c.memory_usage_mb
        );
    }

    if !errors.is_empty() {
        println!();
        println!(" {}", "Some containers could not be inspected:".yellow());
        for e in errors {
            println!(" {} {}: {}", "|-".dimmed(), e.name, e.error);
        }
    }
    println!();
}
