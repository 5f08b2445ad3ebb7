//! Human-readable summaries printed after each command.
//!
//! Subprocess output goes straight to stdout/stderr while stages run; these
//! helpers only print before the first stage or after the last one, so they
//! never interleave with forwarded lines.

use crate::config::Config;
use crate::coverage::CoverageSummary;
use crate::pipeline::PipelineReport;
use crate::select::{Selection, SourceFile};
use crate::ui::icons::{CHECK, COPY, CROSS, FILE_DEL, FOLDER, PROBE, PROGRESS, SPARKLE, WARNING};
use console::style;
use std::path::{Path, PathBuf};

/// Print the instrument/pass-through partition, grouped by root.
pub fn print_selection(config: &Config, selection: &Selection) {
    for rule in &config.rules {
        let root = rule.root();
        println!("{}{}", FOLDER, style(config.display_path(root)).bold());

        let in_root = |f: &&SourceFile| f.root() == root;
        let mut any = false;
        for file in selection.instrument.iter().filter(in_root) {
            println!("  {}{}", PROBE, file.relative_path().display());
            any = true;
        }
        for file in selection.pass_through.iter().filter(in_root) {
            println!(
                "  {}{} {}",
                COPY,
                style(file.relative_path().display()).dim(),
                style("(skipped)").dim()
            );
            any = true;
        }
        if !any {
            println!("  {}", style("no source files").dim());
        }
    }

    println!();
    println!(
        "{} to instrument, {} passed through",
        style(selection.instrument.len()).cyan(),
        style(selection.pass_through.len()).cyan()
    );
}

/// Print the end-of-run summary.
pub fn print_report(report: &PipelineReport, output: Option<&Path>) {
    let CoverageSummary {
        total_sites,
        hit_sites,
        total_hits,
    } = report.data.summary();

    println!();
    println!(
        "{}{}",
        CHECK,
        style("Coverage run complete").green().bold()
    );
    println!(
        "  {} instrumented, {} passed through, {} shadow files",
        report.instrumented,
        report.passed_through,
        report.shadow_files.len()
    );
    println!(
        "  {}{}/{} sites hit ({} hits)",
        PROGRESS,
        style(hit_sites).cyan(),
        total_sites,
        total_hits
    );
    println!(
        "  {} payload lines merged from {} output lines",
        report.stats.payload_lines, report.stats.lines
    );
    if report.stats.malformed_lines > 0 {
        println!(
            "  {}{} malformed payload lines skipped",
            WARNING,
            style(report.stats.malformed_lines).yellow()
        );
    }
    if let Some(path) = output {
        println!("  {}Coverage data written to {}", SPARKLE, path.display());
    }
}

/// Print an error and its cause chain to stderr.
pub fn print_failure(err: &anyhow::Error) {
    eprintln!();
    eprintln!("{}{}", CROSS, style("solcover failed").red().bold());
    for (depth, cause) in err.chain().enumerate() {
        if depth == 0 {
            eprintln!("  {}", cause);
        } else {
            eprintln!("  {} {}", style("caused by:").dim(), cause);
        }
    }
}

pub fn print_clean_result(config: &Config, removed: &[PathBuf]) {
    if removed.is_empty() {
        println!("No shadow files found");
        return;
    }
    for path in removed {
        println!("  {}{}", FILE_DEL, config.display_path(path));
    }
    println!("Removed {} shadow file(s)", removed.len());
}
