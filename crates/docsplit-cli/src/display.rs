//! Run summary printed after the pipeline finishes.
//!
//! Grouped sections with aligned labels; empty sections are skipped.

use std::path::Path;

use docsplit_core::group_consecutive;
use docsplit_engine::RunReport;

const LABEL_WIDTH: usize = 26;

/// Print the run summary to stdout.
pub fn print_report(report: &RunReport) {
    let mode = if report.dry_run { "dry run" } else { "write" };
    println!("=== docsplit run ({mode}) ===");
    println!(
        "  {:<LABEL_WIDTH$} {}",
        "started",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  {:<LABEL_WIDTH$} {:.1}s",
        "elapsed",
        (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0
    );
    println!("  {:<LABEL_WIDTH$} {}", "sources completed", report.sources.len());
    println!("  {:<LABEL_WIDTH$} {}", "documents", report.artifacts().count());
    println!();

    for source in &report.sources {
        println!("{}", file_name(&source.source));
        for artifact in &source.artifacts {
            let target = artifact
                .output_path
                .as_deref()
                .map_or_else(|| artifact.filename.clone(), |p| p.display().to_string());
            println!(
                "  {:<LABEL_WIDTH$} pages {:<9} {:.2}  {}",
                artifact.document_type,
                artifact.range().to_string(),
                artifact.confidence,
                target
            );
        }
        if !source.unprocessed_pages.is_empty() {
            println!(
                "  {:<LABEL_WIDTH$} {}",
                "unprocessed pages",
                format_pages(&source.unprocessed_pages)
            );
        }
        if !source.removed_blank_pages.is_empty() {
            println!(
                "  {:<LABEL_WIDTH$} {}",
                "blank pages removed",
                format_pages(&source.removed_blank_pages)
            );
        }
        if source.rejected_candidates > 0 {
            println!(
                "  {:<LABEL_WIDTH$} {}",
                "rejected candidates", source.rejected_candidates
            );
        }
        println!();
    }

    if !report.failures.is_empty() {
        println!("Failures");
        for failure in &report.failures {
            let range = failure
                .range
                .map(|r| format!(" (pages {r})"))
                .unwrap_or_default();
            println!("  {}{range}: {}", file_name(&failure.source), failure.cause);
        }
        println!();
    }

    if !report.interrupted.is_empty() {
        println!("Interrupted");
        for path in &report.interrupted {
            println!("  {}", file_name(path));
        }
        println!();
    }

    for sidecar in &report.sidecars {
        println!("Sidecar written to {}", sidecar.display());
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Compact page list: `[1, 2, 3, 7, 9, 10]` → `1-3, 7, 9-10`.
fn format_pages(pages: &[u32]) -> String {
    group_consecutive(pages.iter().copied())
        .iter()
        .map(|r| {
            if r.start == r.end {
                r.start.to_string()
            } else {
                r.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_collapse_to_ranges() {
        assert_eq!(format_pages(&[1, 2, 3, 7, 9, 10]), "1-3, 7, 9-10");
        assert_eq!(format_pages(&[4]), "4");
        assert_eq!(format_pages(&[]), "");
    }

    #[test]
    fn file_name_falls_back_to_path() {
        assert_eq!(file_name(Path::new("/in/estate.pdf")), "estate.pdf");
        assert_eq!(file_name(Path::new("/")), "/");
    }
}
