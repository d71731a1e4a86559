//! File and directory naming for extracted documents.
//!
//! Classifier output is untrusted: a suggested filename or document type may
//! contain path separators, reserved characters or `..`. Everything that
//! becomes a path component goes through [`sanitize_component`] first.
//!
//! # Names
//!
//! - classified span, no suggestion: `<source-stem>_pages_<start>-<end>.pdf`
//! - unclaimed group: `unorganized_pages_<first>-<last>.pdf`
//! - collision suffix: `will.pdf` → `will_1.pdf` → `will_2.pdf`

use std::path::Path;

use crate::span::PageRange;

pub const PDF_EXTENSION: &str = "pdf";

const FALLBACK_NAME: &str = "untitled";

/// Default name for a span the classifier did not name.
pub fn default_filename(source_stem: &str, range: PageRange) -> String {
    format!(
        "{}_pages_{}-{}.{PDF_EXTENSION}",
        sanitize_component(source_stem),
        range.start,
        range.end
    )
}

/// Name for a group of unclaimed pages.
pub fn unorganized_filename(range: PageRange) -> String {
    format!("unorganized_pages_{}-{}.{PDF_EXTENSION}", range.start, range.end)
}

/// File stem of a source document, or `document` when it has none.
pub fn source_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document")
        .to_string()
}

/// Make a single path component safe.
///
/// Replaces separators, reserved characters and control characters with `_`,
/// then strips leading/trailing dots and whitespace. Returns `untitled` when
/// nothing is left.
pub fn sanitize_component(s: &str) -> String {
    let replaced: String = s
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Reduce a classifier-suggested filename to a safe PDF file name.
///
/// Only the last path segment is kept and `.pdf` is appended when the name
/// does not already end in it (case-insensitive).
pub fn sanitize_filename(suggested: &str) -> String {
    let last = suggested
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(suggested);
    let name = sanitize_component(last);

    let has_pdf_ext = name
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case(PDF_EXTENSION));
    if has_pdf_ext {
        name
    } else {
        format!("{name}.{PDF_EXTENSION}")
    }
}

/// Insert a numeric suffix before the extension: `will.pdf`, 2 → `will_2.pdf`.
pub fn with_suffix(filename: &str, n: u32) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{n}.{ext}"),
        _ => format!("{filename}_{n}"),
    }
}
