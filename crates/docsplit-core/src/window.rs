//! Page-tagged window text.
//!
//! Each page is introduced by a `[PAGE n]` line carrying its absolute page
//! number, so a classifier can answer in document coordinates:
//!
//! ```text
//! [PAGE 4]
//! LAST WILL AND TESTAMENT ...
//!
//! [PAGE 5]
//! ...
//! ```

/// Render the tag line for one page.
pub fn page_tag(page: u32) -> String {
    format!("[PAGE {page}]")
}

/// Concatenate `(page_number, text)` pairs into window text.
pub fn build_window_text<'a>(pages: impl IntoIterator<Item = (u32, &'a str)>) -> String {
    pages
        .into_iter()
        .map(|(page, text)| format!("{}\n{}", page_tag(page), text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Split window text back into `(page_number, text)` pairs.
///
/// Text before the first tag is ignored. Page bodies are trimmed. After the
/// first tag only the next consecutive page number starts a new page; any
/// other tag-shaped line is body text.
pub fn split_window_text(text: &str) -> Vec<(u32, &str)> {
    let mut pages = Vec::new();
    let mut current: Option<(u32, usize)> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let expected = current.map(|(page, _)| page.saturating_add(1));
        let tag = parse_page_tag(line.trim_end())
            .filter(|&page| expected.is_none_or(|next| page == next));
        if let Some(page) = tag {
            if let Some((prev, start)) = current.take() {
                pages.push((prev, text[start..offset].trim()));
            }
            current = Some((page, offset + line.len()));
        }
        offset += line.len();
    }
    if let Some((page, start)) = current {
        pages.push((page, text[start..].trim()));
    }
    pages
}

fn parse_page_tag(line: &str) -> Option<u32> {
    line.strip_prefix("[PAGE ")?
        .strip_suffix(']')?
        .trim()
        .parse()
        .ok()
}
