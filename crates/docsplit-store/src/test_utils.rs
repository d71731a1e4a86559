//! Fixtures for tests in this and dependent crates.

use std::path::{Path, PathBuf};

use docsplit_core::PageRange;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

use crate::StoreError;
use crate::pages::{PageStore, PageWriter};

#[derive(Debug, Clone, Copy)]
pub enum TestPage<'a> {
    Text(&'a str),
    /// No text and nothing drawn.
    Blank,
    /// No text but a drawn image XObject, as on a scanned page.
    Image,
}

/// A PDF with one Helvetica text line per page.
pub fn text_pdf(pages: &[&str]) -> Vec<u8> {
    let pages: Vec<TestPage> = pages.iter().map(|&t| TestPage::Text(t)).collect();
    test_pdf(&pages)
}

pub fn test_pdf(pages: &[TestPage]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 1,
            "Height" => 1,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        vec![0x80],
    ));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
        "XObject" => dictionary! { "Im1" => image_id },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let operations = match page {
            TestPage::Text(text) => vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
            TestPage::Blank => vec![],
            TestPage::Image => vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        612.into(),
                        0.into(),
                        0.into(),
                        792.into(),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec!["Im1".into()]),
                Operation::new("Q", vec![]),
            ],
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode test content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save test pdf");
    bytes
}

/// Write `pages` as a text PDF at `dir/name`.
pub fn write_text_pdf(dir: &Path, name: &str, pages: &[&str]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text_pdf(pages)).expect("write test pdf");
    path
}

/// In-memory page source. `write_subset` returns a marker naming the range.
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    path: PathBuf,
    pages: Vec<String>,
}

impl MemoryDocument {
    pub fn new(path: impl Into<PathBuf>, pages: &[&str]) -> Self {
        Self {
            path: path.into(),
            pages: pages.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// `count` pages whose text is `page <n>`.
    pub fn numbered(path: impl Into<PathBuf>, count: u32) -> Self {
        Self {
            path: path.into(),
            pages: (1..=count).map(|n| format!("page {n}")).collect(),
        }
    }
}

impl PageStore for MemoryDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn text(&self, page: u32) -> String {
        page.checked_sub(1)
            .and_then(|i| self.pages.get(i as usize))
            .cloned()
            .unwrap_or_default()
    }
}

impl PageWriter for MemoryDocument {
    fn source_path(&self) -> &Path {
        &self.path
    }

    fn write_subset(&self, range: PageRange) -> Result<Vec<u8>, StoreError> {
        let total = self.page_count();
        if !range.fits(total) {
            return Err(StoreError::InvalidRange {
                start: range.start,
                end: range.end,
                total,
            });
        }
        Ok(format!("pages {range}").into_bytes())
    }
}
