//! Document model consumed by the index.
//!
//! Documents are owned by a [`DocumentProvider`]; the engine only keeps
//! shared [`DocHandle`]s to them and never edits their content except
//! through [`Document::redo_ocr`] and the label operations.

use std::{cmp::Ordering, fmt, sync::Arc};

use crate::error::{Error, Result};

/// A single page and its extracted text (possibly empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based position of the page inside its document.
    pub number: usize,
    pub text: String,
}

/// A user-assigned tag. Documents hold a set of these; order is irrelevant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    pub name: String,
    pub color: Option<String>,
}

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Check that the label survives the `name,color` line format and the
    /// comma-joined index field.
    ///
    /// Names must be non-blank and free of commas and line breaks; colors
    /// must be free of line breaks.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(Error::Config(format!("invalid label {:?}: {reason}", self.name)))
        };
        if self.name.trim().is_empty() {
            return invalid("name is blank");
        }
        if self.name.contains(',') {
            return invalid("name contains a comma");
        }
        if self.name.contains(['\n', '\r']) {
            return invalid("name contains a line break");
        }
        if let Some(color) = &self.color
            && color.contains(['\n', '\r'])
        {
            return invalid("color contains a line break");
        }
        Ok(())
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The storage layout a document was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Pdf,
    Image,
}

impl DocumentKind {
    /// Kinds in detection priority order; the first match wins.
    pub const PRIORITY: [DocumentKind; 2] =
        [DocumentKind::Pdf, DocumentKind::Image];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Image => "image",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scanned document as seen by the index.
pub trait Document: Send + Sync + fmt::Debug {
    /// Stable identifier derived from the document's storage location.
    fn id(&self) -> &str;

    fn kind(&self) -> DocumentKind;

    fn pages(&self) -> Result<Vec<Page>>;

    fn labels(&self) -> Result<Vec<Label>>;

    /// Last modification time, in seconds since the Unix epoch.
    fn last_modified(&self) -> Result<u64>;

    /// Re-run OCR on every page, replacing the page text in place.
    ///
    /// Blocks until done. Failures are reported per document as
    /// [`Error::OcrFailure`](crate::Error::OcrFailure).
    fn redo_ocr(&self, language: &str) -> Result<()>;

    /// Add `label`, or replace the existing label with the same name.
    fn add_label(&self, label: &Label) -> Result<()>;

    /// Remove the label called `name`. Returns whether it was present.
    fn remove_label(&self, name: &str) -> Result<bool>;
}

pub type DocHandle = Arc<dyn Document>;

/// Outcome of mapping an identifier to a concrete document.
#[derive(Debug, Clone)]
pub enum Resolution {
    Recognized(DocHandle),
    /// The identifier exists but matches no known document layout.
    Unrecognized,
}

/// Source of documents under a single document root.
pub trait DocumentProvider: Send + Sync {
    /// Every document identifier currently present under the root.
    fn list_document_ids(&self) -> Result<Vec<String>>;

    fn resolve(&self, docid: &str) -> Result<Resolution>;
}

/// Total order used for listings: by identifier, which encodes the scan
/// date for documents created by the scanner.
pub fn compare_documents(a: &DocHandle, b: &DocHandle) -> Ordering {
    a.id().cmp(b.id())
}

/// Concatenate page texts and trim surrounding whitespace.
pub fn full_text(pages: &[Page]) -> String {
    let joined = pages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    joined.trim().to_string()
}

/// Render labels as the comma-joined form stored in the index.
///
/// Names are sorted so that unchanged label sets always serialize the same.
pub fn join_labels(labels: &[Label]) -> String {
    let mut names: Vec<&str> = labels.iter().map(|l| l.name.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    names.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: usize, text: &str) -> Page {
        Page {
            number,
            text: text.to_string(),
        }
    }

    #[test]
    fn full_text_trims() {
        let pages = vec![page(1, "  invoice\n"), page(2, "total 42  ")];
        assert_eq!(full_text(&pages), "invoice\n\ntotal 42");
    }

    #[test]
    fn full_text_of_blank_pages_is_empty() {
        let pages = vec![page(1, "  "), page(2, "\n\t")];
        assert!(full_text(&pages).is_empty());
        assert!(full_text(&[]).is_empty());
    }

    #[test]
    fn labels_join_sorted_and_unique() {
        let labels = vec![
            Label::new("taxes"),
            Label::new("bank").with_color("#ff0000"),
            Label::new("taxes"),
        ];
        assert_eq!(join_labels(&labels), "bank,taxes");
        assert_eq!(join_labels(&[]), "");
    }

    #[test]
    fn label_names_reject_separators() {
        assert!(Label::new("bills").validate().is_ok());
        assert!(Label::new("bills").with_color("#ff0000").validate().is_ok());
        assert!(matches!(
            Label::new("bills, 2023").validate(),
            Err(Error::Config(_))
        ));
        assert!(Label::new("two\nlines").validate().is_err());
        assert!(Label::new("  ").validate().is_err());
        assert!(Label::new("ok").with_color("red\n").validate().is_err());
    }

    #[test]
    fn kind_priority_prefers_pdf() {
        assert_eq!(DocumentKind::PRIORITY[0], DocumentKind::Pdf);
        assert_eq!(DocumentKind::Image.to_string(), "image");
    }
}
