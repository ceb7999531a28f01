//! Filesystem-backed documents.
//!
//! Layout under the document root:
//!
//! ```text
//! <root>/<docid>/paper.1.jpg    page images (jpg or png)
//! <root>/<docid>/paper.1.txt    OCR text of page 1
//! <root>/<docid>/doc.pdf        marks a PDF document
//! <root>/<docid>/labels         one "name,color" line per label
//! ```

use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Command,
    sync::Arc,
    time::SystemTime,
};

use tracing::debug;

use crate::{
    document::{
        DocHandle,
        Document,
        DocumentKind,
        DocumentProvider,
        Label,
        Page,
        Resolution,
    },
    error::{Error, Result},
};

const PDF_FILE: &str = "doc.pdf";
const LABELS_FILE: &str = "labels";
const PAGE_PREFIX: &str = "paper.";
const TEXT_EXTENSION: &str = "txt";
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Turns a page image into text.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &Path, language: &str) -> Result<String>;
}

/// Runs the `tesseract` command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    program: PathBuf,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self {
            program: PathBuf::from("tesseract"),
        }
    }
}

impl TesseractOcr {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &Path, language: &str) -> Result<String> {
        let output = Command::new(&self.program)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Io(std::io::Error::other(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            ))));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Documents stored as one directory each under a common root.
pub struct FsProvider {
    root: PathBuf,
    kinds: Vec<DocumentKind>,
    ocr: Arc<dyn OcrEngine>,
}

impl FsProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_ocr_engine(root, Arc::new(TesseractOcr::default()))
    }

    pub fn with_ocr_engine(
        root: impl Into<PathBuf>,
        ocr: Arc<dyn OcrEngine>,
    ) -> Self {
        Self {
            root: root.into(),
            kinds: DocumentKind::PRIORITY.to_vec(),
            ocr,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn detect_kind(&self, dir: &Path) -> Result<Option<DocumentKind>> {
        for kind in &self.kinds {
            if kind_matches(*kind, dir)? {
                return Ok(Some(*kind));
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for FsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsProvider")
            .field("root", &self.root)
            .field("kinds", &self.kinds)
            .finish_non_exhaustive()
    }
}

impl DocumentProvider for FsProvider {
    /// Non-hidden subdirectories of the root, sorted by name.
    fn list_document_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            if entry.path().is_dir() {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn resolve(&self, docid: &str) -> Result<Resolution> {
        let dir = self.root.join(docid);
        if !dir.is_dir() {
            return Ok(Resolution::Unrecognized);
        }

        let Some(kind) = self.detect_kind(&dir)? else {
            return Ok(Resolution::Unrecognized);
        };

        let doc: DocHandle = Arc::new(FsDocument {
            id: docid.to_string(),
            dir,
            kind,
            ocr: Arc::clone(&self.ocr),
        });
        Ok(Resolution::Recognized(doc))
    }
}

fn kind_matches(kind: DocumentKind, dir: &Path) -> Result<bool> {
    match kind {
        DocumentKind::Pdf => Ok(dir.join(PDF_FILE).is_file()),
        DocumentKind::Image => {
            for entry in std::fs::read_dir(dir)? {
                let name = entry?.file_name().to_string_lossy().to_string();
                if let Some((_, ext)) = parse_page_file(&name)
                    && is_image_extension(ext)
                {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// Split `paper.<n>.<ext>` into its page number and extension.
fn parse_page_file(name: &str) -> Option<(usize, &str)> {
    let rest = name.strip_prefix(PAGE_PREFIX)?;
    let (number, ext) = rest.split_once('.')?;
    let number = number.parse::<usize>().ok().filter(|n| *n > 0)?;
    Some((number, ext))
}

fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

fn mtime_secs(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)?
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs())
}

/// A document directory on disk.
pub struct FsDocument {
    id: String,
    dir: PathBuf,
    kind: DocumentKind,
    ocr: Arc<dyn OcrEngine>,
}

impl std::fmt::Debug for FsDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsDocument")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl FsDocument {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Page number -> image path, for every page that has an image.
    fn page_images(&self) -> Result<BTreeMap<usize, PathBuf>> {
        let mut images = BTreeMap::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some((number, ext)) = parse_page_file(&name)
                && is_image_extension(ext)
            {
                images.insert(number, entry.path());
            }
        }
        Ok(images)
    }

    fn page_count(&self) -> Result<usize> {
        let mut count = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if let Some((number, ext)) = parse_page_file(&name) {
                let counts = match self.kind {
                    DocumentKind::Pdf => ext == TEXT_EXTENSION,
                    DocumentKind::Image => {
                        ext == TEXT_EXTENSION || is_image_extension(ext)
                    }
                };
                if counts {
                    count = count.max(number);
                }
            }
        }
        Ok(count)
    }

    fn text_path(&self, number: usize) -> PathBuf {
        self.dir
            .join(format!("{PAGE_PREFIX}{number}.{TEXT_EXTENSION}"))
    }

    fn read_page_text(&self, number: usize) -> Result<String> {
        match std::fs::read_to_string(self.text_path(number)) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_labels(&self, labels: &[Label]) -> Result<()> {
        let mut out = String::new();
        for label in labels {
            out.push_str(&label.name);
            out.push(',');
            out.push_str(label.color.as_deref().unwrap_or_default());
            out.push('\n');
        }
        std::fs::write(self.dir.join(LABELS_FILE), out)?;
        Ok(())
    }

    fn ocr_failure(&self, reason: impl ToString) -> Error {
        Error::OcrFailure {
            docid: self.id.clone(),
            reason: reason.to_string(),
        }
    }
}

impl Document for FsDocument {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> DocumentKind {
        self.kind
    }

    fn pages(&self) -> Result<Vec<Page>> {
        (1..=self.page_count()?)
            .map(|number| {
                Ok(Page {
                    number,
                    text: self.read_page_text(number)?,
                })
            })
            .collect()
    }

    fn labels(&self) -> Result<Vec<Label>> {
        let raw = match std::fs::read_to_string(self.dir.join(LABELS_FILE)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        Ok(raw
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() {
                    return None;
                }
                let (name, color) = match line.split_once(',') {
                    Some((name, color)) => (name.trim(), color.trim()),
                    None => (line, ""),
                };
                let label = Label::new(name);
                Some(if color.is_empty() {
                    label
                } else {
                    label.with_color(color)
                })
            })
            .collect())
    }

    fn last_modified(&self) -> Result<u64> {
        let mut newest = mtime_secs(&self.dir)?;
        for entry in std::fs::read_dir(&self.dir)? {
            newest = newest.max(mtime_secs(&entry?.path())?);
        }
        Ok(newest)
    }

    fn redo_ocr(&self, language: &str) -> Result<()> {
        if self.kind == DocumentKind::Pdf {
            return Err(self.ocr_failure("PDF documents carry their own text"));
        }

        let images = self.page_images().map_err(|e| self.ocr_failure(e))?;
        for (number, image) in images {
            debug!(docid = %self.id, page = number, "running OCR");
            let text = self
                .ocr
                .recognize(&image, language)
                .map_err(|e| self.ocr_failure(e))?;
            std::fs::write(self.text_path(number), text)
                .map_err(|e| self.ocr_failure(e))?;
        }
        Ok(())
    }

    fn add_label(&self, label: &Label) -> Result<()> {
        label.validate()?;
        let mut labels = self.labels()?;
        labels.retain(|l| l.name != label.name);
        labels.push(label.clone());
        self.write_labels(&labels)
    }

    fn remove_label(&self, name: &str) -> Result<bool> {
        let mut labels = self.labels()?;
        let before = labels.len();
        labels.retain(|l| l.name != name);
        if labels.len() == before {
            return Ok(false);
        }
        self.write_labels(&labels)?;
        Ok(true)
    }
}
