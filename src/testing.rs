//! In-memory documents and provider for unit tests.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        RwLock,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

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

/// Tracks how many OCR jobs run at once and which documents ran.
#[derive(Debug, Default)]
pub struct OcrProbe {
    active: AtomicUsize,
    peak: AtomicUsize,
    completed: Mutex<Vec<String>>,
}

impl OcrProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self, docid: &str) {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(docid.to_string());
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest number of simultaneously running jobs seen.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Jobs running right now.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Docids of finished jobs, in completion order.
    pub fn completed(&self) -> Vec<String> {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug)]
pub struct MemoryDocument {
    id: String,
    pages: RwLock<Vec<String>>,
    labels: RwLock<Vec<Label>>,
    last_modified: AtomicU64,
    ocr_text: Option<String>,
    ocr_delay: Duration,
    fail_ocr: bool,
    panic_ocr: bool,
    reject_label: Option<String>,
    probe: Option<Arc<OcrProbe>>,
}

impl MemoryDocument {
    pub fn new(id: &str, pages: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            pages: RwLock::new(pages.iter().map(|p| p.to_string()).collect()),
            labels: RwLock::new(Vec::new()),
            last_modified: AtomicU64::new(1),
            ocr_text: None,
            ocr_delay: Duration::ZERO,
            fail_ocr: false,
            panic_ocr: false,
            reject_label: None,
            probe: None,
        }
    }

    pub fn with_labels(self, names: &[&str]) -> Self {
        *self.labels.write().unwrap_or_else(PoisonError::into_inner) =
            names.iter().map(|n| Label::new(*n)).collect();
        self
    }

    pub fn with_modified(self, secs: u64) -> Self {
        self.last_modified.store(secs, Ordering::SeqCst);
        self
    }

    /// Text every page receives when OCR runs.
    pub fn with_ocr_text(mut self, text: &str) -> Self {
        self.ocr_text = Some(text.to_string());
        self
    }

    pub fn with_ocr_delay(mut self, delay: Duration) -> Self {
        self.ocr_delay = delay;
        self
    }

    pub fn failing_ocr(mut self) -> Self {
        self.fail_ocr = true;
        self
    }

    /// OCR panics instead of returning.
    pub fn panicking_ocr(mut self) -> Self {
        self.panic_ocr = true;
        self
    }

    /// `add_label` fails for this label name.
    pub fn rejecting_label(mut self, name: &str) -> Self {
        self.reject_label = Some(name.to_string());
        self
    }

    pub fn with_probe(mut self, probe: Arc<OcrProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Replace page texts, bumping the modification time.
    pub fn set_pages(&self, pages: &[&str]) {
        *self.pages.write().unwrap_or_else(PoisonError::into_inner) =
            pages.iter().map(|p| p.to_string()).collect();
        self.last_modified.fetch_add(1, Ordering::SeqCst);
    }
}

impl Document for MemoryDocument {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> DocumentKind {
        DocumentKind::Image
    }

    fn pages(&self) -> Result<Vec<Page>> {
        Ok(self
            .pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .enumerate()
            .map(|(i, text)| Page {
                number: i + 1,
                text: text.clone(),
            })
            .collect())
    }

    fn labels(&self) -> Result<Vec<Label>> {
        Ok(self
            .labels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn last_modified(&self) -> Result<u64> {
        Ok(self.last_modified.load(Ordering::SeqCst))
    }

    fn redo_ocr(&self, _language: &str) -> Result<()> {
        if self.panic_ocr {
            panic!("OCR engine aborted on {}", self.id);
        }
        if let Some(probe) = &self.probe {
            probe.enter();
        }
        if !self.ocr_delay.is_zero() {
            thread::sleep(self.ocr_delay);
        }
        if let Some(text) = &self.ocr_text
            && !self.fail_ocr
        {
            let mut pages =
                self.pages.write().unwrap_or_else(PoisonError::into_inner);
            for page in pages.iter_mut() {
                page.clone_from(text);
            }
            self.last_modified.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(probe) = &self.probe {
            probe.exit(&self.id);
        }

        if self.fail_ocr {
            return Err(Error::OcrFailure {
                docid: self.id.clone(),
                reason: "engine crashed".into(),
            });
        }
        Ok(())
    }

    fn add_label(&self, label: &Label) -> Result<()> {
        if self.reject_label.as_deref() == Some(label.name.as_str()) {
            return Err(Error::Config(format!("label {} refused", label.name)));
        }
        let mut labels =
            self.labels.write().unwrap_or_else(PoisonError::into_inner);
        labels.retain(|l| l.name != label.name);
        labels.push(label.clone());
        Ok(())
    }

    fn remove_label(&self, name: &str) -> Result<bool> {
        let mut labels =
            self.labels.write().unwrap_or_else(PoisonError::into_inner);
        let before = labels.len();
        labels.retain(|l| l.name != name);
        Ok(labels.len() != before)
    }
}

/// Provider over a fixed set of in-memory documents.
///
/// Identifiers registered with [`MemoryProvider::insert_unrecognized`] are
/// listed but never resolve.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    docs: RwLock<BTreeMap<String, Option<DocHandle>>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, doc: impl Document + 'static) -> DocHandle {
        let handle: DocHandle = Arc::new(doc);
        self.docs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.id().to_string(), Some(Arc::clone(&handle)));
        handle
    }

    pub fn insert_unrecognized(&self, id: &str) {
        self.docs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), None);
    }

    pub fn remove(&self, id: &str) {
        self.docs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }
}

impl DocumentProvider for MemoryProvider {
    fn list_document_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .docs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }

    fn resolve(&self, docid: &str) -> Result<Resolution> {
        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(match docs.get(docid) {
            Some(Some(doc)) => Resolution::Recognized(Arc::clone(doc)),
            _ => Resolution::Unrecognized,
        })
    }
}
