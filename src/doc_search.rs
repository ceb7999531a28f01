use std::{path::Path, sync::Arc};

use crate::{
    doc_table::DocumentTable,
    document::{DocHandle, DocumentProvider, Label},
    error::Result,
    index_store::IndexStore,
    labels,
    ocr::{self, OcrReport},
    progress::ProgressFn,
    query,
    suggest::{self, SpellingCorrector},
    sync::{self, RecordOutcome, SyncReport},
};

/// Keyword index over a document collection.
///
/// Owns the index store and the in-memory document table, and ties them to
/// a [`DocumentProvider`]. Opening runs a full synchronization pass.
pub struct DocSearch {
    provider: Arc<dyn DocumentProvider>,
    store: IndexStore,
    table: DocumentTable,
}

impl DocSearch {
    /// Open (or create) the index in `index_dir` and synchronize it.
    pub fn open(
        provider: Arc<dyn DocumentProvider>,
        index_dir: &Path,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Self> {
        let store = IndexStore::open_or_create(index_dir)?;
        Self::with_store(provider, store, progress)
    }

    pub fn with_store(
        provider: Arc<dyn DocumentProvider>,
        store: IndexStore,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Self> {
        let search = Self {
            provider,
            store,
            table: DocumentTable::new(),
        };
        search.synchronize(progress)?;
        Ok(search)
    }

    /// Full pass over the collection; rebuilds the document table.
    pub fn synchronize(&self, progress: &mut ProgressFn<'_>) -> Result<SyncReport> {
        sync::full_pass(&self.store, self.provider.as_ref(), &self.table, progress)
    }

    /// Reindex one document, e.g. after a page was added or re-OCR'd.
    pub fn index_document(&self, doc: &DocHandle) -> Result<RecordOutcome> {
        let outcome = sync::index_document(&self.store, doc.as_ref())?;
        self.table.insert(DocHandle::clone(doc));
        Ok(outcome)
    }

    pub fn find_all(&self) -> Result<Vec<DocHandle>> {
        query::find_all(&self.store, &self.table)
    }

    pub fn find(&self, query_text: &str) -> Result<Vec<DocHandle>> {
        query::find(&self.store, &self.table, query_text)
    }

    /// Spelling-corrected alternatives that each match at least one document.
    pub fn suggest(&self, query_text: &str) -> Result<Vec<String>> {
        let corrector = self.store.corrector();
        self.suggest_with(&corrector, query_text)
    }

    pub fn suggest_with(
        &self,
        corrector: &dyn SpellingCorrector,
        query_text: &str,
    ) -> Result<Vec<String>> {
        suggest::suggest(&self.store, &self.table, corrector, query_text)
    }

    pub fn document(&self, docid: &str) -> Option<DocHandle> {
        self.table.get(docid)
    }

    pub fn label_list(&self) -> Vec<Label> {
        labels::label_list(&self.table)
    }

    pub fn add_label(
        &self,
        doc: &DocHandle,
        label: &Label,
    ) -> Result<RecordOutcome> {
        labels::add_label(&self.store, doc, label)
    }

    pub fn update_label(
        &self,
        old: &str,
        new: &Label,
        progress: &mut ProgressFn<'_>,
    ) -> Result<usize> {
        labels::update_label(&self.store, &self.table, old, new, progress)
    }

    pub fn destroy_label(
        &self,
        name: &str,
        progress: &mut ProgressFn<'_>,
    ) -> Result<usize> {
        labels::destroy_label(&self.store, &self.table, name, progress)
    }

    /// Re-run OCR over the whole collection.
    ///
    /// The index is left untouched; call [`DocSearch::synchronize`]
    /// afterwards to pick up the new text.
    pub fn redo_ocr(
        &self,
        language: &str,
        max_workers: usize,
        progress: &mut ProgressFn<'_>,
    ) -> Result<OcrReport> {
        ocr::redo_ocr_all(self.provider.as_ref(), language, max_workers, progress)
    }

    /// Whether a search hit referenced a document missing from the table
    /// since the last synchronization.
    pub fn needs_resync(&self) -> bool {
        self.table.is_stale()
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn document_count(&self) -> usize {
        self.table.len()
    }
}

impl std::fmt::Debug for DocSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocSearch")
            .field("store", &self.store)
            .field("documents", &self.table.len())
            .finish_non_exhaustive()
    }
}
