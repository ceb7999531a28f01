use std::{
    collections::HashMap,
    sync::{
        Arc,
        PoisonError,
        RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::document::DocHandle;

pub type DocMap = HashMap<String, DocHandle>;

/// In-memory docid -> document table.
///
/// The map is never edited in place: every change builds a new map and
/// swaps the shared pointer, so readers holding a [`snapshot`] see either
/// the old or the new table in full.
///
/// [`snapshot`]: DocumentTable::snapshot
#[derive(Debug, Default)]
pub struct DocumentTable {
    current: RwLock<Arc<DocMap>>,
    stale: AtomicBool,
}

impl DocumentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<DocMap> {
        Arc::clone(
            &self.current.read().unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Swap in a freshly built table and clear the stale flag.
    pub fn replace(&self, docs: DocMap) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(docs);
        self.stale.store(false, Ordering::Release);
    }

    /// Copy-on-write insert of a single document.
    pub fn insert(&self, doc: DocHandle) {
        let mut guard =
            self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = DocMap::clone(&guard);
        next.insert(doc.id().to_string(), doc);
        *guard = Arc::new(next);
    }

    pub fn get(&self, docid: &str) -> Option<DocHandle> {
        self.snapshot().get(docid).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Record that the index and this table disagree.
    pub fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }

    /// Whether a lookup fault was seen since the last full rebuild.
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryDocument;

    fn doc(id: &str) -> DocHandle {
        Arc::new(MemoryDocument::new(id, &["text"]))
    }

    #[test]
    fn snapshot_survives_replace() {
        let table = DocumentTable::new();
        table.replace(DocMap::from([("a".to_string(), doc("a"))]));

        let before = table.snapshot();
        table.replace(DocMap::from([("b".to_string(), doc("b"))]));

        assert!(before.contains_key("a"));
        assert!(!before.contains_key("b"));
        assert!(table.get("b").is_some());
        assert!(table.get("a").is_none());
    }

    #[test]
    fn insert_copies_on_write() {
        let table = DocumentTable::new();
        let before = table.snapshot();
        table.insert(doc("a"));

        assert!(before.is_empty());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn replace_clears_stale_flag() {
        let table = DocumentTable::new();
        assert!(!table.is_stale());
        table.mark_stale();
        assert!(table.is_stale());
        table.replace(DocMap::new());
        assert!(!table.is_stale());
    }
}
