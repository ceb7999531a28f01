use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::{
    doc_table::{DocMap, DocumentTable},
    document::{DocHandle, Document, DocumentProvider, Resolution},
    error::{Error, Result},
    index_store::{IndexStore, IndexedRecord, StoreWriter},
    progress::{Phase, Progress, ProgressFn},
};

/// What happened to a single document's index record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Upserted,
    /// Blank text: any previous record was deleted.
    Removed,
}

/// Counters from a full synchronization pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Identifiers listed under the document root.
    pub listed: usize,
    pub indexed: usize,
    /// Documents with blank text (kept in the table, absent from the index).
    pub empty: usize,
    /// Unrecognized or unreadable documents.
    pub skipped: usize,
    /// Records dropped because their document no longer exists.
    pub purged: usize,
}

/// Stage the record for `doc` into an open transaction.
pub fn stage_document(
    writer: &mut StoreWriter<'_>,
    doc: &dyn Document,
) -> Result<RecordOutcome> {
    match IndexedRecord::from_document(doc)? {
        Some(record) => {
            debug!(docid = doc.id(), "reindexing");
            writer.upsert(&record)?;
            Ok(RecordOutcome::Upserted)
        }
        None => {
            debug!(docid = doc.id(), "no text, dropping from index");
            writer.delete(doc.id());
            Ok(RecordOutcome::Removed)
        }
    }
}

/// Reindex a single document in its own transaction.
pub fn index_document(
    store: &IndexStore,
    doc: &dyn Document,
) -> Result<RecordOutcome> {
    let mut writer = store.begin_write()?;
    let outcome = stage_document(&mut writer, doc)?;
    writer.commit()?;
    Ok(outcome)
}

/// Bring the index in line with every document under the provider's root.
///
/// All changes land in one transaction committed at the end, and `table`
/// is swapped for the freshly built one afterwards. Documents that cannot
/// be resolved or read are logged and left out of both.
pub fn full_pass(
    store: &IndexStore,
    provider: &dyn DocumentProvider,
    table: &DocumentTable,
    progress: &mut ProgressFn<'_>,
) -> Result<SyncReport> {
    let ids = provider.list_document_ids()?;
    let total = ids.len();
    info!(documents = total, "synchronizing index");

    let mut report = SyncReport {
        listed: total,
        ..SyncReport::default()
    };
    let mut docs = DocMap::with_capacity(total);
    let mut writer = store.begin_write()?;

    for (done, docid) in ids.iter().enumerate() {
        let Some(doc) = resolve_or_warn(provider, docid) else {
            writer.delete(docid);
            report.skipped += 1;
            continue;
        };

        progress(&Progress::new(
            done * 3,
            total * 4,
            Phase::Reading,
            Some(DocHandle::clone(&doc)),
        ));

        match stage_document(&mut writer, doc.as_ref()) {
            Ok(RecordOutcome::Upserted) => report.indexed += 1,
            Ok(RecordOutcome::Removed) => report.empty += 1,
            Err(e @ Error::Tantivy(_)) => return Err(e),
            Err(e) => {
                warn!(docid = %docid, error = %e, "cannot read document, skipping");
                writer.delete(docid);
                report.skipped += 1;
                continue;
            }
        }
        docs.insert(docid.clone(), doc);
    }

    let listed: HashSet<&str> = ids.iter().map(String::as_str).collect();
    for indexed in store.all_docids()? {
        if !listed.contains(indexed.as_str()) {
            debug!(docid = %indexed, "document gone, dropping from index");
            writer.delete(&indexed);
            report.purged += 1;
        }
    }

    progress(&Progress::new(3, 4, Phase::Commit, None));
    writer.commit()?;
    progress(&Progress::new(4, 4, Phase::Commit, None));

    table.replace(docs);
    info!(
        indexed = report.indexed,
        empty = report.empty,
        skipped = report.skipped,
        purged = report.purged,
        "index synchronized"
    );
    Ok(report)
}

fn resolve_or_warn(
    provider: &dyn DocumentProvider,
    docid: &str,
) -> Option<DocHandle> {
    match provider.resolve(docid) {
        Ok(Resolution::Recognized(doc)) => Some(doc),
        Ok(Resolution::Unrecognized) => {
            let err = Error::UnrecognizedDocumentKind(docid.to_string());
            warn!("{err}");
            None
        }
        Err(e) => {
            warn!(docid = %docid, error = %e, "cannot resolve document");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        progress,
        testing::{MemoryDocument, MemoryProvider},
    };

    fn indexed(store: &IndexStore) -> Vec<String> {
        let mut ids = store.all_docids().unwrap();
        ids.sort();
        ids
    }

    #[test]
    fn indexes_only_documents_with_text() {
        let provider = MemoryProvider::new();
        provider.insert(MemoryDocument::new("a", &["invoice total 42"]));
        provider.insert(MemoryDocument::new("b", &["recipe", "total"]));
        provider.insert(MemoryDocument::new("c", &["  ", "\n"]));
        let store = IndexStore::open_in_ram().unwrap();
        let table = DocumentTable::new();

        let report =
            full_pass(&store, &provider, &table, &mut progress::ignore)
                .unwrap();

        assert_eq!(indexed(&store), vec!["a", "b"]);
        assert_eq!(report.indexed, 2);
        assert_eq!(report.empty, 1);
        // Blank documents are still known to the table.
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn unrecognized_documents_are_skipped() {
        let provider = MemoryProvider::new();
        provider.insert(MemoryDocument::new("a", &["hello"]));
        provider.insert_unrecognized("mystery");
        let store = IndexStore::open_in_ram().unwrap();
        let table = DocumentTable::new();

        let report =
            full_pass(&store, &provider, &table, &mut progress::ignore)
                .unwrap();

        assert_eq!(report.skipped, 1);
        assert!(table.get("mystery").is_none());
        assert_eq!(indexed(&store), vec!["a"]);
    }

    #[test]
    fn records_labels_and_modification_time() {
        let provider = MemoryProvider::new();
        provider.insert(
            MemoryDocument::new("a", &["hello"])
                .with_labels(&["taxes", "bank"])
                .with_modified(1234),
        );
        let store = IndexStore::open_in_ram().unwrap();
        full_pass(&store, &provider, &DocumentTable::new(), &mut progress::ignore)
            .unwrap();

        let stored = store.get("a").unwrap().unwrap();
        assert_eq!(stored.labels, "bank,taxes");
        assert_eq!(stored.last_read, 1234);
    }

    #[test]
    fn second_pass_is_idempotent() {
        let provider = MemoryProvider::new();
        provider.insert(MemoryDocument::new("a", &["hello world"]));
        provider.insert(MemoryDocument::new("b", &["world"]));
        let store = IndexStore::open_in_ram().unwrap();
        let table = DocumentTable::new();

        full_pass(&store, &provider, &table, &mut progress::ignore).unwrap();
        let first = indexed(&store);
        full_pass(&store, &provider, &table, &mut progress::ignore).unwrap();

        assert_eq!(indexed(&store), first);
        assert_eq!(store.num_docs(), 2);
    }

    #[test]
    fn removed_and_emptied_documents_leave_the_index() {
        let provider = MemoryProvider::new();
        provider.insert(MemoryDocument::new("a", &["alpha"]));
        provider.insert(MemoryDocument::new("b", &["beta"]));
        let store = IndexStore::open_in_ram().unwrap();
        let table = DocumentTable::new();
        full_pass(&store, &provider, &table, &mut progress::ignore).unwrap();
        assert_eq!(indexed(&store), vec!["a", "b"]);

        provider.remove("a");
        let report =
            full_pass(&store, &provider, &table, &mut progress::ignore)
                .unwrap();
        assert_eq!(report.purged, 1);
        assert_eq!(indexed(&store), vec!["b"]);

        provider.insert(MemoryDocument::new("b", &[" "]));
        full_pass(&store, &provider, &table, &mut progress::ignore).unwrap();
        assert!(indexed(&store).is_empty());
    }

    #[test]
    fn progress_reserves_last_quarter_for_commit() {
        let provider = MemoryProvider::new();
        provider.insert(MemoryDocument::new("a", &["one"]));
        provider.insert(MemoryDocument::new("b", &["two"]));
        let store = IndexStore::open_in_ram().unwrap();

        let mut events = Vec::new();
        full_pass(&store, &provider, &DocumentTable::new(), &mut |p: &Progress| {
            events.push((p.done, p.total, p.phase, p.document.is_some()))
        })
        .unwrap();

        assert_eq!(
            events,
            vec![
                (0, 8, Phase::Reading, true),
                (3, 8, Phase::Reading, true),
                (3, 4, Phase::Commit, false),
                (4, 4, Phase::Commit, false),
            ]
        );
    }

    #[test]
    fn index_document_upserts_and_removes() {
        let store = IndexStore::open_in_ram().unwrap();
        let doc = MemoryDocument::new("a", &["first draft"]);

        assert_eq!(
            index_document(&store, &doc).unwrap(),
            RecordOutcome::Upserted
        );
        assert_eq!(indexed(&store), vec!["a"]);

        doc.set_pages(&[""]);
        assert_eq!(
            index_document(&store, &doc).unwrap(),
            RecordOutcome::Removed
        );
        assert!(indexed(&store).is_empty());
    }
}
