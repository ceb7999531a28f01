use tantivy::query::AllQuery;
use tracing::error;

use crate::{
    doc_table::DocumentTable,
    document::{DocHandle, compare_documents},
    error::{Error, Result},
    index_store::IndexStore,
};

/// Every indexed document, in listing order.
pub fn find_all(
    store: &IndexStore,
    table: &DocumentTable,
) -> Result<Vec<DocHandle>> {
    let docids = store.search_docids(&AllQuery)?;
    let mut docs = resolve(table, docids);
    docs.sort_by(compare_documents);
    Ok(docs)
}

/// Documents whose text matches `query_text`, in relevance order.
///
/// A blank query matches everything and is answered by [`find_all`].
pub fn find(
    store: &IndexStore,
    table: &DocumentTable,
    query_text: &str,
) -> Result<Vec<DocHandle>> {
    if query_text.trim().is_empty() {
        return find_all(store, table);
    }

    let query = store.parse_query(query_text);
    let docids = store.search_docids(&*query)?;
    Ok(resolve(table, docids))
}

/// Map docids to handles. Ids missing from the table are reported, left
/// out of the result, and flag the table for resynchronization.
fn resolve(table: &DocumentTable, docids: Vec<String>) -> Vec<DocHandle> {
    let snapshot = table.snapshot();
    let mut docs = Vec::with_capacity(docids.len());
    for docid in docids {
        match snapshot.get(&docid) {
            Some(doc) => docs.push(DocHandle::clone(doc)),
            None => {
                let err = Error::LookupInconsistency { docid };
                error!("{err}");
                table.mark_stale();
            }
        }
    }
    docs
}
