use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::{
    doc_table::DocumentTable,
    document::{DocHandle, Label, compare_documents},
    error::Result,
    index_store::IndexStore,
    progress::{Phase, Progress, ProgressFn},
    sync::{self, RecordOutcome},
};

/// Every label carried by a known document, sorted by name.
///
/// When documents disagree on a label's color, the first one in listing
/// order wins.
pub fn label_list(table: &DocumentTable) -> Vec<Label> {
    let mut docs: Vec<DocHandle> = table.snapshot().values().cloned().collect();
    docs.sort_by(compare_documents);

    let mut labels: BTreeMap<String, Label> = BTreeMap::new();
    for doc in docs {
        match doc.labels() {
            Ok(found) => {
                for label in found {
                    labels.entry(label.name.clone()).or_insert(label);
                }
            }
            Err(e) => warn!(docid = doc.id(), error = %e, "cannot read labels"),
        }
    }
    labels.into_values().collect()
}

/// Attach `label` to `doc` and reindex that document alone.
pub fn add_label(
    store: &IndexStore,
    doc: &DocHandle,
    label: &Label,
) -> Result<RecordOutcome> {
    label.validate()?;
    doc.add_label(label)?;
    sync::index_document(store, doc.as_ref())
}

/// Rename `old` to `new` on every document carrying it.
///
/// Returns how many documents were relabeled. All touched records are
/// reindexed in a single transaction. A document that refuses the new
/// label gets its old one back.
pub fn update_label(
    store: &IndexStore,
    table: &DocumentTable,
    old: &str,
    new: &Label,
    progress: &mut ProgressFn<'_>,
) -> Result<usize> {
    new.validate()?;
    relabel(store, table, old, Phase::LabelUpdating, progress, |doc| {
        rename_on(doc, old, new)
    })
}

fn rename_on(doc: &DocHandle, old: &str, new: &Label) -> Result<()> {
    let previous = doc.labels()?.into_iter().find(|l| l.name == old);
    doc.remove_label(old)?;
    if let Err(e) = doc.add_label(new) {
        if let Some(previous) = previous
            && let Err(restore) = doc.add_label(&previous)
        {
            warn!(docid = doc.id(), label = old, error = %restore, "cannot restore label");
        }
        return Err(e);
    }
    Ok(())
}

/// Remove `name` from every document carrying it.
pub fn destroy_label(
    store: &IndexStore,
    table: &DocumentTable,
    name: &str,
    progress: &mut ProgressFn<'_>,
) -> Result<usize> {
    relabel(store, table, name, Phase::LabelDestroying, progress, |doc| {
        doc.remove_label(name).map(|_| ())
    })
}

fn relabel(
    store: &IndexStore,
    table: &DocumentTable,
    name: &str,
    phase: Phase,
    progress: &mut ProgressFn<'_>,
    edit: impl Fn(&DocHandle) -> Result<()>,
) -> Result<usize> {
    let carriers = documents_with_label(table, name);
    let total = carriers.len();
    info!(label = name, documents = total, %phase, "relabeling");

    let mut writer = store.begin_write()?;
    let mut changed = 0;
    for (done, doc) in carriers.iter().enumerate() {
        progress(&Progress::new(done, total, phase, Some(DocHandle::clone(doc))));

        if let Err(e) = edit(doc) {
            warn!(docid = doc.id(), error = %e, "cannot change labels");
            continue;
        }
        match sync::stage_document(&mut writer, doc.as_ref()) {
            Ok(_) => changed += 1,
            Err(e) => warn!(docid = doc.id(), error = %e, "cannot reindex"),
        }
    }
    writer.commit()?;
    progress(&Progress::new(total, total, phase, None));

    Ok(changed)
}

fn documents_with_label(table: &DocumentTable, name: &str) -> Vec<DocHandle> {
    let mut docs: Vec<DocHandle> = table
        .snapshot()
        .values()
        .filter(|doc| {
            doc.labels()
                .map(|labels| labels.iter().any(|l| l.name == name))
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    docs.sort_by(compare_documents);
    docs
}
