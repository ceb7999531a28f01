use std::path::{Path, PathBuf};

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    ReloadPolicy,
    Searcher,
    TantivyDocument,
    Term,
    collector::TopDocs,
    doc,
    query::{AllQuery, Query, QueryParser},
    schema::*,
    tokenizer::{
        LowerCaser,
        RegexTokenizer,
        RemoveLongFilter,
        SimpleTokenizer,
        TextAnalyzer,
    },
};
use tracing::{debug, info, warn};

use crate::{
    document::{Document, full_text, join_labels},
    error::{Error, Result},
    suggest::TermCorrector,
};

/// Memory budget handed to every index writer.
pub const WRITER_MEMORY_BUDGET: usize = 15_000_000;

/// Field names used in the schema.
pub mod fields {
    pub const DOCID: &str = "docid";
    pub const CONTENT: &str = "content";
    pub const LABELS: &str = "labels";
    pub const LAST_READ: &str = "last_read";
}

const CONTENT_TOKENIZER: &str = "ocr_words";
const LABELS_TOKENIZER: &str = "label_list";

/// Resolved field handles for the schema.
#[derive(Debug, Clone, Copy)]
pub struct SchemaFields {
    pub docid: Field,
    pub content: Field,
    pub labels: Field,
    pub last_read: Field,
}

/// One index entry per document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedRecord {
    pub docid: String,
    pub content: String,
    /// Comma-joined label names.
    pub labels: String,
    /// Document modification time at indexing, seconds since the epoch.
    pub last_read: u64,
}

impl IndexedRecord {
    /// Build the record for `doc`, or `None` when its text is blank.
    pub fn from_document(doc: &dyn Document) -> Result<Option<Self>> {
        let content = full_text(&doc.pages()?);
        if content.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            docid: doc.id().to_string(),
            content,
            labels: join_labels(&doc.labels()?),
            last_read: doc.last_modified()?,
        }))
    }
}

/// Stored fields of an indexed document, as read back from the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub docid: String,
    pub labels: String,
    pub last_read: u64,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let docid = builder.add_text_field(fields::DOCID, STRING | STORED);

    let content_opts = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(CONTENT_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    let content = builder.add_text_field(fields::CONTENT, content_opts);

    let labels_opts = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(LABELS_TOKENIZER)
                .set_index_option(IndexRecordOption::Basic),
        )
        .set_stored();
    let labels = builder.add_text_field(fields::LABELS, labels_opts);

    let last_read = builder.add_u64_field(fields::LAST_READ, STORED | FAST);

    let schema = builder.build();
    let fields = SchemaFields {
        docid,
        content,
        labels,
        last_read,
    };

    (schema, fields)
}

fn resolve_fields(schema: &Schema) -> Option<SchemaFields> {
    Some(SchemaFields {
        docid: schema.get_field(fields::DOCID).ok()?,
        content: schema.get_field(fields::CONTENT).ok()?,
        labels: schema.get_field(fields::LABELS).ok()?,
        last_read: schema.get_field(fields::LAST_READ).ok()?,
    })
}

fn register_tokenizers(index: &Index) -> Result<()> {
    // No stemming: the spelling corrector suggests indexed terms verbatim.
    let words = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(CONTENT_TOKENIZER, words);

    let labels = TextAnalyzer::builder(RegexTokenizer::new("[^,]+")?)
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(LABELS_TOKENIZER, labels);
    Ok(())
}

/// The on-disk keyword index.
///
/// Readers only see committed data, and only after [`IndexStore::refresh`];
/// [`StoreWriter::commit`] refreshes automatically.
pub struct IndexStore {
    index: Index,
    reader: IndexReader,
    fields: SchemaFields,
    path: Option<PathBuf>,
}

impl IndexStore {
    /// Open the index at `dir`, creating it if absent.
    ///
    /// An index that exists but cannot be opened (or carries a foreign
    /// schema) is discarded and recreated. If that fails too, the index is
    /// reported as corrupt.
    pub fn open_or_create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        info!(path = %dir.display(), "opening index");

        let index = match open_or_create_index(dir) {
            Ok(index) => index,
            Err(err) => {
                warn!(
                    path = %dir.display(),
                    error = %err,
                    "failed to open index, creating a new one"
                );
                recreate_index(dir).map_err(|e| Error::IndexCorrupt {
                    path: dir.to_path_buf(),
                    reason: e.to_string(),
                })?
            }
        };

        Self::from_index(index, Some(dir.to_path_buf()))
    }

    /// Open the index at `dir` without creating or repairing anything.
    ///
    /// Returns `None` when no index exists there, and `IndexCorrupt` when
    /// one exists but cannot be read. The directory is left untouched.
    pub fn open_existing(dir: &Path) -> Result<Option<Self>> {
        if !dir.is_dir() {
            return Ok(None);
        }
        let corrupt = |reason: String| Error::IndexCorrupt {
            path: dir.to_path_buf(),
            reason,
        };

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| corrupt(e.to_string()))?;
        if !Index::exists(&mmap_dir).map_err(|e| corrupt(e.to_string()))? {
            return Ok(None);
        }
        let index = Index::open(mmap_dir).map_err(|e| corrupt(e.to_string()))?;
        Self::from_index(index, Some(dir.to_path_buf())).map(Some)
    }

    /// Create an in-memory index (for testing).
    pub fn open_in_ram() -> Result<Self> {
        let (schema, _) = build_schema();
        let index = Index::create_in_ram(schema);
        Self::from_index(index, None)
    }

    fn from_index(index: Index, path: Option<PathBuf>) -> Result<Self> {
        register_tokenizers(&index)?;
        let fields = resolve_fields(&index.schema()).ok_or_else(|| {
            Error::IndexCorrupt {
                path: path.clone().unwrap_or_default(),
                reason: "schema is missing required fields".into(),
            }
        })?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index,
            reader,
            fields,
            path,
        })
    }

    pub fn fields(&self) -> SchemaFields {
        self.fields
    }

    /// Directory backing this index, `None` for in-memory indexes.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Start a write transaction. Nothing it does is visible until commit.
    pub fn begin_write(&self) -> Result<StoreWriter<'_>> {
        Ok(StoreWriter {
            store: self,
            writer: self.index.writer(WRITER_MEMORY_BUDGET)?,
        })
    }

    /// Reload the reader so that it observes the latest commit.
    pub fn refresh(&self) -> Result<()> {
        self.reader.reload()?;
        Ok(())
    }

    /// Snapshot of the last refreshed commit.
    pub fn searcher(&self) -> Searcher {
        self.reader.searcher()
    }

    /// Number of indexed documents in the current snapshot.
    pub fn num_docs(&self) -> u64 {
        self.searcher().num_docs()
    }

    /// Spelling corrector over the `content` field of the current snapshot.
    pub fn corrector(&self) -> TermCorrector {
        TermCorrector::new(self.searcher(), self.fields.content)
    }

    /// Parse a free-text query against `content`; terms are ANDed.
    pub fn parse_query(&self, query_str: &str) -> Box<dyn Query> {
        let mut parser =
            QueryParser::for_index(&self.index, vec![self.fields.content]);
        parser.set_conjunction_by_default();
        let (query, errors) = parser.parse_query_lenient(query_str);
        if !errors.is_empty() {
            debug!(query = query_str, ?errors, "query parsed leniently");
        }
        query
    }

    /// Docids matching `query`, in backend relevance order.
    pub fn search_docids(&self, query: &dyn Query) -> Result<Vec<String>> {
        let searcher = self.searcher();
        let limit = usize::try_from(searcher.num_docs())
            .unwrap_or(usize::MAX)
            .max(1);
        let top_docs = searcher.search(query, &TopDocs::with_limit(limit))?;

        let mut docids = Vec::with_capacity(top_docs.len());
        for (_score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            docids.push(extract_text(&doc, self.fields.docid));
        }
        Ok(docids)
    }

    /// Every docid in the current snapshot.
    pub fn all_docids(&self) -> Result<Vec<String>> {
        self.search_docids(&AllQuery)
    }

    /// Stored fields for `docid`, if indexed.
    pub fn get(&self, docid: &str) -> Result<Option<StoredRecord>> {
        let searcher = self.searcher();
        let term = Term::from_field_text(self.fields.docid, docid);
        let query =
            tantivy::query::TermQuery::new(term, IndexRecordOption::Basic);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(1))?;

        let Some((_score, address)) = top_docs.into_iter().next() else {
            return Ok(None);
        };
        let doc: TantivyDocument = searcher.doc(address)?;
        Ok(Some(StoredRecord {
            docid: extract_text(&doc, self.fields.docid),
            labels: extract_text(&doc, self.fields.labels),
            last_read: extract_u64(&doc, self.fields.last_read),
        }))
    }
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn open_or_create_index(dir: &Path) -> Result<Index> {
    let (schema, _) = build_schema();
    let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
        .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;

    if Index::exists(&mmap_dir)
        .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
    {
        let index = Index::open(mmap_dir)?;
        if resolve_fields(&index.schema()).is_none() {
            return Err(Error::IndexCorrupt {
                path: dir.to_path_buf(),
                reason: "schema is missing required fields".into(),
            });
        }
        Ok(index)
    } else {
        let index =
            Index::create(mmap_dir, schema, tantivy::IndexSettings::default())?;
        info!(path = %dir.display(), "index created");
        Ok(index)
    }
}

fn recreate_index(dir: &Path) -> Result<Index> {
    std::fs::remove_dir_all(dir)?;
    std::fs::create_dir_all(dir)?;
    let (schema, _) = build_schema();
    let index = Index::create_in_dir(dir, schema)?;
    info!(path = %dir.display(), "index recreated");
    Ok(index)
}

/// A write transaction on an [`IndexStore`].
///
/// Dropping it without calling [`StoreWriter::commit`] discards every
/// change made through it.
pub struct StoreWriter<'a> {
    store: &'a IndexStore,
    writer: IndexWriter,
}

impl StoreWriter<'_> {
    /// Insert `record`, replacing any record with the same docid.
    pub fn upsert(&mut self, record: &IndexedRecord) -> Result<()> {
        let f = self.store.fields;
        self.delete(&record.docid);
        self.writer.add_document(doc!(
            f.docid => record.docid.as_str(),
            f.content => record.content.as_str(),
            f.labels => record.labels.as_str(),
            f.last_read => record.last_read,
        ))?;
        Ok(())
    }

    /// Remove the record for `docid`, if any.
    pub fn delete(&mut self, docid: &str) {
        let term = Term::from_field_text(self.store.fields.docid, docid);
        self.writer.delete_term(term);
    }

    /// Durably publish every change and refresh the store's reader.
    pub fn commit(mut self) -> Result<()> {
        self.writer.commit()?;
        self.store.refresh()
    }
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn extract_u64(doc: &TantivyDocument, field: Field) -> u64 {
    doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0)
}
