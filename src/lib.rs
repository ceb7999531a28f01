//! paperwork-index - keyword index for OCR'd document collections.
//!
//! Keeps a [Tantivy](https://github.com/quickwit-oss/tantivy) index in sync
//! with a directory of scanned documents, answers keyword queries, proposes
//! spelling-corrected alternative queries, and re-runs OCR over the whole
//! collection on a bounded worker pool.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use paperwork_index::{DataDir, DocSearch, FsProvider, progress};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let provider = Arc::new(FsProvider::new("/home/me/papers"));
//! let search = DocSearch::open(
//!     provider,
//!     &data_dir.index_dir().unwrap(),
//!     &mut progress::ignore,
//! )
//! .unwrap();
//!
//! for doc in search.find("invoice 2023").unwrap() {
//!     println!("{}", doc.id());
//! }
//! for alternative in search.suggest("invoce").unwrap() {
//!     println!("did you mean: {alternative}");
//! }
//! ```

pub mod config_db;
pub mod data_dir;
pub mod doc_search;
pub mod doc_table;
pub mod document;
pub mod error;
pub mod fs_provider;
pub mod index_store;
pub mod labels;
pub mod ocr;
pub mod progress;
pub mod query;
pub mod suggest;
pub mod sync;
#[cfg(test)]
mod testing;

pub use config_db::ConfigDb;
pub use data_dir::DataDir;
pub use doc_search::DocSearch;
pub use document::{DocHandle, Document, DocumentKind, DocumentProvider, Label};
pub use error::{Error, Result};
pub use fs_provider::FsProvider;
pub use index_store::IndexStore;
pub use progress::{Phase, Progress};
