use std::{
    panic::{self, AssertUnwindSafe},
    sync::mpsc,
};

use tracing::{debug, info, warn};

use crate::{
    document::{DocHandle, DocumentProvider, Resolution},
    error::{Error, Result},
    progress::{Phase, Progress, ProgressFn},
};

/// Number of OCR jobs to run at once: one per logical CPU.
pub fn default_worker_count() -> usize {
    num_cpus::get().max(1)
}

/// Outcome of a batch OCR run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OcrReport {
    /// Identifiers listed under the document root.
    pub listed: usize,
    /// Documents an OCR job was started for.
    pub dispatched: usize,
    /// Identifiers that did not resolve to a document.
    pub skipped: usize,
    /// `(docid, reason)` for each document whose OCR failed.
    pub failed: Vec<(String, String)>,
}

impl OcrReport {
    pub fn succeeded(&self) -> usize {
        self.dispatched - self.failed.len()
    }
}

/// Re-run OCR on every document, with at most `max_workers` jobs in flight.
///
/// Documents are taken from the end of the listing. `progress` fires on the
/// calling thread each time a job is dispatched, so a notified document may
/// still be in progress. Returns once every job has finished. The index is
/// not touched; run a synchronization pass afterwards.
pub fn redo_ocr_all(
    provider: &dyn DocumentProvider,
    language: &str,
    max_workers: usize,
    progress: &mut ProgressFn<'_>,
) -> Result<OcrReport> {
    let max_workers = max_workers.max(1);
    let mut remaining = provider.list_document_ids()?;
    let total = remaining.len();
    info!(documents = total, workers = max_workers, "redoing OCR of all documents");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(max_workers)
        .thread_name(|i| format!("ocr-{i}"))
        .build()?;

    let mut report = OcrReport {
        listed: total,
        ..OcrReport::default()
    };
    let (done_tx, done_rx) = mpsc::channel::<(String, Result<()>)>();

    pool.in_place_scope(|scope| {
        let mut in_flight = 0usize;
        loop {
            while in_flight < max_workers {
                let Some(docid) = remaining.pop() else {
                    break;
                };
                let Some(doc) = resolve_quietly(provider, &docid) else {
                    report.skipped += 1;
                    continue;
                };

                let done_tx = done_tx.clone();
                let job_doc = DocHandle::clone(&doc);
                let language = language.to_string();
                scope.spawn(move |_| {
                    let docid = job_doc.id().to_string();
                    // A job must always report back, or the loop below
                    // waits forever.
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        job_doc.redo_ocr(&language)
                    }))
                    .unwrap_or_else(|_| {
                        Err(Error::OcrFailure {
                            docid: docid.clone(),
                            reason: "OCR job panicked".into(),
                        })
                    });
                    // The receiver outlives the scope.
                    let _ = done_tx.send((docid, outcome));
                });
                in_flight += 1;
                report.dispatched += 1;

                progress(&Progress::new(
                    total - remaining.len(),
                    total,
                    Phase::Reading,
                    Some(doc),
                ));
            }

            if in_flight == 0 {
                break;
            }

            let Ok((docid, outcome)) = done_rx.recv() else {
                break;
            };
            in_flight -= 1;
            match outcome {
                Ok(()) => debug!(docid = %docid, "OCR done"),
                Err(e) => {
                    warn!(docid = %docid, error = %e, "OCR failed");
                    let reason = match e {
                        Error::OcrFailure { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    report.failed.push((docid, reason));
                }
            }
        }
    });

    info!(
        dispatched = report.dispatched,
        failed = report.failed.len(),
        "OCR of all documents done"
    );
    Ok(report)
}

fn resolve_quietly(
    provider: &dyn DocumentProvider,
    docid: &str,
) -> Option<DocHandle> {
    match provider.resolve(docid) {
        Ok(Resolution::Recognized(doc)) => Some(doc),
        Ok(Resolution::Unrecognized) => None,
        Err(e) => {
            debug!(docid = %docid, error = %e, "cannot resolve document");
            None
        }
    }
}
