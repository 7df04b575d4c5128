//! Concurrent multi-file downloads with aggregate reporting.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use courier_client::Configuration;
use courier_types::TaskState;

use crate::download::{DownloadInfo, DownloadListener, DownloadWorker, DownloadWorkerBuilder};
use crate::error::TransferError;

/// Observes a set of downloads: every per-task event, plus aggregate counts
/// whenever one task reaches a terminal state.
pub trait MultiDownloadListener: DownloadListener {
    /// Another task finished. Cancelled and errored tasks both count as
    /// failed; `succeeded + failed` reaches `total` when the set is done.
    fn on_total_progress(&self, succeeded: usize, failed: usize, total: usize) {
        let _ = (succeeded, failed, total);
    }
}

/// Forwards per-task events and keeps the terminal counts.
struct Aggregate {
    listener: Arc<dyn MultiDownloadListener>,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    total: usize,
}

impl DownloadListener for Aggregate {
    fn on_state_change(&self, info: &DownloadInfo, error: Option<&TransferError>) {
        self.listener.on_state_change(info, error);
        match info.state() {
            TaskState::Completed => {
                self.succeeded.fetch_add(1, Ordering::SeqCst);
            }
            TaskState::Cancelled | TaskState::Error => {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
            _ => return,
        }
        self.listener.on_total_progress(
            self.succeeded.load(Ordering::SeqCst),
            self.failed.load(Ordering::SeqCst),
            self.total,
        );
    }

    fn on_progress(&self, info: &DownloadInfo) {
        self.listener.on_progress(info);
    }
}

struct Entry {
    tag: Option<String>,
    url: String,
    save_path: PathBuf,
}

/// Builder for a [`MultiDownloadWorker`]; [`build`](Self::build) dispatches
/// every download immediately.
#[derive(Default)]
pub struct MultiDownloadWorkerBuilder {
    entries: Vec<Entry>,
    listener: Option<Arc<dyn MultiDownloadListener>>,
    configuration: Configuration,
}

impl MultiDownloadWorkerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one file to the set. An entry with the same URL and save path as
    /// an existing one is skipped.
    #[must_use]
    pub fn add_file_info(self, url: impl Into<String>, save_path: impl Into<PathBuf>) -> Self {
        self.add_entry(None, url.into(), save_path.into())
    }

    /// Same as [`add_file_info`](Self::add_file_info) with an explicit
    /// correlation tag.
    #[must_use]
    pub fn add_tagged_file_info(
        self,
        tag: impl Into<String>,
        url: impl Into<String>,
        save_path: impl Into<PathBuf>,
    ) -> Self {
        self.add_entry(Some(tag.into()), url.into(), save_path.into())
    }

    fn add_entry(mut self, tag: Option<String>, url: String, save_path: PathBuf) -> Self {
        let duplicate = self
            .entries
            .iter()
            .any(|entry| entry.url == url && entry.save_path == save_path);
        if !duplicate {
            self.entries.push(Entry {
                tag,
                url,
                save_path,
            });
        }
        self
    }

    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn MultiDownloadListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Shared by every download in the set.
    #[must_use]
    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Start every download concurrently on the configured runtime.
    #[must_use]
    pub fn build(self) -> MultiDownloadWorker {
        let total = self.entries.len();
        let aggregate = self.listener.map(|listener| {
            Arc::new(Aggregate {
                listener,
                succeeded: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
                total,
            })
        });

        let workers = self
            .entries
            .into_iter()
            .map(|entry| {
                let mut builder = DownloadWorkerBuilder::new(entry.url, entry.save_path)
                    .configuration(self.configuration.clone());
                if let Some(tag) = entry.tag {
                    builder = builder.tag(tag);
                }
                if let Some(aggregate) = &aggregate {
                    builder = builder.listener(Arc::clone(aggregate) as Arc<dyn DownloadListener>);
                }
                builder.build()
            })
            .collect();
        MultiDownloadWorker { workers }
    }
}

/// Control handle over a set of concurrent downloads.
///
/// Per-task control is available through [`workers`](Self::workers); the
/// `_all` methods fan the request out and report how many tasks accepted it.
pub struct MultiDownloadWorker {
    workers: Vec<DownloadWorker>,
}

impl MultiDownloadWorker {
    #[must_use]
    pub fn workers(&self) -> &[DownloadWorker] {
        &self.workers
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.workers.iter().all(DownloadWorker::is_finished)
    }

    pub fn pause_all(&self) -> usize {
        self.workers.iter().filter(|w| w.pause()).count()
    }

    pub fn resume_all(&self) -> usize {
        self.workers.iter().filter(|w| w.resume()).count()
    }

    pub fn cancel_all(&self) -> usize {
        self.workers.iter().filter(|w| w.cancel()).count()
    }
}
