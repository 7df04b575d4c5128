//! File transfer workers for Courier.
//!
//! Layered on the client crate's request execution: streamed downloads with
//! temp-file staging, pause/resume, and cancellation; concurrent
//! multi-downloads with aggregate reporting; and multipart uploads with
//! per-file progress in async and blocking variants.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`download`] | Single-file download worker |
//! | [`multi`] | Concurrent downloads with aggregate counts |
//! | [`upload`] | Multipart upload worker |
//! | [`error`] | Transfer-side error taxonomy |
//!
//! ```ignore
//! use std::sync::Arc;
//! use courier_transfer::DownloadWorkerBuilder;
//!
//! let worker = DownloadWorkerBuilder::new(
//!     "https://example.com/release.tar.gz",
//!     "/downloads/release.tar.gz",
//! )
//! .listener(Arc::new(LoggingListener))
//! .build();
//! ```

pub mod download;
pub mod error;
pub mod multi;
pub mod upload;

pub use download::{DownloadInfo, DownloadListener, DownloadWorker, DownloadWorkerBuilder};
pub use error::TransferError;
pub use multi::{MultiDownloadListener, MultiDownloadWorker, MultiDownloadWorkerBuilder};
pub use upload::{
    UploadFile, UploadHandle, UploadInfo, UploadListener, UploadWorker, UploadWorkerBuilder,
};

pub use courier_types::{TaskIdentity, TaskState};
