//! Multipart file upload worker.
//!
//! Files are streamed into the request body through a byte-counting wrapper
//! that reports per-file progress, so a large upload never has to be read
//! into memory whole. The request itself is driven by the client crate's
//! executors: the async variant delivers state changes and the server's
//! response through the listener, the blocking variant reports progress
//! through it and hands classification back as the returned outcome.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use courier_client::executor::{self, RequestHandle};
use courier_client::{
    BytesDecoder, Configuration, HttpTransport, Outcome, RawResponse, RequestCallback,
    RequestError, TransportError,
};
use courier_types::{TaskIdentity, TaskState};
use reqwest::Body;
use reqwest::multipart::{Form, Part};
use tokio::fs;
use tokio::io::AsyncReadExt;
use url::Url;

use crate::error::TransferError;

const CHUNK_SIZE: usize = 64 * 1024;

/// One file part of a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub(crate) part_name: String,
    pub(crate) file_name: String,
    pub(crate) path: PathBuf,
    pub(crate) size: u64,
}

impl UploadFile {
    #[must_use]
    pub fn part_name(&self) -> &str {
        &self.part_name
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Snapshot of one upload task: identity, parts, and lifecycle state.
#[derive(Debug, Clone)]
pub struct UploadInfo {
    pub(crate) identity: TaskIdentity,
    pub(crate) params: Vec<(String, String)>,
    pub(crate) files: Vec<UploadFile>,
    pub(crate) state: TaskState,
}

impl UploadInfo {
    #[must_use]
    pub fn identity(&self) -> &TaskIdentity {
        &self.identity
    }

    #[must_use]
    pub fn url(&self) -> &str {
        self.identity.url()
    }

    /// Text form fields, in the order they were added.
    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    #[must_use]
    pub fn files(&self) -> &[UploadFile] {
        &self.files
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state
    }
}

/// Observes one upload task.
///
/// All methods default to no-ops. The async path fires every one of them;
/// the blocking path fires only `on_progress` and the `Ongoing` state flip
/// (classification comes back as the returned outcome instead).
pub trait UploadListener: Send + Sync {
    /// Bytes of `file_name` handed to the transport so far. Monotonically
    /// non-decreasing per file, reaching `total` when the part is fully
    /// written.
    fn on_progress(&self, tag: &str, file_name: &str, sent: u64, total: u64) {
        let _ = (tag, file_name, sent, total);
    }

    /// The task entered a new state. `error` is present iff that state is
    /// [`TaskState::Error`].
    fn on_state_change(&self, info: &UploadInfo, error: Option<&TransferError>) {
        let _ = (info, error);
    }

    /// The server answered; fires for success and HTTP error alike, never
    /// for timeout or cancellation.
    fn on_response_body(&self, response: &RawResponse) {
        let _ = response;
    }
}

struct Shared {
    info: Mutex<UploadInfo>,
    listener: Option<Arc<dyn UploadListener>>,
}

impl Shared {
    fn lock_info(&self) -> MutexGuard<'_, UploadInfo> {
        self.info.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> UploadInfo {
        self.lock_info().clone()
    }

    fn set_state(&self, state: TaskState, error: Option<&TransferError>) {
        let snapshot = {
            let mut info = self.lock_info();
            if info.state.is_terminal() || info.state == state {
                return;
            }
            info.state = state;
            info.clone()
        };
        tracing::debug!(tag = snapshot.identity.tag(), state = %state, "upload state changed");
        if let Some(listener) = &self.listener {
            listener.on_state_change(&snapshot, error);
        }
    }

    fn note_progress(&self, file_name: &str, sent: u64, total: u64) {
        self.set_state(TaskState::Ongoing, None);
        if let Some(listener) = &self.listener {
            let tag = self.lock_info().identity.tag().to_owned();
            listener.on_progress(&tag, file_name, sent, total);
        }
    }
}

/// Builder for an [`UploadWorker`].
///
/// Unlike the download builder, [`build`](Self::build) does not dispatch:
/// the worker is handed back so the caller can pick the async
/// ([`start`](UploadWorker::start)) or blocking
/// ([`execute`](UploadWorker::execute)) variant.
pub struct UploadWorkerBuilder {
    url: String,
    tag: Option<String>,
    params: Vec<(String, String)>,
    files: Vec<(String, PathBuf, Option<String>)>,
    listener: Option<Arc<dyn UploadListener>>,
    configuration: Configuration,
}

impl UploadWorkerBuilder {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tag: None,
            params: Vec::new(),
            files: Vec::new(),
            listener: None,
            configuration: Configuration::default(),
        }
    }

    /// Correlation tag; a random one is generated when unset.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Add a text form field.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Add a file part; the part's file name is taken from the path.
    #[must_use]
    pub fn file(mut self, part_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.files.push((part_name.into(), path.into(), None));
        self
    }

    /// Add a file part with an explicit file name.
    #[must_use]
    pub fn named_file(
        mut self,
        part_name: impl Into<String>,
        file_name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        self.files
            .push((part_name.into(), path.into(), Some(file_name.into())));
        self
    }

    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn UploadListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Deadline, headers, client, and worker runtime for the upload call.
    #[must_use]
    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Stat every file part and assemble the worker. Fails when a file is
    /// missing or unreadable, before anything touches the network.
    pub fn build(self) -> Result<UploadWorker, TransferError> {
        let mut files = Vec::with_capacity(self.files.len());
        for (part_name, path, file_name) in self.files {
            let size = std::fs::metadata(&path)?.len();
            let file_name = file_name.unwrap_or_else(|| {
                path.file_name()
                    .map_or_else(|| String::from("file"), |name| name.to_string_lossy().into_owned())
            });
            files.push(UploadFile {
                part_name,
                file_name,
                path,
                size,
            });
        }

        let identity = match self.tag {
            Some(tag) => TaskIdentity::tagged(tag, self.url),
            None => TaskIdentity::new(self.url),
        };
        Ok(UploadWorker {
            shared: Arc::new(Shared {
                info: Mutex::new(UploadInfo {
                    identity,
                    params: self.params,
                    files,
                    state: TaskState::Idle,
                }),
                listener: self.listener,
            }),
            configuration: self.configuration,
        })
    }
}

/// One multipart upload, ready to be dispatched.
pub struct UploadWorker {
    shared: Arc<Shared>,
    configuration: Configuration,
}

impl UploadWorker {
    /// Snapshot of the task before dispatch.
    #[must_use]
    pub fn info(&self) -> UploadInfo {
        self.shared.snapshot()
    }

    fn build_transport(&self) -> Result<HttpTransport, TransferError> {
        let info = self.shared.snapshot();
        let url = Url::parse(info.identity.url()).map_err(|e| TransportError::InvalidUrl {
            url: info.identity.url().to_owned(),
            reason: e.to_string(),
        })?;

        let mut form = Form::new();
        for (name, value) in &info.params {
            form = form.text(name.clone(), value.clone());
        }
        for file in &info.files {
            let stream = progress_stream(Arc::clone(&self.shared), file.clone());
            let part = Part::stream_with_length(Body::wrap_stream(stream), file.size)
                .file_name(file.file_name.clone())
                .mime_str("application/octet-stream")?;
            form = form.part(file.part_name.clone(), part);
        }

        let client = self.configuration.resolve_client();
        let request = client
            .post(url)
            .headers(self.configuration.headers().clone())
            .multipart(form)
            .build()?;
        Ok(HttpTransport::new(client, request))
    }

    /// Dispatch the upload on the configured runtime and return a
    /// cancellable handle immediately.
    ///
    /// Progress, state changes, and the server's response arrive through
    /// the listener. A deadline from the configuration is enforced the same
    /// way as for plain requests and surfaces as an `Error` state carrying
    /// a timeout.
    pub fn start(self) -> Result<UploadHandle, TransferError> {
        let transport = match self.build_transport() {
            Ok(transport) => transport,
            Err(error) => {
                self.shared.set_state(TaskState::Error, Some(&error));
                return Err(error);
            }
        };
        let identity = self.shared.lock_info().identity.clone();
        let deadline = self.configuration.call_timeout();
        let runtime = self.configuration.resolve_runtime();

        self.shared.set_state(TaskState::Started, None);
        let callback: Arc<dyn RequestCallback<Bytes>> = Arc::new(Adapter {
            shared: Arc::clone(&self.shared),
        });
        let request = executor::enqueue(
            Arc::new(transport),
            Arc::new(BytesDecoder),
            deadline,
            callback,
            &runtime,
            Some(&identity),
        );
        Ok(UploadHandle {
            request,
            shared: self.shared,
        })
    }

    /// Drive the upload on the calling thread and return the raw outcome.
    ///
    /// The listener observes progress but no terminal state change or
    /// response callback; inspect the outcome for classification. Must not
    /// be called from inside an async context; use
    /// [`start`](UploadWorker::start) there.
    pub fn execute(self) -> Result<Outcome<Bytes>, TransferError> {
        let transport = self.build_transport()?;
        let identity = self.shared.lock_info().identity.clone();
        Ok(executor::execute(
            &transport,
            &BytesDecoder,
            self.configuration.call_timeout(),
            Some(&identity),
        ))
    }
}

/// Cancellable handle for a dispatched upload.
pub struct UploadHandle {
    request: RequestHandle,
    shared: Arc<Shared>,
}

impl UploadHandle {
    /// Cancel the upload if it has not reached a terminal state yet.
    ///
    /// A winning cancel fires no response or error callback; the listener
    /// observes only the `Cancelled` state change.
    pub fn cancel(&self) -> bool {
        if !self.request.cancel() {
            return false;
        }
        self.shared.set_state(TaskState::Cancelled, None);
        true
    }

    /// Snapshot of the task's current state.
    #[must_use]
    pub fn info(&self) -> UploadInfo {
        self.shared.snapshot()
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.request.is_settled()
    }
}

/// Translates the executor's callback sequence into listener events.
struct Adapter {
    shared: Arc<Shared>,
}

impl RequestCallback<Bytes> for Adapter {
    fn on_error(&self, error: RequestError) {
        let error = TransferError::Request(error);
        self.shared.set_state(TaskState::Error, Some(&error));
    }

    fn on_response(&self, response: &RawResponse, _value: Option<&Bytes>, _error_body: Option<&Bytes>) {
        if let Some(listener) = &self.shared.listener {
            listener.on_response_body(response);
        }
        if response.is_success() {
            self.shared.set_state(TaskState::Completed, None);
        } else {
            let error = TransferError::Status {
                status: response.status(),
                url: response.url().to_string(),
            };
            self.shared.set_state(TaskState::Error, Some(&error));
        }
    }
}

enum Feed {
    Pending(PathBuf),
    Streaming(fs::File),
}

/// Byte-counting file stream feeding one multipart part. The file opens on
/// first poll, inside the transport's async context.
fn progress_stream(
    shared: Arc<Shared>,
    file: UploadFile,
) -> impl futures_util::Stream<Item = Result<Bytes, std::io::Error>> + Send {
    futures_util::stream::try_unfold(
        (Feed::Pending(file.path.clone()), 0u64),
        move |(feed, sent)| {
            let shared = Arc::clone(&shared);
            let file = file.clone();
            async move {
                let mut handle = match feed {
                    Feed::Pending(path) => fs::File::open(&path).await?,
                    Feed::Streaming(handle) => handle,
                };
                let mut buf = vec![0u8; CHUNK_SIZE];
                let read = handle.read(&mut buf).await?;
                if read == 0 {
                    return Ok(None);
                }
                buf.truncate(read);
                let sent = sent + read as u64;
                shared.note_progress(&file.file_name, sent.min(file.size), file.size);
                Ok(Some((Bytes::from(buf), (Feed::Streaming(handle), sent))))
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::UploadWorkerBuilder;
    use crate::error::TransferError;
    use courier_types::TaskState;
    use std::io::Write;

    #[test]
    fn build_stats_files_and_keeps_param_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.bin");
        let mut file = std::fs::File::create(&path).expect("create");
        file.write_all(b"0123456789").expect("write");

        let worker = UploadWorkerBuilder::new("https://example.com/upload")
            .param("kind", "report")
            .param("size", "10")
            .file("file", &path)
            .build()
            .expect("build");

        let info = worker.info();
        assert_eq!(
            info.params(),
            &[
                ("kind".to_string(), "report".to_string()),
                ("size".to_string(), "10".to_string())
            ]
        );
        assert_eq!(info.files().len(), 1);
        assert_eq!(info.files()[0].size(), 10);
        assert_eq!(info.files()[0].file_name(), "report.bin");
        assert_eq!(info.state(), TaskState::Idle);
    }

    #[test]
    fn missing_file_fails_at_build() {
        let result = UploadWorkerBuilder::new("https://example.com/upload")
            .file("file", "/definitely/not/here.bin")
            .build();
        assert!(matches!(result, Err(TransferError::Io(_))));
    }

    #[test]
    fn explicit_file_name_overrides_the_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("raw-upload-temp");
        std::fs::write(&path, b"x").expect("write");

        let worker = UploadWorkerBuilder::new("https://example.com/upload")
            .named_file("attachment", "pretty-name.txt", &path)
            .build()
            .expect("build");
        assert_eq!(worker.info().files()[0].file_name(), "pretty-name.txt");
    }
}
