//! Single-file download worker.
//!
//! The body streams into a temp file under the OS temp dir and is persisted
//! to the save path only on completion, so a crashed or cancelled download
//! never leaves a half-written file where the caller expects a whole one.
//! Pausing keeps the temp file; resuming continues from the completed
//! offset with a `Range` request (a server that answers 200 instead of 206
//! restarts the download from scratch).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use courier_client::Configuration;
use courier_types::{TaskIdentity, TaskState};
use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RANGE};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::TransferError;

/// Progress and state snapshot of one download task.
///
/// The worker owns the single source of truth; listeners receive clones
/// taken under the worker's lock, so a snapshot is internally consistent
/// but may be stale by the time it is read.
#[derive(Debug, Clone)]
pub struct DownloadInfo {
    pub(crate) identity: TaskIdentity,
    pub(crate) save_path: PathBuf,
    pub(crate) temp_path: PathBuf,
    pub(crate) content_length: u64,
    pub(crate) completed: u64,
    pub(crate) state: TaskState,
}

impl DownloadInfo {
    pub(crate) fn new(identity: TaskIdentity, save_path: PathBuf) -> Self {
        let temp_path = std::env::temp_dir().join(Uuid::new_v4().to_string());
        Self {
            identity,
            save_path,
            temp_path,
            content_length: 0,
            completed: 0,
            state: TaskState::Idle,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &TaskIdentity {
        &self.identity
    }

    #[must_use]
    pub fn url(&self) -> &str {
        self.identity.url()
    }

    #[must_use]
    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    /// Staging file the body streams into until completion.
    #[must_use]
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Total byte count, once the server has reported one; zero before.
    #[must_use]
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state
    }
}

/// Observes one download task.
///
/// All methods default to no-ops; implement the ones you care about.
pub trait DownloadListener: Send + Sync {
    /// The task entered a new state. `error` is present iff that state is
    /// [`TaskState::Error`].
    fn on_state_change(&self, info: &DownloadInfo, error: Option<&TransferError>) {
        let _ = (info, error);
    }

    /// The completed byte count advanced.
    fn on_progress(&self, info: &DownloadInfo) {
        let _ = info;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Run,
    Pause,
    Cancel,
}

/// How one streaming pass ended.
enum StreamEnd {
    Completed,
    Paused,
    Cancelled,
}

pub(crate) struct Inner {
    info: Mutex<DownloadInfo>,
    listener: Option<Arc<dyn DownloadListener>>,
    client: reqwest::Client,
    headers: HeaderMap,
    runtime: Handle,
    control: watch::Sender<Control>,
}

impl Inner {
    fn lock_info(&self) -> MutexGuard<'_, DownloadInfo> {
        self.info.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> DownloadInfo {
        self.lock_info().clone()
    }

    /// Transition the task state and notify the listener. No-op once a
    /// terminal state has been reached, so a late actor cannot re-open a
    /// finished task.
    fn set_state(&self, state: TaskState, error: Option<&TransferError>) {
        let snapshot = {
            let mut info = self.lock_info();
            if info.state.is_terminal() || info.state == state {
                return;
            }
            info.state = state;
            info.clone()
        };
        tracing::debug!(tag = snapshot.identity.tag(), state = %state, "download state changed");
        if let Some(listener) = &self.listener {
            listener.on_state_change(&snapshot, error);
        }
    }

    fn note_progress(&self, delta: u64) {
        let snapshot = {
            let mut info = self.lock_info();
            info.completed += delta;
            info.clone()
        };
        if let Some(listener) = &self.listener {
            listener.on_progress(&snapshot);
        }
    }

    fn finish_cancelled(&self) {
        let temp = self.lock_info().temp_path.clone();
        let _ = std::fs::remove_file(&temp);
        self.set_state(TaskState::Cancelled, None);
    }
}

/// Builder for a [`DownloadWorker`]; [`build`](Self::build) dispatches the
/// download immediately.
pub struct DownloadWorkerBuilder {
    url: String,
    save_path: PathBuf,
    tag: Option<String>,
    listener: Option<Arc<dyn DownloadListener>>,
    configuration: Configuration,
    staged: Option<(PathBuf, u64)>,
}

impl DownloadWorkerBuilder {
    #[must_use]
    pub fn new(url: impl Into<String>, save_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            save_path: save_path.into(),
            tag: None,
            listener: None,
            configuration: Configuration::default(),
            staged: None,
        }
    }

    /// Correlation tag; a random one is generated when unset.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn DownloadListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Client, headers, and worker runtime come from here. The call
    /// deadline does not bound downloads; pause and cancel are the control
    /// points.
    #[must_use]
    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Continue from a previously staged temp file, e.g. after a process
    /// restart: the first request carries `Range: bytes={completed}-` and
    /// the body is appended to `temp_path`.
    #[must_use]
    pub fn staged(mut self, temp_path: impl Into<PathBuf>, completed: u64) -> Self {
        self.staged = Some((temp_path.into(), completed));
        self
    }

    /// Start the download on the configured runtime and return its control
    /// handle.
    #[must_use]
    pub fn build(self) -> DownloadWorker {
        let identity = match self.tag {
            Some(tag) => TaskIdentity::tagged(tag, self.url),
            None => TaskIdentity::new(self.url),
        };
        let mut info = DownloadInfo::new(identity, self.save_path);
        if let Some((temp_path, completed)) = self.staged {
            info.temp_path = temp_path;
            info.completed = completed;
        }

        let inner = Arc::new(Inner {
            info: Mutex::new(info),
            listener: self.listener,
            client: self.configuration.resolve_client(),
            headers: self.configuration.headers().clone(),
            runtime: self.configuration.resolve_runtime(),
            control: watch::Sender::new(Control::Run),
        });
        inner.set_state(TaskState::Started, None);
        inner.runtime.spawn(run(Arc::clone(&inner)));
        DownloadWorker { inner }
    }
}

/// Control handle for one in-flight download.
pub struct DownloadWorker {
    inner: Arc<Inner>,
}

impl DownloadWorker {
    /// Snapshot of the task's current progress and state.
    #[must_use]
    pub fn info(&self) -> DownloadInfo {
        self.inner.snapshot()
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.inner.lock_info().state
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Stop streaming but keep the temp file and the completed offset.
    ///
    /// Returns true iff the pause request was accepted (the task was
    /// started or streaming).
    pub fn pause(&self) -> bool {
        if !matches!(self.state(), TaskState::Started | TaskState::Ongoing) {
            return false;
        }
        self.inner.control.send_replace(Control::Pause);
        true
    }

    /// Continue a paused download from its completed offset.
    pub fn resume(&self) -> bool {
        let snapshot = {
            let mut info = self.inner.lock_info();
            if info.state != TaskState::Paused {
                return false;
            }
            info.state = TaskState::Started;
            info.clone()
        };
        self.inner.control.send_replace(Control::Run);
        if let Some(listener) = &self.inner.listener {
            listener.on_state_change(&snapshot, None);
        }
        self.inner.runtime.spawn(run(Arc::clone(&self.inner)));
        true
    }

    /// Cancel the download and remove its temp file.
    ///
    /// A no-op returning false once the task is terminal.
    pub fn cancel(&self) -> bool {
        if self.state().is_terminal() {
            return false;
        }
        self.inner.control.send_replace(Control::Cancel);
        // No task is listening while paused; clean up from here. The task
        // re-checks the control flag after parking, covering the window
        // where it paused between our state read and the send.
        if self.state() == TaskState::Paused {
            self.inner.finish_cancelled();
        }
        true
    }
}

async fn run(inner: Arc<Inner>) {
    let offset = inner.lock_info().completed;
    match stream_body(&inner, offset).await {
        Ok(StreamEnd::Completed) => inner.set_state(TaskState::Completed, None),
        Ok(StreamEnd::Paused) => {
            inner.set_state(TaskState::Paused, None);
            if *inner.control.subscribe().borrow() == Control::Cancel {
                inner.finish_cancelled();
            }
        }
        Ok(StreamEnd::Cancelled) => {
            let temp = inner.lock_info().temp_path.clone();
            let _ = fs::remove_file(&temp).await;
            inner.set_state(TaskState::Cancelled, None);
        }
        Err(error) => {
            tracing::debug!(%error, "download failed");
            inner.set_state(TaskState::Error, Some(&error));
        }
    }
}

/// One streaming pass: request (ranged when resuming), write chunks to the
/// temp file, persist to the save path on completion. Pause and cancel are
/// raced against every await, so both take effect mid-stream.
async fn stream_body(inner: &Arc<Inner>, offset: u64) -> Result<StreamEnd, TransferError> {
    let (url, temp_path, save_path) = {
        let info = inner.lock_info();
        (
            info.identity.url().to_owned(),
            info.temp_path.clone(),
            info.save_path.clone(),
        )
    };

    let mut control = inner.control.subscribe();
    match *control.borrow() {
        Control::Cancel => return Ok(StreamEnd::Cancelled),
        Control::Pause => return Ok(StreamEnd::Paused),
        Control::Run => {}
    }

    let mut request = inner.client.get(&url).headers(inner.headers.clone());
    if offset > 0 {
        request = request.header(RANGE, format!("bytes={offset}-"));
    }

    let response = tokio::select! {
        response = request.send() => response?,
        end = wait_control(&mut control) => return Ok(end),
    };
    let status = response.status();
    if !status.is_success() {
        return Err(TransferError::Status { status, url });
    }

    // A 200 answer to a ranged request means the server ignored the range;
    // start over from byte zero.
    let fresh = offset == 0 || status != StatusCode::PARTIAL_CONTENT;
    if fresh && offset > 0 {
        tracing::debug!(offset, "server ignored range request, restarting download");
    }
    {
        let mut info = inner.lock_info();
        if fresh {
            info.completed = 0;
        }
        info.content_length = info.completed + response.content_length().unwrap_or(0);
    }

    let mut file = if fresh {
        fs::File::create(&temp_path).await?
    } else {
        fs::OpenOptions::new().append(true).open(&temp_path).await?
    };

    let mut stream = response.bytes_stream();
    loop {
        tokio::select! {
            chunk = stream.next() => {
                let Some(chunk) = chunk else { break };
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                inner.set_state(TaskState::Ongoing, None);
                inner.note_progress(chunk.len() as u64);
            }
            end = wait_control(&mut control) => {
                file.flush().await?;
                return Ok(end);
            }
        }
    }

    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    persist(&temp_path, &save_path).await?;
    Ok(StreamEnd::Completed)
}

async fn wait_control(control: &mut watch::Receiver<Control>) -> StreamEnd {
    match control.wait_for(|c| *c != Control::Run).await {
        Ok(flag) => match *flag {
            Control::Pause => StreamEnd::Paused,
            _ => StreamEnd::Cancelled,
        },
        Err(_) => StreamEnd::Cancelled,
    }
}

/// Move the finished temp file into place, copying across filesystems when
/// rename cannot.
async fn persist(temp: &Path, save: &Path) -> Result<(), TransferError> {
    if let Some(parent) = save.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    if fs::rename(temp, save).await.is_err() {
        fs::copy(temp, save).await?;
        fs::remove_file(temp).await?;
    }
    Ok(())
}
