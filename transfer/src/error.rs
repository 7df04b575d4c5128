//! Transfer-side error taxonomy.

use courier_client::{RequestError, TransportError};
use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a download or upload task.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The request layer failed: transport, decode, or deadline timeout.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// The server answered with a status the transfer cannot proceed from.
    #[error("unexpected http status {status} for {url}")]
    Status { status: StatusCode, url: String },

    /// Staging or persisting the local file failed.
    #[error("file staging failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransportError> for TransferError {
    fn from(error: TransportError) -> Self {
        Self::Request(RequestError::Transport(error))
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(RequestError::Transport(TransportError::Http(error)))
    }
}
