//! `DocStore`: the contract between the filesystem core and the note
//! service. The core needs exactly three things: list the collection,
//! fetch one document body, push bytes back at an offset.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// One document as described by the store's listing endpoint.
///
/// The listing is ordered by the server (history order, most recent
/// first); that order drives directory-name assignment downstream.
#[derive(Clone, Debug, Deserialize)]
pub struct DocumentSummary {
    /// Opaque stable identifier.
    pub id: String,
    /// Display title; not unique, may be empty.
    #[serde(rename = "text")]
    pub title: String,
    /// Server-side last-modified time, milliseconds since the epoch.
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level failure: connection, TLS, timeout.
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("unexpected http status: {0}")]
    Status(reqwest::StatusCode),

    /// The listing endpoint returned a body we could not decode.
    #[error("malformed store response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The store has no document with the requested id.
    #[error("no such document: {0}")]
    NotFound(String),

    /// The store does not implement this operation. Remote writes land
    /// here until the realtime patch protocol exists.
    #[error("operation not supported by the store")]
    NotSupported,
}

impl StoreError {
    /// Distinguishes the expected "store cannot do this yet" outcome
    /// from transient failures; callers map it to ENOSYS, not EIO.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, StoreError::NotSupported)
    }
}

/// Abstract note store. No caching and no retries at this layer; every
/// call reflects current server state at call time. All methods are
/// plain futures, so dropping one (request teardown) aborts the
/// underlying I/O without mutating any node state.
#[async_trait]
pub trait DocStore {
    /// Current document collection, in server order.
    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, StoreError>;

    /// Full current body of one document.
    async fn fetch_content(&self, id: &str) -> Result<Vec<u8>, StoreError>;

    /// Push `data` at `offset`. May legitimately report `NotSupported`.
    async fn write_content(&self, id: &str, offset: u64, data: &[u8])
    -> Result<(), StoreError>;
}
