//! In-memory store backend for unit tests and local development.
//!
//! Keeps documents in listing order, counts fetches so tests can assert
//! the no-cross-open-caching rule, and can be told to fail or to accept
//! writes to exercise the error paths.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::StatusCode;

use super::client::{DocStore, DocumentSummary, StoreError};

#[derive(Default)]
pub struct MockStore {
    docs: Mutex<Vec<(DocumentSummary, Vec<u8>)>>,
    written: Mutex<HashMap<String, Vec<u8>>>,
    fetch_calls: AtomicUsize,
    list_calls: AtomicUsize,
    fail_list: AtomicBool,
    fail_fetch: AtomicBool,
    accept_writes: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a document; listing order is insertion order.
    pub fn insert(&self, id: &str, title: &str, body: &[u8]) {
        self.docs.lock().unwrap().push((
            DocumentSummary {
                id: id.to_string(),
                title: title.to_string(),
                time: 0,
                tags: Vec::new(),
            },
            body.to_vec(),
        ));
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Make `list_documents` fail with a transport-class error.
    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Make `fetch_content` fail with a transport-class error.
    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Accept `write_content` instead of reporting `NotSupported`.
    pub fn set_accept_writes(&self, accept: bool) {
        self.accept_writes.store(accept, Ordering::SeqCst);
    }

    /// Last accepted write for `id`, if any.
    pub fn written(&self, id: &str) -> Option<Vec<u8>> {
        self.written.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl DocStore for MockStore {
    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(StoreError::Status(StatusCode::BAD_GATEWAY));
        }
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .map(|(summary, _)| summary.clone())
            .collect())
    }

    async fn fetch_content(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(StoreError::Status(StatusCode::BAD_GATEWAY));
        }
        self.docs
            .lock()
            .unwrap()
            .iter()
            .find(|(summary, _)| summary.id == id)
            .map(|(_, body)| body.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn write_content(
        &self,
        id: &str,
        offset: u64,
        data: &[u8],
    ) -> Result<(), StoreError> {
        if !self.accept_writes.load(Ordering::SeqCst) {
            return Err(StoreError::NotSupported);
        }
        let mut written = self.written.lock().unwrap();
        let buf = written.entry(id.to_string()).or_default();
        let offset = offset as usize;
        if buf.len() < offset {
            buf.resize(offset, 0);
        }
        buf.truncate(offset);
        buf.extend_from_slice(data);
        Ok(())
    }
}
