//! HTTP transport for a HackMD-compatible note service.
//!
//! The service exposes the authenticated history as JSON and raw note
//! bodies per id. Authentication is a session cookie (`connect.sid`)
//! captured from a browser login. There is no HTTP write endpoint; the
//! service only accepts edits over its realtime socket protocol, which
//! is out of scope here, so `write_content` reports `NotSupported`.

use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use reqwest::header::COOKIE;
use serde::Deserialize;

use super::client::{DocStore, DocumentSummary, StoreError};

pub const DEFAULT_BASE_URL: &str = "https://hackmd.io";

#[derive(Deserialize)]
struct HistoryResponse {
    history: Vec<DocumentSummary>,
}

pub struct HttpStore {
    base_url: String,
    session: String,
    http: reqwest::Client,
}

impl HttpStore {
    /// `base_url` without a trailing slash, e.g. `https://hackmd.io`;
    /// `session` is the raw `connect.sid` cookie value.
    pub fn new(base_url: impl Into<String>, session: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            session: session.into(),
            http: reqwest::Client::new(),
        }
    }

    fn session_cookie(&self) -> String {
        format!("connect.sid={}", self.session)
    }
}

#[async_trait]
impl DocStore for HttpStore {
    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, StoreError> {
        let url = format!("{}/history", self.base_url);
        debug!("GET {url}");
        let resp = self
            .http
            .get(&url)
            .header(COOKIE, self.session_cookie())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(StoreError::Status(resp.status()));
        }
        let body = resp.bytes().await?;
        let parsed: HistoryResponse = serde_json::from_slice(&body)?;
        Ok(parsed.history)
    }

    async fn fetch_content(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        let url = format!("{}/{}/download", self.base_url, id);
        debug!("GET {url}");
        let resp = self
            .http
            .get(&url)
            .header(COOKIE, self.session_cookie())
            .send()
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(id.to_string())),
            s if !s.is_success() => Err(StoreError::Status(s)),
            _ => Ok(resp.bytes().await?.to_vec()),
        }
    }

    async fn write_content(
        &self,
        _id: &str,
        _offset: u64,
        _data: &[u8],
    ) -> Result<(), StoreError> {
        // Writes need the realtime operational-transform channel, which
        // this client does not speak yet.
        Err(StoreError::NotSupported)
    }
}
