//! File nodes: the per-open document buffer and the scratch file.
//!
//! A `DocNode` is one open session of one document. The buffer starts
//! unfetched and is filled exactly once from the store; reads and writes
//! then go through the local buffer only (the adapter opens files with
//! direct I/O, so the kernel never caches on top of it). Operations on
//! one node serialize on its async mutex; buffers are never shared
//! between nodes, because every lookup builds a new node.

use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::Mutex;

use crate::store::client::{DocStore, StoreError};

/// Replace `buf[offset..offset+data.len()]` with `data`. Bytes past the
/// written range survive; writing past the end extends the buffer and
/// zero-fills the gap.
fn splice(buf: &mut Vec<u8>, offset: u64, data: &[u8]) {
    let offset = offset as usize;
    if offset > buf.len() {
        buf.resize(offset, 0);
    }
    let end = offset + data.len();
    if end < buf.len() {
        buf[offset..end].copy_from_slice(data);
    } else {
        buf.truncate(offset);
        buf.extend_from_slice(data);
    }
}

/// One open document. Unfetched until the first read or write; a failed
/// fetch leaves it unfetched so the next attempt starts clean.
pub struct DocNode<S> {
    id: String,
    store: Arc<S>,
    buf: Mutex<Option<Vec<u8>>>,
}

impl<S: DocStore> DocNode<S> {
    pub fn new(id: impl Into<String>, store: Arc<S>) -> Self {
        Self {
            id: id.into(),
            store,
            buf: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current buffer length; 0 while unfetched.
    pub async fn size(&self) -> u64 {
        self.buf.lock().await.as_ref().map_or(0, |b| b.len() as u64)
    }

    /// Fetch-through: fill the slot from the store if it is still empty.
    async fn fill<'a>(
        &self,
        slot: &'a mut Option<Vec<u8>>,
    ) -> Result<&'a mut Vec<u8>, StoreError> {
        match slot {
            Some(buf) => Ok(buf),
            None => {
                let body = self.store.fetch_content(&self.id).await?;
                debug!("fetched {} ({} bytes)", self.id, body.len());
                Ok(slot.insert(body))
            }
        }
    }

    /// Full buffer, fetching on first access.
    pub async fn read_all(&self) -> Result<Vec<u8>, StoreError> {
        let mut slot = self.buf.lock().await;
        let buf = self.fill(&mut slot).await?;
        Ok(buf.clone())
    }

    /// Apply `data` at `offset` on top of true server content: an
    /// unfetched node fetches first, and a failed fetch fails the write
    /// with no mutation. Reports `data.len()` bytes written.
    pub async fn write_at(&self, offset: u64, data: &[u8]) -> Result<usize, StoreError> {
        let mut slot = self.buf.lock().await;
        let buf = self.fill(&mut slot).await?;
        splice(buf, offset, data);
        Ok(data.len())
    }

    /// Resize the local buffer (kernel setattr with a size; editors use
    /// it as O_TRUNC). Remote state is untouched until the next sync.
    pub async fn truncate(&self, size: u64) -> Result<(), StoreError> {
        let mut slot = self.buf.lock().await;
        if size == 0 {
            // Truncation to zero discards whatever the server holds, so
            // the fetch-through would be wasted work.
            *slot = Some(Vec::new());
            return Ok(());
        }
        let buf = self.fill(&mut slot).await?;
        buf.resize(size as usize, 0);
        Ok(())
    }

    /// Push the whole buffer to the store. `NotSupported` and transport
    /// failures both leave the buffer intact, so local edits survive for
    /// a later attempt or a manual copy. An unfetched node has nothing
    /// to push.
    pub async fn sync(&self) -> Result<(), StoreError> {
        let slot = self.buf.lock().await;
        let Some(buf) = slot.as_ref() else {
            return Ok(());
        };
        match self.store.write_content(&self.id, 0, buf).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.is_not_supported() {
                    debug!("store cannot sync {} yet, keeping local edits", self.id);
                } else {
                    warn!("sync of {} failed: {e}", self.id);
                }
                Err(e)
            }
        }
    }
}

/// The one always-present local file. Same offset semantics as a
/// document node, but no remote identity: it starts empty and sync has
/// nothing to push.
#[derive(Default)]
pub struct ScratchNode {
    buf: Mutex<Vec<u8>>,
}

impl ScratchNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn size(&self) -> u64 {
        self.buf.lock().await.len() as u64
    }

    pub async fn read_all(&self) -> Vec<u8> {
        self.buf.lock().await.clone()
    }

    pub async fn write_at(&self, offset: u64, data: &[u8]) -> usize {
        let mut buf = self.buf.lock().await;
        splice(&mut buf, offset, data);
        data.len()
    }

    pub async fn truncate(&self, size: u64) {
        self.buf.lock().await.resize(size as usize, 0);
    }
}
