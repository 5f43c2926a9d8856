//! Root directory: owns the current name generation and the scratch
//! node, answers enumeration and lookup.
//!
//! Enumeration builds the new `NameMapping` off to the side and swaps it
//! in behind an `RwLock<Arc<..>>`, so a concurrent lookup always reads
//! one consistent generation and never observes a table mid-replacement.

use std::sync::{Arc, RwLock};

use log::warn;

use crate::store::client::{DocStore, StoreError};
use crate::vfs::namespace::NameMapping;
use crate::vfs::node::{DocNode, ScratchNode};

/// Fixed name of the scratch entry. Reserved during name assignment,
/// so a document with this exact title gets a `(k)` suffix instead.
pub const SCRATCH_NAME: &str = ".scratch";

/// What a name resolves to.
pub enum Entry<S> {
    Doc(DocNode<S>),
    Scratch(Arc<ScratchNode>),
}

pub struct RootDir<S> {
    store: Arc<S>,
    /// Latest published generation; `None` until the first successful
    /// enumeration, and lookups fail until then.
    mapping: RwLock<Option<Arc<NameMapping>>>,
    scratch: Arc<ScratchNode>,
}

impl<S: DocStore> RootDir<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            mapping: RwLock::new(None),
            scratch: Arc::new(ScratchNode::new()),
        }
    }

    pub fn scratch(&self) -> Arc<ScratchNode> {
        self.scratch.clone()
    }

    /// Snapshot of the current generation, if any.
    pub fn current_mapping(&self) -> Option<Arc<NameMapping>> {
        self.mapping.read().unwrap().clone()
    }

    /// List the store, build a fresh generation, publish it, and return
    /// the entry names (scratch entry last). A store failure surfaces as
    /// the enumeration's failure and keeps the previous generation.
    pub async fn enumerate(&self) -> Result<Vec<String>, StoreError> {
        let docs = self.store.list_documents().await.inspect_err(|e| {
            warn!("document listing failed: {e}");
        })?;
        let generation = Arc::new(NameMapping::assign(&docs, &[SCRATCH_NAME]));
        let mut names = generation.names().to_vec();
        names.push(SCRATCH_NAME.to_string());
        *self.mapping.write().unwrap() = Some(generation);
        Ok(names)
    }

    /// Resolve a name against the newest generation. A document hit
    /// constructs a brand-new unfetched node: content is intentionally
    /// never cached across opens, every open session re-fetches.
    pub fn lookup(&self, name: &str) -> Option<Entry<S>> {
        if name == SCRATCH_NAME {
            return Some(Entry::Scratch(self.scratch.clone()));
        }
        let generation = self.current_mapping()?;
        let id = generation.id_of(name)?;
        Some(Entry::Doc(DocNode::new(id, self.store.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::MockStore;

    fn root_with_docs(docs: &[(&str, &str, &[u8])]) -> (RootDir<MockStore>, Arc<MockStore>) {
        let store = Arc::new(MockStore::new());
        for (id, title, body) in docs {
            store.insert(id, title, body);
        }
        (RootDir::new(store.clone()), store)
    }

    #[tokio::test]
    async fn lookup_before_enumerate_finds_nothing_but_scratch() {
        let (root, store) = root_with_docs(&[("1", "a", b"body")]);
        assert!(root.lookup("a").is_none());
        assert!(root.lookup("missing").is_none());
        assert!(matches!(root.lookup(SCRATCH_NAME), Some(Entry::Scratch(_))));
        // No implicit fetch was triggered by the misses.
        assert_eq!(store.list_calls(), 0);
        assert_eq!(store.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn enumerate_publishes_names_plus_scratch() {
        let (root, _) = root_with_docs(&[("1", "a", b""), ("2", "b", b"")]);
        let names = root.enumerate().await.unwrap();
        assert_eq!(names, ["a", "b", SCRATCH_NAME]);
        assert!(matches!(root.lookup("a"), Some(Entry::Doc(_))));
        assert!(root.lookup("c").is_none());
    }

    #[tokio::test]
    async fn each_lookup_builds_a_fresh_node() {
        let (root, store) = root_with_docs(&[("1", "a", b"body")]);
        root.enumerate().await.unwrap();

        for _ in 0..2 {
            let Some(Entry::Doc(node)) = root.lookup("a") else {
                panic!("expected document entry");
            };
            assert_eq!(node.read_all().await.unwrap(), b"body");
        }
        // Two open sessions, two fetches: no cross-open caching.
        assert_eq!(store.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn failed_enumeration_keeps_previous_generation() {
        let (root, store) = root_with_docs(&[("1", "a", b"body")]);
        root.enumerate().await.unwrap();

        store.set_fail_list(true);
        assert!(root.enumerate().await.is_err());
        // The earlier generation still answers lookups.
        assert!(matches!(root.lookup("a"), Some(Entry::Doc(_))));
    }

    #[tokio::test]
    async fn new_generation_replaces_the_old_wholesale() {
        let store = Arc::new(MockStore::new());
        store.insert("1", "old", b"");
        let root = RootDir::new(store.clone());
        root.enumerate().await.unwrap();
        assert!(root.lookup("old").is_some());

        // Second enumeration sees a renamed document; the old name must
        // not survive from the prior generation.
        let fresh = Arc::new(MockStore::new());
        fresh.insert("1", "new", b"");
        let renamed = RootDir::new(fresh);
        renamed.enumerate().await.unwrap();
        assert!(renamed.lookup("new").is_some());
        assert!(renamed.lookup("old").is_none());
    }

    #[tokio::test]
    async fn scratch_is_shared_across_lookups() {
        let (root, _) = root_with_docs(&[]);
        let Some(Entry::Scratch(first)) = root.lookup(SCRATCH_NAME) else {
            panic!("expected scratch entry");
        };
        first.write_at(0, b"keep").await;

        let Some(Entry::Scratch(second)) = root.lookup(SCRATCH_NAME) else {
            panic!("expected scratch entry");
        };
        assert_eq!(second.read_all().await, b"keep");
    }

    #[tokio::test]
    async fn document_titled_like_scratch_is_suffixed() {
        let (root, _) = root_with_docs(&[("1", SCRATCH_NAME, b"doc body")]);
        let names = root.enumerate().await.unwrap();

        // The scratch name is reserved, so the document surfaces under a
        // suffix and every entry name stays unique.
        assert_eq!(names, [".scratch(1)", SCRATCH_NAME]);
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());

        // The fixed entry wins on lookup; the document stays reachable.
        assert!(matches!(root.lookup(SCRATCH_NAME), Some(Entry::Scratch(_))));
        let Some(Entry::Doc(node)) = root.lookup(".scratch(1)") else {
            panic!("expected document entry");
        };
        assert_eq!(node.read_all().await.unwrap(), b"doc body");
    }
}
