//! In-memory index with DashMap lookup and an undo journal.
//!
//! Writes land in the map immediately and the previous state of each
//! touched key is journaled; `rollback` replays the journal backwards.
//! Readers are not isolated from an in-flight batch.

use super::{IndexStore, Indexable};
use crate::config::StoreConfig;
use crate::StoreError;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

enum UndoEntry<D: Indexable> {
    /// Key held this document before the batch touched it
    Restore(D::Key, D),
    /// Key was absent before the batch touched it
    Remove(D::Key),
}

struct Inner<D: Indexable> {
    documents: DashMap<D::Key, D>,
    journal: Mutex<Vec<UndoEntry<D>>>,
    max_documents: Option<usize>,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

/// Cloneable handle to a shared in-memory index.
pub struct MemoryIndex<D: Indexable> {
    inner: Arc<Inner<D>>,
}

impl<D: Indexable> Clone for MemoryIndex<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Indexable> MemoryIndex<D> {
    /// Create an unbounded index.
    pub fn new() -> Self {
        Self::with_capacity_limit(None)
    }

    /// Create an index from configuration (`max_documents = 0` is unbounded).
    pub fn with_config(config: &StoreConfig) -> Self {
        let limit = (config.max_documents > 0).then_some(config.max_documents);
        Self::with_capacity_limit(limit)
    }

    /// Create an index holding at most `max_documents` documents.
    pub fn with_capacity_limit(max_documents: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Inner {
                documents: DashMap::new(),
                journal: Mutex::new(Vec::new()),
                max_documents,
                commits: AtomicU64::new(0),
                rollbacks: AtomicU64::new(0),
            }),
        }
    }

    /// Look up a document by key (O(1)).
    pub fn get(&self, key: &D::Key) -> Option<D>
    where
        D: Clone,
    {
        self.inner.documents.get(key).map(|r| r.value().clone())
    }

    pub fn contains(&self, key: &D::Key) -> bool {
        self.inner.documents.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.documents.is_empty()
    }

    /// All keys currently stored, in no particular order.
    pub fn keys(&self) -> Vec<D::Key> {
        self.inner
            .documents
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn stats(&self) -> MemoryIndexStats {
        MemoryIndexStats {
            documents: self.len(),
            staged_mutations: self.inner.journal.lock().len(),
            commits: self.inner.commits.load(Ordering::Relaxed),
            rollbacks: self.inner.rollbacks.load(Ordering::Relaxed),
        }
    }
}

impl<D: Indexable> Default for MemoryIndex<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Indexable> IndexStore<D> for MemoryIndex<D> {
    fn upsert(&mut self, doc: D) -> Result<(), StoreError> {
        let key = doc.key();
        let documents = &self.inner.documents;

        if let Some(limit) = self.inner.max_documents {
            if documents.len() >= limit && !documents.contains_key(&key) {
                return Err(StoreError::CapacityExceeded { limit });
            }
        }

        let undo = match documents.insert(key.clone(), doc) {
            Some(previous) => UndoEntry::Restore(key, previous),
            None => UndoEntry::Remove(key),
        };
        self.inner.journal.lock().push(undo);
        Ok(())
    }

    fn delete(&mut self, key: &D::Key) -> Result<(), StoreError> {
        if let Some((key, previous)) = self.inner.documents.remove(key) {
            self.inner
                .journal
                .lock()
                .push(UndoEntry::Restore(key, previous));
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let staged = {
            let mut journal = self.inner.journal.lock();
            let staged = journal.len();
            journal.clear();
            staged
        };
        self.inner.commits.fetch_add(1, Ordering::Relaxed);
        debug!(staged = staged, documents = self.len(), "Memory index committed");
        Ok(())
    }

    fn rollback(&mut self) {
        let entries = std::mem::take(&mut *self.inner.journal.lock());
        let undone = entries.len();

        for entry in entries.into_iter().rev() {
            match entry {
                UndoEntry::Restore(key, previous) => {
                    self.inner.documents.insert(key, previous);
                }
                UndoEntry::Remove(key) => {
                    self.inner.documents.remove(&key);
                }
            }
        }

        self.inner.rollbacks.fetch_add(1, Ordering::Relaxed);
        debug!(undone = undone, "Memory index rolled back");
    }
}

/// Memory index statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryIndexStats {
    /// Documents currently stored
    pub documents: usize,
    /// Mutations awaiting commit
    pub staged_mutations: usize,
    /// Total commits
    pub commits: u64,
    /// Total rollbacks
    pub rollbacks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Doc {
        id: u32,
        body: &'static str,
    }

    impl Indexable for Doc {
        type Key = u32;

        fn key(&self) -> u32 {
            self.id
        }
    }

    fn doc(id: u32, body: &'static str) -> Doc {
        Doc { id, body }
    }

    #[test]
    fn test_upsert_and_get() {
        let mut index = MemoryIndex::new();
        index.upsert(doc(1, "a")).unwrap();
        index.upsert(doc(1, "b")).unwrap();
        index.commit().unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&1), Some(doc(1, "b")));
        assert!(index.get(&2).is_none());
    }

    #[test]
    fn test_delete_absent_key_is_ok() {
        let mut index: MemoryIndex<Doc> = MemoryIndex::new();
        assert!(index.delete(&42).is_ok());
        assert_eq!(index.stats().staged_mutations, 0);
    }

    #[test]
    fn test_rollback_restores_previous_state() {
        let mut index = MemoryIndex::new();
        index.upsert(doc(1, "original")).unwrap();
        index.upsert(doc(2, "kept")).unwrap();
        index.commit().unwrap();

        index.upsert(doc(1, "changed")).unwrap();
        index.upsert(doc(3, "new")).unwrap();
        index.delete(&2).unwrap();
        index.upsert(doc(3, "newer")).unwrap();
        assert_eq!(index.stats().staged_mutations, 4);

        index.rollback();

        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&1), Some(doc(1, "original")));
        assert_eq!(index.get(&2), Some(doc(2, "kept")));
        assert!(!index.contains(&3));

        let stats = index.stats();
        assert_eq!(stats.commits, 1);
        assert_eq!(stats.rollbacks, 1);
        assert_eq!(stats.staged_mutations, 0);
    }

    #[test]
    fn test_capacity_limit() {
        let mut index = MemoryIndex::with_capacity_limit(Some(2));
        index.upsert(doc(1, "a")).unwrap();
        index.upsert(doc(2, "b")).unwrap();

        // Replacing an existing key does not grow the index
        index.upsert(doc(2, "c")).unwrap();

        let err = index.upsert(doc(3, "d")).unwrap_err();
        assert_eq!(err, StoreError::CapacityExceeded { limit: 2 });
    }

    #[test]
    fn test_clones_share_documents() {
        let mut writer = MemoryIndex::new();
        let reader = writer.clone();
        writer.upsert(doc(7, "x")).unwrap();
        writer.commit().unwrap();

        assert!(reader.contains(&7));
        assert_eq!(reader.keys(), vec![7]);
    }

    #[test]
    fn test_with_config() {
        let unbounded: MemoryIndex<Doc> = MemoryIndex::with_config(&StoreConfig { max_documents: 0 });
        assert!(unbounded.inner.max_documents.is_none());

        let bounded: MemoryIndex<Doc> = MemoryIndex::with_config(&StoreConfig { max_documents: 5 });
        assert_eq!(bounded.inner.max_documents, Some(5));
    }
}
