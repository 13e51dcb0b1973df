//! Downstream index store seam.
//!
//! Consumers apply events through `IndexStore`. Mutations made between two
//! `commit` calls form one staged batch that `rollback` discards, which is
//! what lets the reference consumer apply batches all-or-nothing.

mod memory;

pub use memory::{MemoryIndex, MemoryIndexStats};

use crate::StoreError;
use std::fmt::Debug;
use std::hash::Hash;

/// A payload that can be stored in an index.
pub trait Indexable {
    /// Identity of the indexed entity.
    type Key: Eq + Hash + Clone + Debug;

    fn key(&self) -> Self::Key;

    /// Whether the payload itself marks its entity as deleted.
    ///
    /// An event constructed as a delete removes the entity whatever this
    /// returns.
    fn is_deleted(&self) -> bool {
        false
    }
}

/// Mutable index that stages writes until `commit`.
pub trait IndexStore<D: Indexable> {
    /// Insert or replace a document.
    fn upsert(&mut self, doc: D) -> Result<(), StoreError>;

    /// Remove a document. Removing an absent key is not an error.
    fn delete(&mut self, key: &D::Key) -> Result<(), StoreError>;

    /// Publish every mutation staged since the last commit.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Discard every mutation staged since the last commit.
    fn rollback(&mut self);
}

impl<D: Indexable, S: IndexStore<D> + ?Sized> IndexStore<D> for Box<S> {
    fn upsert(&mut self, doc: D) -> Result<(), StoreError> {
        (**self).upsert(doc)
    }

    fn delete(&mut self, key: &D::Key) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        (**self).commit()
    }

    fn rollback(&mut self) {
        (**self).rollback()
    }
}
