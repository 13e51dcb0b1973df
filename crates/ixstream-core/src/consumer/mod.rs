//! The consumer contract for ordered batches of data events.
//!
//! ## Ordering contract
//!
//! Producers sort every batch ascending with the consumer's
//! `version_comparator()`, and every version in an earlier batch is
//! strictly less than every version in a later batch. Batches never
//! interleave in version space. A consumer may trust this or check it;
//! `IndexingConsumer` checks it when `validate_ordering` is set.
//!
//! ## Concurrency
//!
//! `consume` takes `&mut self` and `version` takes `&self`, so the borrow
//! checker already forbids reading the version while a batch is being
//! consumed. Callers that share a consumer across threads wrap it in
//! `Synchronized`.

mod indexing;
mod watermark;

pub use indexing::IndexingConsumer;
pub use watermark::{batch_max_version, validate_batch, Watermark};

use crate::event::{DataEvent, Version, VersionComparator};
use crate::ConsumptionError;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Accepts ordered batches of data events and applies them downstream.
pub trait DataConsumer {
    /// Payload type carried by the events.
    type Data;

    /// Apply a batch. Ownership of the batch moves into the consumer.
    ///
    /// Deletes remove the entity keyed by the payload, upserts write it,
    /// markers only count as received. The call blocks until the batch is
    /// applied or has failed. Whether a failure may leave part of the
    /// batch applied is documented by each implementation.
    fn consume(&mut self, batch: Vec<DataEvent<Self::Data>>) -> Result<(), ConsumptionError>;

    /// Version of the most recently received event, which is not
    /// necessarily applied or flushed yet. `None` until something arrives.
    fn version(&self) -> Option<Version>;

    /// Total order this consumer interprets versions with.
    fn version_comparator(&self) -> &dyn VersionComparator;
}

impl<C: DataConsumer + ?Sized> DataConsumer for Box<C> {
    type Data = C::Data;

    fn consume(&mut self, batch: Vec<DataEvent<Self::Data>>) -> Result<(), ConsumptionError> {
        (**self).consume(batch)
    }

    fn version(&self) -> Option<Version> {
        (**self).version()
    }

    fn version_comparator(&self) -> &dyn VersionComparator {
        (**self).version_comparator()
    }
}

/// A consumer behind a shared mutex, for callers that need to query it
/// from other threads while a driver feeds it.
pub struct Synchronized<C> {
    inner: Arc<Mutex<C>>,
}

impl<C> Clone for Synchronized<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: DataConsumer> Synchronized<C> {
    pub fn new(consumer: C) -> Self {
        Self {
            inner: Arc::new(Mutex::new(consumer)),
        }
    }

    /// Consume a batch while holding the lock.
    pub fn consume(&self, batch: Vec<DataEvent<C::Data>>) -> Result<(), ConsumptionError> {
        self.inner.lock().consume(batch)
    }

    /// Last received version, read under the lock.
    pub fn version(&self) -> Option<Version> {
        self.inner.lock().version()
    }

    /// Run `f` against the consumer while holding the lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn lock(&self) -> MutexGuard<'_, C> {
        self.inner.lock()
    }
}
