//! Reference consumer that applies batches to an `IndexStore`.
//!
//! Batches are applied all-or-nothing. Every mutation of a batch is staged
//! in the store and published by a single `commit`; if any event or the
//! commit fails, the store is rolled back, the watermark stays where it
//! was and the error is returned. A failed `consume` therefore never leaves
//! part of a batch applied.

use super::watermark::{batch_max_version, validate_batch, Watermark};
use super::DataConsumer;
use crate::config::ConsumerConfig;
use crate::event::{DataEvent, Payload, Version, VersionComparator};
use crate::metrics::{BatchSummary, ConsumerMetrics};
use crate::store::{IndexStore, Indexable};
use crate::ConsumptionError;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// Applies ordered batches of events to an index store.
pub struct IndexingConsumer<D, S> {
    store: S,
    comparator: Arc<dyn VersionComparator>,
    watermark: Watermark,
    validate_ordering: bool,
    metrics: Arc<ConsumerMetrics>,
    _data: PhantomData<fn(D)>,
}

impl<D, S> IndexingConsumer<D, S>
where
    D: Indexable,
    S: IndexStore<D>,
{
    /// Create a consumer using the configured version ordering.
    pub fn new(store: S, config: &ConsumerConfig) -> Self {
        Self::with_comparator(store, config.version_ordering, config.validate_ordering)
    }

    /// Create a consumer with a custom comparator.
    pub fn with_comparator(
        store: S,
        comparator: impl VersionComparator + 'static,
        validate_ordering: bool,
    ) -> Self {
        Self {
            store,
            comparator: Arc::new(comparator),
            watermark: Watermark::new(),
            validate_ordering,
            metrics: Arc::new(ConsumerMetrics::new()),
            _data: PhantomData,
        }
    }

    /// Share a metrics registry with other pipeline components.
    pub fn with_metrics(mut self, metrics: Arc<ConsumerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Resume from a checkpointed version.
    pub fn starting_at(mut self, version: Version) -> Self {
        self.watermark = Watermark::starting_at(version);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn watermark(&self) -> &Watermark {
        &self.watermark
    }

    pub fn metrics(&self) -> Arc<ConsumerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Stage every event of the batch in the store.
    ///
    /// On error the caller rolls back; the returned error carries how many
    /// events were staged before the failure.
    fn stage(&mut self, batch: Vec<DataEvent<D>>) -> Result<BatchSummary, ConsumptionError> {
        let mut summary = BatchSummary::default();

        for (applied, event) in batch.into_iter().enumerate() {
            let kind = event.kind();
            let weight = event.weight();
            let (version, payload) = event.into_parts();

            let result = match payload {
                Payload::Marker => Ok(()),
                Payload::Delete(doc) => self.store.delete(&doc.key()),
                // A payload that reports itself deleted is removed, not written.
                Payload::Upsert(doc) if doc.is_deleted() => self.store.delete(&doc.key()),
                Payload::Upsert(doc) => self.store.upsert(doc),
            };

            if let Err(source) = result {
                return Err(ConsumptionError::Store {
                    version,
                    applied,
                    source,
                });
            }
            summary.record(kind, weight);
        }

        Ok(summary)
    }

    fn fail(&mut self, err: ConsumptionError) -> Result<(), ConsumptionError> {
        self.metrics.record_batch_failed();
        warn!(
            error = %err,
            watermark = ?self.watermark.current(),
            "Batch rejected"
        );
        Err(err)
    }
}

impl<D, S> DataConsumer for IndexingConsumer<D, S>
where
    D: Indexable,
    S: IndexStore<D>,
{
    type Data = D;

    fn consume(&mut self, batch: Vec<DataEvent<D>>) -> Result<(), ConsumptionError> {
        let Some(max_version) = batch_max_version(&batch, self.comparator.as_ref()).cloned()
        else {
            return Ok(());
        };

        if self.validate_ordering {
            if let Err(err) = validate_batch(&batch, self.comparator.as_ref(), &self.watermark) {
                return self.fail(err);
            }
        }

        let summary = match self.stage(batch) {
            Ok(summary) => summary,
            Err(err) => {
                self.store.rollback();
                return self.fail(err);
            }
        };

        if let Err(source) = self.store.commit() {
            self.store.rollback();
            return self.fail(ConsumptionError::Commit(source));
        }

        // Never regresses, even when validation is off and the batch was stale.
        self.watermark.advance(&max_version, self.comparator.as_ref());
        self.metrics.record_batch(&summary);

        debug!(
            events = summary.events(),
            upserts = summary.upserts,
            deletes = summary.deletes,
            markers = summary.markers,
            weight = summary.weight,
            version = ?self.watermark.current(),
            "Batch consumed"
        );

        Ok(())
    }

    fn version(&self) -> Option<Version> {
        self.watermark.current().cloned()
    }

    fn version_comparator(&self) -> &dyn VersionComparator {
        self.comparator.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::VersionOrdering;
    use crate::store::MemoryIndex;
    use crate::StoreError;

    #[derive(Debug, Clone, PartialEq)]
    struct Doc {
        id: &'static str,
        tombstone: bool,
    }

    impl Indexable for Doc {
        type Key = &'static str;

        fn key(&self) -> &'static str {
            self.id
        }

        fn is_deleted(&self) -> bool {
            self.tombstone
        }
    }

    fn live(id: &'static str) -> Doc {
        Doc {
            id,
            tombstone: false,
        }
    }

    fn consumer(index: &MemoryIndex<Doc>) -> IndexingConsumer<Doc, MemoryIndex<Doc>> {
        IndexingConsumer::new(index.clone(), &ConsumerConfig::default())
    }

    /// Store whose commit always fails.
    struct FailingCommit(MemoryIndex<Doc>);

    impl IndexStore<Doc> for FailingCommit {
        fn upsert(&mut self, doc: Doc) -> Result<(), StoreError> {
            self.0.upsert(doc)
        }

        fn delete(&mut self, key: &&'static str) -> Result<(), StoreError> {
            self.0.delete(key)
        }

        fn commit(&mut self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("flush target down".into()))
        }

        fn rollback(&mut self) {
            self.0.rollback()
        }
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let index = MemoryIndex::new();
        let mut consumer = consumer(&index);
        consumer.consume(Vec::new()).unwrap();
        assert!(consumer.version().is_none());
        assert_eq!(consumer.metrics().batches_consumed(), 0);
    }

    #[test]
    fn test_payload_tombstone_deletes_on_upsert() {
        let index = MemoryIndex::new();
        let mut consumer = consumer(&index);
        consumer
            .consume(vec![DataEvent::new(live("x"), "1")])
            .unwrap();

        let tombstone = Doc {
            id: "x",
            tombstone: true,
        };
        consumer
            .consume(vec![DataEvent::new(tombstone, "2")])
            .unwrap();
        assert!(!index.contains(&"x"));
    }

    #[test]
    fn test_store_failure_rolls_back_whole_batch() {
        let index = MemoryIndex::with_capacity_limit(Some(2));
        let mut consumer = consumer(&index);
        consumer
            .consume(vec![DataEvent::new(live("a"), "1")])
            .unwrap();

        let err = consumer
            .consume(vec![
                DataEvent::with_delete(live("a"), "2", true),
                DataEvent::new(live("b"), "3"),
                DataEvent::new(live("c"), "4"),
                DataEvent::new(live("d"), "5"),
            ])
            .unwrap_err();

        match err {
            ConsumptionError::Store {
                version, applied, ..
            } => {
                assert_eq!(version.as_str(), "5");
                assert_eq!(applied, 3);
            }
            other => panic!("expected Store error, got {:?}", other),
        }

        // Nothing from the failed batch survives, watermark untouched
        assert_eq!(index.keys(), vec!["a"]);
        assert_eq!(consumer.version(), Some(Version::from("1")));
        assert_eq!(consumer.metrics().batches_failed(), 1);
    }

    #[test]
    fn test_commit_failure_rolls_back() {
        let index = MemoryIndex::new();
        let mut consumer: IndexingConsumer<Doc, _> = IndexingConsumer::with_comparator(
            FailingCommit(index.clone()),
            VersionOrdering::Numeric,
            true,
        );

        let err = consumer
            .consume(vec![DataEvent::new(live("a"), "1")])
            .unwrap_err();
        assert!(matches!(err, ConsumptionError::Commit(_)));
        assert!(index.is_empty());
        assert!(consumer.version().is_none());
    }

    #[test]
    fn test_starting_at_checkpoint() {
        let index = MemoryIndex::new();
        let mut consumer = consumer(&index).starting_at(Version::from("100"));

        let err = consumer
            .consume(vec![DataEvent::new(live("a"), "100")])
            .unwrap_err();
        assert!(matches!(err, ConsumptionError::StaleBatch { .. }));

        consumer
            .consume(vec![DataEvent::new(live("a"), "101")])
            .unwrap();
        assert_eq!(consumer.version(), Some(Version::from("101")));
    }

    #[test]
    fn test_custom_comparator_is_published() {
        let index: MemoryIndex<Doc> = MemoryIndex::new();
        let reverse = |a: &Version, b: &Version| b.as_str().cmp(a.as_str());
        let mut consumer: IndexingConsumer<Doc, _> =
            IndexingConsumer::with_comparator(index.clone(), reverse, true);

        // Descending tokens are ascending under the reverse comparator
        consumer
            .consume(vec![
                DataEvent::new(live("a"), "9"),
                DataEvent::new(live("b"), "5"),
            ])
            .unwrap();
        assert_eq!(consumer.version(), Some(Version::from("5")));
        assert!(consumer
            .version_comparator()
            .is_before(&Version::from("9"), &Version::from("1")));
    }
}
