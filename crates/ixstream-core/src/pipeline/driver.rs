//! Drives a consumer from an admission channel.

use super::admission::EventReceiver;
use super::retry::RetryConfig;
use crate::config::PipelineConfig;
use crate::consumer::{DataConsumer, Synchronized};
use crate::event::{batch_weight, sort_batch, DataEvent, Version};
use crate::metrics::ConsumerMetrics;
use crate::PipelineError;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Totals for a driver run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DriverStats {
    pub batches: u64,
    pub events: u64,
    pub weight: u64,
    pub last_version: Option<Version>,
}

/// Gathers admitted events into batches and hands them to a consumer.
///
/// Each batch is sorted with the consumer's comparator before delivery and
/// must start strictly after the last delivered version. Consumption runs
/// on the blocking thread pool since `consume` is synchronous.
pub struct BatchDriver<C: DataConsumer> {
    consumer: Synchronized<C>,
    config: PipelineConfig,
    retry: RetryConfig,
    metrics: Arc<ConsumerMetrics>,
    delivered: Option<Version>,
    stats: DriverStats,
}

impl<C> BatchDriver<C>
where
    C: DataConsumer + Send + 'static,
    C::Data: Clone + Send + 'static,
{
    pub fn new(consumer: C, config: &PipelineConfig, metrics: Arc<ConsumerMetrics>) -> Self {
        Self::shared(Synchronized::new(consumer), config, metrics)
    }

    /// Drive a consumer that other tasks also hold.
    pub fn shared(
        consumer: Synchronized<C>,
        config: &PipelineConfig,
        metrics: Arc<ConsumerMetrics>,
    ) -> Self {
        let delivered = consumer.version();
        Self {
            consumer,
            config: config.clone(),
            retry: RetryConfig::from_pipeline(config),
            metrics,
            delivered,
            stats: DriverStats::default(),
        }
    }

    /// Override the retry policy derived from the pipeline config.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Handle to the driven consumer.
    pub fn consumer(&self) -> Synchronized<C> {
        self.consumer.clone()
    }

    /// Highest version handed to the consumer so far.
    pub fn delivered_version(&self) -> Option<&Version> {
        self.delivered.as_ref()
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    /// Sort a batch and deliver it, retrying transient consumer failures.
    pub async fn deliver(&mut self, mut events: Vec<DataEvent<C::Data>>) -> Result<(), PipelineError> {
        if events.is_empty() {
            return Ok(());
        }

        let max_version = {
            let guard = self.consumer.lock();
            let comparator = guard.version_comparator();
            sort_batch(&mut events, comparator);

            let first = events[0].version();
            if let Some(delivered) = &self.delivered {
                if !comparator.is_before(delivered, first) {
                    return Err(PipelineError::Interleaved {
                        delivered: delivered.clone(),
                        version: first.clone(),
                    });
                }
            }
            // Stable sort: the last event carries the batch maximum.
            events[events.len() - 1].version().clone()
        };

        let count = events.len() as u64;
        let weight = batch_weight(&events);
        let mut pending = events;
        let mut attempt = 0u32;

        loop {
            let last_attempt = attempt >= self.retry.max_retries;
            let batch = if last_attempt {
                std::mem::take(&mut pending)
            } else {
                pending.clone()
            };

            let consumer = self.consumer.clone();
            let result = tokio::task::spawn_blocking(move || consumer.consume(batch)).await?;

            match result {
                Ok(()) => break,
                Err(e) if e.is_contract_violation() => {
                    error!(error = %e, "Consumer rejected batch");
                    return Err(PipelineError::Rejected(e));
                }
                Err(e) if last_attempt => {
                    error!(attempts = attempt + 1, error = %e, "Batch delivery failed");
                    return Err(PipelineError::RetriesExhausted {
                        attempts: attempt + 1,
                        source: e,
                    });
                }
                Err(e) => {
                    let delay = self.retry.calculate_delay(attempt);
                    self.metrics.record_retry();
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Batch delivery failed, retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }

        debug!(events = count, weight, version = %max_version, "Batch delivered");

        self.stats.batches += 1;
        self.stats.events += count;
        self.stats.weight += weight;
        self.stats.last_version = Some(max_version.clone());
        self.delivered = Some(max_version);
        Ok(())
    }

    /// Run until every sender is dropped or a shutdown signal arrives.
    ///
    /// Dropping every shutdown sender counts as a signal. Events still being
    /// gathered into a batch when the signal arrives are not delivered.
    pub async fn run(
        mut self,
        mut rx: EventReceiver<C::Data>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<DriverStats, PipelineError> {
        info!(
            batch_size = self.config.batch_size,
            batch_timeout_ms = self.config.batch_timeout_ms,
            max_pending_weight = self.config.max_pending_weight,
            "Batch driver started"
        );

        loop {
            let batch = tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
                batch = rx.next_batch(self.config.batch_size, self.config.batch_timeout()) => batch,
            };

            let Some(batch) = batch else {
                info!("All producers closed");
                break;
            };

            // Weight is released only after the consumer is done with the batch.
            let (events, _weight) = batch.into_parts();
            self.deliver(events).await?;
        }

        info!(
            batches = self.stats.batches,
            events = self.stats.events,
            version = ?self.stats.last_version,
            "Batch driver stopped"
        );
        Ok(self.stats)
    }
}
