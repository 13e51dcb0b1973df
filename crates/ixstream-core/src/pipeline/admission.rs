//! Weight-based admission between producers and the batch driver.
//!
//! Every admitted event holds semaphore permits equal to its weight until
//! the batch containing it has been delivered. Producers therefore stall
//! once `max_pending_weight` worth of events is in flight, whatever the
//! event count.

use crate::config::PipelineConfig;
use crate::event::DataEvent;
use crate::metrics::ConsumerMetrics;
use crate::PipelineError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::debug;

struct Admitted<D> {
    event: DataEvent<D>,
    permit: Option<OwnedSemaphorePermit>,
}

/// Create a weight-bounded event channel.
pub fn channel<D>(
    config: &PipelineConfig,
    metrics: Arc<ConsumerMetrics>,
) -> (EventSender<D>, EventReceiver<D>) {
    let capacity = usize::try_from(config.max_pending_weight)
        .unwrap_or(usize::MAX)
        .min(Semaphore::MAX_PERMITS);
    let budget = Arc::new(Semaphore::new(capacity));
    let (tx, rx) = mpsc::unbounded_channel();

    (
        EventSender {
            tx,
            budget: Arc::clone(&budget),
            capacity: capacity as u64,
            metrics,
        },
        EventReceiver { rx, budget },
    )
}

/// Producer handle. Cloneable; the channel closes when every clone is gone.
pub struct EventSender<D> {
    tx: mpsc::UnboundedSender<Admitted<D>>,
    budget: Arc<Semaphore>,
    capacity: u64,
    metrics: Arc<ConsumerMetrics>,
}

impl<D> Clone for EventSender<D> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            budget: Arc::clone(&self.budget),
            capacity: self.capacity,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<D> EventSender<D> {
    /// Admit an event, waiting while too much weight is in flight.
    pub async fn send(&self, event: DataEvent<D>) -> Result<(), PipelineError> {
        let permits = self.permits_for(event.weight());
        let permit = if permits == 0 {
            None
        } else {
            match Arc::clone(&self.budget).try_acquire_many_owned(permits) {
                Ok(permit) => Some(permit),
                Err(TryAcquireError::Closed) => return Err(PipelineError::Closed),
                Err(TryAcquireError::NoPermits) => {
                    self.metrics.record_backpressure();
                    debug!(
                        weight = permits,
                        pending_weight = self.pending_weight(),
                        "Admission waiting for weight budget"
                    );
                    let permit = Arc::clone(&self.budget)
                        .acquire_many_owned(permits)
                        .await
                        .map_err(|_| PipelineError::Closed)?;
                    Some(permit)
                }
            }
        };

        self.tx
            .send(Admitted { event, permit })
            .map_err(|_| PipelineError::Closed)
    }

    /// Admit an event only if its weight fits the remaining budget.
    pub fn try_send(&self, event: DataEvent<D>) -> Result<(), PipelineError> {
        let permits = self.permits_for(event.weight());
        let permit = if permits == 0 {
            None
        } else {
            match Arc::clone(&self.budget).try_acquire_many_owned(permits) {
                Ok(permit) => Some(permit),
                Err(TryAcquireError::Closed) => return Err(PipelineError::Closed),
                Err(TryAcquireError::NoPermits) => {
                    self.metrics.record_backpressure();
                    return Err(PipelineError::Backpressure {
                        pending_weight: self.pending_weight(),
                        max_weight: self.capacity,
                    });
                }
            }
        };

        self.tx
            .send(Admitted { event, permit })
            .map_err(|_| PipelineError::Closed)
    }

    /// Admit every event of a batch in order.
    pub async fn send_all(&self, events: Vec<DataEvent<D>>) -> Result<(), PipelineError> {
        for event in events {
            self.send(event).await?;
        }
        Ok(())
    }

    /// Weight admitted but not yet delivered.
    pub fn pending_weight(&self) -> u64 {
        self.capacity
            .saturating_sub(self.budget.available_permits() as u64)
    }

    /// Total weight budget.
    pub fn max_weight(&self) -> u64 {
        self.capacity
    }

    // An event heavier than the whole budget is clamped so it can still pass
    // once the pipeline is otherwise empty.
    fn permits_for(&self, weight: u32) -> u32 {
        u64::from(weight).min(self.capacity) as u32
    }
}

/// A batch taken off the channel. Its weight stays reserved until dropped.
pub struct AdmittedBatch<D> {
    events: Vec<DataEvent<D>>,
    permits: Vec<OwnedSemaphorePermit>,
}

impl<D> AdmittedBatch<D> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            permits: Vec::new(),
        }
    }

    fn push(&mut self, admitted: Admitted<D>) {
        self.events.push(admitted.event);
        if let Some(permit) = admitted.permit {
            self.permits.push(permit);
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Weight reserved by this batch.
    pub fn weight(&self) -> u64 {
        self.permits
            .iter()
            .map(|p| p.num_permits() as u64)
            .sum()
    }

    /// Split into the events and a guard that releases their weight on drop.
    pub fn into_parts(self) -> (Vec<DataEvent<D>>, WeightGuard) {
        (self.events, WeightGuard(self.permits))
    }
}

/// Releases reserved weight when dropped.
pub struct WeightGuard(Vec<OwnedSemaphorePermit>);

impl WeightGuard {
    /// Weight still held.
    pub fn weight(&self) -> u64 {
        self.0.iter().map(|p| p.num_permits() as u64).sum()
    }
}

/// Driver side of the channel.
pub struct EventReceiver<D> {
    rx: mpsc::UnboundedReceiver<Admitted<D>>,
    budget: Arc<Semaphore>,
}

impl<D> EventReceiver<D> {
    /// Wait for the next batch of up to `max_events` events.
    ///
    /// Blocks until at least one event arrives, then keeps gathering until
    /// the batch is full or `timeout` has elapsed. Returns `None` once
    /// every sender is gone and the channel is drained.
    pub async fn next_batch(
        &mut self,
        max_events: usize,
        timeout: Duration,
    ) -> Option<AdmittedBatch<D>> {
        let first = self.rx.recv().await?;
        let mut batch = AdmittedBatch::with_capacity(max_events);
        batch.push(first);

        let deadline = tokio::time::Instant::now() + timeout;
        while batch.len() < max_events {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }

            match tokio::time::timeout(remaining, self.rx.recv()).await {
                Ok(Some(admitted)) => batch.push(admitted),
                Ok(None) | Err(_) => break,
            }
        }

        Some(batch)
    }
}

impl<D> Drop for EventReceiver<D> {
    fn drop(&mut self) {
        // Wake producers blocked on the budget; they will see `Closed`.
        self.budget.close();
    }
}
