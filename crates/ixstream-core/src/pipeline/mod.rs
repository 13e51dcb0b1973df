//! Producer side of the consumer contract.
//!
//! Producers admit events through a weight-bounded channel; a
//! `BatchDriver` gathers them into batches by count and time, sorts each
//! batch with the consumer's comparator and delivers it, retrying
//! transient failures with exponential backoff.
//!
//! ```text
//! EventSender ──(weight budget)──> EventReceiver ──> BatchDriver ──> DataConsumer
//! ```

mod admission;
mod driver;
mod retry;

pub use admission::{channel, AdmittedBatch, EventReceiver, EventSender, WeightGuard};
pub use driver::{BatchDriver, DriverStats};
pub use retry::RetryConfig;
