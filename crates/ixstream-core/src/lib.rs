//! ixstream core - versioned event consumption for incremental indexing
//!
//! This library defines the contract between producers of versioned data
//! events and the consumers that apply them downstream:
//!
//! - `DataEvent` carries a payload, an opaque version token and a weight
//! - `DataConsumer` applies ordered batches and reports its version
//! - `IndexingConsumer` applies batches all-or-nothing to an `IndexStore`
//! - `pipeline` batches, sorts and delivers events with weight-bounded admission

pub mod config;
pub mod consumer;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use consumer::{DataConsumer, IndexingConsumer};
pub use error::{ConsumptionError, EventError, PipelineError, StoreError};
pub use error::{Error, Result};
pub use event::{DataEvent, Version, VersionComparator, VersionOrdering};
