//! Error types for the ixstream core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.

use crate::event::Version;
use thiserror::Error;

/// Result type alias for ixstream operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for ixstream.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A batch could not be consumed
    #[error("Consumption error: {0}")]
    Consumption(#[from] ConsumptionError),

    /// Index store error outside of a consume call
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Malformed event
    #[error("Event error: {0}")]
    Event(#[from] EventError),

    /// Pipeline controller error
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

/// Raised by `DataConsumer::consume` when a batch cannot be applied.
///
/// The reference consumer applies batches all-or-nothing: whenever this
/// error is returned its store has been rolled back and its watermark is
/// unchanged. Implementations that cannot stage mutations report how far
/// they got through `Store::applied`.
#[derive(Error, Debug)]
pub enum ConsumptionError {
    /// Two events inside one batch are not in ascending version order
    #[error("Out-of-order event: version {version} follows {previous}")]
    OutOfOrder { previous: Version, version: Version },

    /// Batch minimum does not exceed the consumer watermark
    #[error("Stale batch: version {version} is not after watermark {watermark}")]
    StaleBatch { watermark: Version, version: Version },

    /// The downstream store rejected an event
    #[error("Store failed at version {version} after {applied} applied events: {source}")]
    Store {
        version: Version,
        applied: usize,
        #[source]
        source: StoreError,
    },

    /// The downstream store refused to publish the staged batch
    #[error("Commit failed: {0}")]
    Commit(#[source] StoreError),
}

impl ConsumptionError {
    /// Whether the failure is a caller contract violation rather than a
    /// downstream fault. Retrying such a batch unchanged cannot succeed.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            ConsumptionError::OutOfOrder { .. } | ConsumptionError::StaleBatch { .. }
        )
    }
}

/// Index store errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Store reached its document limit
    #[error("Capacity exceeded: {limit} documents")]
    CapacityExceeded { limit: usize },

    /// Store is not reachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Generic store error
    #[error("Store error: {0}")]
    Other(String),
}

/// Event construction errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventError {
    /// Version token is empty
    #[error("Event version must not be empty")]
    EmptyVersion,

    /// A delete event arrived without the payload identifying its entity
    #[error("Delete event at version {0} carries no payload")]
    MissingPayload(Version),

    /// Payload lacks the field used as document key
    #[error("Payload at version {version} has no key field '{field}'")]
    MissingKey { version: Version, field: String },
}

/// Pipeline controller errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Admission refused: too much weight in flight
    #[error("Backpressure engaged: {pending_weight} of {max_weight} weight pending")]
    Backpressure { pending_weight: u64, max_weight: u64 },

    /// The receiving side of the pipeline has gone away
    #[error("Pipeline closed")]
    Closed,

    /// A batch overlaps the version range already delivered
    #[error("Batch interleaves delivered versions: {version} is not after {delivered}")]
    Interleaved { delivered: Version, version: Version },

    /// The consumer refused the batch as a contract violation
    #[error("Batch rejected: {0}")]
    Rejected(#[source] ConsumptionError),

    /// A batch kept failing after all retries
    #[error("Batch failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: ConsumptionError,
    },

    /// The blocking consume task panicked or was cancelled
    #[error("Consume task failed: {0}")]
    Task(String),
}

// Conversion implementations for external error types

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        PipelineError::Task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("invalid value".into());
        assert_eq!(err.to_string(), "Configuration error: invalid value");

        let stale = ConsumptionError::StaleBatch {
            watermark: Version::from("7"),
            version: Version::from("5"),
        };
        let err: Error = stale.into();
        assert!(err.to_string().contains("Stale batch"));
        assert!(err.to_string().contains("watermark 7"));
    }

    #[test]
    fn test_store_error_in_consumption() {
        let err = ConsumptionError::Store {
            version: Version::from("3"),
            applied: 2,
            source: StoreError::CapacityExceeded { limit: 10 },
        };
        assert_eq!(
            err.to_string(),
            "Store failed at version 3 after 2 applied events: Capacity exceeded: 10 documents"
        );
        assert!(!err.is_contract_violation());
    }

    #[test]
    fn test_contract_violations() {
        let err = ConsumptionError::OutOfOrder {
            previous: Version::from("2"),
            version: Version::from("1"),
        };
        assert!(err.is_contract_violation());

        let err = ConsumptionError::Commit(StoreError::Unavailable("down".into()));
        assert!(!err.is_contract_violation());
    }

    #[test]
    fn test_pipeline_error() {
        let err = PipelineError::Backpressure {
            pending_weight: 900,
            max_weight: 1000,
        };
        assert_eq!(
            err.to_string(),
            "Backpressure engaged: 900 of 1000 weight pending"
        );
    }
}
