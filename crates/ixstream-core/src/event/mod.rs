//! Event model: versioned data events, markers and version ordering.

mod data_event;
mod record;
mod version;

pub use data_event::{batch_weight, sort_batch, DataEvent, EventKind, Payload};
pub use record::EventRecord;
pub use version::{Version, VersionComparator, VersionOrdering};
