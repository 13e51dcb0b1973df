//! The unit of change handed to a consumer.

use super::version::{Version, VersionComparator};
use serde::{Deserialize, Serialize};

/// Discriminant of a data event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Insert or replace the entity carried by the payload
    Upsert,
    /// Remove the entity identified by the payload
    Delete,
    /// Advance the watermark without touching the store
    Marker,
}

impl EventKind {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Upsert => "upsert",
            EventKind::Delete => "delete",
            EventKind::Marker => "marker",
        }
    }
}

/// Event payload, tagged with what the consumer should do with it.
///
/// Only markers lack a payload, so a payload-less upsert or delete cannot
/// be represented.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<D> {
    Upsert(D),
    Delete(D),
    Marker,
}

/// One versioned data mutation.
///
/// Immutable after construction. `weight` is advisory (typically the
/// serialized size in bytes) and is read by admission control upstream of
/// the consumer, never by the consumer contract itself.
#[derive(Debug, Clone, PartialEq)]
pub struct DataEvent<D> {
    payload: Payload<D>,
    version: Version,
    weight: u32,
}

impl<D> DataEvent<D> {
    /// Create an upsert event with zero weight.
    pub fn new(data: D, version: impl Into<Version>) -> Self {
        Self {
            payload: Payload::Upsert(data),
            version: version.into(),
            weight: 0,
        }
    }

    /// Create an event that deletes the payload's entity when `delete` is set.
    ///
    /// The delete flag takes precedence over anything the payload itself
    /// says about liveness.
    pub fn with_delete(data: D, version: impl Into<Version>, delete: bool) -> Self {
        let payload = if delete {
            Payload::Delete(data)
        } else {
            Payload::Upsert(data)
        };
        Self {
            payload,
            version: version.into(),
            weight: 0,
        }
    }

    /// Create an upsert event carrying an admission weight.
    pub fn with_weight(data: D, version: impl Into<Version>, weight: u32) -> Self {
        Self {
            payload: Payload::Upsert(data),
            version: version.into(),
            weight,
        }
    }

    /// Create a marker: no payload, never a delete, zero weight.
    pub fn marker(version: impl Into<Version>) -> Self {
        Self {
            payload: Payload::Marker,
            version: version.into(),
            weight: 0,
        }
    }

    /// Replace the weight of a non-marker event. Markers keep zero weight.
    pub(crate) fn weighted(mut self, weight: u32) -> Self {
        if !self.is_marker() {
            self.weight = weight;
        }
        self
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// The payload, absent for markers.
    pub fn data(&self) -> Option<&D> {
        match &self.payload {
            Payload::Upsert(data) | Payload::Delete(data) => Some(data),
            Payload::Marker => None,
        }
    }

    pub fn payload(&self) -> &Payload<D> {
        &self.payload
    }

    pub fn kind(&self) -> EventKind {
        match self.payload {
            Payload::Upsert(_) => EventKind::Upsert,
            Payload::Delete(_) => EventKind::Delete,
            Payload::Marker => EventKind::Marker,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self.payload, Payload::Delete(_))
    }

    pub fn is_marker(&self) -> bool {
        matches!(self.payload, Payload::Marker)
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Take the payload out of the event.
    pub fn into_data(self) -> Option<D> {
        match self.payload {
            Payload::Upsert(data) | Payload::Delete(data) => Some(data),
            Payload::Marker => None,
        }
    }

    /// Split the event into its version and tagged payload.
    pub fn into_parts(self) -> (Version, Payload<D>) {
        (self.version, self.payload)
    }

    /// Convert the payload, keeping kind, version and weight.
    pub fn try_map<U, E>(self, f: impl FnOnce(D) -> Result<U, E>) -> Result<DataEvent<U>, E> {
        let payload = match self.payload {
            Payload::Upsert(data) => Payload::Upsert(f(data)?),
            Payload::Delete(data) => Payload::Delete(f(data)?),
            Payload::Marker => Payload::Marker,
        };
        Ok(DataEvent {
            payload,
            version: self.version,
            weight: self.weight,
        })
    }
}

/// Stable-sort a batch ascending with a consumer's comparator.
///
/// Events with equal versions keep their submission order.
pub fn sort_batch<D>(batch: &mut [DataEvent<D>], comparator: &dyn VersionComparator) {
    batch.sort_by(|a, b| comparator.compare(a.version(), b.version()));
}

/// Sum of the advisory weights in a batch.
pub fn batch_weight<D>(batch: &[DataEvent<D>]) -> u64 {
    batch.iter().map(|e| u64::from(e.weight())).sum()
}
