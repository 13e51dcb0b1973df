//! Flat, serde-friendly form of a data event for transports and files.

use super::data_event::{DataEvent, Payload};
use super::version::Version;
use crate::EventError;
use serde::{Deserialize, Serialize};

/// Serializable event record.
///
/// A record without `data` and without `delete` is a marker. A delete
/// without `data` is rejected: the consumer would have nothing to key the
/// removal on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord<D> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<D>,
    pub version: Version,
    #[serde(default, skip_serializing_if = "is_false")]
    pub delete: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub weight: u32,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

impl<D> TryFrom<EventRecord<D>> for DataEvent<D> {
    type Error = EventError;

    fn try_from(record: EventRecord<D>) -> Result<Self, Self::Error> {
        if record.version.is_empty() {
            return Err(EventError::EmptyVersion);
        }

        match (record.data, record.delete) {
            (Some(data), delete) => {
                Ok(DataEvent::with_delete(data, record.version, delete).weighted(record.weight))
            }
            (None, false) => Ok(DataEvent::marker(record.version)),
            (None, true) => Err(EventError::MissingPayload(record.version)),
        }
    }
}

impl<D> From<DataEvent<D>> for EventRecord<D> {
    fn from(event: DataEvent<D>) -> Self {
        let weight = event.weight();
        let (version, payload) = event.into_parts();
        let (data, delete) = match payload {
            Payload::Upsert(data) => (Some(data), false),
            Payload::Delete(data) => (Some(data), true),
            Payload::Marker => (None, false),
        };
        Self {
            data,
            version,
            delete,
            weight,
        }
    }
}
