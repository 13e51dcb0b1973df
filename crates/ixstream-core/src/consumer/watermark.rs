//! Monotonic "last received version" tracking.

use crate::event::{DataEvent, Version, VersionComparator};
use crate::ConsumptionError;
use chrono::{DateTime, Utc};

/// Highest version a consumer has received. Only ever moves forward.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Watermark {
    current: Option<Version>,
    advanced_at: Option<DateTime<Utc>>,
}

impl Watermark {
    /// Create an empty watermark.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a watermark resumed from a previously persisted version.
    pub fn starting_at(version: Version) -> Self {
        Self {
            current: Some(version),
            advanced_at: None,
        }
    }

    pub fn current(&self) -> Option<&Version> {
        self.current.as_ref()
    }

    /// When the watermark last moved, if it moved in this process.
    pub fn advanced_at(&self) -> Option<DateTime<Utc>> {
        self.advanced_at
    }

    /// Reject `version` unless it is strictly after the watermark.
    pub fn check_floor(
        &self,
        version: &Version,
        comparator: &dyn VersionComparator,
    ) -> Result<(), ConsumptionError> {
        match &self.current {
            Some(current) if !comparator.is_before(current, version) => {
                Err(ConsumptionError::StaleBatch {
                    watermark: current.clone(),
                    version: version.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Move the watermark to `version` if it is later than the current one.
    ///
    /// Returns whether the watermark moved.
    pub fn advance(&mut self, version: &Version, comparator: &dyn VersionComparator) -> bool {
        let moves = match &self.current {
            Some(current) => comparator.is_before(current, version),
            None => true,
        };
        if moves {
            self.current = Some(version.clone());
            self.advanced_at = Some(Utc::now());
        }
        moves
    }
}

/// Check a batch against the ordering contract.
///
/// Events must be non-decreasing under `comparator` and the first one must
/// be strictly after `watermark`. Equal versions inside a batch are allowed.
pub fn validate_batch<D>(
    batch: &[DataEvent<D>],
    comparator: &dyn VersionComparator,
    watermark: &Watermark,
) -> Result<(), ConsumptionError> {
    let Some(first) = batch.first() else {
        return Ok(());
    };
    watermark.check_floor(first.version(), comparator)?;

    for pair in batch.windows(2) {
        let (previous, next) = (pair[0].version(), pair[1].version());
        if comparator.is_before(next, previous) {
            return Err(ConsumptionError::OutOfOrder {
                previous: previous.clone(),
                version: next.clone(),
            });
        }
    }
    Ok(())
}

/// Latest version in a batch under `comparator`, regardless of batch order.
pub fn batch_max_version<'a, D>(
    batch: &'a [DataEvent<D>],
    comparator: &dyn VersionComparator,
) -> Option<&'a Version> {
    batch
        .iter()
        .map(DataEvent::version)
        .reduce(|max, next| comparator.max(max, next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::VersionOrdering;

    const NUMERIC: VersionOrdering = VersionOrdering::Numeric;

    #[test]
    fn test_watermark_only_moves_forward() {
        let mut watermark = Watermark::new();
        assert!(watermark.current().is_none());

        assert!(watermark.advance(&Version::from("5"), &NUMERIC));
        assert!(watermark.advanced_at().is_some());
        assert!(!watermark.advance(&Version::from("3"), &NUMERIC));
        assert!(!watermark.advance(&Version::from("5"), &NUMERIC));
        assert_eq!(watermark.current().map(Version::as_str), Some("5"));

        assert!(watermark.advance(&Version::from("10"), &NUMERIC));
        assert_eq!(watermark.current().map(Version::as_str), Some("10"));
    }

    #[test]
    fn test_check_floor() {
        let watermark = Watermark::starting_at(Version::from("5"));
        assert!(watermark.advanced_at().is_none());
        assert!(watermark.check_floor(&Version::from("6"), &NUMERIC).is_ok());

        let err = watermark
            .check_floor(&Version::from("5"), &NUMERIC)
            .unwrap_err();
        assert!(matches!(err, ConsumptionError::StaleBatch { .. }));

        assert!(Watermark::new()
            .check_floor(&Version::from("0"), &NUMERIC)
            .is_ok());
    }

    #[test]
    fn test_validate_batch_order() {
        let watermark = Watermark::new();
        let sorted = vec![
            DataEvent::new("a", "1"),
            DataEvent::new("b", "1"),
            DataEvent::new("c", "2"),
        ];
        assert!(validate_batch(&sorted, &NUMERIC, &watermark).is_ok());

        let unsorted = vec![DataEvent::new("a", "2"), DataEvent::new("b", "1")];
        match validate_batch(&unsorted, &NUMERIC, &watermark) {
            Err(ConsumptionError::OutOfOrder { previous, version }) => {
                assert_eq!(previous.as_str(), "2");
                assert_eq!(version.as_str(), "1");
            }
            other => panic!("expected OutOfOrder, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_empty_batch() {
        let batch: Vec<DataEvent<&str>> = Vec::new();
        let watermark = Watermark::starting_at(Version::from("9"));
        assert!(validate_batch(&batch, &NUMERIC, &watermark).is_ok());
    }

    #[test]
    fn test_batch_max_version() {
        let batch = vec![
            DataEvent::new("a", "3"),
            DataEvent::new("b", "11"),
            DataEvent::new("c", "2"),
        ];
        assert_eq!(
            batch_max_version(&batch, &NUMERIC).map(Version::as_str),
            Some("11")
        );
        assert_eq!(
            batch_max_version(&batch, &VersionOrdering::Lexicographic).map(Version::as_str),
            Some("3")
        );
    }
}
