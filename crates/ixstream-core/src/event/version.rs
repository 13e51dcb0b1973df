//! Opaque version tokens and the comparators that order them.
//!
//! A `Version` carries no ordering of its own. Every consumer publishes the
//! total order it uses through a `VersionComparator`, and producers sort
//! their batches with that exact comparator.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Position of an event in the global change stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    /// Wrap a raw version token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the token is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the version, returning the raw token.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Version {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl From<String> for Version {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// Total order over version tokens.
pub trait VersionComparator: Send + Sync {
    /// Compare two versions.
    fn compare(&self, a: &Version, b: &Version) -> Ordering;

    /// Whether `a` sorts strictly before `b`.
    fn is_before(&self, a: &Version, b: &Version) -> bool {
        self.compare(a, b) == Ordering::Less
    }

    /// The later of two versions; `a` wins ties.
    fn max<'a>(&self, a: &'a Version, b: &'a Version) -> &'a Version {
        if self.compare(b, a) == Ordering::Greater {
            b
        } else {
            a
        }
    }
}

impl<F> VersionComparator for F
where
    F: Fn(&Version, &Version) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &Version, b: &Version) -> Ordering {
        self(a, b)
    }
}

/// Built-in version orderings, selectable from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionOrdering {
    /// Unsigned decimal integers of any length.
    ///
    /// Tokens that are not all ASCII digits sort after every numeric token
    /// and compare byte-wise among themselves.
    #[default]
    Numeric,
    /// Byte-wise string order
    Lexicographic,
}

impl VersionComparator for VersionOrdering {
    fn compare(&self, a: &Version, b: &Version) -> Ordering {
        match self {
            VersionOrdering::Lexicographic => a.as_str().cmp(b.as_str()),
            VersionOrdering::Numeric => compare_numeric(a.as_str(), b.as_str()),
        }
    }
}

fn is_numeric(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

fn compare_numeric(a: &str, b: &str) -> Ordering {
    match (is_numeric(a), is_numeric(b)) {
        (true, true) => {
            let a = a.trim_start_matches('0');
            let b = b.trim_start_matches('0');
            // Without leading zeros, a longer digit string is a larger number.
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}
