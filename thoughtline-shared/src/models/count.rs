//! Candidate counts and the displayed count record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// Channel a candidate count arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CountSource {
    /// Last persisted value, only used to seed a thread.
    Cache,
    /// Local provisional bump after a submission signal.
    Optimistic,
    /// Scraped from the mounted region or carried by a widget message.
    Observed,
    /// Authoritative answer from the discussion service.
    Remote,
}

impl CountSource {
    /// Remote answers may move the displayed value down.
    #[must_use]
    pub const fn is_authoritative(self) -> bool {
        matches!(self, Self::Remote)
    }
}

/// Visual hint attached to a count change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CountCue {
    /// The count went up.
    Increased,
    /// A remote answer replaced a different displayed value.
    Corrected,
}

/// The displayed count of a thread and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRecord {
    /// Count shown on the card.
    pub value: u64,
    /// Channel that supplied `value`.
    pub source: CountSource,
    /// When `value` was accepted.
    pub updated_at: DateTime<Utc>,
}

/// A proposed count from one of the four channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// Proposed count.
    pub value: u64,
    /// Channel the proposal arrived on.
    pub source: CountSource,
}

impl Candidate {
    /// Creates a candidate with the given value and source.
    #[must_use]
    pub const fn new(value: u64, source: CountSource) -> Self {
        Self { value, source }
    }

    /// Authoritative count from the discussion service.
    #[must_use]
    pub const fn remote(value: u64) -> Self {
        Self::new(value, CountSource::Remote)
    }

    /// Count seen in the mounted region or a widget message.
    #[must_use]
    pub const fn observed(value: u64) -> Self {
        Self::new(value, CountSource::Observed)
    }

    /// Local bump after a submission.
    #[must_use]
    pub const fn optimistic(value: u64) -> Self {
        Self::new(value, CountSource::Optimistic)
    }

    /// Persisted count of an earlier visit.
    #[must_use]
    pub const fn cache(value: u64) -> Self {
        Self::new(value, CountSource::Cache)
    }
}
