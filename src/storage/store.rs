//! The record store contract shared by every backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::trajectory::{PairDraft, PairId, Preference, TrajectoryPair};

/// Partial update of a pair's label state.
///
/// Fields left as `None` are not touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelUpdate {
    pub preference: Option<Preference>,
    pub skipped: Option<bool>,
}

impl LabelUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the preference.
    pub fn with_preference(mut self, preference: Preference) -> Self {
        self.preference = Some(preference);
        self
    }

    /// Sets the skipped flag.
    pub fn with_skipped(mut self, skipped: bool) -> Self {
        self.skipped = Some(skipped);
        self
    }

    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        self.preference.is_none() && self.skipped.is_none()
    }

    /// Returns true if applying this update to `pair` would change it.
    pub fn changes(&self, pair: &TrajectoryPair) -> bool {
        let preference_changes = self
            .preference
            .is_some_and(|p| pair.preference != Some(p));
        let skipped_changes = self.skipped.is_some_and(|s| pair.skipped != s);
        preference_changes || skipped_changes
    }

    /// Applies the set fields to `pair`.
    pub fn apply(&self, pair: &mut TrajectoryPair) {
        if let Some(preference) = self.preference {
            pair.preference = Some(preference);
        }
        if let Some(skipped) = self.skipped {
            pair.skipped = skipped;
        }
    }
}

/// Label progress across the whole store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCounts {
    pub total: u64,
    pub labeled: u64,
    pub skipped: u64,
    pub pending: u64,
}

/// Persistent collection of trajectory pairs.
///
/// Stores are stateless with respect to iteration: callers pass the last id
/// they saw and the store answers with the next unprocessed entry after it.
/// Nothing is cached between calls, so concurrent writes are visible to the
/// next query.
#[async_trait]
pub trait PairStore: Send + Sync {
    /// Stores a new pair and returns its identifier.
    ///
    /// Identifiers are strictly increasing in insertion order.
    async fn insert(&self, draft: PairDraft) -> Result<PairId, StoreError>;

    /// Looks up a pair by identifier.
    async fn find(&self, id: PairId) -> Result<Option<TrajectoryPair>, StoreError>;

    /// Removes a pair.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if no pair has this identifier.
    async fn delete(&self, id: PairId) -> Result<(), StoreError>;

    /// Returns the unprocessed pair with the smallest identifier strictly
    /// greater than `after`, or the smallest overall when `after` is `None`.
    ///
    /// A pair is unprocessed when it has no preference and is not skipped.
    /// `Ok(None)` means there is nothing left.
    async fn get_next_unprocessed(
        &self,
        after: Option<PairId>,
    ) -> Result<Option<TrajectoryPair>, StoreError>;

    /// Applies a partial label update.
    ///
    /// # Errors
    ///
    /// - `StoreError::EmptyUpdate` if the update sets nothing
    /// - `StoreError::NotFound` if no pair has this identifier
    /// - `StoreError::NoOpUpdate` if the stored values already match
    async fn update_labels(&self, id: PairId, update: &LabelUpdate) -> Result<(), StoreError>;

    /// Every pair with its preference, in identifier order.
    async fn gather_preferences(
        &self,
    ) -> Result<Vec<(TrajectoryPair, Option<Preference>)>, StoreError>;

    /// Counts pairs by label state.
    async fn label_counts(&self) -> Result<LabelCounts, StoreError>;
}
