//! In-process pair store.

use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::store::{LabelCounts, LabelUpdate, PairStore};
use crate::error::StoreError;
use crate::trajectory::{PairDraft, PairId, Preference, TrajectoryPair};

#[derive(Debug, Default)]
struct Inner {
    pairs: BTreeMap<PairId, TrajectoryPair>,
    last_id: i64,
}

/// Pair store kept entirely in memory. Identifiers start at 1.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored pairs.
    pub async fn len(&self) -> usize {
        self.inner.read().await.pairs.len()
    }

    /// Returns true if the store holds no pairs.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.pairs.is_empty()
    }
}

#[async_trait]
impl PairStore for InMemoryStore {
    async fn insert(&self, draft: PairDraft) -> Result<PairId, StoreError> {
        let mut inner = self.inner.write().await;
        inner.last_id += 1;
        let id = PairId(inner.last_id);
        inner.pairs.insert(id, TrajectoryPair::from_draft(id, draft));
        debug!(pair_id = %id, "Inserted pair");
        Ok(id)
    }

    async fn find(&self, id: PairId) -> Result<Option<TrajectoryPair>, StoreError> {
        Ok(self.inner.read().await.pairs.get(&id).cloned())
    }

    async fn delete(&self, id: PairId) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .pairs
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    async fn get_next_unprocessed(
        &self,
        after: Option<PairId>,
    ) -> Result<Option<TrajectoryPair>, StoreError> {
        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };

        Ok(self
            .inner
            .read()
            .await
            .pairs
            .range((lower, Bound::Unbounded))
            .map(|(_, pair)| pair)
            .find(|pair| !pair.is_resolved())
            .cloned())
    }

    async fn update_labels(&self, id: PairId, update: &LabelUpdate) -> Result<(), StoreError> {
        if update.is_empty() {
            return Err(StoreError::EmptyUpdate);
        }

        let mut inner = self.inner.write().await;
        let pair = inner.pairs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if !update.changes(pair) {
            return Err(StoreError::NoOpUpdate(id));
        }
        update.apply(pair);
        Ok(())
    }

    async fn gather_preferences(
        &self,
    ) -> Result<Vec<(TrajectoryPair, Option<Preference>)>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .pairs
            .values()
            .map(|pair| (pair.clone(), pair.preference))
            .collect())
    }

    async fn label_counts(&self) -> Result<LabelCounts, StoreError> {
        let inner = self.inner.read().await;
        let mut counts = LabelCounts {
            total: inner.pairs.len() as u64,
            ..LabelCounts::default()
        };
        for pair in inner.pairs.values() {
            if pair.preference.is_some() {
                counts.labeled += 1;
            }
            if pair.skipped {
                counts.skipped += 1;
            }
            if !pair.is_resolved() {
                counts.pending += 1;
            }
        }
        Ok(counts)
    }
}
