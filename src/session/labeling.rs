//! Labeling session: one evaluator working through the pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::export::{preference_records, write_records, ExportError, PreferenceRecord};
use crate::error::StoreError;
use crate::pipeline::BufferedPipeline;
use crate::storage::{LabelUpdate, PairStore};
use crate::trajectory::{PairId, Preference, TrajectoryPair};

/// Errors that can occur during a labeling session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Ties are not allowed in this session")]
    TiesNotAllowed,

    #[error("Skipping is not allowed in this session")]
    SkippingNotAllowed,

    #[error("No pair is currently being labeled")]
    NoCurrentPair,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

/// Session rules and output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Whether "indifferent" is an acceptable answer.
    pub allow_ties: bool,
    /// Whether a pair may be skipped.
    pub allow_skipping: bool,
    /// Where [`LabelingSession::terminate`] writes the export.
    pub result_file: PathBuf,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            allow_ties: true,
            allow_skipping: true,
            result_file: PathBuf::from("preferences.json"),
        }
    }
}

/// Owns the pipeline and the pair currently shown to the evaluator.
///
/// The previous pair's videos are deleted before the next pair is fetched,
/// and the current pair's videos on termination.
pub struct LabelingSession {
    store: Arc<dyn PairStore>,
    pipeline: BufferedPipeline,
    settings: SessionSettings,
    current: Option<TrajectoryPair>,
    labeled: u64,
}

impl LabelingSession {
    /// Creates a session over a running pipeline.
    pub fn new(store: Arc<dyn PairStore>, pipeline: BufferedPipeline, settings: SessionSettings) -> Self {
        Self {
            store,
            pipeline,
            settings,
            current: None,
            labeled: 0,
        }
    }

    /// Returns the pair to label, fetching the next one if needed.
    ///
    /// A pair that was labeled or skipped is released first. Waits as long
    /// as the pipeline has nothing buffered.
    pub async fn current_pair(&mut self) -> &TrajectoryPair {
        let pair = match self.current.take() {
            Some(pair) if !pair.is_resolved() => pair,
            previous => {
                Self::release(previous).await;
                let next = self.pipeline.dequeue_next().await;
                debug!(pair_id = %next.id, "Presenting pair");
                next
            }
        };
        self.current.insert(pair)
    }

    /// Like [`Self::current_pair`] but gives up after `wait`.
    ///
    /// Returns `None` if no pair arrived in time; the previous pair has been
    /// released in that case.
    pub async fn next_pair_within(&mut self, wait: Duration) -> Option<&TrajectoryPair> {
        let pair = match self.current.take() {
            Some(pair) if !pair.is_resolved() => pair,
            previous => {
                Self::release(previous).await;
                let next = tokio::time::timeout(wait, self.pipeline.dequeue_next())
                    .await
                    .ok()?;
                debug!(pair_id = %next.id, "Presenting pair");
                next
            }
        };
        Some(self.current.insert(pair))
    }

    /// The pair currently shown, if any, without fetching.
    pub fn peek(&self) -> Option<&TrajectoryPair> {
        self.current.as_ref()
    }

    /// Records the evaluator's preference for the current pair.
    ///
    /// A preference identical to the stored one is accepted as is.
    pub async fn submit_preference(&mut self, preference: Preference) -> Result<(), SessionError> {
        if preference == Preference::Indifferent && !self.settings.allow_ties {
            return Err(SessionError::TiesNotAllowed);
        }

        let id = self.current_id()?;
        self.write_labels(id, LabelUpdate::new().with_preference(preference))
            .await?;

        if let Some(pair) = self.current.as_mut() {
            pair.prefer(preference);
        }
        self.labeled += 1;
        info!(pair_id = %id, %preference, "Preference recorded");
        Ok(())
    }

    /// Skips the current pair for good.
    pub async fn skip(&mut self) -> Result<(), SessionError> {
        if !self.settings.allow_skipping {
            return Err(SessionError::SkippingNotAllowed);
        }

        let id = self.current_id()?;
        self.write_labels(id, LabelUpdate::new().with_skipped(true))
            .await?;

        if let Some(pair) = self.current.as_mut() {
            pair.skip();
        }
        info!(pair_id = %id, "Pair skipped");
        Ok(())
    }

    /// Total rewards of the current pair's trajectories.
    pub fn rewards(&self) -> Option<(f64, f64)> {
        self.current.as_ref().map(|pair| {
            (
                pair.trajectory1.total_reward(),
                pair.trajectory2.total_reward(),
            )
        })
    }

    /// Number of preferences recorded in this session.
    pub fn labeled_count(&self) -> u64 {
        self.labeled
    }

    /// Session rules.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// The pipeline feeding this session.
    pub fn pipeline(&self) -> &BufferedPipeline {
        &self.pipeline
    }

    /// Ends the session and exports every label in the store.
    ///
    /// Videos of the current pair and of anything still buffered are
    /// deleted, and the pipeline is shut down, even if gathering fails.
    pub async fn terminate(mut self) -> Result<Vec<PreferenceRecord>, SessionError> {
        let gathered = self.store.gather_preferences().await;

        Self::release(self.current.take()).await;
        self.pipeline.shutdown().await;
        for mut pair in self.pipeline.drain().await {
            pair.delete_videos().await;
        }

        let records = preference_records(&gathered?);
        write_records(&self.settings.result_file, &records).await?;
        info!(
            labeled = self.labeled,
            exported = records.len(),
            "Labeling session terminated"
        );
        Ok(records)
    }

    fn current_id(&self) -> Result<PairId, SessionError> {
        self.current
            .as_ref()
            .map(|pair| pair.id)
            .ok_or(SessionError::NoCurrentPair)
    }

    async fn release(pair: Option<TrajectoryPair>) {
        if let Some(mut pair) = pair {
            pair.delete_videos().await;
        }
    }

    async fn write_labels(&self, id: PairId, update: LabelUpdate) -> Result<(), SessionError> {
        match self.store.update_labels(id, &update).await {
            Ok(()) => Ok(()),
            Err(StoreError::NoOpUpdate(id)) => {
                warn!(pair_id = %id, "Labels already stored, nothing to update");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
