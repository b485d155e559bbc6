//! Export of collected preferences.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::trajectory::{PairId, Preference, TrajectoryPair};

/// Errors that can occur while writing or reading an export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One exported label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceRecord {
    pub pair_id: PairId,
    pub env_name: String,
    pub preference: Option<Preference>,
    /// 0.0 for the first trajectory, 1.0 for the second, 0.5 for a tie.
    pub score: Option<f64>,
    pub skipped: bool,
}

impl PreferenceRecord {
    /// Builds the record for one stored pair.
    pub fn from_pair(pair: &TrajectoryPair, preference: Option<Preference>) -> Self {
        Self {
            pair_id: pair.id,
            env_name: pair.env_name().to_string(),
            preference,
            score: preference.map(Preference::score),
            skipped: pair.skipped,
        }
    }
}

/// Converts gathered preferences into export records, keeping their order.
pub fn preference_records(gathered: &[(TrajectoryPair, Option<Preference>)]) -> Vec<PreferenceRecord> {
    gathered
        .iter()
        .map(|(pair, preference)| PreferenceRecord::from_pair(pair, *preference))
        .collect()
}

/// Writes records as a pretty-printed JSON array, creating parent directories.
pub async fn write_records(path: &Path, records: &[PreferenceRecord]) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_vec_pretty(records)?;
    tokio::fs::write(path, json).await?;

    info!(path = %path.display(), records = records.len(), "Exported preferences");
    Ok(())
}

/// Reads an export written by [`write_records`].
pub async fn read_records(path: &Path) -> Result<Vec<PreferenceRecord>, ExportError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::{PairDraft, Reconstruction, Trajectory};

    fn pair(id: i64) -> TrajectoryPair {
        let t = Trajectory::new("CartPole-v1", Reconstruction::seeded(vec![0]), vec![]);
        TrajectoryPair::from_draft(PairId(id), PairDraft::new(t.clone(), t).expect("draft"))
    }

    #[test]
    fn test_records_carry_scores() {
        let mut skipped = pair(3);
        skipped.skip();
        let gathered = vec![
            (pair(1), Some(Preference::Second)),
            (pair(2), Some(Preference::Indifferent)),
            (skipped, None),
        ];

        let records = preference_records(&gathered);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].score, Some(1.0));
        assert_eq!(records[1].score, Some(0.5));
        assert_eq!(records[2].score, None);
        assert!(records[2].skipped);
        assert_eq!(records[2].pair_id, PairId(3));
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("preferences.json");
        let records = preference_records(&[(pair(1), Some(Preference::First))]);

        write_records(&path, &records).await.expect("write");
        let text = std::fs::read_to_string(&path).expect("read");
        assert!(text.contains("\"preference\": \"first\""));
        assert!(text.contains("\"pair_id\": 1"));

        assert_eq!(read_records(&path).await.expect("read back"), records);
    }
}
