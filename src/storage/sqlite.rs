//! SQLite-backed pair store.
//!
//! Trajectories are stored as JSON text next to the label columns. The schema
//! is created on open, so a fresh file is usable immediately.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use super::schema::{
    DELETE_PAIR, INSERT_PAIR, LABEL_COUNTS, PAIR_EXISTS, SCHEMA_SQL, SELECT_ALL_PAIRS,
    SELECT_NEXT_UNPROCESSED, SELECT_PAIR, UPDATE_LABELS,
};
use super::store::{LabelCounts, LabelUpdate, PairStore};
use crate::error::StoreError;
use crate::trajectory::{PairDraft, PairId, Preference, Trajectory, TrajectoryPair};

/// Pair store on a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path`.
    ///
    /// Accepts a plain file path or a `sqlite:` URL.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite://{}", path)
        };

        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        let store = Self::from_pool(pool).await?;
        info!(path = path, "Pair store opened");
        Ok(store)
    }

    /// Opens a private in-memory database.
    ///
    /// The pool holds a single connection that is never recycled, since the
    /// database lives only as long as that connection.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wraps an existing pool and applies the schema.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(SCHEMA_SQL).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Closes the pool. Later calls fail with `ConnectionFailure`.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn exists(&self, id: PairId) -> Result<bool, StoreError> {
        Ok(sqlx::query(PAIR_EXISTS)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?
            .is_some())
    }
}

fn row_to_pair(row: &SqliteRow) -> Result<TrajectoryPair, StoreError> {
    let id = PairId(row.try_get::<i64, _>("id")?);
    let trajectory1: Trajectory = serde_json::from_str(row.try_get::<&str, _>("trajectory1")?)?;
    let trajectory2: Trajectory = serde_json::from_str(row.try_get::<&str, _>("trajectory2")?)?;

    let preference = match row.try_get::<Option<String>, _>("preference")? {
        Some(raw) => Some(Preference::parse(&raw).ok_or_else(|| {
            StoreError::Persistence(format!("pair {id} has unknown preference '{raw}'"))
        })?),
        None => None,
    };

    Ok(TrajectoryPair {
        id,
        trajectory1,
        trajectory2,
        preference,
        skipped: row.try_get::<i64, _>("skipped")? != 0,
        video1: None,
        video2: None,
    })
}

#[async_trait]
impl PairStore for SqliteStore {
    async fn insert(&self, draft: PairDraft) -> Result<PairId, StoreError> {
        let result = sqlx::query(INSERT_PAIR)
            .bind(draft.env_name())
            .bind(serde_json::to_string(draft.trajectory1())?)
            .bind(serde_json::to_string(draft.trajectory2())?)
            .execute(&self.pool)
            .await?;

        let id = PairId(result.last_insert_rowid());
        debug!(pair_id = %id, env = draft.env_name(), "Inserted pair");
        Ok(id)
    }

    async fn find(&self, id: PairId) -> Result<Option<TrajectoryPair>, StoreError> {
        sqlx::query(SELECT_PAIR)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(row_to_pair)
            .transpose()
    }

    async fn delete(&self, id: PairId) -> Result<(), StoreError> {
        let result = sqlx::query(DELETE_PAIR)
            .bind(id.get())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn get_next_unprocessed(
        &self,
        after: Option<PairId>,
    ) -> Result<Option<TrajectoryPair>, StoreError> {
        sqlx::query(SELECT_NEXT_UNPROCESSED)
            .bind(after.map(PairId::get))
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(row_to_pair)
            .transpose()
    }

    async fn update_labels(&self, id: PairId, update: &LabelUpdate) -> Result<(), StoreError> {
        if update.is_empty() {
            return Err(StoreError::EmptyUpdate);
        }

        let result = sqlx::query(UPDATE_LABELS)
            .bind(id.get())
            .bind(update.preference.is_some())
            .bind(update.skipped.is_some())
            .bind(update.preference.map(Preference::as_str))
            .bind(update.skipped)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            debug!(pair_id = %id, ?update, "Updated labels");
            return Ok(());
        }

        if self.exists(id).await? {
            Err(StoreError::NoOpUpdate(id))
        } else {
            Err(StoreError::NotFound(id))
        }
    }

    async fn gather_preferences(
        &self,
    ) -> Result<Vec<(TrajectoryPair, Option<Preference>)>, StoreError> {
        sqlx::query(SELECT_ALL_PAIRS)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| row_to_pair(row).map(|pair| {
                let preference = pair.preference;
                (pair, preference)
            }))
            .collect()
    }

    async fn label_counts(&self) -> Result<LabelCounts, StoreError> {
        let row = sqlx::query(LABEL_COUNTS).fetch_one(&self.pool).await?;
        Ok(LabelCounts {
            total: row.try_get::<i64, _>("total")? as u64,
            labeled: row.try_get::<i64, _>("labeled")? as u64,
            skipped: row.try_get::<i64, _>("skipped")? as u64,
            pending: row.try_get::<i64, _>("pending")? as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::Reconstruction;

    fn draft() -> PairDraft {
        let t = Trajectory::new("CartPole-v1", Reconstruction::seeded(vec![3]), vec![]);
        PairDraft::new(t.clone(), t).expect("draft")
    }

    #[tokio::test]
    async fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pairs.db");
        let path = path.to_string_lossy().into_owned();

        let store = SqliteStore::open(&path).await.expect("open");
        let id = store.insert(draft()).await.expect("insert");
        store
            .update_labels(id, &LabelUpdate::new().with_preference(Preference::Second))
            .await
            .expect("update");
        store.close().await;

        let reopened = SqliteStore::open(&path).await.expect("reopen");
        let pair = reopened.find(id).await.expect("find").expect("present");
        assert_eq!(pair.preference, Some(Preference::Second));
        assert_eq!(pair.trajectory1, draft().trajectory1().clone());
    }

    #[tokio::test]
    async fn test_closed_pool_is_connection_failure() {
        let store = SqliteStore::open_in_memory().await.expect("open");
        store.close().await;
        let err = store.get_next_unprocessed(None).await.expect_err("closed");
        assert!(matches!(err, StoreError::ConnectionFailure(_)));
        assert!(err.is_retryable());
    }
}
