//! Persistent storage for trajectory pairs and their labels.
//!
//! # Overview
//!
//! - **PairStore**: async trait every backend implements. Iteration is
//!   cursor-based and stateless: the caller keeps the last seen id.
//! - **SqliteStore**: sqlx SQLite backend, schema created on open
//! - **InMemoryStore**: map behind an async lock, for tests and one-off runs
//!
//! # Usage
//!
//! ```rust,ignore
//! use rlduels::storage::{LabelUpdate, PairStore, SqliteStore};
//! use rlduels::trajectory::Preference;
//!
//! let store = SqliteStore::open("pairs.db").await?;
//! let id = store.insert(draft).await?;
//!
//! if let Some(pair) = store.get_next_unprocessed(None).await? {
//!     store
//!         .update_labels(pair.id, &LabelUpdate::new().with_preference(Preference::First))
//!         .await?;
//! }
//! ```

pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod store;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use store::{LabelCounts, LabelUpdate, PairStore};

/// Opens the store named by a database URL.
///
/// `memory` (or `memory://`) selects the in-process store; anything else is
/// treated as a SQLite path or URL.
pub async fn open_store(
    database_url: &str,
) -> Result<std::sync::Arc<dyn PairStore>, crate::error::StoreError> {
    match database_url {
        "memory" | "memory://" => Ok(std::sync::Arc::new(InMemoryStore::new())),
        url => Ok(std::sync::Arc::new(SqliteStore::open(url).await?)),
    }
}
