//! SQLite schema and query templates for the pair store.

/// Schema applied on every open. Idempotent.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS trajectory_pairs (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    env_name        TEXT    NOT NULL,
    trajectory1     TEXT    NOT NULL,
    trajectory2     TEXT    NOT NULL,
    preference      TEXT,
    skipped         INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT    NOT NULL DEFAULT (datetime('now')),
    updated_at      TEXT    NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_trajectory_pairs_unprocessed
    ON trajectory_pairs(id) WHERE preference IS NULL AND skipped = 0;
"#;

pub const INSERT_PAIR: &str = r#"
INSERT INTO trajectory_pairs (env_name, trajectory1, trajectory2)
VALUES (?1, ?2, ?3)
"#;

pub const SELECT_PAIR: &str = r#"
SELECT id, trajectory1, trajectory2, preference, skipped
FROM trajectory_pairs
WHERE id = ?1
"#;

/// Smallest unprocessed id strictly after the cursor. A NULL cursor means
/// "from the beginning".
pub const SELECT_NEXT_UNPROCESSED: &str = r#"
SELECT id, trajectory1, trajectory2, preference, skipped
FROM trajectory_pairs
WHERE preference IS NULL
  AND skipped = 0
  AND (?1 IS NULL OR id > ?1)
ORDER BY id ASC
LIMIT 1
"#;

/// Applies only the fields that are bound and actually differ.
///
/// `?2`/`?3` carry a flag saying whether the field is part of the update,
/// so a missing field never counts as a change.
pub const UPDATE_LABELS: &str = r#"
UPDATE trajectory_pairs
SET preference = CASE WHEN ?2 THEN ?4 ELSE preference END,
    skipped    = CASE WHEN ?3 THEN ?5 ELSE skipped END,
    updated_at = datetime('now')
WHERE id = ?1
  AND ((?2 AND preference IS NOT ?4) OR (?3 AND skipped IS NOT ?5))
"#;

pub const PAIR_EXISTS: &str = "SELECT 1 FROM trajectory_pairs WHERE id = ?1";

pub const DELETE_PAIR: &str = "DELETE FROM trajectory_pairs WHERE id = ?1";

pub const SELECT_ALL_PAIRS: &str = r#"
SELECT id, trajectory1, trajectory2, preference, skipped
FROM trajectory_pairs
ORDER BY id ASC
"#;

pub const LABEL_COUNTS: &str = r#"
SELECT
    COUNT(*)                                                        AS total,
    COALESCE(SUM(CASE WHEN preference IS NOT NULL THEN 1 END), 0)   AS labeled,
    COALESCE(SUM(CASE WHEN skipped = 1 THEN 1 END), 0)              AS skipped,
    COALESCE(SUM(CASE WHEN preference IS NULL AND skipped = 0 THEN 1 END), 0) AS pending
FROM trajectory_pairs
"#;
