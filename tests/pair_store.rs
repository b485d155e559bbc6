//! Contract tests shared by every `PairStore` backend.

use rlduels::storage::{InMemoryStore, LabelUpdate, PairStore, SqliteStore};
use rlduels::trajectory::{
    Action, PairDraft, PairId, Preference, Reconstruction, Trajectory, Transition,
};
use rlduels::StoreError;

fn trajectory(seed: u64, rewards: &[f64]) -> Trajectory {
    let transitions = rewards
        .iter()
        .enumerate()
        .map(|(i, &reward)| Transition {
            state: vec![0.01 * i as f64; 4],
            action: Action::Discrete(1),
            reward,
            terminated: i + 1 == rewards.len(),
            truncated: false,
            next_state: vec![0.01 * (i + 1) as f64; 4],
        })
        .collect();
    Trajectory::new("CartPole-v1", Reconstruction::seeded(vec![seed]), transitions)
}

fn draft(seed: u64) -> PairDraft {
    PairDraft::new(trajectory(seed, &[1.0, 1.0]), trajectory(seed + 1, &[1.0])).expect("draft")
}

async fn backends() -> Vec<(&'static str, Box<dyn PairStore>)> {
    vec![
        ("memory", Box::new(InMemoryStore::new())),
        (
            "sqlite",
            Box::new(SqliteStore::open_in_memory().await.expect("sqlite")),
        ),
    ]
}

#[tokio::test]
async fn test_insert_assigns_increasing_ids_and_round_trips() {
    for (name, store) in backends().await {
        let a = store.insert(draft(1)).await.expect("insert");
        let b = store.insert(draft(2)).await.expect("insert");
        assert!(a < b, "{name}: ids must increase");

        let pair = store.find(a).await.expect("find").expect("present");
        assert_eq!(pair.trajectory1, trajectory(1, &[1.0, 1.0]), "{name}");
        assert_eq!(pair.trajectory2.reconstruction.seeds, vec![2], "{name}");
        assert!(pair.preference.is_none() && !pair.skipped, "{name}");
        assert!(!pair.has_videos(), "{name}");

        assert!(store.find(PairId(99)).await.expect("find").is_none(), "{name}");
    }
}

#[tokio::test]
async fn test_next_unprocessed_walks_cursor() {
    for (name, store) in backends().await {
        for seed in 0..4 {
            store.insert(draft(seed)).await.expect("insert");
        }
        store
            .update_labels(PairId(2), &LabelUpdate::new().with_preference(Preference::Second))
            .await
            .expect("label");

        let first = store.get_next_unprocessed(None).await.expect("next");
        assert_eq!(first.map(|p| p.id), Some(PairId(1)), "{name}");

        let after_one = store.get_next_unprocessed(Some(PairId(1))).await.expect("next");
        assert_eq!(after_one.map(|p| p.id), Some(PairId(3)), "{name}");

        let after_four = store.get_next_unprocessed(Some(PairId(4))).await.expect("next");
        assert!(after_four.is_none(), "{name}");

        // Cursors need not name an existing pair
        let after_gap = store.get_next_unprocessed(Some(PairId(0))).await.expect("next");
        assert_eq!(after_gap.map(|p| p.id), Some(PairId(1)), "{name}");
    }
}

#[tokio::test]
async fn test_update_labels_outcomes() {
    for (name, store) in backends().await {
        let id = store.insert(draft(0)).await.expect("insert");
        let prefer = LabelUpdate::new().with_preference(Preference::Indifferent);

        store.update_labels(id, &prefer).await.expect("first update");
        assert!(
            matches!(store.update_labels(id, &prefer).await, Err(StoreError::NoOpUpdate(i)) if i == id),
            "{name}"
        );
        assert!(
            matches!(
                store.update_labels(PairId(42), &prefer).await,
                Err(StoreError::NotFound(PairId(42)))
            ),
            "{name}"
        );
        assert!(
            matches!(
                store.update_labels(id, &LabelUpdate::new()).await,
                Err(StoreError::EmptyUpdate)
            ),
            "{name}"
        );

        // A changed field next to an unchanged one still counts
        let both = prefer.with_skipped(true);
        store.update_labels(id, &both).await.expect("skip update");

        let pair = store.find(id).await.expect("find").expect("present");
        assert_eq!(pair.preference, Some(Preference::Indifferent), "{name}");
        assert!(pair.skipped, "{name}");
    }
}

#[tokio::test]
async fn test_delete_and_counts() {
    for (name, store) in backends().await {
        for seed in 0..4 {
            store.insert(draft(seed)).await.expect("insert");
        }
        store
            .update_labels(PairId(1), &LabelUpdate::new().with_preference(Preference::First))
            .await
            .expect("label");
        store
            .update_labels(PairId(2), &LabelUpdate::new().with_skipped(true))
            .await
            .expect("skip");
        store.delete(PairId(4)).await.expect("delete");
        assert!(
            matches!(store.delete(PairId(4)).await, Err(StoreError::NotFound(_))),
            "{name}"
        );

        let counts = store.label_counts().await.expect("counts");
        assert_eq!(counts.total, 3, "{name}");
        assert_eq!(counts.labeled, 1, "{name}");
        assert_eq!(counts.skipped, 1, "{name}");
        assert_eq!(counts.pending, 1, "{name}");

        let gathered = store.gather_preferences().await.expect("gather");
        let summary: Vec<_> = gathered.iter().map(|(p, pref)| (p.id, *pref)).collect();
        assert_eq!(
            summary,
            vec![
                (PairId(1), Some(Preference::First)),
                (PairId(2), None),
                (PairId(3), None),
            ],
            "{name}"
        );
    }
}
