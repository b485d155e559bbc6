//! End-to-end labeling sessions over simulated CartPole pairs.
//!
//! Uses the in-process store and the raw video encoder, so no external
//! tools are needed.

use std::path::Path;
use std::time::Duration;

use rlduels::pipeline::{EncoderKind, PipelineConfig, PipelineOrchestrator};
use rlduels::session::{read_records, SessionError};
use rlduels::trajectory::{PairId, Preference};

const WAIT: Duration = Duration::from_secs(10);

fn config(dir: &Path, entries: usize) -> PipelineConfig {
    let mut config = PipelineConfig::default()
        .with_database_url("memory")
        .with_video_folder(dir.join("videos"))
        .with_encoder(EncoderKind::Raw)
        .with_max_queue_size(2)
        .with_poll_interval(Duration::from_millis(10))
        .with_result_file(dir.join("out").join("preferences.json"));
    config.max_entries = entries;
    config.max_episode_steps = 12;
    config
}

async fn orchestrator(config: PipelineConfig) -> PipelineOrchestrator {
    let orchestrator = PipelineOrchestrator::new(config).await.expect("orchestrator");
    orchestrator.simulate(11).await.expect("simulate");
    orchestrator
}

#[tokio::test]
async fn test_full_session_exports_every_pair() {
    let dir = tempfile::tempdir().expect("tempdir");
    let orchestrator = orchestrator(config(dir.path(), 3)).await;
    let mut session = orchestrator.start_session().await.expect("session");

    let first = session.current_pair().await;
    assert_eq!(first.id, PairId(1));
    let first_video = first.video1.clone().expect("rendered");
    assert!(first_video.exists());
    assert!(session.rewards().is_some());
    session.submit_preference(Preference::First).await.expect("label");

    // Moving on releases the previous pair's videos
    let second = session.next_pair_within(WAIT).await.expect("second pair");
    assert_eq!(second.id, PairId(2));
    assert!(!first_video.exists());
    session.skip().await.expect("skip");

    let third = session.next_pair_within(WAIT).await.expect("third pair");
    assert_eq!(third.id, PairId(3));
    session.submit_preference(Preference::Indifferent).await.expect("tie");

    assert!(session.next_pair_within(Duration::from_millis(100)).await.is_none());
    assert_eq!(session.labeled_count(), 2);

    let result_file = session.settings().result_file.clone();
    let records = session.terminate().await.expect("terminate");
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].preference, Some(Preference::First));
    assert_eq!(records[0].score, Some(0.0));
    assert!(records[1].skipped && records[1].preference.is_none());
    assert_eq!(records[2].score, Some(0.5));
    assert!(records.iter().all(|r| r.env_name == "CartPole-v1"));

    assert_eq!(read_records(&result_file).await.expect("read"), records);

    let counts = orchestrator.label_counts().await.expect("counts");
    assert_eq!((counts.labeled, counts.skipped, counts.pending), (2, 1, 0));

    // No video survives the session
    let leftover = std::fs::read_dir(dir.path().join("videos"))
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0);
}

#[tokio::test]
async fn test_session_rules() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path(), 2)
        .with_allow_ties(false)
        .with_allow_skipping(false);
    let orchestrator = orchestrator(config).await;
    let mut session = orchestrator.start_session().await.expect("session");

    assert!(matches!(
        session.submit_preference(Preference::First).await,
        Err(SessionError::NoCurrentPair)
    ));

    session.current_pair().await;
    assert!(matches!(
        session.submit_preference(Preference::Indifferent).await,
        Err(SessionError::TiesNotAllowed)
    ));
    assert!(matches!(session.skip().await, Err(SessionError::SkippingNotAllowed)));

    // Still the same pair until it is labeled
    assert_eq!(session.current_pair().await.id, PairId(1));
    session.submit_preference(Preference::Second).await.expect("label");
    // Repeating an answer already stored is accepted
    session.submit_preference(Preference::Second).await.expect("repeat");

    assert_eq!(session.current_pair().await.id, PairId(2));
    let records = session.terminate().await.expect("terminate");
    assert_eq!(records[0].preference, Some(Preference::Second));
    assert_eq!(records[1].preference, None);
}

#[tokio::test]
async fn test_new_session_resumes_where_labels_stop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let orchestrator = orchestrator(config(dir.path(), 3)).await;

    let mut session = orchestrator.start_session().await.expect("session");
    assert_eq!(session.current_pair().await.id, PairId(1));
    session.submit_preference(Preference::First).await.expect("label");
    session.terminate().await.expect("terminate");

    let mut resumed = orchestrator.start_session().await.expect("session");
    assert_eq!(resumed.current_pair().await.id, PairId(2));
    resumed.terminate().await.expect("terminate");
}
