use eventlake_ingest::{PassOutcome, Pipeline};

use crate::helpers::{make_config, pass_log, zip_archive, FakeFeed};

const FIRST: &str = "20210901000000.export.CSV";
const BAD: &str = "20210901001500.export.CSV";
const NEXT: &str = "20210901003000.export.CSV";

#[tokio::test]
async fn test_schema_violation_leaves_dataset_unchanged() {
    let tmp = tempfile::tempdir().unwrap();
    let config = make_config(tmp.path(), &FakeFeed::pointer_url());
    let feed = FakeFeed::new();
    let pipeline = Pipeline::with_fetcher(&config, feed.clone()).unwrap();

    feed.publish(FIRST, "1\t010\thttp://a\n");
    pipeline.run_pass().await.unwrap();
    let dataset = config.storage.dataset_path();
    let before = std::fs::read(&dataset).unwrap();

    feed.publish(BAD, "2\t020\thttp://b\n3\t030\n");
    let err = pipeline.run_pass().await.unwrap_err();
    assert_eq!(err.kind(), "schema_mismatch");
    assert_eq!(std::fs::read(&dataset).unwrap(), before);
    assert_eq!(
        pipeline.merger().store().last_identifier().unwrap().as_deref(),
        Some(FIRST)
    );

    // The bad snapshot is ledgered; later passes neither wedge on it nor refetch it.
    let outcome = pipeline.run_pass().await.unwrap();
    assert_eq!(outcome.kind(), "up_to_date");
    assert_eq!(std::fs::read(&dataset).unwrap(), before);

    feed.publish(NEXT, "4\t040\thttp://d\n");
    match pipeline.run_pass().await.unwrap() {
        PassOutcome::Ingested { identifier, rows_inserted, .. } => {
            assert_eq!(identifier, NEXT);
            assert_eq!(rows_inserted, 1);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(pipeline.merger().store().load().unwrap().unwrap().num_rows(), 2);

    let kinds: Vec<String> = pass_log(&config)
        .iter()
        .map(|r| r["outcome"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, vec!["ingested", "failed", "up_to_date", "ingested"]);
}

#[tokio::test]
async fn test_archive_without_payload_lands_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let config = make_config(tmp.path(), &FakeFeed::pointer_url());
    let feed = FakeFeed::new();
    let pipeline = Pipeline::with_fetcher(&config, feed.clone()).unwrap();

    feed.publish_archive(NEXT, zip_archive("unrelated.CSV", "1\t010\thttp://a\n"));
    let err = pipeline.run_pass().await.unwrap_err();
    assert_eq!(err.kind(), "malformed_archive");
    assert!(pipeline.ledger().last_entry().unwrap().is_none());
    assert!(!config.storage.landing_dir.join(NEXT).exists());
    assert!(!pipeline.merger().store().exists());

    // Still considered new on the next poll.
    feed.publish(NEXT, "1\t010\thttp://a\n");
    assert_eq!(pipeline.run_pass().await.unwrap().kind(), "ingested");
}

#[tokio::test]
async fn test_network_failure_changes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let config = make_config(tmp.path(), &FakeFeed::pointer_url());
    let feed = FakeFeed::new();
    let pipeline = Pipeline::with_fetcher(&config, feed.clone()).unwrap();

    feed.publish(NEXT, "1\t010\thttp://a\n");
    feed.set_failing(true);
    let err = pipeline.run_pass().await.unwrap_err();
    assert_eq!(err.kind(), "network");
    assert!(pipeline.ledger().entries().unwrap().is_empty());
    assert!(!pipeline.merger().store().exists());
}

#[tokio::test]
async fn test_empty_pointer_is_malformed_not_up_to_date() {
    let tmp = tempfile::tempdir().unwrap();
    let config = make_config(tmp.path(), &FakeFeed::pointer_url());
    let feed = FakeFeed::new();
    let pipeline = Pipeline::with_fetcher(&config, feed.clone()).unwrap();

    feed.set_pointer_body("");
    let err = pipeline.run_pass().await.unwrap_err();
    assert_eq!(err.kind(), "malformed_pointer");
}
