use arrow::array::Array;
use chrono::{Duration, TimeZone, Utc};

use eventlake_ingest::{PassOutcome, Pipeline};

use crate::helpers::{make_config, FakeFeed};

fn identifier_at(n: i64) -> String {
    let ts = Utc.with_ymd_and_hms(2021, 9, 1, 0, 0, 0).unwrap() + Duration::minutes(15 * n);
    format!("{}.export.CSV", ts.format("%Y%m%d%H%M%S"))
}

#[tokio::test]
async fn test_first_run_builds_dataset_from_increment() {
    let tmp = tempfile::tempdir().unwrap();
    let config = make_config(tmp.path(), &FakeFeed::pointer_url());
    let feed = FakeFeed::new();
    feed.publish(&identifier_at(0), "1\t010\thttp://a\n1\t010\thttp://a\n2\t020\thttp://b\n");
    let pipeline = Pipeline::with_fetcher(&config, feed.clone()).unwrap();

    assert!(!pipeline.merger().store().exists());
    let outcome = pipeline.run_pass().await.unwrap();
    match outcome {
        PassOutcome::Ingested { rows_inserted, .. } => assert_eq!(rows_inserted, 2),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(pipeline.merger().store().load().unwrap().unwrap().num_rows(), 2);
}

#[tokio::test]
async fn test_ledger_grows_by_one_per_new_snapshot() {
    let tmp = tempfile::tempdir().unwrap();
    let config = make_config(tmp.path(), &FakeFeed::pointer_url());
    let feed = FakeFeed::new();
    let pipeline = Pipeline::with_fetcher(&config, feed.clone()).unwrap();

    for n in 0..5 {
        feed.publish(&identifier_at(n), &format!("{n}\t010\thttp://event/{n}\n"));
        let outcome = pipeline.run_pass().await.unwrap();
        assert_eq!(outcome.kind(), "ingested");
        // A repeated poll in between changes nothing.
        assert_eq!(pipeline.run_pass().await.unwrap().kind(), "up_to_date");
    }

    let entries = pipeline.ledger().entries().unwrap();
    assert_eq!(entries.len(), 5);
    assert_eq!(entries.last().unwrap().identifier, identifier_at(4));
    assert!(entries.windows(2).all(|w| w[0].published_at < w[1].published_at));
    assert_eq!(pipeline.merger().store().load().unwrap().unwrap().num_rows(), 5);
}

#[tokio::test]
async fn test_permuted_increment_inserts_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let config = make_config(tmp.path(), &FakeFeed::pointer_url());
    let feed = FakeFeed::new();
    let pipeline = Pipeline::with_fetcher(&config, feed.clone()).unwrap();

    feed.publish(&identifier_at(0), "1\t010\thttp://a\n2\t020\thttp://b\n3\t030\thttp://c\n");
    pipeline.run_pass().await.unwrap();
    let before = pipeline.merger().store().load().unwrap().unwrap();

    feed.publish(&identifier_at(1), "3\t030\thttp://c\n1\t010\thttp://a\n2\t020\thttp://b\n");
    match pipeline.run_pass().await.unwrap() {
        PassOutcome::Ingested { rows_inserted, .. } => assert_eq!(rows_inserted, 0),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(pipeline.merger().store().load().unwrap().unwrap(), before);
}

#[tokio::test]
async fn test_new_rows_append_after_existing() {
    let tmp = tempfile::tempdir().unwrap();
    let config = make_config(tmp.path(), &FakeFeed::pointer_url());
    let feed = FakeFeed::new();
    let pipeline = Pipeline::with_fetcher(&config, feed.clone()).unwrap();

    feed.publish(&identifier_at(0), "1\t010\thttp://a\n2\t020\thttp://b\n");
    pipeline.run_pass().await.unwrap();
    feed.publish(&identifier_at(1), "2\t020\thttp://b\n3\t030\thttp://c\n");
    match pipeline.run_pass().await.unwrap() {
        PassOutcome::Ingested { rows_inserted, .. } => assert_eq!(rows_inserted, 1),
        other => panic!("unexpected outcome {other:?}"),
    }

    let batch = pipeline.merger().store().load().unwrap().unwrap();
    let ids = batch
        .column(0)
        .as_any()
        .downcast_ref::<arrow::array::LargeStringArray>()
        .unwrap();
    let ids: Vec<&str> = (0..ids.len()).map(|i| ids.value(i)).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
}
