use eventlake_core::LedgerEntry;
use eventlake_ingest::{Downloader, Ledger, Pipeline};

use crate::helpers::{make_config, FakeFeed};

const ID: &str = "20210901003000.export.CSV";

#[tokio::test]
async fn test_crash_after_ledger_append_is_reconciled() {
    let tmp = tempfile::tempdir().unwrap();
    let config = make_config(tmp.path(), &FakeFeed::pointer_url());
    let feed = FakeFeed::new();
    feed.publish(ID, "1\t010\thttp://a\n2\t020\thttp://b\n");

    // Land and ledger the snapshot, then "crash" before merging.
    let ledger = Ledger::open(&config.storage.ledger_path);
    let downloader = Downloader::new(&config.storage.landing_dir, feed.clone(), ledger.clone());
    let pointer = eventlake_core::SnapshotPointer::from_url(&format!("http://feed.test/{ID}.zip")).unwrap();
    downloader.download(&pointer).await.unwrap();
    assert_eq!(ledger.last_entry().unwrap().unwrap().identifier, ID);

    let pipeline = Pipeline::with_fetcher(&config, feed.clone()).unwrap();
    assert!(!pipeline.merger().store().exists());

    let outcome = pipeline.run_pass().await.unwrap();
    assert_eq!(outcome.kind(), "up_to_date");
    assert_eq!(outcome.reconciled(), Some(ID));

    let store = pipeline.merger().store();
    assert_eq!(store.load().unwrap().unwrap().num_rows(), 2);
    assert_eq!(store.last_identifier().unwrap().as_deref(), Some(ID));

    // Converged: nothing further to reconcile, rows present exactly once.
    let outcome = pipeline.run_pass().await.unwrap();
    assert_eq!(outcome.reconciled(), None);
    assert_eq!(store.load().unwrap().unwrap().num_rows(), 2);
    assert_eq!(ledger.entries().unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_landed_file_skips_reconciliation() {
    let tmp = tempfile::tempdir().unwrap();
    let config = make_config(tmp.path(), &FakeFeed::pointer_url());
    let feed = FakeFeed::new();
    feed.publish(ID, "1\t010\thttp://a\n");

    let ledger = Ledger::open(&config.storage.ledger_path);
    ledger
        .append(&LedgerEntry::ingested_now("20210901001500.export.CSV").unwrap())
        .unwrap();

    let pipeline = Pipeline::with_fetcher(&config, feed.clone()).unwrap();
    let outcome = pipeline.run_pass().await.unwrap();
    assert_eq!(outcome.kind(), "ingested");
    assert_eq!(outcome.reconciled(), None);
}
