use std::sync::Arc;

use chrono::{TimeZone, Utc};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use eventlake_core::LedgerEntry;
use eventlake_ingest::{HttpFetcher, Ledger, PassOutcome, Pipeline, ReleaseChecker};

use crate::helpers::{make_config, pass_log, pointer_body, zip_archive};

const LATEST: &str = "20210901003000.export.CSV";
const PREVIOUS: &str = "20210831110000.export.CSV";

async fn mount_feed(server: &MockServer, identifier: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path("/gdeltv2/lastupdate.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(pointer_body(&format!("{}/gdeltv2", server.uri()), identifier)),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/gdeltv2/{identifier}.zip")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_archive(identifier, body).to_vec()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_release_check_against_older_ledger() {
    let server = MockServer::start().await;
    mount_feed(&server, LATEST, "1\t010\thttp://a\n").await;

    let tmp = tempfile::tempdir().unwrap();
    let ledger = Ledger::open(tmp.path().join("execution_log.txt"));
    ledger.append(&LedgerEntry::ingested_now(PREVIOUS).unwrap()).unwrap();

    let fetcher = Arc::new(HttpFetcher::new(std::time::Duration::from_secs(5)).unwrap());
    let checker = ReleaseChecker::new(
        format!("{}/gdeltv2/lastupdate.txt", server.uri()),
        fetcher,
        ledger,
    );

    let (has_new, pointer) = checker.check_new_release().await.unwrap();
    assert!(has_new);
    assert_eq!(pointer.identifier, LATEST);
    assert_eq!(pointer.fetch_url, format!("{}/gdeltv2/{LATEST}.zip", server.uri()));
}

#[tokio::test]
async fn test_full_pass_over_http() {
    let server = MockServer::start().await;
    mount_feed(
        &server,
        LATEST,
        "1\t010\thttp://a\n2\t020\thttp://b\n1\t010\thttp://a\n3\t\thttp://c\n",
    )
    .await;

    let tmp = tempfile::tempdir().unwrap();
    let config = make_config(tmp.path(), &format!("{}/gdeltv2/lastupdate.txt", server.uri()));
    let pipeline = Pipeline::from_config(&config).unwrap();
    pipeline
        .ledger()
        .append(&LedgerEntry::ingested_now(PREVIOUS).unwrap())
        .unwrap();

    let outcome = pipeline.run_pass().await.unwrap();
    assert_eq!(
        outcome,
        PassOutcome::Ingested {
            identifier: LATEST.to_string(),
            rows_inserted: 3,
            reconciled: None,
        }
    );

    // Landed payload, ledger entry, dataset footer.
    assert!(config.storage.landing_dir.join(LATEST).is_file());
    let last = pipeline.ledger().last_entry().unwrap().unwrap();
    assert_eq!(last.identifier, LATEST);
    assert_eq!(last.published_at, Utc.with_ymd_and_hms(2021, 9, 1, 0, 30, 0).unwrap());
    let store = pipeline.merger().store();
    assert_eq!(store.load().unwrap().unwrap().num_rows(), 3);
    assert_eq!(store.last_identifier().unwrap().as_deref(), Some(LATEST));

    // Same pointer again: nothing to do.
    let again = pipeline.run_pass().await.unwrap();
    assert_eq!(again.kind(), "up_to_date");
    assert_eq!(again.identifier(), LATEST);
    assert_eq!(store.load().unwrap().unwrap().num_rows(), 3);
    assert_eq!(pipeline.ledger().entries().unwrap().len(), 2);

    let log = pass_log(&config);
    assert_eq!(log.len(), 2);
    assert_eq!(log[0]["outcome"], "ingested");
    assert_eq!(log[0]["rows_inserted"], 3);
    assert_eq!(log[1]["outcome"], "up_to_date");
}

#[tokio::test]
async fn test_pointer_server_error_fails_pass() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let config = make_config(tmp.path(), &format!("{}/gdeltv2/lastupdate.txt", server.uri()));
    let pipeline = Pipeline::from_config(&config).unwrap();

    let err = pipeline.run_pass().await.unwrap_err();
    assert_eq!(err.kind(), "network");
    assert!(pipeline.ledger().last_entry().unwrap().is_none());

    let log = pass_log(&config);
    assert_eq!(log[0]["outcome"], "failed");
    assert_eq!(log[0]["error_kind"], "network");
}
