use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use zip::write::FileOptions;

use eventlake_core::config::{FeedConfig, ScheduleConfig, StorageConfig};
use eventlake_core::{Config, IngestError};
use eventlake_ingest::Fetcher;

pub const FEED_HOST: &str = "http://feed.test";
pub const COLUMNS: &str = "GLOBALEVENTID\nEventCode\nSOURCEURL\n";

/// Config with every path under `root` and a three-column schema.
pub fn make_config(root: &Path, pointer_url: &str) -> Config {
    let columns = root.join("columns.txt");
    std::fs::write(&columns, COLUMNS).unwrap();

    let mut storage = StorageConfig::rooted(root);
    storage.columns_file = Some(columns);

    let config = Config {
        profile: String::new(),
        feed: FeedConfig {
            pointer_url: pointer_url.to_string(),
            timeout_secs: 5,
        },
        storage,
        schedule: ScheduleConfig {
            interval_secs: 900,
            cron: None,
        },
    };
    config.validate().unwrap();
    config
}

/// Pointer body in the upstream format: `<size> <checksum> <url>` per line.
pub fn pointer_body(host: &str, identifier: &str) -> String {
    format!(
        "150383 297a16b493de7cf6ca809a7cc31d0b93 {host}/{identifier}.zip\n\
         318084 bb27f78ba45f69a17ea6ed7755e9f8ff {host}/{identifier}.mentions.zip\n"
    )
}

/// ZIP archive holding one entry named `identifier`.
pub fn zip_archive(identifier: &str, body: &str) -> Bytes {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file(identifier, FileOptions::default()).unwrap();
    writer.write_all(body.as_bytes()).unwrap();
    Bytes::from(writer.finish().unwrap().into_inner())
}

/// In-memory feed: publish snapshots, optionally make every request fail.
#[derive(Default)]
pub struct FakeFeed {
    resources: Mutex<HashMap<String, Bytes>>,
    failing: AtomicBool,
    requests: AtomicUsize,
}

impl FakeFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pointer_url() -> String {
        format!("{FEED_HOST}/lastupdate.txt")
    }

    /// Advertise `identifier` as the latest snapshot with payload `body`.
    pub fn publish(&self, identifier: &str, body: &str) {
        let mut resources = self.resources.lock().unwrap();
        resources.insert(
            Self::pointer_url(),
            Bytes::from(pointer_body(FEED_HOST, identifier)),
        );
        resources.insert(
            format!("{FEED_HOST}/{identifier}.zip"),
            zip_archive(identifier, body),
        );
    }

    /// Advertise `identifier` but serve `archive` verbatim behind it.
    pub fn publish_archive(&self, identifier: &str, archive: Bytes) {
        let mut resources = self.resources.lock().unwrap();
        resources.insert(
            Self::pointer_url(),
            Bytes::from(pointer_body(FEED_HOST, identifier)),
        );
        resources.insert(format!("{FEED_HOST}/{identifier}.zip"), archive);
    }

    pub fn set_pointer_body(&self, body: &str) {
        self.resources
            .lock()
            .unwrap()
            .insert(Self::pointer_url(), Bytes::from(body.to_string()));
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Fetcher for FakeFeed {
    async fn fetch(&self, url: &str) -> Result<Bytes, IngestError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(IngestError::network(url, "connection refused"));
        }
        self.resources
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| IngestError::network(url, "HTTP 404 Not Found"))
    }
}

/// Read the pass log as JSON values.
pub fn pass_log(config: &Config) -> Vec<serde_json::Value> {
    match std::fs::read_to_string(&config.storage.pass_log_path) {
        Ok(text) => text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect(),
        Err(_) => Vec::new(),
    }
}
