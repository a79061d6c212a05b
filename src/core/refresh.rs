use crate::config::JobConfig;
use crate::core::fetcher::ResourceFetcher;
use crate::core::staleness;
use crate::core::storage::StorageWriter;
use crate::domain::model::{FetchMode, RefreshOutcome, Timestamp};
use crate::domain::ports::Job;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Fetch-and-store job: downloads `url` into `output_path` unless the file
/// was refreshed less than `interval_seconds` ago. The file's modification
/// time records the last successful run.
#[derive(Clone)]
pub struct RefreshJob {
    name: String,
    url: String,
    output_path: PathBuf,
    interval_seconds: u64,
    mode: FetchMode,
    fetcher: ResourceFetcher,
    storage: StorageWriter,
}

impl RefreshJob {
    pub fn new(config: &JobConfig, fetcher: ResourceFetcher) -> Self {
        Self {
            name: config.name.clone(),
            url: config.url.clone(),
            output_path: PathBuf::from(&config.output_path),
            interval_seconds: config.interval_seconds,
            mode: config.mode,
            fetcher,
            storage: StorageWriter::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn last_run(&self) -> Timestamp {
        staleness::last_run(&self.output_path)
    }

    pub fn is_up_to_date(&self, now: Timestamp) -> bool {
        staleness::is_up_to_date(now, self.last_run(), self.interval_seconds)
    }

    pub async fn run(&self) -> Result<RefreshOutcome> {
        let now = staleness::now();
        let last_run = self.last_run();
        if staleness::is_up_to_date(now, last_run, self.interval_seconds) {
            tracing::info!("{} is up to date, skipping download", self.name);
            return Ok(RefreshOutcome::Skipped { last_run });
        }

        tracing::info!("Downloading {} from {}", self.name, self.url);
        let path = Some(self.output_path.as_path());
        let outcome = match self.mode {
            FetchMode::Lines => {
                let lines = self.fetcher.fetch_lines(&self.url).await?;
                self.storage.write_lines(Some(lines.as_slice()), path)?;
                RefreshOutcome::Lines {
                    count: lines.len(),
                    run_at: now,
                }
            }
            FetchMode::Raw => {
                let bytes = self.fetcher.fetch_bytes(&self.url).await?;
                self.storage.write_stream(Some(bytes.as_slice()), path)?;
                RefreshOutcome::Bytes {
                    len: bytes.len(),
                    run_at: now,
                }
            }
        };

        // 以本次開始時間標記，而非寫入完成的時間
        self.storage.touch_last_modified(path, now);
        Ok(outcome)
    }
}

#[async_trait]
impl Job for RefreshJob {
    async fn execute(&self) -> Result<()> {
        let outcome = self.run().await?;
        tracing::info!("✅ {} finished: {:?}", self.name, outcome);
        Ok(())
    }
}
