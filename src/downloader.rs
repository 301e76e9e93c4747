use crate::config::Settings;
use crate::error::{ChunkError, DownloadError, ErrContext, MergeError, PlanningError};
use crate::observer::{LogObserver, ProgressObserver};
use crate::planner;
use crate::retry::RetryCoordinator;
use crate::state::{ChunkLedger, ChunkSpec};
use crate::utils;
use crate::worker::ChunkFetcher;
use futures_util::future::join_all;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{error, info};

/// One download, fixed for its whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: String,
    pub target_dir: PathBuf,
    pub chunk_count: u32,
    /// Outer retry rounds over failed chunks.
    pub max_retries: u32,
    /// Longest filename, in characters, the output may have.
    pub max_length: usize,
}

/// Builds the HTTP client used for the probe and all chunk requests.
///
/// Decompression is left to the chunk fetcher, which asks for gzip/deflate
/// itself.
pub fn build_client() -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(concat!("searom/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(30))
        .build()
}

/// Runs download jobs: probe, plan, fetch concurrently, retry, merge.
pub struct Downloader {
    client: Client,
    fetcher: ChunkFetcher,
    observer: Arc<dyn ProgressObserver>,
}

impl Downloader {
    pub fn new(client: Client, settings: &Settings, observer: Arc<dyn ProgressObserver>) -> Self {
        let fetcher = ChunkFetcher::from_settings(client.clone(), observer.clone(), settings);
        Downloader {
            client,
            fetcher,
            observer,
        }
    }

    /// Replaces the chunk fetcher, e.g. to change its retry timing.
    pub fn with_fetcher(self, fetcher: ChunkFetcher) -> Self {
        Self { fetcher, ..self }
    }

    /// Downloads `job.url` into `job.target_dir` and returns the final path.
    ///
    /// Chunks still failing after every retry round are logged and the merge
    /// then stops at the first of them with [`MergeError::MissingPart`]. The
    /// bytes merged so far, and the remaining part files, stay on disk.
    pub async fn run(&self, job: &DownloadJob) -> Result<PathBuf, DownloadError> {
        if job.chunk_count == 0 {
            return Err(PlanningError::ZeroChunkCount.into());
        }

        let info = utils::probe_resource(&job.url, &self.client).await?;
        let filename = utils::resolve_filename(&job.url, &info)
            .map(|name| utils::truncate_filename(&name, job.max_length))
            .filter(|name| !name.is_empty())
            .ok_or_else(|| PlanningError::UnresolvableFilename {
                url: job.url.clone(),
            })?;

        fs::create_dir_all(&job.target_dir)
            .await
            .context(format!("Failed to create {:?}", job.target_dir))?;
        let save_path = job.target_dir.join(&filename);
        let file_size = info.content_length;
        info!("Downloading {} ({} bytes) to {:?}", job.url, file_size, save_path);
        self.observer.begin(&filename, file_size);

        if file_size == 0 {
            fs::File::create(&save_path)
                .await
                .context(format!("Failed to create {:?}", save_path))?;
            self.observer.finish();
            return Ok(save_path);
        }

        let chunks = planner::plan_chunks(file_size, job.chunk_count, &save_path, &job.url)?;
        let chunk_size = file_size / job.chunk_count as u64;
        let ledger = Arc::new(ChunkLedger::new());

        self.fetch_all(&chunks, &ledger, chunk_size).await;

        let exhausted = RetryCoordinator::new(self.fetcher.clone(), job.max_retries)
            .drain(&ledger)
            .await;
        for spec in &exhausted {
            error!(
                "ChunkExhausted: part {} ({}) of {} could not be downloaded",
                spec.index, spec.range, job.url
            );
        }

        merge_chunks(&save_path, &chunks, &ledger).await?;

        self.observer.finish();
        info!("Download completed successfully: {:?}", save_path);
        Ok(save_path)
    }

    /// First pass: every chunk at once, one task each.
    async fn fetch_all(&self, chunks: &[ChunkSpec], ledger: &Arc<ChunkLedger>, chunk_size: u64) {
        let tasks: Vec<_> = chunks
            .iter()
            .cloned()
            .map(|spec| {
                let fetcher = self.fetcher.clone();
                let ledger = ledger.clone();
                let observer = self.observer.clone();
                tokio::spawn(async move {
                    let outcome = fetcher.fetch(spec, &ledger).await;
                    observer.inc(chunk_size);
                    outcome
                })
            })
            .collect();

        for (spec, result) in chunks.iter().zip(join_all(tasks).await) {
            if let Err(e) = result {
                error!("Fetch task for part {} did not finish: {}", spec.index, e);
                let aborted = ChunkError::Aborted {
                    reason: e.to_string(),
                };
                ledger.mark_failed(spec, &aborted).await;
            }
        }
    }
}

/// Concatenates the part files of `chunks` into `save_path` in plan order,
/// deleting each part once it has been appended.
///
/// A chunk the ledger does not hold as completed, or whose part file is gone,
/// stops the merge; whatever was appended before stays in `save_path`.
pub async fn merge_chunks(
    save_path: &Path,
    chunks: &[ChunkSpec],
    ledger: &ChunkLedger,
) -> Result<(), MergeError> {
    let file = fs::File::create(save_path)
        .await
        .context(format!("Failed to create {:?}", save_path))?;
    let mut writer = BufWriter::new(file);

    let mut ordered: Vec<&ChunkSpec> = chunks.iter().collect();
    ordered.sort_by_key(|spec| spec.index);

    for spec in ordered {
        let missing = || MergeError::MissingPart {
            index: spec.index,
            path: spec.part_path.clone(),
        };

        if !ledger.is_completed(spec).await {
            writer
                .flush()
                .await
                .context(format!("Failed to write {:?}", save_path))?;
            return Err(missing());
        }

        let bytes = match fs::read(&spec.part_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                writer
                    .flush()
                    .await
                    .context(format!("Failed to write {:?}", save_path))?;
                return Err(missing());
            }
            Err(e) => {
                return Err(MergeError::Io {
                    context: format!("Failed to read {:?}", spec.part_path),
                    source: e,
                });
            }
        };

        writer
            .write_all(&bytes)
            .await
            .context(format!("Failed to write {:?}", save_path))?;
        writer
            .flush()
            .await
            .context(format!("Failed to write {:?}", save_path))?;
        fs::remove_file(&spec.part_path)
            .await
            .context(format!("Failed to remove {:?}", spec.part_path))?;
    }

    Ok(())
}

/// Downloads `url` into `dir` with the given settings, logging progress only.
///
/// This is the job the process lifecycle runs once.
pub async fn run_job(url: &str, dir: &Path, settings: &Settings) -> Result<PathBuf, DownloadError> {
    let client = build_client().map_err(PlanningError::Probe)?;
    let downloader = Downloader::new(client, settings, Arc::new(LogObserver));
    let job = settings.job(url, Some(dir.to_path_buf()));

    downloader.run(&job).await.inspect_err(|e| {
        error!("An error occurred during the download ({}): {}", e.kind(), e);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::part_path;
    use crate::state::ByteRange;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn planned(dir: &TempDir, count: usize) -> (PathBuf, Vec<ChunkSpec>) {
        let save_path = dir.path().join("file.bin");
        let chunks = (0..count)
            .map(|index| ChunkSpec {
                index,
                url: "http://example.com/file.bin".into(),
                part_path: part_path(&save_path, index),
                range: ByteRange::bounded(index as u64 * 2, 2),
            })
            .collect();
        (save_path, chunks)
    }

    #[tokio::test]
    async fn merge_follows_plan_order_not_completion_order() {
        let dir = TempDir::new().unwrap();
        let (save_path, chunks) = planned(&dir, 4);
        let ledger = ChunkLedger::new();

        for index in [2, 0, 3, 1] {
            let spec = &chunks[index];
            fs::write(&spec.part_path, format!("{index}{index}")).await.unwrap();
            ledger.mark_completed(spec).await;
        }

        let mut shuffled = chunks.clone();
        shuffled.reverse();
        merge_chunks(&save_path, &shuffled, &ledger).await.unwrap();

        assert_eq!(fs::read_to_string(&save_path).await.unwrap(), "00112233");
        assert!(chunks.iter().all(|spec| !spec.part_path.exists()));
    }

    #[tokio::test]
    async fn missing_part_aborts_and_keeps_partial_output() {
        let dir = TempDir::new().unwrap();
        let (save_path, chunks) = planned(&dir, 3);
        let ledger = ChunkLedger::new();

        for index in [0, 2] {
            fs::write(&chunks[index].part_path, b"ok").await.unwrap();
            ledger.mark_completed(&chunks[index]).await;
        }

        let err = merge_chunks(&save_path, &chunks, &ledger).await.unwrap_err();

        assert_matches!(err, MergeError::MissingPart { index: 1, .. });
        assert_eq!(fs::read(&save_path).await.unwrap(), b"ok");
        assert!(!chunks[0].part_path.exists());
        assert!(chunks[2].part_path.exists());
    }

    #[tokio::test]
    async fn stale_part_of_failed_chunk_is_not_merged() {
        let dir = TempDir::new().unwrap();
        let (save_path, chunks) = planned(&dir, 1);
        let ledger = ChunkLedger::new();
        fs::write(&chunks[0].part_path, b"half").await.unwrap();

        let err = merge_chunks(&save_path, &chunks, &ledger).await.unwrap_err();

        assert_matches!(err, MergeError::MissingPart { index: 0, .. });
        assert!(chunks[0].part_path.exists());
    }

    #[tokio::test]
    async fn zero_chunk_count_fails_before_any_request() {
        let downloader = Downloader::new(
            reqwest::Client::new(),
            &Settings::default(),
            Arc::new(LogObserver),
        );
        let job = DownloadJob {
            url: "http://127.0.0.1:9/file.bin".into(),
            target_dir: PathBuf::from("/nonexistent"),
            chunk_count: 0,
            max_retries: 10,
            max_length: 50,
        };

        assert_matches!(
            downloader.run(&job).await,
            Err(DownloadError::Planning(PlanningError::ZeroChunkCount))
        );
    }
}
