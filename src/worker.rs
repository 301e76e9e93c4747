use crate::config::Settings;
use crate::error::{ChunkError, ErrContext};
use crate::observer::ProgressObserver;
use crate::state::{ChunkLedger, ChunkOutcome, ChunkSpec};
use flate2::write::{GzDecoder, ZlibDecoder};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, RANGE};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Downloads single chunks into their part files.
///
/// Each call to [`ChunkFetcher::fetch`] makes up to `attempts` tries, pausing
/// `retry_delay` between them, before giving the chunk up as failed.
#[derive(Clone)]
pub struct ChunkFetcher {
    client: reqwest::Client,
    observer: Arc<dyn ProgressObserver>,
    attempts: u32,
    retry_delay: Duration,
    resume_partial: bool,
}

impl ChunkFetcher {
    pub fn new(client: reqwest::Client, observer: Arc<dyn ProgressObserver>) -> Self {
        ChunkFetcher {
            client,
            observer,
            attempts: 10,
            retry_delay: Duration::from_secs(1),
            resume_partial: true,
        }
    }

    pub fn from_settings(
        client: reqwest::Client,
        observer: Arc<dyn ProgressObserver>,
        settings: &Settings,
    ) -> Self {
        Self::new(client, observer)
            .with_attempts(settings.chunk_attempts)
            .with_retry_delay(settings.chunk_retry_delay())
            .with_resume(settings.resume_partial_chunks)
    }

    pub fn with_attempts(self, attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            ..self
        }
    }

    pub fn with_retry_delay(self, retry_delay: Duration) -> Self {
        Self {
            retry_delay,
            ..self
        }
    }

    pub fn with_resume(self, resume_partial: bool) -> Self {
        Self {
            resume_partial,
            ..self
        }
    }

    pub fn observer(&self) -> &Arc<dyn ProgressObserver> {
        &self.observer
    }

    /// Fetches `spec` into its part file and records the result in `ledger`.
    ///
    /// A chunk the ledger already holds as completed is not fetched again; any
    /// stale failed entry for it is dropped instead.
    pub async fn fetch(&self, spec: ChunkSpec, ledger: &ChunkLedger) -> ChunkOutcome {
        if ledger.is_completed(&spec).await {
            ledger.clear_failed(&spec).await;
            info!("{:?} has already been downloaded", spec.part_path);
            return ChunkOutcome::Completed(spec);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;

            match self.try_fetch(&spec).await {
                Ok(()) => {
                    ledger.mark_completed(&spec).await;
                    return ChunkOutcome::Completed(spec);
                }
                Err(e) => {
                    if attempt >= self.attempts {
                        warn!(
                            "Download failed for {:?} ({}): {}",
                            spec.part_path, spec.range, e
                        );
                        let error = ChunkError::Exhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        };
                        ledger.mark_failed(&spec, &error).await;
                        self.observer
                            .message(format!("Part {} failed", spec.index));
                        return ChunkOutcome::Failed(spec, error);
                    }

                    warn!(
                        "Error on part {} (attempt {}/{}): {}. Retrying...",
                        spec.index, attempt, self.attempts, e
                    );
                    sleep(self.retry_delay).await;
                }
            }
        }
    }

    async fn try_fetch(&self, spec: &ChunkSpec) -> Result<(), ChunkError> {
        if spec.range.is_empty() {
            tokio::fs::write(&spec.part_path, b"")
                .await
                .context(format!("Failed to create {:?}", spec.part_path))?;
            return Ok(());
        }

        let range_header = self.range_header(spec).await;
        debug!("GET {} with Range: {}", spec.url, range_header);

        let mut response = self
            .client
            .get(&spec.url)
            .header(RANGE, range_header)
            .header(ACCEPT_ENCODING, "gzip, deflate")
            .send()
            .await?
            .error_for_status()?;

        // A 200 carries the whole resource, which is only right for a chunk
        // that starts at zero and runs to the end.
        let status = response.status();
        let whole_resource = spec.range.start == 0 && spec.range.end.is_none();
        if status != StatusCode::PARTIAL_CONTENT && !(status == StatusCode::OK && whole_resource) {
            return Err(ChunkError::RangeIgnored { status });
        }

        let encoding = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_ascii_lowercase());
        let mut decoder = BodyDecoder::new(encoding.as_deref());

        let file = tokio::fs::File::create(&spec.part_path)
            .await
            .context(format!("Failed to create {:?}", spec.part_path))?;
        let mut writer = BufWriter::new(file);
        let mut decoded = Vec::new();

        while let Some(bytes) = response.chunk().await? {
            decoder.feed(&bytes, &mut decoded)?;
            writer
                .write_all(&decoded)
                .await
                .context(format!("Failed to write {:?}", spec.part_path))?;
            decoded.clear();
        }

        decoder.finish(&mut decoded)?;
        writer
            .write_all(&decoded)
            .await
            .context(format!("Failed to write {:?}", spec.part_path))?;
        writer
            .flush()
            .await
            .context(format!("Failed to write {:?}", spec.part_path))?;

        Ok(())
    }

    /// Range header for the next attempt of `spec`.
    ///
    /// When a part file is already on disk the resume range for its length is
    /// put in front of the planned range as is, e.g. `bytes=5-bytes=0-9`.
    /// Servers that only look at the first range then send the tail.
    async fn range_header(&self, spec: &ChunkSpec) -> String {
        let planned = spec.range.header();
        if !self.resume_partial {
            return planned;
        }

        match tokio::fs::metadata(&spec.part_path).await {
            Ok(meta) => {
                debug!(
                    "Resuming part {} from {} bytes already on disk",
                    spec.index,
                    meta.len()
                );
                format!("bytes={}-{}", meta.len(), planned)
            }
            Err(_) => planned,
        }
    }
}

/// Undoes the `Content-Encoding` of a response body as it streams in.
enum BodyDecoder {
    Identity,
    Gzip(GzDecoder<Vec<u8>>),
    Deflate(ZlibDecoder<Vec<u8>>),
}

impl BodyDecoder {
    fn new(encoding: Option<&str>) -> Self {
        match encoding {
            Some("gzip") | Some("x-gzip") => BodyDecoder::Gzip(GzDecoder::new(Vec::new())),
            Some("deflate") => BodyDecoder::Deflate(ZlibDecoder::new(Vec::new())),
            _ => BodyDecoder::Identity,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            BodyDecoder::Identity => "identity",
            BodyDecoder::Gzip(_) => "gzip",
            BodyDecoder::Deflate(_) => "deflate",
        }
    }

    /// Decodes `input` and appends whatever output is ready to `out`.
    fn feed(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), ChunkError> {
        let encoding = self.name();
        let result = match self {
            BodyDecoder::Identity => {
                out.extend_from_slice(input);
                Ok(())
            }
            BodyDecoder::Gzip(decoder) => decoder.write_all(input).map(|()| {
                out.append(decoder.get_mut());
            }),
            BodyDecoder::Deflate(decoder) => decoder.write_all(input).map(|()| {
                out.append(decoder.get_mut());
            }),
        };
        result.map_err(|source| ChunkError::Decode { encoding, source })
    }

    /// Ends the stream, appending the last decoded bytes to `out`.
    fn finish(self, out: &mut Vec<u8>) -> Result<(), ChunkError> {
        let encoding = self.name();
        let rest: io::Result<Vec<u8>> = match self {
            BodyDecoder::Identity => Ok(Vec::new()),
            BodyDecoder::Gzip(decoder) => decoder.finish(),
            BodyDecoder::Deflate(decoder) => decoder.finish(),
        };
        let mut rest = rest.map_err(|source| ChunkError::Decode { encoding, source })?;
        out.append(&mut rest);
        Ok(())
    }
}
