//! Error types for planning, fetching and merging a download.
//!
//! Per-chunk failures ([`ChunkError`]) never escape the fetch/retry layer; they
//! end up recorded in the [`ChunkLedger`](crate::state::ChunkLedger). Planning
//! and merge failures abort the job and surface as [`DownloadError`].
use std::io;
use std::path::PathBuf;

/// Fatal problems detected before any chunk is fetched.
#[derive(Debug, thiserror::Error)]
pub enum PlanningError {
    #[error("chunk count must be at least 1")]
    ZeroChunkCount,

    #[error("Content-Length not found in response header")]
    MissingContentLength,

    #[error("Content-Length {value:?} is not a valid byte count")]
    InvalidContentLength { value: String },

    #[error("could not resolve a filename for {url}")]
    UnresolvableFilename { url: String },

    #[error("preliminary request failed")]
    Probe(#[from] reqwest::Error),
}

/// A failure while downloading a single chunk.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{context}: {source}")]
    Io { context: String, source: io::Error },

    #[error("server answered {status} instead of the requested range")]
    RangeIgnored { status: reqwest::StatusCode },

    #[error("failed to decode {encoding} body: {source}")]
    Decode {
        encoding: &'static str,
        source: io::Error,
    },

    #[error("gave up after {attempts} attempts, last error: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<ChunkError>,
    },

    #[error("fetch task aborted: {reason}")]
    Aborted { reason: String },
}

/// Fatal problems while stitching part files into the final output.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("part file {path:?} for chunk {index} is missing")]
    MissingPart { index: usize, path: PathBuf },

    #[error("{context}: {source}")]
    Io { context: String, source: io::Error },
}

/// A terminal failure of one download job.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("planning failed: {0}")]
    Planning(#[from] PlanningError),

    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),

    #[error("{context}: {source}")]
    FromIo { context: String, source: io::Error },
}

impl DownloadError {
    /// Short label naming the failure kind, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            DownloadError::Planning(_) => "PlanningError",
            DownloadError::Merge(_) => "MergeError",
            DownloadError::FromIo { .. } => "IoError",
        }
    }
}

/// Attaches a context string to io-like errors, `anyhow` style, while keeping
/// the typed error variants: `?` turns the [`IoFailure`] into the `Io` variant
/// of whichever error the caller returns.
pub(crate) trait ErrContext<T> {
    fn context(self, context: impl Into<String>) -> Result<T, IoFailure>;
}

/// An io error paired with what was being attempted when it happened.
pub(crate) struct IoFailure {
    context: String,
    source: io::Error,
}

impl<T, E: Into<io::Error>> ErrContext<T> for Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T, IoFailure> {
        self.map_err(|err| IoFailure {
            context: context.into(),
            source: err.into(),
        })
    }
}

impl From<IoFailure> for ChunkError {
    fn from(err: IoFailure) -> Self {
        ChunkError::Io {
            context: err.context,
            source: err.source,
        }
    }
}

impl From<IoFailure> for MergeError {
    fn from(err: IoFailure) -> Self {
        MergeError::Io {
            context: err.context,
            source: err.source,
        }
    }
}

impl From<IoFailure> for DownloadError {
    fn from(err: IoFailure) -> Self {
        DownloadError::FromIo {
            context: err.context,
            source: err.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn io_context_is_kept_in_message() {
        let res: Result<(), io::Error> = Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let err = MergeError::from(res.context("reading part 3").unwrap_err());

        assert_matches!(&err, MergeError::Io { context, .. } if context == "reading part 3");
        assert_eq!(err.to_string(), "reading part 3: gone");
    }

    #[test]
    fn download_error_kind_labels() {
        let planning = DownloadError::from(PlanningError::ZeroChunkCount);
        let merge = DownloadError::from(MergeError::MissingPart {
            index: 2,
            path: PathBuf::from("/tmp/file.part2"),
        });

        assert_eq!(planning.kind(), "PlanningError");
        assert_eq!(merge.kind(), "MergeError");
    }
}
