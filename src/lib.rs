//! # searom
//!
//! `searom` downloads a single file over HTTP by splitting it into byte-range
//! chunks and fetching them concurrently. It supports:
//! - Concurrent range requests, one task per chunk
//! - Per-chunk retries plus outer retry rounds over failed chunks
//! - Resuming from part files left by an earlier attempt
//! - Transparent gzip/deflate decoding
//! - Ordered reassembly of the part files into the final file
//!
//! ## Example Usage
//!
//! ```no_run
//! # async fn demo() -> Result<(), searom::DownloadError> {
//! let settings = searom::Settings::default();
//! let path = searom::run_job("https://example.com/file.iso", std::path::Path::new("/tmp"), &settings).await?;
//! println!("saved to {}", path.display());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod daemon;
pub mod downloader;
pub mod error;
pub mod logging;
pub mod observer;
pub mod planner;
pub mod retry;
pub mod state;
pub mod utils;
pub mod worker;

pub use config::Settings;
pub use downloader::{DownloadJob, Downloader, run_job};
pub use error::{ChunkError, DownloadError, MergeError, PlanningError};
pub use retry::RetryCoordinator;
pub use state::{ByteRange, ChunkLedger, ChunkOutcome, ChunkSpec};
pub use worker::ChunkFetcher;
