//! Command-line argument definitions for the `searom` binary.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// A parallel, resumable single-file downloader.
///
/// Files are split into byte ranges that are fetched concurrently, retried
/// when they fail and stitched back together in order.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Config file to use instead of the default location.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download a file in the foreground
    Run {
        #[command(flatten)]
        download: DownloadArgs,

        /// Run under the pid file, logging instead of drawing a progress bar.
        #[arg(long, hide = true)]
        managed: bool,
    },
    /// Download a file in the background
    Start {
        #[command(flatten)]
        download: DownloadArgs,
    },
    /// Stop the background download
    Stop,
    /// Tell whether a background download is running
    Status,
}

#[derive(clap::Args, Debug, Clone)]
pub struct DownloadArgs {
    /// The URL of the file to download.
    #[arg(short, long)]
    pub url: String,

    /// The directory to save the file in. Defaults to the configured download directory.
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Number of chunks the file is split into.
    #[arg(short = 'c', long)]
    pub chunks: Option<u32>,

    /// Retry rounds over failed chunks.
    #[arg(short = 'r', long)]
    pub retries: Option<u32>,

    /// Longest filename allowed for the saved file.
    #[arg(long)]
    pub max_length: Option<usize>,
}

impl DownloadArgs {
    /// Command-line arguments reproducing these options for a child process.
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = vec!["--url".to_string(), self.url.clone()];
        if let Some(dir) = &self.dir {
            argv.push("--dir".into());
            argv.push(dir.to_string_lossy().into_owned());
        }
        if let Some(chunks) = self.chunks {
            argv.push("--chunks".into());
            argv.push(chunks.to_string());
        }
        if let Some(retries) = self.retries {
            argv.push("--retries".into());
            argv.push(retries.to_string());
        }
        if let Some(max_length) = self.max_length {
            argv.push("--max-length".into());
            argv.push(max_length.to_string());
        }
        argv
    }
}
