//! Command-line binary entrypoint for `searom`.
//!
//! Parses arguments, loads settings and either runs a download in the
//! foreground or manages the background process through its pid file.
mod args;

use anyhow::{Context, Result, bail};
use args::{Args, Commands, DownloadArgs};
use clap::Parser;
use searom::daemon::Lifecycle;
use searom::downloader::{Downloader, build_client};
use searom::observer::{ConsoleObserver, ProgressObserver};
use searom::{Settings, logging};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{error, info};

fn apply_overrides(mut settings: Settings, download: &DownloadArgs) -> Settings {
    if let Some(chunks) = download.chunks {
        settings.chunk_count = chunks;
    }
    if let Some(retries) = download.retries {
        settings.max_retries = retries;
    }
    if let Some(max_length) = download.max_length {
        settings.filename_max_length = max_length;
    }
    settings
}

async fn download(
    settings: &Settings,
    download: &DownloadArgs,
    observer: Arc<dyn ProgressObserver>,
) -> Result<()> {
    let client = build_client()?;
    let downloader = Downloader::new(client, settings, observer);
    let job = settings.job(&download.url, download.dir.clone());

    match downloader.run(&job).await {
        Ok(path) => {
            info!("Saved {}", path.display());
            Ok(())
        }
        Err(e) => {
            error!("An error occurred during the download ({}): {}", e.kind(), e);
            Err(e.into())
        }
    }
}

/// Re-launches this binary detached, running the download under the pid file.
fn spawn_background(download: &DownloadArgs, config: Option<&std::path::Path>) -> Result<u32> {
    let exe = std::env::current_exe().context("Failed to locate the searom executable")?;
    let mut command = Command::new(exe);
    if let Some(config) = config {
        command.arg("--config").arg(config);
    }
    command
        .arg("run")
        .arg("--managed")
        .args(download.to_argv())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let child = command
        .spawn()
        .context("Failed to start the background download")?;
    Ok(child.id())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = match &args.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    let _guard = logging::init(&settings);
    let lifecycle = Lifecycle::new(&settings.pid_file);

    match args.command {
        Commands::Run {
            download: download_args,
            managed,
        } => {
            let settings = apply_overrides(settings, &download_args);
            if managed {
                let dir = download_args
                    .dir
                    .clone()
                    .unwrap_or_else(|| settings.download_dir.clone());
                let path = lifecycle
                    .start(|| searom::run_job(&download_args.url, &dir, &settings))
                    .await??;
                info!("Saved {}", path.display());
            } else {
                download(&settings, &download_args, Arc::new(ConsoleObserver::new())).await?;
                println!("Download Completed!");
            }
        }
        Commands::Start {
            download: download_args,
        } => {
            if let Some(pid) = lifecycle.recorded_pid().filter(|_| lifecycle.is_running()) {
                bail!("A download is already running with pid {pid}");
            }
            let pid = spawn_background(&download_args, args.config.as_deref())?;
            println!("Started background download (pid {pid})");
        }
        Commands::Stop => {
            lifecycle.stop()?;
            println!("Stopped background download");
        }
        Commands::Status => match lifecycle.recorded_pid() {
            Some(pid) if lifecycle.is_running() => println!("Running (pid {pid})"),
            _ => println!("Not running"),
        },
    }

    Ok(())
}
