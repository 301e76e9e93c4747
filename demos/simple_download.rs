use searom::observer::ConsoleObserver;
use searom::{Downloader, Settings, logging};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration
    let url = "https://proof.ovh.net/files/10Mb.dat";
    let settings = Settings {
        chunk_count: 4,
        log_file: None,
        ..Settings::default()
    };
    let _guard = logging::init(&settings);

    println!("Starting example download...");
    println!("URL: {}", url);

    // 1. Setup the HTTP client shared by the probe and all chunk requests
    let client = searom::downloader::build_client()?;

    // 2. Wire the downloader to a progress bar
    let downloader = Downloader::new(client, &settings, Arc::new(ConsoleObserver::new()));

    // 3. Probe, plan, fetch the chunks concurrently, retry, merge
    let job = settings.job(url, Some(PathBuf::from(".")));
    match downloader.run(&job).await {
        Ok(path) => println!("Download completed successfully: {}", path.display()),
        Err(e) => eprintln!("Download failed ({}): {}", e.kind(), e),
    }

    Ok(())
}
