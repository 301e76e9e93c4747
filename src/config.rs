//! User settings, read from `<config dir>/searom/config.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//!
//! ```toml
//! download_dir = "/data/downloads"
//! chunk_count = 16
//! max_retries = 5
//! ```
use crate::downloader::DownloadJob;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where downloads are saved when no directory is given.
    pub download_dir: PathBuf,
    /// Number of byte ranges a file is split into.
    pub chunk_count: u32,
    /// Outer retry rounds over failed chunks.
    pub max_retries: u32,
    /// Longest filename, in characters, the output may have.
    pub filename_max_length: usize,
    /// Attempts per chunk inside one fetch.
    pub chunk_attempts: u32,
    /// Pause between two attempts of the same chunk.
    pub chunk_retry_delay_ms: u64,
    /// Ask the server for the tail of a part file left by an earlier attempt.
    pub resume_partial_chunks: bool,
    pub pid_file: PathBuf,
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let log_file = dirs::data_dir()
            .unwrap_or_else(|| home.clone())
            .join("searom")
            .join("searom.log");

        Settings {
            download_dir: dirs::download_dir().unwrap_or_else(|| home.join("Downloads")),
            chunk_count: 10,
            max_retries: 10,
            filename_max_length: 50,
            chunk_attempts: 10,
            chunk_retry_delay_ms: 1000,
            resume_partial_chunks: true,
            pid_file: home.join("searom.pid"),
            log_file: Some(log_file),
        }
    }
}

impl Settings {
    /// Default location of the config file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("searom").join("config.toml"))
    }

    /// Loads settings from the default location, or defaults when there is none.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Settings::default()),
        }
    }

    /// Loads settings from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Settings::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn chunk_retry_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_retry_delay_ms)
    }

    /// Builds the job for `url`, saving into `dir` or the configured directory.
    pub fn job(&self, url: &str, dir: Option<PathBuf>) -> DownloadJob {
        DownloadJob {
            url: url.to_string(),
            target_dir: dir.unwrap_or_else(|| self.download_dir.clone()),
            chunk_count: self.chunk_count,
            max_retries: self.max_retries,
            max_length: self.filename_max_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    #[test]
    fn documented_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.chunk_count, 10);
        assert_eq!(settings.max_retries, 10);
        assert_eq!(settings.filename_max_length, 50);
        assert_eq!(settings.chunk_attempts, 10);
        assert_eq!(settings.chunk_retry_delay(), Duration::from_secs(1));
        assert!(settings.resume_partial_chunks);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "chunk_count = 4\ndownload_dir = \"/srv/files\"\n").unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.chunk_count, 4);
        assert_eq!(settings.download_dir, PathBuf::from("/srv/files"));
        assert_eq!(settings.max_retries, 10);

        let job = settings.job("http://example.com/a.bin", None);
        assert_eq!(job.target_dir, PathBuf::from("/srv/files"));
        assert_eq!(job.chunk_count, 4);
        assert_eq!(job.max_length, 50);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "chunk_count = \"many\"").unwrap();

        assert_matches!(Settings::load_from(&path), Err(ConfigError::Parse { .. }));
    }
}
