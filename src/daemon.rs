//! Process lifecycle for background downloads.
//!
//! A [`Lifecycle`] owns a PID file and runs exactly one job while holding it.
//! It knows nothing about downloading: the job is any future handed to
//! [`Lifecycle::start`]. Stopping sends SIGTERM to the recorded process; there
//! is no graceful cancellation of an in-flight download.
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("process is already running with pid {pid}")]
    AlreadyRunning { pid: i32 },

    #[error("process is not running")]
    NotRunning,

    #[error("failed to stop process {pid}: {source}")]
    Signal { pid: i32, source: Errno },

    #[error("pid file {path:?}: {source}")]
    PidFile { path: PathBuf, source: io::Error },
}

/// A PID file that is removed again when dropped.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Writes the current process id to `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<PidFile, LifecycleError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| LifecycleError::PidFile {
                path: path.clone(),
                source,
            })?;
        }
        fs::write(&path, std::process::id().to_string()).map_err(|source| {
            LifecycleError::PidFile {
                path: path.clone(),
                source,
            }
        })?;

        info!("Pid file created {:?}", path);
        Ok(PidFile { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Pid file deleted {:?}", self.path),
            Err(err) => warn!("Error while removing pid file {:?}: {}", self.path, err),
        }
    }
}

/// Starts, stops and inspects the single background job tied to a PID file.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    pid_file: PathBuf,
}

impl Lifecycle {
    pub fn new(pid_file: impl Into<PathBuf>) -> Self {
        Lifecycle {
            pid_file: pid_file.into(),
        }
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    /// Pid recorded in the PID file, if the file exists and holds a number.
    pub fn recorded_pid(&self) -> Option<i32> {
        fs::read_to_string(&self.pid_file)
            .ok()
            .and_then(|content| content.trim().parse().ok())
    }

    /// Whether the recorded process is alive.
    pub fn is_running(&self) -> bool {
        self.recorded_pid().is_some_and(process_alive)
    }

    /// Runs `job` once while holding the PID file.
    ///
    /// Fails without running the job when another process holds the file. A
    /// PID file left behind by a dead process is replaced.
    pub async fn start<F, Fut, T>(&self, job: F) -> Result<T, LifecycleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(pid) = self.recorded_pid() {
            if process_alive(pid) && pid != std::process::id() as i32 {
                info!("Process is already running.");
                return Err(LifecycleError::AlreadyRunning { pid });
            }
            debug!("Replacing stale pid file {:?}", self.pid_file);
        }

        let _guard = PidFile::create(&self.pid_file)?;
        Ok(job().await)
    }

    /// Sends SIGTERM to the recorded process and removes the PID file.
    pub fn stop(&self) -> Result<(), LifecycleError> {
        let pid = match self.recorded_pid() {
            Some(pid) if process_alive(pid) => pid,
            _ => {
                info!("Process is not running.");
                return Err(LifecycleError::NotRunning);
            }
        };

        kill(Pid::from_raw(pid), Signal::SIGTERM)
            .map_err(|source| LifecycleError::Signal { pid, source })?;

        if let Err(err) = fs::remove_file(&self.pid_file) {
            if err.kind() != io::ErrorKind::NotFound {
                return Err(LifecycleError::PidFile {
                    path: self.pid_file.clone(),
                    source: err,
                });
            }
        }
        info!("Stopped process {}", pid);
        Ok(())
    }
}

fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None::<Signal>) {
        Ok(()) => true,
        // Alive, but owned by someone else.
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[tokio::test]
    async fn start_runs_job_once_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let lifecycle = Lifecycle::new(dir.path().join("searom.pid"));
        let calls = AtomicUsize::new(0);
        let (calls_ref, lifecycle_ref) = (&calls, &lifecycle);

        let result = lifecycle
            .start(|| async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                assert!(lifecycle_ref.is_running());
                assert_eq!(
                    lifecycle_ref.recorded_pid(),
                    Some(std::process::id() as i32)
                );
                42
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!lifecycle.pid_file().exists());
        assert!(!lifecycle.is_running());
    }

    #[tokio::test]
    async fn stale_pid_file_is_replaced() {
        let dir = TempDir::new().unwrap();
        let lifecycle = Lifecycle::new(dir.path().join("searom.pid"));
        // Pids are capped well below this on Linux.
        fs::write(lifecycle.pid_file(), "2147483646").unwrap();
        assert!(!lifecycle.is_running());

        let ran = lifecycle.start(|| async { true }).await.unwrap();
        assert!(ran);
    }

    #[test]
    fn stop_without_running_process_fails() {
        let dir = TempDir::new().unwrap();
        let lifecycle = Lifecycle::new(dir.path().join("searom.pid"));
        assert_matches!(lifecycle.stop(), Err(LifecycleError::NotRunning));

        fs::write(lifecycle.pid_file(), "not a pid").unwrap();
        assert_eq!(lifecycle.recorded_pid(), None);
        assert_matches!(lifecycle.stop(), Err(LifecycleError::NotRunning));
    }

    #[test]
    fn pid_file_guard_removes_file_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run").join("searom.pid");

        let guard = PidFile::create(&path).unwrap();
        assert_eq!(
            fs::read_to_string(guard.path()).unwrap(),
            std::process::id().to_string()
        );
        drop(guard);
        assert!(!path.exists());
    }
}
