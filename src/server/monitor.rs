use futures::Stream;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// A change of the watched configuration file.
#[derive(Debug, Clone)]
pub struct ConfigChange {
    /// File that changed
    pub path: PathBuf,
    /// When the change was noticed
    pub observed_at: Instant,
    /// Whether the file still exists
    pub exists: bool,
}

/// Polls a configuration file and reports content changes.
///
/// The file is small, so its full content is the fingerprint: a rewrite with
/// identical bytes is not a change, and changes within one mtime tick are not
/// missed.
#[derive(Debug, Clone)]
pub struct ConfigWatcher {
    path: PathBuf,
    interval: Duration,
    baseline: Option<Vec<u8>>,
}

impl ConfigWatcher {
    /// Creates a watcher comparing against `baseline`, the content the caller
    /// last acted upon (`None` if the file did not exist).
    pub fn new(path: impl Into<PathBuf>, interval: Duration, baseline: Option<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            interval,
            baseline,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Endless stream of changes, one item per observed difference.
    pub fn changes(self) -> impl Stream<Item = ConfigChange> + Send + 'static {
        let ConfigWatcher {
            path,
            interval,
            baseline,
        } = self;

        async_stream::stream! {
            let mut last = baseline;
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let current = fingerprint(&path).await;
                if current != last {
                    tracing::trace!(path = %path.display(), "Configuration content changed");
                    let exists = current.is_some();
                    last = current;
                    yield ConfigChange {
                        path: path.clone(),
                        observed_at: Instant::now(),
                        exists,
                    };
                }
            }
        }
    }
}

async fn fingerprint(path: &Path) -> Option<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(content) => Some(content),
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = %path.display(), error = %e, "Failed to read watched file");
            }
            None
        }
    }
}

/// Owns the task consuming a watcher; the task is aborted when the handle
/// is stopped or dropped.
#[derive(Debug)]
pub struct WatchHandle {
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_reports_each_content_change() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("standalone.xml");
        std::fs::write(&file, "one").unwrap();

        let watcher = ConfigWatcher::new(&file, Duration::from_millis(10), Some(b"one".to_vec()));
        let mut changes = Box::pin(watcher.changes());

        std::fs::write(&file, "two").unwrap();
        let change = time::timeout(Duration::from_secs(5), changes.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.path, file);
        assert!(change.exists);

        std::fs::remove_file(&file).unwrap();
        let change = time::timeout(Duration::from_secs(5), changes.next())
            .await
            .unwrap()
            .unwrap();
        assert!(!change.exists);
    }

    #[tokio::test]
    async fn test_identical_rewrite_is_not_a_change() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("standalone.xml");
        std::fs::write(&file, "same").unwrap();

        let watcher = ConfigWatcher::new(&file, Duration::from_millis(10), Some(b"same".to_vec()));
        let mut changes = Box::pin(watcher.changes());

        std::fs::write(&file, "same").unwrap();
        let next = time::timeout(Duration::from_millis(100), changes.next()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn test_handle_aborts_task() {
        let mut handle = WatchHandle::new(tokio::spawn(async {
            time::sleep(Duration::from_secs(60)).await;
        }));
        assert!(handle.is_active());
        handle.stop();
        assert!(!handle.is_active());
    }
}
