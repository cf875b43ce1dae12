//! Filesystem watching for the state file.
//!
//! Some event delivery mechanisms cannot monitor a single file, so the
//! watcher registers on the state file's parent directory and filters
//! events down to the file itself by name.

use std::ffi::{OsStr, OsString};
use std::future::Future;
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::Debouncer;

/// Failures setting up the filesystem watch.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The state path has no final file name component.
    #[error("state file path {0} does not name a file")]
    NoFileName(PathBuf),

    /// The underlying watcher could not be started.
    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// One filesystem change notification, reduced to what the relevance rule
/// needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub is_directory: bool,
}

/// A change is relevant when it is not a directory event and its final
/// path segment names the state file. Matching by name rather than full
/// path tolerates events delivered against differently-normalized paths
/// for the same file.
pub fn is_relevant(event: &ChangeEvent, state_file_name: &OsStr) -> bool {
    !event.is_directory && event.path.file_name() == Some(state_file_name)
}

/// Watches the state file's parent directory and pokes a [`Debouncer`]
/// for every relevant change.
pub struct StateWatcher {
    // Dropping the watcher unregisters it; keep it alive for the loop's
    // lifetime.
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<ChangeEvent>,
    file_name: OsString,
}

impl StateWatcher {
    /// Register a non-recursive watch on the state file's parent
    /// directory.
    pub fn new(state_path: &Path) -> Result<Self, WatchError> {
        let file_name = state_path
            .file_name()
            .ok_or_else(|| WatchError::NoFileName(state_path.to_path_buf()))?
            .to_os_string();

        // A path with a file name always has a parent; a bare file name's
        // parent is the empty string, meaning the current directory.
        let parent = match state_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, events) = mpsc::unbounded_channel();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        return;
                    }
                    for path in event.paths {
                        let is_directory = path.is_dir();
                        // The receiver draining slower than events arrive
                        // is fine; the debouncer collapses them anyway.
                        let _ = tx.send(ChangeEvent { path, is_directory });
                    }
                }
                Err(e) => warn!(error = %e, "filesystem watch error"),
            })
            .map_err(|source| WatchError::Watch {
                path: parent.clone(),
                source,
            })?;

        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Watch {
                path: parent.clone(),
                source,
            })?;

        info!(
            dir = %parent.display(),
            file = %file_name.to_string_lossy(),
            "watching for state file changes"
        );

        Ok(Self {
            _watcher: watcher,
            events,
            file_name,
        })
    }

    /// Forward relevant events to the debouncer until `shutdown` resolves
    /// or the event channel closes.
    pub async fn run(mut self, debouncer: &Debouncer, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested; no longer watching");
                    break;
                }
                maybe_event = self.events.recv() => match maybe_event {
                    Some(event) => {
                        if is_relevant(&event, &self.file_name) {
                            debug!(path = %event.path.display(), "state file changed");
                            debouncer.poke();
                        }
                    }
                    None => {
                        warn!("watch event channel closed");
                        break;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn event(path: &str, is_directory: bool) -> ChangeEvent {
        ChangeEvent {
            path: PathBuf::from(path),
            is_directory,
        }
    }

    #[test]
    fn test_relevance_matches_file_name() {
        let name = OsStr::new("acme.json");
        assert!(is_relevant(&event("/data/acme.json", false), name));
        // Name match, not full-path match.
        assert!(is_relevant(&event("/elsewhere/acme.json", false), name));
    }

    #[test]
    fn test_relevance_rejects_directories_and_siblings() {
        let name = OsStr::new("acme.json");
        assert!(!is_relevant(&event("/data/acme.json", true), name));
        assert!(!is_relevant(&event("/data/other.json", false), name));
        assert!(!is_relevant(&event("/data/acme.json.bak", false), name));
    }

    #[test]
    fn test_watcher_rejects_pathless_input() {
        assert!(matches!(
            StateWatcher::new(Path::new("/")),
            Err(WatchError::NoFileName(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_state_file_change_reaches_debouncer() {
        let tmp = TempDir::new().unwrap();
        let state_path = tmp.path().join("acme.json");
        std::fs::write(&state_path, "{}").unwrap();

        let watcher = StateWatcher::new(&state_path).unwrap();

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(50), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let loop_debouncer = debouncer.clone();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            watcher
                .run(&loop_debouncer, async {
                    let _ = stop_rx.await;
                })
                .await;
        });

        // Give the watch a moment to register, then touch the file.
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(&state_path, r#"{"changed": true}"#).unwrap();

        // Poll rather than sleep a fixed time; event delivery latency
        // varies by platform.
        let mut fired = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if runs.load(Ordering::SeqCst) >= 1 {
                fired = true;
                break;
            }
        }
        assert!(fired, "state file change never reached the extraction job");

        let _ = stop_tx.send(());
        handle.await.unwrap();
    }
}
