//! Workspace watcher driving incremental reload.
//!
//! Watches the workspace tree for function source changes and reports them
//! as [`FileEvent`]s.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::{DebounceEventResult, new_debouncer, notify::RecursiveMode};
use tokio::sync::mpsc;

use crate::error::{ServerError, ServerResult};

/// File change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// File was created or modified.
    Modified(PathBuf),
    /// File was removed.
    Removed(PathBuf),
}

/// File watcher handle.
pub struct FileWatcher {
    /// Debouncer handle (kept alive to maintain watcher).
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    rx: mpsc::UnboundedReceiver<FileEvent>,
}

impl FileWatcher {
    /// Watch `workspace` recursively for files ending in `.{extension}`.
    pub fn new(workspace: impl AsRef<Path>, extension: &str) -> ServerResult<Self> {
        let workspace = workspace.as_ref().to_path_buf();
        let extension = extension.to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut debouncer = new_debouncer(
            Duration::from_millis(200),
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    for event in events {
                        if let Some(file_event) = classify(&event.path, &extension) {
                            let _ = tx.send(file_event);
                        }
                    }
                }
                Err(e) => tracing::warn!("watch error: {e}"),
            },
        )
        .map_err(|e| ServerError::Watch(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&workspace, RecursiveMode::Recursive)
            .map_err(|e| ServerError::Watch(e.to_string()))?;

        Ok(Self {
            _debouncer: debouncer,
            rx,
        })
    }

    /// Receive the next file event.
    pub async fn recv(&mut self) -> Option<FileEvent> {
        self.rx.recv().await
    }
}

fn classify(path: &Path, extension: &str) -> Option<FileEvent> {
    if path.extension().is_none_or(|ext| ext != extension) {
        return None;
    }
    let path = path.to_path_buf();
    if path.is_file() {
        Some(FileEvent::Modified(path))
    } else if path.exists() {
        None
    } else {
        Some(FileEvent::Removed(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_watcher_creation() {
        let temp = TempDir::new().unwrap();
        assert!(FileWatcher::new(temp.path(), "ns").is_ok());
    }

    #[test]
    fn test_classify_filters_extension() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("hello.ns");
        let notes = temp.path().join("notes.md");
        fs::write(&source, "export default 1").unwrap();
        fs::write(&notes, "# notes").unwrap();

        assert_eq!(classify(&source, "ns"), Some(FileEvent::Modified(source.clone())));
        assert_eq!(classify(&notes, "ns"), None);

        fs::remove_file(&source).unwrap();
        assert_eq!(classify(&source, "ns"), Some(FileEvent::Removed(source)));
    }
}
