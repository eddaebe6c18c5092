//! Filesystem watch boundary: creation events on the media store.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;

/// Paths created by one filesystem event. Non-creation events (writes,
/// renames-in, metadata churn) yield nothing; the pipeline's dedup set
/// absorbs any duplicate creations the backend reports.
pub fn created_paths(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) => event.paths.clone(),
        _ => Vec::new(),
    }
}

/// Watch `dir` (non-recursively) and forward every created path into `tx`.
///
/// The returned watcher owns the subscription. Dropping it stops the event
/// flow and, with it, the cloned sender inside the callback — the worker's
/// channel then drains and closes.
pub fn spawn(dir: &Path, tx: UnboundedSender<PathBuf>) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        match result {
            Ok(event) => {
                for path in created_paths(&event) {
                    // A send error means the worker is gone; nothing to do
                    // here but let shutdown finish.
                    if tx.send(path).is_err() {
                        return;
                    }
                }
            }
            Err(error) => tracing::warn!(%error, "filesystem watch error"),
        }
    })?;

    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind};

    #[test]
    fn test_created_paths_passes_creations() {
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/media/a.jpg"))
            .add_path(PathBuf::from("/media/b.jpg"));
        assert_eq!(
            created_paths(&event),
            vec![PathBuf::from("/media/a.jpg"), PathBuf::from("/media/b.jpg")]
        );
    }

    #[test]
    fn test_created_paths_ignores_modifications() {
        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/media/a.jpg"));
        assert!(created_paths(&event).is_empty());
    }

    #[test]
    fn test_created_paths_ignores_removals() {
        let event = Event::new(EventKind::Remove(notify::event::RemoveKind::File))
            .add_path(PathBuf::from("/media/a.jpg"));
        assert!(created_paths(&event).is_empty());
    }

    #[test]
    fn test_watch_forwards_created_file() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _watcher = spawn(dir.path(), tx).unwrap();

        std::fs::write(dir.path().join("new.jpg"), b"data").unwrap();

        // The backend delivers asynchronously; poll with a deadline.
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            match rx.try_recv() {
                Ok(path) => {
                    assert_eq!(path.file_name().unwrap(), "new.jpg");
                    break;
                }
                Err(_) if std::time::Instant::now() < deadline => {
                    std::thread::sleep(std::time::Duration::from_millis(20));
                }
                Err(e) => panic!("no creation event observed: {e}"),
            }
        }
    }
}
