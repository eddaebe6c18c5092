use anyhow::{Context, Result};
use clap::Parser;
use facesift_bridge::{BridgeClient, BridgeError};
use facesift_core::files::describe_file;
use facesift_core::{Config, IdentityRegistry, Pipeline};
use facesift_encoder::{ModelVariant, OnnxProvider};
use sink::BridgeSink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing_subscriber::EnvFilter;

mod artifacts;
mod sink;
mod watcher;

#[derive(Parser)]
#[command(name = "facesiftd", about = "facesift media-watch daemon", version)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;
    tracing::info!(config = %args.config.display(), "facesiftd starting");

    if config.debug.enabled {
        std::fs::create_dir_all(&config.debug.output_dir).with_context(|| {
            format!("creating debug output dir {}", config.debug.output_dir.display())
        })?;
        tracing::info!(dir = %config.debug.output_dir.display(), "debug artifacts enabled");
    }

    let variant: ModelVariant = config
        .face_detection
        .model
        .parse()
        .context("face_detection.model")?;
    let provider = OnnxProvider::load(&config.face_detection.model_dir, variant)
        .context("loading face models")?;

    let registry = IdentityRegistry::load(
        &provider,
        &config.face_detection.known_faces_dir,
        &config.media.allowed_extensions,
    )
    .context("loading known faces")?;
    if registry.is_empty() {
        tracing::warn!("no known identities loaded; nothing will ever match");
    } else {
        tracing::info!(
            identities = registry.len(),
            references = registry.reference_count(),
            "known faces loaded"
        );
    }

    let removed = prepare_media_store(&config.media.store_path)?;
    if removed > 0 {
        tracing::info!(removed, "cleaned leftover files from media store");
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let (worker, ready) = spawn_worker(config.clone(), provider, Arc::new(registry), rx)?;
    ready
        .await
        .context("worker thread died during startup")?
        .context("connecting to messaging bridge")?;

    let watcher = watcher::spawn(&config.media.store_path, tx)
        .context("starting directory watch")?;
    tracing::info!(dir = %config.media.store_path.display(), "watching for new images");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facesiftd shutting down");

    // Dropping the watcher drops the last channel sender; the worker
    // drains whatever is already queued, then exits.
    drop(watcher);
    if worker.join().is_err() {
        tracing::error!("worker thread panicked during shutdown");
    }

    Ok(())
}

/// Create the media store if needed and remove any files already in it.
/// Whatever sat there before startup was never admitted and would
/// otherwise linger forever. Sub-directories are left alone.
fn prepare_media_store(dir: &Path) -> Result<usize> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating media store {}", dir.display()))?;
    tracing::info!(dir = %dir.display(), "cleaning media store");

    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("reading media store {}", dir.display()))?;

    let mut removed = 0usize;
    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(error) => {
                tracing::warn!(%error, "unreadable media store entry");
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let info = describe_file(&path);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                removed += 1;
                tracing::info!(file = %info, "removed leftover file");
            }
            Err(error) => {
                tracing::error!(file = %info, %error, "failed to remove leftover file");
            }
        }
    }
    Ok(removed)
}

/// Spawn the dedicated processing thread: one consumer, each file run to
/// completion before the next is taken.
///
/// The bridge client must be built on a plain OS thread (it is a blocking
/// client), so the thread constructs it and reports readiness back
/// through the returned channel. Startup waits on that before watching.
fn spawn_worker(
    config: Config,
    provider: OnnxProvider,
    registry: Arc<IdentityRegistry>,
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
) -> Result<(
    std::thread::JoinHandle<()>,
    oneshot::Receiver<Result<(), BridgeError>>,
)> {
    let (ready_tx, ready_rx) = oneshot::channel();

    let handle = std::thread::Builder::new()
        .name("facesift-worker".into())
        .spawn(move || {
            let client = match BridgeClient::new(&config.notifier.endpoint, config.notification_timeout()) {
                Ok(client) => {
                    let _ = ready_tx.send(Ok(()));
                    client
                }
                Err(error) => {
                    let _ = ready_tx.send(Err(error));
                    return;
                }
            };

            let pipeline = Pipeline::new(
                provider,
                BridgeSink::new(client),
                registry,
                config.match_policy(),
                config.destinations.clone(),
                config.media.allowed_extensions.clone(),
            );
            let debug_dir = config.debug.enabled.then(|| config.debug.output_dir.clone());

            tracing::info!("worker thread started");
            while let Some(path) = rx.blocking_recv() {
                if path.is_dir() {
                    continue;
                }
                let report = pipeline.handle_created(&path);
                if let Some(dir) = &debug_dir {
                    artifacts::save_match_crops(&report, dir);
                }
                tracing::debug!(
                    path = %report.path.display(),
                    outcome = ?report.outcome,
                    "file run complete"
                );
            }
            tracing::info!("worker thread exiting");
        })
        .context("failed to spawn worker thread")?;

    Ok((handle, ready_rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_media_store_removes_files_keeps_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("media");
        std::fs::create_dir(&store).unwrap();
        std::fs::write(store.join("stale1.jpg"), b"a").unwrap();
        std::fs::write(store.join("stale2.txt"), b"b").unwrap();
        std::fs::create_dir(store.join("keepme")).unwrap();

        let removed = prepare_media_store(&store).unwrap();
        assert_eq!(removed, 2);
        assert!(store.join("keepme").is_dir());
        assert!(!store.join("stale1.jpg").exists());
    }

    #[test]
    fn test_prepare_media_store_creates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("brand-new");
        let removed = prepare_media_store(&store).unwrap();
        assert_eq!(removed, 0);
        assert!(store.is_dir());
    }
}
