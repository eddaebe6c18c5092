//! Per-file processing pipeline: validate, detect, notify, cleanup.
//!
//! Each file admitted from a filesystem event runs the four stages to
//! completion on the calling thread. No stage failure propagates out as an
//! error; every run ends in a terminal [`Outcome`] and the loop that feeds
//! the pipeline keeps going.

use crate::files::{describe_file, extension_allowed};
use crate::matcher::{best_match, MatchPolicy};
use crate::provider::EncodingProvider;
use crate::registry::IdentityRegistry;
use crate::sink::{Notification, NotificationSink};
use crate::types::{Destination, DetectedFace, MatchResult};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Why a file was abandoned before detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    Missing,
    DisallowedExtension,
}

impl fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbandonReason::Missing => write!(f, "file no longer exists"),
            AbandonReason::DisallowedExtension => write!(f, "extension not in allowed list"),
        }
    }
}

/// Why the cleanup stage deleted a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteReason {
    NoFacesMatched,
    AllNotificationsSucceeded,
}

impl fmt::Display for DeleteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteReason::NoFacesMatched => write!(f, "no faces matched"),
            DeleteReason::AllNotificationsSucceeded => write!(f, "all notifications succeeded"),
        }
    }
}

/// Terminal result of one file's run through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Created entry with a disallowed extension, deleted at admission.
    RejectedNonImage,
    /// Path was already admitted once; this run did nothing.
    Duplicate,
    /// Validation failed; the file was left untouched.
    Abandoned { reason: AbandonReason },
    /// Cleanup deleted the file (with zero matches, deletion is the
    /// "no faces matched" case; otherwise every notification succeeded).
    Deleted { reason: DeleteReason },
    /// Policy called for deletion but the filesystem refused.
    DeleteFailed { reason: DeleteReason },
    /// At least one notification failed; the file stays on disk.
    Retained,
}

/// One matched face carried in a [`FileReport`].
#[derive(Debug, Clone)]
pub struct MatchedFace {
    pub result: MatchResult,
    pub face: DetectedFace,
}

/// Report for one file run: terminal outcome plus the matched faces, in
/// detection order, with their crops.
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: Outcome,
    pub matches: Vec<MatchedFace>,
}

impl FileReport {
    fn bare(path: &Path, outcome: Outcome) -> Self {
        Self { path: path.to_path_buf(), outcome, matches: Vec::new() }
    }
}

/// The per-file lifecycle pipeline.
///
/// Owns the set of already-admitted paths, so separate instances have
/// separate dedup state. A path is admitted at most once for the lifetime
/// of the instance; repeat events for the same path are no-ops, even after
/// a retained (partially notified) run.
pub struct Pipeline<P, S> {
    provider: P,
    sink: S,
    registry: Arc<IdentityRegistry>,
    policy: MatchPolicy,
    destinations: BTreeMap<String, Destination>,
    allowed_extensions: Vec<String>,
    processed: Mutex<HashSet<PathBuf>>,
}

impl<P: EncodingProvider, S: NotificationSink> Pipeline<P, S> {
    pub fn new(
        provider: P,
        sink: S,
        registry: Arc<IdentityRegistry>,
        policy: MatchPolicy,
        destinations: BTreeMap<String, Destination>,
        allowed_extensions: Vec<String>,
    ) -> Self {
        Self {
            provider,
            sink,
            registry,
            policy,
            destinations,
            allowed_extensions,
            processed: Mutex::new(HashSet::new()),
        }
    }

    /// Entry point for a filesystem creation event.
    ///
    /// A created entry whose name fails the extension allow-list is deleted
    /// immediately and never admitted. Everything else goes through
    /// [`process`](Self::process).
    pub fn handle_created(&self, path: &Path) -> FileReport {
        if !extension_allowed(path, &self.allowed_extensions) {
            let info = describe_file(path);
            match std::fs::remove_file(path) {
                Ok(()) => {
                    tracing::info!(file = %info, allowed = ?self.allowed_extensions, "deleted non-image file")
                }
                Err(error) => {
                    tracing::error!(file = %info, %error, "failed to delete non-image file")
                }
            }
            return FileReport::bare(path, Outcome::RejectedNonImage);
        }
        self.process(path)
    }

    /// Run one file through admission and the four stages.
    pub fn process(&self, path: &Path) -> FileReport {
        // Admission: record the path before any detection work, so repeat
        // events for a file mid-flight cannot re-run side effects.
        if !self.admit(path) {
            tracing::debug!(path = %path.display(), "already processed; ignoring repeat event");
            return FileReport::bare(path, Outcome::Duplicate);
        }

        tracing::info!(file = %describe_file(path), "processing file");

        if let Some(reason) = self.validate(path) {
            tracing::warn!(path = %path.display(), %reason, "abandoning file");
            return FileReport::bare(path, Outcome::Abandoned { reason });
        }

        let matches = self.detect(path);
        let delivered = self.notify(path, &matches);
        let outcome = self.cleanup(path, &matches, delivered);

        FileReport { path: path.to_path_buf(), outcome, matches }
    }

    /// True the first time a path is seen, false on every later call.
    fn admit(&self, path: &Path) -> bool {
        // Recover from poisoning: a panic elsewhere must not stop the
        // watch loop from admitting files.
        let mut processed = self
            .processed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        processed.insert(path.to_path_buf())
    }

    fn validate(&self, path: &Path) -> Option<AbandonReason> {
        if !path.exists() {
            return Some(AbandonReason::Missing);
        }
        if !extension_allowed(path, &self.allowed_extensions) {
            return Some(AbandonReason::DisallowedExtension);
        }
        None
    }

    /// Detect faces and match each one independently.
    ///
    /// Provider failures and a file that vanished since validation both
    /// yield an empty list; the run then continues as "no faces matched".
    fn detect(&self, path: &Path) -> Vec<MatchedFace> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "file disappeared before detection");
            return Vec::new();
        }

        let faces = match self.provider.detect_faces(path) {
            Ok(faces) => faces,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "face detection failed");
                return Vec::new();
            }
        };

        if faces.is_empty() {
            tracing::info!(path = %path.display(), "no faces found in image");
            return Vec::new();
        }
        tracing::info!(path = %path.display(), faces = faces.len(), "detected faces");

        let mut matches = Vec::new();
        for face in faces {
            let Some(result) = best_match(&face.encoding, &self.registry, &self.policy) else {
                continue;
            };
            tracing::info!(
                identity = %result.identity,
                best_distance = result.best_distance,
                votes_matched = result.votes_matched,
                votes_total = result.votes_total,
                "face matched"
            );
            matches.push(MatchedFace { result, face });
        }

        if matches.is_empty() {
            tracing::info!(path = %path.display(), "no matching faces");
        }
        matches
    }

    /// Deliver one notification per match, in detection order.
    ///
    /// Returns true only when every delivery succeeded. A file that
    /// disappears mid-sequence aborts the remaining deliveries and fails
    /// the phase; a failed single delivery marks the phase failed but the
    /// remaining matches are still attempted.
    fn notify(&self, path: &Path, matches: &[MatchedFace]) -> bool {
        if matches.is_empty() {
            return true;
        }

        tracing::info!(path = %path.display(), count = matches.len(), "sending notifications");
        let mut all_delivered = true;

        for (index, matched) in matches.iter().enumerate() {
            let identity = &matched.result.identity;
            tracing::info!(
                notification = index + 1,
                total = matches.len(),
                %identity,
                "sending notification"
            );

            if !path.exists() {
                tracing::error!(
                    path = %path.display(),
                    "file disappeared during notification; aborting remaining deliveries"
                );
                return false;
            }

            let Some(destination) = self.destinations.get(identity) else {
                tracing::error!(%identity, "no destination configured for identity");
                all_delivered = false;
                continue;
            };

            let notification = Notification {
                destination: destination.group.clone(),
                caption: destination.display_name.clone(),
                media_path: path.to_path_buf(),
            };

            match self.sink.deliver(&notification) {
                Ok(()) => {
                    tracing::info!(%identity, group = %destination.group, "notification delivered")
                }
                Err(error) => {
                    tracing::error!(%identity, %error, "notification failed");
                    all_delivered = false;
                }
            }
        }

        if all_delivered {
            tracing::info!(path = %path.display(), count = matches.len(), "all notifications delivered");
        } else {
            tracing::warn!(path = %path.display(), "one or more notifications failed");
        }
        all_delivered
    }

    /// Apply the keep/delete policy and settle the outcome.
    fn cleanup(&self, path: &Path, matches: &[MatchedFace], delivered: bool) -> Outcome {
        if !delivered {
            tracing::warn!(
                file = %describe_file(path),
                reason = "one or more notifications failed",
                "retaining file"
            );
            return Outcome::Retained;
        }

        let reason = if matches.is_empty() {
            DeleteReason::NoFacesMatched
        } else {
            DeleteReason::AllNotificationsSucceeded
        };

        match delete_file(path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), %reason, "deleted file");
                Outcome::Deleted { reason }
            }
            Err(error) => {
                tracing::error!(path = %path.display(), %error, "failed to delete file");
                Outcome::DeleteFailed { reason }
            }
        }
    }
}

/// Idempotent delete: a file that is already gone counts as deleted.
fn delete_file(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "file already gone");
        return Ok(());
    }
    let info = describe_file(path);
    std::fs::remove_file(path)?;
    tracing::info!(file = %info, "removed file");
    Ok(())
}
