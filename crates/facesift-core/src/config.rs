//! Service configuration, loaded once at startup from a JSON file.
//!
//! Required keys fail the load when absent; optional keys fall back to the
//! documented defaults. Nothing re-reads the file at runtime.

use crate::matcher::MatchPolicy;
use crate::types::Destination;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub media: MediaConfig,
    pub face_detection: FaceDetectionConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    pub destinations: BTreeMap<String, Destination>,
    #[serde(default)]
    pub debug: DebugConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Directory the bridge downloads incoming media into.
    pub store_path: PathBuf,
    /// Extension allow-list, entries with their leading dot (".jpg").
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaceDetectionConfig {
    /// Root of the reference image tree, one sub-directory per identity.
    pub known_faces_dir: PathBuf,
    /// Strict upper bound on a voting reference distance.
    pub confidence_threshold: f32,
    /// Detector variant name ("fast" or "accurate").
    #[serde(default = "default_model")]
    pub model: String,
    /// Votes an identity needs before it can win a match.
    #[serde(default = "default_min_matching_faces")]
    pub min_matching_faces: usize,
    /// Directory holding the ONNX model files.
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self { endpoint: default_endpoint(), timeout_secs: default_timeout_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DebugConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Where matched face crops are written when debug is enabled.
    #[serde(default = "default_debug_dir")]
    pub output_dir: PathBuf,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self { enabled: false, output_dir: default_debug_dir() }
    }
}

fn default_model() -> String {
    "fast".to_string()
}

fn default_min_matching_faces() -> usize {
    2
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_endpoint() -> String {
    "http://localhost:8080/api/send".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_debug_dir() -> PathBuf {
    PathBuf::from("debug_output")
}

impl Config {
    /// Read and parse the configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            distance_threshold: self.face_detection.confidence_threshold,
            min_votes: self.face_detection.min_matching_faces,
        }
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notifier.timeout_secs)
    }
}
