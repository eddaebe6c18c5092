//! facesift-core — identity registry, vote-based match engine, and the
//! per-file processing pipeline.
//!
//! Face detection/encoding and notification delivery are injected behind
//! the [`EncodingProvider`] and [`NotificationSink`] traits, so everything
//! in this crate runs without models or a network.

pub mod config;
pub mod files;
pub mod matcher;
pub mod pipeline;
pub mod provider;
pub mod registry;
pub mod sink;
pub mod types;

pub use config::{Config, ConfigError};
pub use matcher::{best_match, MatchPolicy};
pub use pipeline::{AbandonReason, DeleteReason, FileReport, MatchedFace, Outcome, Pipeline};
pub use provider::{EncodingProvider, ProviderError};
pub use registry::{IdentityRegistry, RegistryError};
pub use sink::{Notification, NotificationSink, SinkError};
pub use types::{BoundingBox, Destination, DetectedFace, Encoding, FaceCrop, MatchResult};
