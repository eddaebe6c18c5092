use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("endpoint returned status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
}

/// One alert for a matched identity, pointing at the matched media file.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Group or channel identifier on the delivery side.
    pub destination: String,
    /// Caption attached to the forwarded media.
    pub caption: String,
    /// The matched file on local disk.
    pub media_path: PathBuf,
}

/// Delivery capability for match notifications.
///
/// A delivery either succeeds or fails; the pipeline's keep/delete policy
/// needs nothing more. Implementations bound their wait time and report a
/// timeout as a failure.
pub trait NotificationSink {
    fn deliver(&self, notification: &Notification) -> Result<(), SinkError>;
}
