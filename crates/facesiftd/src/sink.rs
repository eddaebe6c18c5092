//! Bridge-backed notification sink.

use facesift_bridge::{BridgeClient, BridgeError, SendMessageRequest};
use facesift_core::{Notification, NotificationSink, SinkError};

/// Delivers pipeline notifications through the messaging bridge: one image
/// message per matched identity, captioned with the configured display
/// name. The media path is passed as-is; the bridge reads the file from
/// the shared filesystem.
pub struct BridgeSink {
    client: BridgeClient,
}

impl BridgeSink {
    pub fn new(client: BridgeClient) -> Self {
        Self { client }
    }
}

impl NotificationSink for BridgeSink {
    fn deliver(&self, notification: &Notification) -> Result<(), SinkError> {
        let request = SendMessageRequest::image(
            notification.destination.clone(),
            notification.media_path.to_string_lossy().into_owned(),
            notification.caption.clone(),
        );

        self.client.send(&request).map_err(|error| match error {
            BridgeError::Status(code) => SinkError::Status(code),
            other => SinkError::Transport(other.to_string()),
        })
    }
}
