use crate::types::DetectedFace;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("failed to read image: {0}")]
    Read(String),
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Face detection and encoding over an image file on disk.
///
/// Returns every face found, each with its pixel-space box, encoding
/// vector, and cropped pixels. The pipeline and registry treat failures
/// as recoverable: an error never aborts a load or a file run.
pub trait EncodingProvider {
    fn detect_faces(&self, image_path: &Path) -> Result<Vec<DetectedFace>, ProviderError>;
}
