//! [`EncodingProvider`] implementation backed by the ONNX models.

use crate::detector::{Detection, DetectorError, FaceDetector};
use crate::embedder::{EmbedderError, FaceEmbedder, EMBEDDING_MODEL_FILE};
use crate::ModelVariant;
use facesift_core::{BoundingBox, DetectedFace, EncodingProvider, FaceCrop, ProviderError};
use image::RgbImage;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Embedder(#[from] EmbedderError),
}

/// Detector plus embedder, loaded once and shared behind the provider
/// trait. Sessions need `&mut` to run, so each sits behind a mutex; the
/// single-worker pipeline never contends on them.
pub struct OnnxProvider {
    detector: Mutex<FaceDetector>,
    embedder: Mutex<FaceEmbedder>,
}

impl OnnxProvider {
    /// Load the variant's detector and the embedder from `model_dir`.
    pub fn load(model_dir: &Path, variant: ModelVariant) -> Result<Self, EncoderError> {
        let detector = FaceDetector::load(&model_dir.join(variant.detector_file()), variant)?;
        let embedder = FaceEmbedder::load(&model_dir.join(EMBEDDING_MODEL_FILE))?;
        tracing::info!(dir = %model_dir.display(), %variant, "face encoding models ready");
        Ok(Self { detector: Mutex::new(detector), embedder: Mutex::new(embedder) })
    }
}

impl EncodingProvider for OnnxProvider {
    fn detect_faces(&self, image_path: &Path) -> Result<Vec<DetectedFace>, ProviderError> {
        let image = image::open(image_path).map_err(map_image_error)?.into_rgb8();

        let detections = self
            .detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .detect(&image)
            .map_err(|e| ProviderError::Inference(e.to_string()))?;

        let mut embedder = self.embedder.lock().unwrap_or_else(PoisonError::into_inner);
        let mut faces = Vec::with_capacity(detections.len());
        for detection in &detections {
            let encoding = embedder
                .extract(&image, detection)
                .map_err(|e| ProviderError::Inference(e.to_string()))?;
            let bounding_box = pixel_box(detection, image.width(), image.height());
            let crop = crop_rgb(&image, &bounding_box);
            faces.push(DetectedFace { bounding_box, encoding, crop });
        }

        tracing::debug!(path = %image_path.display(), faces = faces.len(), "image encoded");
        Ok(faces)
    }
}

fn map_image_error(error: image::ImageError) -> ProviderError {
    match error {
        image::ImageError::IoError(io) => ProviderError::Read(io.to_string()),
        other => ProviderError::Decode(other.to_string()),
    }
}

/// Convert a corner-form detection to an integer pixel box inside the
/// image, at least 1x1.
fn pixel_box(detection: &Detection, image_width: u32, image_height: u32) -> BoundingBox {
    let x = (detection.x1.max(0.0) as u32).min(image_width.saturating_sub(1));
    let y = (detection.y1.max(0.0) as u32).min(image_height.saturating_sub(1));
    let x2 = (detection.x2.ceil().max(0.0) as u32).min(image_width);
    let y2 = (detection.y2.ceil().max(0.0) as u32).min(image_height);

    BoundingBox {
        x,
        y,
        width: x2.saturating_sub(x).max(1),
        height: y2.saturating_sub(y).max(1),
        confidence: detection.confidence,
    }
}

/// Copy the box region out of the image as raw RGB8.
fn crop_rgb(image: &RgbImage, bounding_box: &BoundingBox) -> FaceCrop {
    let view = image::imageops::crop_imm(
        image,
        bounding_box.x,
        bounding_box.y,
        bounding_box.width,
        bounding_box.height,
    )
    .to_image();
    FaceCrop { rgb: view.into_raw(), width: bounding_box.width, height: bounding_box.height }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection { x1, y1, x2, y2, confidence: 0.8 }
    }

    #[test]
    fn test_pixel_box_inside_image() {
        let b = pixel_box(&det(10.4, 20.6, 50.2, 90.9), 640, 480);
        assert_eq!((b.x, b.y), (10, 20));
        assert_eq!((b.width, b.height), (41, 71));
        assert!((b.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_pixel_box_clamped_to_edges() {
        let b = pixel_box(&det(630.0, 470.0, 700.0, 500.0), 640, 480);
        assert!(b.x + b.width <= 640);
        assert!(b.y + b.height <= 480);
    }

    #[test]
    fn test_pixel_box_never_empty() {
        let b = pixel_box(&det(100.0, 100.0, 100.0, 100.0), 640, 480);
        assert!(b.width >= 1);
        assert!(b.height >= 1);
    }

    #[test]
    fn test_crop_rgb_extracts_region() {
        // 4x4 image, red in the top-left 2x2, black elsewhere.
        let image = RgbImage::from_fn(4, 4, |x, y| {
            if x < 2 && y < 2 {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([0, 0, 0])
            }
        });
        let bbox = BoundingBox { x: 0, y: 0, width: 2, height: 2, confidence: 1.0 };
        let crop = crop_rgb(&image, &bbox);
        assert_eq!(crop.width, 2);
        assert_eq!(crop.height, 2);
        assert_eq!(crop.rgb.len(), 2 * 2 * 3);
        assert_eq!(&crop.rgb[0..3], &[255, 0, 0]);
    }

    #[test]
    fn test_image_error_mapping() {
        let io = image::ImageError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        assert!(matches!(map_image_error(io), ProviderError::Read(_)));
    }
}
