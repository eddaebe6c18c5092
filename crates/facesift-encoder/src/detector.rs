//! UltraFace RFB face detector via ONNX Runtime.
//!
//! The RFB models export pre-decoded outputs: `scores` with shape
//! [1, N, 2] (background/face probability per prior) and `boxes` with
//! shape [1, N, 4] (corner coordinates normalized to [0, 1]). Post-
//! processing is confidence filtering, scaling to pixel space, and NMS.

use crate::ModelVariant;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const DET_MEAN: f32 = 127.0;
const DET_STD: f32 = 128.0;
const DET_CONFIDENCE_THRESHOLD: f32 = 0.7;
const DET_NMS_THRESHOLD: f32 = 0.35;
const DET_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

// Builder methods return a recoverable `Error<SessionBuilder>`; fold it
// into the plain `Error<()>` variant.
impl From<ort::Error<ort::session::builder::SessionBuilder>> for DetectorError {
    fn from(error: ort::Error<ort::session::builder::SessionBuilder>) -> Self {
        Self::Ort(error.into())
    }
}

/// One detection in original-image pixel space, corner form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl Detection {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

/// UltraFace-based face detector.
pub struct FaceDetector {
    session: Session,
    input_width: u32,
    input_height: u32,
    /// (scores, boxes) output indices, discovered by name at load time.
    output_indices: (usize, usize),
}

impl FaceDetector {
    /// Load the detector ONNX model for the given variant.
    pub fn load(model_path: &Path, variant: ModelVariant) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            %variant,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded face detection model"
        );

        if output_names.len() < 2 {
            return Err(DetectorError::InferenceFailed(format!(
                "detector requires scores and boxes outputs, got {}",
                output_names.len()
            )));
        }

        let (input_width, input_height) = variant.input_size();
        Ok(Self {
            session,
            input_width,
            input_height,
            output_indices: discover_output_indices(&output_names),
        })
    }

    /// Detect faces in an RGB image, returning pixel-space detections
    /// sorted by descending confidence.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        let input = preprocess(image, self.input_width, self.input_height);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (score_idx, box_idx) = self.output_indices;
        let (_, scores) = outputs[score_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("scores: {e}")))?;
        let (_, boxes) = outputs[box_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("boxes: {e}")))?;

        let detections = decode_detections(
            scores,
            boxes,
            image.width(),
            image.height(),
            DET_CONFIDENCE_THRESHOLD,
        );

        Ok(nms(detections, DET_NMS_THRESHOLD))
    }
}

/// Resize to the network input size and normalize into an NCHW float
/// tensor. Plain resize, no letterboxing: the RFB priors were trained on
/// distorted aspect.
fn preprocess(image: &RgbImage, input_width: u32, input_height: u32) -> Array4<f32> {
    let resized = image::imageops::resize(
        image,
        input_width,
        input_height,
        image::imageops::FilterType::Triangle,
    );

    let (w, h) = (input_width as usize, input_height as usize);
    let mut tensor = Array4::<f32>::zeros((1, DET_CHANNELS, h, w));
    for y in 0..h {
        for x in 0..w {
            let pixel = resized.get_pixel(x as u32, y as u32);
            for c in 0..DET_CHANNELS {
                tensor[[0, c, y, x]] = (pixel[c] as f32 - DET_MEAN) / DET_STD;
            }
        }
    }
    tensor
}

/// Map output tensor names to (scores, boxes) indices.
///
/// UltraFace exports name them "scores" and "boxes"; unrecognized names
/// fall back to positional order.
fn discover_output_indices(names: &[String]) -> (usize, usize) {
    let scores = names.iter().position(|n| n == "scores");
    let boxes = names.iter().position(|n| n == "boxes");
    match (scores, boxes) {
        (Some(s), Some(b)) => (s, b),
        _ => {
            tracing::info!(?names, "detector output names not recognized, using positional order");
            (0, 1)
        }
    }
}

/// Decode pre-filtered detections from the raw score/box tensors.
///
/// `scores` holds [background, face] pairs per prior; `boxes` holds
/// normalized [x1, y1, x2, y2] per prior. Coordinates are clamped to
/// [0, 1] before scaling, so every detection lies inside the image.
fn decode_detections(
    scores: &[f32],
    boxes: &[f32],
    image_width: u32,
    image_height: u32,
    threshold: f32,
) -> Vec<Detection> {
    let priors = scores.len() / 2;
    let (w, h) = (image_width as f32, image_height as f32);
    let mut detections = Vec::new();

    for idx in 0..priors {
        let confidence = scores[idx * 2 + 1];
        if confidence <= threshold {
            continue;
        }

        let off = idx * 4;
        if off + 3 >= boxes.len() {
            continue;
        }

        detections.push(Detection {
            x1: boxes[off].clamp(0.0, 1.0) * w,
            y1: boxes[off + 1].clamp(0.0, 1.0) * h,
            x2: boxes[off + 2].clamp(0.0, 1.0) * w,
            y2: boxes[off + 3].clamp(0.0, 1.0) * h,
            confidence,
        });
    }

    detections
}

/// Non-maximum suppression, highest confidence first.
fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in detections {
        if keep.iter().all(|kept| iou(kept, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection-over-union of two corner-form boxes.
fn iou(a: &Detection, b: &Detection) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, conf: f32) -> Detection {
        Detection { x1, y1, x2, y2, confidence: conf }
    }

    #[test]
    fn test_iou_identical() {
        let a = det(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = det(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = det(20.0, 20.0, 30.0, 30.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = det(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = det(5.0, 0.0, 15.0, 10.0, 1.0);
        // Overlap 5x10 = 50, union 100 + 100 - 50 = 150.
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            det(0.0, 0.0, 100.0, 100.0, 0.9),
            det(5.0, 5.0, 105.0, 105.0, 0.8),
            det(200.0, 200.0, 250.0, 250.0, 0.7),
        ];
        let kept = nms(detections, 0.35);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_disjoint() {
        let detections = vec![
            det(0.0, 0.0, 10.0, 10.0, 0.8),
            det(50.0, 50.0, 60.0, 60.0, 0.9),
        ];
        let kept = nms(detections, 0.35);
        assert_eq!(kept.len(), 2);
        // Sorted by confidence.
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.35).is_empty());
    }

    #[test]
    fn test_decode_filters_by_confidence() {
        // Two priors; only the second clears the threshold.
        let scores = [0.9, 0.1, 0.1, 0.9];
        let boxes = [0.0, 0.0, 0.5, 0.5, 0.25, 0.25, 0.75, 0.75];
        let dets = decode_detections(&scores, &boxes, 100, 200, 0.7);
        assert_eq!(dets.len(), 1);
        assert!((dets[0].x1 - 25.0).abs() < 1e-4);
        assert!((dets[0].y1 - 50.0).abs() < 1e-4);
        assert!((dets[0].x2 - 75.0).abs() < 1e-4);
        assert!((dets[0].y2 - 150.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_threshold_is_strict() {
        let scores = [0.3, 0.7];
        let boxes = [0.0, 0.0, 1.0, 1.0];
        assert!(decode_detections(&scores, &boxes, 100, 100, 0.7).is_empty());
    }

    #[test]
    fn test_decode_clamps_out_of_range_coordinates() {
        let scores = [0.05, 0.95];
        let boxes = [-0.1, -0.2, 1.1, 1.3];
        let dets = decode_detections(&scores, &boxes, 100, 100, 0.7);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].x1, 0.0);
        assert_eq!(dets[0].y1, 0.0);
        assert_eq!(dets[0].x2, 100.0);
        assert_eq!(dets[0].y2, 100.0);
    }

    #[test]
    fn test_decode_ignores_truncated_boxes() {
        // Scores claim two priors but boxes only carry one.
        let scores = [0.05, 0.95, 0.05, 0.95];
        let boxes = [0.0, 0.0, 0.5, 0.5];
        let dets = decode_detections(&scores, &boxes, 100, 100, 0.7);
        assert_eq!(dets.len(), 1);
    }

    #[test]
    fn test_discover_output_indices_by_name() {
        let names: Vec<String> = ["boxes", "scores"].iter().map(|s| s.to_string()).collect();
        assert_eq!(discover_output_indices(&names), (1, 0));
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names: Vec<String> = ["526", "527"].iter().map(|s| s.to_string()).collect();
        assert_eq!(discover_output_indices(&names), (0, 1));
    }

    #[test]
    fn test_preprocess_shape_and_normalization() {
        // Uniform 127-valued image normalizes to 0.0 everywhere.
        let image = RgbImage::from_pixel(64, 48, image::Rgb([127, 127, 127]));
        let tensor = preprocess(&image, 320, 240);
        assert_eq!(tensor.shape(), &[1, 3, 240, 320]);
        assert!(tensor[[0, 0, 0, 0]].abs() < 1e-6);
        assert!(tensor[[0, 2, 239, 319]].abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_channel_order() {
        // Pure red input: channel 0 high, channels 1 and 2 low.
        let image = RgbImage::from_pixel(32, 32, image::Rgb([255, 0, 0]));
        let tensor = preprocess(&image, 320, 240);
        assert!((tensor[[0, 0, 10, 10]] - (255.0 - DET_MEAN) / DET_STD).abs() < 1e-6);
        assert!((tensor[[0, 1, 10, 10]] - (0.0 - DET_MEAN) / DET_STD).abs() < 1e-6);
    }

    #[test]
    fn test_detection_dimensions() {
        let d = det(10.0, 20.0, 40.0, 80.0, 0.9);
        assert_eq!(d.width(), 30.0);
        assert_eq!(d.height(), 60.0);
        // Degenerate boxes never report negative size.
        let inverted = det(40.0, 80.0, 10.0, 20.0, 0.9);
        assert_eq!(inverted.width(), 0.0);
        assert_eq!(inverted.height(), 0.0);
    }
}
