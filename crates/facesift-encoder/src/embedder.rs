//! MobileFaceNet face embedder via ONNX Runtime.
//!
//! Takes a detected face region, crops it with a margin, and produces a
//! 512-dimensional L2-normalized encoding.

use crate::detector::Detection;
use facesift_core::Encoding;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

pub const EMBEDDING_MODEL_FILE: &str = "rec_mbf_112.onnx";

const EMBED_INPUT_SIZE: u32 = 112;
const EMBED_MEAN: f32 = 127.5;
const EMBED_STD: f32 = 127.5;
const EMBED_DIM: usize = 512;
/// Detector boxes hug the face; widen by this fraction per side so the
/// network sees the full head region it was trained on.
const CROP_MARGIN: f32 = 0.2;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

// Builder methods return a recoverable `Error<SessionBuilder>`; fold it
// into the plain `Error<()>` variant.
impl From<ort::Error<ort::session::builder::SessionBuilder>> for EmbedderError {
    fn from(error: ort::Error<ort::session::builder::SessionBuilder>) -> Self {
        Self::Ort(error.into())
    }
}

/// MobileFaceNet-based embedding extractor.
pub struct FaceEmbedder {
    session: Session,
}

impl FaceEmbedder {
    /// Load the embedding ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, EmbedderError> {
        if !model_path.exists() {
            return Err(EmbedderError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face embedding model"
        );

        Ok(Self { session })
    }

    /// Produce an L2-normalized encoding for one detected face.
    pub fn extract(
        &mut self,
        image: &RgbImage,
        detection: &Detection,
    ) -> Result<Encoding, EmbedderError> {
        let (x, y, w, h) = expand_region(detection, image.width(), image.height());
        let face = image::imageops::crop_imm(image, x, y, w, h).to_image();
        let resized = image::imageops::resize(
            &face,
            EMBED_INPUT_SIZE,
            EMBED_INPUT_SIZE,
            image::imageops::FilterType::Triangle,
        );

        let input = preprocess(&resized);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != EMBED_DIM {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {EMBED_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Encoding::new(l2_normalize(raw.to_vec())))
    }
}

/// Widen a detection by [`CROP_MARGIN`] per side, clamped to the image.
/// Returns (x, y, width, height) with width and height at least 1.
fn expand_region(detection: &Detection, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
    let margin_x = detection.width() * CROP_MARGIN;
    let margin_y = detection.height() * CROP_MARGIN;

    let x1 = (detection.x1 - margin_x).max(0.0);
    let y1 = (detection.y1 - margin_y).max(0.0);
    let x2 = (detection.x2 + margin_x).min(image_width as f32);
    let y2 = (detection.y2 + margin_y).min(image_height as f32);

    let x = (x1.floor() as u32).min(image_width.saturating_sub(1));
    let y = (y1.floor() as u32).min(image_height.saturating_sub(1));
    let w = ((x2 - x1).ceil() as u32).max(1).min(image_width - x);
    let h = ((y2 - y1).ceil() as u32).max(1).min(image_height - y);
    (x, y, w, h)
}

/// Scale the vector to unit L2 norm. A zero vector is returned unchanged.
fn l2_normalize(raw: Vec<f32>) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw
    }
}

/// Preprocess a 112x112 RGB crop into a NCHW float tensor with symmetric
/// normalization.
fn preprocess(face: &RgbImage) -> Array4<f32> {
    let size = EMBED_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..size {
        for x in 0..size {
            let pixel = face.get_pixel(x as u32, y as u32);
            for c in 0..3 {
                tensor[[0, c, y, x]] = (pixel[c] as f32 - EMBED_MEAN) / EMBED_STD;
            }
        }
    }
    tensor
}
