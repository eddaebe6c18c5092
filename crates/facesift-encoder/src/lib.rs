//! facesift-encoder — face detection and encoding via ONNX Runtime.
//!
//! Pairs an UltraFace RFB detector with a MobileFaceNet embedder, exposed
//! to the rest of the system as one [`OnnxProvider`] behind the
//! `EncodingProvider` trait. CPU inference only.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod detector;
pub mod embedder;
mod provider;

pub use detector::{Detection, DetectorError, FaceDetector};
pub use embedder::{EmbedderError, FaceEmbedder, EMBEDDING_MODEL_FILE};
pub use provider::{EncoderError, OnnxProvider};

/// Detector variant selected by configuration.
///
/// Fast runs the 320x240 RFB model; accurate runs the 640x480 one. Both
/// feed the same embedder, so encodings stay comparable across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVariant {
    Fast,
    Accurate,
}

impl ModelVariant {
    /// ONNX file name for this variant's detector.
    pub fn detector_file(&self) -> &'static str {
        match self {
            ModelVariant::Fast => "det_rfb_320.onnx",
            ModelVariant::Accurate => "det_rfb_640.onnx",
        }
    }

    /// Detector network input size as (width, height).
    pub fn input_size(&self) -> (u32, u32) {
        match self {
            ModelVariant::Fast => (320, 240),
            ModelVariant::Accurate => (640, 480),
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelVariant::Fast => write!(f, "fast"),
            ModelVariant::Accurate => write!(f, "accurate"),
        }
    }
}

#[derive(Error, Debug)]
#[error("unknown model variant {0:?}; expected \"fast\" or \"accurate\"")]
pub struct UnknownVariant(String);

impl FromStr for ModelVariant {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(ModelVariant::Fast),
            "accurate" => Ok(ModelVariant::Accurate),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_parse() {
        assert_eq!("fast".parse::<ModelVariant>().unwrap(), ModelVariant::Fast);
        assert_eq!("accurate".parse::<ModelVariant>().unwrap(), ModelVariant::Accurate);
        assert!("hog".parse::<ModelVariant>().is_err());
    }

    #[test]
    fn test_variant_display_roundtrip() {
        for variant in [ModelVariant::Fast, ModelVariant::Accurate] {
            assert_eq!(variant.to_string().parse::<ModelVariant>().unwrap(), variant);
        }
    }

    #[test]
    fn test_variant_input_sizes() {
        assert_eq!(ModelVariant::Fast.input_size(), (320, 240));
        assert_eq!(ModelVariant::Accurate.input_size(), (640, 480));
    }
}
