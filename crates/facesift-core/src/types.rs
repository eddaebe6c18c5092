use serde::{Deserialize, Serialize};

/// Pixel-space bounding box for a detected face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

/// Face encoding vector produced by an encoding provider.
///
/// All encodings compared against each other must come from the same
/// provider; vectors from different models are not commensurable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encoding {
    pub values: Vec<f32>,
}

impl Encoding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean (L2) distance to another encoding. Lower = more similar.
    pub fn distance(&self, other: &Encoding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Raw RGB8 pixels cropped from a detected face region.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceCrop {
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// One face found in an image: where it sits, its encoding, and the cropped
/// pixels. Lives only for the processing of a single file.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bounding_box: BoundingBox,
    pub encoding: Encoding,
    pub crop: FaceCrop,
}

/// Winning identity for one detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub identity: String,
    /// Smallest distance among this identity's voting references.
    pub best_distance: f32,
    /// Reference encodings that voted (distance strictly below threshold).
    pub votes_matched: usize,
    /// Reference encodings the identity holds in total.
    pub votes_total: usize,
}

/// Where a matched identity's notification goes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    /// Group or channel identifier understood by the messaging bridge.
    pub group: String,
    /// Human-readable name, used as the caption on forwarded media.
    #[serde(rename = "name")]
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_identical() {
        let a = Encoding::new(vec![0.5, -0.5, 1.0]);
        let b = Encoding::new(vec![0.5, -0.5, 1.0]);
        assert!(a.distance(&b).abs() < 1e-6);
    }

    #[test]
    fn test_distance_known_value() {
        // 3-4-5 triangle.
        let a = Encoding::new(vec![0.0, 0.0]);
        let b = Encoding::new(vec![3.0, 4.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_symmetric() {
        let a = Encoding::new(vec![1.0, 2.0, 3.0]);
        let b = Encoding::new(vec![-1.0, 0.5, 2.0]);
        assert!((a.distance(&b) - b.distance(&a)).abs() < 1e-6);
    }

    #[test]
    fn test_distance_empty_is_zero() {
        let a = Encoding::new(vec![]);
        let b = Encoding::new(vec![]);
        assert_eq!(a.distance(&b), 0.0);
    }

    #[test]
    fn test_destination_field_names() {
        let d: Destination =
            serde_json::from_str(r#"{"group": "g-1@broadcast", "name": "Alice"}"#).unwrap();
        assert_eq!(d.group, "g-1@broadcast");
        assert_eq!(d.display_name, "Alice");
    }
}
