//! Debug artifacts: matched face crops saved for operator inspection.

use facesift_core::{FileReport, MatchedFace};
use image::RgbImage;
use std::path::Path;

/// Save every matched face crop from a report as
/// `match_{identity}_{timestamp}.jpg` under `dir`.
///
/// Failures are logged and swallowed; artifacts never affect pipeline
/// decisions.
pub fn save_match_crops(report: &FileReport, dir: &Path) {
    for matched in &report.matches {
        if let Err(error) = save_crop(matched, dir) {
            tracing::warn!(
                identity = %matched.result.identity,
                %error,
                "failed to save debug crop"
            );
        }
    }
}

fn save_crop(matched: &MatchedFace, dir: &Path) -> anyhow::Result<()> {
    let crop = &matched.face.crop;
    let buffer = RgbImage::from_raw(crop.width, crop.height, crop.rgb.clone())
        .ok_or_else(|| anyhow::anyhow!("crop buffer does not match its dimensions"))?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("match_{}_{timestamp}.jpg", matched.result.identity));
    buffer.save(&path)?;

    tracing::debug!(path = %path.display(), "saved debug crop");
    Ok(())
}
