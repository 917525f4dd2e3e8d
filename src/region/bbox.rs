use serde::{Deserialize, Serialize};

use super::RegionDefinition;
use crate::error::ConfigError;
use crate::landmark::FaceLandmarks;

/// Axis-aligned box in original-image pixels. The covered sub-grid is
/// `[x_min, x_max) × [y_min, y_max)`; zero width or height is legal.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl BoundingBox {
    pub fn new(x_min: u32, y_min: u32, x_max: u32, y_max: u32) -> Self {
        debug_assert!(x_min <= x_max && y_min <= y_max);
        BoundingBox { x_min, y_min, x_max, y_max }
    }

    pub fn width(&self) -> u32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> u32 {
        self.y_max - self.y_min
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Truncates a normalized coordinate to a pixel position inside `[0, extent]`.
fn denormalize(value: f32, extent: u32) -> u32 {
    let pixel = (value * extent as f32) as i64;
    pixel.clamp(0, extent as i64) as u32
}

/// Encloses every landmark listed in `definition`, denormalized against the image size.
///
/// An index past the end of `landmarks` is a configuration error; it is reported,
/// never clamped.
pub fn extract_bounding_box(
    landmarks: &FaceLandmarks,
    definition: &RegionDefinition,
    image_width: u32,
    image_height: u32,
) -> Result<BoundingBox, ConfigError> {
    if definition.landmark_indices.is_empty() {
        return Err(ConfigError::EmptyRegion(definition.region));
    }

    let mut x_min = u32::MAX;
    let mut y_min = u32::MAX;
    let mut x_max = 0;
    let mut y_max = 0;
    for &index in &definition.landmark_indices {
        let point = landmarks.get(index).ok_or(ConfigError::LandmarkIndexOutOfRange {
            region: definition.region,
            index,
            landmark_count: landmarks.len(),
        })?;
        let x = denormalize(point.x, image_width);
        let y = denormalize(point.y, image_height);
        x_min = x_min.min(x);
        y_min = y_min.min(y);
        x_max = x_max.max(x);
        y_max = y_max.max(y);
    }

    Ok(BoundingBox::new(x_min, y_min, x_max, y_max))
}
