use thiserror::Error;

use crate::region::Region;

/// Invalid static configuration. Raised while building an analyzer, never recovered per request.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("region {region} refers to landmark index {index}, but the landmark provider yields {landmark_count} points")]
    LandmarkIndexOutOfRange {
        region: Region,
        index: usize,
        landmark_count: usize,
    },

    #[error("region {0} has no landmark indices")]
    EmptyRegion(Region),

    #[error("region {0} is defined more than once")]
    DuplicateRegion(Region),

    #[error("region {0} has no definition")]
    MissingRegion(Region),

    #[error("priority order must list every region exactly once, got {0:?}")]
    InvalidPriorityOrder(Vec<Region>),

    #[error("crop size must be > 0")]
    ZeroCropSize,

    #[error("confidence threshold must be between 0.0 and 1.0, got {0}")]
    InvalidThreshold(f32),
}

/// Failure of a single `analyze` call. "No face" and "no detections" are results, not errors.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("landmark provider failed")]
    Landmark(#[source] anyhow::Error),

    #[error("object detector failed on region {region}")]
    Detection {
        region: Region,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to prepare crop buffer: {0}")]
    CropBuffer(#[from] fast_image_resize::ImageBufferError),

    #[error("failed to resize region crop: {0}")]
    Resize(#[from] fast_image_resize::ResizeError),
}
