use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};

mod face_mesh;
mod retinaface;

pub use face_mesh::FaceMeshLandmarker;
pub use retinaface::{FoundFace, RetinaFaceDetector};

/// A landmark in normalized image coordinates: `x` and `y` are fractions of width and height.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Point2D {
    pub x: f32,
    pub y: f32,
}

impl Point2D {
    pub fn new(x: f32, y: f32) -> Self {
        Point2D { x, y }
    }
}

/// Landmarks of the single face found in an image.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct FaceLandmarks {
    pub points: Vec<Point2D>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Point2D>) -> Self {
        FaceLandmarks { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Point2D> {
        self.points.get(index).copied()
    }
}

/// Source of facial landmarks. Implement this to plug a different landmark model into
/// [`crate::AcneAnalyzer`].
pub trait LandmarkDetector: Send {
    /// Number of points every successful [`detect`](Self::detect) returns.
    fn landmark_count(&self) -> usize;

    /// Landmarks of the first face in `image`, or `None` when no face is present.
    fn detect(&mut self, image: &RgbImage) -> Result<Option<FaceLandmarks>>;
}
