use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};

mod yolo;

pub use yolo::YoloAcneDetector;

/// One detector output. `bbox` is `[x1, y1, x2, y2]`, in crop-local pixels when it comes out
/// of an [`ObjectDetector`] and in original-image pixels once remapped.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct DetectionBox {
    pub bbox: [f32; 4],
    pub class_id: usize,
    pub confidence: f32,
}

impl DetectionBox {
    pub fn new(bbox: [f32; 4], class_id: usize, confidence: f32) -> Self {
        DetectionBox { bbox, class_id, confidence }
    }
}

/// Object detector run on every square region crop.
///
/// Implementations return every candidate they produce; class and confidence filtering
/// happens in [`DetectionFilter`].
pub trait ObjectDetector: Send {
    fn infer(&mut self, crop: &RgbImage) -> Result<Vec<DetectionBox>>;
}

/// Keeps detections of one class whose confidence reaches a threshold.
#[derive(Debug, Clone, Copy)]
pub struct DetectionFilter {
    pub target_class: usize,
    pub confidence_threshold: f32,
}

impl DetectionFilter {
    pub fn new(target_class: usize, confidence_threshold: f32) -> Self {
        DetectionFilter { target_class, confidence_threshold }
    }

    pub fn accepts(&self, detection: &DetectionBox) -> bool {
        detection.class_id == self.target_class && detection.confidence >= self.confidence_threshold
    }

    pub fn apply(&self, detections: Vec<DetectionBox>) -> Vec<DetectionBox> {
        detections.into_iter().filter(|d| self.accepts(d)).collect()
    }
}
