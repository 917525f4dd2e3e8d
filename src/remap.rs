use crate::crop::NormalizedCrop;
use crate::detection::DetectionBox;

/// Per-axis affine map from the square crop back to original-image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropTransform {
    pub origin_x: f32,
    pub origin_y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
}

impl CropTransform {
    /// `crop_width`/`crop_height` are the extents before resizing, not the square size.
    pub fn new(origin_x: u32, origin_y: u32, crop_width: u32, crop_height: u32, crop_size: u32) -> Self {
        CropTransform {
            origin_x: origin_x as f32,
            origin_y: origin_y as f32,
            scale_x: crop_width as f32 / crop_size as f32,
            scale_y: crop_height as f32 / crop_size as f32,
        }
    }

    pub fn for_crop(crop: &NormalizedCrop, crop_size: u32) -> Self {
        Self::new(crop.origin_x, crop.origin_y, crop.crop_width, crop.crop_height, crop_size)
    }

    pub fn point(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale_x, self.origin_y + y * self.scale_y)
    }

    pub fn detection(&self, detection: &DetectionBox) -> DetectionBox {
        let [x1, y1, x2, y2] = detection.bbox;
        let (x1, y1) = self.point(x1, y1);
        let (x2, y2) = self.point(x2, y2);
        DetectionBox::new([x1, y1, x2, y2], detection.class_id, detection.confidence)
    }
}

pub fn remap_detections(detections: &[DetectionBox], transform: &CropTransform) -> Vec<DetectionBox> {
    detections.iter().map(|d| transform.detection(d)).collect()
}
