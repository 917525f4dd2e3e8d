use std::time::Instant;

use anyhow::{ensure, Result};
use image::imageops::{crop_imm, FilterType};
use image::RgbImage;
use ort::session::Session;
use ort::value::Tensor;
use tracing::debug;

use super::retinaface::{FoundFace, RetinaFaceDetector};
use super::{FaceLandmarks, LandmarkDetector, Point2D};
use crate::config::ModelConfig;
use crate::region::BoundingBox;
use crate::session::build_session;

const MESH_INPUT: u32 = 192;
const MESH_POINTS: usize = 468;

/// Two-stage landmarker: RetinaFace finds the face, then the MediaPipe face-landmark model
/// (468 points) runs on a padded crop around it.
pub struct FaceMeshLandmarker {
    face_detector: RetinaFaceDetector,
    session: Session,
    face_margin: f32,
    presence_threshold: f32,
}

impl FaceMeshLandmarker {
    pub fn new(config: &ModelConfig) -> Result<FaceMeshLandmarker> {
        let face_detector = RetinaFaceDetector::new(config)?;
        let session = build_session(&config.face_mesh_path(), config.intra_threads)?;
        Ok(FaceMeshLandmarker {
            face_detector,
            session,
            face_margin: config.face_crop_margin,
            presence_threshold: config.face_presence_threshold,
        })
    }
}

/// Grows the face box by `margin` of its size (half on each side) and clips it to the frame.
pub fn face_crop(face: &FoundFace, width: u32, height: u32, margin: f32) -> BoundingBox {
    let [x1, y1, x2, y2] = face.bbox;
    let pad_w = (x2 - x1) * margin / 2.0;
    let pad_h = (y2 - y1) * margin / 2.0;
    let clip = |v: f32, extent: u32| v.clamp(0.0, extent as f32) as u32;
    let x_min = clip((x1 - pad_w).floor(), width);
    let y_min = clip((y1 - pad_h).floor(), height);
    let x_max = clip((x2 + pad_w).ceil(), width).max(x_min);
    let y_max = clip((y2 + pad_h).ceil(), height).max(y_min);
    BoundingBox::new(x_min, y_min, x_max, y_max)
}

/// NHWC, channel values mapped to `[-1, 1]`.
pub fn transform(image: &RgbImage) -> Vec<f32> {
    let resized = image::imageops::resize(image, MESH_INPUT, MESH_INPUT, FilterType::Triangle);
    resized
        .pixels()
        .flat_map(|pixel| pixel.0.map(|v| (v as f32 / 127.5) - 1.0))
        .collect()
}

/// Turns `x, y, z` triples in the 192-space of the `crop` into landmarks normalized to the
/// whole `width`×`height` frame.
pub fn post_process(mesh: &[f32], crop: &BoundingBox, width: u32, height: u32) -> Result<FaceLandmarks> {
    ensure!(
        mesh.len() >= MESH_POINTS * 3,
        "face mesh output has {} values, expected {}",
        mesh.len(),
        MESH_POINTS * 3
    );
    let scale_x = crop.width() as f32 / MESH_INPUT as f32;
    let scale_y = crop.height() as f32 / MESH_INPUT as f32;
    let points = mesh
        .chunks_exact(3)
        .take(MESH_POINTS)
        .map(|p| {
            Point2D::new(
                (crop.x_min as f32 + p[0] * scale_x) / width as f32,
                (crop.y_min as f32 + p[1] * scale_y) / height as f32,
            )
        })
        .collect();
    Ok(FaceLandmarks::new(points))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl LandmarkDetector for FaceMeshLandmarker {
    fn landmark_count(&self) -> usize {
        MESH_POINTS
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Option<FaceLandmarks>> {
        let faces = self.face_detector.detect(image)?;
        let Some(face) = faces.into_iter().max_by(|a, b| a.score.total_cmp(&b.score)) else {
            debug!("face detector found nothing");
            return Ok(None);
        };
        let crop = face_crop(&face, image.width(), image.height(), self.face_margin);
        if crop.is_degenerate() {
            debug!("face box {:?} is empty inside the frame", face.bbox);
            return Ok(None);
        }
        debug!("face {:.3} at {crop:?}", face.score);

        let now = Instant::now();
        let face_image = crop_imm(image, crop.x_min, crop.y_min, crop.width(), crop.height()).to_image();
        let shape = vec![1, MESH_INPUT as i64, MESH_INPUT as i64, 3];
        let input = Tensor::from_array((shape, transform(&face_image)))?;
        let outputs = self.session.run(ort::inputs![input])?;
        debug!("Inferred time: {:?}", now.elapsed());

        // second head, when exported, is the face-presence logit
        if outputs.len() > 1 {
            let (_, flag) = outputs[1].try_extract_tensor::<f32>()?;
            let presence = flag.first().copied().map(sigmoid).unwrap_or(0.0);
            debug!("face presence {presence:.3}");
            if presence < self.presence_threshold {
                return Ok(None);
            }
        }

        let (_, mesh) = outputs[0].try_extract_tensor::<f32>()?;
        post_process(mesh, &crop, image.width(), image.height()).map(Some)
    }
}
