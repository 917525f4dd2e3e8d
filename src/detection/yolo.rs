use std::time::Instant;

use anyhow::{ensure, Result};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::{Array1, Array2, Array4, ArrayView2};
use ort::session::Session;
use ort::value::Tensor;
use powerboxesrs::nms::nms;
use tracing::debug;

use super::{DetectionBox, ObjectDetector};
use crate::config::ModelConfig;
use crate::session::build_session;
use crate::CROP_SIZE;

/// YOLOv8-style single-stage detector exported to ONNX.
///
/// Input `[1, 3, 640, 640]` RGB multiplied by `input_scale`; output `[1, 4 + classes, anchors]`
/// with `(cx, cy, w, h)` followed by one score per class.
pub struct YoloAcneDetector {
    session: Session,
    input_scale: f32,
    decoder: YoloDecoder,
}

impl YoloAcneDetector {
    pub fn new(config: &ModelConfig) -> Result<YoloAcneDetector> {
        let session = build_session(&config.acne_model_path(), config.intra_threads)?;
        Ok(YoloAcneDetector {
            session,
            input_scale: config.detector_input_scale,
            decoder: YoloDecoder::from_config(config),
        })
    }
}

/// NCHW, channel values multiplied by `scale`. Crops of another size are resized first.
///
/// A model with a rescaling layer baked in wants `scale = 1.0`; a bare export wants `1/255`.
pub fn transform(crop: &RgbImage, scale: f32) -> Vec<f32> {
    let resized;
    let image = if crop.dimensions() == (CROP_SIZE, CROP_SIZE) {
        crop
    } else {
        resized = image::imageops::resize(crop, CROP_SIZE, CROP_SIZE, FilterType::Triangle);
        &resized
    };
    let size = CROP_SIZE as usize;
    let tensor = Array4::from_shape_fn((1, 3, size, size), |(_, c, h, w)| {
        image.get_pixel(w as u32, h as u32)[c] as f32 * scale
    });
    tensor.into_raw_vec_and_offset().0
}

/// Turns the raw head output into suppressed corner boxes.
#[derive(Debug, Clone, Copy)]
pub struct YoloDecoder {
    pub num_classes: usize,
    pub candidate_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl YoloDecoder {
    pub fn from_config(config: &ModelConfig) -> Self {
        YoloDecoder {
            num_classes: config.detector_num_classes,
            candidate_threshold: config.detector_candidate_threshold,
            iou_threshold: config.detector_iou_threshold,
            max_detections: config.detector_max_detections,
        }
    }

    /// The head must be `[1, 4 + classes, anchors]`; a transposed export is rejected here
    /// instead of being decoded as garbage.
    pub fn check_output_shape(&self, shape: &[i64]) -> Result<()> {
        let rows = (4 + self.num_classes) as i64;
        ensure!(
            shape.len() == 3 && shape[0] == 1 && shape[1] == rows,
            "detector output shape {shape:?} is not [1, {rows}, anchors]"
        );
        Ok(())
    }

    /// Decodes center boxes, applies per-class NMS and keeps at most `max_detections`,
    /// best first.
    pub fn post_process(&self, output: &[f32]) -> Result<Vec<DetectionBox>> {
        let rows = 4 + self.num_classes;
        ensure!(
            !output.is_empty() && output.len() % rows == 0,
            "detector output of {} values does not split into {rows} rows",
            output.len()
        );
        let anchors = output.len() / rows;
        let prediction = ArrayView2::from_shape((rows, anchors), output)?;

        let mut candidates: Vec<DetectionBox> = vec![];
        for i in 0..anchors {
            let (class_id, score) = (0..self.num_classes)
                .map(|c| (c, prediction[[4 + c, i]]))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
            if score < self.candidate_threshold {
                continue;
            }
            let (cx, cy, w, h) = (
                prediction[[0, i]],
                prediction[[1, i]],
                prediction[[2, i]],
                prediction[[3, i]],
            );
            candidates.push(DetectionBox::new(
                [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
                class_id,
                score,
            ));
        }

        let mut detections = vec![];
        for class_id in 0..self.num_classes {
            let class_candidates = candidates.iter().filter(|d| d.class_id == class_id).collect::<Vec<_>>();
            if class_candidates.is_empty() {
                continue;
            }
            let boxes = Array2::from_shape_vec(
                (class_candidates.len(), 4),
                class_candidates.iter().flat_map(|d| d.bbox).collect(),
            )?;
            let scores = class_candidates.iter().map(|d| d.confidence as f64).collect::<Array1<_>>();
            let keep = nms(&boxes, &scores, self.iou_threshold as f64, 0.0);
            detections.extend(keep.into_iter().map(|k| *class_candidates[k]));
        }
        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        detections.truncate(self.max_detections);
        Ok(detections)
    }
}

impl ObjectDetector for YoloAcneDetector {
    fn infer(&mut self, crop: &RgbImage) -> Result<Vec<DetectionBox>> {
        let now = Instant::now();
        let input = Tensor::from_array((
            vec![1, 3, CROP_SIZE as i64, CROP_SIZE as i64],
            transform(crop, self.input_scale),
        ))?;
        let outputs = self.session.run(ort::inputs![input])?;
        let (shape, output) = outputs[0].try_extract_tensor::<f32>()?;
        debug!("Inferred time: {:?}", now.elapsed());

        self.decoder.check_output_shape(shape)?;
        let detections = self.decoder.post_process(output)?;
        debug!("{} candidate detections", detections.len());
        Ok(detections)
    }
}
