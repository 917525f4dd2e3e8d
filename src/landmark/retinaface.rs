use std::time::Instant;

use anyhow::{ensure, Result};
use image::imageops::FilterType;
use image::RgbImage;
use itertools::iproduct;
use ndarray::{concatenate, s, Array1, Array2, Array4, ArrayView2, Axis};
use ort::session::Session;
use ort::value::Tensor;
use powerboxesrs::nms::nms;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ModelConfig;
use crate::session::build_session;

const MIN_SIZES: [[usize; 2]; 3] = [[16, 32], [64, 128], [256, 512]];
const STEPS: [usize; 3] = [8, 16, 32];
const VARIANCE: [f32; 2] = [0.1, 0.2];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct FoundFace {
    /// `[x1, y1, x2, y2]` in pixels of the image handed to [`RetinaFaceDetector::detect`].
    pub bbox: [f32; 4],
    pub score: f32,
}

/// RetinaFace (MobileNet backbone) face detector.
///
/// The frame is stretched to a square `input_size`; boxes decode to fractions of the input and
/// are scaled by the original width and height, so the stretch needs no separate undo.
pub struct RetinaFaceDetector {
    session: Session,
    input_size: usize,
    confidence_threshold: f32,
    nms_threshold: f32,
}

impl RetinaFaceDetector {
    pub fn new(config: &ModelConfig) -> Result<RetinaFaceDetector> {
        let session = build_session(&config.face_detector_path(), config.intra_threads)?;
        Ok(RetinaFaceDetector {
            session,
            input_size: config.face_detector_input_size,
            confidence_threshold: config.face_detector_confidence,
            nms_threshold: config.face_detector_nms_threshold,
        })
    }

    /// Faces in `image`, best score first.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<FoundFace>> {
        let now = Instant::now();
        let size = self.input_size as i64;
        let input = Tensor::from_array((vec![1, 3, size, size], transform(image, self.input_size)))?;
        let outputs = self.session.run(ort::inputs![input])?;
        let (_, confidence) = outputs["confidence"].try_extract_tensor::<f32>()?;
        let (_, loc) = outputs["bbox"].try_extract_tensor::<f32>()?;
        debug!("Inferred time: {:?}", now.elapsed());

        let priors = prior_box(self.input_size, self.input_size);
        post_process(
            confidence,
            loc,
            &priors,
            (image.width(), image.height()),
            self.confidence_threshold,
            self.nms_threshold,
        )
    }
}

/// NCHW, channel values divided by 255, stretched to `size`×`size`.
pub fn transform(image: &RgbImage, size: usize) -> Vec<f32> {
    let resized = image::imageops::resize(image, size as u32, size as u32, FilterType::Triangle);
    let tensor = Array4::from_shape_fn((1, 3, size, size), |(_, c, h, w)| {
        resized.get_pixel(w as u32, h as u32)[c] as f32 / 255.0
    });
    tensor.into_raw_vec_and_offset().0
}

/// Anchors as `[cx, cy, w, h]` rows, normalized to the input size.
pub fn prior_box(height: usize, width: usize) -> Array2<f32> {
    let mut anchors: Vec<[f32; 4]> = vec![];
    for (k, &step) in STEPS.iter().enumerate() {
        let rows = height.div_ceil(step);
        let cols = width.div_ceil(step);
        for (i, j) in iproduct!(0..rows, 0..cols) {
            for &min_size in &MIN_SIZES[k] {
                let s_kx = min_size as f32 / width as f32;
                let s_ky = min_size as f32 / height as f32;
                let cx = (j as f32 + 0.5) * step as f32 / width as f32;
                let cy = (i as f32 + 0.5) * step as f32 / height as f32;
                anchors.push([cx, cy, s_kx, s_ky]);
            }
        }
    }
    Array2::from(anchors)
}

/// Regresses `loc` against `priors` into normalized `[x1, y1, x2, y2]` rows.
fn decode(loc: ArrayView2<f32>, priors: &Array2<f32>) -> Result<Array2<f32>> {
    let centers = &priors.slice(s![.., ..2]) + &(&loc.slice(s![.., ..2]) * VARIANCE[0] * &priors.slice(s![.., 2..]));
    let sizes = &priors.slice(s![.., 2..]) * &loc.slice(s![.., 2..]).mapv(|v| (v * VARIANCE[1]).exp());
    let half = &sizes / 2.0;
    Ok(concatenate(Axis(1), &[(&centers - &half).view(), (&centers + &half).view()])?)
}

/// Turns raw `confidence` (`[1, anchors, 2]`) and `loc` (`[1, anchors, 4]`) into faces in
/// pixels of an `image_size` frame.
pub fn post_process(
    confidence: &[f32],
    loc: &[f32],
    priors: &Array2<f32>,
    image_size: (u32, u32),
    confidence_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<FoundFace>> {
    let post_processing_time = Instant::now();
    let anchors = priors.nrows();
    ensure!(
        confidence.len() == anchors * 2 && loc.len() == anchors * 4,
        "face detector outputs ({} scores, {} offsets) do not match {anchors} anchors",
        confidence.len(),
        loc.len()
    );
    let confidence = ArrayView2::from_shape((anchors, 2), confidence)?;
    let loc = ArrayView2::from_shape((anchors, 4), loc)?;

    let (width, height) = (image_size.0 as f32, image_size.1 as f32);
    let boxes = decode(loc, priors)? * &Array1::from(vec![width, height, width, height]);
    let scores = confidence.slice(s![.., 1]);

    let valid_index = scores
        .iter()
        .enumerate()
        .filter(|(_, score)| **score > confidence_threshold)
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    if valid_index.is_empty() {
        return Ok(vec![]);
    }
    let boxes = boxes.select(Axis(0), &valid_index);
    let scores = scores.select(Axis(0), &valid_index);

    let keep = nms(&boxes, &scores.mapv(|x| x as f64), nms_threshold as f64, confidence_threshold as f64);
    let faces = keep
        .into_iter()
        .map(|i| FoundFace {
            bbox: [boxes[[i, 0]], boxes[[i, 1]], boxes[[i, 2]], boxes[[i, 3]]],
            score: scores[i],
        })
        .collect::<Vec<_>>();
    debug!("Post processed time: {:?}", post_processing_time.elapsed());
    Ok(faces)
}
