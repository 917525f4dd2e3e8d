use std::time::Instant;

use image::RgbImage;
use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::aggregate::{aggregate, AnalysisResult};
use crate::config::{AnalyzerConfig, AppConfig};
use crate::crop::normalize_crop;
use crate::detection::{DetectionBox, ObjectDetector, YoloAcneDetector};
use crate::error::{AnalysisError, ConfigError};
use crate::landmark::{FaceLandmarks, FaceMeshLandmarker, LandmarkDetector};
use crate::region::{extract_bounding_box, RegionDefinition};
use crate::remap::{remap_detections, CropTransform};

/// Runs the region pipeline on one image at a time.
///
/// Regions are processed in parallel. Both model handles sit behind a mutex, so the
/// detector only ever sees one crop at a time while box extraction, cropping and
/// remapping of the other regions carry on.
pub struct AcneAnalyzer<L, D> {
    config: AnalyzerConfig,
    landmarker: Mutex<L>,
    detector: Mutex<D>,
}

pub type OnnxAcneAnalyzer = AcneAnalyzer<FaceMeshLandmarker, YoloAcneDetector>;

impl OnnxAcneAnalyzer {
    /// Loads both ONNX models named by `config`.
    pub fn load(config: &AppConfig) -> anyhow::Result<Self> {
        let landmarker = FaceMeshLandmarker::new(&config.models)?;
        let detector = YoloAcneDetector::new(&config.models)?;
        Ok(AcneAnalyzer::new(config.analyzer.clone(), landmarker, detector)?)
    }
}

impl<L: LandmarkDetector, D: ObjectDetector> AcneAnalyzer<L, D> {
    /// Fails when the region table does not fit the landmark provider.
    pub fn new(config: AnalyzerConfig, landmarker: L, detector: D) -> Result<Self, ConfigError> {
        config.validate(landmarker.landmark_count())?;
        Ok(AcneAnalyzer {
            config,
            landmarker: Mutex::new(landmarker),
            detector: Mutex::new(detector),
        })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Decodes `bytes` first; an unreadable image is [`AnalysisError::Decode`].
    pub fn analyze_bytes(&self, bytes: &[u8]) -> Result<AnalysisResult, AnalysisError> {
        let image = decode_image(bytes)?;
        self.analyze(&image)
    }

    pub fn analyze(&self, image: &RgbImage) -> Result<AnalysisResult, AnalysisError> {
        let now = Instant::now();
        let landmarks = self
            .landmarker
            .lock()
            .detect(image)
            .map_err(AnalysisError::Landmark)?;
        let Some(landmarks) = landmarks else {
            info!("no face detected");
            return Ok(AnalysisResult::no_face());
        };

        let region_results = self
            .config
            .regions
            .par_iter()
            .map(|definition| {
                self.analyze_region(image, &landmarks, definition)
                    .map(|boxes| (definition.region, boxes))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let result = aggregate(region_results, &self.config.priority_order);
        debug!("analysis finished in {:?}", now.elapsed());
        Ok(result)
    }

    fn analyze_region(
        &self,
        image: &RgbImage,
        landmarks: &FaceLandmarks,
        definition: &RegionDefinition,
    ) -> Result<Vec<DetectionBox>, AnalysisError> {
        let region = definition.region;
        let bbox = extract_bounding_box(landmarks, definition, image.width(), image.height())?;
        debug!("{region}: box {bbox:?}");

        let Some(crop) = normalize_crop(image, &bbox, self.config.crop_size)? else {
            debug!("{region}: degenerate box, skipping detection");
            return Ok(vec![]);
        };

        let candidates = self
            .detector
            .lock()
            .infer(&crop.image)
            .map_err(|source| AnalysisError::Detection { region, source })?;
        let kept = self.config.filter().apply(candidates);
        debug!("{region}: {} detections kept", kept.len());

        let transform = CropTransform::for_crop(&crop, self.config.crop_size);
        Ok(remap_detections(&kept, &transform))
    }
}

pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, AnalysisError> {
    Ok(image::load_from_memory(bytes)?.into_rgb8())
}
