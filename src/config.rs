use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::detection::DetectionFilter;
use crate::error::ConfigError;
use crate::region::{Region, RegionDefinition};
use crate::{model_dir, CROP_SIZE};

/// Static parameters of the region pipeline. Loaded once, validated once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub crop_size: u32,
    pub confidence_threshold: f32,
    pub target_class: usize,
    pub priority_order: Vec<Region>,
    pub regions: Vec<RegionDefinition>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            crop_size: CROP_SIZE,
            confidence_threshold: 0.4,
            target_class: 0,
            priority_order: Region::DEFAULT_PRIORITY.to_vec(),
            regions: RegionDefinition::defaults(),
        }
    }
}

impl AnalyzerConfig {
    /// Checks the region table against the number of points the landmark provider yields.
    pub fn validate(&self, landmark_count: usize) -> Result<(), ConfigError> {
        if self.crop_size == 0 {
            return Err(ConfigError::ZeroCropSize);
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::InvalidThreshold(self.confidence_threshold));
        }

        let mut seen = HashSet::new();
        for definition in &self.regions {
            if !seen.insert(definition.region) {
                return Err(ConfigError::DuplicateRegion(definition.region));
            }
            if definition.landmark_indices.is_empty() {
                return Err(ConfigError::EmptyRegion(definition.region));
            }
            if let Some(&index) = definition.landmark_indices.iter().find(|&&i| i >= landmark_count) {
                return Err(ConfigError::LandmarkIndexOutOfRange {
                    region: definition.region,
                    index,
                    landmark_count,
                });
            }
        }
        if let Some(missing) = Region::ALL.into_iter().find(|r| !seen.contains(r)) {
            return Err(ConfigError::MissingRegion(missing));
        }

        let priority = self.priority_order.iter().copied().collect::<HashSet<_>>();
        if self.priority_order.len() != Region::ALL.len() || priority.len() != Region::ALL.len() {
            return Err(ConfigError::InvalidPriorityOrder(self.priority_order.clone()));
        }
        Ok(())
    }

    pub fn filter(&self) -> DetectionFilter {
        DetectionFilter::new(self.target_class, self.confidence_threshold)
    }
}

/// Where the ONNX models live and how their raw outputs are decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model_dir: Option<PathBuf>,
    pub face_detector_model: PathBuf,
    pub face_mesh_model: PathBuf,
    pub acne_model: PathBuf,
    pub intra_threads: usize,
    pub face_detector_input_size: usize,
    pub face_detector_confidence: f32,
    pub face_detector_nms_threshold: f32,
    /// Extra context around the detected face before the mesh runs, as a fraction of its size.
    pub face_crop_margin: f32,
    pub face_presence_threshold: f32,
    /// Multiplier applied to 0-255 pixel values. The shipped detector rescales internally.
    pub detector_input_scale: f32,
    pub detector_num_classes: usize,
    pub detector_candidate_threshold: f32,
    pub detector_iou_threshold: f32,
    pub detector_max_detections: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: None,
            face_detector_model: PathBuf::from("mobilenet_retinaface.onnx"),
            face_mesh_model: PathBuf::from("face_landmark.onnx"),
            acne_model: PathBuf::from("yolo_acne_detection.onnx"),
            intra_threads: 4,
            face_detector_input_size: 640,
            face_detector_confidence: 0.6,
            face_detector_nms_threshold: 0.4,
            face_crop_margin: 0.25,
            face_presence_threshold: 0.5,
            detector_input_scale: 1.0,
            detector_num_classes: 1,
            detector_candidate_threshold: 0.2,
            detector_iou_threshold: 0.7,
            detector_max_detections: 100,
        }
    }
}

impl ModelConfig {
    fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            return file.to_path_buf();
        }
        self.model_dir.clone().unwrap_or_else(model_dir).join(file)
    }

    pub fn face_detector_path(&self) -> PathBuf {
        self.resolve(&self.face_detector_model)
    }

    pub fn face_mesh_path(&self) -> PathBuf {
        self.resolve(&self.face_mesh_model)
    }

    pub fn acne_model_path(&self) -> PathBuf {
        self.resolve(&self.acne_model)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub analyzer: AnalyzerConfig,
    pub models: ModelConfig,
}

impl AppConfig {
    /// Reads a JSON config file. Fields missing from the file keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = serde_json::from_str::<AppConfig>(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_for_face_mesh() {
        assert_eq!(AnalyzerConfig::default().validate(468), Ok(()));
    }

    #[test]
    fn index_past_landmark_count_is_rejected() {
        let err = AnalyzerConfig::default().validate(400).unwrap_err();
        assert!(matches!(err, ConfigError::LandmarkIndexOutOfRange { landmark_count: 400, .. }));
    }

    #[test]
    fn priority_order_must_be_a_permutation() {
        let mut config = AnalyzerConfig::default();
        config.priority_order = vec![Region::Forehead, Region::Forehead, Region::Chin, Region::Nose, Region::LeftCheek];
        assert!(matches!(config.validate(468), Err(ConfigError::InvalidPriorityOrder(_))));

        config.priority_order = vec![Region::Forehead, Region::Chin];
        assert!(matches!(config.validate(468), Err(ConfigError::InvalidPriorityOrder(_))));
    }

    #[test]
    fn missing_and_duplicate_regions_are_rejected() {
        let mut config = AnalyzerConfig::default();
        config.regions.pop();
        assert_eq!(config.validate(468), Err(ConfigError::MissingRegion(Region::Chin)));

        let mut config = AnalyzerConfig::default();
        config.regions.push(RegionDefinition::new(Region::Nose, vec![1]));
        assert_eq!(config.validate(468), Err(ConfigError::DuplicateRegion(Region::Nose)));
    }

    #[test]
    fn threshold_and_crop_size_are_checked() {
        let mut config = AnalyzerConfig::default();
        config.confidence_threshold = 1.5;
        assert_eq!(config.validate(468), Err(ConfigError::InvalidThreshold(1.5)));

        let mut config = AnalyzerConfig::default();
        config.crop_size = 0;
        assert_eq!(config.validate(468), Err(ConfigError::ZeroCropSize));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"analyzer": {"confidence_threshold": 0.25}}"#).unwrap();
        assert_eq!(config.analyzer.confidence_threshold, 0.25);
        assert_eq!(config.analyzer.crop_size, 640);
        assert_eq!(config.analyzer.priority_order, Region::DEFAULT_PRIORITY.to_vec());
        assert_eq!(config.models.intra_threads, 4);
    }

    #[test]
    fn relative_model_paths_resolve_against_model_dir() {
        let models = ModelConfig {
            model_dir: Some(PathBuf::from("/opt/models")),
            ..ModelConfig::default()
        };
        assert_eq!(models.acne_model_path(), PathBuf::from("/opt/models/yolo_acne_detection.onnx"));
        assert_eq!(models.face_detector_path(), PathBuf::from("/opt/models/mobilenet_retinaface.onnx"));
    }

    #[test]
    fn detector_decoding_knobs_load_from_json() {
        let config: AppConfig = serde_json::from_str(
            r#"{"models": {"detector_input_scale": 0.00392156862745098, "detector_max_detections": 20}}"#,
        )
        .unwrap();
        assert_eq!(config.models.detector_input_scale, 1.0 / 255.0);
        assert_eq!(config.models.detector_max_detections, 20);
        assert_eq!(config.models.face_crop_margin, 0.25);

        let defaults = ModelConfig::default();
        assert_eq!(defaults.detector_input_scale, 1.0);
        assert_eq!(defaults.detector_max_detections, 100);
    }
}
