use std::env;
use std::path::PathBuf;

pub mod aggregate;
pub mod analyzer;
pub mod annotate;
pub mod config;
pub mod crop;
pub mod detection;
pub mod error;
pub mod landmark;
pub mod region;
pub mod remap;
pub mod session;

pub use aggregate::{AnalysisResult, DominantRegion};
pub use analyzer::AcneAnalyzer;
pub use config::{AnalyzerConfig, AppConfig, ModelConfig};
pub use detection::{DetectionBox, ObjectDetector};
pub use error::{AnalysisError, ConfigError};
pub use landmark::{FaceLandmarks, LandmarkDetector, Point2D};
pub use region::{BoundingBox, Region, RegionDefinition};

/// Side length of the square detector input every region crop is stretched to.
pub const CROP_SIZE: u32 = 640;

/// Directory holding the ONNX models. `ACNE_MODEL_DIR` wins over the default `./models`.
pub fn model_dir() -> PathBuf {
    match env::var("ACNE_MODEL_DIR") {
        Ok(str) => PathBuf::from(str),
        Err(_) => PathBuf::from("models"),
    }
}
