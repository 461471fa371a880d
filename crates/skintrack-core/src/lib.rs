//! skintrack-core — Longitudinal acne tendency from a photo stream.
//!
//! Faces are detected with SCRFD, gated against a reference face by embedding
//! distance, classified by a severity model and a binary acne model, and the
//! resulting observations are reduced into trend verdicts. All models run via
//! ONNX Runtime on the CPU.

pub mod classifier;
pub mod crop;
pub mod detector;
pub mod labels;
pub mod loader;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod similarity;
pub mod tendency;
pub mod types;

pub use classifier::AcneClassifier;
pub use crop::FaceCropExtractor;
pub use detector::{FaceDetector, ScrfdDetector};
pub use labels::LabelSet;
pub use loader::{ModelBundle, PipelineSettings};
pub use model::{InferenceModel, OnnxModel};
pub use notify::{CollectingSink, NotificationSink, TracingSink};
pub use pipeline::{is_photo, AcnePipeline, Photo, RunReport, PHOTO_EXTENSIONS};
pub use similarity::FaceSimilarityGate;
pub use types::{
    AcneObservation, BoundingBox, FaceImage, FeatureVector, ObservationHistory, SimilarityResult,
    VerdictEvent, VerdictKind,
};

use std::path::PathBuf;

/// Default model directory: `$XDG_DATA_HOME/skintrack/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("skintrack")
        .join("models")
}
