//! Loads every model artifact from a model directory into a ready pipeline.
//!
//! All artifacts are checked here, before any photo is processed.

use crate::classifier::{AcneClassifier, ClassifierError, DEFAULT_ACNE_THRESHOLD};
use crate::crop::{FaceCropExtractor, CLASSIFIER_INPUT_SIZE};
use crate::detector::{DetectorError, ScrfdDetector};
use crate::labels::{LabelError, LabelSet};
use crate::model::{ModelError, OnnxModel};
use crate::pipeline::AcnePipeline;
use crate::similarity::{FaceSimilarityGate, DEFAULT_MATCH_THRESHOLD};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const EMBEDDING_MODEL_FILE: &str = "face_embedding.onnx";
pub const SEVERITY_MODEL_FILE: &str = "acne_severity.onnx";
pub const BINARY_MODEL_FILE: &str = "acne_binary.onnx";
pub const LABELS_FILE: &str = "severity_labels.txt";

/// Input resolution of the face embedding model.
const EMBEDDING_INPUT_SIZE: u32 = 96;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("model: {0}")]
    Model(#[from] ModelError),
    #[error("labels: {0}")]
    Labels(#[from] LabelError),
    #[error("classifier: {0}")]
    Classifier(#[from] ClassifierError),
}

/// Tunables that shape pipeline decisions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    /// Maximum embedding distance (exclusive) for a same-person match.
    pub match_threshold: f32,
    /// Binary-model probability above which a face counts as clear skin.
    pub acne_threshold: f32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            acne_threshold: DEFAULT_ACNE_THRESHOLD,
        }
    }
}

/// Resolves artifact paths inside a model directory.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    dir: PathBuf,
}

impl ModelBundle {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> String {
        self.dir.join(file).to_string_lossy().into_owned()
    }

    pub fn detector_path(&self) -> String {
        self.path(DETECTOR_MODEL_FILE)
    }

    pub fn embedding_path(&self) -> String {
        self.path(EMBEDDING_MODEL_FILE)
    }

    pub fn severity_path(&self) -> String {
        self.path(SEVERITY_MODEL_FILE)
    }

    pub fn binary_path(&self) -> String {
        self.path(BINARY_MODEL_FILE)
    }

    pub fn labels_path(&self) -> String {
        self.path(LABELS_FILE)
    }

    /// Load all models and build the pipeline.
    pub fn load_pipeline(&self, settings: PipelineSettings) -> Result<AcnePipeline, LoadError> {
        let detector = ScrfdDetector::load(&self.detector_path())?;
        let embedder = OnnxModel::load(
            &self.embedding_path(),
            "face_embedding",
            EMBEDDING_INPUT_SIZE,
            EMBEDDING_INPUT_SIZE,
        )?;
        let severity = OnnxModel::load(
            &self.severity_path(),
            "acne_severity",
            CLASSIFIER_INPUT_SIZE,
            CLASSIFIER_INPUT_SIZE,
        )?;
        let binary = OnnxModel::load(
            &self.binary_path(),
            "acne_binary",
            CLASSIFIER_INPUT_SIZE,
            CLASSIFIER_INPUT_SIZE,
        )?;
        let labels = LabelSet::load(&self.labels_path())?;

        let classifier = AcneClassifier::new(Box::new(severity), Box::new(binary), labels, settings.acne_threshold)?;
        tracing::info!(
            dir = %self.dir.display(),
            match_threshold = settings.match_threshold,
            acne_threshold = settings.acne_threshold,
            "pipeline ready"
        );

        Ok(AcnePipeline::new(
            Box::new(detector),
            FaceSimilarityGate::new(Box::new(embedder), "face_embedding"),
            FaceCropExtractor::default(),
            classifier,
            settings.match_threshold,
        ))
    }
}
