//! Batch orchestration: photos in, observations appended, verdicts out.
//!
//! Each photo runs detect → gate → crop → classify. Failures stay local to
//! the photo: it is logged and skipped, the batch continues. The reducer runs
//! once over the complete history after the batch.

use crate::classifier::{AcneClassifier, ClassifierError};
use crate::crop::{CropError, FaceCropExtractor};
use crate::detector::{DetectorError, FaceDetector};
use crate::notify::NotificationSink;
use crate::similarity::{FaceSimilarityGate, SimilarityError};
use crate::tendency;
use crate::types::{AcneObservation, FaceImage, FeatureVector, ImageError, ObservationHistory, VerdictEvent};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("image: {0}")]
    Image(#[from] ImageError),
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("similarity: {0}")]
    Similarity(#[from] SimilarityError),
    #[error("crop: {0}")]
    Crop(#[from] CropError),
    #[error("classifier: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("reference face could not be embedded: {0}")]
    Reference(SimilarityError),
}

/// File extensions accepted as photos, compared case-insensitively.
pub const PHOTO_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "bmp"];

/// Whether `path` names a photo by its extension.
pub fn is_photo(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| PHOTO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// One entry of the photo stream. Decoding errors are carried so the
/// pipeline can skip the photo like any other per-photo failure.
pub struct Photo {
    pub id: String,
    image: Result<FaceImage, ImageError>,
}

impl Photo {
    pub fn new(id: impl Into<String>, image: FaceImage) -> Self {
        Self {
            id: id.into(),
            image: Ok(image),
        }
    }

    /// Decode a photo from disk; failure surfaces when the pipeline reaches it.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            id: path.display().to_string(),
            image: FaceImage::open(path),
        }
    }
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub photos_seen: usize,
    /// Photos that contributed no observation (no face, no match, or error).
    pub photos_skipped: usize,
    pub faces_detected: usize,
    /// Faces that failed the similarity gate.
    pub faces_rejected: usize,
    pub observations_added: usize,
    pub verdicts: Vec<VerdictEvent>,
    /// The reducer ran but produced no event.
    pub no_change: bool,
    /// Fewer than two observations were available to the reducer.
    pub insufficient_history: bool,
}

#[derive(Default)]
struct PhotoOutcome {
    faces: usize,
    rejected: usize,
    observations: Vec<AcneObservation>,
}

pub struct AcnePipeline {
    detector: Box<dyn FaceDetector + Send>,
    gate: FaceSimilarityGate,
    extractor: FaceCropExtractor,
    classifier: AcneClassifier,
    match_threshold: f32,
    history: ObservationHistory,
}

impl AcnePipeline {
    pub fn new(
        detector: Box<dyn FaceDetector + Send>,
        gate: FaceSimilarityGate,
        extractor: FaceCropExtractor,
        classifier: AcneClassifier,
        match_threshold: f32,
    ) -> Self {
        Self {
            detector,
            gate,
            extractor,
            classifier,
            match_threshold,
            history: ObservationHistory::new(),
        }
    }

    /// Continue from a previously persisted history.
    pub fn with_history(mut self, history: ObservationHistory) -> Self {
        self.history = history;
        self
    }

    pub fn history(&self) -> &ObservationHistory {
        &self.history
    }

    /// Drop observations appended after the first `len`, undoing a run whose
    /// results could not be persisted.
    pub fn rollback_history(&mut self, len: usize) {
        if len < self.history.len() {
            tracing::warn!(from = self.history.len(), to = len, "rolling back observation history");
            self.history.truncate(len);
        }
    }

    pub fn into_history(self) -> ObservationHistory {
        self.history
    }

    pub fn classifier(&self) -> &AcneClassifier {
        &self.classifier
    }

    /// Process a chronologically ordered batch and report verdicts to `sink`.
    ///
    /// Only a reference face that cannot be embedded fails the run.
    pub fn run<I>(
        &mut self,
        reference: &FaceImage,
        photos: I,
        sink: &dyn NotificationSink,
    ) -> Result<RunReport, PipelineError>
    where
        I: IntoIterator<Item = Photo>,
    {
        let reference = self.gate.embed(reference).map_err(PipelineError::Reference)?;
        let mut report = RunReport::default();

        for photo in photos {
            report.photos_seen += 1;
            match self.process_photo(&reference, photo.image) {
                Ok(outcome) => {
                    report.faces_detected += outcome.faces;
                    report.faces_rejected += outcome.rejected;
                    if outcome.observations.is_empty() {
                        tracing::info!(
                            photo = %photo.id,
                            faces = outcome.faces,
                            rejected = outcome.rejected,
                            "no matching face; skipping photo"
                        );
                        report.photos_skipped += 1;
                    } else {
                        report.observations_added += outcome.observations.len();
                        self.history.extend(outcome.observations);
                    }
                }
                Err(e) => {
                    tracing::warn!(photo = %photo.id, error = %e, "skipping photo");
                    report.photos_skipped += 1;
                }
            }
        }

        tracing::info!(
            seen = report.photos_seen,
            skipped = report.photos_skipped,
            added = report.observations_added,
            history = self.history.len(),
            "batch processed"
        );

        match tendency::reduce(self.history.as_slice()) {
            Ok(verdicts) => {
                for event in verdicts {
                    if let Err(e) = sink.notify(&event.message) {
                        tracing::warn!(message = %event.message, error = %e, "notification not delivered");
                    }
                    report.verdicts.push(event);
                }
                if report.verdicts.is_empty() {
                    tracing::info!("no changes in acne tendency");
                    report.no_change = true;
                }
            }
            Err(e) => {
                tracing::info!(error = %e, "waiting for more observations");
                report.insufficient_history = true;
            }
        }

        Ok(report)
    }

    fn process_photo(
        &mut self,
        reference: &FeatureVector,
        image: Result<FaceImage, ImageError>,
    ) -> Result<PhotoOutcome, PipelineError> {
        let photo = image?;
        let faces = self.detector.detect(&photo)?;
        let mut outcome = PhotoOutcome {
            faces: faces.len(),
            ..PhotoOutcome::default()
        };

        for face in &faces {
            let candidate = self.extractor.tight(&photo, face)?;
            let similarity = self.gate.compare_with(reference, &candidate, self.match_threshold)?;
            if !similarity.is_match {
                tracing::debug!(distance = similarity.distance, "face does not match reference");
                outcome.rejected += 1;
                continue;
            }

            let crop = self.extractor.extract(&photo, face)?;
            outcome.observations.push(self.classifier.classify(&crop)?);
        }

        Ok(outcome)
    }
}
