//! Acne classification from a face crop.
//!
//! Two models see the same preprocessed crop: a multi-class severity model
//! whose arg-max indexes the label vocabulary, and a binary model whose single
//! probability decides acne presence.

use crate::labels::LabelSet;
use crate::model::{self, InferenceModel, ModelError};
use crate::types::{AcneObservation, FaceImage};
use thiserror::Error;

/// Binary-model probability above which a crop counts as clear skin.
pub const DEFAULT_ACNE_THRESHOLD: f32 = 0.45;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("severity model emits {outputs} classes but label file lists {labels}")]
    LabelMismatch { outputs: usize, labels: usize },
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Index of the largest value; the first one wins ties.
fn argmax(probabilities: &[f32]) -> usize {
    let mut best = 0;
    for (i, &p) in probabilities.iter().enumerate().skip(1) {
        if p > probabilities[best] {
            best = i;
        }
    }
    best
}

/// The binary model's output is the probability of clear skin:
/// strictly above the threshold means no acne.
fn has_acne(clear_probability: f32, threshold: f32) -> bool {
    clear_probability <= threshold
}

pub struct AcneClassifier {
    severity: Box<dyn InferenceModel + Send>,
    binary: Box<dyn InferenceModel + Send>,
    labels: LabelSet,
    acne_threshold: f32,
}

impl AcneClassifier {
    /// Build a classifier and check the severity model against the labels.
    ///
    /// Runs one inference on a blank canvas so a label file that does not
    /// match the model fails here instead of mid-batch.
    pub fn new(
        mut severity: Box<dyn InferenceModel + Send>,
        binary: Box<dyn InferenceModel + Send>,
        labels: LabelSet,
        acne_threshold: f32,
    ) -> Result<Self, ClassifierError> {
        let (w, h) = severity.input_size();
        let probe = vec![0.0f32; w as usize * h as usize * 3];
        let outputs = severity.infer(&probe)?.len();
        if outputs != labels.len() {
            return Err(ClassifierError::LabelMismatch {
                outputs,
                labels: labels.len(),
            });
        }

        Ok(Self {
            severity,
            binary,
            labels,
            acne_threshold,
        })
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn classify(&mut self, crop: &FaceImage) -> Result<AcneObservation, ClassifierError> {
        if crop.is_empty() {
            return Err(ClassifierError::InvalidInput("empty face crop".into()));
        }

        let severity_size = self.severity.input_size();
        let binary_size = self.binary.input_size();
        let severity_input = model::to_input_tensor(crop.pixels(), severity_size.0, severity_size.1);

        let probabilities = self.severity.infer(&severity_input)?;
        if probabilities.len() < self.labels.len() {
            return Err(ModelError::InferenceFailed(format!(
                "severity output has {} values, expected {}",
                probabilities.len(),
                self.labels.len()
            ))
            .into());
        }
        let severity_index = argmax(&probabilities[..self.labels.len()]);

        let binary_output = if binary_size == severity_size {
            self.binary.infer(&severity_input)?
        } else {
            let input = model::to_input_tensor(crop.pixels(), binary_size.0, binary_size.1);
            self.binary.infer(&input)?
        };
        let clear_probability = *binary_output
            .first()
            .ok_or_else(|| ModelError::InferenceFailed("binary model returned no output".into()))?;
        if clear_probability.is_nan() {
            return Err(ModelError::InferenceFailed("binary model returned NaN".into()).into());
        }

        let observation = AcneObservation {
            has_acne: has_acne(clear_probability, self.acne_threshold),
            severity_index,
        };

        tracing::debug!(
            severity = self.labels.name(severity_index).unwrap_or_default(),
            severity_index,
            severity_probability = probabilities[severity_index],
            clear_probability,
            has_acne = observation.has_acne,
            "classified face crop"
        );

        Ok(observation)
    }
}
