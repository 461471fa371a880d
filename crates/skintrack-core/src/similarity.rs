//! Same-person gate over face embeddings.
//!
//! Both faces go through one embedding model; the Euclidean distance between
//! the two feature vectors is compared against a tunable threshold.

use crate::model::{self, InferenceModel, ModelError};
use crate::types::{FaceImage, FeatureVector, SimilarityResult};
use thiserror::Error;

pub const DEFAULT_MATCH_THRESHOLD: f32 = 1.0;

#[derive(Error, Debug)]
pub enum SimilarityError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("feature vectors differ in length: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Compare two feature vectors: `is_match = distance < threshold`.
pub fn similarity(
    a: &FeatureVector,
    b: &FeatureVector,
    threshold: f32,
) -> Result<SimilarityResult, SimilarityError> {
    if a.values.len() != b.values.len() {
        return Err(SimilarityError::DimensionMismatch {
            left: a.values.len(),
            right: b.values.len(),
        });
    }
    let distance = a.euclidean_distance(b);
    Ok(SimilarityResult {
        distance,
        is_match: distance < threshold,
    })
}

pub struct FaceSimilarityGate {
    model: Box<dyn InferenceModel + Send>,
    model_name: String,
}

impl FaceSimilarityGate {
    pub fn new(model: Box<dyn InferenceModel + Send>, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }

    /// Run the embedding model over a face.
    pub fn embed(&mut self, face: &FaceImage) -> Result<FeatureVector, SimilarityError> {
        if face.is_empty() {
            return Err(SimilarityError::InvalidInput(format!(
                "face image has no pixel data ({}x{})",
                face.width(),
                face.height()
            )));
        }

        let (width, height) = self.model.input_size();
        let input = model::to_input_tensor(face.pixels(), width, height);
        let values = self.model.infer(&input)?;
        if values.is_empty() {
            return Err(ModelError::InferenceFailed(format!("{}: empty embedding", self.model_name)).into());
        }

        Ok(FeatureVector {
            values,
            model: Some(self.model_name.clone()),
        })
    }

    /// Embed both faces and compare them.
    pub fn compare(
        &mut self,
        reference: &FaceImage,
        candidate: &FaceImage,
        threshold: f32,
    ) -> Result<SimilarityResult, SimilarityError> {
        let reference = self.embed(reference)?;
        self.compare_with(&reference, candidate, threshold)
    }

    /// Compare a candidate face against an already embedded reference.
    pub fn compare_with(
        &mut self,
        reference: &FeatureVector,
        candidate: &FaceImage,
        threshold: f32,
    ) -> Result<SimilarityResult, SimilarityError> {
        let candidate = self.embed(candidate)?;
        similarity(reference, &candidate, threshold)
    }
}
