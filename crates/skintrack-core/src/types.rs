use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("decode: {0}")]
    Decode(#[from] image::ImageError),
}

/// Face bounding box in image-normalized coordinates.
///
/// `x`/`y` locate the top-left corner as a fraction of the image size,
/// `width`/`height` are fractions of the image width and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Pixel rectangle inside a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// An RGB image of (part of) a photo, with the region it was cut from.
#[derive(Debug, Clone)]
pub struct FaceImage {
    pixels: RgbImage,
    source: Option<CropRegion>,
}

impl FaceImage {
    /// Build from a raw interleaved buffer with 3 (RGB) or 4 (RGBA) channels.
    ///
    /// Alpha is dropped.
    pub fn from_raw(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::InvalidInput(format!("empty image {width}x{height}")));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(ImageError::InvalidInput(format!(
                "expected {expected} bytes for {width}x{height}x{channels}, got {}",
                data.len()
            )));
        }

        let rgb = match channels {
            3 => data,
            4 => data
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
            other => {
                return Err(ImageError::InvalidInput(format!(
                    "unsupported channel count {other}"
                )))
            }
        };

        let pixels = RgbImage::from_raw(width, height, rgb)
            .ok_or_else(|| ImageError::InvalidInput("pixel buffer too small".into()))?;
        Ok(Self { pixels, source: None })
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self {
            pixels: image.to_rgb8(),
            source: None,
        }
    }

    /// Decode an image file from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        Ok(Self::from_dynamic(image::open(path)?))
    }

    pub(crate) fn cropped(pixels: RgbImage, source: CropRegion) -> Self {
        Self {
            pixels,
            source: Some(source),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.width() == 0 || self.pixels.height() == 0
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Region of the source photo this image was cropped from, if any.
    pub fn source(&self) -> Option<&CropRegion> {
        self.source.as_ref()
    }
}

/// Face embedding produced by the embedding model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: Vec<f32>,
    /// Model that produced this vector (e.g., "face_embedding").
    pub model: Option<String>,
}

impl FeatureVector {
    /// Euclidean norm of the element-wise difference.
    ///
    /// Callers must check lengths first; extra trailing elements are ignored.
    pub fn euclidean_distance(&self, other: &FeatureVector) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub distance: f32,
    pub is_match: bool,
}

/// One processed face: acne presence plus the severity class index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcneObservation {
    pub has_acne: bool,
    pub severity_index: usize,
}

impl AcneObservation {
    pub fn new(has_acne: bool, severity_index: usize) -> Self {
        Self {
            has_acne,
            severity_index,
        }
    }
}

/// Chronological sequence of observations. Grows by appending; only an
/// unpersisted run is ever rolled back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservationHistory(Vec<AcneObservation>);

impl ObservationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observation: AcneObservation) {
        self.0.push(observation);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[AcneObservation] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AcneObservation> {
        self.0.iter()
    }

    /// Keep only the first `len` observations.
    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }
}

impl From<Vec<AcneObservation>> for ObservationHistory {
    fn from(observations: Vec<AcneObservation>) -> Self {
        Self(observations)
    }
}

impl Extend<AcneObservation> for ObservationHistory {
    fn extend<T: IntoIterator<Item = AcneObservation>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerdictKind {
    AcneAppeared,
    SeverityWorse,
    SeverityBetter,
    Stable,
    NoChange,
}

impl VerdictKind {
    pub fn message(self) -> &'static str {
        match self {
            VerdictKind::AcneAppeared => "Acne has appeared",
            VerdictKind::SeverityWorse => "Acne severity got worse",
            VerdictKind::SeverityBetter => "Acne severity got better",
            VerdictKind::Stable => "Acne is stable",
            VerdictKind::NoChange => "No changes in acne tendency",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictEvent {
    pub kind: VerdictKind,
    pub message: String,
}

impl From<VerdictKind> for VerdictEvent {
    fn from(kind: VerdictKind) -> Self {
        Self {
            kind,
            message: kind.message().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_rgba_drops_alpha() {
        let data = vec![10, 20, 30, 255, 40, 50, 60, 0];
        let img = FaceImage::from_raw(2, 1, 4, data).unwrap();
        assert_eq!(img.pixels().as_raw(), &vec![10, 20, 30, 40, 50, 60]);
        assert!(img.source().is_none());
    }

    #[test]
    fn test_from_raw_rejects_short_buffer() {
        let result = FaceImage::from_raw(2, 2, 3, vec![0; 5]);
        assert!(matches!(result, Err(ImageError::InvalidInput(_))));
    }

    #[test]
    fn test_from_raw_rejects_empty() {
        let result = FaceImage::from_raw(0, 4, 3, vec![]);
        assert!(matches!(result, Err(ImageError::InvalidInput(_))));
    }

    #[test]
    fn test_from_raw_rejects_grayscale() {
        let result = FaceImage::from_raw(2, 2, 1, vec![0; 4]);
        assert!(matches!(result, Err(ImageError::InvalidInput(_))));
    }

    #[test]
    fn test_euclidean_distance() {
        let a = FeatureVector { values: vec![0.0, 0.0], model: None };
        let b = FeatureVector { values: vec![3.0, 4.0], model: None };
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_history_serializes_as_array() {
        let history = ObservationHistory::from(vec![AcneObservation::new(true, 2)]);
        let json = serde_json::to_string(&history).unwrap();
        assert_eq!(json, r#"[{"has_acne":true,"severity_index":2}]"#);
    }

    #[test]
    fn test_verdict_messages() {
        let event = VerdictEvent::from(VerdictKind::Stable);
        assert_eq!(event.message, "Acne is stable");
    }
}
