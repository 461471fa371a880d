//! Black-box inference models via ONNX Runtime.
//!
//! Every model in the pipeline takes the same input layout: an RGB image
//! drawn into the model's fixed W×H canvas, flattened row-major with
//! interleaved R, G, B channels scaled to [0.0, 1.0] (NHWC `[1, H, W, 3]`).

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const CHANNELS: usize = 3;
const PIXEL_SCALE: f32 = 255.0;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A loaded model: flat f32 tensor in, flat f32 tensor out.
///
/// Inference takes `&mut self`, so one allocate/invoke/read cycle is in
/// flight per instance.
pub trait InferenceModel {
    /// Fixed input resolution (width, height).
    fn input_size(&self) -> (u32, u32);

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>, ModelError>;
}

/// Convert an image into the model input tensor for a `width`×`height` canvas.
///
/// Channel order per pixel is R, G, B; pixels are visited row by row.
pub fn to_input_tensor(pixels: &RgbImage, width: u32, height: u32) -> Vec<f32> {
    let resized;
    let canvas = if pixels.dimensions() == (width, height) {
        pixels
    } else {
        resized = imageops::resize(pixels, width, height, FilterType::Triangle);
        &resized
    };

    let mut tensor = Vec::with_capacity(width as usize * height as usize * CHANNELS);
    for pixel in canvas.pixels() {
        let [r, g, b] = pixel.0;
        tensor.push(r as f32 / PIXEL_SCALE);
        tensor.push(g as f32 / PIXEL_SCALE);
        tensor.push(b as f32 / PIXEL_SCALE);
    }
    tensor
}

/// ONNX model driven through [`InferenceModel`].
pub struct OnnxModel {
    session: Session,
    name: String,
    input_width: u32,
    input_height: u32,
}

impl OnnxModel {
    /// Load an ONNX model that expects `input_width`×`input_height` RGB input.
    pub fn load(
        model_path: &str,
        name: &str,
        input_width: u32,
        input_height: u32,
    ) -> Result<Self, ModelError> {
        if !Path::new(model_path).exists() {
            return Err(ModelError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            model = name,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded model"
        );

        Ok(Self {
            session,
            name: name.to_string(),
            input_width,
            input_height,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl InferenceModel for OnnxModel {
    fn input_size(&self) -> (u32, u32) {
        (self.input_width, self.input_height)
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>, ModelError> {
        let (w, h) = (self.input_width as usize, self.input_height as usize);
        let input = Array4::from_shape_vec((1, h, w, CHANNELS), input.to_vec()).map_err(|e| {
            ModelError::InferenceFailed(format!("{}: input tensor {w}x{h}x{CHANNELS}: {e}", self.name))
        })?;

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InferenceFailed(format!("{}: output: {e}", self.name)))?;

        Ok(data.to_vec())
    }
}
