//! Face crop extraction for classification.
//!
//! Detector boxes hug the facial landmarks and leave out forehead, cheeks and
//! jaw. The classifier crop widens the box by a fixed margin on every side,
//! clamps it to the photo and resizes it to the classifier input resolution.

use crate::types::{BoundingBox, CropRegion, FaceImage};
use image::imageops::{self, FilterType};
use thiserror::Error;

/// Expansion on each horizontal side, as a fraction of the raw box width.
const HORIZONTAL_MARGIN: f32 = 0.10;
/// Expansion above the raw box, as a fraction of its height.
const TOP_MARGIN: f32 = 0.20;
/// Expansion below the raw box, as a fraction of its height.
const BOTTOM_MARGIN: f32 = 0.50;

pub const CLASSIFIER_INPUT_SIZE: u32 = 224;

#[derive(Error, Debug)]
pub enum CropError {
    #[error("degenerate crop region: {0}")]
    OutOfBounds(String),
}

#[derive(Debug, Clone, Copy)]
struct Margins {
    horizontal: f32,
    top: f32,
    bottom: f32,
}

const EXPANDED: Margins = Margins {
    horizontal: HORIZONTAL_MARGIN,
    top: TOP_MARGIN,
    bottom: BOTTOM_MARGIN,
};

const TIGHT: Margins = Margins {
    horizontal: 0.0,
    top: 0.0,
    bottom: 0.0,
};

/// Pixel region covered by `face` grown by `margins`, clamped to the image.
fn clamped_region(
    image_width: u32,
    image_height: u32,
    face: &BoundingBox,
    margins: Margins,
) -> Result<CropRegion, CropError> {
    let w = image_width as f32;
    let h = image_height as f32;

    let box_x = face.x * w;
    let box_y = face.y * h;
    let box_w = face.width * w;
    let box_h = face.height * h;

    let left = (box_x - box_w * margins.horizontal).max(0.0);
    let top = (box_y - box_h * margins.top).max(0.0);
    let right = (box_x + box_w * (1.0 + margins.horizontal)).min(w);
    let bottom = (box_y + box_h * (1.0 + margins.bottom)).min(h);

    // Negated comparison also rejects NaN coordinates.
    if !(right > left && bottom > top) {
        return Err(CropError::OutOfBounds(format!(
            "box {face:?} in {image_width}x{image_height} clamps to \
             [{left:.1}, {top:.1}, {right:.1}, {bottom:.1}]"
        )));
    }

    let x0 = left.floor() as u32;
    let y0 = top.floor() as u32;
    let x1 = (right.ceil() as u32).min(image_width);
    let y1 = (bottom.ceil() as u32).min(image_height);

    if x1 <= x0 || y1 <= y0 {
        return Err(CropError::OutOfBounds(format!(
            "empty pixel region {x0}..{x1} x {y0}..{y1}"
        )));
    }

    Ok(CropRegion {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    })
}

/// Cuts classifier-ready face crops out of full photos.
#[derive(Debug, Clone, Copy)]
pub struct FaceCropExtractor {
    output_width: u32,
    output_height: u32,
}

impl Default for FaceCropExtractor {
    fn default() -> Self {
        Self::new(CLASSIFIER_INPUT_SIZE, CLASSIFIER_INPUT_SIZE)
    }
}

impl FaceCropExtractor {
    pub fn new(output_width: u32, output_height: u32) -> Self {
        Self {
            output_width,
            output_height,
        }
    }

    /// Expanded and clamped pixel region for a face box.
    pub fn region(
        image_width: u32,
        image_height: u32,
        face: &BoundingBox,
    ) -> Result<CropRegion, CropError> {
        clamped_region(image_width, image_height, face, EXPANDED)
    }

    /// Expanded crop, resized to the classifier input resolution.
    pub fn extract(&self, photo: &FaceImage, face: &BoundingBox) -> Result<FaceImage, CropError> {
        let region = Self::region(photo.width(), photo.height(), face)?;
        let crop = imageops::crop_imm(photo.pixels(), region.x, region.y, region.width, region.height)
            .to_image();
        let resized = imageops::resize(&crop, self.output_width, self.output_height, FilterType::Triangle);
        Ok(FaceImage::cropped(resized, region))
    }

    /// The raw detector box with no expansion and no resize.
    pub fn tight(&self, photo: &FaceImage, face: &BoundingBox) -> Result<FaceImage, CropError> {
        let region = clamped_region(photo.width(), photo.height(), face, TIGHT)?;
        let crop = imageops::crop_imm(photo.pixels(), region.x, region.y, region.width, region.height)
            .to_image();
        Ok(FaceImage::cropped(crop, region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn face(x: f32, y: f32, width: f32, height: f32) -> BoundingBox {
        BoundingBox { x, y, width, height, confidence: 0.9 }
    }

    fn photo(width: u32, height: u32) -> FaceImage {
        FaceImage::from_dynamic(DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 0])
        })))
    }

    #[test]
    fn test_region_expands_margins() {
        // Raw box: x 400..600, y 200..400 in a 1000x1000 photo
        let region = FaceCropExtractor::region(1000, 1000, &face(0.4, 0.2, 0.2, 0.2)).unwrap();
        assert_eq!(region.x, 380); // 10% of 200 to the left
        assert_eq!(region.y, 160); // 20% of 200 up
        assert_eq!(region.width, 240); // 10% on both sides
        assert_eq!(region.height, 340); // 20% up + 50% down
    }

    #[test]
    fn test_region_clamped_at_origin() {
        let region = FaceCropExtractor::region(100, 100, &face(0.0, 0.0, 0.5, 0.5)).unwrap();
        assert_eq!((region.x, region.y), (0, 0));
        assert_eq!(region.width, 55);
        assert_eq!(region.height, 75);
    }

    #[test]
    fn test_region_clamped_at_far_edge() {
        let region = FaceCropExtractor::region(100, 80, &face(0.7, 0.6, 0.3, 0.4)).unwrap();
        assert!(region.x + region.width <= 100);
        assert!(region.y + region.height <= 80);
        assert_eq!(region.x + region.width, 100);
        assert_eq!(region.y + region.height, 80);
    }

    #[test]
    fn test_region_always_inside_bounds() {
        let sizes = [(64, 48), (640, 480), (1080, 1920), (7, 13)];
        let boxes = [
            face(0.0, 0.0, 1.0, 1.0),
            face(0.45, 0.45, 0.1, 0.1),
            face(0.9, 0.95, 0.1, 0.05),
            face(0.01, 0.8, 0.3, 0.2),
            face(0.2, 0.1, 0.001, 0.001),
        ];
        for &(w, h) in &sizes {
            for b in &boxes {
                let r = FaceCropExtractor::region(w, h, b).unwrap();
                assert!(r.width > 0 && r.height > 0, "{r:?} for {b:?} in {w}x{h}");
                assert!(r.x + r.width <= w, "{r:?} exceeds width {w}");
                assert!(r.y + r.height <= h, "{r:?} exceeds height {h}");
            }
        }
    }

    #[test]
    fn test_region_degenerate_box() {
        let result = FaceCropExtractor::region(100, 100, &face(0.5, 0.5, 0.0, 0.2));
        assert!(matches!(result, Err(CropError::OutOfBounds(_))));
    }

    #[test]
    fn test_region_outside_image() {
        let result = FaceCropExtractor::region(100, 100, &face(1.2, 0.5, 0.1, 0.1));
        assert!(matches!(result, Err(CropError::OutOfBounds(_))));
    }

    #[test]
    fn test_region_nan_box() {
        let result = FaceCropExtractor::region(100, 100, &face(f32::NAN, 0.5, 0.1, 0.1));
        assert!(matches!(result, Err(CropError::OutOfBounds(_))));
    }

    #[test]
    fn test_extract_resizes_to_classifier_input() {
        let crop = FaceCropExtractor::default()
            .extract(&photo(640, 480), &face(0.3, 0.2, 0.25, 0.3))
            .unwrap();
        assert_eq!((crop.width(), crop.height()), (224, 224));
        assert!(crop.source().is_some());
    }

    #[test]
    fn test_tight_keeps_raw_box() {
        let tight = FaceCropExtractor::default()
            .tight(&photo(200, 100), &face(0.25, 0.5, 0.5, 0.25))
            .unwrap();
        assert_eq!((tight.width(), tight.height()), (100, 25));
        // Top-left pixel of the crop is photo pixel (50, 50)
        assert_eq!(tight.pixels().get_pixel(0, 0), &Rgb([50, 50, 0]));
    }
}
