//! Face descriptor extraction via ONNX Runtime.
//!
//! Expects a FaceNet-style model: a square RGB input in NHWC layout,
//! standardized per image, producing a single descriptor vector.

use crate::types::{Descriptor, FaceCrop};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageBuffer, RgbImage, RgbaImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_INPUT_SIZE: u32 = 160;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("cannot extract a descriptor from an empty or malformed crop")]
    InvalidCrop,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Capability that turns a face crop into a fixed-length descriptor.
pub trait DescriptorExtractor: Send {
    fn extract(&mut self, crop: &FaceCrop) -> Result<Descriptor, ExtractorError>;
}

/// ONNX-backed descriptor extractor.
pub struct OnnxExtractor {
    session: Session,
    input_size: u32,
}

impl OnnxExtractor {
    /// Load the embedding model from `model_path`.
    pub fn load(model_path: &Path) -> Result<Self, ExtractorError> {
        if !model_path.exists() {
            return Err(ExtractorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded descriptor model"
        );

        Ok(Self {
            session,
            input_size: DEFAULT_INPUT_SIZE,
        })
    }
}

impl DescriptorExtractor for OnnxExtractor {
    fn extract(&mut self, crop: &FaceCrop) -> Result<Descriptor, ExtractorError> {
        let input = preprocess(crop, self.input_size)?;

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractorError::InferenceFailed(format!("descriptor output: {e}")))?;

        if raw_data.is_empty() {
            return Err(ExtractorError::InferenceFailed("empty descriptor".into()));
        }

        Ok(Descriptor::new(l2_normalize(raw_data.to_vec())))
    }
}

/// Resize a crop to `size`×`size` RGB and prewhiten it into a NHWC tensor.
///
/// Prewhitening subtracts the image mean and divides by
/// `max(std, 1/sqrt(n))`, so a flat crop does not divide by zero.
pub fn preprocess(crop: &FaceCrop, size: u32) -> Result<Array4<f32>, ExtractorError> {
    if crop.is_empty() || !crop.is_well_formed() {
        return Err(ExtractorError::InvalidCrop);
    }

    let (w, h) = (crop.width, crop.height);
    let data = crop.data.clone();
    let image = match crop.channels {
        1 => ImageBuffer::from_raw(w, h, data).map(|img: GrayImage| DynamicImage::ImageLuma8(img)),
        3 => ImageBuffer::from_raw(w, h, data).map(|img: RgbImage| DynamicImage::ImageRgb8(img)),
        4 => ImageBuffer::from_raw(w, h, data).map(|img: RgbaImage| DynamicImage::ImageRgba8(img)),
        _ => None,
    }
    .ok_or(ExtractorError::InvalidCrop)?;

    let rgb = image.resize_exact(size, size, FilterType::Triangle).to_rgb8();
    let pixels: Vec<f32> = rgb.as_raw().iter().map(|&p| p as f32).collect();

    let n = pixels.len() as f32;
    let mean = pixels.iter().sum::<f32>() / n;
    let std = (pixels.iter().map(|p| (p - mean).powi(2)).sum::<f32>() / n).sqrt();
    let std_adj = std.max(1.0 / n.sqrt());

    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, side, side, 3));
    for (i, value) in pixels.iter().enumerate() {
        let c = i % 3;
        let x = (i / 3) % side;
        let y = i / (3 * side);
        tensor[[0, y, x, c]] = (value - mean) / std_adj;
    }

    Ok(tensor)
}

fn l2_normalize(raw: Vec<f32>) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_output_shape() {
        let crop = FaceCrop::new(vec![128u8; 40 * 30 * 3], 40, 30, 3);
        let tensor = preprocess(&crop, DEFAULT_INPUT_SIZE).unwrap();
        assert_eq!(tensor.shape(), &[1, 160, 160, 3]);
    }

    #[test]
    fn test_preprocess_flat_crop_is_zero() {
        let crop = FaceCrop::new(vec![200u8; 8 * 8], 8, 8, 1);
        let tensor = preprocess(&crop, 16).unwrap();
        assert!(tensor.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_preprocess_standardizes() {
        let data: Vec<u8> = (0..16 * 16).flat_map(|i| {
            let v = (i % 256) as u8;
            [v, v / 2, 255 - v]
        }).collect();
        let crop = FaceCrop::new(data, 16, 16, 3);
        let tensor = preprocess(&crop, 16).unwrap();

        let n = tensor.len() as f32;
        let mean = tensor.iter().sum::<f32>() / n;
        let var = tensor.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
        assert!(mean.abs() < 1e-3, "mean = {mean}");
        assert!((var - 1.0).abs() < 1e-2, "var = {var}");
    }

    #[test]
    fn test_preprocess_channel_layout() {
        // Pure red crop: channel 0 above the mean, channels 1 and 2 below.
        let data: Vec<u8> = (0..4 * 4).flat_map(|_| [255u8, 0, 0]).collect();
        let crop = FaceCrop::new(data, 4, 4, 3);
        let tensor = preprocess(&crop, 4).unwrap();
        assert!(tensor[[0, 2, 1, 0]] > 0.0);
        assert!(tensor[[0, 2, 1, 1]] < 0.0);
        assert!(tensor[[0, 2, 1, 2]] < 0.0);
    }

    #[test]
    fn test_preprocess_rejects_bad_crops() {
        let empty = FaceCrop::new(vec![], 0, 0, 3);
        assert!(matches!(preprocess(&empty, 16), Err(ExtractorError::InvalidCrop)));

        let corrupt = FaceCrop::new(vec![1, 2, 3], 4, 4, 3);
        assert!(matches!(preprocess(&corrupt, 16), Err(ExtractorError::InvalidCrop)));
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_load_missing_model() {
        let result = OnnxExtractor::load(Path::new("/nonexistent/facenet.onnx"));
        assert!(matches!(result, Err(ExtractorError::ModelNotFound(_))));
    }
}
