//! ONNX backbone forward pass via tract.
//!
//! The model is an image-classification backbone exported without its final
//! classification layer, so the single output is the pooled feature vector.

use std::path::Path;

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use tract_onnx::prelude::*;

use crate::errors::Result;
use crate::errors::StyleSnapError;

/// ImageNet normalization constants used by the backbone
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Shorter-side resize target applied before the center crop
const RESIZE_TARGET: u32 = 256;

pub type OnnxPlan = TypedSimplePlan<TypedModel>;

/// Load an ONNX model with a fixed NCHW f32 input shape.
pub fn load_onnx_model<P: AsRef<Path>>(path: P, input_size: u32) -> Result<OnnxPlan> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(StyleSnapError::Config(format!(
            "Model weights not found: {}",
            path.display()
        )));
    }

    let size = input_size as usize;
    tract_onnx::onnx()
        .model_for_path(path)
        .and_then(|m| m.with_input_fact(0, f32::fact([1, 3, size, size]).into()))
        .and_then(|m| m.into_optimized())
        .and_then(|m| m.into_runnable())
        .map_err(|e| StyleSnapError::Config(format!("Failed to load {}: {e}", path.display())))
}

/// Resize so the shorter side is 256, then center-crop to the backbone input.
pub fn resize_center_crop(image: &RgbImage, crop_size: u32) -> RgbImage {
    let (w, h) = (image.width(), image.height());
    let short = w.min(h).max(1);
    let scale = f64::from(RESIZE_TARGET.max(crop_size)) / f64::from(short);
    let new_w = ((f64::from(w) * scale).round() as u32).max(crop_size);
    let new_h = ((f64::from(h) * scale).round() as u32).max(crop_size);

    let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);
    let x = (new_w - crop_size) / 2;
    let y = (new_h - crop_size) / 2;
    image::imageops::crop_imm(&resized, x, y, crop_size, crop_size).to_image()
}

/// Preprocess a crop into a normalized NCHW tensor.
pub fn preprocess(image: &RgbImage, input_size: u32) -> Tensor {
    let cropped = resize_center_crop(image, input_size);
    let size = input_size as usize;

    let mut input = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in cropped.enumerate_pixels() {
        for c in 0..3 {
            let value = f32::from(pixel[c]) / 255.0;
            input[[0, c, y as usize, x as usize]] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    input.into()
}

/// Run the backbone and return the flattened feature vector.
///
/// # Errors
/// - Inference failures inside tract
/// - Output dimension disagreeing with the configured embedding dimension
pub fn forward(plan: &OnnxPlan, input: Tensor, expected_dim: usize) -> Result<Vec<f32>> {
    let outputs = plan
        .run(tvec!(input.into()))
        .map_err(|e| StyleSnapError::Embedding(format!("Backbone inference failed: {e}")))?;

    let output = outputs
        .first()
        .ok_or_else(|| StyleSnapError::Embedding("Backbone produced no output".to_string()))?;
    let view = output
        .to_array_view::<f32>()
        .map_err(|e| StyleSnapError::Embedding(format!("Bad output tensor: {e}")))?;

    // Shape is [1, D] or [1, D, 1, 1] depending on the export; flatten either way
    let embedding: Vec<f32> = view.iter().copied().collect();
    if embedding.len() != expected_dim {
        return Err(StyleSnapError::DimensionMismatch {
            expected: expected_dim,
            actual: embedding.len(),
        });
    }

    Ok(embedding)
}
