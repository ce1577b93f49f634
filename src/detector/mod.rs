//! Fashion item detection
//!
//! Runs a region-based ONNX detector over outfit photos and produces one
//! [`DetectedItem`] per clothing item: category, bounding box, confidence,
//! a binary mask, and a background-suppressed crop ready for the feature
//! codec.

pub mod yolo;

use std::sync::Mutex;

use image::DynamicImage;
use image::RgbImage;
use ndarray::Array4;
use ndarray::Axis;
use tract_onnx::prelude::*;
use tracing::info;
use tracing::warn;

use crate::config::AppConfig;
use crate::errors::Result;
use crate::errors::StyleSnapError;
use crate::features::backbone::load_onnx_model;
use crate::features::backbone::OnnxPlan;

/// Default confidence threshold for detection
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Flat fill used to suppress background pixels inside a crop
const BACKGROUND_FILL: image::Rgb<u8> = image::Rgb([255, 255, 255]);

/// Map a detector class id to the fixed clothing vocabulary.
///
/// Out-of-vocabulary ids degrade to a synthetic `item_<id>` label instead of
/// dropping the detection.
#[must_use]
pub fn category_name(class_id: usize) -> String {
    match class_id {
        0 => "shirt".to_string(),
        1 => "pants".to_string(),
        2 => "dress".to_string(),
        3 => "shoes".to_string(),
        4 => "jacket".to_string(),
        5 => "bag".to_string(),
        6 => "hat".to_string(),
        7 => "accessories".to_string(),
        id => format!("item_{id}"),
    }
}

/// Integer bounding box in source-image pixel coordinates, x1<x2 and y1<y2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BBox {
    /// Build from decoded float coordinates, clamping to image bounds.
    /// Returns `None` for boxes that collapse after rounding.
    #[must_use]
    pub fn from_raw(det: &yolo::RawDetection, img_w: u32, img_h: u32) -> Option<Self> {
        let x1 = (det.x1.floor().max(0.0) as u32).min(img_w);
        let y1 = (det.y1.floor().max(0.0) as u32).min(img_h);
        let x2 = (det.x2.ceil().max(0.0) as u32).min(img_w);
        let y2 = (det.y2.ceil().max(0.0) as u32).min(img_h);
        if x1 < x2 && y1 < y2 {
            Some(Self { x1, y1, x2, y2 })
        } else {
            None
        }
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    /// `[x1, y1, x2, y2]` for the wire format
    #[must_use]
    pub const fn as_array(&self) -> [u32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Binary per-pixel item mask, aligned to the source image
#[derive(Debug, Clone)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Mask {
    /// Synthesize a filled-rectangle mask for a backend without native
    /// segmentation, so downstream cropping is uniform either way.
    #[must_use]
    pub fn filled_rect(img_w: u32, img_h: u32, bbox: &BBox) -> Self {
        let mut data = vec![0u8; (img_w as usize) * (img_h as usize)];
        for y in bbox.y1..bbox.y2 {
            let row = (y as usize) * (img_w as usize);
            for x in bbox.x1..bbox.x2 {
                data[row + x as usize] = 255;
            }
        }
        Self {
            width: img_w,
            height: img_h,
            data,
        }
    }

    #[must_use]
    pub fn is_item(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.data[(y as usize) * (self.width as usize) + x as usize] != 0
    }

    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// A detected clothing item, consumed by the feature codec or discarded
#[derive(Debug, Clone)]
pub struct DetectedItem {
    pub category: String,
    pub bbox: BBox,
    pub confidence: f32,
    pub mask: Mask,
    /// Bounding-box sub-image with background pixels flattened to white
    pub crop: RgbImage,
}

/// Cut the bbox region out of the source image and paint every pixel the
/// mask does not claim with the flat background fill.
fn crop_with_mask(image: &RgbImage, bbox: &BBox, mask: &Mask) -> RgbImage {
    let mut crop =
        image::imageops::crop_imm(image, bbox.x1, bbox.y1, bbox.width(), bbox.height()).to_image();
    for (dx, dy, pixel) in crop.enumerate_pixels_mut() {
        if !mask.is_item(bbox.x1 + dx, bbox.y1 + dy) {
            *pixel = BACKGROUND_FILL;
        }
    }
    crop
}

/// ONNX-backed clothing detector.
///
/// Loaded once per process; the session is shared read-only and inference is
/// serialized through a mutex since model load is far more expensive than
/// lock contention.
pub struct FashionDetector {
    plan: Mutex<OnnxPlan>,
    input_size: u32,
    iou_threshold: f32,
    max_detections: usize,
}

impl FashionDetector {
    /// Load the fine-tuned fashion weights, falling back to the generic
    /// pretrained baseline when they are unavailable.
    ///
    /// # Errors
    /// - Neither weights file could be loaded
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let detector = &config.detector;
        let plan = match load_onnx_model(&detector.model_path, detector.input_size) {
            Ok(plan) => {
                info!("Loaded fashion detector from {}", detector.model_path);
                plan
            }
            Err(e) => {
                warn!(
                    "Could not load fashion weights ({}), falling back to baseline {}",
                    e, detector.baseline_model_path
                );
                load_onnx_model(&detector.baseline_model_path, detector.input_size)?
            }
        };

        Ok(Self {
            plan: Mutex::new(plan),
            input_size: detector.input_size,
            iou_threshold: detector.iou_threshold,
            max_detections: detector.max_detections,
        })
    }

    /// Detect fashion items in a decoded image.
    ///
    /// Only detections at or above `confidence_threshold` are returned; the
    /// threshold is applied inside prediction decoding, not post-hoc.
    ///
    /// # Errors
    /// - Model inference failures (`Detection`); callers on the serving path
    ///   degrade these to an empty list
    pub fn detect(
        &self,
        image: &DynamicImage,
        confidence_threshold: f32,
    ) -> Result<Vec<DetectedItem>> {
        let rgb = image.to_rgb8();
        let (img_w, img_h) = (rgb.width(), rgb.height());
        if img_w == 0 || img_h == 0 {
            return Err(StyleSnapError::InvalidImage(
                "image has zero dimensions".to_string(),
            ));
        }

        let input = self.preprocess(&rgb);
        let outputs = {
            let plan = self.plan.lock().map_err(|_| {
                StyleSnapError::Detection("detector lock poisoned".to_string())
            })?;
            plan.run(tvec!(input.into()))
                .map_err(|e| StyleSnapError::Detection(format!("inference failed: {e}")))?
        };

        let output = outputs
            .first()
            .ok_or_else(|| StyleSnapError::Detection("detector produced no output".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| StyleSnapError::Detection(format!("bad output tensor: {e}")))?;
        let view = view
            .into_dimensionality::<ndarray::Ix3>()
            .map_err(|e| StyleSnapError::Detection(format!("unexpected output shape: {e}")))?;
        let predictions = view.index_axis(Axis(0), 0);

        let raw = yolo::decode_predictions(
            predictions,
            confidence_threshold,
            self.input_size,
            img_w,
            img_h,
        );
        let kept = yolo::non_max_suppression(raw, self.iou_threshold, self.max_detections);

        let mut items = Vec::with_capacity(kept.len());
        for det in kept {
            let Some(bbox) = BBox::from_raw(&det, img_w, img_h) else {
                continue;
            };
            // No native segmentation from this backend: rectangle mask
            let mask = Mask::filled_rect(img_w, img_h, &bbox);
            let crop = crop_with_mask(&rgb, &bbox, &mask);
            items.push(DetectedItem {
                category: category_name(det.class_id),
                bbox,
                confidence: det.confidence,
                mask,
                crop,
            });
        }

        info!("Detected {} fashion items", items.len());
        Ok(items)
    }

    /// Decode raw bytes and detect.
    ///
    /// # Errors
    /// - `InvalidImage` when the bytes cannot be decoded
    /// - Everything `detect` can return
    pub fn detect_bytes(
        &self,
        bytes: &[u8],
        confidence_threshold: f32,
    ) -> Result<Vec<DetectedItem>> {
        let image = crate::decode_image(bytes)?;
        self.detect(&image, confidence_threshold)
    }

    /// Scale to the square input tensor and normalize to [0, 1], NCHW.
    fn preprocess(&self, rgb: &RgbImage) -> Tensor {
        let size = self.input_size;
        let resized = image::imageops::resize(
            rgb,
            size,
            size,
            image::imageops::FilterType::Triangle,
        );

        let s = size as usize;
        let mut input = Array4::<f32>::zeros((1, 3, s, s));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = f32::from(pixel[c]) / 255.0;
            }
        }
        input.into()
    }
}
