//! YOLO-family output decoding: box extraction, thresholding, and NMS.
//!
//! The exported model emits a `[1, 4 + num_classes, num_anchors]` tensor with
//! center-format boxes in input-tensor coordinates and per-class scores with
//! objectness already folded in. Everything here is pure tensor math so it
//! can be tested without model weights.

use ndarray::ArrayView2;

/// A decoded detection in source-image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub class_id: usize,
    pub confidence: f32,
}

/// Decode predictions, applying the confidence threshold during decoding.
///
/// `predictions` is the squeezed `[4 + num_classes, num_anchors]` view. Boxes
/// are scaled from the square input tensor back to `img_w` x `img_h` and
/// clamped to image bounds; degenerate boxes are dropped.
pub fn decode_predictions(
    predictions: ArrayView2<'_, f32>,
    confidence_threshold: f32,
    input_size: u32,
    img_w: u32,
    img_h: u32,
) -> Vec<RawDetection> {
    let rows = predictions.nrows();
    if rows < 5 {
        return Vec::new();
    }

    let scale_x = img_w as f32 / input_size as f32;
    let scale_y = img_h as f32 / input_size as f32;
    let mut detections = Vec::new();

    for col in 0..predictions.ncols() {
        let mut class_id = 0;
        let mut confidence = f32::MIN;
        for class in 0..rows - 4 {
            let score = predictions[[4 + class, col]];
            if score > confidence {
                confidence = score;
                class_id = class;
            }
        }
        if confidence < confidence_threshold {
            continue;
        }

        let cx = predictions[[0, col]];
        let cy = predictions[[1, col]];
        let w = predictions[[2, col]];
        let h = predictions[[3, col]];

        let x1 = ((cx - w / 2.0) * scale_x).clamp(0.0, img_w as f32);
        let y1 = ((cy - h / 2.0) * scale_y).clamp(0.0, img_h as f32);
        let x2 = ((cx + w / 2.0) * scale_x).clamp(0.0, img_w as f32);
        let y2 = ((cy + h / 2.0) * scale_y).clamp(0.0, img_h as f32);

        if x2 - x1 < 1.0 || y2 - y1 < 1.0 {
            continue;
        }

        detections.push(RawDetection {
            x1,
            y1,
            x2,
            y2,
            class_id,
            confidence,
        });
    }

    detections
}

/// Class-aware greedy non-maximum suppression, highest confidence first.
pub fn non_max_suppression(
    mut detections: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<RawDetection> = Vec::new();
    for det in detections {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == det.class_id && iou(k, &det) > iou_threshold);
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}

fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);

    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;

    /// Build a [4 + classes, anchors] prediction array from anchor columns
    fn predictions(classes: usize, anchors: &[(f32, f32, f32, f32, Vec<f32>)]) -> Array2<f32> {
        let mut arr = Array2::<f32>::zeros((4 + classes, anchors.len()));
        for (col, (cx, cy, w, h, scores)) in anchors.iter().enumerate() {
            arr[[0, col]] = *cx;
            arr[[1, col]] = *cy;
            arr[[2, col]] = *w;
            arr[[3, col]] = *h;
            for (class, score) in scores.iter().enumerate() {
                arr[[4 + class, col]] = *score;
            }
        }
        arr
    }

    #[test]
    fn test_confidence_threshold_applied_during_decode() {
        let preds = predictions(
            2,
            &[
                (320.0, 320.0, 100.0, 100.0, vec![0.9, 0.1]),
                (100.0, 100.0, 50.0, 50.0, vec![0.3, 0.4]),
            ],
        );
        let dets = decode_predictions(preds.view(), 0.5, 640, 640, 640);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 0);
        assert!((dets[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_class_argmax() {
        let preds = predictions(3, &[(320.0, 320.0, 64.0, 64.0, vec![0.1, 0.7, 0.6])]);
        let dets = decode_predictions(preds.view(), 0.5, 640, 640, 640);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
    }

    #[test]
    fn test_boxes_scaled_and_within_bounds() {
        // 640 input tensor, 320x240 source image; box hangs off the left edge
        let preds = predictions(1, &[(10.0, 320.0, 100.0, 100.0, vec![0.8])]);
        let dets = decode_predictions(preds.view(), 0.5, 640, 320, 240);
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert_eq!(d.x1, 0.0); // clamped
        assert!(d.x1 < d.x2 && d.y1 < d.y2);
        assert!(d.x2 <= 320.0 && d.y2 <= 240.0);
    }

    #[test]
    fn test_degenerate_boxes_dropped() {
        let preds = predictions(1, &[(320.0, 320.0, 0.5, 40.0, vec![0.9])]);
        let dets = decode_predictions(preds.view(), 0.5, 640, 640, 640);
        assert!(dets.is_empty());
    }

    #[test]
    fn test_nms_suppresses_same_class_overlap() {
        let a = RawDetection {
            x1: 0.0,
            y1: 0.0,
            x2: 100.0,
            y2: 100.0,
            class_id: 0,
            confidence: 0.9,
        };
        let b = RawDetection {
            x1: 5.0,
            y1: 5.0,
            x2: 105.0,
            y2: 105.0,
            class_id: 0,
            confidence: 0.8,
        };
        let kept = non_max_suppression(vec![b, a], 0.45, 100);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_different_classes() {
        let a = RawDetection {
            x1: 0.0,
            y1: 0.0,
            x2: 100.0,
            y2: 100.0,
            class_id: 0,
            confidence: 0.9,
        };
        let mut b = a;
        b.class_id = 1;
        b.confidence = 0.8;
        let kept = non_max_suppression(vec![a, b], 0.45, 100);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_nms_caps_detections() {
        let dets: Vec<RawDetection> = (0..10)
            .map(|i| RawDetection {
                x1: i as f32 * 200.0,
                y1: 0.0,
                x2: i as f32 * 200.0 + 100.0,
                y2: 100.0,
                class_id: 0,
                confidence: 0.9,
            })
            .collect();
        let kept = non_max_suppression(dets, 0.45, 3);
        assert_eq!(kept.len(), 3);
    }
}
