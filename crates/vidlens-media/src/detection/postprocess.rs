//! YOLOv8 output decoding and non-maximum suppression.

use ndarray::ArrayView2;

use super::Detection;
use crate::error::{MediaError, MediaResult};

/// Bounding box values per candidate (cx, cy, w, h).
const BOX_FEATURES: usize = 4;

/// Decode a raw `[1, 4 + classes, candidates]` YOLOv8 output.
///
/// Boxes are scaled back to the original frame and normalized to [0, 1].
pub fn decode_yolo(
    output: &[f32],
    num_classes: usize,
    input_size: u32,
    orig_width: u32,
    orig_height: u32,
    confidence_threshold: f32,
) -> MediaResult<Vec<Detection>> {
    let features = BOX_FEATURES + num_classes;
    if features == BOX_FEATURES || output.is_empty() || output.len() % features != 0 {
        return Err(MediaError::detection_failed(format!(
            "unexpected output size {} for {} classes",
            output.len(),
            num_classes
        )));
    }
    let candidates = output.len() / features;

    let view = ArrayView2::from_shape((features, candidates), output)
        .map_err(|e| MediaError::detection_failed(format!("failed to reshape output: {e}")))?;

    let input_size = input_size as f32;
    let (ow, oh) = (orig_width.max(1) as f32, orig_height.max(1) as f32);
    let scale_w = ow / input_size;
    let scale_h = oh / input_size;

    let mut detections = Vec::new();
    for i in 0..candidates {
        let (best_class, best_score) = (0..num_classes)
            .map(|c| (c, view[[BOX_FEATURES + c, i]]))
            .fold((0usize, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if best_score < confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (view[[0, i]], view[[1, i]], view[[2, i]], view[[3, i]]);

        let x = (((cx - w / 2.0) * scale_w) / ow).clamp(0.0, 1.0);
        let y = (((cy - h / 2.0) * scale_h) / oh).clamp(0.0, 1.0);
        let width = ((w * scale_w) / ow).min(1.0 - x).max(0.0);
        let height = ((h * scale_h) / oh).min(1.0 - y).max(0.0);

        detections.push(Detection {
            x,
            y,
            width,
            height,
            class_id: best_class,
            confidence: best_score.clamp(0.0, 1.0),
        });
    }

    Ok(detections)
}

/// Greedy per-class NMS, highest confidence first.
pub fn non_maximum_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let overlaps = keep
            .iter()
            .any(|k| k.class_id == candidate.class_id && iou(k, &candidate) > iou_threshold);
        if !overlaps {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection over Union of two boxes.
pub fn iou(a: &Detection, b: &Detection) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
