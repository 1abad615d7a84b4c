//! Per-frame object detection.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`FrameDetector`] | Detects objects in one decoded frame |
//! | [`YoloDetector`] | YOLOv8 ONNX implementation (CUDA / CoreML / CPU) |
//! | [`postprocess`] | Output decoding and NMS, model-agnostic |

pub mod object_detector;
pub mod postprocess;

use image::DynamicImage;

pub use object_detector::{is_model_available_at, YoloDetector};

use crate::error::MediaResult;

/// COCO class names (80 classes), indexed by YOLO class id.
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

/// Class name for a COCO id; unknown ids map to `class_<id>`.
pub fn class_name(class_id: usize) -> String {
    COCO_CLASSES
        .get(class_id)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("class_{}", class_id))
}

/// A detected object instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Bounding box in normalized coordinates [0, 1]
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub class_id: usize,
    /// Detection confidence [0, 1]
    pub confidence: f32,
}

impl Detection {
    pub fn label(&self) -> String {
        class_name(self.class_id)
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// Configuration for object detection.
#[derive(Debug, Clone)]
pub struct ObjectDetectorConfig {
    /// Path to ONNX model file
    pub model_path: String,
    /// Confidence threshold for detections
    pub confidence_threshold: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Input image size (model expects square input)
    pub input_size: u32,
}

impl Default for ObjectDetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "models/object_detection/yolov8n.onnx".to_string(),
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
            input_size: 640,
        }
    }
}

/// Detects objects in a single frame.
///
/// Implementations are blocking; call from `spawn_blocking`.
pub trait FrameDetector: Send + Sync {
    fn detect(&self, frame: &DynamicImage) -> MediaResult<Vec<Detection>>;
}
