//! YOLOv8 Face Detector
//!
//! Letterboxes the image, runs the detection head and turns its raw
//! `[1, 4 + classes, anchors]` output into boxes in original image pixels.

use std::sync::Arc;

use anyhow::{bail, Result};
use image::RgbImage;

use super::pool::{InferenceBackend, ModelType, OutputTensor};
use super::preprocess::{check_image_size, letterbox, ResizeInfo};
use crate::config::DetectorConfig;

/// Extra passes run when augmentation is requested: (content scale, flip)
const AUGMENT_PASSES: [(f32, bool); 3] = [(1.0, false), (0.83, true), (0.67, false)];

/// Face detection result
#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
}

impl FaceBox {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection over union
    pub fn iou(&self, other: &FaceBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Mirror the box horizontally inside an image of the given width
    fn unflip(&mut self, width: u32) {
        let w = width as f32;
        let (x1, x2) = (w - self.x2, w - self.x1);
        self.x1 = x1;
        self.x2 = x2;
    }
}

/// Per-call detector settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectOptions {
    pub image_size: u32,
    pub confidence_threshold: f32,
    pub augment: bool,
}

impl From<&DetectorConfig> for DetectOptions {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            image_size: config.image_size,
            confidence_threshold: config.confidence_threshold,
            augment: config.augment,
        }
    }
}

/// YOLOv8 Face Detector
pub struct FaceDetector<B: InferenceBackend> {
    backend: Arc<B>,
    iou_threshold: f32,
    max_detections: usize,
    class_names: Vec<String>,
}

impl<B: InferenceBackend> FaceDetector<B> {
    pub fn new(backend: Arc<B>, config: &DetectorConfig) -> Self {
        Self {
            backend,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
            class_names: config.class_names.clone(),
        }
    }

    /// Label for a class index
    pub fn class_name(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }

    /// Detect faces in a decoded image.
    ///
    /// Returned boxes are in NMS order (highest confidence first).
    pub fn detect(&self, image: &RgbImage, options: &DetectOptions) -> Result<Vec<FaceBox>> {
        let size = check_image_size(options.image_size);
        let passes: &[(f32, bool)] = if options.augment {
            &AUGMENT_PASSES
        } else {
            &AUGMENT_PASSES[..1]
        };

        let mut candidates = Vec::new();
        for &(content_scale, flip) in passes {
            let flipped;
            let source = if flip {
                flipped = image::imageops::flip_horizontal(image);
                &flipped
            } else {
                image
            };

            let (input, resize_info) = letterbox(source, size, content_scale);
            let output = self.backend.infer(ModelType::Detector, &input)?;
            let mut boxes = decode_output(&output, &resize_info, options.confidence_threshold)?;

            if flip {
                boxes.iter_mut().for_each(|b| b.unflip(image.width()));
            }

            tracing::debug!(
                "Pass scale={} flip={} produced {} candidates",
                content_scale,
                flip,
                boxes.len()
            );
            candidates.extend(boxes);
        }

        let detections = nms(candidates, self.iou_threshold, self.max_detections);
        tracing::debug!("Detected {} faces after NMS", detections.len());

        Ok(detections)
    }
}

/// Decode a YOLOv8 detection head.
///
/// Accepts `[1, features, anchors]` and the transposed `[1, anchors, features]`
/// layout, where `features = 4 + classes`. The smaller axis is the feature axis.
pub fn decode_output(
    output: &OutputTensor,
    resize_info: &ResizeInfo,
    confidence_threshold: f32,
) -> Result<Vec<FaceBox>> {
    let (a, b) = match output.shape.as_slice() {
        [1, a, b] => (*a, *b),
        other => bail!("Unexpected detector output shape {:?}", other),
    };

    let features_first = a <= b;
    let (num_features, num_anchors) = if features_first { (a, b) } else { (b, a) };

    if num_features < 5 {
        bail!("Detector output has {} features, need at least 5", num_features);
    }
    if output.data.len() < num_features * num_anchors {
        bail!(
            "Detector output holds {} values, shape {:?} needs {}",
            output.data.len(),
            output.shape,
            num_features * num_anchors
        );
    }

    let value = |feature: usize, anchor: usize| -> f32 {
        if features_first {
            output.data[feature * num_anchors + anchor]
        } else {
            output.data[anchor * num_features + feature]
        }
    };

    let max_x = resize_info.original_width as f32;
    let max_y = resize_info.original_height as f32;
    let mut boxes = Vec::new();

    for anchor in 0..num_anchors {
        let (class_id, score) = (4..num_features)
            .map(|f| (f - 4, value(f, anchor)))
            .fold((0usize, f32::NEG_INFINITY), |best, (idx, score)| {
                if score > best.1 {
                    (idx, score)
                } else {
                    best
                }
            });

        if !(score > confidence_threshold) {
            continue;
        }

        let (cx, cy, w, h) = (
            value(0, anchor),
            value(1, anchor),
            value(2, anchor),
            value(3, anchor),
        );
        if !(w > 0.0 && h > 0.0) {
            continue;
        }

        let (x1, y1) = resize_info.to_original(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = resize_info.to_original(cx + w / 2.0, cy + h / 2.0);

        boxes.push(FaceBox {
            x1: x1.clamp(0.0, max_x),
            y1: y1.clamp(0.0, max_y),
            x2: x2.clamp(0.0, max_x),
            y2: y2.clamp(0.0, max_y),
            confidence: score,
            class_id,
        });
    }

    Ok(boxes)
}

/// Class-aware non-maximum suppression, keeping at most `max_detections`
pub fn nms(mut boxes: Vec<FaceBox>, iou_threshold: f32, max_detections: usize) -> Vec<FaceBox> {
    // stable, so equal scores keep model order
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    let mut suppressed = vec![false; boxes.len()];

    for i in 0..boxes.len() {
        if keep.len() >= max_detections {
            break;
        }
        if suppressed[i] {
            continue;
        }

        keep.push(boxes[i].clone());

        for j in (i + 1)..boxes.len() {
            if suppressed[j] || boxes[j].class_id != boxes[i].class_id {
                continue;
            }
            if boxes[i].iou(&boxes[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockBackend;
    use image::Rgb;
    use parking_lot::Mutex;

    fn face(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> FaceBox {
        FaceBox { x1, y1, x2, y2, confidence, class_id: 0 }
    }

    /// `[1, 5, anchors]` head with one (cx, cy, w, h, score) per anchor,
    /// zero-padded so the anchor axis stays the longer one
    fn head(anchors: &[[f32; 5]]) -> OutputTensor {
        let n = anchors.len().max(8);
        let mut data = vec![0.0; 5 * n];
        for (i, a) in anchors.iter().enumerate() {
            for f in 0..5 {
                data[f * n + i] = a[f];
            }
        }
        OutputTensor::new(vec![1, 5, n], data)
    }

    fn identity(size: u32) -> ResizeInfo {
        ResizeInfo::new((size, size), size, 1.0)
    }

    fn config() -> DetectorConfig {
        DetectorConfig {
            image_size: 64,
            ..DetectorConfig::default()
        }
    }

    #[test]
    fn test_iou_calculation() {
        let a = face(0.0, 0.0, 10.0, 10.0, 0.9);
        let b = face(5.0, 5.0, 15.0, 15.0, 0.8);

        // Intersection: 25, union: 175
        assert!((a.iou(&b) - 25.0 / 175.0).abs() < 1e-6);
        assert_eq!(a.iou(&face(20.0, 20.0, 30.0, 30.0, 0.1)), 0.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_filters_by_confidence() {
        let output = head(&[
            [32.0, 32.0, 10.0, 20.0, 0.9],
            [10.0, 10.0, 4.0, 4.0, 0.3],
            [20.0, 20.0, 4.0, 4.0, 0.5],
        ]);
        let boxes = decode_output(&output, &identity(64), 0.5).unwrap();

        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0], face(27.0, 22.0, 37.0, 42.0, 0.9));
    }

    #[test]
    fn test_decode_transposed_layout() {
        // [1, anchors, features] with more anchors than features
        let mut data = vec![0.0; 8 * 5];
        data[3 * 5..4 * 5].copy_from_slice(&[16.0, 16.0, 8.0, 8.0, 0.8]);
        let output = OutputTensor::new(vec![1, 8, 5], data);

        let boxes = decode_output(&output, &identity(64), 0.5).unwrap();
        assert_eq!(boxes, vec![face(12.0, 12.0, 20.0, 20.0, 0.8)]);
    }

    #[test]
    fn test_decode_picks_best_class() {
        // two classes: features = 6
        let n = 8;
        let mut data = vec![0.0; 6 * n];
        let anchor = [30.0, 30.0, 10.0, 10.0, 0.2, 0.7];
        for f in 0..6 {
            data[f * n] = anchor[f];
        }
        let output = OutputTensor::new(vec![1, 6, n], data);

        let boxes = decode_output(&output, &identity(64), 0.5).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].class_id, 1);
        assert!((boxes[0].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_decode_maps_back_and_clips() {
        // 128x64 image letterboxed into 64: scale 0.5, offset_y 16
        let info = ResizeInfo::new((128, 64), 64, 1.0);
        let output = head(&[[4.0, 32.0, 16.0, 8.0, 0.9]]);

        let boxes = decode_output(&output, &info, 0.5).unwrap();
        assert_eq!(boxes.len(), 1);
        let b = &boxes[0];
        assert_eq!(b.x1, 0.0); // (-4 / 0.5) clipped
        assert!((b.x2 - 24.0).abs() < 1e-4);
        assert!((b.y1 - 24.0).abs() < 1e-4);
        assert!((b.y2 - 40.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        let info = identity(64);
        assert!(decode_output(&OutputTensor::new(vec![5, 8], vec![0.0; 40]), &info, 0.5).is_err());
        assert!(decode_output(&OutputTensor::new(vec![1, 4, 8], vec![0.0; 32]), &info, 0.5).is_err());
        assert!(decode_output(&OutputTensor::new(vec![1, 5, 8], vec![0.0; 10]), &info, 0.5).is_err());
    }

    #[test]
    fn test_nms_suppresses_overlaps() {
        let boxes = vec![
            face(0.0, 0.0, 10.0, 10.0, 0.8),
            face(1.0, 1.0, 10.0, 10.0, 0.9),
            face(50.0, 50.0, 60.0, 60.0, 0.6),
        ];
        let kept = nms(boxes, 0.7, 300);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.6);
    }

    #[test]
    fn test_nms_is_class_aware() {
        let mut other = face(0.0, 0.0, 10.0, 10.0, 0.8);
        other.class_id = 1;
        let kept = nms(vec![face(0.0, 0.0, 10.0, 10.0, 0.9), other], 0.5, 300);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_nms_max_detections() {
        let boxes = (0..10)
            .map(|i| face(i as f32 * 20.0, 0.0, i as f32 * 20.0 + 10.0, 10.0, 0.5 + i as f32 * 0.01))
            .collect();
        let kept = nms(boxes, 0.7, 3);
        assert_eq!(kept.len(), 3);
        assert!((kept[0].confidence - 0.59).abs() < 1e-6);
    }

    #[test]
    fn test_unflip() {
        let mut b = face(10.0, 0.0, 20.0, 5.0, 0.9);
        b.unflip(100);
        assert_eq!((b.x1, b.x2), (80.0, 90.0));
    }

    #[test]
    fn test_detect_single_pass() {
        let backend = Arc::new(MockBackend::with_detections(head(&[[32.0, 32.0, 20.0, 20.0, 0.95]])));
        let detector = FaceDetector::new(backend.clone(), &config());
        let image = RgbImage::from_pixel(64, 64, Rgb([128, 128, 128]));

        let options = DetectOptions::from(&config());
        let faces = detector.detect(&image, &options).unwrap();

        assert_eq!(faces, vec![face(22.0, 22.0, 42.0, 42.0, 0.95)]);
        assert_eq!(backend.calls(), vec![(ModelType::Detector, vec![1, 3, 64, 64])]);
    }

    #[test]
    fn test_detect_rounds_image_size() {
        let backend = Arc::new(MockBackend::with_detections(head(&[])));
        let detector = FaceDetector::new(backend.clone(), &config());
        let image = RgbImage::new(10, 10);

        let options = DetectOptions { image_size: 50, confidence_threshold: 0.5, augment: false };
        assert!(detector.detect(&image, &options).unwrap().is_empty());
        assert_eq!(backend.calls(), vec![(ModelType::Detector, vec![1, 3, 64, 64])]);
    }

    #[test]
    fn test_detect_augment_merges_passes() {
        // every pass reports the same face; the flipped pass mirrors it back
        let seen = Arc::new(Mutex::new(0usize));
        let counter = seen.clone();
        let backend = Arc::new(MockBackend::new(move |model, _input| {
            assert_eq!(model, ModelType::Detector);
            let mut n = counter.lock();
            *n += 1;
            let score = 0.9 - *n as f32 * 0.1;
            Ok(head(&[[32.0, 32.0, 20.0, 20.0, score]]))
        }));
        let config = DetectorConfig {
            iou_threshold: 0.4,
            ..config()
        };
        let detector = FaceDetector::new(backend.clone(), &config);
        let image = RgbImage::new(64, 64);

        let options = DetectOptions { image_size: 64, confidence_threshold: 0.5, augment: true };
        let faces = detector.detect(&image, &options).unwrap();

        assert_eq!(*seen.lock(), 3);
        // the three boxes overlap around the center, NMS keeps the first pass
        assert_eq!(faces.len(), 1);
        assert!((faces[0].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_class_name_fallback() {
        let backend = Arc::new(MockBackend::with_detections(head(&[])));
        let detector = FaceDetector::new(backend, &config());
        assert_eq!(detector.class_name(0), "face");
        assert_eq!(detector.class_name(3), "class_3");
    }
}
