//! Face Service - Core business logic
//!
//! Runs the fixed call chains behind each endpoint: decode then detect, or
//! decode, detect and classify the first face.

use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use tracing::info;

use crate::config::DetectorConfig;
use crate::engine::{
    preprocess::decode_image, AttributeClassifier, DetectOptions, FaceBox, FaceDetector,
    InferenceBackend,
};
use crate::error::{FaceError, FaceResult};

use super::types::*;

/// Face detection and attribute service
pub struct FaceService<B: InferenceBackend> {
    detector: Arc<FaceDetector<B>>,
    classifier: Arc<AttributeClassifier<B>>,
    defaults: DetectOptions,
}

impl<B: InferenceBackend> FaceService<B> {
    /// Create a new face service over loaded models
    pub fn new(backend: Arc<B>, config: &DetectorConfig) -> Self {
        Self {
            detector: Arc::new(FaceDetector::new(backend.clone(), config)),
            classifier: Arc::new(AttributeClassifier::new(backend)),
            defaults: DetectOptions::from(config),
        }
    }

    /// Detector settings used when a request does not override them
    pub fn default_options(&self) -> DetectOptions {
        self.defaults
    }

    /// Detect faces in an image
    pub async fn detect(
        &self,
        image_data: Vec<u8>,
        options: Option<DetectOptions>,
    ) -> FaceResult<DetectionResult> {
        let start = Instant::now();
        let options = options.unwrap_or(self.defaults);

        let detector = self.detector.clone();
        let faces = tokio::task::spawn_blocking(move || -> FaceResult<Vec<DetectedFace>> {
            let image = decode_image(&image_data)?;
            let boxes = detector.detect(&image, &options)?;
            Ok(boxes.iter().map(|b| to_detected(&detector, b)).collect())
        })
        .await??;

        let inference_time_ms = start.elapsed().as_millis() as u64;
        info!("Detected {} faces in {}ms", faces.len(), inference_time_ms);

        Ok(DetectionResult { faces })
    }

    /// Classify the gender of the first detected face
    pub async fn classify_gender(&self, image_data: Vec<u8>) -> FaceResult<GenderResult> {
        let start = Instant::now();

        let detector = self.detector.clone();
        let classifier = self.classifier.clone();
        let options = self.defaults;
        let (gender, face) = tokio::task::spawn_blocking(move || {
            let (image, face) = detect_first(&detector, &image_data, &options)?;
            let gender = classifier.classify_gender(&image, &face)?;
            Ok::<_, FaceError>((gender, to_detected(&detector, &face)))
        })
        .await??;

        let inference_time_ms = start.elapsed().as_millis() as u64;
        info!("Classified gender as {} in {}ms", gender.as_str(), inference_time_ms);

        Ok(GenderResult { gender, face })
    }

    /// Classify the age bucket of the first detected face
    pub async fn classify_age(&self, image_data: Vec<u8>) -> FaceResult<AgeResult> {
        let start = Instant::now();

        let detector = self.detector.clone();
        let classifier = self.classifier.clone();
        let options = self.defaults;
        let (age, face) = tokio::task::spawn_blocking(move || {
            let (image, face) = detect_first(&detector, &image_data, &options)?;
            let age = classifier.classify_age(&image, &face)?;
            Ok::<_, FaceError>((age, to_detected(&detector, &face)))
        })
        .await??;

        let inference_time_ms = start.elapsed().as_millis() as u64;
        info!("Classified age as {} in {}ms", age.as_str(), inference_time_ms);

        Ok(AgeResult { age, face })
    }
}

/// Decode and detect, keeping the first face in detector order
fn detect_first<B: InferenceBackend>(
    detector: &FaceDetector<B>,
    image_data: &[u8],
    options: &DetectOptions,
) -> FaceResult<(RgbImage, FaceBox)> {
    let image = decode_image(image_data)?;
    let mut faces = detector.detect(&image, options)?;

    if faces.is_empty() {
        return Err(FaceError::NoFaceDetected);
    }
    if faces.len() > 1 {
        tracing::debug!("{} faces detected, classifying the first", faces.len());
    }

    let face = faces.swap_remove(0);
    Ok((image, face))
}

fn to_detected<B: InferenceBackend>(detector: &FaceDetector<B>, face: &FaceBox) -> DetectedFace {
    DetectedFace {
        name: detector.class_name(face.class_id),
        class_id: face.class_id,
        confidence: face.confidence,
        x1: face.x1,
        y1: face.y1,
        x2: face.x2,
        y2: face.y2,
    }
}
