//! Inference engine module
//!
//! Provides OpenVINO-based inference with:
//! - Models loaded once at startup and shared read-only
//! - YOLOv8 face detection with optional test-time augmentation
//! - Gender and age classification of detected faces

pub mod pool;
pub mod detector;
pub mod attribute;
pub mod preprocess;

#[cfg(test)]
pub mod mock;

pub use pool::{InferenceBackend, ModelPool, ModelType, OutputTensor};
pub use detector::{DetectOptions, FaceBox, FaceDetector};
pub use attribute::{AgeBucket, AttributeClassifier, Gender};
