//! Service layer types

use crate::engine::{AgeBucket, Gender};

/// Face detection result
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub faces: Vec<DetectedFace>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    pub name: String,
    pub class_id: usize,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Gender of the first detected face
#[derive(Debug, Clone)]
pub struct GenderResult {
    pub gender: Gender,
    pub face: DetectedFace,
}

/// Age bucket of the first detected face
#[derive(Debug, Clone)]
pub struct AgeResult {
    pub age: AgeBucket,
    pub face: DetectedFace,
}
