//! REST API request/response data transfer objects

use serde::{Deserialize, Serialize};

use crate::service::DetectedFace;
use crate::utils::math::round_to;

/// Decimal places kept for confidences and box corners
const JSON_DECIMALS: i32 = 5;

/// One detection, as `{"name", "class", "confidence", "box"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionDto {
    pub name: String,
    pub class: usize,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: BoxDto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxDto {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl From<&DetectedFace> for DetectionDto {
    fn from(face: &DetectedFace) -> Self {
        Self {
            name: face.name.clone(),
            class: face.class_id,
            confidence: round_to(face.confidence, JSON_DECIMALS),
            bbox: BoxDto {
                x1: round_to(face.x1, JSON_DECIMALS),
                y1: round_to(face.y1, JSON_DECIMALS),
                x2: round_to(face.x2, JSON_DECIMALS),
                y2: round_to(face.y2, JSON_DECIMALS),
            },
        }
    }
}

/// Gender response, `{"Gender": "Male"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenderResponse {
    #[serde(rename = "Gender")]
    pub gender: String,
}

/// Age response, `{"Age": "25-32"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeResponse {
    #[serde(rename = "Age")]
    pub age: String,
}

/// Health check response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthcheck: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            healthcheck: "I'm ok!".to_string(),
        }
    }
}

/// Error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            code: code.to_string(),
        }
    }
}
