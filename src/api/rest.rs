//! Axum REST API handlers

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{any, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::engine::preprocess::MAX_IMAGE_SIZE;
use crate::engine::{DetectOptions, InferenceBackend};
use crate::error::FaceError;
use crate::service::{DetectedFace, FaceService};

use super::docs::{docs_handler, openapi_handler};
use super::dto::*;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Application state shared across handlers
pub struct AppState<B: InferenceBackend> {
    pub service: Arc<FaceService<B>>,
    pub max_upload_bytes: usize,
}

/// Create the REST API router
pub fn create_rest_router<B: InferenceBackend>(state: Arc<AppState<B>>) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/", any(redirect_handler))
        .route("/docs", get(docs_handler))
        .route("/openapi.json", get(openapi_handler))
        .route("/healthcheck", get(healthcheck_handler))
        .route("/face_detection_to_json", post(detect_handler::<B>))
        .route("/gender_classification_to_json", post(gender_handler::<B>))
        .route("/age_classification_to_json", post(age_handler::<B>))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Redirect to the API docs
async fn redirect_handler() -> impl IntoResponse {
    (StatusCode::FOUND, [(header::LOCATION, "/docs")])
}

/// Simple health check of the service
async fn healthcheck_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

/// Uploaded image plus any plain form fields sent with it
struct Upload {
    image: Vec<u8>,
    fields: HashMap<String, String>,
}

/// Read a multipart upload; the image goes in `file` (or `image`)
async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut image: Option<Vec<u8>> = None;
    let mut fields = HashMap::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&e.to_string(), "MULTIPART_ERROR")))
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" | "image" => {
                image = Some(field.bytes().await.map_err(|e| {
                    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&e.to_string(), "READ_ERROR")))
                })?.to_vec());
            }
            _ => {
                let text = field.text().await.unwrap_or_default();
                fields.insert(name, text);
            }
        }
    }

    let image = image.ok_or_else(|| {
        (StatusCode::BAD_REQUEST, Json(ErrorResponse::new("Missing file field", "MISSING_FILE")))
    })?;

    Ok(Upload { image, fields })
}

fn invalid_option(message: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&message, "INVALID_OPTION")))
}

/// Apply optional per-request detector overrides
fn parse_detect_options(
    defaults: DetectOptions,
    fields: &HashMap<String, String>,
) -> Result<DetectOptions, ApiError> {
    let mut options = defaults;

    if let Some(text) = fields.get("confidence_threshold") {
        let value: f32 = text.trim().parse().map_err(|_| {
            invalid_option(format!("confidence_threshold is not a number: {:?}", text))
        })?;
        if !(0.0..=1.0).contains(&value) {
            return Err(invalid_option(format!(
                "confidence_threshold must be within [0, 1], got {}",
                value
            )));
        }
        options.confidence_threshold = value;
    }

    if let Some(text) = fields.get("image_size") {
        let value: u32 = text.trim().parse().map_err(|_| {
            invalid_option(format!("image_size is not a positive integer: {:?}", text))
        })?;
        if value == 0 || value > MAX_IMAGE_SIZE {
            return Err(invalid_option(format!(
                "image_size must be within [1, {}], got {}",
                MAX_IMAGE_SIZE, value
            )));
        }
        options.image_size = value;
    }

    if let Some(text) = fields.get("augment") {
        options.augment = match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => return Err(invalid_option(format!("augment is not a boolean: {:?}", text))),
        };
    }

    Ok(options)
}

/// Map a service failure onto a status code and error body
fn face_error(context: &str, e: FaceError) -> ApiError {
    let status = match &e {
        FaceError::Decode(_) => StatusCode::BAD_REQUEST,
        FaceError::NoFaceDetected | FaceError::InvalidFaceRegion { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        FaceError::Inference(_) | FaceError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!("{} failed: {}", context, e);
    } else {
        warn!("{} rejected: {}", context, e);
    }

    (status, Json(ErrorResponse::new(&e.to_string(), e.code())))
}

fn log_face(attribute: &str, label: &str, face: &DetectedFace) {
    debug!(
        "{} {} for face ({:.1}, {:.1}, {:.1}, {:.1}) conf={:.3}",
        attribute, label, face.x1, face.y1, face.x2, face.y2, face.confidence
    );
}

/// Detect faces on an image
async fn detect_handler<B: InferenceBackend>(
    State(state): State<Arc<AppState<B>>>,
    multipart: Multipart,
) -> Result<Json<Vec<DetectionDto>>, ApiError> {
    let upload = read_upload(multipart).await?;
    let options = parse_detect_options(state.service.default_options(), &upload.fields)?;

    let result = state
        .service
        .detect(upload.image, Some(options))
        .await
        .map_err(|e| face_error("Detection", e))?;

    Ok(Json(result.faces.iter().map(DetectionDto::from).collect()))
}

/// Classify the gender of the most confident face
async fn gender_handler<B: InferenceBackend>(
    State(state): State<Arc<AppState<B>>>,
    multipart: Multipart,
) -> Result<Json<GenderResponse>, ApiError> {
    let upload = read_upload(multipart).await?;

    let result = state
        .service
        .classify_gender(upload.image)
        .await
        .map_err(|e| face_error("Gender classification", e))?;
    log_face("Gender", result.gender.as_str(), &result.face);

    Ok(Json(GenderResponse {
        gender: result.gender.as_str().to_string(),
    }))
}

/// Classify the age bucket of the most confident face
async fn age_handler<B: InferenceBackend>(
    State(state): State<Arc<AppState<B>>>,
    multipart: Multipart,
) -> Result<Json<AgeResponse>, ApiError> {
    let upload = read_upload(multipart).await?;

    let result = state
        .service
        .classify_age(upload.image)
        .await
        .map_err(|e| face_error("Age classification", e))?;
    log_face("Age", result.age.as_str(), &result.face);

    Ok(Json(AgeResponse {
        age: result.age.as_str().to_string(),
    }))
}
