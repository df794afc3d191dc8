//! API documentation: OpenAPI document and a Swagger UI page

use axum::response::{Html, Json};
use serde_json::{json, Value};

use crate::engine::preprocess::MAX_IMAGE_SIZE;

const SWAGGER_PAGE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>Face attribute API - docs</title>
  <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.ui = SwaggerUIBundle({ url: "/openapi.json", dom_id: "#swagger-ui" });
  </script>
</body>
</html>
"##;

/// Swagger UI page
pub async fn docs_handler() -> Html<&'static str> {
    Html(SWAGGER_PAGE)
}

/// OpenAPI document
pub async fn openapi_handler() -> Json<Value> {
    Json(openapi_document())
}

fn upload_body(extra: Value) -> Value {
    let mut properties = json!({
        "file": { "type": "string", "format": "binary", "description": "Image file (PNG, JPEG, WebP, ...)" }
    });
    if let (Some(props), Some(extra)) = (properties.as_object_mut(), extra.as_object()) {
        props.extend(extra.clone());
    }

    json!({
        "required": true,
        "content": {
            "multipart/form-data": {
                "schema": {
                    "type": "object",
                    "required": ["file"],
                    "properties": properties
                }
            }
        }
    })
}

fn error_responses() -> Value {
    let error = json!({ "$ref": "#/components/schemas/Error" });
    json!({
        "400": { "description": "Bad upload or undecodable image", "content": { "application/json": { "schema": error } } },
        "422": { "description": "No usable face in the image", "content": { "application/json": { "schema": error } } },
        "500": { "description": "Inference failure", "content": { "application/json": { "schema": error } } }
    })
}

fn with_errors(ok: Value) -> Value {
    let mut responses = error_responses();
    if let Some(map) = responses.as_object_mut() {
        map.insert("200".to_string(), ok);
    }
    responses
}

pub fn openapi_document() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Face attribute API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Face detection with gender and age classification"
        },
        "paths": {
            "/healthcheck": {
                "get": {
                    "summary": "Simple health check of the service",
                    "responses": {
                        "200": {
                            "description": "Service is up",
                            "content": { "application/json": { "example": { "healthcheck": "I'm ok!" } } }
                        }
                    }
                }
            },
            "/face_detection_to_json": {
                "post": {
                    "summary": "Detect faces on an image",
                    "requestBody": upload_body(json!({
                        "confidence_threshold": { "type": "number", "minimum": 0, "maximum": 1, "default": 0.5 },
                        "image_size": { "type": "integer", "minimum": 1, "maximum": MAX_IMAGE_SIZE, "default": 640 },
                        "augment": { "type": "boolean", "default": false }
                    })),
                    "responses": with_errors(json!({
                        "description": "Detections, highest confidence first",
                        "content": { "application/json": { "schema": {
                            "type": "array",
                            "items": { "$ref": "#/components/schemas/Detection" }
                        } } }
                    }))
                }
            },
            "/gender_classification_to_json": {
                "post": {
                    "summary": "Classify the gender of the most confident face",
                    "requestBody": upload_body(json!({})),
                    "responses": with_errors(json!({
                        "description": "Gender label",
                        "content": { "application/json": { "schema": {
                            "type": "object",
                            "properties": { "Gender": { "type": "string", "enum": ["Male", "Female"] } }
                        } } }
                    }))
                }
            },
            "/age_classification_to_json": {
                "post": {
                    "summary": "Classify the age bucket of the most confident face",
                    "requestBody": upload_body(json!({})),
                    "responses": with_errors(json!({
                        "description": "Age bucket",
                        "content": { "application/json": { "schema": {
                            "type": "object",
                            "properties": { "Age": {
                                "type": "string",
                                "enum": ["0-2", "4-6", "8-12", "15-20", "25-32", "38-43", "48-53", "60-100"]
                            } }
                        } } }
                    }))
                }
            }
        },
        "components": {
            "schemas": {
                "Detection": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "class": { "type": "integer" },
                        "confidence": { "type": "number" },
                        "box": {
                            "type": "object",
                            "properties": {
                                "x1": { "type": "number" },
                                "y1": { "type": "number" },
                                "x2": { "type": "number" },
                                "y2": { "type": "number" }
                            }
                        }
                    }
                },
                "Error": {
                    "type": "object",
                    "properties": {
                        "error": { "type": "string" },
                        "code": { "type": "string" }
                    }
                }
            }
        }
    })
}
