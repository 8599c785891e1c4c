use axum::{
    Json,
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::{config::AppConfig, error::ErrorDetail};

/// ApiSuccess
///
/// Builder for the uniform success envelope:
/// `{ "success": true, "message"?: ..., <domain key>: ... }`.
#[derive(Debug)]
pub struct ApiSuccess {
    status: StatusCode,
    body: Map<String, Value>,
    failure: Option<String>,
}

impl ApiSuccess {
    pub fn ok() -> Self {
        Self::with_status(StatusCode::OK)
    }

    pub fn created() -> Self {
        Self::with_status(StatusCode::CREATED)
    }

    fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            body: Map::new(),
            failure: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.body
            .insert("message".to_string(), Value::String(message.into()));
        self
    }

    /// Adds `data` under the given domain key (`donor`, `events`, `session`...).
    pub fn with(mut self, key: &str, data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => {
                self.body.insert(key.to_string(), value);
            }
            Err(e) => self.failure = Some(format!("{key}: {e}")),
        }
        self
    }

    /// Flattens the fields of a serializable struct into the top level.
    pub fn merge(mut self, data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(Value::Object(fields)) => self.body.extend(fields),
            Ok(_) => self.failure = Some("merged value is not an object".to_string()),
            Err(e) => self.failure = Some(e.to_string()),
        }
        self
    }
}

impl IntoResponse for ApiSuccess {
    fn into_response(self) -> Response {
        if let Some(failure) = self.failure {
            tracing::error!("Failed to serialize response data: {}", failure);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": "Failed to serialize response data",
                })),
            )
                .into_response();
        }

        let mut body = self.body;
        body.insert("success".to_string(), Value::Bool(true));
        (self.status, Json(Value::Object(body))).into_response()
    }
}

/// expose_error_detail
///
/// Copies the provider detail carried by an error response into its `error`
/// field. Production responses pass through untouched; the detail has
/// already been logged by `ApiError::into_response`.
pub async fn expose_error_detail(
    State(config): State<AppConfig>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if config.is_production() {
        return response;
    }

    let Some(ErrorDetail(detail)) = response.extensions().get::<ErrorDetail>().cloned() else {
        return response;
    };

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to buffer error body: {}", e);
            parts.headers.remove(header::CONTENT_LENGTH);
            return Response::from_parts(parts, Body::empty());
        }
    };

    let mut envelope = match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(envelope)) => envelope,
        _ => return Response::from_parts(parts, Body::from(bytes)),
    };
    envelope.insert("error".to_string(), Value::String(detail));
    let envelope = Value::Object(envelope);

    parts.headers.remove(header::CONTENT_LENGTH);
    let body = envelope.to_string();
    Response::from_parts(parts, Body::from(body))
}
