//! HTTP adapters. Handlers extract the request, call one service method and
//! shape the envelope; every rule lives in the services behind them.

use axum::{
    Json,
    extract::{FromRequest, Request},
};
use serde::Deserialize;
use serde_json::Value;
use utoipa::IntoParams;

use crate::error::ApiError;

pub mod auth;
pub mod resources;
pub mod uploads;

/// JsonBody
///
/// A JSON request body kept as a raw value for the validator. Malformed or
/// missing JSON is a 400 in the standard error envelope.
#[derive(Debug, Clone)]
pub struct JsonBody(pub Value);

impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<Value>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(ApiError::validation(rejection.body_text())),
        }
    }
}

/// ListParams
///
/// Query parameters shared by every collection endpoint. Kind-specific
/// filters (`cause`, `position`, `type`, `location`...) are accepted alongside.
#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// 1-based page number (default 1).
    pub page: Option<u32>,
    /// Page size (default 10, at most 100).
    pub limit: Option<u32>,
    pub sort_by: Option<String>,
    /// `asc` or `desc`.
    pub sort_order: Option<String>,
    /// Case-insensitive substring search over the kind's text fields.
    pub search: Option<String>,
    /// Inclusive lower bound on `created_at` (date or RFC 3339).
    pub date_from: Option<String>,
    /// Inclusive upper bound on `created_at` (date or RFC 3339).
    pub date_to: Option<String>,
}
