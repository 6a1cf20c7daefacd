//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// One event of an ingestion batch that could not be accepted.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
  /// Position of the event in the request body.
  pub index:  usize,
  pub reason: String,
}

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("{} malformed event(s)", .0.len())]
  Rejected(Vec<Rejection>),

  /// The ledger's stored state contradicts its own invariants.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<strata_core::Error> for ApiError {
  fn from(err: strata_core::Error) -> Self {
    use strata_core::Error as E;
    match err {
      E::MalformedEvent { .. } | E::InvalidSpine(_) => Self::BadRequest(err.to_string()),
      E::WindowCoverageGap { .. } | E::NonOverlapViolation { .. } => {
        Self::Conflict(err.to_string())
      }
      E::Store(inner) => Self::Store(inner),
      E::Serialization(_) | E::Task(_) => Self::Store(Box::new(err)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, body) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, json!({ "error": m })),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!({ "error": m })),
      ApiError::Rejected(r) => (
        StatusCode::BAD_REQUEST,
        json!({ "error": self.to_string(), "rejected": r }),
      ),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, json!({ "error": m })),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": e.to_string() }))
      }
    };
    (status, Json(body)).into_response()
  }
}
