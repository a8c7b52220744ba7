//! Error types and axum `IntoResponse` implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Missing or mismatching webhook signature.
  #[error("invalid signature")]
  BadSignature,

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The event could not be recorded; the provider should redeliver it.
  #[error("temporarily unavailable: {0}")]
  Unavailable(String),
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = match &self {
      Error::BadSignature | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
      Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
