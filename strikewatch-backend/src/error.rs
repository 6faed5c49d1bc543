use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::render::RenderError;

/// Errors surfaced by the status pipeline.
#[derive(Debug, Error)]
pub enum StatusError {
  #[error("invalid address `{input}`: {reason}")]
  InvalidAddress { input: String, reason: &'static str },

  #[error("query to {address} failed: {message}")]
  QueryFailed {
    address: String,
    attempts: u32,
    message: String,
  },

  #[error("image rendering failed: {0}")]
  RenderFailed(#[from] RenderError),

  #[error("{dependency} is unavailable: {reason}")]
  DependencyUnavailable {
    dependency: &'static str,
    reason: String,
  },

  #[error("delivery to channel {target} failed: {message}")]
  DeliveryFailed { target: u64, message: String },

  #[error(transparent)]
  Database(#[from] strikewatch_db::DbError),
}

impl StatusError {
  pub(crate) fn invalid_address(input: &str, reason: &'static str) -> Self {
    StatusError::InvalidAddress {
      input: input.to_string(),
      reason,
    }
  }

  /// User-facing text for a command reply, with hints where they help.
  pub fn user_message(&self) -> String {
    match self {
      StatusError::InvalidAddress { .. } => format!(
        "❌ {}\nUsage: `host`, `host:port`, `[ipv6]:port` (default port 27015)",
        self
      ),
      StatusError::QueryFailed { .. } => format!(
        "❌ {}\nPossible causes:\n- the server is offline or restarting\n- the address or port is wrong\n- a firewall blocks UDP queries\n- the server has queries disabled",
        self
      ),
      StatusError::Database(_) => "❌ Could not access saved settings. Please try again later.".to_string(),
      _ => format!("❌ {}", self),
    }
  }
}

/// API error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

impl ErrorResponse {
  pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: Some(details.into()),
    }
  }
}

/// HTTP-facing error type
#[derive(Debug)]
pub enum AppError {
  DatabaseError(strikewatch_db::DbError),
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    match self {
      AppError::DatabaseError(db_err) => {
        // Don't expose internal database errors
        tracing::error!(?db_err, "Database error occurred");
        let error_response = ErrorResponse::with_details(
          "An internal error occurred. Please try again later.",
          "storage unavailable",
        );
        (StatusCode::INTERNAL_SERVER_ERROR, Json(error_response)).into_response()
      }
    }
  }
}

impl From<strikewatch_db::DbError> for AppError {
  fn from(err: strikewatch_db::DbError) -> Self {
    AppError::DatabaseError(err)
  }
}
