// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Unified error codes shared across all API surfaces.
///
/// The wire strings are stable; clients match on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    RefInvalid,
    RefNotFound,
    RefConflict,
    IoUnavailable,
    IoTimeout,
}

impl ErrorCode {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::RefInvalid => StatusCode::BAD_REQUEST,
            Self::RefNotFound => StatusCode::NOT_FOUND,
            Self::RefConflict => StatusCode::CONFLICT,
            Self::IoUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IoTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RefInvalid => "ref/invalid",
            Self::RefNotFound => "ref/not_found",
            Self::RefConflict => "ref/conflict",
            Self::IoUnavailable => "io/unavailable",
            Self::IoTimeout => "io/timeout",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// API error carrying a stable code and a human-readable message.
///
/// Serializes as `{"error": {"code": "...", "message": "..."}}`.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RefInvalid, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": { "code": self.code.as_str(), "message": self.message }
        });
        (self.code.http_status(), Json(body)).into_response()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
