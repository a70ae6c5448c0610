// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;

use super::{ApiError, ErrorCode};

#[test]
fn wire_strings_are_stable() {
    assert_eq!(ErrorCode::RefInvalid.as_str(), "ref/invalid");
    assert_eq!(ErrorCode::RefNotFound.as_str(), "ref/not_found");
    assert_eq!(ErrorCode::RefConflict.as_str(), "ref/conflict");
    assert_eq!(ErrorCode::IoUnavailable.as_str(), "io/unavailable");
    assert_eq!(ErrorCode::IoTimeout.as_str(), "io/timeout");
}

#[test]
fn status_mapping() {
    assert_eq!(ErrorCode::RefInvalid.http_status(), StatusCode::BAD_REQUEST);
    assert_eq!(ErrorCode::RefNotFound.http_status(), StatusCode::NOT_FOUND);
    assert_eq!(ErrorCode::RefConflict.http_status(), StatusCode::CONFLICT);
    assert_eq!(ErrorCode::IoUnavailable.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(ErrorCode::IoTimeout.http_status(), StatusCode::GATEWAY_TIMEOUT);
}

#[test]
fn display_includes_code_and_message() {
    let err = ApiError::invalid("bad pane ref");
    assert_eq!(err.to_string(), "ref/invalid: bad pane ref");
}
