//! # Error Taxonomy
//!
//! Stable wire-level error codes, HTTP status mapping, and classification
//! predicates used across every protocol adapter.
//!
//! The central type is [`ErrorInfo`]: a coded error value that serializes
//! onto the wire unchanged and implements [`std::error::Error`] so it can
//! round-trip through unit execution. Units that fail with an uncategorized
//! error are wrapped as `EXECUTION_FAILED` at the dispatch boundary; units
//! that fail with an [`ErrorInfo`] (or a domain error converted into one)
//! keep their original code end to end.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Stable error code vocabulary. These strings are part of the wire
/// contract and must never change.
pub mod codes {
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const RESOURCE_NOT_FOUND: &str = "RESOURCE_NOT_FOUND";
    pub const UNIT_NOT_FOUND: &str = "UNIT_NOT_FOUND";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const EXECUTION_FAILED: &str = "EXECUTION_FAILED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const UNKNOWN: &str = "UNKNOWN";
}

/// Maps an error code to its HTTP status. Total: unknown codes map to 500.
pub fn http_status_for(code: &str) -> u16 {
    match code {
        codes::INVALID_REQUEST | codes::VALIDATION_FAILED => 400,
        codes::UNAUTHORIZED => 401,
        codes::RESOURCE_NOT_FOUND | codes::UNIT_NOT_FOUND | codes::NOT_FOUND => 404,
        codes::TIMEOUT => 408,
        codes::ALREADY_EXISTS => 409,
        codes::RATE_LIMITED => 429,
        codes::EXECUTION_FAILED | codes::INTERNAL_ERROR | codes::UNKNOWN => 500,
        _ => 500,
    }
}

/// Coded error value carried in [`Response.error`](crate::request::Response).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, message)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(codes::VALIDATION_FAILED, message)
    }

    pub fn unit_not_found(unit: &str) -> Self {
        Self::new(codes::UNIT_NOT_FOUND, format!("unit not found: {}", unit))
    }

    pub fn resource_not_found(uri: &str) -> Self {
        Self::new(
            codes::RESOURCE_NOT_FOUND,
            format!("resource not found: {}", uri),
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(codes::NOT_FOUND, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(codes::ALREADY_EXISTS, message)
    }

    pub fn timeout(after_ms: u64) -> Self {
        Self::new(
            codes::TIMEOUT,
            format!("execution deadline exceeded after {}ms", after_ms),
        )
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(codes::RATE_LIMITED, message)
    }

    /// Wraps an uncategorized unit failure. The original message is carried
    /// in `details.cause` so callers can still see the root failure.
    pub fn execution_failed(cause: impl Into<String>) -> Self {
        Self::new(codes::EXECUTION_FAILED, "unit execution failed")
            .with_details(json!({ "cause": cause.into() }))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, message)
    }

    pub fn http_status(&self) -> u16 {
        http_status_for(&self.code)
    }

    /// Domain sub-code carried in `details.code`, if any. Units that wrap a
    /// finer-grained failure (e.g. `MODEL_NOT_FOUND`) publish it there.
    fn sub_code(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|d| d.get("code"))
            .and_then(Value::as_str)
    }

    fn code_matches(&self, generic: &[&str], suffix: &str) -> bool {
        generic.contains(&self.code.as_str())
            || self.sub_code().is_some_and(|c| c.ends_with(suffix))
    }

    pub fn is_not_found(&self) -> bool {
        self.code_matches(
            &[codes::NOT_FOUND, codes::UNIT_NOT_FOUND, codes::RESOURCE_NOT_FOUND],
            "NOT_FOUND",
        )
    }

    pub fn is_timeout(&self) -> bool {
        self.code_matches(&[codes::TIMEOUT], "TIMEOUT")
    }

    pub fn is_rate_limited(&self) -> bool {
        self.code_matches(&[codes::RATE_LIMITED], "RATE_LIMITED")
    }

    pub fn is_already_exists(&self) -> bool {
        self.code_matches(&[codes::ALREADY_EXISTS], "ALREADY_EXISTS")
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorInfo {}

/// Failure returned by unit execution.
///
/// Dispatch treats the two variants differently: a [`UnitError::Coded`]
/// passes through untouched, preserving fine-grained codes like `NOT_FOUND`
/// or `VALIDATION_FAILED`; a [`UnitError::Raw`] is wrapped as
/// `EXECUTION_FAILED` with the original message in `details`.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error(transparent)]
    Coded(#[from] ErrorInfo),

    #[error("{0}")]
    Raw(String),
}

impl UnitError {
    pub fn raw(message: impl Into<String>) -> Self {
        Self::Raw(message.into())
    }

    /// Collapses into the wire-level [`ErrorInfo`] per the dispatch rules.
    pub fn into_error_info(self) -> ErrorInfo {
        match self {
            Self::Coded(info) => info,
            Self::Raw(message) => ErrorInfo::execution_failed(message),
        }
    }
}

impl From<serde_json::Error> for UnitError {
    fn from(err: serde_json::Error) -> Self {
        Self::Raw(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_total() {
        assert_eq!(http_status_for(codes::INVALID_REQUEST), 400);
        assert_eq!(http_status_for(codes::VALIDATION_FAILED), 400);
        assert_eq!(http_status_for(codes::UNAUTHORIZED), 401);
        assert_eq!(http_status_for(codes::UNIT_NOT_FOUND), 404);
        assert_eq!(http_status_for(codes::RESOURCE_NOT_FOUND), 404);
        assert_eq!(http_status_for(codes::NOT_FOUND), 404);
        assert_eq!(http_status_for(codes::TIMEOUT), 408);
        assert_eq!(http_status_for(codes::ALREADY_EXISTS), 409);
        assert_eq!(http_status_for(codes::RATE_LIMITED), 429);
        assert_eq!(http_status_for(codes::EXECUTION_FAILED), 500);
        assert_eq!(http_status_for(codes::INTERNAL_ERROR), 500);
        assert_eq!(http_status_for(codes::UNKNOWN), 500);
        // Unknown codes fall back to 500.
        assert_eq!(http_status_for("SOMETHING_ELSE"), 500);
        assert_eq!(http_status_for(""), 500);
    }

    #[test]
    fn raw_errors_wrap_as_execution_failed() {
        let info = UnitError::raw("disk on fire").into_error_info();
        assert_eq!(info.code, codes::EXECUTION_FAILED);
        assert_eq!(info.details.unwrap()["cause"], "disk on fire");
    }

    #[test]
    fn coded_errors_pass_through() {
        let original = ErrorInfo::not_found("model gone");
        let info = UnitError::from(original.clone()).into_error_info();
        assert_eq!(info, original);
    }

    #[test]
    fn predicates_check_generic_codes() {
        assert!(ErrorInfo::unit_not_found("x").is_not_found());
        assert!(ErrorInfo::resource_not_found("asms://y").is_not_found());
        assert!(ErrorInfo::timeout(50).is_timeout());
        assert!(ErrorInfo::rate_limited("slow down").is_rate_limited());
        assert!(ErrorInfo::already_exists("dup").is_already_exists());
        assert!(!ErrorInfo::internal("boom").is_not_found());
    }

    #[test]
    fn predicates_check_domain_sub_codes() {
        let err = ErrorInfo::execution_failed("lookup failed")
            .with_details(json!({ "code": "MODEL_NOT_FOUND" }));
        assert!(err.is_not_found());

        let err = ErrorInfo::execution_failed("deadline")
            .with_details(json!({ "code": "ENGINE_TIMEOUT" }));
        assert!(err.is_timeout());
    }

    #[test]
    fn error_info_round_trips_through_json() {
        let err = ErrorInfo::validation_failed("bad input").with_details(json!({"field": "unit"}));
        let encoded = serde_json::to_string(&err).unwrap();
        let decoded: ErrorInfo = serde_json::from_str(&encoded).unwrap();
        assert_eq!(err, decoded);
    }
}
