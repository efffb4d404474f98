//! HTTP encoding of gateway responses: status mapping and correlation
//! headers.

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use uuid::Uuid;

use asms_core::{ErrorInfo, Response};

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";
pub const TRACE_ID_HEADER: &str = "X-Trace-ID";

/// Encodes a gateway response: 200 on success, the error code's mapped
/// status otherwise, with correlation headers always set.
pub fn json_response(response: &Response) -> HttpResponse {
    let status = match &response.error {
        Some(error) => StatusCode::from_u16(error.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        None => StatusCode::OK,
    };

    let mut builder = HttpResponse::build(status);
    builder
        .insert_header((REQUEST_ID_HEADER, response.meta.request_id.as_str()))
        .insert_header((TRACE_ID_HEADER, response.meta.trace_id.as_str()));
    builder.json(response)
}

/// Encodes a failure that never reached the gateway (decode errors,
/// adapter-level rejections). The gateway would have minted correlation
/// ids; this path mints them itself so the wire shape — headers included —
/// matches a gateway failure.
pub fn error_response(error: ErrorInfo) -> HttpResponse {
    let mut response = Response::failure(error);
    response.meta.request_id = Uuid::new_v4().to_string();
    response.meta.trace_id = Uuid::new_v4().to_string();
    json_response(&response)
}
