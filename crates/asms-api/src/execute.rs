//! The unified execute endpoint and its SSE streaming mode.

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use bytes::Bytes;
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::debug;

use asms_core::{Chunk, ChunkType, ErrorInfo, Request};

use crate::responses::{error_response, json_response};
use crate::state::AppState;

/// `POST /execute`: body is a Request, answer is a Response. An
/// `X-Trace-ID` header overrides `options.trace_id`; `input.stream = true`
/// switches the answer to Server-Sent Events.
pub async fn execute(
    http_request: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    if !is_json(&http_request) {
        return error_response(ErrorInfo::invalid_request(
            "Content-Type must be application/json",
        ));
    }
    if body.is_empty() {
        return error_response(ErrorInfo::invalid_request("request body must not be empty"));
    }

    let mut request: Request = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(ErrorInfo::invalid_request(format!(
                "malformed request body: {}",
                e
            )))
        }
    };

    if let Some(trace_id) = header_value(&http_request, "X-Trace-ID") {
        request.options.trace_id = Some(trace_id);
    }

    let wants_stream = request
        .input
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if wants_stream {
        stream_response(state, request).await
    } else {
        let response = state.gateway.handle(request).await;
        json_response(&response)
    }
}

async fn stream_response(state: web::Data<AppState>, request: Request) -> HttpResponse {
    let unit = request.unit.clone();
    let receiver = match state.gateway.handle_stream(request).await {
        Ok(receiver) => receiver,
        Err(error) => return error_response(error),
    };

    debug!(unit = %unit, "opening sse stream");

    let frames = ReceiverStream::new(receiver).map(|chunk| {
        Ok::<Bytes, actix_web::Error>(Bytes::from(sse_frame(&chunk)))
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header((header::CONNECTION, "keep-alive"))
        .streaming(frames)
}

/// Chunk framing: content and done chunks as `data:` lines, errors as a
/// named `error` event; clean completion ends with the `[DONE]` token.
fn sse_frame(chunk: &Chunk) -> String {
    match chunk.chunk_type {
        ChunkType::Error => {
            format!("event: error\ndata: {}\n\n", chunk.data)
        }
        ChunkType::Done => {
            let encoded = serde_json::to_string(chunk).unwrap_or_default();
            format!("data: {}\n\ndata: [DONE]\n\n", encoded)
        }
        ChunkType::Content => {
            let encoded = serde_json::to_string(chunk).unwrap_or_default();
            format!("data: {}\n\n", encoded)
        }
    }
}

fn is_json(request: &HttpRequest) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false)
}

fn header_value(request: &HttpRequest, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
