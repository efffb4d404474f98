//! HTTP mounting of the MCP SSE session transport.
//!
//! `GET /sse` opens a session: the server emits an `endpoint` event naming
//! `/message?session=<id>` and then holds the stream, draining the
//! session's event queue as `message` events. `POST /message` delivers one
//! JSON-RPC request into the named session.

use actix_web::{web, HttpResponse};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use asms_mcp::{JsonRpcRequest, SessionError, SseSessionManager};

use crate::state::AppState;

/// `GET /sse`
pub async fn open_sse(state: web::Data<AppState>) -> HttpResponse {
    let (session_id, mut receiver) = state.sessions.open();
    let endpoint = SseSessionManager::endpoint(&session_id);
    debug!(session = %session_id, "sse transport session opened");

    let sessions = state.sessions.clone();
    let stream = async_stream::stream! {
        yield Ok::<Bytes, actix_web::Error>(Bytes::from(format!(
            "event: endpoint\ndata: {}\n\n",
            endpoint
        )));
        while let Some(message) = receiver.recv().await {
            yield Ok(Bytes::from(format!("event: message\ndata: {}\n\n", message)));
        }
        // Queue closed: the manager shut down or pruned the session.
        sessions.close(&session_id);
    };

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("Connection", "keep-alive"))
        .streaming(stream)
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    session: Option<String>,
}

/// `POST /message?session=<id>`
pub async fn post_message(
    query: web::Query<MessageQuery>,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    let session_id = match &query.session {
        Some(session) if !session.is_empty() => session.clone(),
        _ => {
            return HttpResponse::BadRequest()
                .json(json!({"error": "missing session query parameter"}))
        }
    };

    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return HttpResponse::BadRequest()
                .json(json!({"error": format!("malformed JSON-RPC request: {}", e)}))
        }
    };

    let response = state.mcp.handle(request).await;

    if let Some(response) = response {
        let encoded = match serde_json::to_string(&response) {
            Ok(encoded) => encoded,
            Err(e) => {
                return HttpResponse::InternalServerError()
                    .json(json!({"error": format!("failed to encode response: {}", e)}))
            }
        };
        match state.sessions.push(&session_id, encoded) {
            Ok(()) => {}
            Err(SessionError::NotFound(_)) => {
                return HttpResponse::NotFound()
                    .json(json!({"error": format!("unknown session: {}", session_id)}))
            }
            Err(SessionError::BufferFull(_)) => {
                return HttpResponse::ServiceUnavailable()
                    .json(json!({"error": "session buffer full"}))
            }
        }
    }

    HttpResponse::Accepted().finish()
}
