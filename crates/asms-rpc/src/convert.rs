//! Marshalling between core types and wire messages.

use serde_json::{Map, Value};

use asms_core::{
    Chunk, ChunkType, ErrorInfo, Request, RequestOptions, Response, ResponseMeta,
};

use crate::wire;

pub fn decode_request(wire: &wire::RpcRequest) -> Result<Request, ErrorInfo> {
    let request_type = wire
        .request_type
        .parse()
        .map_err(|e: String| ErrorInfo::invalid_request(e))?;

    let input: Map<String, Value> = if wire.input.is_empty() {
        Map::new()
    } else {
        serde_json::from_slice(&wire.input)
            .map_err(|e| ErrorInfo::invalid_request(format!("malformed input payload: {}", e)))?
    };

    Ok(Request {
        request_type,
        unit: wire.unit.clone(),
        input,
        options: RequestOptions {
            timeout_ms: (wire.timeout_ms > 0).then_some(wire.timeout_ms),
            run_async: wire.run_async,
            trace_id: (!wire.trace_id.is_empty()).then(|| wire.trace_id.clone()),
        },
    })
}

pub fn encode_response(response: &Response) -> wire::RpcResponse {
    wire::RpcResponse {
        success: response.success,
        data: response
            .data
            .as_ref()
            .and_then(|d| serde_json::to_vec(d).ok())
            .unwrap_or_default(),
        error: response.error.as_ref().map(encode_error),
        request_id: response.meta.request_id.clone(),
        trace_id: response.meta.trace_id.clone(),
        duration_ms: response.meta.duration_ms,
    }
}

pub fn decode_response(wire: &wire::RpcResponse) -> Response {
    Response {
        success: wire.success,
        data: if wire.data.is_empty() {
            None
        } else {
            serde_json::from_slice(&wire.data).ok()
        },
        error: wire.error.as_ref().map(decode_error),
        meta: ResponseMeta {
            request_id: wire.request_id.clone(),
            duration_ms: wire.duration_ms,
            trace_id: wire.trace_id.clone(),
            pagination: None,
        },
    }
}

pub fn encode_error(error: &ErrorInfo) -> wire::RpcError {
    wire::RpcError {
        code: error.code.clone(),
        message: error.message.clone(),
        details: error
            .details
            .as_ref()
            .and_then(|d| serde_json::to_vec(d).ok())
            .unwrap_or_default(),
    }
}

pub fn decode_error(wire: &wire::RpcError) -> ErrorInfo {
    let mut error = ErrorInfo::new(wire.code.clone(), wire.message.clone());
    if !wire.details.is_empty() {
        if let Ok(details) = serde_json::from_slice(&wire.details) {
            error = error.with_details(details);
        }
    }
    error
}

/// Streaming errors become a terminal chunk with `done = true` and `error`
/// populated.
pub fn encode_chunk(chunk: &Chunk) -> wire::RpcChunk {
    match chunk.chunk_type {
        ChunkType::Content => wire::RpcChunk {
            data: serde_json::to_vec(&chunk.data).unwrap_or_default(),
            done: false,
            error: None,
        },
        ChunkType::Done => wire::RpcChunk {
            data: Vec::new(),
            done: true,
            error: None,
        },
        ChunkType::Error => wire::RpcChunk {
            data: Vec::new(),
            done: true,
            error: chunk.error_info().as_ref().map(encode_error),
        },
    }
}

pub fn decode_chunk(wire: &wire::RpcChunk) -> Chunk {
    if let Some(error) = &wire.error {
        return Chunk::error(&decode_error(error));
    }
    if wire.done {
        return Chunk::done();
    }
    let data = if wire.data.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&wire.data).unwrap_or(Value::Null)
    };
    Chunk::content(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use asms_core::RequestType;
    use serde_json::json;

    #[test]
    fn request_round_trips_through_the_wire_shape() {
        let wire = wire::RpcRequest {
            request_type: "command".into(),
            unit: "test.ping".into(),
            input: serde_json::to_vec(&json!({"a": 1})).unwrap(),
            timeout_ms: 500,
            run_async: false,
            trace_id: "t9".into(),
        };
        let request = decode_request(&wire).unwrap();
        assert_eq!(request.request_type, RequestType::Command);
        assert_eq!(request.unit, "test.ping");
        assert_eq!(request.input["a"], 1);
        assert_eq!(request.options.timeout_ms, Some(500));
        assert_eq!(request.options.trace_id.as_deref(), Some("t9"));
    }

    #[test]
    fn unknown_request_type_is_invalid() {
        let wire = wire::RpcRequest {
            request_type: "mutation".into(),
            unit: "x".into(),
            ..Default::default()
        };
        let err = decode_request(&wire).unwrap_err();
        assert_eq!(err.code, asms_core::codes::INVALID_REQUEST);
    }

    #[test]
    fn response_round_trips_with_error_details() {
        let response = Response {
            success: false,
            data: None,
            error: Some(
                ErrorInfo::execution_failed("boom").with_details(json!({"cause": "boom"})),
            ),
            meta: ResponseMeta {
                request_id: "r1".into(),
                duration_ms: 9,
                trace_id: "t1".into(),
                pagination: None,
            },
        };
        let decoded = decode_response(&encode_response(&response));
        assert_eq!(decoded, response);
    }

    #[test]
    fn chunk_conversions_cover_all_variants() {
        let content = Chunk::content(json!({"chunk": 1}));
        let wire_chunk = encode_chunk(&content);
        assert!(!wire_chunk.done);
        assert_eq!(decode_chunk(&wire_chunk), content);

        let done = encode_chunk(&Chunk::done());
        assert!(done.done && done.error.is_none());
        assert_eq!(decode_chunk(&done), Chunk::done());

        let error = Chunk::error(&ErrorInfo::timeout(50));
        let wire_error = encode_chunk(&error);
        assert!(wire_error.done);
        assert_eq!(
            decode_chunk(&wire_error).error_info().unwrap().code,
            asms_core::codes::TIMEOUT
        );
    }
}
