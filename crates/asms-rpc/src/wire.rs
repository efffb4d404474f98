//! Binary wire messages.
//!
//! Every frame on the connection is a length-delimited [`Frame`] whose
//! payload is one of the method-specific messages. `input` and `data`
//! travel as opaque JSON-encoded bytes; the adapter marshals at the
//! boundary so the gateway sees native maps.

use prost::Message;

/// Connection-level envelope. Requests carry `method`; response frames
/// echo the originating `call_id`.
#[derive(Clone, PartialEq, Message)]
pub struct Frame {
    #[prost(string, tag = "1")]
    pub method: String,

    #[prost(uint64, tag = "2")]
    pub call_id: u64,

    #[prost(bytes = "vec", tag = "3")]
    pub payload: Vec<u8>,
}

pub mod methods {
    pub const EXECUTE: &str = "execute";
    pub const EXECUTE_STREAM: &str = "execute_stream";
    pub const WATCH_RESOURCE: &str = "watch_resource";
}

#[derive(Clone, PartialEq, Message)]
pub struct RpcRequest {
    #[prost(string, tag = "1")]
    pub request_type: String,

    #[prost(string, tag = "2")]
    pub unit: String,

    /// JSON-encoded input map.
    #[prost(bytes = "vec", tag = "3")]
    pub input: Vec<u8>,

    #[prost(uint64, tag = "4")]
    pub timeout_ms: u64,

    #[prost(bool, tag = "5")]
    pub run_async: bool,

    #[prost(string, tag = "6")]
    pub trace_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpcError {
    #[prost(string, tag = "1")]
    pub code: String,

    #[prost(string, tag = "2")]
    pub message: String,

    /// JSON-encoded details value; empty when absent.
    #[prost(bytes = "vec", tag = "3")]
    pub details: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RpcResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,

    /// JSON-encoded data value; empty when absent.
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,

    #[prost(message, optional, tag = "3")]
    pub error: Option<RpcError>,

    #[prost(string, tag = "4")]
    pub request_id: String,

    #[prost(string, tag = "5")]
    pub trace_id: String,

    #[prost(uint64, tag = "6")]
    pub duration_ms: u64,
}

/// Streamed element for `execute_stream` and `watch_resource`. A frame
/// with `done = true` — with or without `error` — terminates the stream.
#[derive(Clone, PartialEq, Message)]
pub struct RpcChunk {
    /// JSON-encoded chunk data.
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,

    #[prost(bool, tag = "2")]
    pub done: bool,

    #[prost(message, optional, tag = "3")]
    pub error: Option<RpcError>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WatchRequest {
    #[prost(string, tag = "1")]
    pub uri: String,
}
