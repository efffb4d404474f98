//! Streaming chunk model and channel conventions.
//!
//! Streams are bounded single-producer single-consumer channels: the
//! producer writes [`Chunk`]s into an `mpsc::Sender` and closes on natural
//! termination; either side may stop early on cancellation. Every stream
//! ends with a terminal chunk — `done` or `error` — and the consumer sees
//! the channel close exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ErrorInfo;

/// Capacity of streaming channels. Bounded so producers that outrun
/// consumers are backpressured instead of buffering without limit.
pub const STREAM_BUFFER_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Content,
    Done,
    Error,
}

/// One element of a streamed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(rename = "type")]
    pub chunk_type: ChunkType,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Chunk {
    pub fn content(data: Value) -> Self {
        Self {
            chunk_type: ChunkType::Content,
            data,
            metadata: Map::new(),
        }
    }

    pub fn done() -> Self {
        Self {
            chunk_type: ChunkType::Done,
            data: Value::Null,
            metadata: Map::new(),
        }
    }

    pub fn error(info: &ErrorInfo) -> Self {
        Self {
            chunk_type: ChunkType::Error,
            data: json!({
                "code": info.code,
                "message": info.message,
                "details": info.details,
            }),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Terminal chunks end the stream: `done` and `error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self.chunk_type, ChunkType::Done | ChunkType::Error)
    }

    /// Recovers the [`ErrorInfo`] from an error chunk.
    pub fn error_info(&self) -> Option<ErrorInfo> {
        if self.chunk_type != ChunkType::Error {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }
}

/// One update event from a watched resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUpdate {
    pub uri: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl ResourceUpdate {
    pub fn new(uri: impl Into<String>, data: Value) -> Self {
        Self {
            uri: uri.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_chunks_are_not_terminal() {
        assert!(!Chunk::content(json!({"chunk": 0})).is_terminal());
        assert!(Chunk::done().is_terminal());
        assert!(Chunk::error(&ErrorInfo::internal("x")).is_terminal());
    }

    #[test]
    fn error_chunk_round_trips_error_info() {
        let info = ErrorInfo::timeout(50);
        let chunk = Chunk::error(&info);
        let recovered = chunk.error_info().unwrap();
        assert_eq!(recovered.code, info.code);
        assert_eq!(recovered.message, info.message);
    }

    #[test]
    fn error_info_is_none_for_content() {
        assert!(Chunk::content(json!(1)).error_info().is_none());
        assert!(Chunk::done().error_info().is_none());
    }

    #[test]
    fn chunk_type_serializes_lowercase() {
        let chunk = Chunk::done();
        let encoded = serde_json::to_value(&chunk).unwrap();
        assert_eq!(encoded["type"], "done");
    }
}
