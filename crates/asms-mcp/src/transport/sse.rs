//! SSE session bookkeeping for the HTTP-mounted MCP transport.
//!
//! `GET /sse` opens a session and streams its event queue; `POST
//! /message?session=<id>` dispatches a JSON-RPC request and pushes the
//! response onto that queue. The HTTP wiring lives in the API crate; this
//! module owns the session map and channel semantics so every transport
//! shares one implementation.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Per-session queue depth. A full queue rejects the message (the HTTP
/// layer maps that to 503) rather than buffering without bound.
pub const SESSION_BUFFER_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unknown session: {0}")]
    NotFound(String),

    #[error("session buffer full: {0}")]
    BufferFull(String),
}

/// Session map guarded by a read/write lock. Each session's channel is
/// single-producer (the message dispatch handler) and single-consumer (the
/// SSE stream).
pub struct SseSessionManager {
    sessions: RwLock<HashMap<String, mpsc::Sender<String>>>,
    buffer: usize,
}

impl SseSessionManager {
    pub fn new() -> Self {
        Self::with_buffer(SESSION_BUFFER_SIZE)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            buffer,
        }
    }

    /// Opens a session and returns its id plus the event receiver the SSE
    /// stream drains.
    pub fn open(&self) -> (String, mpsc::Receiver<String>) {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.buffer);
        self.sessions
            .write()
            .expect("session lock poisoned")
            .insert(id.clone(), tx);
        info!(session = %id, "sse session opened");
        (id, rx)
    }

    /// The endpoint the client posts messages to, announced in the opening
    /// `endpoint` event.
    pub fn endpoint(session_id: &str) -> String {
        format!("/message?session={}", session_id)
    }

    /// Queues a serialized JSON-RPC response for the session's stream.
    pub fn push(&self, session_id: &str, message: String) -> Result<(), SessionError> {
        let sender = {
            let sessions = self.sessions.read().expect("session lock poisoned");
            sessions.get(session_id).cloned()
        };
        let sender = sender.ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        match sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(SessionError::BufferFull(session_id.to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // The stream went away; drop the stale entry.
                self.close(session_id);
                Err(SessionError::NotFound(session_id.to_string()))
            }
        }
    }

    pub fn close(&self, session_id: &str) {
        if self
            .sessions
            .write()
            .expect("session lock poisoned")
            .remove(session_id)
            .is_some()
        {
            debug!(session = %session_id, "sse session closed");
        }
    }

    /// Closes every session channel; their SSE streams end.
    pub fn shutdown(&self) {
        let mut sessions = self.sessions.write().expect("session lock poisoned");
        let count = sessions.len();
        sessions.clear();
        if count > 0 {
            info!(count, "sse sessions closed on shutdown");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().expect("session lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SseSessionManager {
    fn default() -> Self {
        Self::new()
    }
}
