//! Stdio transport: newline-delimited JSON-RPC over a byte stream.
//!
//! Requests dispatch concurrently; responses are serialized by a single
//! writer task. On EOF the server drains in-flight handlers before
//! returning.

use std::io;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::handler::McpHandler;
use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// Input buffer capacity. Large enough that a single oversized message
/// (e.g. a base64 payload) never splits.
const LINE_BUFFER_CAPACITY: usize = 10 * 1024 * 1024;

pub struct StdioServer {
    handler: Arc<McpHandler>,
}

impl StdioServer {
    pub fn new(handler: Arc<McpHandler>) -> Self {
        Self { handler }
    }

    /// Serves stdin/stdout until EOF.
    pub async fn run(&self) -> io::Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serves an arbitrary byte stream pair. Split out so tests can drive
    /// the transport over in-memory pipes.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<String>(64);
        let writer_task = tokio::spawn(write_loop(writer, rx));

        let mut reader = BufReader::with_capacity(LINE_BUFFER_CAPACITY, reader);
        let mut in_flight = JoinSet::new();
        let mut line = String::new();

        loop {
            line.clear();
            let read = reader.read_line(&mut line).await?;
            if read == 0 {
                break;
            }
            let message = line.trim();
            if message.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcRequest>(message) {
                Ok(request) => {
                    let handler = self.handler.clone();
                    let tx = tx.clone();
                    in_flight.spawn(async move {
                        if let Some(response) = handler.handle(request).await {
                            send_response(&tx, &response).await;
                        }
                    });
                }
                Err(e) => {
                    debug!(error = %e, "dropping unparseable message");
                    let response = JsonRpcResponse::error(
                        Value::Null,
                        JsonRpcError::parse_error(e.to_string()),
                    );
                    send_response(&tx, &response).await;
                }
            }
        }

        // EOF: wait for every in-flight handler before shutting the writer.
        while in_flight.join_next().await.is_some() {}
        drop(tx);
        writer_task.await.map_err(|e| io::Error::other(e.to_string()))?
    }
}

async fn send_response(tx: &mpsc::Sender<String>, response: &JsonRpcResponse) {
    match serde_json::to_string(response) {
        Ok(encoded) => {
            let _ = tx.send(encoded).await;
        }
        Err(e) => warn!(error = %e, "failed to encode response"),
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<String>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        writer.write_all(message.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}
