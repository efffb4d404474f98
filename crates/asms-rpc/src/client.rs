//! Multiplexing RPC client.
//!
//! One connection carries any number of in-flight calls; a reader task
//! routes response frames back to their callers by `call_id`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use prost::Message;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::debug;

use asms_core::{Chunk, Request, Response, ResourceUpdate, STREAM_BUFFER_SIZE};

use crate::convert;
use crate::wire::{self, methods, Frame};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed")]
    Closed,

    #[error("malformed response frame: {0}")]
    Decode(String),
}

enum Pending {
    Unary(oneshot::Sender<wire::RpcResponse>),
    Stream(mpsc::Sender<Chunk>),
    Watch(mpsc::Sender<ResourceUpdate>),
}

pub struct RpcClient {
    writer_tx: mpsc::Sender<Frame>,
    pending: Arc<Mutex<HashMap<u64, Pending>>>,
    next_id: AtomicU64,
}

impl RpcClient {
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        let framed = Framed::new(stream, LengthDelimitedCodec::new());
        let (mut sink, mut frames) = framed.split();

        let (writer_tx, mut writer_rx) = mpsc::channel::<Frame>(64);
        tokio::spawn(async move {
            while let Some(frame) = writer_rx.recv().await {
                if sink.send(Bytes::from(frame.encode_to_vec())).await.is_err() {
                    break;
                }
            }
        });

        let pending: Arc<Mutex<HashMap<u64, Pending>>> = Arc::new(Mutex::new(HashMap::new()));
        let router = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(Ok(bytes)) = frames.next().await {
                let frame = match Frame::decode(bytes.as_ref()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        debug!(error = %e, "dropping undecodable response frame");
                        continue;
                    }
                };
                route_frame(&router, frame).await;
            }
            // Connection gone: wake every waiter by dropping its sender.
            router.lock().expect("pending lock poisoned").clear();
        });

        Ok(Self {
            writer_tx,
            pending,
            next_id: AtomicU64::new(1),
        })
    }

    pub async fn execute(&self, request: Request) -> Result<Response, ClientError> {
        let call_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.register(call_id, Pending::Unary(tx));

        self.send(methods::EXECUTE, call_id, &encode_request(&request))
            .await?;

        let wire_response = rx.await.map_err(|_| ClientError::Closed)?;
        Ok(convert::decode_response(&wire_response))
    }

    pub async fn execute_stream(
        &self,
        request: Request,
    ) -> Result<mpsc::Receiver<Chunk>, ClientError> {
        let call_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(STREAM_BUFFER_SIZE);
        self.register(call_id, Pending::Stream(tx));

        self.send(methods::EXECUTE_STREAM, call_id, &encode_request(&request))
            .await?;
        Ok(rx)
    }

    pub async fn watch_resource(
        &self,
        uri: &str,
    ) -> Result<mpsc::Receiver<ResourceUpdate>, ClientError> {
        let call_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(STREAM_BUFFER_SIZE);
        self.register(call_id, Pending::Watch(tx));

        self.send(
            methods::WATCH_RESOURCE,
            call_id,
            &wire::WatchRequest { uri: uri.to_string() },
        )
        .await?;
        Ok(rx)
    }

    fn register(&self, call_id: u64, pending: Pending) {
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .insert(call_id, pending);
    }

    async fn send<M: Message>(
        &self,
        method: &str,
        call_id: u64,
        payload: &M,
    ) -> Result<(), ClientError> {
        let frame = Frame {
            method: method.to_string(),
            call_id,
            payload: payload.encode_to_vec(),
        };
        self.writer_tx
            .send(frame)
            .await
            .map_err(|_| ClientError::Closed)
    }
}

fn encode_request(request: &Request) -> wire::RpcRequest {
    wire::RpcRequest {
        request_type: request.request_type.as_str().to_string(),
        unit: request.unit.clone(),
        input: serde_json::to_vec(&request.input).unwrap_or_default(),
        timeout_ms: request.options.timeout_ms.unwrap_or(0),
        run_async: request.options.run_async,
        trace_id: request.options.trace_id.clone().unwrap_or_default(),
    }
}

/// Routing holds the lock only to look up the waiter; channel sends happen
/// outside it so slow consumers backpressure the reader instead of losing
/// frames.
async fn route_frame(pending: &Arc<Mutex<HashMap<u64, Pending>>>, frame: Frame) {
    enum Target {
        Unary(oneshot::Sender<wire::RpcResponse>),
        Stream(mpsc::Sender<Chunk>),
        Watch(mpsc::Sender<ResourceUpdate>),
        Unknown,
    }

    let is_done = |payload: &[u8]| {
        wire::RpcChunk::decode(payload)
            .map(|c| c.done)
            .unwrap_or(false)
    };

    let target = {
        let mut pending = pending.lock().expect("pending lock poisoned");
        match pending.get(&frame.call_id) {
            Some(Pending::Unary(_)) => match pending.remove(&frame.call_id) {
                Some(Pending::Unary(tx)) => Target::Unary(tx),
                _ => Target::Unknown,
            },
            Some(Pending::Stream(tx)) => {
                let tx = tx.clone();
                if is_done(&frame.payload) {
                    pending.remove(&frame.call_id);
                }
                Target::Stream(tx)
            }
            Some(Pending::Watch(tx)) => {
                let tx = tx.clone();
                if is_done(&frame.payload) {
                    pending.remove(&frame.call_id);
                }
                Target::Watch(tx)
            }
            None => Target::Unknown,
        }
    };

    match target {
        Target::Unary(tx) => {
            if let Ok(response) = wire::RpcResponse::decode(frame.payload.as_slice()) {
                let _ = tx.send(response);
            }
        }
        Target::Stream(tx) => {
            if let Ok(wire_chunk) = wire::RpcChunk::decode(frame.payload.as_slice()) {
                let _ = tx.send(convert::decode_chunk(&wire_chunk)).await;
            }
        }
        Target::Watch(tx) => {
            if let Ok(wire_chunk) = wire::RpcChunk::decode(frame.payload.as_slice()) {
                if !wire_chunk.done {
                    if let Ok(update) =
                        serde_json::from_slice::<ResourceUpdate>(&wire_chunk.data)
                    {
                        let _ = tx.send(update).await;
                    }
                }
            }
        }
        Target::Unknown => debug!(call_id = frame.call_id, "response frame for unknown call"),
    }
}
