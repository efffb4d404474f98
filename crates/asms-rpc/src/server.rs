//! Frame-dispatching RPC server.
//!
//! Each connection carries multiplexed calls: request frames arrive with a
//! client-chosen `call_id`, handlers run concurrently, and every outbound
//! frame is serialized through one writer task. Streaming methods emit
//! [`wire::RpcChunk`] frames terminated by `done = true`.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use prost::Message;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info, warn};

use asms_core::{ErrorInfo, Gateway, Request, RequestContext, RequestType, Response};

use crate::convert;
use crate::wire::{self, methods, Frame};

pub struct RpcServer {
    gateway: Arc<Gateway>,
}

impl RpcServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// Accept loop. Runs until the listener fails.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> io::Result<()> {
        info!(addr = ?listener.local_addr(), "rpc server listening");
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!(%peer, "rpc connection accepted");
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream).await {
                    debug!(%peer, error = %e, "rpc connection closed");
                }
            });
        }
    }

    async fn handle_connection(&self, stream: TcpStream) -> io::Result<()> {
        let framed = Framed::new(stream, LengthDelimitedCodec::new());
        let (mut sink, mut frames) = framed.split();

        let (tx, mut rx) = mpsc::channel::<Frame>(64);
        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if sink.send(Bytes::from(frame.encode_to_vec())).await.is_err() {
                    break;
                }
            }
        });

        while let Some(next) = frames.next().await {
            let bytes = next?;
            let frame = match Frame::decode(bytes.as_ref()) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "dropping undecodable frame");
                    continue;
                }
            };

            let gateway = Arc::clone(&self.gateway);
            let tx = tx.clone();
            tokio::spawn(async move {
                dispatch_frame(gateway, frame, tx).await;
            });
        }

        drop(tx);
        let _ = writer.await;
        Ok(())
    }
}

async fn dispatch_frame(gateway: Arc<Gateway>, frame: Frame, tx: mpsc::Sender<Frame>) {
    let call_id = frame.call_id;
    match frame.method.as_str() {
        methods::EXECUTE => {
            let response = match decode_call(&frame.payload) {
                Ok(request) => gateway.handle(request).await,
                Err(error) => Response::failure(error),
            };
            send_payload(&tx, call_id, &convert::encode_response(&response)).await;
        }
        methods::EXECUTE_STREAM => {
            let request = match decode_call(&frame.payload) {
                Ok(request) => request,
                Err(error) => {
                    send_terminal_error(&tx, call_id, &error).await;
                    return;
                }
            };
            match gateway.handle_stream(request).await {
                Ok(mut chunks) => {
                    while let Some(chunk) = chunks.recv().await {
                        let wire_chunk = convert::encode_chunk(&chunk);
                        let done = wire_chunk.done;
                        send_payload(&tx, call_id, &wire_chunk).await;
                        if done {
                            return;
                        }
                    }
                    // Producer closed without a terminal chunk.
                    send_payload(
                        &tx,
                        call_id,
                        &wire::RpcChunk {
                            data: Vec::new(),
                            done: true,
                            error: None,
                        },
                    )
                    .await;
                }
                Err(error) => send_terminal_error(&tx, call_id, &error).await,
            }
        }
        methods::WATCH_RESOURCE => {
            let watch = match wire::WatchRequest::decode(frame.payload.as_slice()) {
                Ok(watch) => watch,
                Err(e) => {
                    let error = ErrorInfo::invalid_request(format!("malformed watch request: {}", e));
                    send_terminal_error(&tx, call_id, &error).await;
                    return;
                }
            };
            watch_resource(gateway, watch, call_id, tx).await;
        }
        other => {
            let error = ErrorInfo::invalid_request(format!("unknown rpc method: {}", other));
            send_payload(
                &tx,
                call_id,
                &convert::encode_response(&Response::failure(error)),
            )
            .await;
        }
    }
}

async fn watch_resource(
    gateway: Arc<Gateway>,
    watch: wire::WatchRequest,
    call_id: u64,
    tx: mpsc::Sender<Frame>,
) {
    let resource = match gateway.registry().get_resource_with_factory(&watch.uri) {
        Some(resource) => resource,
        None => {
            send_terminal_error(&tx, call_id, &ErrorInfo::resource_not_found(&watch.uri)).await;
            return;
        }
    };

    let ctx = RequestContext::new(None);
    match resource.watch(&ctx).await {
        Ok(mut updates) => {
            while let Some(update) = updates.recv().await {
                let chunk = wire::RpcChunk {
                    data: serde_json::to_vec(&update).unwrap_or_default(),
                    done: false,
                    error: None,
                };
                send_payload(&tx, call_id, &chunk).await;
            }
            send_payload(
                &tx,
                call_id,
                &wire::RpcChunk {
                    data: Vec::new(),
                    done: true,
                    error: None,
                },
            )
            .await;
        }
        Err(err) => {
            send_terminal_error(&tx, call_id, &err.into_error_info()).await;
        }
    }
}

fn decode_call(payload: &[u8]) -> Result<Request, ErrorInfo> {
    let wire_request = wire::RpcRequest::decode(payload)
        .map_err(|e| ErrorInfo::invalid_request(format!("malformed request payload: {}", e)))?;
    let request = convert::decode_request(&wire_request)?;
    if request.request_type == RequestType::Workflow && request.options.run_async {
        // Async workflow submission is an HTTP-surface concern; the binary
        // surface always executes synchronously.
        debug!(unit = %request.unit, "ignoring async option on rpc surface");
    }
    Ok(request)
}

async fn send_payload<M: Message>(tx: &mpsc::Sender<Frame>, call_id: u64, payload: &M) {
    let frame = Frame {
        method: String::new(),
        call_id,
        payload: payload.encode_to_vec(),
    };
    let _ = tx.send(frame).await;
}

async fn send_terminal_error(tx: &mpsc::Sender<Frame>, call_id: u64, error: &ErrorInfo) {
    let chunk = wire::RpcChunk {
        data: Vec::new(),
        done: true,
        error: Some(convert::encode_error(error)),
    };
    send_payload(tx, call_id, &chunk).await;
}
