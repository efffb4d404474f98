//! # Gateway
//!
//! The single dispatch point every protocol adapter funnels into. The
//! gateway validates requests, mints correlation identifiers, applies the
//! effective timeout, resolves the addressed unit through the registry, and
//! assembles the response — failures included — so adapters only translate
//! wire formats.
//!
//! [`Gateway::handle`] never fails channel-side: every failure is encoded
//! in `Response.error`. [`Gateway::handle_stream`] returns an error only
//! for pre-dispatch failures (validation, unknown unit, streaming not
//! supported); afterwards failures flow as terminal error chunks.

mod pooled;

pub use pooled::{PooledGateway, ResponsePool};

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::error::{ErrorInfo, UnitError};
use crate::registry::UnitRegistry;
use crate::request::{Request, RequestType, Response};
use crate::streaming::{Chunk, STREAM_BUFFER_SIZE};

/// Default execution timeout applied when the request carries none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Hook the workflow engine registers itself through. Keeps the gateway
/// free of a dependency on the engine crate while letting `type=workflow`
/// requests dispatch into it.
#[async_trait]
pub trait WorkflowDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        ctx: &RequestContext,
        workflow: &str,
        input: &Map<String, Value>,
    ) -> Result<Value, UnitError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub default_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct Gateway {
    registry: Arc<dyn UnitRegistry>,
    workflows: Option<Arc<dyn WorkflowDispatcher>>,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(registry: Arc<dyn UnitRegistry>) -> Self {
        Self {
            registry,
            workflows: None,
            config: GatewayConfig::default(),
        }
    }

    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_workflow_dispatcher(mut self, dispatcher: Arc<dyn WorkflowDispatcher>) -> Self {
        self.workflows = Some(dispatcher);
        self
    }

    pub fn registry(&self) -> &Arc<dyn UnitRegistry> {
        &self.registry
    }

    /// Dispatches a request under a freshly minted context.
    pub async fn handle(&self, request: Request) -> Response {
        let ctx = RequestContext::new(request.options.trace_id.clone());
        self.handle_with_context(&ctx, request).await
    }

    /// Dispatches under a caller-provided context. Used by nested dispatch
    /// (workflow steps) and by adapters that already carry a context.
    pub async fn handle_with_context(&self, ctx: &RequestContext, request: Request) -> Response {
        let started = Instant::now();
        let unit = request.unit.clone();

        let mut response = match self.dispatch(ctx, request).await {
            Ok(data) => Response::success(data),
            Err(error) => {
                debug!(unit = %unit, code = %error.code, "dispatch failed");
                Response::failure(error)
            }
        };

        // Deferred meta assembly covers both success and failure paths.
        response.meta.request_id = ctx.request_id.clone();
        response.meta.trace_id = ctx.trace_id.clone();
        response.meta.duration_ms = started.elapsed().as_millis() as u64;
        response
    }

    async fn dispatch(&self, ctx: &RequestContext, request: Request) -> Result<Value, ErrorInfo> {
        validate(&request)?;

        let timeout = self.effective_timeout(&request);
        let timeout_ms = timeout.as_millis() as u64;

        // The unit runs under a deadline-bound scope. Cancelling it on
        // expiry means cooperative units (and any tasks they spawned) see
        // ctx cancellation instead of only being dropped.
        let unit_ctx = ctx.deadline_scope();

        tokio::select! {
            _ = ctx.cancelled() => {
                unit_ctx.cancel();
                Err(ErrorInfo::execution_failed("request context cancelled"))
            }
            outcome = tokio::time::timeout(timeout, self.dispatch_unit(&unit_ctx, &request)) => {
                match outcome {
                    Ok(result) => result.map_err(UnitError::into_error_info),
                    Err(_) => {
                        unit_ctx.cancel();
                        warn!(unit = %request.unit, timeout_ms, "unit execution timed out");
                        Err(ErrorInfo::timeout(timeout_ms))
                    }
                }
            }
        }
    }

    async fn dispatch_unit(
        &self,
        ctx: &RequestContext,
        request: &Request,
    ) -> Result<Value, UnitError> {
        match request.request_type {
            RequestType::Command => {
                let command = self
                    .registry
                    .get_command(&request.unit)
                    .ok_or_else(|| ErrorInfo::unit_not_found(&request.unit))?;
                command.execute(ctx, &request.input).await
            }
            RequestType::Query => {
                let query = self
                    .registry
                    .get_query(&request.unit)
                    .ok_or_else(|| ErrorInfo::unit_not_found(&request.unit))?;
                query.execute(ctx, &request.input).await
            }
            RequestType::Resource => {
                let resource = self
                    .registry
                    .get_resource_with_factory(&request.unit)
                    .ok_or_else(|| ErrorInfo::resource_not_found(&request.unit))?;
                resource.get(ctx).await
            }
            RequestType::Workflow => match &self.workflows {
                Some(dispatcher) => dispatcher.dispatch(ctx, &request.unit, &request.input).await,
                None => Err(UnitError::Coded(ErrorInfo::internal(
                    "workflow engine not configured",
                ))),
            },
        }
    }

    /// Opens a chunk stream for a streaming command. Pre-dispatch failures
    /// are returned synchronously; anything later arrives as a terminal
    /// error chunk. The returned channel closes exactly once.
    pub async fn handle_stream(
        &self,
        request: Request,
    ) -> Result<mpsc::Receiver<Chunk>, ErrorInfo> {
        let ctx = RequestContext::new(request.options.trace_id.clone());
        self.handle_stream_with_context(&ctx, request).await
    }

    pub async fn handle_stream_with_context(
        &self,
        ctx: &RequestContext,
        request: Request,
    ) -> Result<mpsc::Receiver<Chunk>, ErrorInfo> {
        validate(&request)?;

        if request.request_type != RequestType::Command {
            return Err(ErrorInfo::invalid_request(
                "streaming is only valid for command requests",
            ));
        }

        let unit = self
            .registry
            .get_streaming_command(&request.unit)
            .ok_or_else(|| {
                if self.registry.has_command(&request.unit) {
                    ErrorInfo::validation_failed(format!(
                        "unit does not support streaming: {}",
                        request.unit
                    ))
                } else {
                    ErrorInfo::unit_not_found(&request.unit)
                }
            })?;

        if !unit.supports_streaming() {
            return Err(ErrorInfo::validation_failed(format!(
                "unit does not support streaming: {}",
                request.unit
            )));
        }

        let timeout = self.effective_timeout(&request);
        let timeout_ms = timeout.as_millis() as u64;

        let (producer_tx, mut producer_rx) = mpsc::channel::<Chunk>(STREAM_BUFFER_SIZE);
        let (caller_tx, caller_rx) = mpsc::channel::<Chunk>(STREAM_BUFFER_SIZE);

        // Producer side: the unit runs under a deadline-bound scope so the
        // forwarder can cancel it. Execution errors convert into a
        // terminal error chunk on the internal channel.
        let producer_ctx = ctx.deadline_scope();
        let producer_scope = producer_ctx.clone();
        let input = request.input.clone();
        tokio::spawn(async move {
            if let Err(err) = unit.execute_stream(&producer_ctx, &input, producer_tx.clone()).await
            {
                let info = err.into_error_info();
                let _ = producer_tx.send(Chunk::error(&info)).await;
            }
        });

        // Forwarder side: relay chunks until a terminal chunk, producer
        // close, cancellation, or deadline. Dropping caller_tx closes the
        // caller channel; cancelling the producer scope tells the unit to
        // stop instead of leaving it running past the deadline.
        let forward_ctx = ctx.clone();
        tokio::spawn(async move {
            let deadline = tokio::time::sleep(timeout);
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    _ = forward_ctx.cancelled() => {
                        let info = ErrorInfo::execution_failed("request context cancelled");
                        let _ = caller_tx.send(Chunk::error(&info)).await;
                        break;
                    }
                    _ = &mut deadline => {
                        producer_scope.cancel();
                        let _ = caller_tx.send(Chunk::error(&ErrorInfo::timeout(timeout_ms))).await;
                        break;
                    }
                    next = producer_rx.recv() => match next {
                        Some(chunk) => {
                            let terminal = chunk.is_terminal();
                            if caller_tx.send(chunk).await.is_err() {
                                break;
                            }
                            if terminal {
                                break;
                            }
                        }
                        // Producer closed without a terminal chunk; end the
                        // stream cleanly so the consumer still sees `done`.
                        None => {
                            let _ = caller_tx.send(Chunk::done()).await;
                            break;
                        }
                    }
                }
            }

            // Forwarding is over on every path; no one consumes the
            // producer from here, so stop it.
            producer_scope.cancel();
        });

        Ok(caller_rx)
    }

    fn effective_timeout(&self, request: &Request) -> Duration {
        match request.options.timeout_ms {
            Some(ms) if ms > 0 => Duration::from_millis(ms),
            _ => self.config.default_timeout,
        }
    }
}

/// Request validation runs before any unit resolution. Validation errors
/// carry no unit context.
fn validate(request: &Request) -> Result<(), ErrorInfo> {
    if request.unit.trim().is_empty() {
        return Err(ErrorInfo::invalid_request("unit name must not be empty"));
    }
    Ok(())
}
