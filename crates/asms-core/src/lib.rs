//! # ASMS Core
//!
//! Core dispatch primitives for the ASMS control plane: the internal
//! request/response model, the stable error taxonomy, the unit registry
//! contract, and the gateway that every protocol adapter funnels into.
//!
//! ## Architecture
//!
//! A wire message arrives at an adapter (HTTP, MCP, binary RPC), is decoded
//! into a [`request::Request`], and handed to the [`gateway::Gateway`]. The
//! gateway resolves the addressed unit through the [`registry::UnitRegistry`],
//! runs it under a scoped [`context::RequestContext`], and returns a
//! [`request::Response`] with correlation metadata filled in. Streaming
//! requests travel the same path but yield a bounded channel of
//! [`streaming::Chunk`]s.
//!
//! Unit implementations live outside this crate and are seen only through
//! the traits in [`units`].

pub mod context;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod request;
pub mod schema;
pub mod streaming;
pub mod units;

pub use context::RequestContext;
pub use error::{codes, ErrorInfo, UnitError};
pub use gateway::{Gateway, GatewayConfig, PooledGateway, WorkflowDispatcher, DEFAULT_TIMEOUT};
pub use registry::{InMemoryRegistry, RegistryError, UnitRegistry};
pub use request::{Pagination, Request, RequestOptions, RequestType, Response, ResponseMeta};
pub use schema::{FieldSchema, FieldType, UnitSchema};
pub use streaming::{Chunk, ChunkType, ResourceUpdate, STREAM_BUFFER_SIZE};
pub use units::{Command, Query, Resource, ResourceFactory, StreamingCommand};
