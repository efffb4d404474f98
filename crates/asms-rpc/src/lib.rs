//! # ASMS Binary RPC Adapter
//!
//! A symmetric binary surface over the gateway: unary `execute`,
//! server-streaming `execute_stream`, and `watch_resource`, carried as
//! prost-encoded messages inside length-delimited frames over TCP.
//!
//! The wire shape keeps `input` and `data` as opaque JSON-encoded bytes;
//! marshalling happens at the adapter boundary so the gateway sees native
//! maps and the round trip matches a direct gateway call modulo metadata
//! timestamps.

pub mod client;
pub mod convert;
pub mod server;
pub mod wire;

pub use client::{ClientError, RpcClient};
pub use server::RpcServer;
