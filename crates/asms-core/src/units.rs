//! Unit handle traits: the four polymorphic variants the registry hands out.
//!
//! Commands mutate, queries are read-only twins dispatched from a separate
//! table, resources are URI-addressable values with `get`/`watch`, and
//! streaming commands additionally emit a lazy chunk sequence. Concrete
//! unit implementations live outside this crate; the gateway sees them only
//! through these traits.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::context::RequestContext;
use crate::error::UnitError;
use crate::schema::UnitSchema;
use crate::streaming::{Chunk, ResourceUpdate};

/// A named, mutating operational unit.
#[async_trait]
pub trait Command: Send + Sync {
    /// Dotted unit name, e.g. `model.load`.
    fn name(&self) -> &str;

    /// Leading segment of the dotted name.
    fn domain(&self) -> &str {
        self.name().split('.').next().unwrap_or(self.name())
    }

    fn description(&self) -> &str {
        ""
    }

    fn input_schema(&self) -> UnitSchema {
        UnitSchema::default()
    }

    fn output_schema(&self) -> UnitSchema {
        UnitSchema::default()
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        input: &Map<String, Value>,
    ) -> Result<Value, UnitError>;
}

/// Read-only twin of [`Command`]. Identical shape, dispatched via its own
/// table so a lookup never has to type-test.
#[async_trait]
pub trait Query: Send + Sync {
    fn name(&self) -> &str;

    fn domain(&self) -> &str {
        self.name().split('.').next().unwrap_or(self.name())
    }

    fn description(&self) -> &str {
        ""
    }

    fn input_schema(&self) -> UnitSchema {
        UnitSchema::default()
    }

    fn output_schema(&self) -> UnitSchema {
        UnitSchema::default()
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        input: &Map<String, Value>,
    ) -> Result<Value, UnitError>;
}

/// A URI-addressable value (`asms://` scheme) with point reads and watch
/// subscriptions.
#[async_trait]
pub trait Resource: Send + Sync {
    fn uri(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    async fn get(&self, ctx: &RequestContext) -> Result<Value, UnitError>;

    /// Subscribes to updates. Resources without a live source keep the
    /// default, which rejects the watch.
    async fn watch(
        &self,
        _ctx: &RequestContext,
    ) -> Result<mpsc::Receiver<ResourceUpdate>, UnitError> {
        Err(UnitError::raw(format!(
            "resource {} does not support watch",
            self.uri()
        )))
    }
}

/// Builds resources for dynamic URI templates like `asms://model/{id}`.
pub trait ResourceFactory: Send + Sync {
    /// URI template with `{name}` placeholders.
    fn uri_template(&self) -> &str;

    /// Instantiates the resource for a concrete URI. `params` holds the
    /// placeholder bindings extracted from the URI.
    fn create(&self, uri: &str, params: &HashMap<String, String>) -> Option<Arc<dyn Resource>>;
}

/// A [`Command`] that can additionally emit its result as a lazy chunk
/// sequence. The sink is a bounded channel; the producer writes chunks and
/// either sends a terminal `done` chunk or simply returns, which closes the
/// channel.
#[async_trait]
pub trait StreamingCommand: Command {
    fn supports_streaming(&self) -> bool {
        true
    }

    async fn execute_stream(
        &self,
        ctx: &RequestContext,
        input: &Map<String, Value>,
        sink: mpsc::Sender<Chunk>,
    ) -> Result<(), UnitError>;
}
