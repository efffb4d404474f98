//! Built-in system units. Domain units (models, engines, devices) register
//! from their own crates; these exist so a bare server is inspectable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use asms_core::{
    Command, InMemoryRegistry, Query, RequestContext, Resource, ResourceUpdate, UnitError,
};

/// `system.ping` — echoes its input back.
struct PingCommand;

#[async_trait]
impl Command for PingCommand {
    fn name(&self) -> &str {
        "system.ping"
    }

    fn description(&self) -> &str {
        "Echo the input back, confirming the dispatch path works"
    }

    async fn execute(
        &self,
        _ctx: &RequestContext,
        input: &Map<String, Value>,
    ) -> Result<Value, UnitError> {
        Ok(json!({"ok": true, "echo": Value::Object(input.clone())}))
    }
}

/// `system.info` — build and runtime information.
struct InfoQuery;

#[async_trait]
impl Query for InfoQuery {
    fn name(&self) -> &str {
        "system.info"
    }

    fn description(&self) -> &str {
        "Server build and runtime information"
    }

    async fn execute(
        &self,
        _ctx: &RequestContext,
        _input: &Map<String, Value>,
    ) -> Result<Value, UnitError> {
        Ok(json!({
            "name": "asms-server",
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": chrono::Utc::now().to_rfc3339(),
        }))
    }
}

/// `asms://system/status` — liveness as a watchable resource.
struct StatusResource;

#[async_trait]
impl Resource for StatusResource {
    fn uri(&self) -> &str {
        "asms://system/status"
    }

    fn name(&self) -> &str {
        "system-status"
    }

    fn description(&self) -> &str {
        "Aggregate control-plane status"
    }

    async fn get(&self, _ctx: &RequestContext) -> Result<Value, UnitError> {
        Ok(json!({"status": "healthy", "timestamp": chrono::Utc::now().to_rfc3339()}))
    }

    async fn watch(
        &self,
        ctx: &RequestContext,
    ) -> Result<mpsc::Receiver<ResourceUpdate>, UnitError> {
        let (tx, rx) = mpsc::channel(4);
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(10));
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => break,
                    _ = tick.tick() => {
                        let update = ResourceUpdate::new(
                            "asms://system/status",
                            json!({"status": "healthy"}),
                        );
                        if tx.send(update).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Ok(rx)
    }
}

/// Registers the built-in units. Registration failures here mean a name
/// collision with a domain unit, which is a startup bug worth surfacing.
pub fn register(registry: &InMemoryRegistry) -> Result<(), asms_core::RegistryError> {
    registry.register_command(Arc::new(PingCommand))?;
    registry.register_query(Arc::new(InfoQuery))?;
    registry.register_resource(Arc::new(StatusResource))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builtin_units_register_and_respond() {
        let registry = InMemoryRegistry::new();
        register(&registry).unwrap();

        use asms_core::UnitRegistry;
        let ping = registry.get_command("system.ping").unwrap();
        let ctx = RequestContext::new(None);
        let result = ping.execute(&ctx, &Map::new()).await.unwrap();
        assert_eq!(result["ok"], true);

        assert!(registry.get_query("system.info").is_some());
        assert!(registry.get_resource("asms://system/status").is_some());
    }
}
