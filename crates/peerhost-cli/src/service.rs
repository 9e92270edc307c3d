//! Built-in service types registered by the CLI binary.
//!
//! Real deployments register their own types; the built-in echo context
//! keeps a bare binary usable end to end (and exercisable by peers).

use async_trait::async_trait;
use peerhost_host::{MethodTable, ServiceInstance, TypeRegistry};
use peerhost_types::HostResult;
use serde_json::{json, Value};
use std::sync::OnceLock;

/// Echoes its arguments back; counts calls.
pub struct EchoContext {
    greeting: String,
    calls: u64,
}

impl EchoContext {
    fn table() -> &'static MethodTable<EchoContext> {
        static TABLE: OnceLock<MethodTable<EchoContext>> = OnceLock::new();
        TABLE.get_or_init(|| {
            MethodTable::new()
                .register("echo", |ctx: &mut EchoContext, args| Box::pin(ctx.echo(args)))
                .register("greet", |ctx: &mut EchoContext, args| Box::pin(ctx.greet(args)))
        })
    }

    async fn echo(&mut self, args: Value) -> HostResult<Value> {
        self.calls += 1;
        Ok(json!({"echo": args, "calls": self.calls}))
    }

    async fn greet(&mut self, args: Value) -> HostResult<Value> {
        self.calls += 1;
        let name = args["name"].as_str().unwrap_or("world");
        Ok(json!(format!("{} {}", self.greeting, name)))
    }
}

#[async_trait]
impl ServiceInstance for EchoContext {
    async fn call(&mut self, method: &str, args: Value) -> HostResult<Value> {
        Self::table().dispatch(self, method, args).await
    }

    fn repr(&self) -> Option<Value> {
        Some(json!({
            "type": "EchoContext",
            "greeting": self.greeting,
            "calls": self.calls,
        }))
    }
}

/// The CLI's type registry.
pub fn builtin_types() -> TypeRegistry {
    let mut types = TypeRegistry::new();
    types.register("EchoContext", |options: Value| {
        let greeting = options["greeting"].as_str().unwrap_or("hello").to_string();
        Ok(Box::new(EchoContext { greeting, calls: 0 }) as Box<dyn ServiceInstance>)
    });
    types
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_context_greet() {
        let construct = builtin_types().get("EchoContext").unwrap();
        let mut instance = construct(json!({"greeting": "hei"})).unwrap();
        let out = instance.call("greet", json!({"name": "verden"})).await.unwrap();
        assert_eq!(out, json!("hei verden"));
    }

    #[tokio::test]
    async fn test_echo_context_repr() {
        let construct = builtin_types().get("EchoContext").unwrap();
        let instance = construct(Value::Null).unwrap();
        assert_eq!(instance.repr().unwrap()["greeting"], "hello");
    }
}
