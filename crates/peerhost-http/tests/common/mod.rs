//! Shared fixtures for transport tests.
#![allow(dead_code)]

use async_trait::async_trait;
use peerhost_host::{
    Host, HostConfig, HostPaths, MethodTable, ServiceInstance, SupervisionConfig, TypeRegistry,
};
use peerhost_types::{HostError, HostResult};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::OnceLock;

/// Minimal local service type: echoes arguments, can fail on demand.
pub struct EchoContext {
    calls: u64,
}

impl EchoContext {
    fn table() -> &'static MethodTable<EchoContext> {
        static TABLE: OnceLock<MethodTable<EchoContext>> = OnceLock::new();
        TABLE.get_or_init(|| {
            MethodTable::new()
                .register("echo", |ctx: &mut EchoContext, args| Box::pin(ctx.echo(args)))
                .register("fail", |ctx: &mut EchoContext, args| Box::pin(ctx.fail(args)))
        })
    }

    async fn echo(&mut self, args: Value) -> HostResult<Value> {
        self.calls += 1;
        Ok(json!({"echo": args, "calls": self.calls}))
    }

    async fn fail(&mut self, _args: Value) -> HostResult<Value> {
        Err(HostError::Internal("echo deliberately failed".to_string()))
    }
}

#[async_trait]
impl ServiceInstance for EchoContext {
    async fn call(&mut self, method: &str, args: Value) -> HostResult<Value> {
        Self::table().dispatch(self, method, args).await
    }

    fn repr(&self) -> Option<Value> {
        Some(json!({"type": "EchoContext", "calls": self.calls}))
    }
}

/// Type registry containing only `EchoContext`.
pub fn echo_types() -> TypeRegistry {
    let mut types = TypeRegistry::new();
    types.register("EchoContext", |_options| {
        Ok(Box::new(EchoContext { calls: 0 }) as Box<dyn ServiceInstance>)
    });
    types
}

/// A host rooted in a test directory.
pub fn host_in(root: &Path, id: &str, key: Option<&str>, types: TypeRegistry) -> Host {
    Host::new(
        HostConfig {
            id: Some(id.to_string()),
            package: "peerhost".to_string(),
            version: "0.0.0-test".to_string(),
            key: key.map(|k| k.to_string()),
            insecure: key.is_none(),
            spawn: vec![],
            supervision: SupervisionConfig::default(),
            paths: HostPaths::under_root(root),
        },
        types,
    )
}

/// Current unix time, for minting test tokens.
pub fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs() as i64
}
