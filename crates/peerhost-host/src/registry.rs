//! Instance registry: named service instances, local or remote.
//!
//! The registry maps instance names to either a local service object or a
//! [`Proxy`](crate::proxy::Proxy) pointing at a peer. Names are allocated
//! from per-type counters (`nodeContext1`, `nodeContext2`, …), strictly
//! increasing and never reused, even after deletion. Allocation happens
//! under the registry lock, which is never held across an await, so
//! concurrent creates for the same type cannot collide.

use crate::proxy::Proxy;
use async_trait::async_trait;
use futures::future::BoxFuture;
use peerhost_types::{HostError, HostResult, TypeSpec};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

/// Contract every local service type implements.
///
/// `initialize` and `finalize` are optional lifecycle hooks; `repr` is an
/// optional self-description used by `get`. Method dispatch goes through
/// `call`, typically backed by a [`MethodTable`].
#[async_trait]
pub trait ServiceInstance: Send + Sync {
    /// Called once after construction, before the instance is registered.
    async fn initialize(&mut self) -> HostResult<()> {
        Ok(())
    }

    /// Invoke a named method with JSON arguments.
    async fn call(&mut self, method: &str, args: Value) -> HostResult<Value>;

    /// Optional self-description returned by `get`.
    fn repr(&self) -> Option<Value> {
        None
    }

    /// Called once before the instance is removed from the registry.
    async fn finalize(&mut self) -> HostResult<()> {
        Ok(())
    }
}

/// Handler signature for a single method on a service of type `T`.
pub type MethodHandler<T> =
    for<'a> fn(&'a mut T, Value) -> BoxFuture<'a, HostResult<Value>>;

/// Explicit per-type capability table: method name → typed handler.
///
/// Replaces reflective `instance[method]` dispatch; a method not present in
/// the table is an [`HostError::UnknownMethod`].
pub struct MethodTable<T> {
    handlers: HashMap<&'static str, MethodHandler<T>>,
}

impl<T> MethodTable<T> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under a method name.
    pub fn register(mut self, method: &'static str, handler: MethodHandler<T>) -> Self {
        self.handlers.insert(method, handler);
        self
    }

    /// Dispatch a call through the table.
    pub async fn dispatch(&self, target: &mut T, method: &str, args: Value) -> HostResult<Value> {
        match self.handlers.get(method) {
            Some(handler) => handler(target, args).await,
            None => Err(HostError::UnknownMethod(method.to_string())),
        }
    }

    /// Names of all registered methods, for introspection.
    pub fn method_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl<T> Default for MethodTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Constructor for a locally registered type.
pub type Constructor =
    Arc<dyn Fn(Value) -> HostResult<Box<dyn ServiceInstance>> + Send + Sync>;

/// Registry of locally constructible types.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Constructor>,
}

impl TypeRegistry {
    /// Create an empty type registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under a type name.
    pub fn register<F>(&mut self, name: impl Into<String>, construct: F)
    where
        F: Fn(Value) -> HostResult<Box<dyn ServiceInstance>> + Send + Sync + 'static,
    {
        self.types.insert(name.into(), Arc::new(construct));
    }

    /// Look up a constructor.
    pub fn get(&self, name: &str) -> Option<Constructor> {
        self.types.get(name).cloned()
    }

    /// Whether a type is registered locally.
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Type specs for the manifest, all marked `local`.
    pub fn specs(&self) -> Vec<TypeSpec> {
        let mut specs: Vec<TypeSpec> = self
            .types
            .keys()
            .map(|name| TypeSpec {
                name: name.clone(),
                local: true,
                description: None,
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

/// A registered instance: local service object or remote proxy.
///
/// Locals are behind an async mutex so method calls can hold exclusive
/// access across awaits without the registry lock being involved.
#[derive(Clone)]
pub enum Instance {
    /// Constructed in this process.
    Local(Arc<Mutex<Box<dyn ServiceInstance>>>),
    /// Lives on a peer; reached through a proxy.
    Remote(Proxy),
}

/// A registry entry: the instance plus the type it was created from.
#[derive(Clone)]
pub struct Registered {
    /// Type name the instance was created from.
    pub type_name: String,
    /// The instance itself.
    pub instance: Instance,
}

impl std::fmt::Debug for Registered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registered")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RegistryInner {
    instances: HashMap<String, Registered>,
    counts: HashMap<String, u64>,
}

/// Thread-safe map from instance name to instance.
///
/// The inner lock is only ever held for synchronous map operations.
#[derive(Default)]
pub struct InstanceRegistry {
    inner: RwLock<RegistryInner>,
}

impl InstanceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next name for a type: `lowerFirst(type) + n`.
    ///
    /// The counter bump is atomic under the write lock, so the returned name
    /// is reserved even though the instance is registered later (after its
    /// `initialize` hook has run).
    pub fn allocate(&self, type_name: &str) -> String {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let count = inner.counts.entry(type_name.to_string()).or_insert(0);
        *count += 1;
        format!("{}{}", lower_first(type_name), count)
    }

    /// Register an instance under a previously allocated name.
    pub fn insert(&self, name: &str, type_name: &str, instance: Instance) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.instances.insert(
            name.to_string(),
            Registered {
                type_name: type_name.to_string(),
                instance,
            },
        );
    }

    /// Resolve a name to its entry.
    pub fn get(&self, name: &str) -> HostResult<Registered> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .instances
            .get(name)
            .cloned()
            .ok_or_else(|| HostError::UnknownInstance(name.to_string()))
    }

    /// Remove a name, returning its entry. Counters are untouched so the
    /// name is never reissued.
    pub fn remove(&self, name: &str) -> HostResult<Registered> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner
            .instances
            .remove(name)
            .ok_or_else(|| HostError::UnknownInstance(name.to_string()))
    }

    /// Names of all live instances, sorted.
    pub fn names(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = inner.instances.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.instances.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lowercase the first character of a type name.
fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Null;

    #[async_trait]
    impl ServiceInstance for Null {
        async fn call(&mut self, method: &str, _args: Value) -> HostResult<Value> {
            Err(HostError::UnknownMethod(method.to_string()))
        }
    }

    fn local_null() -> Instance {
        Instance::Local(Arc::new(Mutex::new(Box::new(Null))))
    }

    #[test]
    fn test_names_are_monotonic_and_prefixed() {
        let registry = InstanceRegistry::new();
        assert_eq!(registry.allocate("NodeContext"), "nodeContext1");
        assert_eq!(registry.allocate("NodeContext"), "nodeContext2");
        assert_eq!(registry.allocate("SheetConverter"), "sheetConverter1");
        assert_eq!(registry.allocate("NodeContext"), "nodeContext3");
    }

    #[test]
    fn test_names_not_reused_after_delete() {
        let registry = InstanceRegistry::new();
        let name = registry.allocate("Echo");
        registry.insert(&name, "Echo", local_null());
        registry.remove(&name).unwrap();
        assert_eq!(registry.allocate("Echo"), "echo2");
    }

    #[test]
    fn test_get_unknown_instance() {
        let registry = InstanceRegistry::new();
        let err = registry.get("nope1").unwrap_err();
        assert!(matches!(err, HostError::UnknownInstance(_)));
    }

    #[test]
    fn test_remove_twice_fails() {
        let registry = InstanceRegistry::new();
        let name = registry.allocate("Echo");
        registry.insert(&name, "Echo", local_null());
        assert!(registry.remove(&name).is_ok());
        assert!(matches!(
            registry.remove(&name),
            Err(HostError::UnknownInstance(_))
        ));
    }

    #[test]
    fn test_concurrent_allocation_never_collides() {
        let registry = Arc::new(InstanceRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                (0..100)
                    .map(|_| registry.allocate("NodeContext"))
                    .collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
    }

    struct Counter {
        value: i64,
    }

    impl Counter {
        async fn add(&mut self, args: Value) -> HostResult<Value> {
            self.value += args["amount"].as_i64().unwrap_or(1);
            Ok(serde_json::json!(self.value))
        }
    }

    fn counter_table() -> MethodTable<Counter> {
        MethodTable::new().register("add", |c, args| Box::pin(c.add(args)))
    }

    #[tokio::test]
    async fn test_method_table_dispatch() {
        let table = counter_table();
        let mut counter = Counter { value: 0 };
        let out = table
            .dispatch(&mut counter, "add", serde_json::json!({"amount": 5}))
            .await
            .unwrap();
        assert_eq!(out, serde_json::json!(5));
    }

    #[tokio::test]
    async fn test_method_table_unknown_method() {
        let table = counter_table();
        let mut counter = Counter { value: 0 };
        let err = table
            .dispatch(&mut counter, "subtract", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::UnknownMethod(_)));
        assert_eq!(table.method_names(), vec!["add"]);
    }

    #[test]
    fn test_lower_first() {
        assert_eq!(lower_first("NodeContext"), "nodeContext");
        assert_eq!(lower_first("x"), "x");
        assert_eq!(lower_first(""), "");
    }
}
