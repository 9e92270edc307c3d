//! The Host orchestrates the instance registry, peer table, token
//! authority, and peer discovery.
//!
//! A host is constructed once at process start and passed by reference to
//! the transport and CLI layers; there is no global singleton, so several
//! independent hosts can coexist in one process (tests rely on this).

use crate::machine::machine_info;
use crate::paths::{restrict_file_permissions, HostPaths};
use crate::peers::{Peer, PeerDirectory, PeerSource, PeerTable};
use crate::proxy::Proxy;
use crate::registry::{Instance, InstanceRegistry, TypeRegistry};
use crate::spawn::spawn_peer;
use crate::supervisor::{self, SupervisionConfig, Supervisor, DEFAULT_CHECK_INTERVAL_SECS};
use crate::token::{generate_secret, TokenAuthority};
use chrono::{DateTime, Utc};
use peerhost_types::{
    EnvironSpec, HostError, HostResult, MachineInfo, Manifest, ProcessInfo, ServerBinding,
    TokenClaims, TypeSpec,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Authorization mode for a host.
#[derive(Debug, Clone)]
pub enum AuthKey {
    /// All tokens accepted, including malformed ones. Local development only.
    Disabled,
    /// Tokens must verify against this shared secret.
    Secret(String),
}

/// Host construction parameters.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Host id; generated when None.
    pub id: Option<String>,
    /// Package name advertised in the manifest.
    pub package: String,
    /// Package version advertised in the manifest.
    pub version: String,
    /// Shared secret; generated when None (unless auth is disabled).
    pub key: Option<String>,
    /// Disable authorization entirely (also set by `PEERHOST_INSECURE`).
    pub insecure: bool,
    /// Command argv peers use to spawn this host.
    pub spawn: Vec<String>,
    /// Idle/duration supervision thresholds.
    pub supervision: SupervisionConfig,
    /// Filesystem layout.
    pub paths: HostPaths,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            id: None,
            package: "peerhost".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            key: None,
            insecure: insecure_from_env(),
            spawn: vec![],
            supervision: SupervisionConfig::default(),
            paths: HostPaths::default_layout(),
        }
    }
}

/// Whether the environment toggle disables authorization.
pub fn insecure_from_env() -> bool {
    std::env::var("PEERHOST_INSECURE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Result of a create: the allocated registry name plus a representation.
#[derive(Debug, Clone, Serialize)]
pub struct CreateResult {
    /// Registry name, e.g. `nodeContext1`.
    pub name: String,
    /// Representation of the new instance.
    pub value: Value,
}

/// A process-local capability host.
pub struct Host {
    id: String,
    auth: AuthKey,
    package: String,
    version: String,
    spawn: Vec<String>,
    types: TypeRegistry,
    registry: InstanceRegistry,
    peers: PeerTable,
    directory: PeerDirectory,
    sources: RwLock<Vec<Box<dyn PeerSource>>>,
    paths: HostPaths,
    machine: MachineInfo,
    started: DateTime<Utc>,
    last_heartbeat: RwLock<DateTime<Utc>>,
    servers: RwLock<HashMap<String, ServerBinding>>,
    environs: Vec<EnvironSpec>,
    running_environs: RwLock<HashSet<String>>,
    supervision: SupervisionConfig,
    supervisor: Supervisor,
    client: reqwest::Client,
    registered: AtomicBool,
}

impl Host {
    /// Create a host with the given local type registry. Does not touch the
    /// filesystem; call [`Host::start`] to register on disk.
    pub fn new(config: HostConfig, types: TypeRegistry) -> Self {
        let id = config
            .id
            .unwrap_or_else(|| format!("peerhost-{}", uuid::Uuid::new_v4().simple()));
        let auth = if config.insecure {
            AuthKey::Disabled
        } else {
            AuthKey::Secret(config.key.unwrap_or_else(generate_secret))
        };
        let environs = load_environs(&config.paths);
        let now = Utc::now();

        Self {
            id,
            auth,
            package: config.package,
            version: config.version,
            spawn: config.spawn,
            types,
            registry: InstanceRegistry::new(),
            peers: PeerTable::new(),
            directory: PeerDirectory::new(config.paths.clone()),
            sources: RwLock::new(Vec::new()),
            paths: config.paths,
            machine: machine_info(),
            started: now,
            last_heartbeat: RwLock::new(now),
            servers: RwLock::new(HashMap::new()),
            environs,
            running_environs: RwLock::new(HashSet::new()),
            supervision: config.supervision,
            supervisor: Supervisor::new(),
            client: reqwest::Client::new(),
            registered: AtomicBool::new(false),
        }
    }

    /// Host id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether authorization is disabled.
    pub fn auth_disabled(&self) -> bool {
        matches!(self.auth, AuthKey::Disabled)
    }

    /// The supervisor, for shutdown subscription.
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Known peers, for inspection.
    pub fn peers(&self) -> Vec<Peer> {
        self.peers.all()
    }

    /// Build the host's manifest: identity, capabilities, and (once
    /// started) machine, process, server, and instance info. Cheap and
    /// safe to call anytime.
    pub fn manifest(&self) -> Manifest {
        let mut types: HashMap<String, TypeSpec> = self
            .types
            .specs()
            .into_iter()
            .map(|spec| (spec.name.clone(), spec))
            .collect();

        // Re-advertise peer types, but local types always win.
        for peer in self.peers.all() {
            if let Some(manifest) = &peer.manifest {
                for (name, spec) in &manifest.types {
                    types.entry(name.clone()).or_insert_with(|| TypeSpec {
                        name: spec.name.clone(),
                        local: false,
                        description: spec.description.clone(),
                    });
                }
            }
        }

        let servers = self
            .servers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        Manifest {
            package: self.package.clone(),
            version: self.version.clone(),
            id: self.id.clone(),
            spawn: self.spawn.clone(),
            environs: self.environs.clone(),
            types,
            machine: Some(self.machine.clone()),
            process: Some(ProcessInfo {
                pid: std::process::id(),
            }),
            servers,
            instances: self.registry.names(),
        }
    }

    /// Register on disk: write the key file (mode 600) and the manifest
    /// into the active-hosts directory.
    pub fn start(&self) -> HostResult<()> {
        self.paths.ensure_active_dir()?;
        if let AuthKey::Secret(secret) = &self.auth {
            let key_path = self.paths.key_file(&self.id);
            std::fs::write(&key_path, secret)?;
            restrict_file_permissions(&key_path);
        }
        self.registered.store(true, Ordering::SeqCst);
        self.write_manifest()?;
        info!(host = %self.id, "Host started");
        Ok(())
    }

    /// Deregister: delete the manifest and key files and signal shutdown.
    pub fn stop(&self) {
        if self.registered.swap(false, Ordering::SeqCst) {
            let _ = std::fs::remove_file(self.paths.manifest_file(&self.id));
            let _ = std::fs::remove_file(self.paths.key_file(&self.id));
            info!(host = %self.id, "Host stopped");
        }
        self.supervisor.shutdown();
    }

    /// Record a transport binding and refresh the on-disk manifest.
    pub fn register_server(&self, transport: &str, binding: ServerBinding) -> HostResult<()> {
        self.servers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(transport.to_string(), binding);
        self.write_manifest()
    }

    fn write_manifest(&self) -> HostResult<()> {
        if !self.registered.load(Ordering::SeqCst) {
            return Ok(());
        }
        let path = self.paths.manifest_file(&self.id);
        std::fs::write(&path, serde_json::to_string_pretty(&self.manifest())?)?;
        restrict_file_permissions(&path);
        Ok(())
    }

    /// Stamp the heartbeat. Called implicitly by create/get/call/delete and
    /// explicitly by peers.
    pub fn heartbeat(&self) {
        *self.last_heartbeat.write().unwrap_or_else(|e| e.into_inner()) = Utc::now();
    }

    /// Seconds since the last heartbeat.
    pub fn idle_secs(&self) -> i64 {
        let last = *self.last_heartbeat.read().unwrap_or_else(|e| e.into_inner());
        (Utc::now() - last).num_seconds()
    }

    /// Create an instance of a type, locally or on a peer.
    ///
    /// The registry name is allocated synchronously before any await, so
    /// concurrent creates for the same type never collide. Remote creations
    /// are stored as proxies under the local name; callers cannot tell
    /// local from remote instances by name.
    pub async fn create(&self, type_name: &str, options: Value) -> HostResult<CreateResult> {
        self.heartbeat();

        if let Some(construct) = self.types.get(type_name) {
            let name = self.registry.allocate(type_name);
            let mut instance = construct(options)?;
            instance.initialize().await?;
            let value = instance
                .repr()
                .unwrap_or_else(|| json!({"type": type_name, "name": name}));
            self.registry.insert(
                &name,
                type_name,
                Instance::Local(Arc::new(Mutex::new(instance))),
            );
            debug!(host = %self.id, instance = %name, "Created local instance");
            return Ok(CreateResult { name, value });
        }

        let peer = self
            .peers
            .find_advertising(type_name)
            .ok_or_else(|| HostError::UnknownType(type_name.to_string()))?;
        let peer = self.ensure_active(peer).await?;
        self.create_remote(&peer, type_name, options).await
    }

    /// Make sure a peer is running, spawning it if its manifest is inactive.
    async fn ensure_active(&self, peer: Peer) -> HostResult<Peer> {
        let active = peer.manifest.as_ref().is_some_and(|m| m.is_active());
        if active {
            return Ok(peer);
        }
        let argv = peer
            .manifest
            .as_ref()
            .map(|m| m.spawn.clone())
            .unwrap_or_default();
        let spawned = self.spawn_peer_command(&argv).await?;
        self.peers
            .get(&spawned)
            .ok_or_else(|| HostError::SpawnFailed(format!("peer {spawned} did not register")))
    }

    /// Launch a peer subprocess and register its handshake manifest,
    /// loading its freshly written secret from the active directory.
    /// Returns the spawned peer's id.
    pub async fn spawn_peer_command(&self, argv: &[String]) -> HostResult<String> {
        let manifest = spawn_peer(argv).await?;
        let id = manifest.id.clone();
        let key = std::fs::read_to_string(self.paths.key_file(&id))
            .ok()
            .map(|k| k.trim().to_string());
        self.peers.register(manifest, key);
        Ok(id)
    }

    async fn create_remote(
        &self,
        peer: &Peer,
        type_name: &str,
        options: Value,
    ) -> HostResult<CreateResult> {
        let manifest = peer
            .manifest
            .as_ref()
            .ok_or_else(|| HostError::PeerUnreachable(format!("peer {} has no manifest", peer.id)))?;
        let base = manifest.server_url("http").ok_or_else(|| {
            HostError::PeerUnreachable(format!("peer {} has no http server", peer.id))
        })?;
        let token = self.generate_token(&peer.id)?;
        let response = self
            .client
            .post(format!("{base}/{type_name}"))
            .bearer_auth(token)
            .json(&options)
            .send()
            .await
            .map_err(|e| HostError::PeerUnreachable(format!("{base}: {e}")))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| HostError::PeerUnreachable(e.to_string()))?;
        let remote_name = body["name"].as_str().ok_or_else(|| {
            HostError::PeerUnreachable(format!("peer {} create response missing name", peer.id))
        })?;

        let name = self.registry.allocate(type_name);
        let proxy = Proxy::new(&peer.id, format!("{base}/{remote_name}"));
        self.registry
            .insert(&name, type_name, Instance::Remote(proxy));
        debug!(host = %self.id, instance = %name, peer = %peer.id, "Created remote instance");
        Ok(CreateResult {
            name,
            value: body.get("value").cloned().unwrap_or(body),
        })
    }

    /// Get an instance's representation: the proxy's remote GET, or the
    /// local `repr()`, or a shallow snapshot.
    pub async fn get(&self, name: &str) -> HostResult<Value> {
        self.heartbeat();
        let entry = self.registry.get(name)?;
        match entry.instance {
            Instance::Local(cell) => {
                let guard = cell.lock().await;
                Ok(guard
                    .repr()
                    .unwrap_or_else(|| json!({"type": entry.type_name, "name": name})))
            }
            Instance::Remote(proxy) => {
                let token = self.generate_token(&proxy.peer_id)?;
                proxy.get(&self.client, &token).await
            }
        }
    }

    /// Call a method on an instance.
    ///
    /// Resolution failures (unknown instance) propagate, but any error
    /// raised during invocation (unknown method, a handler error, an
    /// unreachable peer) is contained as an errors-as-data payload so the
    /// transport always answers 200 for application-level failures.
    pub async fn call(&self, name: &str, method: &str, args: Value) -> HostResult<Value> {
        self.heartbeat();
        let entry = self.registry.get(name)?;
        let result = match entry.instance {
            Instance::Local(cell) => {
                let mut guard = cell.lock().await;
                guard.call(method, args).await
            }
            Instance::Remote(proxy) => match self.generate_token(&proxy.peer_id) {
                Ok(token) => proxy.call(&self.client, &token, method, args).await,
                Err(e) => Err(e),
            },
        };
        Ok(result.unwrap_or_else(|e| error_payload(&e)))
    }

    /// Delete an instance, awaiting its optional `finalize` hook. The name
    /// is never reused.
    pub async fn delete(&self, name: &str) -> HostResult<()> {
        self.heartbeat();
        let entry = self.registry.remove(name)?;
        if let Instance::Local(cell) = entry.instance {
            let mut guard = cell.lock().await;
            if let Err(e) = guard.finalize().await {
                warn!(instance = %name, error = %e, "Finalize hook failed");
            }
        }
        debug!(host = %self.id, instance = %name, "Deleted instance");
        Ok(())
    }

    /// Mint a bearer token for calling the given peer, signed with the
    /// peer's secret and carrying the next outbound sequence.
    pub fn generate_token(&self, peer_id: &str) -> HostResult<String> {
        let key = match self.peers.get(peer_id).and_then(|p| p.key) {
            Some(key) => key,
            None => {
                // The peer may have registered since we last scanned.
                self.discover_peers();
                self.peers.get(peer_id).and_then(|p| p.key).ok_or_else(|| {
                    HostError::PeerUnreachable(format!("no shared secret for peer {peer_id}"))
                })?
            }
        };
        let seq = self.peers.next_sent(peer_id);
        let claims = TokenClaims::new(&self.id, seq, Utc::now().timestamp());
        TokenAuthority::sign(&claims, &key)
    }

    /// Verify an inbound bearer token and enforce the anti-replay sequence.
    ///
    /// With auth disabled, any input is accepted, malformed or not.
    pub fn authorize_token(&self, token: &str) -> HostResult<Option<TokenClaims>> {
        let secret = match &self.auth {
            AuthKey::Disabled => return Ok(None),
            AuthKey::Secret(secret) => secret,
        };
        let claims = TokenAuthority::verify(token, secret)?;
        self.peers.accept_received(&claims.hid, claims.seq)?;
        Ok(Some(claims))
    }

    /// Plug in an additional discovery source, consulted by
    /// [`Host::discover_peers`] after the directory scans.
    pub fn register_peer_source(&self, source: Box<dyn PeerSource>) {
        self.sources
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(source);
    }

    /// Re-scan the well-known locations for peer manifests, then consult
    /// any registered [`PeerSource`]s. At-least-once, re-runnable; returns
    /// how many manifests were registered.
    pub fn discover_peers(&self) -> usize {
        let mut n = self.directory.scan(&self.peers, &self.id);
        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        for source in sources.iter() {
            for (manifest, key) in source.peers() {
                if manifest.id == self.id {
                    continue;
                }
                debug!(host = %self.id, peer = %manifest.id, source = source.name(), "Discovered peer");
                self.peers.register(manifest, key);
                n += 1;
            }
        }
        debug!(host = %self.id, peers = n, "Peer discovery complete");
        n
    }

    /// Start a named execution environment.
    pub fn environ_startup(&self, id: &str) -> HostResult<()> {
        self.heartbeat();
        if !self.environs.iter().any(|e| e.id == id) {
            return Err(HostError::UnknownEnviron(id.to_string()));
        }
        self.running_environs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string());
        Ok(())
    }

    /// Shut down a running execution environment.
    pub fn environ_shutdown(&self, id: &str) -> HostResult<()> {
        self.heartbeat();
        let removed = self
            .running_environs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        if removed {
            Ok(())
        } else {
            Err(HostError::UnknownEnviron(id.to_string()))
        }
    }

    /// Run the idle/duration supervision poll until shutdown.
    ///
    /// A fixed-interval poll, not event-driven; a threshold breach stops
    /// the host.
    pub async fn run_supervision(self: Arc<Self>) {
        let mut shutdown = self.supervisor.subscribe();
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let last = *self.last_heartbeat.read().unwrap_or_else(|e| e.into_inner());
                    if let Some(reason) =
                        supervisor::check(&self.supervision, self.started, last, Utc::now())
                    {
                        info!(host = %self.id, ?reason, "Supervision threshold breached");
                        self.stop();
                        return;
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    }
}

/// Errors-as-data payload for contained method-invocation failures.
fn error_payload(e: &HostError) -> Value {
    json!({
        "messages": [{
            "type": "error",
            "message": e.to_string(),
            "stack": format!("{e:?}"),
        }]
    })
}

/// Supported environs: the built-in `local` plus any descriptors found in
/// the persistent environs directory.
fn load_environs(paths: &HostPaths) -> Vec<EnvironSpec> {
    let mut environs = vec![EnvironSpec {
        id: "local".to_string(),
        name: Some("Local".to_string()),
        version: None,
    }];
    if let Ok(entries) = std::fs::read_dir(&paths.environs) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(HostError::from)
                .and_then(|s| serde_json::from_str::<EnvironSpec>(&s).map_err(HostError::from))
            {
                Ok(spec) => {
                    if !environs.iter().any(|e| e.id == spec.id) {
                        environs.push(spec);
                    }
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping environ descriptor"),
            }
        }
    }
    environs
}
