//! Peer table and on-disk peer discovery.
//!
//! The [`PeerTable`] tracks every sibling host this host knows about,
//! including the per-peer token sequence counters that provide anti-replay.
//! The [`PeerDirectory`] re-scans the active-hosts and installed-hosts
//! directories for manifests; discovery is an explicit, re-runnable
//! operation, not a watch.

use crate::paths::HostPaths;
use dashmap::DashMap;
use peerhost_types::{HostError, HostResult, Manifest};
use tracing::{debug, warn};

/// A known sibling host.
#[derive(Debug, Clone)]
pub struct Peer {
    /// Peer host id.
    pub id: String,
    /// Last manifest seen for this peer. None for peers known only from an
    /// inbound token.
    pub manifest: Option<Manifest>,
    /// The peer's shared secret, when its key file was readable.
    pub key: Option<String>,
    /// Last outbound token sequence issued *to* this peer.
    pub sent: u64,
    /// Highest inbound sequence accepted *from* this peer; the anti-replay
    /// floor.
    pub received: u64,
}

impl Peer {
    fn from_manifest(manifest: Manifest, key: Option<String>) -> Self {
        Self {
            id: manifest.id.clone(),
            manifest: Some(manifest),
            key,
            sent: 0,
            received: 0,
        }
    }
}

/// Thread-safe table of known peers, keyed by host id.
#[derive(Default)]
pub struct PeerTable {
    peers: DashMap<String, Peer>,
}

impl PeerTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a discovered peer, overwriting any prior entry with the
    /// same id (last-write-wins) but preserving its sequence counters.
    pub fn register(&self, manifest: Manifest, key: Option<String>) {
        let id = manifest.id.clone();
        match self.peers.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                let peer = entry.get_mut();
                peer.manifest = Some(manifest);
                if key.is_some() {
                    peer.key = key;
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Peer::from_manifest(manifest, key));
            }
        }
    }

    /// Snapshot of a peer.
    pub fn get(&self, id: &str) -> Option<Peer> {
        self.peers.get(id).map(|r| r.value().clone())
    }

    /// Snapshot of all peers, sorted by id.
    pub fn all(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.peers.iter().map(|r| r.value().clone()).collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        peers
    }

    /// Find a peer whose manifest advertises the given type.
    pub fn find_advertising(&self, type_name: &str) -> Option<Peer> {
        self.peers
            .iter()
            .filter(|r| {
                r.value()
                    .manifest
                    .as_ref()
                    .is_some_and(|m| m.advertises(type_name))
            })
            .map(|r| r.value().clone())
            .min_by(|a, b| a.id.cmp(&b.id))
    }

    /// Increment and return the outbound sequence for a peer.
    pub fn next_sent(&self, id: &str) -> u64 {
        let mut entry = self.peers.entry(id.to_string()).or_insert_with(|| Peer {
            id: id.to_string(),
            manifest: None,
            key: None,
            sent: 0,
            received: 0,
        });
        entry.sent += 1;
        entry.sent
    }

    /// Accept an inbound sequence from a peer, enforcing strict increase.
    ///
    /// The window has width 1: a sequence at or below the highest already
    /// accepted is a replay, even if it was legitimately issued out of
    /// order.
    pub fn accept_received(&self, id: &str, seq: u64) -> HostResult<()> {
        let mut entry = self.peers.entry(id.to_string()).or_insert_with(|| Peer {
            id: id.to_string(),
            manifest: None,
            key: None,
            sent: 0,
            received: 0,
        });
        if seq <= entry.received {
            return Err(HostError::AuthReplayed {
                hid: id.to_string(),
                seq,
            });
        }
        entry.received = seq;
        Ok(())
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// An additional source of peer manifests, consulted after the directory
/// scans.
///
/// Lets deployments plug in discovery of externally installed providers
/// without touching the scan itself. Sources yield manifests plus an
/// optional shared secret; each is registered like a scanned manifest.
pub trait PeerSource: Send + Sync {
    /// Source name, for logging.
    fn name(&self) -> &str;

    /// Manifests this source can currently provide.
    fn peers(&self) -> Vec<(Manifest, Option<String>)>;
}

/// Scans well-known filesystem locations for peer manifests.
pub struct PeerDirectory {
    paths: HostPaths,
}

impl PeerDirectory {
    /// Create a directory scanner over the given layout.
    pub fn new(paths: HostPaths) -> Self {
        Self { paths }
    }

    /// Scan the active directory, then the installed directory, registering
    /// every surviving manifest into the table. Returns how many manifests
    /// were registered.
    ///
    /// Registration is last-write-wins by peer id across the two locations;
    /// an installed manifest scanned second overwrites an active one for
    /// the same id.
    pub fn scan(&self, table: &PeerTable, self_id: &str) -> usize {
        let mut registered = 0;
        registered += self.scan_dir(&self.paths.active, table, self_id);
        registered += self.scan_dir(&self.paths.installed, table, self_id);
        registered
    }

    fn scan_dir(&self, dir: &std::path::Path, table: &PeerTable, self_id: &str) -> usize {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return 0, // missing location is not an error
        };

        let mut registered = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.load_manifest(&path, self_id) {
                Ok(Some((manifest, key))) => {
                    debug!(peer = %manifest.id, path = %path.display(), "Discovered peer");
                    table.register(manifest, key);
                    registered += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping peer manifest");
                }
            }
        }
        registered
    }

    /// Load and vet one manifest file. Returns None for manifests that are
    /// skipped without being an error (our own, dead process, missing key).
    fn load_manifest(
        &self,
        path: &std::path::Path,
        self_id: &str,
    ) -> HostResult<Option<(Manifest, Option<String>)>> {
        let contents = std::fs::read_to_string(path)?;
        let manifest: Manifest = serde_json::from_str(&contents)?;

        if manifest.id == self_id {
            return Ok(None);
        }

        if let Some(process) = &manifest.process {
            if !process_alive(process.pid) {
                debug!(peer = %manifest.id, pid = process.pid, "Skipping dead peer");
                return Ok(None);
            }
        }

        // A manifest with server bindings is only usable with its secret.
        let key = if manifest.servers.is_empty() {
            None
        } else {
            let key_path = path.with_extension("key");
            match std::fs::read_to_string(&key_path) {
                Ok(key) => Some(key.trim().to_string()),
                Err(_) => {
                    debug!(peer = %manifest.id, "Skipping peer without readable secret");
                    return Ok(None);
                }
            }
        };

        Ok(Some((manifest, key)))
    }
}

/// Probe process liveness with a signal-0 check.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
pub fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerhost_types::{ProcessInfo, ServerBinding, TypeSpec};
    use std::collections::HashMap;

    fn manifest(id: &str) -> Manifest {
        Manifest {
            package: "peerhost".to_string(),
            version: "0.1.0".to_string(),
            id: id.to_string(),
            spawn: vec![],
            environs: vec![],
            types: HashMap::new(),
            machine: None,
            process: None,
            servers: HashMap::new(),
            instances: vec![],
        }
    }

    fn manifest_with_type(id: &str, type_name: &str) -> Manifest {
        let mut m = manifest(id);
        m.types.insert(
            type_name.to_string(),
            TypeSpec {
                name: type_name.to_string(),
                local: true,
                description: None,
            },
        );
        m
    }

    fn write_manifest(dir: &std::path::Path, m: &Manifest) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            dir.join(format!("{}.json", m.id)),
            serde_json::to_string(m).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn test_sequence_counters() {
        let table = PeerTable::new();
        assert_eq!(table.next_sent("peer-1"), 1);
        assert_eq!(table.next_sent("peer-1"), 2);
        assert_eq!(table.next_sent("peer-2"), 1);

        assert!(table.accept_received("peer-1", 1).is_ok());
        assert!(table.accept_received("peer-1", 2).is_ok());
        // Replay of an already-accepted sequence
        assert!(matches!(
            table.accept_received("peer-1", 2),
            Err(HostError::AuthReplayed { seq: 2, .. })
        ));
        // Width-1 window: below the floor is also a replay
        assert!(table.accept_received("peer-1", 1).is_err());
        // Gaps are fine as long as the sequence increases
        assert!(table.accept_received("peer-1", 10).is_ok());
    }

    #[test]
    fn test_register_preserves_counters() {
        let table = PeerTable::new();
        table.accept_received("peer-1", 5).unwrap();
        table.register(manifest("peer-1"), Some("secret".to_string()));

        let peer = table.get("peer-1").unwrap();
        assert_eq!(peer.received, 5);
        assert_eq!(peer.key.as_deref(), Some("secret"));
        assert!(peer.manifest.is_some());
    }

    #[test]
    fn test_find_advertising() {
        let table = PeerTable::new();
        table.register(manifest_with_type("peer-b", "SheetConverter"), None);
        table.register(manifest_with_type("peer-a", "SheetConverter"), None);

        let found = table.find_advertising("SheetConverter").unwrap();
        assert_eq!(found.id, "peer-a"); // deterministic: lowest id wins
        assert!(table.find_advertising("Unknown").is_none());
    }

    #[test]
    fn test_scan_skips_own_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = HostPaths::under_root(tmp.path());
        write_manifest(&paths.active, &manifest("me"));
        write_manifest(&paths.active, &manifest("other"));

        let table = PeerTable::new();
        let n = PeerDirectory::new(paths).scan(&table, "me");
        assert_eq!(n, 1);
        assert!(table.get("me").is_none());
        assert!(table.get("other").is_some());
    }

    #[test]
    fn test_scan_skips_dead_process() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = HostPaths::under_root(tmp.path());

        let mut dead = manifest("dead");
        // PIDs near the u32 ceiling do not exist on any practical system.
        dead.process = Some(ProcessInfo { pid: u32::MAX - 1 });
        write_manifest(&paths.active, &dead);

        let mut alive = manifest("alive");
        alive.process = Some(ProcessInfo {
            pid: std::process::id(),
        });
        write_manifest(&paths.active, &alive);

        let table = PeerTable::new();
        PeerDirectory::new(paths).scan(&table, "me");
        assert!(table.get("dead").is_none());
        assert!(table.get("alive").is_some());
    }

    #[test]
    fn test_scan_requires_secret_for_served_manifests() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = HostPaths::under_root(tmp.path());

        let mut served = manifest("served");
        served.servers.insert(
            "http".to_string(),
            ServerBinding {
                address: "127.0.0.1".to_string(),
                port: 2010,
                url: "http://127.0.0.1:2010".to_string(),
            },
        );
        write_manifest(&paths.active, &served);

        let table = PeerTable::new();
        let dir = PeerDirectory::new(paths.clone());
        dir.scan(&table, "me");
        assert!(table.get("served").is_none(), "no key file, must be skipped");

        std::fs::write(paths.active.join("served.key"), "topsecret\n").unwrap();
        dir.scan(&table, "me");
        let peer = table.get("served").unwrap();
        assert_eq!(peer.key.as_deref(), Some("topsecret"));
    }

    #[test]
    fn test_scan_skips_unparsable_manifest_and_continues() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = HostPaths::under_root(tmp.path());
        std::fs::create_dir_all(&paths.active).unwrap();
        std::fs::write(paths.active.join("garbage.json"), "{not json").unwrap();
        write_manifest(&paths.active, &manifest("good"));

        let table = PeerTable::new();
        let n = PeerDirectory::new(paths).scan(&table, "me");
        assert_eq!(n, 1);
        assert!(table.get("good").is_some());
    }

    #[test]
    fn test_installed_overwrites_active_for_same_id() {
        // Documented last-write-wins quirk: the installed directory is
        // scanned second, so its entry replaces the active one.
        let tmp = tempfile::tempdir().unwrap();
        let paths = HostPaths::under_root(tmp.path());

        let mut active = manifest("twin");
        active.version = "1.0.0".to_string();
        write_manifest(&paths.active, &active);

        let mut installed = manifest("twin");
        installed.version = "2.0.0".to_string();
        write_manifest(&paths.installed, &installed);

        let table = PeerTable::new();
        PeerDirectory::new(paths).scan(&table, "me");
        let peer = table.get("twin").unwrap();
        assert_eq!(peer.manifest.unwrap().version, "2.0.0");
    }
}
