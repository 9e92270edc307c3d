//! Host manifests: the on-disk self-description of a running or installed host.
//!
//! A manifest describes a host's identity and capabilities: package/version,
//! host id, the command used to spawn it, the execution environments it
//! supports, and its type registry. Once a host has started, the manifest is
//! enriched with machine, process, server, and instance information so that
//! peers can reach it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A capability type advertised by a host.
///
/// `local` is true when the host serves the type directly, false when it is
/// re-advertising a type that actually lives on one of its own peers.
/// Locally-served types always take precedence over peer-advertised types of
/// the same name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeSpec {
    /// Type name, e.g. `NodeContext`.
    pub name: String,
    /// Whether this host constructs the type itself.
    pub local: bool,
    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A named execution environment a host can start instances within.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironSpec {
    /// Environ id, e.g. `local`.
    pub id: String,
    /// Optional human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional version constraint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Stable machine identity, so peers can tell same-machine hosts apart from
/// stale manifests copied between machines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MachineInfo {
    /// MAC address of the first non-loopback interface, or the local IP when
    /// no MAC is readable.
    pub id: String,
    /// Local IP address.
    pub ip: String,
}

/// Process information recorded once a host has started.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessInfo {
    /// OS process id.
    pub pid: u32,
}

/// A transport binding a started host is serving on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerBinding {
    /// Bound address, e.g. `127.0.0.1`.
    pub address: String,
    /// Bound port.
    pub port: u16,
    /// Base URL peers should use to reach this binding.
    pub url: String,
}

/// A host's self-description, serialized to `<id>.json` on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// Package name.
    pub package: String,
    /// Package version.
    pub version: String,
    /// Host id (opaque, unique per process).
    pub id: String,
    /// Command argv used to spawn this host as a subprocess.
    #[serde(default)]
    pub spawn: Vec<String>,
    /// Execution environments this host supports.
    #[serde(default)]
    pub environs: Vec<EnvironSpec>,
    /// Type registry: type name → spec.
    #[serde(default)]
    pub types: HashMap<String, TypeSpec>,
    /// Machine identity (present once started).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<MachineInfo>,
    /// Process info (present once started).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<ProcessInfo>,
    /// Server bindings by transport name (present once started).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub servers: HashMap<String, ServerBinding>,
    /// Names of currently live instances (present once started).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<String>,
}

impl Manifest {
    /// Whether this manifest describes a currently active host.
    ///
    /// A manifest is active when it carries live process info; inactive
    /// manifests describe installed-but-not-running hosts that must be
    /// spawned before use.
    pub fn is_active(&self) -> bool {
        self.process.is_some()
    }

    /// Whether this host advertises the given type (local or re-advertised).
    pub fn advertises(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Base URL of the named server binding, if the host is started.
    pub fn server_url(&self, transport: &str) -> Option<&str> {
        self.servers.get(transport).map(|b| b.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest() -> Manifest {
        let mut types = HashMap::new();
        types.insert(
            "NodeContext".to_string(),
            TypeSpec {
                name: "NodeContext".to_string(),
                local: true,
                description: None,
            },
        );
        types.insert(
            "SheetConverter".to_string(),
            TypeSpec {
                name: "SheetConverter".to_string(),
                local: false,
                description: Some("re-advertised from a peer".to_string()),
            },
        );
        Manifest {
            package: "peerhost".to_string(),
            version: "0.1.0".to_string(),
            id: "host-abc123".to_string(),
            spawn: vec!["peerhost".to_string(), "serve".to_string()],
            environs: vec![EnvironSpec {
                id: "local".to_string(),
                name: None,
                version: None,
            }],
            types,
            machine: None,
            process: None,
            servers: HashMap::new(),
            instances: vec![],
        }
    }

    #[test]
    fn test_inactive_until_process_recorded() {
        let mut manifest = sample_manifest();
        assert!(!manifest.is_active());

        manifest.process = Some(ProcessInfo { pid: 4242 });
        assert!(manifest.is_active());
    }

    #[test]
    fn test_advertises_types_regardless_of_local_flag() {
        let manifest = sample_manifest();
        assert!(manifest.advertises("NodeContext"));
        assert!(manifest.advertises("SheetConverter"));
        assert!(!manifest.advertises("Unknown"));
    }

    #[test]
    fn test_serde_round_trip_preserves_local_flags() {
        let mut manifest = sample_manifest();
        manifest.process = Some(ProcessInfo { pid: 1 });
        manifest.servers.insert(
            "http".to_string(),
            ServerBinding {
                address: "127.0.0.1".to_string(),
                port: 2000,
                url: "http://127.0.0.1:2000".to_string(),
            },
        );

        let json = serde_json::to_string(&manifest).unwrap();
        let back: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, manifest);
        assert!(back.types["NodeContext"].local);
        assert!(!back.types["SheetConverter"].local);
        assert_eq!(back.spawn, vec!["peerhost", "serve"]);
    }

    #[test]
    fn test_minimal_manifest_deserializes() {
        // Installed-host manifests may omit every started-only field.
        let json = r#"{"package":"other","version":"2.0.0","id":"host-x"}"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        assert!(!manifest.is_active());
        assert!(manifest.types.is_empty());
        assert!(manifest.server_url("http").is_none());
    }
}
