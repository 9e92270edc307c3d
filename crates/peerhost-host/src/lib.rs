//! Host registry, peer discovery, and token-authenticated delegation for
//! the peerhost capability host.
//!
//! ## Architecture
//!
//! - **Host**: process-local orchestrator owning the instance registry and
//!   peer table
//! - **InstanceRegistry**: name → local instance or remote proxy
//! - **PeerTable / PeerDirectory**: known sibling hosts and the on-disk
//!   discovery scan
//! - **TokenAuthority**: HS256 bearer tokens with per-peer anti-replay
//!   sequences
//! - **Proxy**: client stub for instances that live on a peer

pub mod host;
pub mod machine;
pub mod paths;
pub mod peers;
pub mod proxy;
pub mod registry;
pub mod spawn;
pub mod supervisor;
pub mod token;

pub use host::{insecure_from_env, AuthKey, CreateResult, Host, HostConfig};
pub use paths::HostPaths;
pub use peers::{Peer, PeerDirectory, PeerSource, PeerTable};
pub use proxy::Proxy;
pub use registry::{Instance, InstanceRegistry, MethodTable, ServiceInstance, TypeRegistry};
pub use supervisor::{StopReason, SupervisionConfig, Supervisor};
pub use token::TokenAuthority;
