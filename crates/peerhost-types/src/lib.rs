//! Core types for the peerhost capability host.
//!
//! This crate defines the data structures shared between the host core, the
//! HTTP transport, and the CLI. It contains no business logic.

pub mod error;
pub mod manifest;
pub mod token;

pub use error::{HostError, HostResult};
pub use manifest::{EnvironSpec, MachineInfo, Manifest, ProcessInfo, ServerBinding, TypeSpec};
pub use token::TokenClaims;
