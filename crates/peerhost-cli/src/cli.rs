//! Clap CLI definitions for peerhost.

use clap::{Parser, Subcommand};

/// peerhost, a peer-aware capability host.
#[derive(Parser)]
#[command(
    name = "peerhost",
    version,
    about = "peerhost: peer-aware capability host",
    long_about = "peerhost: peer-aware capability host\n\n\
                  Creates, tracks, and exposes named instances of pluggable\n\
                  service types, delegating to sibling hosts on the same\n\
                  machine when a type is served elsewhere."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the host over HTTP until stopped or idle.
    Serve {
        /// Port to bind (0 picks a free port).
        #[arg(long, default_value_t = 2000)]
        port: u16,
        /// Host id (generated when omitted).
        #[arg(long)]
        id: Option<String>,
        /// Disable authorization and CORS origin checks (local development).
        #[arg(long)]
        no_auth: bool,
        /// Stop after this many seconds without a request.
        #[arg(long)]
        timeout: Option<u64>,
        /// Stop after this many seconds of total runtime.
        #[arg(long)]
        duration: Option<u64>,
        /// Additional origin suffix honored by CORS.
        #[arg(long)]
        trusted_origin: Option<String>,
    },
    /// Print this host's manifest as JSON.
    Manifest,
    /// Discover sibling hosts and list them.
    Peers,
}
