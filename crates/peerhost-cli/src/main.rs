//! peerhost CLI: serve a capability host, inspect manifests, list peers.
//!
//! `serve` prints exactly one newline-terminated JSON manifest to stdout
//! once the transport is bound: the self-registration handshake read by a
//! spawning parent host. All logging goes to stderr to keep stdout clean.

mod cli;
mod service;

use clap::Parser;
use cli::{Cli, Commands};
use peerhost_host::{insecure_from_env, Host, HostConfig, SupervisionConfig};
use peerhost_http::{serve, TransportConfig};
use std::io::Write;
use std::sync::Arc;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// The argv peers should use to spawn this host.
fn spawn_argv() -> Vec<String> {
    let exe = std::env::current_exe()
        .ok()
        .and_then(|p| p.to_str().map(str::to_string))
        .unwrap_or_else(|| "peerhost".to_string());
    vec![exe, "serve".to_string(), "--port".to_string(), "0".to_string()]
}

fn build_host(
    id: Option<String>,
    no_auth: bool,
    timeout: Option<u64>,
    duration: Option<u64>,
) -> Host {
    Host::new(
        HostConfig {
            id,
            insecure: no_auth || insecure_from_env(),
            spawn: spawn_argv(),
            supervision: SupervisionConfig {
                timeout_secs: timeout,
                duration_secs: duration,
            },
            ..HostConfig::default()
        },
        service::builtin_types(),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            id,
            no_auth,
            timeout,
            duration,
            trusted_origin,
        } => {
            let host = Arc::new(build_host(id, no_auth, timeout, duration));
            host.start()?;

            let config = TransportConfig {
                trusted_origin_suffix: trusted_origin,
                ..TransportConfig::default()
            };
            let addr = format!("127.0.0.1:{port}").parse()?;
            serve(Arc::clone(&host), config, addr).await?;

            // Spawn handshake: one JSON manifest line on stdout, then flush.
            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer(&mut stdout, &host.manifest())?;
            stdout.write_all(b"\n")?;
            stdout.flush()?;

            tokio::spawn(Arc::clone(&host).run_supervision());

            let mut shutdown = host.supervisor().subscribe();
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = shutdown.changed() => {}
            }
            host.stop();
        }
        Commands::Manifest => {
            let host = build_host(None, false, None, None);
            println!("{}", serde_json::to_string_pretty(&host.manifest())?);
        }
        Commands::Peers => {
            let host = build_host(None, false, None, None);
            host.discover_peers();
            let peers = host.peers();
            if peers.is_empty() {
                eprintln!("no peers discovered");
            }
            for peer in peers {
                let (version, active, types) = match &peer.manifest {
                    Some(m) => {
                        let mut names: Vec<&str> =
                            m.types.keys().map(String::as_str).collect();
                        names.sort_unstable();
                        (m.version.clone(), m.is_active(), names.join(", "))
                    }
                    None => ("?".to_string(), false, String::new()),
                };
                println!(
                    "{}\t{}\t{}\t{}",
                    peer.id,
                    version,
                    if active { "active" } else { "inactive" },
                    types
                );
            }
        }
    }

    Ok(())
}
