//! Peer spawn protocol: subprocess launch plus a one-line JSON handshake.
//!
//! An inactive peer is activated by launching its advertised spawn command
//! and reading exactly one newline-terminated JSON object from its stdout:
//! the spawned host's self-registration manifest. Any parse failure,
//! premature exit, or timeout is a `SpawnFailed`; spawns are not retried.

use peerhost_types::{HostError, HostResult, Manifest};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// How long to wait for the handshake line.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Launch a peer's spawn command and read its self-registration manifest.
///
/// The child keeps running after the handshake; it registers itself in the
/// active-hosts directory and is supervised by its own idle timeout.
pub async fn spawn_peer(argv: &[String]) -> HostResult<Manifest> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| HostError::SpawnFailed("empty spawn command".to_string()))?;

    debug!(command = %argv.join(" "), "Spawning peer");
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| HostError::SpawnFailed(format!("{program}: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| HostError::SpawnFailed("child stdout not captured".to_string()))?;

    let mut line = String::new();
    let read = tokio::time::timeout(
        HANDSHAKE_TIMEOUT,
        BufReader::new(stdout).read_line(&mut line),
    )
    .await
    .map_err(|_| HostError::SpawnFailed(format!("{program}: handshake timed out")))?
    .map_err(|e| HostError::SpawnFailed(format!("{program}: {e}")))?;

    if read == 0 {
        return Err(HostError::SpawnFailed(format!(
            "{program}: exited before handshake"
        )));
    }

    let manifest: Manifest = serde_json::from_str(line.trim())
        .map_err(|e| HostError::SpawnFailed(format!("{program}: bad handshake: {e}")))?;

    info!(peer = %manifest.id, command = %program, "Spawned peer");
    Ok(manifest)
}
