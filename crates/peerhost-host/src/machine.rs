//! Stable machine identity: MAC address when readable, local IP otherwise.

use peerhost_types::MachineInfo;
use std::net::UdpSocket;

/// Resolve this machine's identity.
///
/// Prefers the MAC address of the first non-loopback interface so the id
/// survives DHCP lease changes; falls back to the local IP when no MAC is
/// readable (non-Linux, containers with masked sysfs).
pub fn machine_info() -> MachineInfo {
    let ip = local_ip().unwrap_or_else(|| "127.0.0.1".to_string());
    let id = first_mac().unwrap_or_else(|| ip.clone());
    MachineInfo { id, ip }
}

/// Local IP as seen on the default route. No packets are sent; connecting a
/// UDP socket only selects the outbound interface.
fn local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

#[cfg(target_os = "linux")]
fn first_mac() -> Option<String> {
    let entries = std::fs::read_dir("/sys/class/net").ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name == "lo" {
            continue;
        }
        if let Ok(address) = std::fs::read_to_string(entry.path().join("address")) {
            let address = address.trim();
            if !address.is_empty() && address != "00:00:00:00:00:00" {
                return Some(address.to_string());
            }
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn first_mac() -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_info_is_populated() {
        let info = machine_info();
        assert!(!info.id.is_empty());
        assert!(!info.ip.is_empty());
    }

    #[test]
    fn test_machine_info_is_stable() {
        // Identity must not change between calls within one process.
        assert_eq!(machine_info(), machine_info());
    }
}
