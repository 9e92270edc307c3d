//! Filesystem layout for host manifests, secrets, and environ descriptors.
//!
//! Two well-known locations are scanned for peers: an ephemeral "active
//! hosts" directory holding `<id>.json` + `<id>.key` for every running host,
//! and a persistent per-user directory holding manifests for installed but
//! inactive hosts. Secrets are written mode 600, directories mode 700.

use std::path::{Path, PathBuf};

/// Resolved directory layout for a host.
#[derive(Debug, Clone)]
pub struct HostPaths {
    /// Ephemeral directory of running hosts: `<id>.json` and `<id>.key`.
    pub active: PathBuf,
    /// Persistent directory of installed host manifests.
    pub installed: PathBuf,
    /// Persistent directory of environ descriptors.
    pub environs: PathBuf,
    /// Root for static assets served over HTTP.
    pub static_root: PathBuf,
}

impl HostPaths {
    /// Default layout: tempdir for active hosts, the user data dir for
    /// installed hosts and environs.
    pub fn default_layout() -> Self {
        let data = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("peerhost");
        Self {
            active: std::env::temp_dir().join("peerhost").join("hosts"),
            installed: data.join("hosts"),
            environs: data.join("environs"),
            static_root: data.join("static"),
        }
    }

    /// Layout rooted at a single directory, for tests.
    pub fn under_root(root: &Path) -> Self {
        Self {
            active: root.join("active"),
            installed: root.join("installed"),
            environs: root.join("environs"),
            static_root: root.join("static"),
        }
    }

    /// Manifest file for a host id in the active directory.
    pub fn manifest_file(&self, id: &str) -> PathBuf {
        self.active.join(format!("{id}.json"))
    }

    /// Secret key file for a host id in the active directory.
    pub fn key_file(&self, id: &str) -> PathBuf {
        self.active.join(format!("{id}.key"))
    }

    /// Create the active directory with owner-only permissions.
    pub fn ensure_active_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.active)?;
        restrict_dir_permissions(&self.active);
        Ok(())
    }
}

/// SECURITY: Restrict file permissions to owner read/write (0600) on Unix.
#[cfg(unix)]
pub fn restrict_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
}

#[cfg(not(unix))]
pub fn restrict_file_permissions(_path: &Path) {}

/// SECURITY: Restrict directory permissions to owner-only (0700) on Unix.
#[cfg(unix)]
pub fn restrict_dir_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700));
}

#[cfg(not(unix))]
pub fn restrict_dir_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = HostPaths::under_root(tmp.path());
        assert_eq!(
            paths.manifest_file("host-1"),
            tmp.path().join("active").join("host-1.json")
        );
        assert_eq!(
            paths.key_file("host-1"),
            tmp.path().join("active").join("host-1.key")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_active_dir_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let paths = HostPaths::under_root(tmp.path());
        paths.ensure_active_dir().unwrap();
        let mode = std::fs::metadata(&paths.active).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
