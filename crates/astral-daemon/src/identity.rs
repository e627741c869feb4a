//! Local identity: signing key and stable system id.

use std::path::Path;

use anyhow::Context;
use tracing::info;

use astral_crypto::ed25519::IdentityKey;
use astral_crypto::identity::{random_system_id, system_id_from_host, HostMaterial};
use astral_types::SystemId;

use crate::config::IdentityConfig;

/// Load the signing key from `path`, generating and saving one on first run.
///
/// The file holds the 32-byte secret as hex. A corrupt file is a startup
/// error: silently regenerating would orphan the node's bound identity.
pub fn load_or_create_identity(path: &Path) -> anyhow::Result<IdentityKey> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading identity key {}", path.display()))?;
        let raw = hex::decode(content.trim())
            .with_context(|| format!("identity key {} is not valid hex", path.display()))?;
        let secret: [u8; 32] = raw
            .try_into()
            .map_err(|_| anyhow::anyhow!("identity key {} is not 32 bytes", path.display()))?;
        Ok(IdentityKey::from_secret_bytes(&secret))
    } else {
        let identity = IdentityKey::generate();
        std::fs::write(path, hex::encode(identity.secret_bytes()))
            .with_context(|| format!("writing identity key {}", path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
        }
        info!(path = %path.display(), "Generated new identity key");
        Ok(identity)
    }
}

/// Derive the node's system id per the identity configuration.
pub fn derive_system_id(config: &IdentityConfig) -> SystemId {
    if !config.stable_id {
        return random_system_id();
    }
    let material = gather_host_material(&config.user_seed);
    system_id_from_host(&material)
}

/// The node's display name: configured, or the hostname.
pub fn display_name(config: &IdentityConfig) -> String {
    if !config.name.is_empty() {
        return config.name.clone();
    }
    hostname().unwrap_or_else(|| "astral-node".to_string())
}

/// Collect host properties for stable id derivation. Every field is
/// best-effort; missing sources hash as empty strings.
fn gather_host_material(user_seed: &str) -> HostMaterial {
    HostMaterial {
        mac_address: primary_mac_address().unwrap_or_default(),
        hostname: hostname().unwrap_or_default(),
        machine_id: machine_id().unwrap_or_default(),
        user_seed: if user_seed.is_empty() {
            None
        } else {
            Some(user_seed.to_string())
        },
    }
}

fn hostname() -> Option<String> {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.is_empty() {
            return Some(name);
        }
    }
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn machine_id() -> Option<String> {
    std::fs::read_to_string("/etc/machine-id")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// First non-loopback interface hardware address, if any.
fn primary_mac_address() -> Option<String> {
    let entries = std::fs::read_dir("/sys/class/net").ok()?;
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name != "lo")
        .collect();
    names.sort();
    for name in names {
        if let Ok(addr) = std::fs::read_to_string(format!("/sys/class/net/{name}/address")) {
            let addr = addr.trim().to_string();
            if !addr.is_empty() && addr != "00:00:00:00:00:00" {
                return Some(addr);
            }
        }
    }
    None
}
