//! Pure translation of manifest fields into container-runtime launch
//! primitives. No I/O, no side effects: the sync engine calls this, then
//! hands the result to the runtime driver.

use std::collections::HashMap;

use crate::manifest::Container;

/// Host-mount-root under which named volumes are bound. Mirrors the
/// `/exports/<name>` convention fixed by the manifest schema (spec.md §4.2).
const EXPORTS_ROOT: &str = "/exports";

/// Everything the runtime driver needs to create a container.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Split `command`, ASCII-space delimited. Empty if `command` was empty.
    pub argv: Vec<String>,
    /// `name=value` strings, in manifest order.
    pub env: Vec<String>,
    /// Mount points the image should expose, keyed by container path.
    pub volumes: Vec<String>,
    /// `host:container[:ro]` bind strings, one per volume mount, in order.
    pub binds: Vec<String>,
    /// `containerPort/proto` exposures, in order (duplicates possible).
    pub exposed_ports: Vec<String>,
    /// Host port bindings keyed by `containerPort/proto`; multiple mappings
    /// for the same key accumulate in input order.
    pub port_bindings: HashMap<String, Vec<String>>,
}

/// Translates a manifest [`Container`] into a [`LaunchSpec`].
pub fn translate(container: &Container) -> LaunchSpec {
    let argv = if container.command.is_empty() {
        Vec::new()
    } else {
        container
            .command
            .split(' ')
            .map(str::to_owned)
            .collect()
    };

    let env = container
        .env
        .iter()
        .map(|e| format!("{}={}", e.name, e.value))
        .collect();

    let mut volumes = Vec::with_capacity(container.volume_mounts.len());
    let mut binds = Vec::with_capacity(container.volume_mounts.len());
    for mount in &container.volume_mounts {
        volumes.push(mount.mount_path.clone());

        let mut bind = format!("{EXPORTS_ROOT}/{}:{}", mount.name, mount.mount_path);
        if mount.read_only {
            bind.push_str(":ro");
        }
        binds.push(bind);
    }

    let mut exposed_ports = Vec::with_capacity(container.ports.len());
    let mut port_bindings: HashMap<String, Vec<String>> = HashMap::new();
    for port in &container.ports {
        let proto = normalize_protocol(&port.protocol);
        let key = format!("{}/{proto}", port.container_port);

        exposed_ports.push(key.clone());
        port_bindings
            .entry(key)
            .or_default()
            .push(port.host_port.to_string());
    }

    LaunchSpec {
        argv,
        env,
        volumes,
        binds,
        exposed_ports,
        port_bindings,
    }
}

/// `udp` only if the protocol is exactly `"udp"`; everything else
/// (including empty and unrecognized values) normalizes to `tcp`. This
/// silently discards caller intent for typos like `"foobar"`; see
/// spec.md §9's open question on preserving/logging that case.
fn normalize_protocol(protocol: &str) -> &'static str {
    if protocol == "udp" {
        "udp"
    } else {
        "tcp"
    }
}
