//! Translates between a manifest's `(manifestId, containerName)` pair and the
//! single string name under which the agent creates the container in the
//! runtime.
//!
//! The agent persists nothing locally: on restart it re-derives ownership of
//! running containers purely by decoding their runtime names. The `--`
//! marker is therefore both the "this container is managed by us" signal and
//! the split point used to recover the original pair.

/// Separator joining a container's own name to the id of the manifest that
/// declared it. Chosen to be unlikely in ordinary names while staying
/// human-readable in `podman ps` output.
const SEPARATOR: &str = "--";

/// Builds the runtime-visible name for a container declared by manifest
/// `manifest_id` under the name `container_name`.
///
/// Neither side is escaped. If `container_name` itself contains `--`, the
/// round trip is still exact as long as `manifest_id` contains no `--`,
/// since [`decode`] splits on the *last* occurrence of the separator.
pub fn encode(manifest_id: &str, container_name: &str) -> String {
    format!("{container_name}{SEPARATOR}{manifest_id}")
}

/// Recovers `(manifestId, containerName)` from a runtime container name.
///
/// Returns `None` if `runtime_name` contains no `--` at all, meaning the
/// container is not managed by this agent and must be left alone (I3).
pub fn decode(runtime_name: &str) -> Option<(String, String)> {
    let idx = runtime_name.rfind(SEPARATOR)?;
    let container_name = &runtime_name[..idx];
    let manifest_id = &runtime_name[idx + SEPARATOR.len()..];
    Some((manifest_id.to_string(), container_name.to_string()))
}

/// `true` if `runtime_name` round-trips through [`decode`], i.e. is owned by
/// this agent.
pub fn is_managed(runtime_name: &str) -> bool {
    runtime_name.contains(SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_names() {
        let (manifest_id, container_name) = decode(&encode("foo", "bar")).expect("managed");
        assert_eq!(manifest_id, "foo");
        assert_eq!(container_name, "bar");
    }

    // The suffix (manifest id) must be free of embedded `--` for the
    // round trip to be guaranteed; the prefix (container name) may safely
    // contain `--` since decode splits on the rightmost occurrence. The
    // vectors below pair a possibly-dashed prefix with a dash-free suffix.
    #[test]
    fn round_trips_adjacent_dash_vectors() {
        let vectors = [
            ("container5678", "manifest1234"),
            ("manifest--", "container__"),
            ("--manifest", "__container"),
            ("m___anifest_", "container-_-"),
            ("-_-container", "_m___anifest"),
        ];

        for (container_name, manifest_id) in vectors {
            let encoded = encode(manifest_id, container_name);
            let (decoded_manifest, decoded_container) =
                decode(&encoded).unwrap_or_else(|| panic!("{encoded} should decode"));
            assert_eq!(decoded_manifest, manifest_id, "encoded = {encoded}");
            assert_eq!(decoded_container, container_name, "encoded = {encoded}");
        }
    }

    #[test]
    fn unmanaged_name_has_no_separator() {
        assert!(!is_managed("foo"));
        assert!(decode("foo").is_none());
    }

    #[test]
    fn managed_name_round_trips_via_is_managed() {
        let encoded = encode("foo", "bar");
        assert!(is_managed(&encoded));
    }
}
