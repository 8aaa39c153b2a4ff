//! Deterministic veth-pair naming for an endpoint id.

const PREFIX: &str = "dh-";
const SUFFIX: &str = "-dh";
const ID_LEN: usize = 12;

/// Short, deterministic slice of an endpoint id used to derive veth names.
fn short_id(endpoint_id: &str) -> &str {
    let end = endpoint_id.len().min(ID_LEN);
    &endpoint_id[..end]
}

/// Host-side veth name for an endpoint, e.g. `dh-abcdef012345`.
pub fn host_veth_name(endpoint_id: &str) -> String {
    format!("{PREFIX}{}", short_id(endpoint_id))
}

/// Container-side veth name for an endpoint, e.g. `abcdef012345-dh`.
pub fn container_veth_name(endpoint_id: &str) -> String {
    format!("{}{SUFFIX}", short_id(endpoint_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_is_deterministic() {
        let id = "abcdef0123456789abcdef";
        assert_eq!(host_veth_name(id), host_veth_name(id));
        assert_eq!(container_veth_name(id), container_veth_name(id));
    }

    #[test]
    fn naming_stays_within_linux_ifname_limit() {
        let id = "a".repeat(64);
        assert!(host_veth_name(&id).len() < 16);
        assert!(container_veth_name(&id).len() < 16);
    }

    #[test]
    fn distinct_ids_with_distinct_prefixes_produce_distinct_names() {
        let a = "abcdef012345aaaa";
        let b = "ffffff012345bbbb";
        assert_ne!(host_veth_name(a), host_veth_name(b));
        assert_ne!(container_veth_name(a), container_veth_name(b));
    }

    #[test]
    fn host_and_container_names_never_collide() {
        let id = "abcdef012345";
        assert_ne!(host_veth_name(id), container_veth_name(id));
    }

    #[test]
    fn short_endpoint_ids_are_used_whole() {
        let id = "ab12";
        assert_eq!(host_veth_name(id), "dh-ab12");
        assert_eq!(container_veth_name(id), "ab12-dh");
    }
}
