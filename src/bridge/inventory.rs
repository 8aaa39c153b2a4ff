//! Bridge enumeration and eligibility checks.
//!
//! A bridge is eligible to host a driver network only if none of its
//! assigned subnets intersect a subnet already claimed by some other,
//! non-driver network in the engine. This check runs once, at
//! `CreateNetwork` time, against the engine's current view of the world.

use anyhow::anyhow;
use ipnetwork::IpNetwork;
use netlink_packet_route::{AddressFamily, link::LinkMessage};

use crate::engine::EngineClient;
use crate::error::DriverError;
use crate::ip::{addr, link};

/// Driver name as registered with the engine; used to exclude this
/// driver's own networks from the reserved-subnet collision check (their
/// subnets are the bridge's own addresses and are expected to "collide").
pub const DRIVER_NAME: &str = "net-dhcp";

pub struct BridgeInventory;

impl BridgeInventory {
    /// Resolves `name` to a link, verifying it really is a bridge.
    pub async fn resolve(name: &str) -> Result<LinkMessage, DriverError> {
        let link = link::link_by_name(name)
            .await
            .map_err(|_| DriverError::Validation(format!("bridge \"{name}\" not found")))?;

        if !link::is_bridge(&link) {
            return Err(DriverError::Validation(format!(
                "\"{name}\" exists but is not a bridge"
            )));
        }

        Ok(link)
    }

    /// All IPv4+IPv6 subnets currently assigned to a bridge's addresses.
    pub async fn subnets(bridge: &LinkMessage) -> anyhow::Result<Vec<IpNetwork>> {
        let mut subnets = Vec::new();
        for family in [AddressFamily::Inet, AddressFamily::Inet6] {
            for a in addr::addr_list(bridge.header.index, family).await? {
                subnets.push(a.ipnet);
            }
        }
        Ok(subnets)
    }

    /// Verifies `bridge`'s subnets don't collide with any subnet already
    /// claimed by a non-driver network known to the engine.
    pub async fn check_eligible(
        bridge: &LinkMessage,
        engine: &EngineClient,
    ) -> Result<(), DriverError> {
        let bridge_subnets = Self::subnets(bridge)
            .await
            .map_err(|e| DriverError::External(anyhow!("reading bridge addresses: {e}")))?;

        let networks = engine
            .list_networks()
            .await
            .map_err(DriverError::External)?;

        for network in networks {
            if network.driver == DRIVER_NAME {
                continue;
            }
            for reserved in &network.subnets {
                for ours in &bridge_subnets {
                    if subnets_overlap(ours, reserved) {
                        return Err(DriverError::Validation(format!(
                            "bridge subnet {ours} collides with network \"{}\" ({reserved})",
                            network.name
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

fn subnets_overlap(a: &IpNetwork, b: &IpNetwork) -> bool {
    match (a, b) {
        (IpNetwork::V4(a), IpNetwork::V4(b)) => a.contains(b.network()) || b.contains(a.network()),
        (IpNetwork::V6(a), IpNetwork::V6(b)) => a.contains(b.network()) || b.contains(a.network()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_subnets_overlap() {
        let a: IpNetwork = "192.0.2.0/24".parse().unwrap();
        let b: IpNetwork = "192.0.2.0/24".parse().unwrap();
        assert!(subnets_overlap(&a, &b));
    }

    #[test]
    fn disjoint_subnets_do_not_overlap() {
        let a: IpNetwork = "192.0.2.0/24".parse().unwrap();
        let b: IpNetwork = "198.51.100.0/24".parse().unwrap();
        assert!(!subnets_overlap(&a, &b));
    }

    #[test]
    fn nested_subnet_overlaps_its_parent() {
        let parent: IpNetwork = "10.0.0.0/8".parse().unwrap();
        let child: IpNetwork = "10.1.2.0/24".parse().unwrap();
        assert!(subnets_overlap(&parent, &child));
        assert!(subnets_overlap(&child, &parent));
    }

    #[test]
    fn v4_and_v6_never_overlap() {
        let a: IpNetwork = "192.0.2.0/24".parse().unwrap();
        let b: IpNetwork = "2001:db8::/32".parse().unwrap();
        assert!(!subnets_overlap(&a, &b));
    }
}
