//! Read-only facade over the container engine's API.
//!
//! Used to enumerate existing networks (for the reserved-subnet check in
//! `bridge::inventory`), to resolve an endpoint to its container id and MAC,
//! and to resolve a container id to its network namespace and hostname for
//! the DHCP supervisor. Every call here is read-only; the driver never
//! creates or mutates engine-side state.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use bollard::Docker;
use bollard::query_parameters::{InspectContainerOptions, ListNetworksOptions};
use ipnetwork::IpNetwork;

/// A network as reported by the engine, reduced to what the bridge
/// inventory needs to avoid subnet collisions.
#[derive(Debug, Clone)]
pub struct EngineNetwork {
    pub id: String,
    pub name: String,
    pub driver: String,
    pub subnets: Vec<IpNetwork>,
}

/// A container attached to one of this driver's networks, as seen from the
/// engine's own network-inspect view.
#[derive(Debug, Clone)]
pub struct EndpointContainer {
    pub container_id: String,
    pub mac_address: Option<String>,
}

#[derive(Clone)]
pub struct EngineClient {
    docker: Docker,
}

impl EngineClient {
    /// Connects to the engine's API socket and confirms it is reachable.
    pub async fn connect(socket_path: &str) -> Result<Self> {
        let docker = Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
            .with_context(|| format!("failed to build engine client for {socket_path}"))?;

        docker
            .ping()
            .await
            .map_err(|e| anyhow!("engine at {socket_path} did not respond to ping: {e}"))?;

        Ok(Self { docker })
    }

    /// All networks known to the engine, with their claimed subnets.
    ///
    /// Used by the bridge inventory to reject a bridge whose address
    /// collides with a subnet some other (non-driver) network already owns.
    pub async fn list_networks(&self) -> Result<Vec<EngineNetwork>> {
        let networks = self
            .docker
            .list_networks(Some(ListNetworksOptions::default()))
            .await?;

        let mut result = Vec::with_capacity(networks.len());
        for network in networks {
            let subnets = network
                .ipam
                .and_then(|ipam| ipam.config)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|cfg| cfg.subnet)
                .filter_map(|s| s.parse().ok())
                .collect();

            result.push(EngineNetwork {
                id: network.id.unwrap_or_default(),
                name: network.name.unwrap_or_default(),
                driver: network.driver.unwrap_or_default(),
                subnets,
            });
        }

        Ok(result)
    }

    /// Maps endpoint id to container id/MAC for every container currently
    /// attached to the given network, as reported by the engine's own
    /// network-inspect view.
    pub async fn network_endpoints(
        &self,
        network_id: &str,
    ) -> Result<HashMap<String, EndpointContainer>> {
        let network = self.docker.inspect_network::<String>(network_id, None).await?;

        let mut result = HashMap::new();
        for (container_id, container) in network.containers.unwrap_or_default() {
            if let Some(endpoint_id) = container.endpoint_id {
                result.insert(
                    endpoint_id,
                    EndpointContainer {
                        container_id: container_id.clone(),
                        mac_address: container.mac_address,
                    },
                );
            }
        }

        Ok(result)
    }

    /// Resolves a container id to its network namespace path and hostname.
    pub async fn container_netns_and_hostname(
        &self,
        container_id: &str,
    ) -> Result<(PathBuf, String)> {
        let inspect = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .with_context(|| format!("inspecting container {container_id}"))?;

        let pid = inspect
            .state
            .as_ref()
            .and_then(|s| s.pid)
            .filter(|&pid| pid > 0)
            .ok_or_else(|| anyhow!("container {container_id} has no running pid"))?;

        let hostname = inspect
            .config
            .as_ref()
            .and_then(|c| c.hostname.clone())
            .unwrap_or_default();

        Ok((PathBuf::from(format!("/proc/{pid}/ns/net")), hostname))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_container_carries_mac() {
        let c = EndpointContainer {
            container_id: "abc123".into(),
            mac_address: Some("02:00:00:00:00:01".into()),
        };
        assert_eq!(c.container_id, "abc123");
        assert!(c.mac_address.is_some());
    }
}
