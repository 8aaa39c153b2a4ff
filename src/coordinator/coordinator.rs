//! The endpoint lifecycle: `CreateEndpoint` → `Join` → `Leave` →
//! `DeleteEndpoint`, plus `CreateNetwork`/`DeleteNetwork`/`EndpointOperInfo`.
//!
//! Netlink/namespace mechanics are delegated to `ip::*` / `ns::ns`, DHCP
//! orchestration to `dhcp::*`.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use macaddr::MacAddr;
use netlink_packet_route::AddressFamily;
use netlink_packet_route::route::RouteType;

use crate::bridge::BridgeInventory;
use crate::dhcp::client::{ClientConfig, Family};
use crate::dhcp::supervisor::Supervisor;
use crate::error::{DriverError, DriverResult};
use crate::ip::{link, route, veth};
use crate::naming;
use crate::ns::ns::Netns;
use crate::protocol::types::*;

use super::state::{Coordinator, EndpointRecord, GatewayHint, NetworkRecord};

const IFACE_WAIT: Duration = Duration::from_secs(10);
const LEASE_WAIT: Duration = Duration::from_secs(10);
const CONTAINER_DISCOVERY_INTERVAL: Duration = Duration::from_millis(500);
const CONTAINER_DISCOVERY_TOTAL: Duration = Duration::from_secs(5);
const SUPERVISOR_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const MTU: u32 = 1500;

impl Coordinator {
    pub async fn create_network(&self, req: CreateNetworkRequest) -> DriverResult<EmptyResponse> {
        validate_null_ipam(&req.ipv4_data)?;

        let bridge_name = req
            .options
            .generic
            .get("bridge")
            .ok_or_else(|| DriverError::Validation("\"bridge\" option is required".into()))?
            .clone();

        let ipv6 = match req.options.generic.get("ipv6").map(|s| s.as_str()) {
            None | Some("") => false,
            Some("true") => true,
            Some("false") => false,
            Some(_) => {
                return Err(DriverError::Validation("Invalid boolean value for ipv6".into()));
            }
        };

        if ipv6 {
            validate_null_ipam(&req.ipv6_data)?;
        }

        let bridge = BridgeInventory::resolve(&bridge_name).await?;
        BridgeInventory::check_eligible(&bridge, &self.engine).await?;

        self.networks.lock().await.insert(
            req.network_id,
            NetworkRecord {
                bridge: bridge_name,
                ipv6,
            },
        );

        Ok(EmptyResponse::default())
    }

    pub async fn delete_network(&self, req: NetworkIdRequest) -> DriverResult<EmptyResponse> {
        self.networks.lock().await.remove(&req.network_id);
        Ok(EmptyResponse::default())
    }

    pub async fn create_endpoint(
        &self,
        req: CreateEndpointRequest,
    ) -> DriverResult<CreateEndpointResponse> {
        let network = self
            .networks
            .lock()
            .await
            .get(&req.network_id)
            .cloned()
            .ok_or_else(|| DriverError::Validation(format!("unknown network {}", req.network_id)))?;

        if req.interface.address.is_some() || req.interface.address_ipv6.is_some() {
            return Err(DriverError::Validation(
                "Only the null IPAM driver is supported: a static address was requested".into(),
            ));
        }

        let bridge = BridgeInventory::resolve(&network.bridge).await?;

        let host_veth = naming::host_veth_name(&req.endpoint_id);
        let container_veth = naming::container_veth_name(&req.endpoint_id);

        let mac = match &req.interface.mac_address {
            Some(s) => s
                .parse()
                .map_err(|_| DriverError::Validation(format!("invalid MAC address {s}")))?,
            None => random_locally_administered_mac(),
        };

        let result = self
            .create_endpoint_inner(&req.endpoint_id, &network, &bridge, &host_veth, &container_veth, mac)
            .await;

        match result {
            Ok(response) => {
                self.endpoints.lock().await.insert(
                    req.endpoint_id,
                    EndpointRecord {
                        network_id: req.network_id,
                        host_veth,
                        container_veth,
                        mac,
                    },
                );
                Ok(response)
            }
            Err(e) => {
                log::warn!("create_endpoint failed, rolling back: {e}");
                rollback_endpoint(&host_veth).await;
                Err(e)
            }
        }
    }

    async fn create_endpoint_inner(
        &self,
        endpoint_id: &str,
        network: &NetworkRecord,
        bridge: &netlink_packet_route::link::LinkMessage,
        host_veth: &str,
        container_veth: &str,
        mac: MacAddr,
    ) -> DriverResult<CreateEndpointResponse> {
        let current_ns = Netns::get().map_err(DriverError::External)?;

        veth::setup_veth(container_veth, host_veth, MTU, &mac, &current_ns, &current_ns)
            .await
            .map_err(DriverError::External)?;

        // the container-side end is created asynchronously by the kernel;
        // `setup_veth` already confirmed the host side is up before returning
        wait_for_interface(container_veth, IFACE_WAIT).await?;

        let host_link = link::link_by_name(host_veth)
            .await
            .map_err(DriverError::External)?;
        link::link_set_master(&host_link, bridge)
            .await
            .map_err(DriverError::External)?;

        let container_link = link::link_by_name(container_veth)
            .await
            .map_err(DriverError::External)?;
        let assigned_mac = link::get_mac_address(&container_link.attributes).unwrap_or(mac);

        let mut response_iface = ResponseInterface {
            mac_address: assigned_mac.to_string(),
            ..Default::default()
        };

        let v4_lease = run_one_shot(endpoint_id, container_veth, Family::V4, &self.config).await?;
        response_iface.address = v4_lease.address.map(|a| a.to_string()).unwrap_or_default();

        if network.ipv6 {
            if let Ok(v6_lease) =
                run_one_shot(endpoint_id, container_veth, Family::V6, &self.config).await
            {
                response_iface.address_ipv6 =
                    v6_lease.address.map(|a| a.to_string()).unwrap_or_default();
                if let Some(gw) = v6_lease.gateway {
                    self.gateway_hints
                        .lock()
                        .await
                        .entry(endpoint_id.to_string())
                        .or_default()
                        .v6 = Some(gw);
                }
            }
        }

        if let Some(gw) = v4_lease.gateway {
            self.gateway_hints
                .lock()
                .await
                .entry(endpoint_id.to_string())
                .or_default()
                .v4 = Some(gw);
        }

        Ok(CreateEndpointResponse { interface: response_iface })
    }

    pub async fn delete_endpoint(&self, req: EndpointIdRequest) -> DriverResult<EmptyResponse> {
        // `Leave` should already have stopped any supervisor, but teardown
        // is defined to be idempotent and best-effort, so sweep here too
        // in case the engine calls `DeleteEndpoint` without a prior `Leave`.
        for family in [Family::V4, Family::V6] {
            let key = supervisor_key(&req.endpoint_id, family);
            if let Some(supervisor) = self.container_dhcp_clients.lock().await.remove(&key) {
                if let Err(e) = supervisor.finish(SUPERVISOR_STOP_TIMEOUT).await {
                    log::warn!("error stopping dhcp supervisor for {key}: {e}");
                }
            }
        }

        if let Some(record) = self.endpoints.lock().await.remove(&req.endpoint_id) {
            rollback_endpoint(&record.host_veth).await;
        }
        self.gateway_hints.lock().await.remove(&req.endpoint_id);
        Ok(EmptyResponse::default())
    }

    pub async fn endpoint_oper_info(
        &self,
        req: EndpointIdRequest,
    ) -> DriverResult<EndpointOperInfoResponse> {
        let endpoints = self.endpoints.lock().await;
        let record = endpoints
            .get(&req.endpoint_id)
            .ok_or_else(|| DriverError::Validation(format!("unknown endpoint {}", req.endpoint_id)))?;

        let networks = self.networks.lock().await;
        let network = networks.get(&record.network_id);

        let mut value = std::collections::HashMap::new();
        if let Some(network) = network {
            value.insert("bridge".to_string(), network.bridge.clone());
        }
        value.insert("host_veth".to_string(), record.host_veth.clone());
        value.insert("mac_address".to_string(), record.mac.to_string());

        Ok(EndpointOperInfoResponse { value })
    }

    pub async fn join(&self, req: JoinRequest) -> DriverResult<JoinResponse> {
        let record = self
            .endpoints
            .lock()
            .await
            .get(&req.endpoint_id)
            .cloned()
            .ok_or_else(|| DriverError::Validation(format!("unknown endpoint {}", req.endpoint_id)))?;

        let network = self
            .networks
            .lock()
            .await
            .get(&record.network_id)
            .cloned()
            .ok_or_else(|| DriverError::Validation(format!("unknown network {}", record.network_id)))?;

        let bridge = BridgeInventory::resolve(&network.bridge).await?;

        let mut gateway = None;
        let mut gateway_ipv6 = None;
        if let Some(hint) = self.gateway_hints.lock().await.remove(&req.endpoint_id) {
            gateway = hint.v4;
            gateway_ipv6 = hint.v6;
        }

        let routes = route::route_list(AddressFamily::Inet)
            .await
            .map_err(DriverError::External)?;
        let routes_v6 = if network.ipv6 {
            route::route_list(AddressFamily::Inet6)
                .await
                .map_err(DriverError::External)?
        } else {
            Vec::new()
        };

        let mut static_routes = Vec::new();
        for r in routes.into_iter().chain(routes_v6) {
            if r.oif_index != Some(bridge.header.index) {
                continue;
            }
            // Only unicast routes are translated; the local table's
            // RTN_LOCAL/RTN_BROADCAST entries and the kernel's own on-link
            // subnet route for the bridge are not routes the container needs.
            if r.route_type != Some(RouteType::Unicast) {
                continue;
            }
            let is_default = r.dst.is_none_or(|d| d.prefix() == 0);
            match (is_default, r.gateway) {
                (true, Some(gw)) if matches!(gw, IpAddr::V4(_)) && gateway.is_none() => {
                    gateway = Some(gw);
                }
                (true, Some(gw)) if matches!(gw, IpAddr::V6(_)) && gateway_ipv6.is_none() => {
                    gateway_ipv6 = Some(gw);
                }
                (false, Some(gw)) => {
                    static_routes.push(StaticRoute {
                        destination: r.dst.map(|d| d.to_string()).unwrap_or_default(),
                        route_type: 0,
                        next_hop: Some(gw.to_string()),
                    });
                }
                _ => {}
            }
        }

        let response = JoinResponse {
            interface_name: JoinInterfaceName {
                src_name: record.container_veth.clone(),
                dst_prefix: network.bridge.clone(),
            },
            gateway: gateway.map(|g| g.to_string()),
            gateway_ipv6: gateway_ipv6.map(|g| g.to_string()),
            static_routes,
        };

        self.schedule_supervised_dhcp(req.endpoint_id, record, network.ipv6);

        Ok(response)
    }

    /// Defers engine calls needed to start the supervised client to a
    /// separate task: calling the engine from inside this `Join` handler
    /// would deadlock because the engine holds the endpoint lock around
    /// this very RPC.
    fn schedule_supervised_dhcp(&self, endpoint_id: String, record: EndpointRecord, ipv6: bool) {
        let engine = self.engine.clone();
        let clients = self.container_dhcp_clients.clone();
        let v4_binary = self.config.dhcp_client_v4.clone();
        let v6_binary = self.config.dhcp_client_v6.clone();
        let network_id = record.network_id.clone();

        tokio::spawn(async move {
            let (netns_path, hostname) = match discover_container(
                &engine,
                &network_id,
                &endpoint_id,
                CONTAINER_DISCOVERY_TOTAL,
            )
            .await
            {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("supervised dhcp not started for {endpoint_id}: {e}");
                    return;
                }
            };

            let hostname = Some(hostname).filter(|h| !h.is_empty());

            match start_supervised(
                &endpoint_id,
                &record.container_veth,
                Family::V4,
                &v4_binary,
                Some(&netns_path),
                hostname.clone(),
            )
            .await
            {
                Ok(supervisor) => {
                    log::info!("supervised dhcpv4 started for endpoint {endpoint_id}");
                    clients
                        .lock()
                        .await
                        .insert(supervisor_key(&endpoint_id, Family::V4), supervisor);
                }
                Err(e) => log::warn!("failed to start supervised dhcpv4 for {endpoint_id}: {e}"),
            }

            if ipv6 {
                match start_supervised(
                    &endpoint_id,
                    &record.container_veth,
                    Family::V6,
                    &v6_binary,
                    Some(&netns_path),
                    hostname,
                )
                .await
                {
                    Ok(supervisor) => {
                        clients
                            .lock()
                            .await
                            .insert(supervisor_key(&endpoint_id, Family::V6), supervisor);
                    }
                    Err(e) => log::warn!("failed to start supervised dhcpv6 for {endpoint_id}: {e}"),
                }
            }
        });
    }

    pub async fn leave(&self, req: EndpointIdRequest) -> DriverResult<EmptyResponse> {
        for family in [Family::V4, Family::V6] {
            let key = supervisor_key(&req.endpoint_id, family);
            if let Some(supervisor) = self.container_dhcp_clients.lock().await.remove(&key) {
                if let Err(e) = supervisor.finish(SUPERVISOR_STOP_TIMEOUT).await {
                    log::warn!("error stopping dhcp supervisor for {key}: {e}");
                }
            }
        }

        Ok(EmptyResponse::default())
    }

    /// Stops every live DHCP supervisor on process shutdown, best-effort
    /// with a short timeout each; containers keep their existing lease,
    /// only renewal stops. Orphans are logged as warnings rather than
    /// escalated.
    pub async fn shutdown(&self) {
        let supervisors: Vec<_> = self.container_dhcp_clients.lock().await.drain().collect();
        for (key, supervisor) in supervisors {
            if let Err(e) = supervisor.finish(Duration::from_secs(1)).await {
                log::warn!("orphan dhcp supervisor {key} failed to stop cleanly: {e}");
            }
        }
    }
}

/// Map key for `container_dhcp_clients`: one supervisor per (endpoint,
/// address-family) pair.
fn supervisor_key(endpoint_id: &str, family: Family) -> String {
    match family {
        Family::V4 => format!("{endpoint_id}:v4"),
        Family::V6 => format!("{endpoint_id}:v6"),
    }
}

fn validate_null_ipam(data: &[IpamData]) -> DriverResult<()> {
    for entry in data {
        let space_ok = matches!(entry.address_space.as_deref(), None | Some("null") | Some(""));
        let pool_ok = matches!(entry.pool.as_deref(), None | Some("0.0.0.0/0") | Some("::/0") | Some(""));
        if !space_ok || !pool_ok {
            return Err(DriverError::Validation(
                "Only the null IPAM driver is supported".into(),
            ));
        }
    }
    Ok(())
}

fn random_locally_administered_mac() -> MacAddr {
    use rand::Rng;
    let mut bytes: [u8; 6] = rand::rng().random();
    bytes[0] = (bytes[0] & 0xfe) | 0x02;
    macaddr::MacAddr6::new(bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]).into()
}

async fn wait_for_interface(name: &str, timeout: Duration) -> DriverResult<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if link::link_by_name(name).await.is_ok() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(DriverError::Timeout(format!(
                "interface {name} did not appear within {timeout:?}"
            )));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

async fn run_one_shot(
    endpoint_id: &str,
    interface: &str,
    family: Family,
    config: &crate::config::Config,
) -> DriverResult<crate::dhcp::Lease> {
    let binary = match family {
        Family::V4 => &config.dhcp_client_v4,
        Family::V6 => &config.dhcp_client_v6,
    };

    let client_config = ClientConfig {
        binary: PathBuf::from(binary),
        interface: interface.to_string(),
        netns: None,
        family,
        hostname: None,
        resident: false,
        event_queue_path: event_socket_path(endpoint_id, family),
    };

    let mut supervisor = Supervisor::start(client_config, None)
        .await
        .map_err(DriverError::External)?;

    let lease = supervisor.await_ip(LEASE_WAIT).await;
    let _ = supervisor.finish(Duration::from_secs(1)).await;

    lease.map_err(|e| DriverError::Timeout(e.to_string()))
}

async fn start_supervised(
    endpoint_id: &str,
    interface: &str,
    family: Family,
    binary: &str,
    netns_path: Option<&PathBuf>,
    hostname: Option<String>,
) -> anyhow::Result<Supervisor> {
    let target_ns = match netns_path {
        Some(p) => Some(crate::dhcp::client::resolve_netns(Some(p))?),
        None => None,
    };

    let client_config = ClientConfig {
        binary: PathBuf::from(binary),
        interface: interface.to_string(),
        netns: netns_path.cloned(),
        family,
        hostname,
        resident: true,
        event_queue_path: event_socket_path(endpoint_id, family),
    };

    Supervisor::start(client_config, target_ns).await
}

fn event_socket_path(endpoint_id: &str, family: Family) -> PathBuf {
    let suffix = match family {
        Family::V4 => "v4",
        Family::V6 => "v6",
    };
    PathBuf::from(format!("/run/net-dhcp/{endpoint_id}-{suffix}.sock"))
}

/// Polls the engine for the container attached to `endpoint_id` on
/// `network_id`, since the container is becoming visible to the engine
/// concurrently with this endpoint's `Join` returning.
async fn discover_container(
    engine: &crate::engine::EngineClient,
    network_id: &str,
    endpoint_id: &str,
    total_timeout: Duration,
) -> anyhow::Result<(PathBuf, String)> {
    let deadline = tokio::time::Instant::now() + total_timeout;
    loop {
        if let Ok(endpoints) = engine.network_endpoints(network_id).await {
            if let Some(container) = endpoints.get(endpoint_id) {
                return engine.container_netns_and_hostname(&container.container_id).await;
            }
        }

        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("container for endpoint {endpoint_id} not visible to engine in time");
        }
        tokio::time::sleep(CONTAINER_DISCOVERY_INTERVAL).await;
    }
}

async fn rollback_endpoint(host_veth: &str) {
    if let Ok(link) = link::link_by_name(host_veth).await {
        if let Err(e) = link::del_link(link).await {
            log::warn!("rollback: failed to delete veth {host_veth}: {e}");
        }
    }
}
