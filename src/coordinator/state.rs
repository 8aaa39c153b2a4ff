//! The coordinator's in-memory record of networks and endpoints.
//!
//! Replaces the source's process-global maps with fields on a single
//! `Coordinator` struct, each behind its own `tokio::sync::Mutex` so
//! concurrent RPCs on different keys don't serialize against each other.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use macaddr::MacAddr;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::dhcp::Supervisor;
use crate::engine::EngineClient;

#[derive(Debug, Clone)]
pub struct NetworkRecord {
    pub bridge: String,
    pub ipv6: bool,
}

#[derive(Debug, Clone)]
pub struct EndpointRecord {
    pub network_id: String,
    pub host_veth: String,
    pub container_veth: String,
    pub mac: MacAddr,
}

/// The v4/v6 gateway learned during `CreateEndpoint`'s one-shot lease,
/// held only until the next `Join` for the same endpoint consumes it.
#[derive(Debug, Clone, Default)]
pub struct GatewayHint {
    pub v4: Option<IpAddr>,
    pub v6: Option<IpAddr>,
}

pub struct Coordinator {
    pub config: Config,
    pub engine: EngineClient,
    pub networks: Mutex<HashMap<String, NetworkRecord>>,
    pub endpoints: Mutex<HashMap<String, EndpointRecord>>,
    pub gateway_hints: Mutex<HashMap<String, GatewayHint>>,
    /// `Arc`-wrapped so a spawned task started from `Join` (see
    /// `coordinator::schedule_supervised_dhcp`) can hold its own handle to
    /// this map without needing a handle to the whole `Coordinator`.
    pub container_dhcp_clients: Arc<Mutex<HashMap<String, Supervisor>>>,
}

impl Coordinator {
    pub fn new(config: Config, engine: EngineClient) -> Self {
        Self {
            config,
            engine,
            networks: Mutex::new(HashMap::new()),
            endpoints: Mutex::new(HashMap::new()),
            gateway_hints: Mutex::new(HashMap::new()),
            container_dhcp_clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_hint_defaults_to_unset() {
        let hint = GatewayHint::default();
        assert!(hint.v4.is_none());
        assert!(hint.v6.is_none());
    }
}
