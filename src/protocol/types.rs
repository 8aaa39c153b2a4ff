//! Wire DTOs for the network-driver remote API. Field names and casing
//! follow the engine's own JSON conventions (PascalCase keys), via
//! `#[serde(rename = ...)]` on each field.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct CapabilitiesResponse {
    #[serde(rename = "Scope")]
    pub scope: &'static str,
    #[serde(rename = "ConnectivityScope")]
    pub connectivity_scope: &'static str,
}

impl Default for CapabilitiesResponse {
    fn default() -> Self {
        Self {
            scope: "local",
            connectivity_scope: "global",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IpamData {
    #[serde(rename = "AddressSpace", default)]
    pub address_space: Option<String>,
    #[serde(rename = "Pool", default)]
    pub pool: Option<String>,
    #[serde(rename = "Gateway", default)]
    pub gateway: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateNetworkRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "Options", default)]
    pub options: NetworkOptions,
    #[serde(rename = "IPv4Data", default)]
    pub ipv4_data: Vec<IpamData>,
    #[serde(rename = "IPv6Data", default)]
    pub ipv6_data: Vec<IpamData>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NetworkOptions {
    #[serde(rename = "com.docker.network.generic", default)]
    pub generic: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct NetworkIdRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
}

#[derive(Debug, Serialize, Default)]
pub struct EmptyResponse {}

#[derive(Debug, Deserialize)]
pub struct CreateEndpointRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "EndpointID")]
    pub endpoint_id: String,
    #[serde(rename = "Interface", default)]
    pub interface: RequestedInterface,
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestedInterface {
    #[serde(rename = "Address", default)]
    pub address: Option<String>,
    #[serde(rename = "AddressIPv6", default)]
    pub address_ipv6: Option<String>,
    #[serde(rename = "MacAddress", default)]
    pub mac_address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateEndpointResponse {
    #[serde(rename = "Interface")]
    pub interface: ResponseInterface,
}

/// Always serializes all three keys, empty string standing in for
/// "absent" (e.g. `AddressIPv6:""` on a v4-only endpoint) rather than
/// omitting the key, matching the engine's own response shape.
#[derive(Debug, Serialize, Default)]
pub struct ResponseInterface {
    #[serde(rename = "MacAddress")]
    pub mac_address: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "AddressIPv6")]
    pub address_ipv6: String,
}

#[derive(Debug, Deserialize)]
pub struct EndpointIdRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "EndpointID")]
    pub endpoint_id: String,
}

#[derive(Debug, Serialize)]
pub struct EndpointOperInfoResponse {
    #[serde(rename = "Value")]
    pub value: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "EndpointID")]
    pub endpoint_id: String,
    #[serde(rename = "SandboxKey")]
    pub sandbox_key: String,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    #[serde(rename = "InterfaceName")]
    pub interface_name: JoinInterfaceName,
    #[serde(rename = "Gateway", skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(rename = "GatewayIPv6", skip_serializing_if = "Option::is_none")]
    pub gateway_ipv6: Option<String>,
    #[serde(rename = "StaticRoutes")]
    pub static_routes: Vec<StaticRoute>,
}

#[derive(Debug, Serialize)]
pub struct JoinInterfaceName {
    #[serde(rename = "SrcName")]
    pub src_name: String,
    #[serde(rename = "DstPrefix")]
    pub dst_prefix: String,
}

#[derive(Debug, Serialize)]
pub struct StaticRoute {
    #[serde(rename = "Destination")]
    pub destination: String,
    #[serde(rename = "RouteType")]
    pub route_type: u8,
    #[serde(rename = "NextHop", skip_serializing_if = "Option::is_none")]
    pub next_hop: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActivateResponse {
    #[serde(rename = "Implements")]
    pub implements: Vec<&'static str>,
}

impl Default for ActivateResponse {
    fn default() -> Self {
        Self {
            implements: vec!["NetworkDriver"],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_interface_always_emits_all_three_keys() {
        let iface = ResponseInterface {
            mac_address: "02:00:00:00:00:01".into(),
            address: "192.0.2.17/24".into(),
            address_ipv6: String::new(),
        };
        let json = serde_json::to_string(&iface).unwrap();
        assert!(json.contains("\"MacAddress\""));
        assert!(json.contains("\"Address\""));
        assert!(json.contains("\"AddressIPv6\":\"\""));
    }

    #[test]
    fn create_network_request_parses_generic_options() {
        let body = r#"{
            "NetworkID": "n1",
            "Options": {"com.docker.network.generic": {"bridge": "br0", "ipv6": "true"}},
            "IPv4Data": [{"AddressSpace": "null", "Pool": "0.0.0.0/0"}]
        }"#;
        let req: CreateNetworkRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.options.generic.get("bridge").unwrap(), "br0");
        assert_eq!(req.ipv4_data[0].pool.as_deref(), Some("0.0.0.0/0"));
    }
}
