//! Process configuration: CLI flags with environment-variable fallbacks.
//! There is no on-disk config file — all durable configuration lives in
//! process flags/environment, matching the driver's "no persisted state"
//! contract.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "net-dhcp", about = "Docker network driver backed by real DHCP")]
pub struct Config {
    /// UNIX socket to serve the network-driver remote API on.
    #[arg(long, env = "NET_DHCP_SOCKET", default_value = "/run/docker/plugins/net-dhcp.sock")]
    pub socket: String,

    /// Engine API socket to reflect against.
    #[arg(long, env = "NET_DHCP_ENGINE_SOCKET", default_value = "/var/run/docker.sock")]
    pub engine_socket: String,

    /// DHCPv4 client binary.
    #[arg(long, env = "NET_DHCP_CLIENT_V4", default_value = "/sbin/udhcpc")]
    pub dhcp_client_v4: String,

    /// DHCPv6 client binary.
    #[arg(long, env = "NET_DHCP_CLIENT_V6", default_value = "/sbin/udhcpc6")]
    pub dhcp_client_v6: String,

    /// Log verbosity, passed through to `env_logger` as `RUST_LOG` would be.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_socket_path() {
        let cfg = Config::parse_from(["net-dhcp"]);
        assert_eq!(cfg.socket, "/run/docker/plugins/net-dhcp.sock");
        assert_eq!(cfg.engine_socket, "/var/run/docker.sock");
    }

    #[test]
    fn flags_override_defaults() {
        let cfg = Config::parse_from(["net-dhcp", "--socket", "/tmp/test.sock"]);
        assert_eq!(cfg.socket, "/tmp/test.sock");
    }
}
