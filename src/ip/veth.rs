use crate::ip::link;
use crate::ns::ns::{self, Netns};
use anyhow::{Error, Result, anyhow};
use log::info;
use macaddr::{MacAddr, MacAddr6};
use netlink_packet_route::link::{InfoData, InfoKind, InfoVeth};
use rtnetlink::{LinkMessageBuilder, LinkUnspec, LinkVeth};

/// A network interface with a name, optional MAC address, and namespace.
#[derive(Debug, Clone)]
pub struct Interface {
    pub name: String,
    pub mac: Option<MacAddr>,
    pub ns: Netns,
}

/// A veth pair: a host-side interface and its container-side peer.
#[derive(Debug, Clone)]
pub struct Veth {
    pub interface: Interface,
    pub peer_inf: Interface,
}

impl Interface {
    pub fn new(name: &str, mac: Option<MacAddr>, ns: Netns) -> Self {
        Self {
            name: name.to_string(),
            mac,
            ns,
        }
    }
}

impl Veth {
    pub fn new(inf_name: &str, peer_name: &str, ns1: Netns, ns2: Netns) -> Self {
        let interface = Interface::new(inf_name, None, ns1);
        let peer_inf = Interface::new(peer_name, None, ns2);

        Self { interface, peer_inf }
    }

    pub fn set_mac_address(mut self, mac: MacAddr) -> Self {
        self.interface.mac = Some(mac);
        self
    }

    pub fn set_peer_mac_address(mut self, mac: MacAddr) -> Self {
        self.peer_inf.mac = Some(mac);
        self
    }

    /// Builds the netlink link-create message for this veth pair: the
    /// container-side end carries `InfoData::Veth`, its peer is described
    /// inline via `InfoVeth::Peer`.
    pub fn into_builder(self) -> LinkMessageBuilder<LinkVeth> {
        let build = LinkMessageBuilder::<LinkVeth>::new_with_info_kind(InfoKind::Veth)
            .name(self.interface.name.to_string())
            .setns_by_fd(self.interface.ns.clone().into_fd())
            .up();

        let peer_msg = LinkMessageBuilder::<LinkUnspec>::new()
            .name(self.peer_inf.name.to_string())
            .setns_by_fd(self.peer_inf.ns.clone().into_fd())
            .build();

        build.set_info_data(InfoData::Veth(InfoVeth::Peer(peer_msg)))
    }
}

/// Creates a veth pair (container end `container_veth_name`, host end
/// `host_veth_name`) and brings the host end up in `host_ns`.
///
/// Must be called from within `container_ns` — the container-side end is
/// created directly in the caller's current namespace, the host end is
/// moved into `host_ns` by the kernel as part of the same netlink request.
pub async fn setup_veth(
    container_veth_name: &str,
    host_veth_name: &str,
    mtu: u32,
    container_veth_mac: &MacAddr,
    host_ns: &Netns,
    container_ns: &Netns,
) -> anyhow::Result<Veth, Error> {
    let current_ns = Netns::get()?;
    anyhow::ensure!(&current_ns == container_ns, "network namespace mismatch");

    let veth = make_veth_pair(
        container_veth_name,
        host_veth_name,
        mtu,
        container_veth_mac,
        host_ns,
        container_ns,
    )
    .await?;

    ns::exec_netns(&current_ns, host_ns, async {
        let link = link::link_by_name(host_veth_name)
            .await
            .map_err(|e| anyhow!("{}", e))?;

        link::link_set_up(&link).await
    })
    .await?;

    Ok(veth)
}

/// Creates the veth pair via a single netlink add-link request.
async fn make_veth_pair(
    container_veth_name: &str,
    host_veth_name: &str,
    mtu: u32,
    container_veth_mac: &MacAddr,
    host_ns: &Netns,
    container_ns: &Netns,
) -> Result<Veth, Error> {
    let current_ns = Netns::get()?;
    anyhow::ensure!(
        &current_ns == container_ns,
        "current namespace does not match the target container namespace"
    );
    info!(
        "creating veth pair: container={container_veth_name} host={host_veth_name}"
    );

    let container_mac = MacAddr6::from(*container_veth_mac).into_array().to_vec();

    let veth = Veth::new(
        container_veth_name,
        host_veth_name,
        container_ns.clone(),
        host_ns.clone(),
    )
    .set_mac_address(*container_veth_mac);

    let builder = veth
        .clone()
        .into_builder()
        .mtu(mtu)
        .up()
        .address(container_mac);

    link::add_link(builder.build())
        .await
        .map_err(|e| anyhow!("failed to add link: {}", e))?;

    Ok(veth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_carries_assigned_mac() {
        let mac: MacAddr = MacAddr6::new(2, 0, 0, 0, 0, 1).into();
        let ns = Netns::get().expect("current netns must be readable");
        let iface = Interface::new("dh-abcdef012345", Some(mac), ns);
        assert_eq!(iface.name, "dh-abcdef012345");
        assert_eq!(iface.mac, Some(mac));
    }

    #[test]
    fn set_mac_address_only_touches_the_target_side() {
        let ns = Netns::get().expect("current netns must be readable");
        let mac: MacAddr = MacAddr6::new(2, 0, 0, 0, 0, 2).into();
        let veth = Veth::new("c-dh", "dh-c", ns.clone(), ns).set_peer_mac_address(mac);
        assert_eq!(veth.peer_inf.mac, Some(mac));
        assert_eq!(veth.interface.mac, None);
    }
}
