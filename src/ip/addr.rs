use std::net::{IpAddr, Ipv4Addr};

use crate::ip::link::get_handle;

use anyhow::anyhow;
use futures::TryStreamExt;
use ipnetwork::{IpNetwork, Ipv4Network};
use netlink_packet_route::{
    AddressFamily,
    address::{AddressAttribute, AddressFlags, AddressMessage, AddressScope, CacheInfo},
};

#[derive(Debug)]
pub struct Addr {
    pub ipnet: IpNetwork,
    pub label: String,
    pub flags: AddressFlags,
    pub scope: AddressScope,
    pub peer: Option<IpNetwork>,
    pub broadcast: Option<IpAddr>,
    pub cache_info: CacheInfo,
    pub link_index: u32,
}

impl Eq for Addr {}

impl PartialEq for Addr {
    fn eq(&self, other: &Self) -> bool {
        self.ipnet == other.ipnet
    }
}

impl Default for Addr {
    fn default() -> Self {
        Self {
            ipnet: IpNetwork::V4(Ipv4Network::new(Ipv4Addr::UNSPECIFIED, 0).unwrap()),
            label: "".to_string(),
            flags: AddressFlags::empty(),
            scope: AddressScope::default(),
            peer: None,
            broadcast: None,
            cache_info: CacheInfo::default(),
            link_index: 0,
        }
    }
}

pub async fn addr_list(index: u32, family: AddressFamily) -> anyhow::Result<Vec<Addr>> {
    let handle = get_handle()?
        .ok_or_else(|| anyhow!("Cannot get handle"))?
        .address();

    let mut addresses = Vec::new();

    let mut stream = handle.get().set_link_index_filter(index).execute();

    while let Some(msg) = stream.try_next().await? {
        if msg.header.family != family {
            continue;
        }
        let addr = Addr::try_from(&msg)?;
        addresses.push(addr);
    }

    Ok(addresses)
}

impl TryFrom<&AddressMessage> for Addr {
    type Error = anyhow::Error;

    fn try_from(msg: &AddressMessage) -> Result<Self, Self::Error> {
        let mut addr = Addr {
            link_index: msg.header.index,
            ..Default::default()
        };
        let mut dst = None;
        let mut local = None;

        let family = msg.header.family;
        for attr in &msg.attributes {
            match attr {
                AddressAttribute::Address(ip) => {
                    let ip = *ip;
                    let prefix = msg.header.prefix_len;
                    dst = Some(IpNetwork::new(ip, prefix)?);
                }
                AddressAttribute::Local(ip) => {
                    let ip = *ip;
                    let prefix = msg.header.prefix_len;
                    local = Some(IpNetwork::new(ip, prefix)?);
                }
                AddressAttribute::Label(label) => {
                    addr.label = label.clone();
                }
                AddressAttribute::Broadcast(bcast) => {
                    addr.broadcast = Some(IpAddr::V4(*bcast));
                }
                AddressAttribute::CacheInfo(info) => {
                    addr.cache_info = *info;
                }
                AddressAttribute::Multicast(_) => {}
                AddressAttribute::Flags(flags) => {
                    addr.flags = *flags;
                }
                AddressAttribute::Other(_) => {}
                _ => {}
            }
        }
        #[allow(clippy::collapsible_if)]
        if let Some(local) = local {
            if family == AddressFamily::Inet {
                if let Some(d) = dst {
                    if d.ip() == local.ip() {
                        addr.ipnet = d;
                    }
                }
            }else {
                addr.ipnet = local;
                addr.peer = dst;
            }
        } else if let Some(dst) = dst {
            addr.ipnet = dst;
        }
        addr.scope = msg.header.scope;

        Ok(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_addr_is_unspecified_v4() {
        let addr = Addr::default();
        assert_eq!(addr.ipnet, IpNetwork::V4(Ipv4Network::new(Ipv4Addr::UNSPECIFIED, 0).unwrap()));
        assert_eq!(addr.link_index, 0);
    }

    #[test]
    fn equality_is_by_ipnet_only() {
        let a = Addr {
            ipnet: "192.0.2.0/24".parse().unwrap(),
            label: "eth0".into(),
            ..Default::default()
        };
        let b = Addr {
            ipnet: "192.0.2.0/24".parse().unwrap(),
            label: "eth1".into(),
            ..Default::default()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn try_from_picks_local_over_dst_for_inet() {
        let mut msg = AddressMessage::default();
        msg.header.index = 3;
        msg.header.prefix_len = 24;
        msg.header.family = AddressFamily::Inet;
        msg.attributes.push(AddressAttribute::Local(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 5))));
        msg.attributes.push(AddressAttribute::Address(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 5))));
        msg.attributes.push(AddressAttribute::Label("eth0".into()));

        let addr = Addr::try_from(&msg).unwrap();
        assert_eq!(addr.link_index, 3);
        assert_eq!(addr.label, "eth0");
        assert_eq!(addr.ipnet.prefix(), 24);
    }
}
