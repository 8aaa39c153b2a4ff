use std::net::IpAddr;

use crate::ip::link::get_handle;
use anyhow::{Result, anyhow};
use futures::TryStreamExt;
use ipnetwork::IpNetwork;
use log::debug;
use netlink_packet_route::{
    AddressFamily,
    route::{RouteAddress, RouteAttribute, RouteMessage, RouteType},
};
use rtnetlink::RouteMessageBuilder;
use serde::{Deserialize, Serialize};
use serde_with::{FromInto, serde_as};

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub dst: Option<IpNetwork>,
    pub oif_index: Option<u32>,
    pub gateway: Option<IpAddr>,
    pub src: Option<IpAddr>,
    #[serde_as(as = "Option<FromInto<u8>>")]
    pub route_type: Option<RouteType>,
    pub metric: Option<u32>,
}

pub async fn route_list(family: AddressFamily) -> Result<Vec<Route>> {
    let handle = get_handle()?.ok_or_else(|| anyhow!("Cannot get handle"))?;
    let mut filter_msg = RouteMessage::default();
    filter_msg.header.address_family = family;
    let stream = handle.route().get(filter_msg).execute();
    collect_routes_from_stream(stream).await
}

async fn collect_routes_from_stream<S>(mut stream: S) -> Result<Vec<Route>>
where
    S: TryStreamExt<Ok = RouteMessage> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let mut result = Vec::new();

    while let Some(reply) = stream.try_next().await? {
        let mut dst_ip: Option<IpAddr> = None;
        let mut oif_index: Option<u32> = None;
        let mut gateway: Option<IpAddr> = None;
        let mut src_ip: Option<IpAddr> = None;
        let mut metric: Option<u32> = None;

        for attr in &reply.attributes {
            match attr {
                RouteAttribute::Destination(RouteAddress::Inet(ip)) => {
                    dst_ip = Some(IpAddr::V4(*ip));
                }
                RouteAttribute::Destination(RouteAddress::Inet6(ip)) => {
                    dst_ip = Some(IpAddr::V6(*ip));
                }
                RouteAttribute::Oif(index) => {
                    oif_index = Some(*index);
                }
                RouteAttribute::Gateway(RouteAddress::Inet(ip)) => {
                    gateway = Some(IpAddr::V4(*ip));
                }
                RouteAttribute::Gateway(RouteAddress::Inet6(ip)) => {
                    gateway = Some(IpAddr::V6(*ip));
                }
                RouteAttribute::PrefSource(RouteAddress::Inet(ip)) => {
                    src_ip = Some(IpAddr::V4(*ip));
                }
                RouteAttribute::PrefSource(RouteAddress::Inet6(ip)) => {
                    src_ip = Some(IpAddr::V6(*ip));
                }
                RouteAttribute::Priority(pri) => {
                    metric = Some(*pri);
                }
                _ => {}
            }
        }

        let dst = match dst_ip {
            Some(ip) => Some(IpNetwork::new(ip, reply.header.destination_prefix_length)?),
            None => None,
        };

        result.push(Route {
            dst,
            oif_index,
            gateway,
            src: src_ip,
            route_type: Some(reply.header.kind),
            metric,
        });
    }
    Ok(result)
}

/// Installs `route`, replacing any existing route to the same destination
/// instead of failing with "file exists" — the netlink equivalent of
/// `ip route replace`, used by the supervisor to swap in a renewed
/// gateway without a separate delete step.
pub async fn route_replace(route: Route) -> anyhow::Result<()> {
    let gateway = route
        .gateway
        .ok_or_else(|| anyhow!("Route Gateway must be specified"))?;
    let dst = route
        .dst
        .ok_or_else(|| anyhow!("Route destination must be specified"))?;
    let handle = get_handle()?.ok_or_else(|| anyhow!("Cannot get handle"))?;
    let route_handle = handle.route();

    let mut builder = RouteMessageBuilder::<IpAddr>::new();
    builder = builder
        .destination_prefix(dst.ip(), dst.prefix())?
        .gateway(gateway)?;
    if let Some(pri) = route.metric {
        builder = builder.priority(pri);
    }
    debug!("route_replace_builder:{builder:?}");
    route_handle.add(builder.build()).replace().execute().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_carries_destination_and_gateway() {
        let route = Route {
            dst: Some("10.0.0.0/24".parse().unwrap()),
            oif_index: Some(3),
            gateway: Some("10.0.0.1".parse().unwrap()),
            src: Some("10.0.0.5".parse().unwrap()),
            route_type: Some(RouteType::Unicast),
            metric: Some(100),
        };
        assert_eq!(route.dst.unwrap().prefix(), 24);
        assert_eq!(route.oif_index, Some(3));
    }
}
