use anyhow::anyhow;
use futures::TryStreamExt;
use macaddr::{MacAddr, MacAddr6};
use netlink_packet_route::link::{InfoKind, LinkAttribute, LinkFlags, LinkInfo, LinkMessage};
use once_cell::sync::OnceCell;
use rtnetlink::{Handle, new_connection};

static HANDLE: OnceCell<Handle> = OnceCell::new();

/// Returns the process-wide rtnetlink handle, establishing the connection
/// (and spawning its driving task) on first use. `Handle` is cheap to
/// clone — it is backed by a channel to the connection task — so every
/// caller shares one connection instead of opening a new one per call.
pub fn get_handle() -> anyhow::Result<Option<Handle>> {
    if let Some(handle) = HANDLE.get() {
        return Ok(Some(handle.clone()));
    }

    let (connection, handle, _) =
        new_connection().map_err(|e| anyhow!("Failed to create rtnetlink connection: {}", e))?;
    tokio::spawn(connection);
    let _ = HANDLE.set(handle.clone());
    Ok(Some(handle))
}

/// Retrieves a link (network interface) by its name.
///
/// # Arguments
/// * `name` - The name of the network interface.
///
/// # Returns
/// * `Ok(Some(LinkMessage))` if found.
/// * `Ok(None)` if the interface does not exist.
/// * `Err(anyhow::Error)` if an error occurs.
pub async fn link_by_name(name: &str) -> anyhow::Result<LinkMessage> {
    let handle = get_handle()?.ok_or_else(|| anyhow!("Cannot get handle"))?;

    let mut links = handle.link().get().match_name(name.to_string()).execute();

    let link = links
        .try_next()
        .await?
        .ok_or_else(|| anyhow!("Link with name {} not found", name))?;

    Ok(link)
}

/// Add a network link configuration.
///
/// # Arguments
/// * `msg` - The link message containing the updated configuration.
///
/// # Returns
/// * `Ok(())` on success.
/// * `Err(anyhow::Error)` on failure.
pub async fn add_link(msg: LinkMessage) -> anyhow::Result<()> {
    let handle = get_handle()?.ok_or_else(|| anyhow!("Cannot get handle"))?;

    handle.link().add(msg).execute().await?;

    Ok(())
}

/// Updates a network link configuration.
///
/// # Arguments
/// * `msg` - The link message containing the updated configuration.
///
/// # Returns
/// * `Ok(())` on success.
/// * `Err(anyhow::Error)` on failure.
pub async fn set_link(msg: LinkMessage) -> anyhow::Result<()> {
    let handle = get_handle()?.ok_or_else(|| anyhow!("Cannot get handle"))?;

    handle.link().set(msg).execute().await?;

    Ok(())
}

/// Delete a network link configuration.
///
/// # Arguments
/// * `msg` - The link message containing the updated configuration.
///
/// # Returns
/// * `Ok(())` on success.
/// * `Err(anyhow::Error)` on failure.
pub async fn del_link(msg: LinkMessage) -> anyhow::Result<()> {
    let handle = get_handle()?.ok_or_else(|| anyhow!("Cannot get handle"))?;

    handle.link().del(msg.header.index).execute().await?;

    Ok(())
}
/// Enables a network link.
///
/// # Arguments
/// * `link` - Reference to the link message.
///
/// # Returns
/// * `Ok(())` on success.
/// * `Err(anyhow::Error)` on failure.
pub async fn link_set_up(link: &LinkMessage) -> anyhow::Result<()> {
    let mut msg = LinkMessage::default();

    msg.header.index = link.header.index;
    msg.header.flags |= LinkFlags::Up;
    msg.header.change_mask |= LinkFlags::Up;

    set_link(msg)
        .await
        .map_err(|e| anyhow!("Failed to set up: {}", e))?;
    Ok(())
}

/// Assigns a master device to a network link.
///
/// # Arguments
/// * `link` - The link to be assigned to a master.
/// * `master` - The master link.
///
/// # Returns
/// * `Ok(())` on success.
/// * `Err(anyhow::Error)` on failure.
pub async fn link_set_master(link: &LinkMessage, master: &LinkMessage) -> anyhow::Result<()> {
    let mut msg = LinkMessage::default();
    msg.header.index = link.header.index;
    msg.attributes
        .push(LinkAttribute::Controller(master.header.index));

    set_link(msg)
        .await
        .map_err(|e| anyhow!("Failed to set master: {}", e))?;
    Ok(())
}

/// Extracts the MAC address from a list of link attributes.
///
/// # Arguments
/// * `attributes` - A reference to a slice of `LinkAttribute`s.
///
/// # Returns
/// * `Some(MacAddr)` if a valid MAC address is found.
/// * `None` if no MAC address is found.
pub fn get_mac_address(attributes: &[LinkAttribute]) -> Option<MacAddr> {
    attributes.iter().find_map(|attr| match attr {
        LinkAttribute::Address(mac_bytes) if mac_bytes.len() == 6 => {
            Some(MacAddr::from(MacAddr6::new(
                mac_bytes[0],
                mac_bytes[1],
                mac_bytes[2],
                mac_bytes[3],
                mac_bytes[4],
                mac_bytes[5],
            )))
        }
        _ => None,
    })
}

/// True if the link's `IFLA_INFO_KIND` attribute is `bridge`.
pub fn is_bridge(link: &LinkMessage) -> bool {
    link.attributes.iter().any(|attr| {
        matches!(
            attr,
            LinkAttribute::LinkInfo(infos)
                if infos.iter().any(|i| matches!(i, LinkInfo::Kind(InfoKind::Bridge)))
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_bridge_checks_link_info_kind() {
        let mut bridge = LinkMessage::default();
        bridge
            .attributes
            .push(LinkAttribute::LinkInfo(vec![LinkInfo::Kind(InfoKind::Bridge)]));
        assert!(is_bridge(&bridge));

        let mut veth = LinkMessage::default();
        veth.attributes
            .push(LinkAttribute::LinkInfo(vec![LinkInfo::Kind(InfoKind::Veth)]));
        assert!(!is_bridge(&veth));
    }

    #[test]
    fn get_mac_address_reads_six_byte_address() {
        let attrs = vec![LinkAttribute::Address(vec![0x02, 0x00, 0x00, 0x00, 0x00, 0x01])];
        let mac = get_mac_address(&attrs).expect("mac should be present");
        assert_eq!(mac.to_string(), "02:00:00:00:00:01");
    }

    #[test]
    fn get_mac_address_ignores_malformed_address() {
        let attrs = vec![LinkAttribute::Address(vec![0x02, 0x00])];
        assert!(get_mac_address(&attrs).is_none());
    }
}
