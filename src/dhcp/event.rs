//! DHCP client event transport and lease representation.
//!
//! The child DHCP client process invokes a small shim on every event; the
//! shim serializes the event and sends it over a `UnixDatagram` whose path
//! is passed to the child via the `EVENT_QUEUE` environment variable. The
//! supervisor reads that socket on a dedicated task, racing the read
//! against a cancellation channel with `tokio::select!` so `finish` can
//! interrupt a blocking wait — the async equivalent of the original
//! POSIX-message-queue "wait on queue OR cancel" contract.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use ipnetwork::IpNetwork;
use tokio::net::UnixDatagram;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Bound,
    Renew,
    Deconfig,
    LeaseFail,
}

impl EventKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "bound" => Some(EventKind::Bound),
            "renew" => Some(EventKind::Renew),
            "deconfig" => Some(EventKind::Deconfig),
            "leasefail" | "nak" => Some(EventKind::LeaseFail),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub ip: Option<IpNetwork>,
    pub gateway: Option<IpAddr>,
    pub domain: Option<String>,
}

/// Parses the shim's `__event:<json>` line protocol.
///
/// Expected payload shape (matching the DHCP-exported env vars the shim
/// forwards): `{"type":"bound","ip":"...","mask":"...","router":"...","domain":"..."}`.
pub fn parse_event(payload: &[u8]) -> Result<Event> {
    let text = std::str::from_utf8(payload).context("event payload is not utf8")?;
    let value: serde_json::Value = serde_json::from_str(text).context("event payload is not json")?;

    let kind = value
        .get("type")
        .and_then(|v| v.as_str())
        .and_then(EventKind::parse)
        .ok_or_else(|| anyhow!("unknown or missing event type in {text}"))?;

    let ip_str = value.get("ip").and_then(|v| v.as_str());
    let mask_str = value.get("mask").and_then(|v| v.as_str());
    let ip = match (ip_str, mask_str) {
        (Some(ip), Some(mask)) => {
            let ip: IpAddr = ip.parse().context("invalid ip in event")?;
            let mask: IpAddr = mask.parse().context("invalid mask in event")?;
            Some(IpNetwork::with_netmask(ip, mask).context("invalid ip/mask pair in event")?)
        }
        _ => None,
    };

    let gateway = value
        .get("router")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .transpose()
        .context("invalid router in event")?;

    let domain = value
        .get("domain")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    Ok(Event { kind, ip, gateway, domain })
}

/// Owns the UNIX datagram socket a DHCP client's shim writes events to.
pub struct EventSocket {
    socket: UnixDatagram,
    path: PathBuf,
}

impl EventSocket {
    /// Binds a fresh datagram socket at `path`, removing any stale file.
    pub fn bind(path: &Path) -> Result<Self> {
        let _ = std::fs::remove_file(path);
        let socket = UnixDatagram::bind(path)
            .with_context(|| format!("binding event socket at {}", path.display()))?;
        Ok(Self { socket, path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Waits for the next event, or returns `None` if `cancel` fires first.
    pub async fn recv(&self, cancel: &mut watch::Receiver<bool>) -> Result<Option<Event>> {
        let mut buf = [0u8; 1024];
        tokio::select! {
            res = self.socket.recv(&mut buf) => {
                let n = res.context("reading from event socket")?;
                Ok(Some(parse_event(&buf[..n])?))
            }
            _ = cancel.changed() => Ok(None),
        }
    }
}

impl Drop for EventSocket {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bound_event_with_gateway() {
        let payload = br#"{"type":"bound","ip":"192.0.2.17","mask":"255.255.255.0","router":"192.0.2.254","domain":"example.com"}"#;
        let event = parse_event(payload).unwrap();
        assert_eq!(event.kind, EventKind::Bound);
        assert_eq!(event.ip.unwrap().prefix(), 24);
        assert_eq!(event.gateway, Some("192.0.2.254".parse().unwrap()));
        assert_eq!(event.domain.as_deref(), Some("example.com"));
    }

    #[test]
    fn parses_deconfig_event_without_address_fields() {
        let payload = br#"{"type":"deconfig"}"#;
        let event = parse_event(payload).unwrap();
        assert_eq!(event.kind, EventKind::Deconfig);
        assert!(event.ip.is_none());
        assert!(event.gateway.is_none());
    }

    #[test]
    fn unknown_event_type_is_an_error() {
        let payload = br#"{"type":"nonsense"}"#;
        assert!(parse_event(payload).is_err());
    }

    #[test]
    fn empty_router_string_is_treated_as_absent() {
        let payload = br#"{"type":"bound","ip":"192.0.2.17","mask":"255.255.255.0","router":""}"#;
        let event = parse_event(payload).unwrap();
        assert!(event.gateway.is_none());
    }

    #[tokio::test]
    async fn event_socket_round_trips_a_shim_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v4.sock");

        let socket = EventSocket::bind(&path).unwrap();
        assert_eq!(socket.path(), path.as_path());

        let client = UnixDatagram::unbound().unwrap();
        let payload = br#"{"type":"bound","ip":"192.0.2.17","mask":"255.255.255.0","router":"192.0.2.254"}"#;
        client.send_to(payload, &path).await.unwrap();

        let (_cancel_tx, mut cancel_rx) = watch::channel(false);
        let event = socket.recv(&mut cancel_rx).await.unwrap().unwrap();
        assert_eq!(event.kind, EventKind::Bound);
        assert_eq!(event.gateway, Some("192.0.2.254".parse().unwrap()));
    }

    #[tokio::test]
    async fn event_socket_recv_returns_none_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v6.sock");
        let socket = EventSocket::bind(&path).unwrap();

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        cancel_tx.send(true).unwrap();

        assert!(socket.recv(&mut cancel_rx).await.unwrap().is_none());
    }

    #[test]
    fn drop_unlinks_the_socket_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.sock");
        let socket = EventSocket::bind(&path).unwrap();
        assert!(path.exists());
        drop(socket);
        assert!(!path.exists());
    }
}
