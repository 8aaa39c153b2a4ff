//! One-shot and supervised DHCP client lifecycles.
//!
//! One-shot: start the client with `resident = false`, await the first
//! `Bound`/`Renew` event, return the lease; the client process exits on its
//! own. Supervised: start with `resident = true`, keep reading events and
//! maintaining the cached lease/default-route until `finish` is called.
//!
//! An attribute listener caches `ip`/`gateway`/`domain` on Bound/Renew and
//! clears them on Deconfig; `await_ip(timeout)` blocks on that cache, and
//! `finish(timeout)` is safe to call more than once.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use ipnetwork::IpNetwork;
use tokio::process::Child;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::dhcp::client::{self, ClientConfig};
use crate::dhcp::event::{EventKind, EventSocket};
use crate::ip::route::{self, Route};
use crate::ns::ns::Netns;

#[derive(Debug, Clone, Default)]
pub struct Lease {
    pub address: Option<IpNetwork>,
    pub gateway: Option<IpAddr>,
    pub domain: Option<String>,
}

struct Shared {
    lease: Mutex<Lease>,
}

pub struct Supervisor {
    child: Child,
    cancel_tx: watch::Sender<bool>,
    event_task: JoinHandle<()>,
    shared: Arc<Shared>,
    resident: bool,
}

impl Supervisor {
    /// Starts a DHCP client for `config`, targeting `target_ns` (the
    /// namespace that will own the interface and will have its default
    /// route maintained on renewal; `None` means the host namespace).
    pub async fn start(config: ClientConfig, target_ns: Option<Netns>) -> Result<Self> {
        let socket_path = config.event_queue_path.clone();
        let event_socket = EventSocket::bind(&socket_path)?;

        let resident = config.resident;
        let child = client::spawn(&config)?;

        let shared = Arc::new(Shared {
            lease: Mutex::new(Lease::default()),
        });

        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let reader_shared = shared.clone();
        let event_task = tokio::spawn(async move {
            loop {
                match event_socket.recv(&mut cancel_rx).await {
                    Ok(Some(event)) => {
                        handle_event(&reader_shared, &target_ns, event).await;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!("dhcp event read failed: {e}");
                    }
                }
            }
        });

        Ok(Self {
            child,
            cancel_tx,
            event_task,
            shared,
            resident,
        })
    }

    /// Blocks until the cached lease has an address, or `timeout` elapses.
    /// Fails immediately if the client process has already exited with a
    /// non-zero status.
    pub async fn await_ip(&mut self, timeout: Duration) -> Result<Lease> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let lease = self.shared.lease.lock().await;
                if lease.address.is_some() {
                    return Ok(lease.clone());
                }
            }

            if let Some(status) = self.child.try_wait()? {
                if !status.success() {
                    return Err(anyhow!("dhcp client exited early with {status}"));
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(anyhow!("timed out waiting for dhcp lease"));
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Idempotent teardown: in one-shot mode, awaits the client's own exit;
    /// in supervised mode, sends SIGTERM. Either way, waits up to `timeout`
    /// for process exit, cancels and joins the event-reader task, and
    /// drops the event socket (unlinking its path).
    pub async fn finish(mut self, timeout: Duration) -> Result<()> {
        if self.resident {
            client::terminate(&mut self.child, timeout).await?;
        } else if let Err(e) = tokio::time::timeout(timeout, self.child.wait()).await {
            log::warn!("one-shot dhcp client did not exit within {timeout:?}: {e}");
            let _ = self.child.start_kill();
        }

        let _ = self.cancel_tx.send(true);
        if let Err(e) = self.event_task.await {
            log::warn!("dhcp event reader task panicked: {e}");
        }

        Ok(())
    }
}

async fn handle_event(shared: &Shared, target_ns: &Option<Netns>, event: crate::dhcp::event::Event) {
    match event.kind {
        EventKind::Bound | EventKind::Renew => {
            let previous_gateway = {
                let mut lease = shared.lease.lock().await;
                let previous = lease.gateway;
                lease.address = event.ip;
                lease.gateway = event.gateway;
                lease.domain = event.domain.clone();
                previous
            };

            if event.kind == EventKind::Renew {
                if let Some(gateway) = event.gateway {
                    if previous_gateway != Some(gateway) {
                        replace_default_route(target_ns, gateway).await;
                    }
                }
            }
        }
        EventKind::Deconfig => {
            let mut lease = shared.lease.lock().await;
            *lease = Lease::default();
        }
        EventKind::LeaseFail => {
            log::warn!("dhcp client reported lease failure");
        }
    }
}

/// Default-route maintenance runs with a short timeout and is
/// best-effort: failures (including a timeout) are logged, never
/// propagated, so a stuck netlink call can't wedge the event reader.
const DEFAULT_ROUTE_TIMEOUT: Duration = Duration::from_secs(1);

async fn replace_default_route(target_ns: &Option<Netns>, gateway: IpAddr) {
    let default_dst: IpNetwork = match gateway {
        IpAddr::V4(_) => "0.0.0.0/0".parse().unwrap(),
        IpAddr::V6(_) => "::/0".parse().unwrap(),
    };

    let apply = async {
        match target_ns {
            Some(ns) => {
                let current = Netns::get()?;
                crate::ns::ns::exec_netns(
                    &current,
                    ns,
                    route::route_replace(Route {
                        dst: Some(default_dst),
                        gateway: Some(gateway),
                        ..Default::default()
                    }),
                )
                .await
            }
            None => {
                route::route_replace(Route {
                    dst: Some(default_dst),
                    gateway: Some(gateway),
                    ..Default::default()
                })
                .await
            }
        }
    };

    let result = match tokio::time::timeout(DEFAULT_ROUTE_TIMEOUT, apply).await {
        Ok(r) => r,
        Err(_) => Err(anyhow!("timed out replacing default route")),
    };

    if let Err(e) = result {
        log::warn!("failed to replace default route for renewed gateway {gateway}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_defaults_to_empty() {
        let lease = Lease::default();
        assert!(lease.address.is_none());
        assert!(lease.gateway.is_none());
    }
}
