//! Spawns and waits on the external DHCP client binary.
//!
//! Uses `tokio::process` so the supervisor can await exit without blocking
//! a worker thread, extended with a `pre_exec` namespace switch so the
//! client runs directly inside a container's network namespace when asked.

use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use nix::sched::{CloneFlags, setns};
use tokio::process::{Child, Command};

use crate::ns::ns::Netns;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn binary<'a>(&self, v4: &'a str, v6: &'a str) -> &'a str {
        match self {
            Family::V4 => v4,
            Family::V6 => v6,
        }
    }
}

/// Everything needed to spawn one DHCP client invocation.
pub struct ClientConfig {
    pub binary: PathBuf,
    pub interface: String,
    /// Network namespace to run in. `None` means the host namespace.
    pub netns: Option<PathBuf>,
    pub family: Family,
    pub hostname: Option<String>,
    /// `true` keeps renewing until killed; `false` exits after first lease.
    pub resident: bool,
    pub event_queue_path: PathBuf,
}

/// Spawns the configured DHCP client, wiring `EVENT_QUEUE` and the
/// resident/one-shot flag, and switching into the target namespace (if
/// any) before exec via `pre_exec`.
pub fn spawn(config: &ClientConfig) -> Result<Child> {
    let mut cmd = Command::new(&config.binary);
    cmd.arg("-i").arg(&config.interface);
    cmd.arg("-s").arg(shim_path());
    // stay in the foreground so the spawned `Child` is the process that
    // actually holds the lease, not a parent that daemonizes and exits
    cmd.arg("-f");

    if !config.resident {
        // exit immediately once a lease is bound instead of staying resident
        cmd.arg("-q");
    } else {
        cmd.arg("-R");
    }

    if let Some(hostname) = &config.hostname {
        match config.family {
            Family::V4 => {
                cmd.arg("-x").arg(super::hostname::encode_v4(hostname));
            }
            Family::V6 => {
                // passed as a hex blob; the shim/client pairing on the host
                // image is expected to accept a raw option-39 payload here.
                let encoded = super::hostname::encode_v6(hostname);
                cmd.arg("-x").arg(format!(
                    "fqdn:{}",
                    encoded.iter().map(|b| format!("{b:02x}")).collect::<String>()
                ));
            }
        }
    }

    cmd.env("EVENT_QUEUE", &config.event_queue_path);
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());

    if let Some(netns_path) = config.netns.clone() {
        unsafe {
            cmd.pre_exec(move || {
                let netns = std::fs::File::open(&netns_path)?;
                setns(&netns, CloneFlags::CLONE_NEWNET)
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
                Ok(())
            });
        }
    }

    cmd.spawn()
        .with_context(|| format!("spawning dhcp client {}", config.binary.display()))
}

/// Path to the event shim invoked by the DHCP client on every event. In a
/// packaged image this is a small wrapper binary installed alongside the
/// driver; resolved at runtime via `PATH` so tests can stub it out.
fn shim_path() -> &'static str {
    "net-dhcp-event-shim"
}

/// Terminates `child` and waits up to `timeout` for it to exit, escalating
/// from SIGTERM to SIGKILL if it doesn't.
pub async fn terminate(child: &mut Child, timeout: std::time::Duration) -> Result<()> {
    if let Some(pid) = child.id() {
        let pid = nix::unistd::Pid::from_raw(pid as i32);
        let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);
    }

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(anyhow!("waiting for dhcp client exit: {e}")),
        Err(_) => {
            let _ = child.start_kill();
            child
                .wait()
                .await
                .context("waiting for dhcp client exit after SIGKILL")?;
            Ok(())
        }
    }
}

/// Resolves the namespace path for an interface descriptor, defaulting to
/// the current namespace when none is given.
pub fn resolve_netns(path: Option<&Path>) -> Result<Netns> {
    match path {
        Some(p) => Netns::get_from_path(p)?.ok_or_else(|| anyhow!("namespace {} not found", p.display())),
        None => Netns::get(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_selects_matching_binary() {
        assert_eq!(Family::V4.binary("udhcpc", "udhcpc6"), "udhcpc");
        assert_eq!(Family::V6.binary("udhcpc", "udhcpc6"), "udhcpc6");
    }
}
