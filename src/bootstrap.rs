//! One-shot interface setup at startup.
//!
//! The server needs an IPv4 address on the interface it serves. If the
//! interface has none, the configured fallback address is assigned with the
//! `ip` tool before anything binds.

use std::net::{Ipv4Addr, SocketAddrV4};

use nix::ifaddrs::getifaddrs;
use nix::net::if_::if_nametoindex;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};

/// The first IPv4 address found on an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

/// Fails with [`Error::Interface`] if no interface is called `name`.
pub fn check_interface(name: &str) -> Result<()> {
    if_nametoindex(name)
        .map(|_| ())
        .map_err(|error| Error::Interface(format!("Failed to find interface {}: {}", name, error)))
}

pub fn interface_ipv4(name: &str) -> Result<Option<InterfaceAddress>> {
    let addresses = getifaddrs().map_err(|error| {
        Error::Interface(format!("Failed to list interface addresses: {}", error))
    })?;

    for entry in addresses.filter(|entry| entry.interface_name == name) {
        let Some(address) = entry
            .address
            .as_ref()
            .and_then(|storage| storage.as_sockaddr_in())
        else {
            continue;
        };

        let netmask = entry
            .netmask
            .as_ref()
            .and_then(|storage| storage.as_sockaddr_in())
            .map(|mask| *SocketAddrV4::from(*mask).ip())
            .unwrap_or(Ipv4Addr::new(255, 255, 255, 0));

        return Ok(Some(InterfaceAddress {
            address: *SocketAddrV4::from(*address).ip(),
            netmask,
        }));
    }

    Ok(None)
}

/// Returns the interface's IPv4 address, assigning the configured fallback
/// first when it has none.
///
/// # Errors
///
/// Returns [`Error::Interface`] when the interface does not exist, when an
/// `ip` command fails, or when no address shows up after the assignment.
pub async fn ensure_ipv4(name: &str, config: &Config) -> Result<InterfaceAddress> {
    check_interface(name)?;

    if let Some(found) = interface_ipv4(name)? {
        debug!("{} already has {}/{}", name, found.address, found.netmask);
        return Ok(found);
    }

    let cidr = config.fallback_cidr();
    warn!("No IPv4 address on {}, assigning {}", name, cidr);
    assign_address(name, &cidr).await?;

    interface_ipv4(name)?.ok_or_else(|| {
        Error::Interface(format!(
            "No IPv4 address on {} after assigning {}",
            name, cidr
        ))
    })
}

/// Brings the interface up, flushes its addresses and adds `cidr`.
pub async fn assign_address(name: &str, cidr: &str) -> Result<()> {
    run_ip(&["link", "set", name, "up"]).await?;
    run_ip(&["addr", "flush", "dev", name]).await?;
    run_ip(&["addr", "add", cidr, "dev", name]).await?;

    info!("Assigned {} to {}", cidr, name);
    Ok(())
}

async fn run_ip(args: &[&str]) -> Result<()> {
    let output = Command::new("ip")
        .args(args)
        .output()
        .await
        .map_err(|error| Error::Interface(format!("ip {}: {}", args.join(" "), error)))?;

    if !output.status.success() {
        return Err(Error::Interface(format!(
            "ip {}: {}: {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(())
}
