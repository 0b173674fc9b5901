use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use crate::error::{Error, Result};

/// What the DHCP side does when the pool has nothing left to hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustionPolicy {
    /// Log the exhaustion and send nothing. The client times out and retries.
    #[default]
    Drop,
    /// Answer with a DHCPNAK carrying only the server identifier.
    Nak,
}

/// Immutable runtime configuration, built once at startup and shared as
/// `Arc<Config>` by every component.
///
/// `server_ip` and `subnet_mask` normally come from the interface bootstrap
/// rather than the config file; see [`Config::with_interface_address`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_ip: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    /// First assignable host offset within the subnet.
    pub pool_start: u32,
    /// Last assignable host offset within the subnet (inclusive).
    pub pool_end: u32,
    /// Advertised in option 51. Nothing enforces it.
    pub lease_duration_seconds: u32,
    pub dns_ttl_seconds: u32,
    pub dns_listen: SocketAddr,
    pub http_listen: SocketAddr,
    /// Address put on the interface when it has no IPv4 address of its own.
    pub fallback_address: Ipv4Addr,
    pub fallback_prefix_len: u8,
    pub on_pool_exhausted: ExhaustionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_ip: Ipv4Addr::new(10, 0, 0, 1),
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
            pool_start: 100,
            pool_end: 200,
            lease_duration_seconds: 3600,
            dns_ttl_seconds: 60,
            dns_listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 53)),
            http_listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 80)),
            fallback_address: Ipv4Addr::new(10, 0, 0, 1),
            fallback_prefix_len: 24,
            on_pool_exhausted: ExhaustionPolicy::Drop,
        }
    }
}

impl Config {
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns a copy addressed for the interface the server runs on.
    pub fn with_interface_address(&self, server_ip: Ipv4Addr, subnet_mask: Ipv4Addr) -> Self {
        Self {
            server_ip,
            subnet_mask,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mask = u32::from(self.subnet_mask);
        if mask.leading_ones() + mask.trailing_zeros() != 32 {
            return Err(Error::InvalidConfig(format!(
                "subnet_mask {} is not a contiguous prefix",
                self.subnet_mask
            )));
        }

        if self.pool_start > self.pool_end {
            return Err(Error::InvalidConfig(
                "pool_start must be less than or equal to pool_end".to_string(),
            ));
        }

        if self.pool_start == 0 {
            return Err(Error::InvalidConfig(
                "pool_start must be greater than 0 (offset 0 is the network address)".to_string(),
            ));
        }

        let broadcast_offset = !mask;
        if self.pool_end >= broadcast_offset {
            return Err(Error::InvalidConfig(format!(
                "pool_end {} must be below the broadcast offset {} of {}",
                self.pool_end, broadcast_offset, self.subnet_mask
            )));
        }

        if self.ip_in_pool(self.server_ip) {
            return Err(Error::InvalidConfig(
                "server_ip must not be within the pool range".to_string(),
            ));
        }

        if self.lease_duration_seconds == 0 {
            return Err(Error::InvalidConfig(
                "lease_duration_seconds must be greater than 0".to_string(),
            ));
        }

        if self.fallback_prefix_len == 0 || self.fallback_prefix_len > 30 {
            return Err(Error::InvalidConfig(
                "fallback_prefix_len must be between 1 and 30".to_string(),
            ));
        }

        Ok(())
    }

    pub fn network_address(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.server_ip) & u32::from(self.subnet_mask))
    }

    /// Concrete address for a host offset inside the subnet.
    pub fn pool_address(&self, offset: u32) -> Ipv4Addr {
        let host = offset & !u32::from(self.subnet_mask);
        Ipv4Addr::from(u32::from(self.network_address()) | host)
    }

    pub fn ip_in_pool(&self, ip: Ipv4Addr) -> bool {
        let addr = u32::from(ip);
        let mask = u32::from(self.subnet_mask);
        if addr & mask != u32::from(self.network_address()) {
            return false;
        }
        let offset = addr & !mask;
        offset >= self.pool_start && offset <= self.pool_end
    }

    pub fn pool_size(&self) -> u32 {
        self.pool_end - self.pool_start + 1
    }

    /// The fallback address in `a.b.c.d/len` form, as `ip addr add` expects it.
    pub fn fallback_cidr(&self) -> String {
        format!("{}/{}", self.fallback_address, self.fallback_prefix_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pool_start_greater_than_end() {
        let config = Config {
            pool_start: 200,
            pool_end: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pool_must_stay_inside_host_part() {
        let config = Config {
            pool_end: 255,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            pool_start: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_server_ip_in_pool() {
        let config = Config {
            server_ip: Ipv4Addr::new(10, 0, 0, 150),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_contiguous_mask_rejected() {
        let config = Config {
            subnet_mask: Ipv4Addr::new(255, 0, 255, 0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_lease_duration_rejected() {
        let config = Config {
            lease_duration_seconds: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pool_address() {
        let config = Config::default().with_interface_address(
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(255, 255, 255, 0),
        );
        assert_eq!(config.network_address(), Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(config.pool_address(100), Ipv4Addr::new(192, 168, 1, 100));
        assert_eq!(config.pool_address(200), Ipv4Addr::new(192, 168, 1, 200));
    }

    #[test]
    fn test_pool_address_wider_subnet() {
        let config = Config::default().with_interface_address(
            Ipv4Addr::new(172, 16, 4, 9),
            Ipv4Addr::new(255, 255, 0, 0),
        );
        assert_eq!(config.pool_address(100), Ipv4Addr::new(172, 16, 0, 100));
        assert_eq!(config.pool_address(300), Ipv4Addr::new(172, 16, 1, 44));
    }

    #[test]
    fn test_ip_in_pool() {
        let config = Config::default();
        assert!(config.ip_in_pool(Ipv4Addr::new(10, 0, 0, 150)));
        assert!(!config.ip_in_pool(Ipv4Addr::new(10, 0, 0, 50)));
        assert!(!config.ip_in_pool(Ipv4Addr::new(10, 0, 0, 250)));
        assert!(!config.ip_in_pool(Ipv4Addr::new(10, 0, 1, 150)));
    }

    #[test]
    fn test_pool_size() {
        let config = Config::default();
        assert_eq!(config.pool_size(), 101);
    }

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let json = r#"{ "pool_end": 150, "on_pool_exhausted": "nak" }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.pool_start, 100);
        assert_eq!(config.pool_end, 150);
        assert_eq!(config.on_pool_exhausted, ExhaustionPolicy::Nak);
        assert_eq!(config.dns_ttl_seconds, 60);
    }

    #[test]
    fn test_fallback_cidr() {
        assert_eq!(Config::default().fallback_cidr(), "10.0.0.1/24");
    }
}
