//! Lease bookkeeping for the dynamic pool.
//!
//! The pool is consumed front to back: a cursor walks the host offsets from
//! `pool_start` to `pool_end` and each new client gets the offset under the
//! cursor. Nothing is ever freed, so the cursor only moves forward and an
//! address handed out once always stays with the same client.
//!
//! # Thread Safety
//!
//! [`LeaseTable`] keeps its map and cursor behind a single [`Mutex`]. Every
//! operation takes the lock once, does its check-then-write and releases it
//! before returning, so concurrent requests never race on the cursor and
//! the lock is never held across I/O.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};

/// Stable identity of a requesting host: its hardware address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(Vec<u8>);

impl ClientId {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for ClientId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for ClientId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, byte) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for ClientId {
    type Err = Error;

    /// Parses `aa:bb:cc:dd:ee:ff` (or `-` separated) hardware addresses.
    fn from_str(s: &str) -> Result<Self> {
        s.split([':', '-'])
            .map(|part| {
                u8::from_str_radix(part, 16)
                    .map_err(|_| Error::InvalidConfig(format!("Invalid hardware address: {}", s)))
            })
            .collect::<Result<Vec<u8>>>()
            .map(Self)
    }
}

/// The binding of one client to one pool address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub client_id: ClientId,
    pub ip_address: Ipv4Addr,
    /// When the address was first handed out (UTC).
    pub granted_at: DateTime<Utc>,
}

#[derive(Debug)]
struct PoolState {
    leases: HashMap<ClientId, Lease>,
    /// Next unassigned host offset. Past `pool_end` means exhausted.
    cursor: u32,
}

/// Client-to-address map plus the pool cursor, shared by all request tasks.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use lanprov::{ClientId, Config, LeaseTable};
///
/// # async fn example() -> lanprov::Result<()> {
/// let table = LeaseTable::new(Arc::new(Config::default()));
/// let client: ClientId = "aa:bb:cc:dd:ee:ff".parse()?;
///
/// let ip = table.insert_next(&client).await?;
/// assert_eq!(table.lookup(&client).await, Some(ip));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LeaseTable {
    state: Mutex<PoolState>,
    config: Arc<Config>,
}

impl LeaseTable {
    pub fn new(config: Arc<Config>) -> Self {
        let state = PoolState {
            leases: HashMap::new(),
            cursor: config.pool_start,
        };

        Self {
            state: Mutex::new(state),
            config,
        }
    }

    /// Returns the address bound to `client_id`, if any. Never allocates.
    pub async fn lookup(&self, client_id: &ClientId) -> Option<Ipv4Addr> {
        let state = self.state.lock().await;
        state.leases.get(client_id).map(|lease| lease.ip_address)
    }

    /// Binds `client_id` to the next pool address, or returns its existing one.
    ///
    /// Repeated calls for the same client always yield the same address and
    /// leave the cursor untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] when the client is unknown and the
    /// cursor has moved past `pool_end`.
    pub async fn insert_next(&self, client_id: &ClientId) -> Result<Ipv4Addr> {
        let mut state = self.state.lock().await;

        if let Some(lease) = state.leases.get(client_id) {
            debug!("Re-offering {} to {}", lease.ip_address, client_id);
            return Ok(lease.ip_address);
        }

        if state.cursor > self.config.pool_end {
            return Err(Error::PoolExhausted);
        }

        let ip_address = self.config.pool_address(state.cursor);
        state.cursor += 1;
        state.leases.insert(
            client_id.clone(),
            Lease {
                client_id: client_id.clone(),
                ip_address,
                granted_at: Utc::now(),
            },
        );

        debug!("Bound {} to {}", ip_address, client_id);

        Ok(ip_address)
    }

    pub async fn get_lease(&self, client_id: &ClientId) -> Option<Lease> {
        let state = self.state.lock().await;
        state.leases.get(client_id).cloned()
    }

    /// All leases, ordered by address (which is also grant order).
    pub async fn list_leases(&self) -> Vec<Lease> {
        let state = self.state.lock().await;
        let mut leases: Vec<Lease> = state.leases.values().cloned().collect();
        leases.sort_by_key(|lease| lease.ip_address);
        leases
    }

    pub async fn active_lease_count(&self) -> usize {
        self.state.lock().await.leases.len()
    }

    /// Number of addresses the cursor has not reached yet.
    pub async fn remaining(&self) -> u32 {
        let state = self.state.lock().await;
        (self.config.pool_end + 1).saturating_sub(state.cursor)
    }

    pub fn pool_size(&self) -> u32 {
        self.config.pool_size()
    }
}
