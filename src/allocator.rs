use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::warn;

use crate::error::{Error, Result};
use crate::lease::{ClientId, LeaseTable};

/// Hands out pool addresses. Cheap to clone; every clone shares one table.
///
/// `allocate` is idempotent: a client that asks again, whether through a
/// repeated DISCOVER or the REQUEST that follows an OFFER, gets the same
/// address for as long as the table lives. There is no way to give an
/// address back.
#[derive(Debug, Clone)]
pub struct Allocator {
    leases: Arc<LeaseTable>,
}

impl Allocator {
    pub fn new(leases: Arc<LeaseTable>) -> Self {
        Self { leases }
    }

    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] once every pool address is taken and
    /// `client_id` holds none of them.
    pub async fn allocate(&self, client_id: &ClientId) -> Result<Ipv4Addr> {
        match self.leases.insert_next(client_id).await {
            Err(Error::PoolExhausted) => {
                warn!(
                    "Pool exhausted ({} addresses), nothing left for {}",
                    self.leases.pool_size(),
                    client_id
                );
                Err(Error::PoolExhausted)
            }
            result => result,
        }
    }

    pub fn leases(&self) -> &LeaseTable {
        &self.leases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn allocator(pool_start: u32, pool_end: u32) -> Allocator {
        let config = Arc::new(Config {
            pool_start,
            pool_end,
            ..Default::default()
        });
        Allocator::new(Arc::new(LeaseTable::new(config)))
    }

    fn client(last: u8) -> ClientId {
        ClientId::from(vec![0x11, 0x22, 0x33, 0x44, 0x55, last])
    }

    #[tokio::test]
    async fn test_repeated_allocate_returns_same_address() {
        let allocator = allocator(100, 200);

        let first = allocator.allocate(&client(1)).await.unwrap();
        for _ in 0..5 {
            assert_eq!(allocator.allocate(&client(1)).await.unwrap(), first);
        }
    }

    #[tokio::test]
    async fn test_distinct_clients_get_distinct_addresses() {
        let allocator = allocator(100, 200);

        let a = allocator.allocate(&client(1)).await.unwrap();
        let b = allocator.allocate(&client(2)).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(a, Ipv4Addr::new(10, 0, 0, 100));
        assert_eq!(b, Ipv4Addr::new(10, 0, 0, 101));
    }

    #[tokio::test]
    async fn test_clones_share_one_pool() {
        let allocator = allocator(100, 200);
        let other = allocator.clone();

        let a = allocator.allocate(&client(1)).await.unwrap();
        assert_eq!(other.allocate(&client(1)).await.unwrap(), a);
        assert_eq!(other.leases().active_lease_count().await, 1);
    }

    #[tokio::test]
    async fn test_exhaustion_is_reported_not_panicked() {
        let allocator = allocator(100, 101);

        allocator.allocate(&client(1)).await.unwrap();
        allocator.allocate(&client(2)).await.unwrap();

        for _ in 0..3 {
            let result = allocator.allocate(&client(3)).await;
            assert!(matches!(result, Err(Error::PoolExhausted)));
        }
    }
}
