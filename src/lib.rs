//! # lanprov
//!
//! A small provisioning responder for a LAN segment this host owns.
//!
//! ## Features
//!
//! - DHCP: DISCOVER/OFFER and REQUEST/ACK from a single address pool
//! - DNS: every question answered with one A record for this host
//! - HTTP: one static XML provisioning profile for every request
//! - Interface bootstrap with a fallback address
//! - Async/await with Tokio
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use lanprov::{Config, DhcpServer};
//!
//! #[tokio::main]
//! async fn main() -> lanprov::Result<()> {
//!     let config = Arc::new(Config::load_or_create("config.json")?);
//!     let server = DhcpServer::new(config, "eth0")?;
//!     server.run(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`LeaseTable`] - client-to-address map and pool cursor behind one lock
//! - [`Allocator`] - idempotent address allocation on top of the table
//! - [`DoraHandler`] - turns DISCOVER/REQUEST into OFFER/ACK
//! - [`DhcpServer`] - UDP/67 dispatch loop, one task per datagram
//! - [`dns`] and [`http`] - the fixed responders
//! - [`bootstrap`] - interface address discovery and fallback assignment

pub mod allocator;
pub mod bootstrap;
pub mod config;
pub mod dns;
pub mod error;
pub mod handler;
pub mod http;
pub mod lease;
pub mod options;
pub mod packet;
pub mod server;

pub use allocator::Allocator;
pub use config::{Config, ExhaustionPolicy};
pub use dns::DnsServer;
pub use error::{Error, Result};
pub use handler::DoraHandler;
pub use lease::{ClientId, Lease, LeaseTable};
pub use options::{DhcpOption, MessageType};
pub use packet::DhcpPacket;
pub use server::DhcpServer;
