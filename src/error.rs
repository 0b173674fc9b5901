//! Error types for the provisioning responder.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants.

/// Errors that can occur while provisioning the segment.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system or network I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (config file).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed DHCP packet received.
    ///
    /// Packets that are too short, carry a bad magic cookie or have
    /// truncated options end up here.
    #[error("Invalid DHCP packet: {0}")]
    InvalidPacket(String),

    /// A reply could not be turned into wire bytes.
    #[error("Failed to encode reply: {0}")]
    Encoding(String),

    /// The address pool cursor has passed the end of the range.
    ///
    /// Addresses are never recycled, so this persists until the process
    /// restarts or the pool is widened.
    #[error("No available IP addresses in pool")]
    PoolExhausted,

    /// Invalid server configuration.
    ///
    /// Returned by [`Config::validate`](crate::Config::validate).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Socket creation or configuration error.
    ///
    /// Typically occurs when binding to port 67, 53 or 80 without
    /// administrator privileges.
    #[error("Socket error: {0}")]
    Socket(String),

    /// DNS message could not be decoded or encoded.
    #[error("DNS error: {0}")]
    Dns(#[from] hickory_proto::error::ProtoError),

    /// A well-formed DNS message that must not be answered, such as a
    /// response arriving on the query port.
    #[error("Unexpected DNS message: {0}")]
    UnexpectedDns(String),

    /// The network interface could not be found or configured.
    #[error("Interface error: {0}")]
    Interface(String),
}

/// A specialized Result type for provisioning operations.
pub type Result<T> = std::result::Result<T, Error>;
