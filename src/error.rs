//! Error handling for the l4scan scanner
//!
//! Only configuration and resource failures surface as [`ScanError`]. Per-port
//! problems (a failed send, a malformed reply) degrade into that port's
//! verdict and never abort a session.

use crate::network::AddressFamily;
use std::net::IpAddr;
use thiserror::Error;

/// Main error type for scanning operations
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("Interface {interface} has no usable {family} address")]
    NoSourceAddress {
        interface: String,
        family: AddressFamily,
    },

    #[error("Port range error: {0}")]
    PortRangeError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Permission denied: {0}")]
    PermissionError(String),

    #[error("Raw socket error: {0}")]
    RawSocketError(String),

    #[error("Address family mismatch: source {src}, destination {dst}")]
    AddressFamilyMismatch { src: IpAddr, dst: IpAddr },

    #[error("Packet error: {0}")]
    PacketError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for scan operations
pub type ScanResult<T> = Result<T, ScanError>;

impl ScanError {
    /// Classify a socket creation/bind failure.
    pub fn from_socket(context: &str, e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                ScanError::PermissionError(format!("{}: {}", context, e))
            }
            _ if e.raw_os_error() == Some(libc::EPERM) => {
                ScanError::PermissionError(format!("{}: {}", context, e))
            }
            _ => ScanError::RawSocketError(format!("{}: {}", context, e)),
        }
    }

    /// Whether the error ends the whole run.
    ///
    /// Errors tied to one destination address only end that address's
    /// session; the engine moves on to the next address.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ScanError::NoSourceAddress { .. }
                | ScanError::AddressFamilyMismatch { .. }
                | ScanError::PacketError(_)
        )
    }

    /// Operator hint printed next to the error message.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ScanError::PermissionError(_) if cfg!(target_os = "linux") => Some(
                "raw sockets need root or: sudo setcap cap_net_raw,cap_net_admin+eip $(which l4scan)",
            ),
            ScanError::PermissionError(_) => Some("raw sockets need root privileges"),
            ScanError::InterfaceNotFound(_) => {
                Some("run without --interface to list the available interfaces")
            }
            ScanError::NoSourceAddress { .. } => {
                Some("pick an interface carrying an address of the target's family")
            }
            _ => None,
        }
    }
}

/// Convert common errors to ScanError
impl From<std::net::AddrParseError> for ScanError {
    fn from(e: std::net::AddrParseError) -> Self {
        ScanError::InvalidTarget(e.to_string())
    }
}

impl From<std::num::ParseIntError> for ScanError {
    fn from(e: std::num::ParseIntError) -> Self {
        ScanError::PortRangeError(e.to_string())
    }
}

impl From<toml::de::Error> for ScanError {
    fn from(e: toml::de::Error) -> Self {
        ScanError::ParseError(e.to_string())
    }
}
