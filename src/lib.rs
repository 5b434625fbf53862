//! l4scan - raw-packet TCP/UDP port scanner
//!
//! Crafts IPv4/IPv6 SYN and UDP probes, classifies the replies captured on raw
//! sockets and reports every requested port as open, closed or filtered.

pub mod config;
pub mod error;
pub mod network;
pub mod output;
pub mod scanner;
pub mod utils;

// Re-export commonly used types
pub use config::{ScanConfig, UdpSilencePolicy};
pub use error::{ScanError, ScanResult};
pub use network::{AddressFamily, PortProbe, TransportProtocol, Verdict};
pub use output::{OutputFormat, ReportWriter};
pub use scanner::engine::{ScanEngine, ScanSession, SessionOptions};
pub use scanner::{ScanReport, ScanState};

pub type Result<T> = std::result::Result<T, ScanError>;
