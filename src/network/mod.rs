//! Network module for packet crafting, response capture and raw sockets

pub mod capture;
pub mod checksum;
pub mod interface;
pub mod packet;
pub mod socket;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// IP address family of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AddressFamily::V4 => "IPv4",
            AddressFamily::V6 => "IPv6",
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Transport protocol carried by a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Tcp,
    Udp,
}

impl TransportProtocol {
    /// IANA protocol number, used for the IPv4 protocol and IPv6 next-header fields
    pub fn number(&self) -> u8 {
        match self {
            TransportProtocol::Tcp => 6,
            TransportProtocol::Udp => 17,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Tcp => "tcp",
            TransportProtocol::Udp => "udp",
        }
    }

    /// Length of the header this scanner emits for the protocol
    pub fn header_len(&self) -> usize {
        match self {
            TransportProtocol::Tcp => packet::TCP_HEADER_LEN,
            TransportProtocol::Udp => packet::UDP_HEADER_LEN,
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current classification of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pending,
    Open,
    Closed,
    Filtered,
}

impl Verdict {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Verdict::Pending)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pending => write!(f, "pending"),
            Verdict::Open => write!(f, "open"),
            Verdict::Closed => write!(f, "closed"),
            Verdict::Filtered => write!(f, "filtered"),
        }
    }
}

/// One unit of scan work: a destination port over a transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortProbe {
    pub protocol: TransportProtocol,
    pub port: u16,
}

impl PortProbe {
    pub fn new(port: u16, protocol: TransportProtocol) -> Self {
        Self { protocol, port }
    }

    pub fn tcp(port: u16) -> Self {
        Self::new(port, TransportProtocol::Tcp)
    }

    pub fn udp(port: u16) -> Self {
        Self::new(port, TransportProtocol::Udp)
    }
}

impl fmt::Display for PortProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

/// Build the working set from the requested TCP and UDP port lists.
///
/// Duplicates collapse to a single probe; TCP probes come first.
pub fn build_probes(tcp_ports: &[u16], udp_ports: &[u16]) -> Vec<PortProbe> {
    let mut seen = std::collections::HashSet::new();
    tcp_ports
        .iter()
        .map(|&port| PortProbe::tcp(port))
        .chain(udp_ports.iter().map(|&port| PortProbe::udp(port)))
        .filter(|probe| seen.insert(*probe))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_numbers() {
        assert_eq!(TransportProtocol::Tcp.number(), 6);
        assert_eq!(TransportProtocol::Udp.number(), 17);
        assert_eq!(TransportProtocol::Tcp.header_len(), 20);
        assert_eq!(TransportProtocol::Udp.header_len(), 8);
    }

    #[test]
    fn test_build_probes_dedups_and_orders() {
        let probes = build_probes(&[80, 22, 80], &[53, 53]);
        assert_eq!(
            probes,
            vec![PortProbe::tcp(80), PortProbe::tcp(22), PortProbe::udp(53)]
        );
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::Open.to_string(), "open");
        assert_eq!(Verdict::Filtered.to_string(), "filtered");
        assert!(!Verdict::Pending.is_terminal());
        assert!(Verdict::Closed.is_terminal());
    }

    #[test]
    fn test_family_of() {
        assert_eq!(AddressFamily::of(&"10.0.0.1".parse().unwrap()), AddressFamily::V4);
        assert_eq!(AddressFamily::of(&"::1".parse().unwrap()), AddressFamily::V6);
    }
}
