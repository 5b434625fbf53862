//! Network interface lookup

use super::AddressFamily;
use crate::{ScanError, ScanResult};
use pnet::datalink;
use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, SocketAddrV6};

/// Address of the chosen interface that probes are sent from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub ip: IpAddr,
    /// Interface index, needed to bind IPv6 link-local addresses
    pub scope_id: u32,
}

impl InterfaceAddress {
    pub fn new(ip: IpAddr, scope_id: u32) -> Self {
        Self { ip, scope_id }
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.ip)
    }

    pub fn socket_addr(&self, port: u16) -> SocketAddr {
        match self.ip {
            IpAddr::V4(_) => SocketAddr::new(self.ip, port),
            IpAddr::V6(v6) => {
                let scope_id = if is_link_local(&v6) { self.scope_id } else { 0 };
                SocketAddr::V6(SocketAddrV6::new(v6, port, 0, scope_id))
            }
        }
    }
}

/// Snapshot of one interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub index: u32,
    pub is_up: bool,
    pub is_loopback: bool,
    pub addresses: Vec<IpAddr>,
}

impl From<datalink::NetworkInterface> for InterfaceInfo {
    fn from(iface: datalink::NetworkInterface) -> Self {
        Self {
            is_up: iface.is_up(),
            is_loopback: iface.is_loopback(),
            addresses: iface.ips.iter().map(|network| network.ip()).collect(),
            name: iface.name,
            index: iface.index,
        }
    }
}

impl InterfaceInfo {
    /// Best source address of `family`: global IPv6 addresses win over
    /// link-local ones.
    pub fn source_address(&self, family: AddressFamily) -> Option<InterfaceAddress> {
        let mut candidates = self
            .addresses
            .iter()
            .filter(|addr| AddressFamily::of(addr) == family);
        let chosen = match family {
            AddressFamily::V4 => candidates.next().copied(),
            AddressFamily::V6 => {
                let all: Vec<IpAddr> = candidates.copied().collect();
                all.iter()
                    .find(|addr| !matches!(addr, IpAddr::V6(v6) if is_link_local(v6)))
                    .or_else(|| all.first())
                    .copied()
            }
        };
        chosen.map(|ip| InterfaceAddress::new(ip, self.index))
    }
}

impl fmt::Display for InterfaceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = Vec::new();
        if self.is_up {
            flags.push("UP");
        }
        if self.is_loopback {
            flags.push("LOOPBACK");
        }
        write!(f, "{} <{}>", self.name, flags.join(","))?;
        for addr in &self.addresses {
            write!(f, "\n    {}", addr)?;
        }
        Ok(())
    }
}

fn is_link_local(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

/// All interfaces known to the system.
pub fn list_interfaces() -> Vec<InterfaceInfo> {
    datalink::interfaces().into_iter().map(InterfaceInfo::from).collect()
}

/// Resolve the source address of `family` on the interface called `name`.
pub fn source_address(name: &str, family: AddressFamily) -> ScanResult<InterfaceAddress> {
    let iface = list_interfaces()
        .into_iter()
        .find(|iface| iface.name == name)
        .ok_or_else(|| ScanError::InterfaceNotFound(name.to_string()))?;
    select_source(&iface, family)
}

/// Source address of `family` on `iface`, or the error naming what is missing.
pub fn select_source(iface: &InterfaceInfo, family: AddressFamily) -> ScanResult<InterfaceAddress> {
    iface
        .source_address(family)
        .ok_or_else(|| ScanError::NoSourceAddress {
            interface: iface.name.clone(),
            family,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth0() -> InterfaceInfo {
        InterfaceInfo {
            name: "eth0".into(),
            index: 2,
            is_up: true,
            is_loopback: false,
            addresses: vec![
                "fe80::1".parse().unwrap(),
                "192.168.1.20".parse().unwrap(),
                "2001:db8::20".parse().unwrap(),
            ],
        }
    }

    #[test]
    fn test_prefers_global_ipv6() {
        let addr = eth0().source_address(AddressFamily::V6).unwrap();
        assert_eq!(addr.ip, "2001:db8::20".parse::<IpAddr>().unwrap());
        assert_eq!(addr.socket_addr(0).to_string(), "[2001:db8::20]:0");
    }

    #[test]
    fn test_link_local_keeps_scope() {
        let mut iface = eth0();
        iface.addresses.retain(|a| a.to_string() == "fe80::1");
        let addr = iface.source_address(AddressFamily::V6).unwrap();
        match addr.socket_addr(0) {
            SocketAddr::V6(v6) => assert_eq!(v6.scope_id(), 2),
            other => panic!("unexpected {}", other),
        }
    }

    #[test]
    fn test_ipv4_source() {
        let addr = select_source(&eth0(), AddressFamily::V4).unwrap();
        assert_eq!(addr.ip, "192.168.1.20".parse::<IpAddr>().unwrap());
        assert_eq!(addr.family(), AddressFamily::V4);
    }

    #[test]
    fn test_missing_family() {
        let mut iface = eth0();
        iface.addresses.retain(|a| a.is_ipv4());
        match select_source(&iface, AddressFamily::V6) {
            Err(ScanError::NoSourceAddress { interface, family }) => {
                assert_eq!(interface, "eth0");
                assert_eq!(family, AddressFamily::V6);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_interface() {
        assert!(matches!(
            source_address("no-such-interface0", AddressFamily::V4),
            Err(ScanError::InterfaceNotFound(_))
        ));
    }

    #[test]
    fn test_display() {
        let text = eth0().to_string();
        assert!(text.starts_with("eth0 <UP>"));
        assert!(text.contains("192.168.1.20"));
    }
}
