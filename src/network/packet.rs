//! Probe packet crafting
//!
//! Fixed-format IPv4/IPv6 headers and SYN-only TCP / empty UDP headers. All
//! checksums go through [`checksum::checksum`](super::checksum::checksum), the
//! transport ones over a pseudo-header chosen by the address family of the
//! supplied addresses.

use super::checksum::checksum;
use super::{AddressFamily, TransportProtocol};
use crate::{ScanError, ScanResult};
use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ipv4::MutableIpv4Packet;
use pnet::packet::ipv6::MutableIpv6Packet;
use pnet::packet::tcp::{MutableTcpPacket, TcpFlags};
use pnet::packet::udp::MutableUdpPacket;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub const IPV4_HEADER_LEN: usize = 20;
pub const IPV6_HEADER_LEN: usize = 40;
pub const TCP_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;

const IPV4_PSEUDO_HEADER_LEN: usize = 12;
const IPV6_PSEUDO_HEADER_LEN: usize = 40;

/// Identification stamped on every IPv4 probe
pub const IPV4_IDENTIFICATION: u16 = 0xabcd;
/// TTL / hop limit of every probe
pub const DEFAULT_TTL: u8 = 64;
/// Advertised TCP window of a SYN probe
pub const TCP_WINDOW: u16 = 1024;

fn layout_error(what: &str) -> ScanError {
    ScanError::PacketError(format!("buffer too small for {} header", what))
}

/// Build a 20-byte IPv4 header with its checksum patched in.
pub fn ipv4_header(
    source: Ipv4Addr,
    destination: Ipv4Addr,
    protocol: TransportProtocol,
) -> ScanResult<[u8; IPV4_HEADER_LEN]> {
    let mut buf = [0u8; IPV4_HEADER_LEN];
    {
        let mut ip = MutableIpv4Packet::new(&mut buf).ok_or_else(|| layout_error("IPv4"))?;
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_dscp(0);
        ip.set_ecn(0);
        ip.set_total_length((IPV4_HEADER_LEN + protocol.header_len()) as u16);
        ip.set_identification(IPV4_IDENTIFICATION);
        ip.set_flags(0);
        ip.set_fragment_offset(0);
        ip.set_ttl(DEFAULT_TTL);
        ip.set_next_level_protocol(IpNextHeaderProtocol::new(protocol.number()));
        ip.set_checksum(0);
        ip.set_source(source);
        ip.set_destination(destination);
    }
    let sum = checksum(&buf);
    buf[10..12].copy_from_slice(&sum.to_be_bytes());
    Ok(buf)
}

/// Build a 40-byte IPv6 header. IPv6 carries no header checksum.
pub fn ipv6_header(
    source: Ipv6Addr,
    destination: Ipv6Addr,
    protocol: TransportProtocol,
) -> ScanResult<[u8; IPV6_HEADER_LEN]> {
    let mut buf = [0u8; IPV6_HEADER_LEN];
    {
        let mut ip = MutableIpv6Packet::new(&mut buf).ok_or_else(|| layout_error("IPv6"))?;
        ip.set_version(6);
        ip.set_traffic_class(0);
        ip.set_flow_label(0);
        // Extension headers are never emitted, so the payload is the transport header alone.
        ip.set_payload_length(protocol.header_len() as u16);
        ip.set_next_header(IpNextHeaderProtocol::new(protocol.number()));
        ip.set_hop_limit(DEFAULT_TTL);
        ip.set_source(source);
        ip.set_destination(destination);
    }
    Ok(buf)
}

/// Checksum pseudo-header for a transport segment of `length` bytes.
///
/// The layout follows the address family of `source`/`destination`:
/// 12 bytes for IPv4, 40 bytes for IPv6. Mixed families are rejected.
pub fn pseudo_header(
    source: IpAddr,
    destination: IpAddr,
    protocol: TransportProtocol,
    length: u16,
) -> ScanResult<Vec<u8>> {
    match (source, destination) {
        (IpAddr::V4(src), IpAddr::V4(dst)) => {
            let mut header = Vec::with_capacity(IPV4_PSEUDO_HEADER_LEN);
            header.extend_from_slice(&src.octets());
            header.extend_from_slice(&dst.octets());
            header.push(0);
            header.push(protocol.number());
            header.extend_from_slice(&length.to_be_bytes());
            Ok(header)
        }
        (IpAddr::V6(src), IpAddr::V6(dst)) => {
            let mut header = Vec::with_capacity(IPV6_PSEUDO_HEADER_LEN);
            header.extend_from_slice(&src.octets());
            header.extend_from_slice(&dst.octets());
            header.extend_from_slice(&u32::from(length).to_be_bytes());
            header.extend_from_slice(&[0, 0, 0]);
            header.push(protocol.number());
            Ok(header)
        }
        _ => Err(ScanError::AddressFamilyMismatch { src: source, dst: destination }),
    }
}

/// Checksum of `segment` (checksum field zeroed) behind its pseudo-header.
fn transport_checksum(
    source: IpAddr,
    destination: IpAddr,
    protocol: TransportProtocol,
    segment: &[u8],
) -> ScanResult<u16> {
    let mut data = pseudo_header(source, destination, protocol, segment.len() as u16)?;
    data.extend_from_slice(segment);
    Ok(checksum(&data))
}

/// Build a 20-byte TCP header with only SYN set.
pub fn tcp_header(
    source: IpAddr,
    destination: IpAddr,
    source_port: u16,
    destination_port: u16,
) -> ScanResult<[u8; TCP_HEADER_LEN]> {
    let mut buf = [0u8; TCP_HEADER_LEN];
    {
        let mut tcp = MutableTcpPacket::new(&mut buf).ok_or_else(|| layout_error("TCP"))?;
        tcp.set_source(source_port);
        tcp.set_destination(destination_port);
        tcp.set_sequence(0);
        tcp.set_acknowledgement(0);
        tcp.set_data_offset(5);
        tcp.set_reserved(0);
        tcp.set_flags(TcpFlags::SYN);
        tcp.set_window(TCP_WINDOW);
        tcp.set_checksum(0);
        tcp.set_urgent_ptr(0);
    }
    let sum = transport_checksum(source, destination, TransportProtocol::Tcp, &buf)?;
    buf[16..18].copy_from_slice(&sum.to_be_bytes());
    Ok(buf)
}

/// Build an 8-byte UDP header for a probe without payload.
pub fn udp_header(
    source: IpAddr,
    destination: IpAddr,
    source_port: u16,
    destination_port: u16,
) -> ScanResult<[u8; UDP_HEADER_LEN]> {
    let mut buf = [0u8; UDP_HEADER_LEN];
    {
        let mut udp = MutableUdpPacket::new(&mut buf).ok_or_else(|| layout_error("UDP"))?;
        udp.set_source(source_port);
        udp.set_destination(destination_port);
        udp.set_length(UDP_HEADER_LEN as u16);
        udp.set_checksum(0);
    }
    let sum = match transport_checksum(source, destination, TransportProtocol::Udp, &buf)? {
        // Zero means "no checksum" for UDP; send the equivalent all-ones value.
        0 => 0xFFFF,
        sum => sum,
    };
    buf[6..8].copy_from_slice(&sum.to_be_bytes());
    Ok(buf)
}

/// Composes IP and transport headers into complete probe packets for one
/// (source, destination, source port) triple.
#[derive(Debug, Clone, Copy)]
pub struct PacketBuilder {
    source: IpAddr,
    destination: IpAddr,
    source_port: u16,
}

impl PacketBuilder {
    pub fn new(source: IpAddr, destination: IpAddr, source_port: u16) -> ScanResult<Self> {
        if AddressFamily::of(&source) != AddressFamily::of(&destination) {
            return Err(ScanError::AddressFamilyMismatch { src: source, dst: destination });
        }
        Ok(Self {
            source,
            destination,
            source_port,
        })
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.destination)
    }

    /// Build the probe for `destination_port` over `protocol`.
    pub fn build(&self, destination_port: u16, protocol: TransportProtocol) -> ScanResult<Vec<u8>> {
        build_probe(
            self.source,
            self.destination,
            self.source_port,
            destination_port,
            protocol,
        )
    }
}

/// Build a complete IP + transport probe packet.
///
/// The IP layout follows the destination's address family, the transport
/// layout follows `protocol`.
pub fn build_probe(
    source: IpAddr,
    destination: IpAddr,
    source_port: u16,
    destination_port: u16,
    protocol: TransportProtocol,
) -> ScanResult<Vec<u8>> {
    let ip_header: Vec<u8> = match (source, destination) {
        (IpAddr::V4(src), IpAddr::V4(dst)) => ipv4_header(src, dst, protocol)?.to_vec(),
        (IpAddr::V6(src), IpAddr::V6(dst)) => ipv6_header(src, dst, protocol)?.to_vec(),
        _ => return Err(ScanError::AddressFamilyMismatch { src: source, dst: destination }),
    };

    let mut packet = Vec::with_capacity(ip_header.len() + protocol.header_len());
    packet.extend_from_slice(&ip_header);
    match protocol {
        TransportProtocol::Tcp => {
            packet.extend_from_slice(&tcp_header(source, destination, source_port, destination_port)?)
        }
        TransportProtocol::Udp => {
            packet.extend_from_slice(&udp_header(source, destination, source_port, destination_port)?)
        }
    }
    Ok(packet)
}
