//! Response capture and classification
//!
//! Raw receive sockets hand over whatever the kernel delivers: on some
//! platforms the IP header comes first, on others only the transport or ICMP
//! header does. Every datagram is therefore parsed in two modes, transport
//! first and then behind an IP header.

use super::packet::{IPV4_HEADER_LEN, IPV6_HEADER_LEN};
use super::{AddressFamily, PortProbe, TransportProtocol, Verdict};
use crate::scanner::ScanState;
use log::{debug, trace, warn};
use pnet::packet::icmp::IcmpPacket;
use pnet::packet::icmpv6::Icmpv6Packet;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use std::fmt;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const TCP_FLAGS_SYN_ACK: u8 = 0x12;
pub const TCP_FLAGS_RST: u8 = 0x04;
pub const TCP_FLAGS_RST_ACK: u8 = 0x14;

pub const ICMPV4_DEST_UNREACHABLE: u8 = 3;
pub const ICMPV4_PORT_UNREACHABLE: u8 = 3;
pub const ICMPV6_DEST_UNREACHABLE: u8 = 1;
pub const ICMPV6_PORT_UNREACHABLE: u8 = 4;

/// Type, code, checksum and the unused word preceding the quoted packet
const ICMP_ERROR_HEADER_LEN: usize = 8;

/// Pause after a hard receive error before polling the socket again
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// The raw socket a datagram was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listener {
    Ipv4Tcp,
    Ipv6Tcp,
    Icmpv4,
    Icmpv6,
}

impl Listener {
    /// Listeners needed to observe replies from a destination of `family`
    pub fn for_family(family: AddressFamily) -> [Listener; 2] {
        match family {
            AddressFamily::V4 => [Listener::Ipv4Tcp, Listener::Icmpv4],
            AddressFamily::V6 => [Listener::Ipv6Tcp, Listener::Icmpv6],
        }
    }

    pub fn family(&self) -> AddressFamily {
        match self {
            Listener::Ipv4Tcp | Listener::Icmpv4 => AddressFamily::V4,
            Listener::Ipv6Tcp | Listener::Icmpv6 => AddressFamily::V6,
        }
    }

    pub fn is_icmp(&self) -> bool {
        matches!(self, Listener::Icmpv4 | Listener::Icmpv6)
    }
}

impl fmt::Display for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Listener::Ipv4Tcp => "raw IPv4/TCP",
            Listener::Ipv6Tcp => "raw IPv6/TCP",
            Listener::Icmpv4 => "raw ICMP",
            Listener::Icmpv6 => "raw ICMPv6",
        };
        f.write_str(name)
    }
}

/// One inbound datagram as read from a raw socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub bytes: Vec<u8>,
    /// Sender reported by the socket, when it reported one
    pub from: Option<IpAddr>,
}

impl Datagram {
    pub fn new(bytes: Vec<u8>, from: Option<IpAddr>) -> Self {
        Self { bytes, from }
    }
}

/// Kind of header found at the transport offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseProtocol {
    Tcp,
    Icmpv4,
    Icmpv6,
}

/// Fields extracted from one inbound datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Source address from the IP header, when one was present
    pub source_ip: Option<IpAddr>,
    pub protocol: ResponseProtocol,
    pub source_port: Option<u16>,
    pub destination_port: Option<u16>,
    pub tcp_flags: Option<u8>,
    pub icmp_type: Option<u8>,
    pub icmp_code: Option<u8>,
    pub embedded_protocol: Option<u8>,
    /// Destination address of the quoted packet
    pub embedded_destination: Option<IpAddr>,
    pub embedded_source_port: Option<u16>,
    pub embedded_dest_port: Option<u16>,
}

impl ParsedResponse {
    fn new(protocol: ResponseProtocol, source_ip: Option<IpAddr>) -> Self {
        Self {
            source_ip,
            protocol,
            source_port: None,
            destination_port: None,
            tcp_flags: None,
            icmp_type: None,
            icmp_code: None,
            embedded_protocol: None,
            embedded_destination: None,
            embedded_source_port: None,
            embedded_dest_port: None,
        }
    }
}

fn be16(bytes: &[u8], offset: usize) -> Option<u16> {
    bytes
        .get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
}

fn version_nibble(bytes: &[u8]) -> Option<u8> {
    bytes.first().map(|b| b >> 4)
}

/// Length and source address of a leading IPv4 header, if there is one.
fn ipv4_prefix(bytes: &[u8]) -> Option<(usize, IpAddr)> {
    if version_nibble(bytes)? != 4 {
        return None;
    }
    let ip = Ipv4Packet::new(bytes)?;
    let header_len = usize::from(ip.get_header_length()) * 4;
    if header_len < IPV4_HEADER_LEN || header_len > bytes.len() {
        return None;
    }
    Some((header_len, IpAddr::V4(ip.get_source())))
}

fn ipv6_prefix(bytes: &[u8]) -> Option<(usize, IpAddr)> {
    if version_nibble(bytes)? != 6 {
        return None;
    }
    let ip = Ipv6Packet::new(bytes)?;
    Some((IPV6_HEADER_LEN, IpAddr::V6(ip.get_source())))
}

/// Offset of the TCP header and the source address found on the way.
///
/// Transport-first: when bytes 2..4 already carry the session port as a TCP
/// destination port, the datagram starts with the TCP header.
fn tcp_offset(
    family: AddressFamily,
    bytes: &[u8],
    session_port: u16,
) -> Option<(usize, Option<IpAddr>)> {
    if be16(bytes, 2) == Some(session_port) {
        return Some((0, None));
    }
    let (offset, source) = match family {
        AddressFamily::V4 => ipv4_prefix(bytes)?,
        AddressFamily::V6 => ipv6_prefix(bytes)?,
    };
    Some((offset, Some(source)))
}

/// ICMP listeners cannot use the port heuristic; an ICMP error type never
/// carries an IP version nibble, so the first byte decides.
fn icmp_offset(family: AddressFamily, bytes: &[u8]) -> (usize, Option<IpAddr>) {
    let prefix = match family {
        AddressFamily::V4 => ipv4_prefix(bytes),
        AddressFamily::V6 => ipv6_prefix(bytes),
    };
    match prefix {
        Some((offset, source)) => (offset, Some(source)),
        None => (0, None),
    }
}

fn parse_tcp(bytes: &[u8], source_ip: Option<IpAddr>) -> Option<ParsedResponse> {
    let tcp = TcpPacket::new(bytes)?;
    let mut parsed = ParsedResponse::new(ResponseProtocol::Tcp, source_ip);
    parsed.source_port = Some(tcp.get_source());
    parsed.destination_port = Some(tcp.get_destination());
    // Byte 13 holds the eight classic flag bits.
    parsed.tcp_flags = bytes.get(13).copied();
    Some(parsed)
}

/// Protocol and ports of the original packet quoted in an ICMP error.
fn embedded_ports(
    header_len: usize,
    protocol: u8,
    quoted: &[u8],
    parsed: &mut ParsedResponse,
) {
    parsed.embedded_protocol = Some(protocol);
    parsed.embedded_source_port = be16(quoted, header_len);
    parsed.embedded_dest_port = be16(quoted, header_len + 2);
}

fn parse_icmpv4(bytes: &[u8], source_ip: Option<IpAddr>) -> Option<ParsedResponse> {
    let icmp = IcmpPacket::new(bytes)?;
    let mut parsed = ParsedResponse::new(ResponseProtocol::Icmpv4, source_ip);
    parsed.icmp_type = Some(icmp.get_icmp_type().0);
    parsed.icmp_code = Some(icmp.get_icmp_code().0);

    if parsed.icmp_type == Some(ICMPV4_DEST_UNREACHABLE) {
        let quoted = bytes.get(ICMP_ERROR_HEADER_LEN..)?;
        let inner = Ipv4Packet::new(quoted)?;
        let header_len = usize::from(inner.get_header_length()) * 4;
        if header_len < IPV4_HEADER_LEN {
            return None;
        }
        parsed.embedded_destination = Some(IpAddr::V4(inner.get_destination()));
        embedded_ports(header_len, inner.get_next_level_protocol().0, quoted, &mut parsed);
    }
    Some(parsed)
}

fn parse_icmpv6(bytes: &[u8], source_ip: Option<IpAddr>) -> Option<ParsedResponse> {
    let icmp = Icmpv6Packet::new(bytes)?;
    let mut parsed = ParsedResponse::new(ResponseProtocol::Icmpv6, source_ip);
    parsed.icmp_type = Some(icmp.get_icmpv6_type().0);
    parsed.icmp_code = Some(icmp.get_icmpv6_code().0);

    if parsed.icmp_type == Some(ICMPV6_DEST_UNREACHABLE) {
        let quoted = bytes.get(ICMP_ERROR_HEADER_LEN..)?;
        let inner = Ipv6Packet::new(quoted)?;
        parsed.embedded_destination = Some(IpAddr::V6(inner.get_destination()));
        embedded_ports(IPV6_HEADER_LEN, inner.get_next_header().0, quoted, &mut parsed);
    }
    Some(parsed)
}

/// Parse a datagram read from `listener`.
///
/// Returns `None` for truncated or unrecognisable input.
pub fn parse_datagram(listener: Listener, bytes: &[u8], session_port: u16) -> Option<ParsedResponse> {
    let family = listener.family();
    match listener {
        Listener::Ipv4Tcp | Listener::Ipv6Tcp => {
            let (offset, source) = tcp_offset(family, bytes, session_port)?;
            parse_tcp(bytes.get(offset..)?, source)
        }
        Listener::Icmpv4 => {
            let (offset, source) = icmp_offset(family, bytes);
            parse_icmpv4(bytes.get(offset..)?, source)
        }
        Listener::Icmpv6 => {
            let (offset, source) = icmp_offset(family, bytes);
            parse_icmpv6(bytes.get(offset..)?, source)
        }
    }
}

/// Map a parsed response onto the probe it answers and that probe's verdict.
pub fn classify(parsed: &ParsedResponse, session_port: u16) -> Option<(PortProbe, Verdict)> {
    match parsed.protocol {
        ResponseProtocol::Tcp => {
            if parsed.destination_port? != session_port {
                return None;
            }
            let verdict = match parsed.tcp_flags? {
                TCP_FLAGS_SYN_ACK => Verdict::Open,
                TCP_FLAGS_RST | TCP_FLAGS_RST_ACK => Verdict::Closed,
                _ => return None,
            };
            Some((PortProbe::tcp(parsed.source_port?), verdict))
        }
        ResponseProtocol::Icmpv4 | ResponseProtocol::Icmpv6 => {
            let (unreachable, port_unreachable) = if parsed.protocol == ResponseProtocol::Icmpv4 {
                (ICMPV4_DEST_UNREACHABLE, ICMPV4_PORT_UNREACHABLE)
            } else {
                (ICMPV6_DEST_UNREACHABLE, ICMPV6_PORT_UNREACHABLE)
            };
            if parsed.icmp_type? != unreachable || parsed.icmp_code? != port_unreachable {
                return None;
            }
            if parsed.embedded_protocol? != TransportProtocol::Udp.number()
                || parsed.embedded_source_port? != session_port
            {
                return None;
            }
            Some((PortProbe::udp(parsed.embedded_dest_port?), Verdict::Closed))
        }
    }
}

/// Applies classified responses to the session's [`ScanState`]
#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    state: Arc<ScanState>,
    target: IpAddr,
    session_port: u16,
}

impl ResponseClassifier {
    pub fn new(state: Arc<ScanState>, target: IpAddr, session_port: u16) -> Self {
        Self {
            state,
            target,
            session_port,
        }
    }

    pub fn state(&self) -> &Arc<ScanState> {
        &self.state
    }

    /// Known sender addresses, and the quoted destination of an ICMP error,
    /// must all be the target.
    fn from_target(&self, datagram: &Datagram, parsed: &ParsedResponse) -> bool {
        [datagram.from, parsed.source_ip, parsed.embedded_destination]
            .into_iter()
            .flatten()
            .all(|address| address == self.target)
    }

    /// Classify one datagram.
    ///
    /// Returns the probe and verdict only when this datagram moved the probe
    /// out of Pending; duplicates and unrelated traffic return `None`.
    pub fn handle(&self, listener: Listener, datagram: &Datagram) -> Option<(PortProbe, Verdict)> {
        let Some(parsed) = parse_datagram(listener, &datagram.bytes, self.session_port) else {
            trace!("{}: discarding {}-byte datagram", listener, datagram.bytes.len());
            return None;
        };
        if !self.from_target(datagram, &parsed) {
            trace!("{}: ignoring datagram from {:?}", listener, datagram.from.or(parsed.source_ip));
            return None;
        }
        let (probe, verdict) = classify(&parsed, self.session_port)?;
        if self.state.resolve(probe, verdict) {
            debug!("{} {} {}", self.target, probe, verdict);
            Some((probe, verdict))
        } else {
            None
        }
    }
}

/// Source of raw datagrams for one listener
pub trait DatagramSource: Send {
    fn listener(&self) -> Listener;

    /// Next datagram, or `None` when the poll interval elapsed without one.
    fn recv_datagram(&mut self) -> io::Result<Option<Datagram>>;
}

fn is_transient(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Drain `source` into `classifier` until `cancel` fires.
///
/// Blocking; run it on a blocking thread. Returns the number of datagrams
/// read.
pub fn receive_loop(
    source: &mut dyn DatagramSource,
    classifier: &ResponseClassifier,
    cancel: &CancellationToken,
) -> usize {
    let listener = source.listener();
    let mut received = 0;
    while !cancel.is_cancelled() {
        match source.recv_datagram() {
            Ok(Some(datagram)) => {
                received += 1;
                classifier.handle(listener, &datagram);
            }
            Ok(None) => {}
            Err(e) if is_transient(e.kind()) => {}
            Err(e) => {
                warn!("{} receive failed: {}", listener, e);
                std::thread::sleep(RECV_ERROR_BACKOFF);
            }
        }
    }
    debug!("{} listener stopped after {} datagrams", listener, received);
    received
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::packet::build_probe;
    use std::net::Ipv4Addr;

    const SESSION_PORT: u16 = 40000;

    fn target_v4() -> IpAddr {
        "192.0.2.10".parse().unwrap()
    }

    fn scanner_v4() -> IpAddr {
        "192.0.2.1".parse().unwrap()
    }

    fn tcp_reply(sport: u16, flags: u8) -> Vec<u8> {
        let mut tcp = vec![0u8; 20];
        tcp[0..2].copy_from_slice(&sport.to_be_bytes());
        tcp[2..4].copy_from_slice(&SESSION_PORT.to_be_bytes());
        tcp[12] = 0x50;
        tcp[13] = flags;
        tcp
    }

    fn with_ipv4_header(source: Ipv4Addr, protocol: u8, payload: &[u8]) -> Vec<u8> {
        let mut ip = vec![0u8; 20];
        ip[0] = 0x45;
        ip[2..4].copy_from_slice(&((20 + payload.len()) as u16).to_be_bytes());
        ip[8] = 64;
        ip[9] = protocol;
        ip[12..16].copy_from_slice(&source.octets());
        ip.extend_from_slice(payload);
        ip
    }

    fn icmpv4_port_unreachable(quoted: &[u8]) -> Vec<u8> {
        let mut icmp = vec![ICMPV4_DEST_UNREACHABLE, ICMPV4_PORT_UNREACHABLE, 0, 0, 0, 0, 0, 0];
        icmp.extend_from_slice(quoted);
        icmp
    }

    fn classifier_with(probes: &[PortProbe], target: IpAddr) -> ResponseClassifier {
        let state = Arc::new(ScanState::new());
        for probe in probes {
            state.mark_pending(*probe);
        }
        ResponseClassifier::new(state, target, SESSION_PORT)
    }

    #[test]
    fn test_syn_ack_marks_open() {
        let classifier = classifier_with(&[PortProbe::tcp(443)], target_v4());
        let datagram = Datagram::new(tcp_reply(443, TCP_FLAGS_SYN_ACK), None);

        assert_eq!(
            classifier.handle(Listener::Ipv4Tcp, &datagram),
            Some((PortProbe::tcp(443), Verdict::Open))
        );
        assert_eq!(classifier.state().verdict(&PortProbe::tcp(443)), Some(Verdict::Open));
    }

    #[test]
    fn test_rst_marks_closed() {
        let classifier = classifier_with(&[PortProbe::tcp(443), PortProbe::tcp(8080)], target_v4());
        classifier.handle(Listener::Ipv4Tcp, &Datagram::new(tcp_reply(443, TCP_FLAGS_RST), None));
        classifier.handle(
            Listener::Ipv4Tcp,
            &Datagram::new(tcp_reply(8080, TCP_FLAGS_RST_ACK), None),
        );

        assert_eq!(classifier.state().verdict(&PortProbe::tcp(443)), Some(Verdict::Closed));
        assert_eq!(classifier.state().verdict(&PortProbe::tcp(8080)), Some(Verdict::Closed));
    }

    #[test]
    fn test_duplicate_syn_ack_is_idempotent() {
        let classifier = classifier_with(&[PortProbe::tcp(443)], target_v4());
        let datagram = Datagram::new(tcp_reply(443, TCP_FLAGS_SYN_ACK), None);

        assert!(classifier.handle(Listener::Ipv4Tcp, &datagram).is_some());
        assert!(classifier.handle(Listener::Ipv4Tcp, &datagram).is_none());
        let rst = Datagram::new(tcp_reply(443, TCP_FLAGS_RST), None);
        assert!(classifier.handle(Listener::Ipv4Tcp, &rst).is_none());
        assert_eq!(classifier.state().verdict(&PortProbe::tcp(443)), Some(Verdict::Open));
    }

    #[test]
    fn test_tcp_behind_ipv4_header() {
        let classifier = classifier_with(&[PortProbe::tcp(22)], target_v4());
        let IpAddr::V4(source) = target_v4() else { unreachable!() };
        let bytes = with_ipv4_header(source, 6, &tcp_reply(22, TCP_FLAGS_SYN_ACK));

        let parsed = parse_datagram(Listener::Ipv4Tcp, &bytes, SESSION_PORT).unwrap();
        assert_eq!(parsed.source_ip, Some(target_v4()));
        assert_eq!(parsed.source_port, Some(22));

        classifier.handle(Listener::Ipv4Tcp, &Datagram::new(bytes, Some(target_v4())));
        assert_eq!(classifier.state().verdict(&PortProbe::tcp(22)), Some(Verdict::Open));
    }

    #[test]
    fn test_tcp_for_another_session_is_ignored() {
        let classifier = classifier_with(&[PortProbe::tcp(22)], target_v4());
        let mut reply = tcp_reply(22, TCP_FLAGS_SYN_ACK);
        reply[2..4].copy_from_slice(&(SESSION_PORT + 1).to_be_bytes());

        assert!(classifier.handle(Listener::Ipv4Tcp, &Datagram::new(reply, None)).is_none());
        assert_eq!(classifier.state().verdict(&PortProbe::tcp(22)), Some(Verdict::Pending));
    }

    #[test]
    fn test_other_flags_are_ignored() {
        let classifier = classifier_with(&[PortProbe::tcp(22)], target_v4());
        let ack = Datagram::new(tcp_reply(22, 0x10), None);
        assert!(classifier.handle(Listener::Ipv4Tcp, &ack).is_none());
    }

    #[test]
    fn test_foreign_source_is_ignored() {
        let classifier = classifier_with(&[PortProbe::tcp(22)], target_v4());
        let datagram = Datagram::new(tcp_reply(22, TCP_FLAGS_SYN_ACK), Some("198.51.100.7".parse().unwrap()));
        assert!(classifier.handle(Listener::Ipv4Tcp, &datagram).is_none());
    }

    #[test]
    fn test_icmpv4_port_unreachable_marks_udp_closed() {
        let classifier = classifier_with(&[PortProbe::udp(53)], target_v4());
        let quoted = build_probe(scanner_v4(), target_v4(), SESSION_PORT, 53, TransportProtocol::Udp)
            .unwrap();
        let IpAddr::V4(source) = target_v4() else { unreachable!() };
        let bytes = with_ipv4_header(source, 1, &icmpv4_port_unreachable(&quoted));

        let parsed = parse_datagram(Listener::Icmpv4, &bytes, SESSION_PORT).unwrap();
        assert_eq!(parsed.embedded_protocol, Some(17));
        assert_eq!(parsed.embedded_source_port, Some(SESSION_PORT));
        assert_eq!(parsed.embedded_dest_port, Some(53));

        assert_eq!(
            classifier.handle(Listener::Icmpv4, &Datagram::new(bytes, Some(target_v4()))),
            Some((PortProbe::udp(53), Verdict::Closed))
        );
    }

    #[test]
    fn test_icmpv4_quoting_other_source_port_is_ignored() {
        let classifier = classifier_with(&[PortProbe::udp(53)], target_v4());
        let quoted = build_probe(scanner_v4(), target_v4(), 51111, 53, TransportProtocol::Udp).unwrap();
        let IpAddr::V4(source) = target_v4() else { unreachable!() };
        let bytes = with_ipv4_header(source, 1, &icmpv4_port_unreachable(&quoted));

        assert!(classifier.handle(Listener::Icmpv4, &Datagram::new(bytes, Some(target_v4()))).is_none());
        assert_eq!(classifier.state().verdict(&PortProbe::udp(53)), Some(Verdict::Pending));
    }

    #[test]
    fn test_icmpv4_quoting_other_destination_is_ignored() {
        let classifier = classifier_with(&[PortProbe::udp(53)], target_v4());
        let elsewhere: IpAddr = "198.51.100.7".parse().unwrap();
        let quoted = build_probe(scanner_v4(), elsewhere, SESSION_PORT, 53, TransportProtocol::Udp).unwrap();
        let datagram = Datagram::new(icmpv4_port_unreachable(&quoted), Some(target_v4()));

        let parsed = parse_datagram(Listener::Icmpv4, &datagram.bytes, SESSION_PORT).unwrap();
        assert_eq!(parsed.embedded_destination, Some(elsewhere));
        assert!(classifier.handle(Listener::Icmpv4, &datagram).is_none());
        assert_eq!(classifier.state().verdict(&PortProbe::udp(53)), Some(Verdict::Pending));
    }

    #[test]
    fn test_icmpv4_without_ip_header() {
        let classifier = classifier_with(&[PortProbe::udp(161)], target_v4());
        let quoted = build_probe(scanner_v4(), target_v4(), SESSION_PORT, 161, TransportProtocol::Udp)
            .unwrap();
        let datagram = Datagram::new(icmpv4_port_unreachable(&quoted), None);

        classifier.handle(Listener::Icmpv4, &datagram);
        assert_eq!(classifier.state().verdict(&PortProbe::udp(161)), Some(Verdict::Closed));
    }

    #[test]
    fn test_icmpv4_quoting_tcp_is_ignored() {
        let classifier = classifier_with(&[PortProbe::udp(80), PortProbe::tcp(80)], target_v4());
        let quoted = build_probe(scanner_v4(), target_v4(), SESSION_PORT, 80, TransportProtocol::Tcp)
            .unwrap();
        let datagram = Datagram::new(icmpv4_port_unreachable(&quoted), None);

        assert!(classifier.handle(Listener::Icmpv4, &datagram).is_none());
        assert_eq!(classifier.state().pending(None).len(), 2);
    }

    #[test]
    fn test_icmpv6_port_unreachable_marks_udp_closed() {
        let scanner: IpAddr = "2001:db8::1".parse().unwrap();
        let target: IpAddr = "2001:db8::2".parse().unwrap();
        let classifier = classifier_with(&[PortProbe::udp(5353)], target);

        let quoted = build_probe(scanner, target, SESSION_PORT, 5353, TransportProtocol::Udp).unwrap();
        let mut icmp = vec![ICMPV6_DEST_UNREACHABLE, ICMPV6_PORT_UNREACHABLE, 0, 0, 0, 0, 0, 0];
        icmp.extend_from_slice(&quoted);

        assert_eq!(
            classifier.handle(Listener::Icmpv6, &Datagram::new(icmp, Some(target))),
            Some((PortProbe::udp(5353), Verdict::Closed))
        );
    }

    #[test]
    fn test_echo_reply_is_ignored() {
        let classifier = classifier_with(&[PortProbe::udp(53)], target_v4());
        let datagram = Datagram::new(vec![0, 0, 0, 0, 0, 1, 0, 1], None);
        assert!(classifier.handle(Listener::Icmpv4, &datagram).is_none());
    }

    #[test]
    fn test_truncated_datagrams_are_discarded() {
        assert!(parse_datagram(Listener::Ipv4Tcp, &[0x45, 0x00], SESSION_PORT).is_none());
        assert!(parse_datagram(Listener::Ipv6Tcp, &[], SESSION_PORT).is_none());

        // Port unreachable quoting fewer bytes than an IPv4 header
        let short = icmpv4_port_unreachable(&[0x45, 0, 0, 28]);
        assert!(parse_datagram(Listener::Icmpv4, &short, SESSION_PORT).is_none());
    }

    #[test]
    fn test_listener_family() {
        assert_eq!(Listener::for_family(AddressFamily::V6), [Listener::Ipv6Tcp, Listener::Icmpv6]);
        assert_eq!(Listener::Icmpv4.family(), AddressFamily::V4);
        assert!(Listener::Icmpv6.is_icmp());
        assert!(!Listener::Ipv4Tcp.is_icmp());
    }
}
