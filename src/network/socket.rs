//! Raw socket ownership
//!
//! A session owns exactly one [`RawSender`] and one [`RawListener`] per
//! listener kind of the destination's family. Dropping them closes the
//! descriptors, so release follows the session on every exit path.

use super::capture::{Datagram, DatagramSource, Listener};
use super::interface::InterfaceAddress;
use super::AddressFamily;
use crate::{ScanError, ScanResult};
use log::debug;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::SocketAddr;
use std::time::Duration;

/// Largest datagram a listener reads in one call
const RECV_BUFFER_LEN: usize = 65_535;

/// Kernel receive buffer requested for listeners
const RECV_SOCKET_BUFFER: usize = 1 << 20;

/// Transmits fully built probe packets
pub trait ProbeSender: Send + Sync {
    /// Send `packet` towards `destination`; the packet already carries the
    /// IP header.
    fn send_probe(&self, packet: &[u8], destination: SocketAddr) -> io::Result<usize>;
}

/// Domain and protocol of the send socket for `family`.
///
/// IPPROTO_RAW sockets only transmit: the kernel never queues inbound
/// traffic on them, and they imply a caller-built IP header.
fn send_endpoint(family: AddressFamily) -> (Domain, Protocol) {
    let domain = match family {
        AddressFamily::V4 => Domain::IPV4,
        AddressFamily::V6 => Domain::IPV6,
    };
    (domain, Protocol::from(libc::IPPROTO_RAW))
}

/// Domain and protocol of the receive socket for `listener`
fn listen_endpoint(listener: Listener) -> (Domain, Protocol) {
    match listener {
        Listener::Ipv4Tcp => (Domain::IPV4, Protocol::TCP),
        Listener::Ipv6Tcp => (Domain::IPV6, Protocol::TCP),
        Listener::Icmpv4 => (Domain::IPV4, Protocol::ICMPV4),
        Listener::Icmpv6 => (Domain::IPV6, Protocol::ICMPV6),
    }
}

/// Raw send socket with a caller-supplied IP header
pub struct RawSender {
    socket: Socket,
    family: AddressFamily,
}

impl RawSender {
    /// Open a send-only raw socket bound to `source`.
    pub fn open(source: &InterfaceAddress) -> ScanResult<Self> {
        let family = source.family();
        let context = format!("raw {} send socket", family);
        let (domain, protocol) = send_endpoint(family);
        let socket = Socket::new(domain, Type::from(libc::SOCK_RAW), Some(protocol))
            .map_err(|e| ScanError::from_socket(&context, e))?;
        if family == AddressFamily::V4 {
            socket
                .set_header_included(true)
                .map_err(|e| ScanError::from_socket("IP_HDRINCL", e))?;
        }
        socket
            .bind(&SockAddr::from(source.socket_addr(0)))
            .map_err(|e| ScanError::from_socket(&format!("bind {}", source.ip), e))?;
        debug!("opened {} on {}", context, source.ip);

        Ok(Self { socket, family })
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }
}

impl ProbeSender for RawSender {
    fn send_probe(&self, packet: &[u8], destination: SocketAddr) -> io::Result<usize> {
        let mut destination = destination;
        // Linux rejects a nonzero port on IPPROTO_RAW IPv6 sockets.
        if self.family == AddressFamily::V6 {
            destination.set_port(0);
        }
        self.socket.send_to(packet, &SockAddr::from(destination))
    }
}

/// Raw receive socket for one [`Listener`] kind
pub struct RawListener {
    socket: Socket,
    listener: Listener,
    buffer: Vec<MaybeUninit<u8>>,
}

impl RawListener {
    /// Open the socket for `listener`, bound to the session's source address.
    ///
    /// Reads give up after `poll_interval` so the receive loop can observe
    /// cancellation.
    pub fn open(listener: Listener, source: &InterfaceAddress, poll_interval: Duration) -> ScanResult<Self> {
        let (domain, protocol) = listen_endpoint(listener);
        if listener.family() != source.family() {
            return Err(ScanError::RawSocketError(format!(
                "{} listener cannot bind {}",
                listener, source.ip
            )));
        }

        let context = listener.to_string();
        let socket =
            Socket::new(domain, Type::from(libc::SOCK_RAW), Some(protocol)).map_err(|e| ScanError::from_socket(&context, e))?;
        socket
            .set_read_timeout(Some(poll_interval))
            .map_err(|e| ScanError::from_socket(&context, e))?;
        if let Err(e) = socket.set_recv_buffer_size(RECV_SOCKET_BUFFER) {
            debug!("{}: keeping default receive buffer: {}", listener, e);
        }
        socket
            .bind(&SockAddr::from(source.socket_addr(0)))
            .map_err(|e| ScanError::from_socket(&format!("bind {} to {}", listener, source.ip), e))?;
        debug!("opened {} listener on {}", listener, source.ip);

        Ok(Self {
            socket,
            listener,
            buffer: vec![MaybeUninit::new(0u8); RECV_BUFFER_LEN],
        })
    }
}

impl DatagramSource for RawListener {
    fn listener(&self) -> Listener {
        self.listener
    }

    fn recv_datagram(&mut self) -> io::Result<Option<Datagram>> {
        match self.socket.recv_from(&mut self.buffer) {
            Ok((size, addr)) => {
                let bytes = self.buffer[..size]
                    .iter()
                    // SAFETY: every element was initialised when the buffer was allocated.
                    .map(|b| unsafe { b.assume_init() })
                    .collect();
                let from = addr.as_socket().map(|a| a.ip());
                Ok(Some(Datagram::new(bytes, from)))
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Open every listener needed for a destination of `source`'s family.
pub fn open_listeners(source: &InterfaceAddress, poll_interval: Duration) -> ScanResult<Vec<Box<dyn DatagramSource>>> {
    Listener::for_family(source.family())
        .into_iter()
        .map(|listener| {
            RawListener::open(listener, source, poll_interval).map(|l| Box::new(l) as Box<dyn DatagramSource>)
        })
        .collect()
}
