//! Datagram transport to the device

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};

/// Opens and keeps alive a session with the device
pub const HANDSHAKE: &[u8] = b"ehllo";

pub trait Transport {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()>;

    /// Read one datagram without blocking. Returns `WouldBlock` when nothing
    /// is pending.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Factory for fresh transports; every reconnect opens a new one
pub trait Connector {
    type Transport: Transport;

    fn open(&mut self) -> io::Result<Self::Transport>;
    fn peer(&self) -> String;
}

pub struct UdpConnector {
    addr: SocketAddr,
}

impl UdpConnector {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn resolve(host: &str, port: u16) -> io::Result<Self> {
        let addr = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address for {host}:{port}"),
            )
        })?;
        Ok(Self::new(addr))
    }
}

impl Connector for UdpConnector {
    type Transport = UdpTransport;

    fn open(&mut self) -> io::Result<UdpTransport> {
        let local: SocketAddr = if self.addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        Ok(UdpTransport {
            socket,
            peer: self.addr,
        })
    }

    fn peer(&self) -> String {
        self.addr.to_string()
    }
}

pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl Transport for UdpTransport {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.socket.send_to(datagram, self.peer).map(|_| ())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv_from(buf).map(|(len, _)| len)
    }
}
