//! Best-effort datagram transport.

use std::io;
use std::net::{SocketAddr, UdpSocket};

/// Unordered, unacknowledged datagram sender.
pub trait DatagramSink {
    fn send_to(&self, payload: &[u8], dest: SocketAddr) -> io::Result<usize>;
}

impl DatagramSink for UdpSocket {
    fn send_to(&self, payload: &[u8], dest: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, payload, dest)
    }
}

impl<T: DatagramSink + ?Sized> DatagramSink for &T {
    fn send_to(&self, payload: &[u8], dest: SocketAddr) -> io::Result<usize> {
        (**self).send_to(payload, dest)
    }
}

/// Bind an ephemeral UDP socket for outbound traffic.
///
/// The socket is non-blocking so a congested stack can never stall the
/// control loop; a send that would block simply fails.
pub fn bind_udp(broadcast: bool) -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind(("0.0.0.0", 0))?;
    socket.set_nonblocking(true)?;
    if broadcast {
        socket.set_broadcast(true)?;
    }
    Ok(socket)
}
