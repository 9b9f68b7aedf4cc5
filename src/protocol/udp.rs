//! UDP datagram link to the emulator (or, from the emulator side, to the controller)

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use super::link::ByteLink;
use crate::error::TransportError;

const READ_POLL: Duration = Duration::from_millis(50);

pub struct UdpLink {
    socket: UdpSocket,
    local_port: u16,
    remote: SocketAddr,
}

impl UdpLink {
    /// Bind `listen_port` on localhost and send every datagram to `remote`
    pub fn bind(listen_port: u16, remote: SocketAddr) -> Result<Self, TransportError> {
        let endpoint = format!("udp:{}", listen_port);
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, listen_port)).map_err(|source| {
            TransportError::Open {
                endpoint: endpoint.clone(),
                source,
            }
        })?;
        socket
            .set_read_timeout(Some(READ_POLL))
            .map_err(|source| TransportError::Open { endpoint, source })?;

        let local_port = socket.local_addr().map(|a| a.port()).unwrap_or(listen_port);
        log::info!("UDP link listening on {} (remote {})", local_port, remote);
        Ok(Self {
            socket,
            local_port,
            remote,
        })
    }
}

impl ByteLink for UdpLink {
    fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        let sent = self.socket.send_to(bytes, self.remote)?;
        if sent != bytes.len() {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "short datagram write"));
        }
        Ok(())
    }

    fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self.socket.recv_from(buf) {
            Ok((n, _from)) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn describe(&self) -> String {
        format!("udp:{}->{}", self.local_port, self.remote)
    }
}
