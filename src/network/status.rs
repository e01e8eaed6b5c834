use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};

use log::debug;
use tokio::net::UdpSocket;

/// Sends each status line as one UDP datagram to a multicast group.
pub struct StatusBroadcaster {
    socket: UdpSocket,
    group: SocketAddrV4,
}

impl StatusBroadcaster {
    pub async fn new(group: Ipv4Addr, port: u16, ttl: u32) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_multicast_ttl_v4(ttl)?;

        return Ok(StatusBroadcaster {
            socket,
            group: SocketAddrV4::new(group, port),
        });
    }

    /// Never waits, a line that does not fit the socket buffer is dropped.
    pub fn send(&self, line: &str) -> io::Result<()> {
        self.socket.try_send_to(line.as_bytes(), self.group.into())?;
        debug!("Status sent to {}", self.group);
        Ok(())
    }
}
