use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::net::{lookup_host, UdpSocket};

use super::DatagramLink;

/* large enough for a full reply to 40 samples */
const MAX_DATAGRAM: usize = 1480;

/// How long the link is reported down after the network refused a datagram.
const LINK_RETRY: Duration = Duration::from_secs(1);

/// Errors meaning the collector or the route to it is gone.
fn is_link_error(e: &io::Error) -> bool {
    return matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkDown
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable
    );
}

/// Connected UDP socket talking to one collector.
pub struct UdpLink {
    socket: UdpSocket,
    remote: SocketAddr,
    down_until: Option<Instant>,
}

impl UdpLink {
    pub async fn new(host: &str, port: u16, bind_port: u16) -> io::Result<Self> {
        let remote = lookup_host((host, port))
            .await?
            .find(|addr| addr.is_ipv4())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("No IPv4 address for {}", host)))?;

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, bind_port)).await?;
        socket.connect(remote).await?;

        debug!("Telemetry link {} -> {}", socket.local_addr()?, remote);
        return Ok(UdpLink { socket, remote, down_until: None });
    }

    pub fn remote(&self) -> SocketAddr {
        return self.remote;
    }

    fn record<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        match &result {
            Ok(_) => {
                if self.down_until.take().is_some() {
                    info!("Telemetry link to {} is up", self.remote);
                }
            }
            Err(e) if is_link_error(e) => {
                if self.down_until.is_none() {
                    warn!("Telemetry link to {} is down: {}", self.remote, e);
                }
                self.down_until = Some(Instant::now() + LINK_RETRY);
            }
            Err(_) => {}
        }
        return result;
    }
}

impl DatagramLink for UdpLink {
    /// Down for a while after a refused or unroutable datagram, then tried again.
    fn is_up(&self) -> bool {
        return match self.down_until {
            Some(until) => Instant::now() >= until,
            None => true,
        };
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let result = self.socket.try_send(data);
        let len = self.record(result)?;
        if len != data.len() {
            return Err(io::Error::new(io::ErrorKind::WriteZero, format!("Sent {} of {} bytes", len, data.len())));
        }
        Ok(())
    }

    fn try_receive(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        let len = match self.socket.try_recv(&mut buf) {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            result => self.record(result)?,
        };
        buf.truncate(len);
        return Ok(Some(buf));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = peer.local_addr().unwrap().port();

        let mut link = UdpLink::new("127.0.0.1", port, 0).await.unwrap();
        assert!(link.is_up());
        assert_eq!(link.try_receive().unwrap(), None);

        link.send(b"hello").unwrap();
        let mut buf = [0u8; 16];
        let (len, sender) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"hello");

        peer.send_to(b"reply", sender).await.unwrap();
        let mut received = None;
        for _ in 0..100 {
            received = link.try_receive().unwrap();
            if received.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(received, Some(b"reply".to_vec()));
    }

    #[tokio::test]
    async fn test_link_down_after_refusal() {
        let mut link = UdpLink::new("127.0.0.1", 9, 0).await.unwrap();
        assert!(link.is_up());

        let refused = link.record::<()>(Err(io::Error::from(io::ErrorKind::ConnectionRefused)));
        assert!(refused.is_err());
        assert!(!link.is_up());

        /* unrelated failures leave the state alone */
        let _ = link.record::<()>(Err(io::Error::from(io::ErrorKind::InvalidInput)));
        assert!(!link.is_up());

        link.record(Ok(())).unwrap();
        assert!(link.is_up());
    }

    #[tokio::test]
    async fn test_link_retried_after_window() {
        let mut link = UdpLink::new("127.0.0.1", 9, 0).await.unwrap();
        let _ = link.record::<()>(Err(io::Error::from(io::ErrorKind::NetworkUnreachable)));
        assert!(!link.is_up());

        link.down_until = Some(Instant::now() - Duration::from_millis(1));
        assert!(link.is_up());
    }
}
