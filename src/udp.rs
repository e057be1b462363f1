//! Companion CLI datagram channel
//!
//! A local companion tool sends the same parenthesized protocol tokens over
//! UDP. Recognized requests ride through the command engine and their
//! responses return to the sender; anything else is forwarded to the device
//! verbatim. Optionally every live frame is replicated to a multicast group.

use crate::config::UdpConfig;
use crate::error::{AeolusError, Result};
use crate::logging::{get_logger, StructuredLogger};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;

/// Datagram endpoint for companion tools.
pub struct UdpChannel {
    socket: UdpSocket,
    tx_port: u16,
    multicast: Option<Ipv4Addr>,
    logger: StructuredLogger,
}

impl UdpChannel {
    /// Bind the receive port and join the multicast group when replication
    /// is enabled.
    pub async fn bind(cfg: &UdpConfig) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", cfg.rx_port))
            .await
            .map_err(|e| AeolusError::udp(format!("could not bind port {}: {}", cfg.rx_port, e)))?;

        let multicast = if cfg.multicast_enabled {
            let group: Ipv4Addr = cfg.multicast_ip.parse().map_err(|_| {
                AeolusError::udp(format!("bad multicast group '{}'", cfg.multicast_ip))
            })?;
            socket
                .join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)
                .map_err(|e| AeolusError::udp(format!("multicast join failed: {}", e)))?;
            Some(group)
        } else {
            None
        };

        let logger = get_logger("udp");
        logger.info(&format!(
            "receiving datagrams on port {} (all interfaces)",
            cfg.rx_port
        ));

        Ok(Self {
            socket,
            tx_port: cfg.tx_port,
            multicast,
            logger,
        })
    }

    /// Next datagram as trimmed text plus its origin.
    pub async fn recv(&self) -> Result<(String, SocketAddr)> {
        let mut buf = [0u8; 1024];
        let (n, origin) = self.socket.recv_from(&mut buf).await?;
        let message = String::from_utf8_lossy(&buf[..n]).trim().to_string();
        self.logger.debug(&format!("Rx {} from {}", message, origin));
        Ok((message, origin))
    }

    /// Send a response line back to a requester, on the transmit port.
    pub async fn send_to(&self, message: &str, origin: SocketAddr) {
        let dest = SocketAddr::new(origin.ip(), self.tx_port);
        if let Err(e) = self.socket.send_to(message.as_bytes(), dest).await {
            self.logger.error(&format!("Tx to {} failed: {}", dest, e));
        }
    }

    /// Replicate a live frame to the multicast group, when configured.
    pub async fn replicate(&self, frame: &[u8]) {
        let Some(group) = self.multicast else {
            return;
        };
        let dest = SocketAddr::new(group.into(), self.tx_port);
        if let Err(e) = self.socket.send_to(frame, dest).await {
            self.logger.error(&format!("multicast Tx failed: {}", e));
        }
    }

    pub fn multicast_enabled(&self) -> bool {
        self.multicast.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recv_and_reply() {
        // Listener stands in for the companion tool
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let reply_port = listener.local_addr().unwrap().port();

        let channel = UdpChannel::bind(&UdpConfig {
            rx_port: 0,
            tx_port: reply_port,
            multicast_ip: String::new(),
            multicast_enabled: false,
        })
        .await
        .unwrap();
        let rx_port = channel.socket.local_addr().unwrap().port();

        listener
            .send_to(b"(X007)\n", ("127.0.0.1", rx_port))
            .await
            .unwrap();
        let (message, origin) = channel.recv().await.unwrap();
        assert_eq!(message, "(X007)");

        channel.send_to("(X007)", origin).await;
        let mut buf = [0u8; 64];
        let (n, _) = listener.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"(X007)");
    }
}
