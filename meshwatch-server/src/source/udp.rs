use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::mpsc;

/// Largest datagram accepted; longer ones are truncated by the socket.
pub const MAX_DATAGRAM: usize = 4096;

/// Pause after a receive error.
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Datagram transport: one JSON record per datagram.
#[derive(Debug)]
pub struct UdpSource {
    socket: UdpSocket,
}

impl UdpSource {
    pub async fn bind(addr: impl ToSocketAddrs) -> std::io::Result<Self> {
        Ok(Self {
            socket: UdpSocket::bind(addr).await?,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Forward datagrams to `tx` until the receiver is dropped.
    pub fn spawn(self, tx: mpsc::Sender<String>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            if let Ok(addr) = self.socket.local_addr() {
                tracing::info!(%addr, "listening for datagrams");
            }

            loop {
                match self.socket.recv_from(&mut buf).await {
                    Ok((n, peer)) => {
                        let unit = String::from_utf8_lossy(&buf[..n]).trim().to_string();
                        if unit.is_empty() {
                            continue;
                        }
                        tracing::trace!(%peer, bytes = n, "datagram");
                        if tx.send(unit).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "datagram receive failed");
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                }
            }
        })
    }
}
