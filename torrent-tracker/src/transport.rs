use std::{io, sync::Arc};

use async_trait::async_trait;
use tokio::{net::UdpSocket, spawn, task::JoinHandle};
use tracing::{trace, warn};

use crate::client::TrackerClient;

// largest possible UDP payload, so a datagram is never cut short
const RECV_BUFFER_LEN: usize = 65_536;

/// Outbound half of the datagram channel shared by all sessions of a
/// client. Inbound datagrams are handed to [`TrackerClient::dispatch`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, datagram: &[u8], host: &str, port: u16) -> io::Result<()>;
}

pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(UdpTransport { socket })
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }

    /// Feeds every datagram arriving on the socket to `client` until the
    /// socket fails or the task is aborted.
    pub fn spawn_receiver(self: &Arc<Self>, client: Arc<TrackerClient>) -> JoinHandle<()> {
        let transport = Arc::clone(self);
        spawn(async move {
            let mut buf = vec![0u8; RECV_BUFFER_LEN];
            loop {
                match transport.socket.recv_from(&mut buf).await {
                    Ok((n, from)) => {
                        trace!(%from, len = n, "datagram received");
                        client.dispatch(&buf[..n]);
                    }
                    Err(e) => {
                        warn!(error = %e, "udp receive failed, stopping receiver");
                        break;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, datagram: &[u8], host: &str, port: u16) -> io::Result<()> {
        self.socket.send_to(datagram, (host, port)).await?;
        Ok(())
    }
}
