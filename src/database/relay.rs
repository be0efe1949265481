//! Loopback relay that routes driver connections through a [`Dialer`].
//!
//! The MySQL driver opens its own sockets, so proxied endpoints are exposed
//! to it as a local listener. Every accepted connection is dialed to the real
//! endpoint through the dialer and the bytes are copied in both directions.

use super::dialer::Dialer;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::copy_bidirectional;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Pause after a failed accept (e.g. file descriptor exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// A running relay. Dropping it stops accepting new connections.
#[derive(Debug)]
pub struct Relay {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl Relay {
    /// Start relaying connections accepted on a loopback port to `target`.
    pub async fn start(target: String, dialer: Dialer) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let local_addr = listener.local_addr()?;
        debug!("Relaying {} -> {} via {}", local_addr, target, dialer);

        let task = tokio::spawn(async move {
            loop {
                let (mut inbound, peer) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Relay accept failed: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                };

                let dialer = dialer.clone();
                let target = target.clone();
                tokio::spawn(async move {
                    let mut outbound = match dialer.dial(&target).await {
                        Ok(stream) => stream,
                        Err(e) => {
                            debug!("Relay dial to {} failed for {}: {}", target, peer, e);
                            return;
                        }
                    };
                    if let Err(e) = copy_bidirectional(&mut inbound, &mut outbound).await {
                        debug!("Relay stream for {} closed: {}", peer, e);
                    }
                });
            }
        });

        Ok(Self { local_addr, task })
    }

    /// Loopback address the driver should connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.task.abort();
    }
}
