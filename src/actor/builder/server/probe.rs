//! Readiness probe for the user server.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

use crate::core::Shutdown;

const DIAL_TIMEOUT: Duration = Duration::from_millis(200);
const PROBE_INTERVAL: Duration = Duration::from_millis(50);
pub const PROBE_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// A TCP dial to the port succeeded.
    Ready,
    /// The child went away first.
    Exited,
    TimedOut,
    /// Shutdown requested.
    Cancelled,
}

/// Dial `127.0.0.1:port` until it answers, the child exits or `deadline` passes.
pub async fn wait_ready(
    port: u16,
    mut exited: watch::Receiver<bool>,
    shutdown: &Shutdown,
    deadline: Duration,
) -> Probe {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let dial = async {
        loop {
            if let Ok(Ok(_)) = timeout(DIAL_TIMEOUT, TcpStream::connect(addr)).await {
                return;
            }
            sleep(PROBE_INTERVAL).await;
        }
    };

    tokio::select! {
        biased;
        _ = shutdown.wait() => Probe::Cancelled,
        // A dropped sender also means the child is gone.
        _ = exited.wait_for(|gone| *gone) => Probe::Exited,
        _ = dial => Probe::Ready,
        _ = sleep(deadline) => Probe::TimedOut,
    }
}
