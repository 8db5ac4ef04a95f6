//! TCP liveness probe
//!
//! Opens a TCP connection, measures the time to establishment and closes it
//! again. No application-layer handshake is attempted.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::trace;

/// Measures reachability of a host and port
#[async_trait]
pub trait Prober: Send + Sync {
    /// Connect latency in milliseconds, or `None` when unreachable
    async fn probe(&self, host: &str, port: u16) -> Option<f64>;
}

/// Plain TCP connect-and-close prober
#[derive(Debug, Clone)]
pub struct TcpProber {
    timeout: Duration,
}

impl TcpProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, host: &str, port: u16) -> Option<f64> {
        let start = Instant::now();

        match tokio::time::timeout(self.timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                let latency = start.elapsed().as_secs_f64() * 1000.0;
                drop(stream);
                Some(latency)
            }
            Ok(Err(e)) => {
                trace!("Connect to {}:{} failed: {}", host, port, e);
                None
            }
            Err(_) => {
                trace!("Connect to {}:{} timed out", host, port);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let prober = TcpProber::new(Duration::from_secs(2));
        let latency = prober.probe("127.0.0.1", port).await;

        assert!(latency.is_some());
        assert!(latency.unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn test_probe_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let prober = TcpProber::new(Duration::from_secs(2));
        assert!(prober.probe("127.0.0.1", port).await.is_none());
    }
}
