//! Network reachability probes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::types::BaseUrl;

/// Reports whether the network is currently reachable.
///
/// Consulted before every request attempt; `false` fails the request with
/// a `NetworkError` without touching the transport.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Assumes the network is always reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

#[async_trait]
impl ConnectivityProbe for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// A probe driven by an externally controlled flag.
///
/// Clones share the flag, so the session layer can hold one handle and
/// flip it when the platform reports a connectivity change.
#[derive(Debug, Clone)]
pub struct StaticProbe {
    online: Arc<AtomicBool>,
}

impl StaticProbe {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Checks reachability by opening a TCP connection to the backend host.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    deadline: Duration,
}

impl TcpProbe {
    /// Default connect deadline.
    pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(3);

    /// Probe the host and port of `base_url`.
    pub fn for_base_url(base_url: &BaseUrl) -> Option<Self> {
        Some(Self {
            host: base_url.host()?.trim_matches(['[', ']']).to_string(),
            port: base_url.port_or_default()?,
            deadline: Self::DEFAULT_DEADLINE,
        })
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

#[async_trait]
impl ConnectivityProbe for TcpProbe {
    async fn is_online(&self) -> bool {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(self.deadline, connect).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(host = %self.host, port = self.port, error = %e, "connectivity probe failed");
                false
            }
            Err(_) => {
                debug!(host = %self.host, port = self.port, "connectivity probe timed out");
                false
            }
        }
    }
}
