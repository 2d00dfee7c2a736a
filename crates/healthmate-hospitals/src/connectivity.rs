//! Network reachability: pushed online/offline events plus an active probe.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::broadcast;

pub const DEFAULT_PROBE_URL: &str = "https://www.google.com/favicon.ico";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Online/offline transitions reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectivityState {
    pub is_offline: bool,
}

impl ConnectivityState {
    pub fn from_reachable(reachable: bool) -> Self {
        Self {
            is_offline: !reachable,
        }
    }
}

/// Fan-out point for connectivity events.
///
/// Whatever watches the platform network state calls [`notify`](Self::notify);
/// managers register through [`subscribe`](Self::subscribe).
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: broadcast::Sender<ConnectivityEvent>,
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Returns how many subscribers received it.
    pub fn notify(&self, event: ConnectivityEvent) -> usize {
        tracing::debug!("Connectivity event: {:?}", event);
        self.tx.send(event).unwrap_or(0)
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Active reachability check.
pub trait ConnectivityProbe: Send + Sync + 'static {
    /// True if the probe target answered at all; the response is ignored.
    fn is_reachable(&self) -> impl Future<Output = bool> + Send;
}

/// HEAD request against a stable external host.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl ConnectivityProbe for HttpProbe {
    async fn is_reachable(&self) -> bool {
        match self
            .client
            .head(&self.url)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await
        {
            Ok(response) => {
                tracing::debug!("Connectivity probe answered with {}", response.status());
                true
            }
            Err(e) => {
                tracing::debug!("Connectivity probe failed: {}", e);
                false
            }
        }
    }
}
