//! mDNSBrowser (§4.8): continuous discovery, TTL-based eviction, and the
//! one-shot `Discover`/`DiscoverWithFallback` helpers the CLI uses when it
//! just needs a single coordinator address.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hybridgrid_types::{DiscoveredWorker, DiscoverySource, HybridGridError};
use mdns_sd::{ServiceDaemon, ServiceEvent};
use tokio::sync::{mpsc, RwLock};
use tracing::info;

use crate::txt::{decode_txt_strings, parse_worker_txt};

/// A found/lost notification from a running browse loop.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    Found(DiscoveredWorker),
    Lost(String),
}

struct Entry {
    worker: DiscoveredWorker,
    last_seen: Instant,
}

/// Continuously browses a service type, maintaining a TTL-evicted map of
/// live entries and emitting found/lost events.
pub struct Browser {
    daemon: ServiceDaemon,
    service_type: String,
    ttl: Duration,
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl Browser {
    pub fn new(service_type: impl Into<String>, ttl: Duration) -> Result<Self, mdns_sd::Error> {
        Ok(Self {
            daemon: ServiceDaemon::new()?,
            service_type: service_type.into(),
            ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Start the browse + reaper loops. Returns a channel of found/lost
    /// events; dropping the receiver does not stop the loops — use the
    /// returned `tokio::task::JoinHandle`s (discarded here by convention,
    /// matching the "browse forever, cancel via the owning context" design
    /// note) to manage lifetime from the caller.
    pub fn start(self: Arc<Self>) -> mpsc::UnboundedReceiver<DiscoveryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        let browse_self = self.clone();
        let browse_tx = tx.clone();
        tokio::spawn(async move {
            browse_self.run_browse_loop(browse_tx).await;
        });

        let reaper_self = self.clone();
        tokio::spawn(async move {
            reaper_self.run_reaper_loop(tx).await;
        });

        rx
    }

    async fn run_browse_loop(&self, tx: mpsc::UnboundedSender<DiscoveryEvent>) {
        loop {
            let Ok(receiver) = self.daemon.browse(&self.service_type) else {
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            };

            // Bound each browse call so cancellation of the owning task is
            // observed promptly even if no events arrive.
            let deadline = tokio::time::sleep(Duration::from_secs(10));
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    event = receiver.recv_async() => {
                        match event {
                            Ok(ServiceEvent::ServiceResolved(info)) => {
                                if let Some((worker, is_new)) = self.resolve(&info).await {
                                    if is_new {
                                        let _ = tx.send(DiscoveryEvent::Found(worker));
                                    }
                                }
                            }
                            Ok(ServiceEvent::ServiceRemoved(_, fullname)) => {
                                let mut entries = self.entries.write().await;
                                if entries.remove(&fullname).is_some() {
                                    let _ = tx.send(DiscoveryEvent::Lost(fullname));
                                }
                            }
                            Ok(_) => {}
                            Err(_) => break,
                        }
                    }
                    _ = &mut deadline => break,
                }
            }
        }
    }

    /// Resolves a TXT-bearing service record into a [`DiscoveredWorker`],
    /// refreshing its `last_seen` timestamp. Returns `(worker, is_new)` so
    /// callers that only want to notify on first sighting (§4.8: "New IDs
    /// emit a `found` callback; re-observations refresh the timestamp")
    /// can gate on it; one-shot callers that just want any match can ignore it.
    async fn resolve(&self, info: &mdns_sd::ServiceInfo) -> Option<(DiscoveredWorker, bool)> {
        let strings: Vec<String> = info
            .get_properties()
            .iter()
            .map(|p| format!("{}={}", p.key(), p.val_str()))
            .collect();
        let txt = decode_txt_strings(strings);
        let capabilities = parse_worker_txt(&txt);

        let address = preferred_address(info)?;
        let port = txt
            .get("grpc_port")
            .and_then(|p| p.parse().ok())
            .unwrap_or_else(|| info.get_port());

        let fullname = info.get_fullname().to_string();
        let worker = DiscoveredWorker {
            id: capabilities.worker_id.clone(),
            address: format!("{address}:{port}"),
            capabilities,
            discovered_at_ms: 0,
            source: DiscoverySource::Mdns,
        };

        let mut entries = self.entries.write().await;
        let is_new = !entries.contains_key(&fullname);
        entries.insert(fullname, Entry { worker: worker.clone(), last_seen: Instant::now() });
        if is_new {
            info!(worker_id = %worker.id, "discovered worker");
        }
        Some((worker, is_new))
    }

    async fn run_reaper_loop(&self, tx: mpsc::UnboundedSender<DiscoveryEvent>) {
        let mut interval = tokio::time::interval(self.ttl / 2);
        loop {
            interval.tick().await;
            let mut entries = self.entries.write().await;
            let expired: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| entry.last_seen.elapsed() > self.ttl)
                .map(|(fullname, _)| fullname.clone())
                .collect();
            for fullname in expired {
                if let Some(entry) = entries.remove(&fullname) {
                    info!(worker_id = %entry.worker.id, "evicted stale discovery entry");
                    let _ = tx.send(DiscoveryEvent::Lost(fullname));
                }
            }
        }
    }

    /// One-shot discovery: return the first parseable entry, or
    /// `DISCOVERY_TIMEOUT` if none arrives within `timeout`.
    pub async fn discover(&self, timeout: Duration) -> Result<DiscoveredWorker, HybridGridError> {
        let receiver = self
            .daemon
            .browse(&self.service_type)
            .map_err(|e| HybridGridError::Internal(format!("browse failed: {e}")))?;

        tokio::time::timeout(timeout, async {
            loop {
                match receiver.recv_async().await {
                    Ok(ServiceEvent::ServiceResolved(info)) => {
                        if let Some((worker, _is_new)) = self.resolve(&info).await {
                            return worker;
                        }
                    }
                    Ok(_) => continue,
                    Err(_) => {
                        std::future::pending::<()>().await;
                    }
                }
            }
        })
        .await
        .map_err(|_| HybridGridError::DiscoveryTimeout(timeout))
    }

    /// Like [`Self::discover`], but returns `fallback` instead of failing
    /// when it is non-empty.
    pub async fn discover_with_fallback(
        &self,
        timeout: Duration,
        fallback: Option<String>,
    ) -> Result<String, HybridGridError> {
        match self.discover(timeout).await {
            Ok(worker) => Ok(worker.address),
            Err(HybridGridError::DiscoveryTimeout(_)) => match fallback {
                Some(address) if !address.is_empty() => Ok(address),
                _ => Err(HybridGridError::DiscoveryTimeout(timeout)),
            },
            Err(other) => Err(other),
        }
    }
}

/// Address selection per §4.8: IPv4 -> IPv6 -> hostname. A record with no
/// advertised A/AAAA address (e.g. a worker on a link with only `.local`
/// resolution) would otherwise never be discoverable.
fn preferred_address(info: &mdns_sd::ServiceInfo) -> Option<String> {
    let addresses = info.get_addresses();
    if let Some(v4) = addresses.iter().find(|a| a.is_ipv4()) {
        return Some(v4.to_string());
    }
    if let Some(v6) = addresses.iter().find(|a| a.is_ipv6()) {
        return Some(v6.to_string());
    }
    let hostname = info.get_hostname().trim_end_matches('.');
    if !hostname.is_empty() {
        return Some(hostname.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdns_sd::ServiceInfo;
    use std::net::{IpAddr, Ipv4Addr};

    fn service_info(address: IpAddr) -> ServiceInfo {
        ServiceInfo::new(
            "_hybridgrid._tcp.local.",
            "w1",
            "w1.local.",
            address,
            7700,
            None::<std::collections::HashMap<String, String>>,
        )
        .expect("build service info")
    }

    #[test]
    fn preferred_address_prefers_ipv4_over_ipv6() {
        let info = service_info(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(preferred_address(&info), Some("10.0.0.5".to_string()));
    }

    #[tokio::test]
    async fn resolve_reports_is_new_only_on_first_sighting() {
        let Ok(browser) = Browser::new("_hybridgrid._tcp.local.", Duration::from_secs(60)) else {
            return;
        };
        let info = service_info(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));

        let (_, first) = browser.resolve(&info).await.expect("resolves");
        assert!(first, "first sighting of a fullname must be reported new");

        let (_, second) = browser.resolve(&info).await.expect("resolves");
        assert!(!second, "re-observation of the same fullname must not be reported new");
    }

    #[tokio::test]
    async fn discover_times_out_with_no_network() {
        let Ok(browser) = Browser::new("_hybridgrid._tcp.local.", Duration::from_secs(60)) else {
            return;
        };
        let result = browser.discover(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(HybridGridError::DiscoveryTimeout(_))));
    }

    #[tokio::test]
    async fn discover_with_fallback_uses_env_on_timeout() {
        let Ok(browser) = Browser::new("_hybridgrid._tcp.local.", Duration::from_secs(60)) else {
            return;
        };
        let result = browser
            .discover_with_fallback(Duration::from_millis(50), Some("10.0.0.1:9000".to_string()))
            .await;
        assert_eq!(result.unwrap(), "10.0.0.1:9000");
    }

    #[tokio::test]
    async fn discover_with_fallback_fails_on_empty_fallback() {
        let Ok(browser) = Browser::new("_hybridgrid._tcp.local.", Duration::from_secs(60)) else {
            return;
        };
        let result = browser.discover_with_fallback(Duration::from_millis(50), None).await;
        assert!(result.is_err());
    }
}
