//! IP allowlist guarding the scrape endpoint.
//!
//! Entries are host names or literal IPs. Names are resolved periodically and
//! the addresses cached; a failed lookup keeps whatever that name resolved to
//! last time, so a DNS hiccup never locks the monitoring system out.

use crate::metrics::IngestMetrics;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

#[derive(Default)]
pub struct AllowList {
    entries: RwLock<Vec<String>>,
    cache: RwLock<HashMap<String, Vec<IpAddr>>>,
    refresh_requested: Notify,
}

impl AllowList {
    /// Literal IP entries are usable immediately; names need [`AllowList::refresh`].
    pub fn new(entries: Vec<String>) -> Self {
        let list = Self::default();
        list.set_entries(entries);
        list
    }

    /// Replace the configured entries and ask the refresher to resolve them.
    pub fn set_entries(&self, entries: Vec<String>) {
        {
            let mut cache = write(&self.cache);
            cache.retain(|entry, _| entries.contains(entry));
            for entry in &entries {
                if let Ok(ip) = entry.parse::<IpAddr>() {
                    cache.insert(entry.clone(), vec![ip]);
                }
            }
        }
        info!(entries = ?entries, "Allowlist entries set");
        *write(&self.entries) = entries;
        self.refresh_requested.notify_one();
    }

    pub fn entries(&self) -> Vec<String> {
        read(&self.entries).clone()
    }

    /// Resolve every entry. Returns the number of entries that failed.
    pub async fn refresh(&self) -> usize {
        let entries = self.entries();
        let mut resolved = HashMap::with_capacity(entries.len());
        let mut failed = 0;

        // Resolve without holding the cache lock
        for entry in entries {
            if let Ok(ip) = entry.parse::<IpAddr>() {
                resolved.insert(entry, vec![ip]);
                continue;
            }
            match tokio::net::lookup_host((entry.as_str(), 0)).await {
                Ok(addrs) => {
                    let ips: Vec<IpAddr> = addrs.map(|a| canonical(a.ip())).collect();
                    debug!(entry = %entry, ips = ?ips, "resolved allowlist entry");
                    resolved.insert(entry.clone(), ips);
                }
                Err(e) => {
                    warn!(entry = %entry, error = %e, "allowlist lookup failed, keeping cached addresses");
                    failed += 1;
                }
            }
        }

        let mut cache = write(&self.cache);
        let current = read(&self.entries).clone();
        for (entry, ips) in resolved {
            // Skip entries removed by a reload while we were resolving
            if current.contains(&entry) {
                cache.insert(entry, ips);
            }
        }
        failed
    }

    pub fn is_allowed(&self, ip: IpAddr) -> bool {
        let ip = canonical(ip);
        read(&self.cache).values().any(|ips| ips.contains(&ip))
    }

    /// Refresh on a fixed period and whenever entries change.
    pub async fn run_refresher(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(?period, "Allowlist refresher started");
        loop {
            let failed = self.refresh().await;
            if failed > 0 {
                warn!(failed, "some allowlist entries could not be resolved");
            }
            tokio::select! {
                _ = tokio::time::sleep(period) => {}
                _ = self.refresh_requested.notified() => {
                    debug!("allowlist refresh requested");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Allowlist refresher stopped");
    }
}

/// Client address: `X-Real-IP`, then the first `X-Forwarded-For` hop, then
/// the transport peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let header_ip = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };
    header_ip("x-real-ip")
        .or_else(|| header_ip("x-forwarded-for"))
        .or_else(|| peer.map(|p| p.ip()))
        .map(canonical)
}

/// Reject scrapes from addresses not on the allowlist with 403.
pub async fn require_allowed(
    State(allowlist): State<Arc<AllowList>>,
    req: Request<Body>,
    next: Next<Body>,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    match client_ip(req.headers(), peer) {
        Some(ip) if allowlist.is_allowed(ip) => {
            IngestMetrics::record_scrape(true);
            next.run(req).await
        }
        Some(ip) => {
            warn!(client = %ip, "scrape denied");
            IngestMetrics::record_scrape(false);
            (StatusCode::FORBIDDEN, "forbidden").into_response()
        }
        None => {
            warn!("scrape denied, client address unresolvable");
            IngestMetrics::record_scrape(false);
            (StatusCode::FORBIDDEN, "forbidden").into_response()
        }
    }
}

fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|p| p.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_literal_entries_allowed_without_refresh() {
        let list = AllowList::new(vec!["192.168.100.110".to_string(), "monitor.invalid".to_string()]);
        assert!(list.is_allowed(ip("192.168.100.110")));
        assert!(list.is_allowed(ip("::ffff:192.168.100.110")));
        assert!(!list.is_allowed(ip("192.168.100.111")));
    }

    #[test]
    fn test_set_entries_drops_removed() {
        let list = AllowList::new(vec!["10.0.0.1".to_string()]);
        list.set_entries(vec!["10.0.0.2".to_string()]);
        assert!(!list.is_allowed(ip("10.0.0.1")));
        assert!(list.is_allowed(ip("10.0.0.2")));
    }

    #[tokio::test]
    async fn test_refresh_resolves_names_and_keeps_cache_on_failure() {
        let list = AllowList::new(vec!["localhost".to_string(), "no-such-host.invalid".to_string()]);
        let failed = list.refresh().await;
        assert_eq!(failed, 1);
        assert!(list.is_allowed(ip("127.0.0.1")) || list.is_allowed(ip("::1")));
    }

    #[test]
    fn test_client_ip_precedence() {
        let peer = Some("10.9.9.9:5000".parse().unwrap());
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, peer), Some(ip("10.9.9.9")));
        assert_eq!(client_ip(&headers, None), None);

        headers.insert("x-forwarded-for", HeaderValue::from_static("1.1.1.1, 2.2.2.2"));
        assert_eq!(client_ip(&headers, peer), Some(ip("1.1.1.1")));

        headers.insert("x-real-ip", HeaderValue::from_static("3.3.3.3"));
        assert_eq!(client_ip(&headers, peer), Some(ip("3.3.3.3")));
    }

    #[test]
    fn test_garbage_header_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("not-an-ip"));
        assert_eq!(client_ip(&headers, None), None);
        let peer = Some("10.0.0.5:1".parse().unwrap());
        assert_eq!(client_ip(&headers, peer), Some(ip("10.0.0.5")));
    }
}
