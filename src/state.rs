use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tracing::info;

use crate::config::ServerConfig;
use crate::core::relay::RelayConfig;
use crate::core::tools::ToolRegistry;
use crate::core::upstream::{RealtimeConnector, UpstreamConnector};
use crate::errors::AppResult;

/// Why a websocket connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLimitError {
    GlobalLimitReached,
    PerIpLimitReached,
}

/// Shared application state
pub struct AppState {
    pub config: ServerConfig,
    /// Tools served to every session
    pub tools: Arc<ToolRegistry>,
    pub relay_config: Arc<RelayConfig>,
    /// `None` when no upstream is configured; sessions are refused
    pub connector: Option<Arc<dyn UpstreamConnector>>,

    ws_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, u32>,
}

impl AppState {
    /// Build the state from configuration, loading the configured tool catalog.
    pub fn new(config: ServerConfig) -> AppResult<Arc<Self>> {
        let tools = config
            .tool_catalog
            .build_registry(config.products_path.as_deref())?;
        info!(
            catalog = %config.tool_catalog,
            tools = tools.len(),
            "Tool registry ready"
        );

        let connector = config.upstream_config().map(|upstream| {
            let connector = RealtimeConnector::new(upstream);
            info!(upstream = %connector.describe(), "Upstream configured");
            Arc::new(connector) as Arc<dyn UpstreamConnector>
        });
        if connector.is_none() {
            tracing::warn!("No upstream configured; realtime sessions will be refused");
        }

        Ok(Self::with_parts(config, tools, connector))
    }

    /// Assemble the state from already-built parts.
    pub fn with_parts(
        config: ServerConfig,
        tools: ToolRegistry,
        connector: Option<Arc<dyn UpstreamConnector>>,
    ) -> Arc<Self> {
        let relay_config = Arc::new(config.relay_config());
        Arc::new(Self {
            config,
            tools: Arc::new(tools),
            relay_config,
            connector,
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
        })
    }

    /// Reserve a websocket slot for `ip`, enforcing global and per-IP limits.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        let mut per_ip = self.ip_connections.entry(ip).or_insert(0);
        if *per_ip >= self.config.max_connections_per_ip {
            return Err(ConnectionLimitError::PerIpLimitReached);
        }

        if !self.reserve_global_slot() {
            drop(per_ip);
            self.ip_connections.remove_if(&ip, |_, count| *count == 0);
            return Err(ConnectionLimitError::GlobalLimitReached);
        }

        *per_ip += 1;
        Ok(())
    }

    fn reserve_global_slot(&self) -> bool {
        match self.config.max_websocket_connections {
            Some(max) => self
                .ws_connections
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    (current < max).then_some(current + 1)
                })
                .is_ok(),
            None => {
                self.ws_connections.fetch_add(1, Ordering::AcqRel);
                true
            }
        }
    }

    /// Return a slot reserved by [`try_acquire_connection`](Self::try_acquire_connection).
    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .ws_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            });
        self.ip_connections
            .remove_if_mut(&ip, |_, count| {
                *count = count.saturating_sub(1);
                *count == 0
            });
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::Acquire)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> u32 {
        self.ip_connections.get(ip).map(|count| *count).unwrap_or(0)
    }
}

/// Releases a reserved connection slot when dropped.
pub struct ConnectionGuard {
    state: Arc<AppState>,
    ip: IpAddr,
}

impl ConnectionGuard {
    pub fn new(state: Arc<AppState>, ip: IpAddr) -> Self {
        Self { state, ip }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.state.release_connection(self.ip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ToolCatalog;
    use std::net::Ipv4Addr;

    fn state(max_total: Option<usize>, per_ip: u32) -> Arc<AppState> {
        let mut config = ServerConfig::default();
        config.max_websocket_connections = max_total;
        config.max_connections_per_ip = per_ip;
        config.tool_catalog = ToolCatalog::None;
        AppState::new(config).unwrap()
    }

    #[test]
    fn test_connection_tracking_basic() {
        let state = state(Some(10), 3);
        let ip: IpAddr = Ipv4Addr::new(192, 168, 1, 100).into();

        assert_eq!(state.ws_connection_count(), 0);
        assert_eq!(state.ip_connection_count(&ip), 0);

        for expected in 1..=3 {
            assert!(state.try_acquire_connection(ip).is_ok());
            assert_eq!(state.ws_connection_count(), expected);
            assert_eq!(state.ip_connection_count(&ip), expected as u32);
        }

        // Fourth connection should be rejected (per-IP limit)
        assert_eq!(
            state.try_acquire_connection(ip),
            Err(ConnectionLimitError::PerIpLimitReached)
        );
        assert_eq!(state.ws_connection_count(), 3);

        state.release_connection(ip);
        assert_eq!(state.ws_connection_count(), 2);
        assert_eq!(state.ip_connection_count(&ip), 2);

        assert!(state.try_acquire_connection(ip).is_ok());
        assert_eq!(state.ws_connection_count(), 3);
    }

    #[test]
    fn test_global_connection_limit() {
        let state = state(Some(5), 10);
        let ips: Vec<IpAddr> = (1..=6)
            .map(|i| Ipv4Addr::new(192, 168, 1, i).into())
            .collect();

        for ip in &ips[0..5] {
            assert!(state.try_acquire_connection(*ip).is_ok());
        }
        assert_eq!(state.ws_connection_count(), 5);

        assert_eq!(
            state.try_acquire_connection(ips[5]),
            Err(ConnectionLimitError::GlobalLimitReached)
        );
        assert_eq!(state.ip_connection_count(&ips[5]), 0);

        state.release_connection(ips[0]);
        assert!(state.try_acquire_connection(ips[5]).is_ok());
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let state = state(None, 2);
        let ip: IpAddr = Ipv4Addr::LOCALHOST.into();

        state.try_acquire_connection(ip).unwrap();
        let guard = ConnectionGuard::new(Arc::clone(&state), ip);
        assert_eq!(state.ip_connection_count(&ip), 1);

        drop(guard);
        assert_eq!(state.ws_connection_count(), 0);
        assert_eq!(state.ip_connection_count(&ip), 0);
    }

    #[test]
    fn test_no_upstream_means_no_connector() {
        let state = state(None, 1);
        assert!(state.connector.is_none());
        assert!(state.tools.is_empty());
    }
}
