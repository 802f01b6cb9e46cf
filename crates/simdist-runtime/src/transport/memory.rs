//! In-process transport for meshes of hosts inside one process.
//!
//! Every frame goes through a JSON round trip, so anything that would not
//! survive the TCP transport fails here too. Per-host faults can be injected
//! to exercise the unreachable and timeout paths.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace};

use super::{dispatch, HostRequest, HostResponse, HostService, Transport};
use crate::error::RuntimeError;
use crate::types::HostId;

#[derive(Debug, Clone, Copy, Default)]
struct Fault {
    unreachable: bool,
    latency: Option<Duration>,
}

/// Routes calls directly to registered services.
#[derive(Default)]
pub struct MemoryTransport {
    hosts: RwLock<HashMap<HostId, Weak<dyn HostService>>>,
    faults: DashMap<HostId, Fault>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a service reachable under its host id.
    ///
    /// Only a weak reference is kept, so a dropped host becomes unreachable.
    pub fn register(&self, service: Arc<dyn HostService>) {
        let host = service.host_id().clone();
        debug!(host = %host, "Registering in-memory host");
        self.hosts.write().insert(host, Arc::downgrade(&service));
    }

    pub fn hosts(&self) -> Vec<HostId> {
        let mut hosts: Vec<HostId> = self.hosts.read().keys().cloned().collect();
        hosts.sort();
        hosts
    }

    /// Fail every call to `host` until healed.
    pub fn set_unreachable(&self, host: &HostId, unreachable: bool) {
        self.faults.entry(host.clone()).or_default().unreachable = unreachable;
    }

    /// Delay every call to `host` before it is delivered.
    pub fn set_latency(&self, host: &HostId, latency: Option<Duration>) {
        self.faults.entry(host.clone()).or_default().latency = latency;
    }

    /// Clear all injected faults for `host`.
    pub fn heal(&self, host: &HostId) {
        self.faults.remove(host);
    }

    fn service(&self, host: &HostId) -> Result<Arc<dyn HostService>, RuntimeError> {
        self.hosts
            .read()
            .get(host)
            .and_then(Weak::upgrade)
            .ok_or_else(|| RuntimeError::unreachable(host, "no route to host"))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn call(
        &self,
        host: &HostId,
        request: HostRequest,
    ) -> Result<HostResponse, RuntimeError> {
        let fault = self.faults.get(host).map(|f| *f).unwrap_or_default();
        if let Some(latency) = fault.latency {
            tokio::time::sleep(latency).await;
        }
        if fault.unreachable {
            return Err(RuntimeError::unreachable(host, "host unreachable"));
        }

        let service = self.service(host)?;
        let frame = serde_json::to_vec(&request)
            .map_err(|e| RuntimeError::unreachable(host, format!("encode request: {}", e)))?;
        trace!(host = %host, bytes = frame.len(), "Delivering in-memory frame");
        let request: HostRequest = serde_json::from_slice(&frame)
            .map_err(|e| RuntimeError::unreachable(host, format!("decode request: {}", e)))?;

        let response = dispatch(service.as_ref(), request).await;

        let frame = serde_json::to_vec(&response)
            .map_err(|e| RuntimeError::transport(host, format!("encode response: {}", e)))?;
        serde_json::from_slice(&frame)
            .map_err(|e| RuntimeError::transport(host, format!("decode response: {}", e)))
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("hosts", &self.hosts())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_host_is_transport_error() {
        let transport = MemoryTransport::new();
        let err = transport
            .call(
                &HostId::new("nowhere"),
                HostRequest::LocationOfObject { id: "x".into() },
            )
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert!(!err.maybe_delivered());
    }

    #[tokio::test]
    async fn test_unreachable_flag() {
        let transport = MemoryTransport::new();
        let host = HostId::new("H1");
        transport.set_unreachable(&host, true);
        let err = transport
            .call(&host, HostRequest::LocationOfObject { id: "x".into() })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unreachable"));

        transport.heal(&host);
        // healed but still unregistered
        let err = transport
            .call(&host, HostRequest::LocationOfObject { id: "x".into() })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no route"));
    }
}
