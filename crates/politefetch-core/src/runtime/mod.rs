//! Process-wide runtime composing the host registry, fetch engine, and
//! metrics into a single handle (§4.2, §5 "Lifecycle").

use std::sync::Arc;
use std::time::Duration;

use crate::config::{self, defaults, Config};
use crate::error::ConfigError;
use crate::fetch::FetchEngine;
use crate::fetch::transport::{ReqwestTransport, Transport};
use crate::host::Registry;
use crate::metrics::MetricsRegistry;

/// Owns everything a job needs to issue polite requests: the per-host
/// registry (rate limiters + circuit breakers), the fetch engine, and
/// process-wide metrics.
pub struct FetcherRuntime {
    pub config: Config,
    pub registry: Arc<Registry>,
    pub engine: Arc<FetchEngine>,
    pub metrics: Arc<MetricsRegistry>,
}

impl FetcherRuntime {
    /// Loads configuration (defaults → TOML → env → validation) and wires
    /// up the registry, transport, and fetch engine.
    pub fn init(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let config = config::load(config_path)?;
        tracing::info!(
            max_concurrency = config.max_concurrency,
            default_rps = config.rate_limit.default_rps,
            "configuration loaded"
        );
        let registry = Registry::new(config.clone());
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let engine = Arc::new(FetchEngine::with_registry(registry.clone(), transport, metrics.clone()));
        Ok(Self { config, registry, engine, metrics })
    }

    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        let registry = Registry::new(config.clone());
        let metrics = Arc::new(MetricsRegistry::new());
        let engine = Arc::new(FetchEngine::with_registry(registry.clone(), transport, metrics.clone()));
        Self { config, registry, engine, metrics }
    }

    /// Drains per-host state within the configured shutdown window
    /// (§4.2/§5), called on SIGINT/graceful shutdown.
    pub async fn shutdown(&self) {
        tracing::info!("runtime shutting down");
        self.registry
            .shutdown(Duration::from_millis(defaults::SHUTDOWN_DRAIN_TIMEOUT_MS))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::transport::{RawRequest, RawResponse, TransportError};
    use async_trait::async_trait;

    struct NeverCalled;

    #[async_trait]
    impl Transport for NeverCalled {
        async fn send(&self, _request: RawRequest<'_>) -> Result<RawResponse, TransportError> {
            unreachable!("not exercised in this test")
        }
    }

    #[tokio::test]
    async fn shutdown_drains_without_panicking() {
        let runtime = FetcherRuntime::with_transport(Config::default(), Arc::new(NeverCalled));
        runtime.shutdown().await;
    }
}
