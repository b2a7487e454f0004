//! Service lifecycle wiring for the registry and its collaborators.

use crate::config::MetricsConfig;
use crate::error::{Diagnostic, ExporterError, Result};
use crate::exporter::HttpExporter;
use crate::maintenance;
use crate::registry::{DescriptorTable, MetricDescriptor, MetricsRegistry, Sample};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Lifecycle state of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Background tasks are not running.
    Stopped,
    /// Maintenance (and the exposition server, when enabled) is running.
    Running,
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// Owns the registry, the maintenance task, and the exposition server.
///
/// Construction is the one-time setup: the descriptor table is built from
/// configuration and fixed for the service's lifetime. Writers share the
/// registry handle and call [`MetricsRegistry::set`] from any thread.
#[derive(Debug)]
pub struct MetricsService {
    /// Configuration.
    config: MetricsConfig,
    /// Shared metric registry.
    registry: Arc<MetricsRegistry>,
    /// HTTP exposition server.
    exporter: HttpExporter,
    /// Maintenance task shutdown sender.
    maintenance_shutdown: Option<mpsc::Sender<()>>,
    /// Current status.
    status: ServiceStatus,
}

impl MetricsService {
    /// Create a service from configuration.
    #[must_use]
    pub fn new(config: MetricsConfig) -> Self {
        let table = DescriptorTable::from_config(&config.metrics);
        let registry = Arc::new(MetricsRegistry::new(config.prefix.clone(), table));
        let exporter = HttpExporter::new(config.exporter.clone(), Arc::clone(&registry));

        Self {
            config,
            registry,
            exporter,
            maintenance_shutdown: None,
            status: ServiceStatus::Stopped,
        }
    }

    /// Shared handle to the registry, for writers on other threads.
    #[must_use]
    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    /// Record one measurement. Convenience passthrough to the registry.
    pub fn set(&self, name: &str, value: f64, labels: &[&str]) {
        self.registry.set(name, value, labels);
    }

    /// Descriptors for every configured family.
    #[must_use]
    pub fn describe(&self) -> Vec<MetricDescriptor> {
        self.registry.describe()
    }

    /// Snapshot every live series.
    #[must_use]
    pub fn collect(&self) -> Vec<Sample> {
        self.registry.collect()
    }

    /// Route non-fatal diagnostics to the given channel.
    pub fn set_error_sink(&self, tx: mpsc::UnboundedSender<Diagnostic>) {
        self.registry.set_error_sink(tx);
    }

    /// Start maintenance and, when enabled, the exposition server.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is already running or the
    /// exposition listener cannot be bound.
    pub async fn start(&mut self) -> Result<()> {
        if self.status == ServiceStatus::Running {
            return Err(ExporterError::AlreadyRunning);
        }

        self.maintenance_shutdown = Some(maintenance::spawn(
            Arc::clone(&self.registry),
            self.config.retention.clone(),
        ));
        if let Err(e) = self.exporter.start().await {
            // Roll back the maintenance task so a failed start leaves
            // the service stopped.
            if let Some(tx) = self.maintenance_shutdown.take() {
                let _ = tx.send(()).await;
            }
            return Err(e);
        }

        self.status = ServiceStatus::Running;
        info!(
            prefix = %self.config.prefix,
            families = self.config.metrics.len(),
            retention = self.config.retention.enabled,
            "metrics service started"
        );
        Ok(())
    }

    /// Stop the background tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is not running.
    pub async fn stop(&mut self) -> Result<()> {
        if self.status != ServiceStatus::Running {
            return Err(ExporterError::NotRunning);
        }

        if let Some(tx) = self.maintenance_shutdown.take() {
            let _ = tx.send(()).await;
        }
        if self.exporter.is_running() {
            self.exporter.stop().await?;
        }

        self.status = ServiceStatus::Stopped;
        info!("metrics service stopped");
        Ok(())
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> ServiceStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled_exporter_config() -> MetricsConfig {
        let mut config = MetricsConfig::default();
        config.exporter.enabled = false;
        config
    }

    #[test]
    fn test_service_starts_stopped() {
        let service = MetricsService::new(MetricsConfig::default());
        assert_eq!(service.status(), ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_service_lifecycle() {
        let mut service = MetricsService::new(disabled_exporter_config());

        service.start().await.unwrap();
        assert_eq!(service.status(), ServiceStatus::Running);

        // Starting again should fail.
        assert!(service.start().await.is_err());

        service.stop().await.unwrap();
        assert_eq!(service.status(), ServiceStatus::Stopped);

        // Stopping again should fail.
        assert!(service.stop().await.is_err());
    }

    #[tokio::test]
    async fn test_set_passthrough() {
        let mut config = disabled_exporter_config();
        config.metrics = vec![crate::config::MetricConfig {
            name: "hits".to_string(),
            kind: "counter".to_string(),
            help: "hits".to_string(),
            ..crate::config::MetricConfig::default()
        }];
        let service = MetricsService::new(config);

        service.set("hits", 2.0, &[]);
        service.set("hits", 3.0, &[]);
        assert_eq!(service.registry().value("hits", &[]), Some(5.0));
        assert_eq!(service.collect().len(), 1);
        assert_eq!(service.describe().len(), 1);
    }
}
