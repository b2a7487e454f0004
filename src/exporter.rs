//! HTTP exposition server.

use crate::config::ExporterConfig;
use crate::error::{ExporterError, Result};
use crate::registry::MetricsRegistry;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Serves registry snapshots in Prometheus text exposition format.
#[derive(Debug)]
pub struct HttpExporter {
    /// Configuration.
    config: ExporterConfig,
    /// Metrics registry.
    registry: Arc<MetricsRegistry>,
    /// Shutdown sender.
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl HttpExporter {
    /// Create a new exporter.
    #[must_use]
    pub fn new(config: ExporterConfig, registry: Arc<MetricsRegistry>) -> Self {
        Self {
            config,
            registry,
            shutdown_tx: None,
        }
    }

    /// Start the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter is already running or the listen
    /// address cannot be bound.
    pub async fn start(&mut self) -> Result<()> {
        if self.shutdown_tx.is_some() {
            return Err(ExporterError::AlreadyRunning);
        }

        if !self.config.enabled {
            info!("exposition server is disabled");
            return Ok(());
        }

        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ExporterError::Bind(format!("{addr}: {e}")))?;

        info!(%addr, path = %self.config.path, "exposition server listening");

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let registry = Arc::clone(&self.registry);
        let metrics_path = self.config.path.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, remote_addr)) => {
                                debug!(%remote_addr, "new scrape connection");

                                let registry = Arc::clone(&registry);
                                let metrics_path = metrics_path.clone();

                                tokio::spawn(async move {
                                    let io = TokioIo::new(stream);

                                    let service = service_fn(move |req| {
                                        let registry = Arc::clone(&registry);
                                        let metrics_path = metrics_path.clone();

                                        async move {
                                            handle_request(req, &registry, &metrics_path)
                                        }
                                    });

                                    if let Err(e) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .await
                                    {
                                        debug!("connection error: {e}");
                                    }
                                });
                            }
                            Err(e) => {
                                error!("accept error: {e}");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("exposition server shutting down");
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    /// Stop the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter is not running.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
            Ok(())
        } else {
            Err(ExporterError::NotRunning)
        }
    }

    /// Check if the server is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// Get the bind address.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.socket_addr()
    }
}

/// Handle an HTTP request.
fn handle_request(
    req: Request<Incoming>,
    registry: &MetricsRegistry,
    metrics_path: &str,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path();

    if path == metrics_path {
        let body = registry.encode_text();
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
            .body(Full::new(Bytes::from(body)))
            .expect("response build failed"))
    } else if path == "/health" || path == "/healthz" {
        Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("OK")))
            .expect("response build failed"))
    } else {
        Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("response build failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DescriptorTable;

    fn test_registry() -> Arc<MetricsRegistry> {
        Arc::new(MetricsRegistry::new("test", DescriptorTable::default()))
    }

    #[test]
    fn test_exporter_creation() {
        let exporter = HttpExporter::new(ExporterConfig::default(), test_registry());
        assert!(!exporter.is_running());
        assert_eq!(exporter.bind_addr().port(), 9090);
    }

    #[tokio::test]
    async fn test_exporter_start_stop() {
        let config = ExporterConfig {
            port: 19321,
            ..ExporterConfig::default()
        };
        let mut exporter = HttpExporter::new(config, test_registry());

        exporter.start().await.unwrap();
        assert!(exporter.is_running());

        // Starting again should fail.
        assert!(exporter.start().await.is_err());

        exporter.stop().await.unwrap();

        // Stopping again should fail.
        assert!(exporter.stop().await.is_err());
    }

    #[tokio::test]
    async fn test_exporter_disabled() {
        let config = ExporterConfig {
            enabled: false,
            ..ExporterConfig::default()
        };
        let mut exporter = HttpExporter::new(config, test_registry());

        // Should succeed but not actually start.
        exporter.start().await.unwrap();
        assert!(!exporter.is_running());
    }
}
