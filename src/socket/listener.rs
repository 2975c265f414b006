//! Unix socket listener.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::controller::ApiController;
use crate::error::{GatewayError, ProtocolErrorKind};

use super::handle_connection;

/// Connection metrics for monitoring.
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    /// Total requests processed.
    pub requests_total: AtomicU64,
    /// Requests answered with a status of 400 or above.
    pub requests_failed: AtomicU64,
    /// Currently active connections.
    pub active_connections: AtomicUsize,
}

impl ConnectionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, success: bool) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn failed_requests(&self) -> u64 {
        self.requests_failed.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }
}

/// Unix socket server.
pub struct SocketListener {
    listener: UnixListener,
    settings: Arc<Settings>,
    controller: Arc<ApiController>,
    metrics: Arc<ConnectionMetrics>,
    connection_semaphore: Arc<Semaphore>,
}

impl SocketListener {
    /// Create and bind a new socket listener.
    pub async fn bind(
        settings: Arc<Settings>,
        controller: Arc<ApiController>,
    ) -> Result<Self, GatewayError> {
        let socket_path = &settings.socket.path;

        // Never follow a symlink at the socket path
        if let Ok(metadata) = std::fs::symlink_metadata(socket_path) {
            if metadata.file_type().is_symlink() {
                return Err(GatewayError::Socket {
                    message: format!(
                        "Socket path {} is a symlink, refusing to remove it",
                        socket_path.display()
                    ),
                });
            }

            std::fs::remove_file(socket_path).map_err(|e| GatewayError::Socket {
                message: format!(
                    "Failed to remove existing socket file {}: {}",
                    socket_path.display(),
                    e
                ),
            })?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GatewayError::Socket {
                message: format!(
                    "Failed to create socket directory {}: {}",
                    parent.display(),
                    e
                ),
            })?;
        }

        let listener = UnixListener::bind(socket_path).map_err(|e| GatewayError::Socket {
            message: format!("Failed to bind to socket {}: {}", socket_path.display(), e),
        })?;

        Self::set_socket_permissions(socket_path, &settings.socket.permissions)?;

        let connection_semaphore = Arc::new(Semaphore::new(settings.limits.max_concurrent_requests));
        info!(
            path = %socket_path.display(),
            max_connections = settings.limits.max_concurrent_requests,
            "Socket listener bound"
        );

        Ok(Self {
            listener,
            settings,
            controller,
            metrics: Arc::new(ConnectionMetrics::new()),
            connection_semaphore,
        })
    }

    pub fn metrics(&self) -> Arc<ConnectionMetrics> {
        Arc::clone(&self.metrics)
    }

    fn set_socket_permissions(path: &Path, permissions_str: &str) -> Result<(), GatewayError> {
        let mode = u32::from_str_radix(permissions_str, 8).map_err(|e| GatewayError::Socket {
            message: format!("Invalid socket permissions '{}': {}", permissions_str, e),
        })?;

        let permissions = std::fs::Permissions::from_mode(mode);
        std::fs::set_permissions(path, permissions).map_err(|e| GatewayError::Socket {
            message: format!(
                "Failed to set socket permissions on {}: {}",
                path.display(),
                e
            ),
        })?;

        Ok(())
    }

    /// Accept connections until `shutdown` is notified.
    ///
    /// Connections already accepted keep running; use
    /// [`wait_for_drain`](Self::wait_for_drain) to wait for them.
    pub async fn run(&self, shutdown: Arc<Notify>) -> Result<(), GatewayError> {
        info!("Socket listener running, waiting for connections...");

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let permit = match self.connection_semaphore.clone().try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    warn!(
                                        max = self.settings.limits.max_concurrent_requests,
                                        "Connection limit reached, rejecting connection"
                                    );
                                    continue;
                                }
                            };

                            let settings = Arc::clone(&self.settings);
                            let controller = Arc::clone(&self.controller);
                            let metrics = Arc::clone(&self.metrics);

                            metrics.active_connections.fetch_add(1, Ordering::Relaxed);
                            debug!(active = metrics.active(), "New connection accepted");

                            tokio::spawn(async move {
                                let _permit = permit;
                                let result = handle_connection(
                                    stream,
                                    settings,
                                    controller,
                                    Arc::clone(&metrics),
                                )
                                .await;

                                if let Err(e) = &result {
                                    if !matches!(
                                        e,
                                        GatewayError::Protocol {
                                            kind: ProtocolErrorKind::ConnectionClosed
                                        }
                                    ) {
                                        error!(error = %e, "Connection handler error");
                                    }
                                }

                                metrics.active_connections.fetch_sub(1, Ordering::Relaxed);
                                debug!(
                                    active = metrics.active(),
                                    success = result.is_ok(),
                                    "Connection closed"
                                );
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown.notified() => {
                    info!("Shutdown signal received, stopping listener");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Wait for all active connections to drain.
    pub async fn wait_for_drain(&self) {
        let poll_interval = std::time::Duration::from_millis(100);

        while self.metrics.active() > 0 {
            debug!(
                active = self.metrics.active(),
                "Waiting for connections to drain"
            );
            tokio::time::sleep(poll_interval).await;
        }

        info!("All connections drained");
    }
}
