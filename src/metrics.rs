//! Email delivery counters and Prometheus exposition.
//!
//! The dispatcher only sees the [`EmailMetrics`] trait. Production code
//! records into the global `metrics` recorder through
//! [`PrometheusMetrics`]; tests inject [`EmailCounters`] and read the
//! values back.

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Counter incremented for each email accepted by the relay.
pub const EMAIL_SENT_TOTAL: &str = "herald_email_sent_total";

/// Counter incremented for each email that could not be delivered.
pub const EMAIL_SENT_FAILED_TOTAL: &str = "herald_email_sent_failed_total";

/// Sink for the email sent/failed counters.
///
/// Implementations must tolerate concurrent increments from many channel
/// tasks.
pub trait EmailMetrics: Send + Sync {
    fn email_sent(&self);
    fn email_failed(&self);
}

/// Records into the process-wide `metrics` recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl EmailMetrics for PrometheusMetrics {
    fn email_sent(&self) {
        metrics::counter!(EMAIL_SENT_TOTAL).increment(1);
    }

    fn email_failed(&self) {
        metrics::counter!(EMAIL_SENT_FAILED_TOTAL).increment(1);
    }
}

/// In-process atomic counters.
#[derive(Debug, Default)]
pub struct EmailCounters {
    sent: AtomicU64,
    failed: AtomicU64,
}

impl EmailCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

impl EmailMetrics for EmailCounters {
    fn email_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    fn email_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Register all metric descriptions for Prometheus.
///
/// Called once at startup after the recorder is installed.
/// Descriptions provide HELP text in the Prometheus output.
pub fn register_metric_descriptions() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        EMAIL_SENT_TOTAL,
        "Total number of email notifications accepted by the relay"
    );
    describe_counter!(
        EMAIL_SENT_FAILED_TOTAL,
        "Total number of email notifications that failed to send"
    );
    describe_gauge!(
        "herald_build_info",
        "Build information with version label (always 1)"
    );
}

/// Initialize all known metrics so they show up in `/metrics` before any
/// email is sent.
pub fn initialize_metrics() {
    use metrics::{counter, gauge};

    gauge!("herald_build_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    counter!(EMAIL_SENT_TOTAL).absolute(0);
    counter!(EMAIL_SENT_FAILED_TOTAL).absolute(0);

    tracing::debug!("Metrics initialized to zero");
}

/// Metrics server for Prometheus exposition.
///
/// Serves metrics on `/metrics` until cancelled.
pub struct MetricsServer {
    port: u16,
    /// Signaled once the recorder is installed, so callers can avoid
    /// emitting metrics that would otherwise be lost.
    ready_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MetricsServer {
    /// Create a new metrics server bound to the given port.
    ///
    /// Use port 0 to let the OS assign an available port.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ready_tx: None,
        }
    }

    /// Create a metrics server that signals `ready_tx` once the recorder
    /// is installed. The sender is dropped unsent if installation fails.
    pub fn with_ready_signal(port: u16, ready_tx: tokio::sync::oneshot::Sender<()>) -> Self {
        Self {
            port,
            ready_tx: Some(ready_tx),
        }
    }

    /// Returns the configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Install the global recorder and serve until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter cannot be installed (port in use,
    /// or a recorder already present in this process).
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();

        // The recorder can only be installed once per process.
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

        register_metric_descriptions();
        initialize_metrics();

        if let Some(tx) = self.ready_tx {
            let _ = tx.send(());
        }

        info!(port = self.port, "Metrics server started on /metrics");

        cancel.cancelled().await;

        info!("Metrics server shutting down");

        Ok(())
    }
}
