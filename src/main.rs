//! herald - Incident notification dispatcher.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use herald::cli::{Cli, LogFormat};
use herald::config::{Config, RuntimeConfig};
use herald::{
    Dispatcher, EmailChannel, HttpChannel, IncidentEngine, MetricsServer, PrometheusMetrics,
    open_incidents,
};

/// Initialize the tracing subscriber with the specified log format.
///
/// - `LogFormat::Text`: Human-readable format for journalctl
/// - `LogFormat::Json`: Structured JSON format for log aggregation
fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    match format {
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .flatten_event(true)
                .with_env_filter(filter)
                .init();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_format);

    info!(config_path = %cli.config.display(), "Loading configuration");

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, path = %cli.config.display(), "Failed to load configuration");
            std::process::exit(1);
        }
    };

    // Fail fast on anything the config can tell us before touching the network.
    info!("Validating configuration");
    if let Err(errors) = config.validate() {
        for e in &errors {
            error!(error = %e, "Configuration validation error");
        }
        error!(
            error_count = errors.len(),
            "Configuration validation failed"
        );
        std::process::exit(1);
    }

    let runtime_config = match config.compile(&cli.config) {
        Ok(runtime_config) => runtime_config,
        Err(errors) => {
            for e in &errors {
                error!(error = %e, "Configuration compilation error");
            }
            error!(
                error_count = errors.len(),
                "Configuration compilation failed"
            );
            std::process::exit(1);
        }
    };

    if cli.validate {
        print_summary(&cli, &runtime_config);
        return Ok(());
    }

    info!(
        config_path = %cli.config.display(),
        incidents = %cli.incidents,
        "herald starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(run(cli, runtime_config));
    // A pending stdin read sits on a blocking thread and would hold up a plain drop.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

fn print_summary(cli: &Cli, runtime_config: &RuntimeConfig) {
    println!("Configuration is valid: {}", cli.config.display());
    match &runtime_config.relay {
        Some(relay) => println!("  SMTP relay: {}", relay.address),
        None => println!("  SMTP relay: none (no email notifications)"),
    }
    println!("  Server header: {}", runtime_config.hostname);
    println!(
        "  Notifications: {} ({})",
        runtime_config.notifications.len(),
        runtime_config.notifications.names().join(", ")
    );
    println!(
        "  Metrics: {} (port {})",
        if runtime_config.metrics.enabled {
            "enabled"
        } else {
            "disabled"
        },
        runtime_config.metrics.port
    );
}

/// Main async entry point.
async fn run(cli: Cli, runtime_config: RuntimeConfig) -> Result<()> {
    let RuntimeConfig {
        relay,
        email_from,
        hostname,
        http_timeout,
        metrics,
        notifications,
        ..
    } = runtime_config;

    let cancel = CancellationToken::new();

    let metrics_handle = if metrics.enabled {
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
        let server = MetricsServer::with_ready_signal(metrics.port, ready_tx);
        let cancel_metrics = cancel.clone();
        info!(port = metrics.port, "Starting metrics server");
        let handle = tokio::spawn(async move {
            if let Err(e) = server.run(cancel_metrics).await {
                error!(error = %e, "Metrics server error");
            }
        });
        // Counters recorded before the recorder is installed are lost.
        if ready_rx.await.is_err() {
            warn!("Metrics server failed to start, email counters will not be exported");
        }
        Some(handle)
    } else {
        info!("Metrics server disabled");
        None
    };

    let email = relay.map(|relay| {
        info!(relay = %relay.address, from = %email_from, "Email channel enabled");
        EmailChannel::new(relay, email_from, hostname, Arc::new(PrometheusMetrics))
    });
    let http = HttpChannel::new(http_timeout)?;
    let engine = IncidentEngine::new(notifications, Dispatcher::new(email, http), cli.drain_timeout);

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c signal");
            return;
        }
        info!("Received shutdown signal, initiating graceful shutdown");
        cancel_clone.cancel();
    });

    let reader = open_incidents(&cli.incidents).await?;
    let engine_result = engine.run(reader, cancel.clone()).await;

    cancel.cancel();
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }

    match engine_result {
        Ok(_) => {
            info!("herald shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Engine error");
            Err(anyhow::anyhow!("Engine error: {}", e))
        }
    }
}
