//! Incident engine: reads incident events and hands them to the dispatcher.
//!
//! Each line of the incident stream is one JSON [`IncidentEvent`]. The
//! engine resolves the notification names it carries, launches the
//! channels through the [`Dispatcher`] and keeps the completion handles so
//! that in-flight notifications can be drained at shutdown.
//!
//! # Architecture
//!
//! ```text
//! main.rs
//!     |
//!     v
//! engine.rs (IncidentEngine)
//!     |
//!     +-- line --> IncidentEvent --> registry.resolve --> Dispatcher::notify --> JoinSet
//!     +-- EOF or cancel --> drain (bounded by drain timeout)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use herald::engine::{IncidentEngine, open_incidents};
//! use tokio_util::sync::CancellationToken;
//!
//! let engine = IncidentEngine::new(registry, dispatcher, drain_timeout);
//! let reader = open_incidents("-").await?;
//! let summary = engine.run(reader, CancellationToken::new()).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::incident::IncidentEvent;
use crate::notify::{Dispatcher, NotificationRegistry};

/// Default bound on waiting for in-flight notifications at shutdown.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Incident source name meaning standard input.
pub const STDIN_SOURCE: &str = "-";

/// Boxed line reader over the incident stream.
pub type IncidentReader = Box<dyn AsyncBufRead + Unpin + Send>;

/// Open the incident stream: a file path, or `-` for stdin.
pub async fn open_incidents(source: &str) -> Result<IncidentReader, EngineError> {
    if source == STDIN_SOURCE {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }

    let file = tokio::fs::File::open(source)
        .await
        .map_err(|e| EngineError::Open {
            path: source.to_string(),
            source: e,
        })?;
    Ok(Box::new(BufReader::new(file)))
}

/// Counts reported when the engine stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineSummary {
    /// Events parsed from the stream.
    pub events: usize,
    /// Lines that were not valid incident events.
    pub malformed: usize,
    /// Notification names that matched nothing in the registry.
    pub unknown_notifications: usize,
    /// Incident/notification pairs handed to the dispatcher.
    pub dispatched: usize,
    /// Dispatches still running when the drain timeout expired.
    pub abandoned: usize,
}

/// Reads incidents and fans them out until the stream ends or is cancelled.
pub struct IncidentEngine {
    registry: NotificationRegistry,
    dispatcher: Dispatcher,
    drain_timeout: Duration,
}

impl IncidentEngine {
    /// Create a new IncidentEngine.
    ///
    /// # Arguments
    ///
    /// * `registry` - Compiled notifications, looked up by name.
    /// * `dispatcher` - Channel fan-out.
    /// * `drain_timeout` - How long to wait for in-flight notifications at shutdown.
    pub fn new(
        registry: NotificationRegistry,
        dispatcher: Dispatcher,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            drain_timeout,
        }
    }

    pub fn registry(&self) -> &NotificationRegistry {
        &self.registry
    }

    /// Run the engine until the stream ends or `cancel` fires.
    ///
    /// Malformed lines and unknown notification names are logged and
    /// skipped. Either way the engine then drains in-flight notifications,
    /// giving up after the drain timeout.
    ///
    /// # Returns
    ///
    /// * `Ok(EngineSummary)` - Stream ended or cancelled
    /// * `Err(EngineError)` - The stream could not be read
    pub async fn run<R>(
        &self,
        reader: R,
        cancel: CancellationToken,
    ) -> Result<EngineSummary, EngineError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut pending: JoinSet<()> = JoinSet::new();
        let mut summary = EngineSummary::default();

        info!(
            notification_count = self.registry.len(),
            "Incident engine started"
        );

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown signal received, no longer reading incidents");
                    break Ok(());
                }
                Some(_) = pending.join_next(), if !pending.is_empty() => {}
                line = lines.next_line() => match line {
                    Ok(Some(line)) => self.handle_line(&line, &mut pending, &mut summary),
                    Ok(None) => {
                        debug!("Incident stream closed");
                        break Ok(());
                    }
                    Err(e) => break Err(EngineError::Read(e)),
                }
            }
        };

        summary.abandoned = self.drain(&mut pending).await;

        info!(
            events = summary.events,
            dispatched = summary.dispatched,
            malformed = summary.malformed,
            unknown_notifications = summary.unknown_notifications,
            abandoned = summary.abandoned,
            "Incident engine stopped"
        );

        result.map(|()| summary)
    }

    fn handle_line(&self, line: &str, pending: &mut JoinSet<()>, summary: &mut EngineSummary) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let event: IncidentEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                summary.malformed += 1;
                warn!(error = %e, "Skipping malformed incident event");
                return;
            }
        };
        summary.events += 1;

        let (targets, unknown) = self.registry.resolve(&event.notifications);
        for name in &unknown {
            warn!(
                alert_key = %event.incident.alert_key,
                notification = %name,
                "Unknown notification, skipping"
            );
        }
        summary.unknown_notifications += unknown.len();

        if targets.is_empty() {
            warn!(
                alert_key = %event.incident.alert_key,
                "Incident names no known notification"
            );
            return;
        }

        let incident = Arc::new(event.incident);
        for target in &targets {
            let dispatched = self.dispatcher.notify(&incident, target);
            debug!(
                alert_key = %incident.alert_key,
                notification = %target.name,
                channel_count = dispatched.len(),
                "Incident dispatched"
            );
            summary.dispatched += 1;
            pending.spawn(dispatched.wait());
        }
    }

    /// Wait for in-flight notifications, up to the drain timeout.
    ///
    /// Returns how many dispatches were still running when it gave up.
    async fn drain(&self, pending: &mut JoinSet<()>) -> usize {
        if pending.is_empty() {
            return 0;
        }

        info!(
            pending = pending.len(),
            timeout = ?self.drain_timeout,
            "Waiting for in-flight notifications"
        );

        let drained = tokio::time::timeout(self.drain_timeout, async {
            while pending.join_next().await.is_some() {}
        })
        .await;

        if drained.is_ok() {
            return 0;
        }

        let abandoned = pending.len();
        warn!(
            abandoned,
            "Drain timeout reached, abandoning in-flight notifications"
        );
        pending.abort_all();
        abandoned
    }
}

impl std::fmt::Debug for IncidentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncidentEngine")
            .field("notifications", &self.registry.names())
            .field("drain_timeout", &self.drain_timeout)
            .finish()
    }
}
