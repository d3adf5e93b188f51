//! Email channel.
//!
//! Builds the message, hands it to a [`MailTransport`] and records the
//! outcome in the sent/failed counters.
//!
//! # Testability
//!
//! The transport is a trait object:
//! - Production: [`RelayTransport`] drives an SMTP session against the relay
//! - Testing: a mock transport records what would have been sent

use crate::error::{NotifyError, SmtpError};
use crate::incident::IncidentState;
use crate::metrics::EmailMetrics;
use crate::notify::NotificationTarget;
use crate::notify::message::build_message;
use crate::smtp::{self, Envelope, Relay, SessionReport};
use async_trait::async_trait;
use std::sync::Arc;

/// Header naming the server that sent the notification.
pub const SERVER_HEADER: &str = "X-Herald-Server";

// =============================================================================
// MailTransport Trait
// =============================================================================

/// Delivers one raw message to its envelope recipients.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Send `message` from `from` to every address in `to`.
    ///
    /// # Returns
    ///
    /// * `Ok(SessionReport)` - The relay accepted the message
    /// * `Err(SmtpError)` - The session failed at some step
    async fn send(
        &self,
        from: &str,
        to: &[String],
        message: &[u8],
    ) -> Result<SessionReport, SmtpError>;
}

/// Real transport: one SMTP session per message.
#[derive(Debug, Clone)]
pub struct RelayTransport {
    relay: Relay,
}

impl RelayTransport {
    pub fn new(relay: Relay) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl MailTransport for RelayTransport {
    async fn send(
        &self,
        from: &str,
        to: &[String],
        message: &[u8],
    ) -> Result<SessionReport, SmtpError> {
        smtp::send_mail(
            &self.relay,
            Envelope {
                from,
                to,
                message,
            },
        )
        .await
    }
}

/// Outcome of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub report: SessionReport,
    pub subject_bytes: usize,
    pub body_bytes: usize,
}

// =============================================================================
// EmailChannel
// =============================================================================

/// Sends incident emails through a transport.
pub struct EmailChannel {
    transport: Arc<dyn MailTransport>,
    from: String,
    hostname: String,
    metrics: Arc<dyn EmailMetrics>,
}

impl std::fmt::Debug for EmailChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailChannel")
            .field("from", &self.from)
            .field("hostname", &self.hostname)
            .finish()
    }
}

impl EmailChannel {
    /// Create a channel that delivers through `relay`.
    ///
    /// # Arguments
    ///
    /// * `relay` - Mail relay settings
    /// * `from` - Sender address
    /// * `hostname` - Value of the `X-Herald-Server` header
    /// * `metrics` - Sent/failed counter sink
    pub fn new(
        relay: Relay,
        from: impl Into<String>,
        hostname: impl Into<String>,
        metrics: Arc<dyn EmailMetrics>,
    ) -> Self {
        Self::with_transport(Arc::new(RelayTransport::new(relay)), from, hostname, metrics)
    }

    /// Create a channel with a custom transport.
    pub fn with_transport(
        transport: Arc<dyn MailTransport>,
        from: impl Into<String>,
        hostname: impl Into<String>,
        metrics: Arc<dyn EmailMetrics>,
    ) -> Self {
        Self {
            transport,
            from: from.into(),
            hostname: hostname.into(),
            metrics,
        }
    }

    /// Build and send the email for one incident.
    ///
    /// Message errors surface before the transport is touched.
    pub async fn send(
        &self,
        incident: &IncidentState,
        target: &NotificationTarget,
    ) -> Result<Delivery, NotifyError> {
        let message = build_message(
            &self.from,
            &target.recipients,
            incident,
            target.payload.use_body,
            vec![(SERVER_HEADER.to_string(), self.hostname.clone())],
        )?;
        let raw = message.to_bytes()?;

        let report = self
            .transport
            .send(&message.sender, &message.recipients, &raw)
            .await?;

        Ok(Delivery {
            report,
            subject_bytes: message.subject.len(),
            body_bytes: message.html_body.len(),
        })
    }

    /// Send, then log and count the outcome. Never fails.
    pub async fn deliver(&self, incident: &IncidentState, target: &NotificationTarget) {
        match self.send(incident, target).await {
            Ok(delivery) => {
                self.metrics.email_sent();
                tracing::info!(
                    alert_key = %incident.alert_key,
                    recipients = %target.recipients.merged().join(","),
                    subject_bytes = delivery.subject_bytes,
                    body_bytes = delivery.body_bytes,
                    encrypted = delivery.report.encrypted,
                    "Email notification sent"
                );
            }
            Err(e) => {
                self.metrics.email_failed();
                tracing::error!(
                    alert_key = %incident.alert_key,
                    from = %self.from,
                    recipients = %target.recipients.merged().join(","),
                    error = %e,
                    "Failed to send email notification"
                );
            }
        }
    }
}
