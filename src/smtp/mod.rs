//! SMTP session driver.
//!
//! Delivers one raw message to a relay in a single linear conversation:
//!
//! ```text
//! connect -> hello -> [STARTTLS -> [AUTH]] -> MAIL FROM -> RCPT TO* -> DATA -> QUIT
//! ```
//!
//! - STARTTLS is used whenever the relay advertises it.
//! - AUTH is only attempted over the upgraded connection and only when
//!   credentials are configured. A rejected AUTH is a soft failure: it is
//!   logged and the session continues unauthenticated.
//! - Any other failure ends the conversation and is returned unchanged.
//! - The connection is closed exactly once on every path out.
//!
//! There is no retry and, unless [`Relay::timeout`] is set, no deadline.

mod auth;
mod client;
mod data;
mod reply;
mod session;
mod stream;

pub use auth::{Credentials, PlainAuth, ServerInfo, host_without_port};
pub use client::SmtpClient;
pub use reply::Reply;
pub use session::{SmtpSession, TlsSettings};

use std::time::Duration;

use crate::error::SmtpError;

/// Name the client identifies itself with.
pub const DEFAULT_HELLO_NAME: &str = "localhost";

/// Everything needed to reach and talk to a relay.
#[derive(Debug, Clone)]
pub struct Relay {
    /// `host:port` of the relay.
    pub address: String,
    /// Optional credentials for PLAIN authentication.
    pub credentials: Option<Credentials>,
    /// Verify the relay certificate during STARTTLS.
    pub verify_server_certificate: bool,
    /// Optional per-operation deadline. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Client identification sent with EHLO/HELO.
    pub hello_name: String,
}

impl Relay {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            credentials: None,
            verify_server_certificate: false,
            timeout: None,
            hello_name: DEFAULT_HELLO_NAME.to_string(),
        }
    }

    /// Host part of the relay address; credentials are scoped to it.
    pub fn host(&self) -> &str {
        host_without_port(&self.address)
    }

    fn tls_settings(&self) -> TlsSettings {
        TlsSettings {
            verify_server_certificate: self.verify_server_certificate,
        }
    }

    fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref().filter(|c| !c.is_empty())
    }
}

/// Result of the optional authentication step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthOutcome {
    /// No TLS upgrade happened or no credentials were configured.
    #[default]
    NotAttempted,
    Accepted,
    /// The relay refused the credentials; the session went on without them.
    Rejected(String),
}

/// What a successful session negotiated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionReport {
    pub encrypted: bool,
    pub auth: AuthOutcome,
}

/// Envelope sender, recipients and the raw message.
#[derive(Debug, Clone, Copy)]
pub struct Envelope<'a> {
    pub from: &'a str,
    pub to: &'a [String],
    pub message: &'a [u8],
}

/// Deliver `message` through the relay.
///
/// Connects, drives the conversation and closes the connection before
/// returning, whatever the outcome.
pub async fn send_mail(relay: &Relay, envelope: Envelope<'_>) -> Result<SessionReport, SmtpError> {
    let client = SmtpClient::connect(&relay.address, relay.timeout).await?;
    run_session(client, relay, envelope).await
}

/// Drive an already-connected session, then close it.
pub async fn run_session<S: SmtpSession>(
    mut session: S,
    relay: &Relay,
    envelope: Envelope<'_>,
) -> Result<SessionReport, SmtpError> {
    let result = converse(&mut session, relay, envelope).await;
    session.close().await;
    result
}

async fn converse<S: SmtpSession + ?Sized>(
    session: &mut S,
    relay: &Relay,
    envelope: Envelope<'_>,
) -> Result<SessionReport, SmtpError> {
    let mut report = SessionReport::default();

    session.hello(&relay.hello_name).await?;

    if session.extension("STARTTLS").is_some() {
        session.start_tls(&relay.tls_settings()).await?;
        report.encrypted = session.is_encrypted();

        if let Some(credentials) = relay.credentials().filter(|_| report.encrypted) {
            let auth = PlainAuth::new("", credentials.clone(), relay.host());
            report.auth = match session.auth(&auth).await {
                Ok(()) => AuthOutcome::Accepted,
                Err(e) => {
                    tracing::warn!(
                        relay = %relay.address,
                        error = %e,
                        "SMTP authentication failed, continuing unauthenticated"
                    );
                    AuthOutcome::Rejected(e.to_string())
                }
            };
        }
    }

    session.mail(envelope.from).await?;
    for recipient in envelope.to {
        session.rcpt(recipient).await?;
    }

    session.open_data().await?;
    session.write_data(envelope.message).await?;
    session.close_data().await?;

    session.quit().await?;
    Ok(report)
}
