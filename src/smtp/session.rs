//! SMTP session abstraction.
//!
//! The session driver talks to the relay only through this trait, so the
//! conversation can run against the real wire client or a recording
//! session in tests.

use async_trait::async_trait;

use super::auth::PlainAuth;
use crate::error::SmtpError;

/// TLS parameters for the STARTTLS upgrade.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsSettings {
    /// Verify the relay certificate and host name.
    pub verify_server_certificate: bool,
}

/// One command-level conversation with a relay.
///
/// Every command either succeeds or returns the error that ended it.
#[async_trait]
pub trait SmtpSession: Send {
    /// Identify the client (EHLO, falling back to HELO).
    async fn hello(&mut self, local_name: &str) -> Result<(), SmtpError>;

    /// Parameters of an extension advertised in the EHLO reply, if any.
    fn extension(&self, name: &str) -> Option<String>;

    /// Upgrade the connection with STARTTLS.
    async fn start_tls(&mut self, tls: &TlsSettings) -> Result<(), SmtpError>;

    /// Whether the connection is encrypted.
    fn is_encrypted(&self) -> bool;

    /// Authenticate with the given mechanism.
    async fn auth(&mut self, auth: &PlainAuth) -> Result<(), SmtpError>;

    /// `MAIL FROM`.
    async fn mail(&mut self, from: &str) -> Result<(), SmtpError>;

    /// `RCPT TO`.
    async fn rcpt(&mut self, to: &str) -> Result<(), SmtpError>;

    /// `DATA`: open the payload stream.
    async fn open_data(&mut self) -> Result<(), SmtpError>;

    /// Write part of the payload.
    async fn write_data(&mut self, chunk: &[u8]) -> Result<(), SmtpError>;

    /// Terminate the payload and wait for the relay to accept it.
    async fn close_data(&mut self) -> Result<(), SmtpError>;

    /// `QUIT`.
    async fn quit(&mut self) -> Result<(), SmtpError>;

    /// Release the connection. Safe to call in any state.
    async fn close(&mut self);
}
