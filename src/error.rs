//! Centralized error types for herald using thiserror.
//!
//! Each concern gets its own enum: configuration, templating, message
//! assembly, the SMTP session, the notification channels and the engine.

use thiserror::Error;

/// Errors related to configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load config file: {0}")]
    LoadError(String),
    #[error("invalid configuration: {0}")]
    ValidationError(String),
    #[error("invalid template in '{name}': {message}")]
    InvalidTemplate { name: String, message: String },
    #[error("invalid notification '{name}': {message}")]
    InvalidNotification { name: String, message: String },
}

/// Errors related to template rendering.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template parse failed: {message}")]
    ParseFailed { message: String },
    #[error("template render failed: {message}")]
    RenderFailed { message: String },
}

/// Errors raised while assembling an outbound message.
///
/// All of these surface before any network I/O takes place.
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("must specify at least one From address and one To address")]
    MissingParticipants,
    #[error("invalid address '{address}': {message}")]
    InvalidAddress { address: String, message: String },
    #[error("invalid header '{name}': {message}")]
    InvalidHeader { name: String, message: String },
    #[error("failed to build message: {0}")]
    Build(String),
}

/// Errors raised by the SMTP session.
///
/// The session driver returns these verbatim; it never wraps or
/// reclassifies them.
#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out during {0}")]
    Timeout(&'static str),
    #[error("connection closed by relay")]
    ConnectionClosed,
    #[error("malformed reply: {0}")]
    MalformedReply(String),
    #[error("relay rejected command: {code} {message}")]
    Rejected { code: u16, message: String },
    #[error("TLS negotiation failed: {0}")]
    Tls(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("line contains CR or LF: {0:?}")]
    InvalidLine(String),
}

impl SmtpError {
    /// Reply code when the relay answered with an unexpected status.
    pub fn code(&self) -> Option<u16> {
        match self {
            SmtpError::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Errors surfaced by a single notification channel.
///
/// These never escape the channel task; they end up in a log line and,
/// for email, a counter increment.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("message error: {0}")]
    Message(#[from] MessageError),
    #[error("smtp error: {0}")]
    Smtp(#[from] SmtpError),
    #[error("template error: {0}")]
    Template(#[from] TemplateError),
    #[error("http request failed: {0}")]
    Http(String),
    #[error("bad response status: {status}")]
    BadStatus { status: reqwest::StatusCode },
}

/// Errors that stop the incident engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to open incident stream '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read incident stream: {0}")]
    Read(#[from] std::io::Error),
}
