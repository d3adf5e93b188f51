//! PLAIN authentication (RFC 4616).
//!
//! Credentials are only released to the relay host they were configured
//! for, and only over TLS unless the relay is on localhost.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::config::SecretString;
use crate::error::SmtpError;

/// Relay credentials.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::new(password.into()),
        }
    }

    /// True when neither a username nor a password was supplied.
    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.expose().is_empty()
    }
}

/// What the session knows about the relay when authentication starts.
#[derive(Debug, Clone, Copy)]
pub struct ServerInfo<'a> {
    /// Host name the connection was opened to.
    pub name: &'a str,
    /// Whether the connection is encrypted.
    pub tls: bool,
}

/// PLAIN mechanism scoped to one relay host.
#[derive(Debug, Clone)]
pub struct PlainAuth {
    identity: String,
    credentials: Credentials,
    host: String,
}

impl PlainAuth {
    pub fn new(identity: &str, credentials: Credentials, host: &str) -> Self {
        Self {
            identity: identity.to_string(),
            credentials,
            host: host.to_string(),
        }
    }

    pub fn mechanism(&self) -> &'static str {
        "PLAIN"
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Produce the base64 initial response for `AUTH PLAIN`.
    pub fn initial_response(&self, server: &ServerInfo<'_>) -> Result<String, SmtpError> {
        if !server.tls && !is_localhost(server.name) {
            return Err(SmtpError::Auth("unencrypted connection".to_string()));
        }
        if server.name != self.host {
            return Err(SmtpError::Auth("wrong host name".to_string()));
        }

        let mut raw = Vec::with_capacity(
            self.identity.len()
                + self.credentials.username.len()
                + self.credentials.password.expose().len()
                + 2,
        );
        raw.extend_from_slice(self.identity.as_bytes());
        raw.push(0);
        raw.extend_from_slice(self.credentials.username.as_bytes());
        raw.push(0);
        raw.extend_from_slice(self.credentials.password.expose().as_bytes());
        Ok(STANDARD.encode(raw))
    }
}

fn is_localhost(name: &str) -> bool {
    matches!(name, "localhost" | "127.0.0.1" | "::1")
}

/// Strip the port from a `host:port` relay address.
///
/// Bracketed IPv6 literals lose their brackets.
pub fn host_without_port(addr: &str) -> &str {
    let host = match addr.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !host.is_empty() => {
            host
        }
        _ => addr,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}
