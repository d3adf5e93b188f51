//! Wire-level SMTP client over tokio.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::auth::{PlainAuth, ServerInfo, host_without_port};
use super::data::DotEncoder;
use super::reply::{Reply, ReplyBuilder};
use super::session::{SmtpSession, TlsSettings};
use super::stream::Transport;
use crate::error::SmtpError;

/// Longest reply line accepted from a relay.
const MAX_LINE_LEN: usize = 4096;

/// SMTP client connection to a relay.
///
/// Created by [`SmtpClient::connect`], which also consumes the greeting.
pub struct SmtpClient {
    stream: Option<BufReader<Transport>>,
    server_name: String,
    local_name: String,
    extensions: HashMap<String, String>,
    auth_mechanisms: Vec<String>,
    encrypted: bool,
    timeout: Option<Duration>,
    data: Option<DotEncoder>,
}

impl std::fmt::Debug for SmtpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpClient")
            .field("server_name", &self.server_name)
            .field("open", &self.stream.is_some())
            .field("encrypted", &self.encrypted)
            .field("extensions", &self.extensions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Run an I/O step, bounded by the optional deadline.
async fn within<T, F>(timeout: Option<Duration>, step: &'static str, fut: F) -> Result<T, SmtpError>
where
    F: Future<Output = Result<T, SmtpError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| SmtpError::Timeout(step))?,
        None => fut.await,
    }
}

fn check_line(line: &str) -> Result<(), SmtpError> {
    if line.contains(['\r', '\n']) {
        return Err(SmtpError::InvalidLine(line.to_string()));
    }
    Ok(())
}

impl SmtpClient {
    /// Connect to `addr` (`host:port`) and read the 220 greeting.
    ///
    /// Without a timeout the connect and greeting wait as long as the
    /// operating system allows.
    pub async fn connect(addr: &str, timeout: Option<Duration>) -> Result<Self, SmtpError> {
        let tcp = within(timeout, "connect", async {
            TcpStream::connect(addr).await.map_err(SmtpError::from)
        })
        .await?;

        let mut client = Self {
            stream: Some(BufReader::new(Transport::Plain(tcp))),
            server_name: host_without_port(addr).to_string(),
            local_name: String::new(),
            extensions: HashMap::new(),
            auth_mechanisms: Vec::new(),
            encrypted: false,
            timeout,
            data: None,
        };

        let greeting = client.read_reply().await;
        match greeting.and_then(|r| r.expect(220)) {
            Ok(reply) => {
                tracing::debug!(server = %client.server_name, greeting = %reply.message(), "Connected to relay");
                Ok(client)
            }
            Err(e) => {
                client.close().await;
                Err(e)
            }
        }
    }

    fn stream(&mut self) -> Result<&mut BufReader<Transport>, SmtpError> {
        self.stream.as_mut().ok_or(SmtpError::ConnectionClosed)
    }

    async fn read_reply(&mut self) -> Result<Reply, SmtpError> {
        let timeout = self.timeout;
        let stream = self.stream()?;
        within(timeout, "reply", async {
            let mut builder = ReplyBuilder::default();
            let mut line = String::new();
            loop {
                line.clear();
                let n = (&mut *stream)
                    .take(MAX_LINE_LEN as u64)
                    .read_line(&mut line)
                    .await
                    .map_err(SmtpError::from)?;
                if n == 0 {
                    return Err(SmtpError::ConnectionClosed);
                }
                if n == MAX_LINE_LEN && !line.ends_with('\n') {
                    return Err(SmtpError::MalformedReply(format!(
                        "reply line exceeds {} bytes",
                        MAX_LINE_LEN
                    )));
                }
                if let Some(reply) = builder.push(&line)? {
                    return Ok(reply);
                }
            }
        })
        .await
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), SmtpError> {
        let timeout = self.timeout;
        let stream = self.stream()?;
        within(timeout, "write", async {
            stream.write_all(bytes).await.map_err(SmtpError::from)?;
            stream.flush().await.map_err(SmtpError::from)
        })
        .await
    }

    /// Send one command line and check the reply code.
    async fn command(&mut self, expected: u16, line: &str) -> Result<Reply, SmtpError> {
        check_line(line)?;
        self.write_all(format!("{}\r\n", line).as_bytes()).await?;
        self.read_reply().await?.expect(expected)
    }

    async fn ehlo(&mut self, local_name: &str) -> Result<(), SmtpError> {
        let reply = self.command(250, &format!("EHLO {}", local_name)).await?;

        self.extensions.clear();
        self.auth_mechanisms.clear();
        for line in reply.lines.iter().skip(1) {
            let (key, params) = line.split_once(' ').unwrap_or((line.as_str(), ""));
            self.extensions
                .insert(key.to_ascii_uppercase(), params.to_string());
        }
        if let Some(mechanisms) = self.extensions.get("AUTH") {
            self.auth_mechanisms = mechanisms.split_whitespace().map(String::from).collect();
        }
        Ok(())
    }

    async fn helo(&mut self, local_name: &str) -> Result<(), SmtpError> {
        self.extensions.clear();
        self.auth_mechanisms.clear();
        self.command(250, &format!("HELO {}", local_name)).await?;
        Ok(())
    }
}

#[async_trait]
impl SmtpSession for SmtpClient {
    async fn hello(&mut self, local_name: &str) -> Result<(), SmtpError> {
        check_line(local_name)?;
        self.local_name = local_name.to_string();
        match self.ehlo(local_name).await {
            Ok(()) => Ok(()),
            Err(SmtpError::Rejected { code, .. }) => {
                tracing::debug!(code, "EHLO rejected, falling back to HELO");
                self.helo(local_name).await
            }
            Err(e) => Err(e),
        }
    }

    fn extension(&self, name: &str) -> Option<String> {
        self.extensions.get(&name.to_ascii_uppercase()).cloned()
    }

    async fn start_tls(&mut self, tls: &TlsSettings) -> Result<(), SmtpError> {
        if self.encrypted {
            return Err(SmtpError::Tls("connection already encrypted".to_string()));
        }
        self.command(220, "STARTTLS").await?;

        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(!tls.verify_server_certificate)
            .danger_accept_invalid_hostnames(!tls.verify_server_certificate)
            .build()
            .map_err(|e| SmtpError::Tls(e.to_string()))?;
        let connector = tokio_native_tls::TlsConnector::from(connector);

        let tcp = match self.stream.take().map(BufReader::into_inner) {
            Some(Transport::Plain(tcp)) => tcp,
            Some(Transport::Tls(_)) | None => return Err(SmtpError::ConnectionClosed),
        };

        let server_name = self.server_name.clone();
        let stream = within(self.timeout, "TLS handshake", async {
            connector
                .connect(&server_name, tcp)
                .await
                .map_err(|e| SmtpError::Tls(e.to_string()))
        })
        .await?;

        self.stream = Some(BufReader::new(Transport::Tls(Box::new(stream))));
        self.encrypted = true;
        tracing::debug!(server = %self.server_name, "Connection upgraded to TLS");

        // Extensions may differ once encrypted.
        let local_name = self.local_name.clone();
        self.ehlo(&local_name).await
    }

    fn is_encrypted(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.get_ref().is_tls())
    }

    async fn auth(&mut self, auth: &PlainAuth) -> Result<(), SmtpError> {
        let info = ServerInfo {
            name: &self.server_name,
            tls: self.encrypted,
        };
        let response = auth.initial_response(&info)?;

        let mechanism = auth.mechanism();
        if !self.auth_mechanisms.is_empty()
            && !self
                .auth_mechanisms
                .iter()
                .any(|m| m.eq_ignore_ascii_case(mechanism))
        {
            return Err(SmtpError::Auth(format!(
                "relay does not offer {} (offers {})",
                mechanism,
                self.auth_mechanisms.join(" ")
            )));
        }

        // Never traced: the line carries the credentials.
        let reply = self
            .command(0, &format!("AUTH {} {}", mechanism, response))
            .await?;
        match reply.code {
            235 => Ok(()),
            334 => {
                // PLAIN sends everything up front; a challenge means the
                // relay wants something else. Cancel the exchange.
                let _ = self.command(0, "*").await;
                Err(SmtpError::Auth("unexpected server challenge".to_string()))
            }
            code => Err(SmtpError::Rejected {
                code,
                message: reply.message(),
            }),
        }
    }

    async fn mail(&mut self, from: &str) -> Result<(), SmtpError> {
        check_line(from)?;
        let mut line = format!("MAIL FROM:<{}>", from);
        if self.extensions.contains_key("8BITMIME") {
            line.push_str(" BODY=8BITMIME");
        }
        self.command(250, &line).await?;
        Ok(())
    }

    async fn rcpt(&mut self, to: &str) -> Result<(), SmtpError> {
        check_line(to)?;
        self.command(25, &format!("RCPT TO:<{}>", to)).await?;
        Ok(())
    }

    async fn open_data(&mut self) -> Result<(), SmtpError> {
        self.command(354, "DATA").await?;
        self.data = Some(DotEncoder::default());
        Ok(())
    }

    async fn write_data(&mut self, chunk: &[u8]) -> Result<(), SmtpError> {
        let encoder = self
            .data
            .as_mut()
            .ok_or_else(|| SmtpError::MalformedReply("DATA not open".to_string()))?;
        let mut out = Vec::with_capacity(chunk.len());
        encoder.encode(chunk, &mut out);
        self.write_all(&out).await
    }

    async fn close_data(&mut self) -> Result<(), SmtpError> {
        let encoder = self
            .data
            .take()
            .ok_or_else(|| SmtpError::MalformedReply("DATA not open".to_string()))?;
        let mut out = Vec::with_capacity(5);
        encoder.finish(&mut out);
        self.write_all(&out).await?;
        self.read_reply().await?.expect(250)?;
        Ok(())
    }

    async fn quit(&mut self) -> Result<(), SmtpError> {
        self.command(221, "QUIT").await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = within(self.timeout, "close", async {
                stream.shutdown().await.map_err(SmtpError::from)
            })
            .await;
            tracing::trace!(server = %self.server_name, "Relay connection closed");
        }
    }
}
