//! Scripted fake SMTP relay for integration tests.
//!
//! Listens on an ephemeral localhost port, answers each connection
//! according to a [`RelayScript`] and records every command it receives.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::task::JoinHandle;

/// How the fake relay answers.
#[derive(Debug, Clone)]
pub struct RelayScript {
    pub greeting: String,
    /// Extension lines advertised after the EHLO greeting line.
    pub extensions: Vec<String>,
    /// Answer EHLO with 502 so the client falls back to HELO.
    pub reject_ehlo: bool,
    pub starttls_reply: String,
    /// Answer to `AUTH`.
    pub auth_reply: String,
    /// Recipients answered with 550.
    pub reject_rcpt: Vec<String>,
    pub data_reply: String,
}

impl Default for RelayScript {
    fn default() -> Self {
        Self {
            greeting: "220 fake.relay ESMTP ready".to_string(),
            extensions: vec!["SIZE 10240000".to_string()],
            reject_ehlo: false,
            starttls_reply: "454 4.7.0 TLS not available".to_string(),
            auth_reply: "235 2.7.0 authentication successful".to_string(),
            reject_rcpt: Vec::new(),
            data_reply: "250 2.0.0 queued".to_string(),
        }
    }
}

/// One message accepted after `DATA`.
#[derive(Debug, Clone, Default)]
pub struct ReceivedMail {
    pub from: String,
    pub to: Vec<String>,
    /// Payload as seen on the wire, dot-stuffing included, terminator excluded.
    pub data: String,
}

#[derive(Debug, Default)]
struct RelayState {
    transcript: Vec<String>,
    mails: Vec<ReceivedMail>,
    connections: usize,
    closed: usize,
}

pub struct FakeRelay {
    addr: SocketAddr,
    state: Arc<Mutex<RelayState>>,
    handle: JoinHandle<()>,
}

impl FakeRelay {
    pub async fn start(script: RelayScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake relay");
        let addr = listener.local_addr().expect("fake relay address");
        let state = Arc::new(Mutex::new(RelayState::default()));
        let script = Arc::new(script);

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accept_state.lock().unwrap().connections += 1;
                let script = script.clone();
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let (read, write) = socket.into_split();
                    serve(BufReader::new(read), write, &script, &state).await;
                    state.lock().unwrap().closed += 1;
                });
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    /// `host:port` to hand to the client.
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Command lines received, in order, across all connections.
    pub fn transcript(&self) -> Vec<String> {
        self.state.lock().unwrap().transcript.clone()
    }

    pub fn mails(&self) -> Vec<ReceivedMail> {
        self.state.lock().unwrap().mails.clone()
    }

    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().connections
    }

    /// Wait until `count` connections have ended, for at most two seconds.
    pub async fn wait_closed(&self, count: usize) -> bool {
        for _ in 0..200 {
            if self.state.lock().unwrap().closed >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Drop for FakeRelay {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn angle_address(command: &str) -> String {
    command
        .split_once('<')
        .and_then(|(_, rest)| rest.split_once('>'))
        .map(|(address, _)| address.to_string())
        .unwrap_or_default()
}

fn ehlo_reply(extensions: &[String]) -> String {
    let mut lines = vec!["fake.relay".to_string()];
    lines.extend(extensions.iter().cloned());
    let last = lines.len() - 1;
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("250{}{}\r\n", if i == last { ' ' } else { '-' }, line))
        .collect()
}

async fn reply(write: &mut OwnedWriteHalf, line: &str) -> bool {
    let line = if line.ends_with("\r\n") {
        line.to_string()
    } else {
        format!("{}\r\n", line)
    };
    write.write_all(line.as_bytes()).await.is_ok()
}

async fn serve(
    mut read: BufReader<tokio::net::tcp::OwnedReadHalf>,
    mut write: OwnedWriteHalf,
    script: &RelayScript,
    state: &Mutex<RelayState>,
) {
    if !reply(&mut write, &script.greeting).await || !script.greeting.starts_with("220") {
        return;
    }

    let mut mail = ReceivedMail::default();
    let mut line = String::new();
    loop {
        line.clear();
        match read.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let command = line.trim_end_matches(['\r', '\n']).to_string();
        state.lock().unwrap().transcript.push(command.clone());
        let upper = command.to_ascii_uppercase();

        let answer = if upper.starts_with("EHLO") {
            if script.reject_ehlo {
                "502 5.5.2 command not recognized".to_string()
            } else {
                ehlo_reply(&script.extensions)
            }
        } else if upper.starts_with("HELO") {
            "250 fake.relay".to_string()
        } else if upper == "STARTTLS" {
            script.starttls_reply.clone()
        } else if upper.starts_with("AUTH ") {
            script.auth_reply.clone()
        } else if command == "*" {
            "501 5.7.0 authentication cancelled".to_string()
        } else if upper.starts_with("MAIL FROM:") {
            mail = ReceivedMail {
                from: angle_address(&command),
                ..Default::default()
            };
            "250 2.1.0 sender ok".to_string()
        } else if upper.starts_with("RCPT TO:") {
            let address = angle_address(&command);
            if script.reject_rcpt.contains(&address) {
                "550 5.1.1 mailbox unavailable".to_string()
            } else {
                mail.to.push(address);
                "250 2.1.5 recipient ok".to_string()
            }
        } else if upper == "DATA" {
            if !reply(&mut write, "354 end data with <CR><LF>.<CR><LF>").await {
                return;
            }
            let mut data = String::new();
            loop {
                line.clear();
                match read.read_line(&mut line).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
                if line == ".\r\n" {
                    break;
                }
                data.push_str(&line);
            }
            if script.data_reply.starts_with('2') {
                let mut accepted = std::mem::take(&mut mail);
                accepted.data = data;
                state.lock().unwrap().mails.push(accepted);
            }
            script.data_reply.clone()
        } else if upper == "QUIT" {
            reply(&mut write, "221 2.0.0 bye").await;
            return;
        } else if upper == "RSET" || upper == "NOOP" {
            "250 2.0.0 ok".to_string()
        } else {
            "500 5.5.1 unrecognized command".to_string()
        };

        if !reply(&mut write, &answer).await {
            return;
        }
    }
}
