//! SMTP reply parsing.
//!
//! A reply is one or more lines sharing a three-digit code. Every line
//! but the last uses `-` after the code, the last uses a space:
//!
//! ```text
//! 250-relay.example.com
//! 250-STARTTLS
//! 250 AUTH PLAIN LOGIN
//! ```

use crate::error::SmtpError;

/// A complete reply from the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    /// Reply text with continuation lines joined by newlines.
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// Check the reply code against an expected code.
    ///
    /// A one-digit expectation matches the reply class, two digits match
    /// the first two digits, three digits must match exactly.
    pub fn expect(self, expected: u16) -> Result<Reply, SmtpError> {
        if code_matches(self.code, expected) {
            Ok(self)
        } else {
            Err(SmtpError::Rejected {
                code: self.code,
                message: self.message(),
            })
        }
    }
}

fn code_matches(code: u16, expected: u16) -> bool {
    match expected {
        0 => true,
        1..=9 => code / 100 == expected,
        10..=99 => code / 10 == expected,
        _ => code == expected,
    }
}

/// One parsed reply line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ReplyLine<'a> {
    pub code: u16,
    pub more: bool,
    pub text: &'a str,
}

/// Parse a single reply line, with or without its trailing CRLF.
pub(crate) fn parse_line(line: &str) -> Result<ReplyLine<'_>, SmtpError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let bytes = line.as_bytes();

    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(SmtpError::MalformedReply(line.to_string()));
    }
    let code: u16 = line[..3]
        .parse()
        .map_err(|_| SmtpError::MalformedReply(line.to_string()))?;
    if !(100..600).contains(&code) {
        return Err(SmtpError::MalformedReply(line.to_string()));
    }

    let (more, text) = match bytes.get(3) {
        None => (false, ""),
        Some(b' ') => (false, &line[4..]),
        Some(b'-') => (true, &line[4..]),
        Some(_) => return Err(SmtpError::MalformedReply(line.to_string())),
    };

    Ok(ReplyLine { code, more, text })
}

/// Accumulates reply lines until the final line arrives.
#[derive(Debug, Default)]
pub(crate) struct ReplyBuilder {
    code: Option<u16>,
    lines: Vec<String>,
}

impl ReplyBuilder {
    /// Feed one raw line. Returns the reply once it is complete.
    pub fn push(&mut self, raw: &str) -> Result<Option<Reply>, SmtpError> {
        let line = parse_line(raw)?;
        match self.code {
            Some(code) if code != line.code => {
                return Err(SmtpError::MalformedReply(format!(
                    "code changed from {} to {} within a reply",
                    code, line.code
                )));
            }
            _ => self.code = Some(line.code),
        }
        self.lines.push(line.text.to_string());

        if line.more {
            return Ok(None);
        }
        Ok(Some(Reply {
            code: line.code,
            lines: std::mem::take(&mut self.lines),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_line_single() {
        let line = parse_line("220 relay.example.com ESMTP ready\r\n").unwrap();
        assert_eq!(line.code, 220);
        assert!(!line.more);
        assert_eq!(line.text, "relay.example.com ESMTP ready");
    }

    #[test]
    fn parse_line_continuation() {
        let line = parse_line("250-STARTTLS\r\n").unwrap();
        assert_eq!(line.code, 250);
        assert!(line.more);
        assert_eq!(line.text, "STARTTLS");
    }

    #[test]
    fn parse_line_code_only() {
        let line = parse_line("354\r\n").unwrap();
        assert_eq!(line.code, 354);
        assert_eq!(line.text, "");
    }

    #[test]
    fn parse_line_rejects_garbage() {
        assert!(parse_line("hello\r\n").is_err());
        assert!(parse_line("25\r\n").is_err());
        assert!(parse_line("250xok\r\n").is_err());
        assert!(parse_line("999 nope\r\n").is_err());
    }

    #[test]
    fn builder_collects_multiline_reply() {
        let mut builder = ReplyBuilder::default();
        assert_eq!(builder.push("250-relay.example.com\r\n").unwrap(), None);
        assert_eq!(builder.push("250-STARTTLS\r\n").unwrap(), None);
        let reply = builder.push("250 AUTH PLAIN LOGIN\r\n").unwrap().unwrap();

        assert_eq!(reply.code, 250);
        assert_eq!(
            reply.lines,
            vec!["relay.example.com", "STARTTLS", "AUTH PLAIN LOGIN"]
        );
    }

    #[test]
    fn builder_rejects_mixed_codes() {
        let mut builder = ReplyBuilder::default();
        builder.push("250-first\r\n").unwrap();
        let result = builder.push("251 second\r\n");
        assert!(matches!(result, Err(SmtpError::MalformedReply(_))));
    }

    #[test]
    fn expect_matches_by_prefix_length() {
        let reply = |code| Reply {
            code,
            lines: vec!["text".to_string()],
        };

        assert!(reply(250).expect(250).is_ok());
        assert!(reply(251).expect(25).is_ok());
        assert!(reply(252).expect(2).is_ok());
        assert!(reply(251).expect(250).is_err());

        let err = reply(550).expect(25).unwrap_err();
        assert_eq!(err.code(), Some(550));
        assert_eq!(err.to_string(), "relay rejected command: 550 text");
    }
}
