//! Message assembly for the email channel.
//!
//! [`build_message`] turns an incident into an [`OutboundMessage`]: it
//! validates the sender and recipients, picks the HTML body and carries
//! attachments and custom headers along. Nothing here touches the
//! network; a message that fails to build is never sent.
//!
//! The notification body template is an HTTP POST concern and never
//! feeds the email body.

use lettre::Message;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as AttachmentPart, Mailbox, MultiPart, SinglePart};

use crate::error::MessageError;
use crate::incident::{Attachment, IncidentState};

/// To, Cc and Bcc address lists of one notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
}

impl Recipients {
    /// Flattened To, Cc, Bcc in order. Duplicates are kept.
    pub fn merged(&self) -> Vec<String> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty()
    }
}

/// A message ready for one SMTP session.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Envelope sender.
    pub sender: String,
    /// Envelope recipients: To, Cc, Bcc merged.
    pub recipients: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<Attachment>,
    /// Extra headers written ahead of the generated ones.
    pub headers: Vec<(String, String)>,
    from: Mailbox,
    to: Vec<Mailbox>,
    cc: Vec<Mailbox>,
    bcc: Vec<Mailbox>,
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MessageError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| MessageError::InvalidAddress {
            address: address.to_string(),
            message: e.to_string(),
        })
}

fn parse_mailboxes(addresses: &[String]) -> Result<Vec<Mailbox>, MessageError> {
    addresses.iter().map(|a| parse_mailbox(a)).collect()
}

fn check_header(name: &str, value: &str) -> Result<(), MessageError> {
    let invalid = |message: &str| MessageError::InvalidHeader {
        name: name.to_string(),
        message: message.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("empty header name"));
    }
    if !name.bytes().all(|b| b.is_ascii_graphic() && b != b':') {
        return Err(invalid("header name must be printable ASCII without ':'"));
    }
    if value.contains(['\r', '\n']) {
        return Err(invalid("header value contains CR or LF"));
    }
    Ok(())
}

/// The incident's email body, else the raw body or subject.
fn html_body(incident: &IncidentState, use_body: bool) -> String {
    if !incident.email_body.is_empty() {
        incident.email_body.clone()
    } else if use_body {
        incident.body.clone()
    } else {
        incident.subject.clone()
    }
}

/// Build the message for one email notification.
///
/// # Errors
///
/// - [`MessageError::MissingParticipants`] when the sender is empty or
///   there is no recipient at all.
/// - [`MessageError::InvalidAddress`] for a malformed sender or recipient.
/// - [`MessageError::InvalidHeader`] for a header that cannot be written.
pub fn build_message(
    sender: &str,
    recipients: &Recipients,
    incident: &IncidentState,
    use_body: bool,
    headers: Vec<(String, String)>,
) -> Result<OutboundMessage, MessageError> {
    if sender.trim().is_empty() || recipients.is_empty() {
        return Err(MessageError::MissingParticipants);
    }

    let from = parse_mailbox(sender)?;
    let to = parse_mailboxes(&recipients.to)?;
    let cc = parse_mailboxes(&recipients.cc)?;
    let bcc = parse_mailboxes(&recipients.bcc)?;

    for (name, value) in &headers {
        check_header(name, value)?;
    }

    let html_body = html_body(incident, use_body);

    let envelope = to
        .iter()
        .chain(&cc)
        .chain(&bcc)
        .map(|m| m.email.to_string())
        .collect();

    Ok(OutboundMessage {
        sender: from.email.to_string(),
        recipients: envelope,
        subject: incident.email_subject().to_string(),
        html_body,
        attachments: incident.attachments.clone(),
        headers,
        from,
        to,
        cc,
        bcc,
    })
}

impl OutboundMessage {
    /// Render the RFC 5322 message.
    ///
    /// Single-part HTML without attachments, `multipart/mixed` with them.
    /// Bcc recipients never appear in the headers.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(self.subject.clone());
        for mailbox in &self.to {
            builder = builder.to(mailbox.clone());
        }
        for mailbox in &self.cc {
            builder = builder.cc(mailbox.clone());
        }
        for mailbox in &self.bcc {
            builder = builder.bcc(mailbox.clone());
        }

        let built = if self.attachments.is_empty() {
            builder
                .header(ContentType::TEXT_HTML)
                .body(self.html_body.clone())
        } else {
            let mut parts = MultiPart::mixed().singlepart(SinglePart::html(self.html_body.clone()));
            for attachment in &self.attachments {
                let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                    MessageError::Build(format!(
                        "attachment '{}' has invalid content type '{}': {}",
                        attachment.filename, attachment.content_type, e
                    ))
                })?;
                parts = parts.singlepart(
                    AttachmentPart::new(attachment.filename.clone())
                        .body(attachment.data.clone(), content_type),
                );
            }
            builder.multipart(parts)
        };
        let message = built.map_err(|e| MessageError::Build(e.to_string()))?;

        let mut out = Vec::new();
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        out.extend_from_slice(&message.formatted());
        Ok(out)
    }
}
