//! Incident state handed to the dispatcher.
//!
//! Incidents arrive as JSON (one event per line on the incident stream).
//! Attachment bytes travel base64-encoded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The event being reported.
///
/// Read-only to the notification subsystem; the caller owns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentState {
    /// Opaque correlation identifier, used for logging only.
    pub alert_key: String,
    /// Plain subject line.
    #[serde(default)]
    pub subject: String,
    /// Plain body.
    #[serde(default)]
    pub body: String,
    /// Subject used for email notifications.
    #[serde(default)]
    pub email_subject: String,
    /// HTML body used for email notifications.
    #[serde(default)]
    pub email_body: String,
    /// Ordered attachments for the email channel.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// A binary email attachment.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.data.len())
            .finish()
    }
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

/// One line of the incident stream: the incident plus the names of the
/// notifications it should be sent through.
#[derive(Debug, Clone, Deserialize)]
pub struct IncidentEvent {
    pub notifications: Vec<String>,
    #[serde(flatten)]
    pub incident: IncidentState,
}

impl IncidentState {
    /// Subject used for email, falling back to the plain subject.
    pub fn email_subject(&self) -> &str {
        if self.email_subject.is_empty() {
            &self.subject
        } else {
            &self.email_subject
        }
    }
}

mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)
    }
}
