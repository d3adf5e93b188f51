//! Notification configurations: which channels an incident fans out to.

use serde::Deserialize;
use std::collections::HashMap;

/// Content type used for HTTP POST when none is configured.
pub const DEFAULT_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Map of named notification configurations.
pub type NotificationsConfig = HashMap<String, NotificationConfig>;

/// One named notification.
///
/// Every field is optional; a notification is active on each channel it
/// configures. At least one channel must be present (checked by
/// [`Config::validate`](super::Config::validate)).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationConfig {
    /// Email recipients (To). The email channel is active when non-empty.
    #[serde(default)]
    pub email: Vec<String>,
    /// Carbon-copy recipients.
    #[serde(default)]
    pub cc: Vec<String>,
    /// Blind carbon-copy recipients. Never written to the message headers.
    #[serde(default)]
    pub bcc: Vec<String>,
    /// HTTP POST endpoint (supports `${ENV_VAR}` substitution).
    #[serde(default)]
    pub post: Option<String>,
    /// Content type for the POST body.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Inline body template.
    #[serde(default)]
    pub body: Option<String>,
    /// Body template file, relative to the config file. Wins over `body`.
    #[serde(default)]
    pub body_file: Option<String>,
    /// HTTP GET endpoint (supports `${ENV_VAR}` substitution).
    #[serde(default)]
    pub get: Option<String>,
    /// Print the incident to the log stream.
    #[serde(default)]
    pub print: bool,
    /// Use the body instead of the subject as payload.
    #[serde(default)]
    pub use_body: bool,
    /// Render the body template against the full incident.
    #[serde(default)]
    pub use_full_context: bool,
}

impl NotificationConfig {
    /// True when the email channel is active.
    pub fn has_email(&self) -> bool {
        !self.email.is_empty()
    }

    /// True when at least one channel is configured.
    pub fn has_channel(&self) -> bool {
        self.has_email() || self.post.is_some() || self.get.is_some() || self.print
    }

    /// True when a body template is configured, inline or from a file.
    pub fn has_body_template(&self) -> bool {
        self.body.is_some() || self.body_file.is_some()
    }

    /// Every address listed in `email`, `cc` and `bcc`, in that order.
    pub fn addresses(&self) -> impl Iterator<Item = (&'static str, &str)> {
        let to = self.email.iter().map(|a| ("email", a.as_str()));
        let cc = self.cc.iter().map(|a| ("cc", a.as_str()));
        let bcc = self.bcc.iter().map(|a| ("bcc", a.as_str()));
        to.chain(cc).chain(bcc)
    }
}
