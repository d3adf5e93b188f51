//! Core configuration types and loading.

use super::notifications::NotificationsConfig;
use super::secret::SecretString;
use super::validation::{
    validate_content_type, validate_jinja_template, validate_mailbox, validate_template_render,
};
use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/herald/config.yaml";

/// Environment variable consulted when `hostname` is not configured.
pub const ENV_HOSTNAME: &str = "HOSTNAME";

/// Main configuration structure for herald.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Mail relay settings. Required when any notification sends email.
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    /// Sender address for email notifications.
    #[serde(default)]
    pub email_from: Option<String>,
    /// Value of the `X-Herald-Server` header.
    #[serde(default)]
    pub hostname: Option<String>,
    /// HTTP channel settings.
    #[serde(default)]
    pub http: HttpConfig,
    /// Metrics exposition configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Named notifications.
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

/// Mail relay configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmtpConfig {
    /// Relay address as `host:port` (supports `${ENV_VAR}` substitution).
    pub host: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<SecretString>,
    /// Verify the relay certificate after STARTTLS.
    #[serde(default)]
    pub verify_server_certificate: bool,
    /// Per-operation deadline. No deadline when absent.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

/// HTTP POST/GET channel configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Request deadline. No deadline when absent.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

/// Metrics exposition configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether metrics exposition is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Port to expose metrics on (default: 9090).
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    ///
    /// # Errors
    /// Returns [`ConfigError::LoadError`] if the file cannot be read.
    /// Returns [`ConfigError::ValidationError`] if the YAML is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// True when at least one notification sends email.
    pub fn uses_email(&self) -> bool {
        self.notifications.values().any(|n| n.has_email())
    }

    /// Validate the whole configuration, collecting every error.
    ///
    /// Environment variables and body files are not resolved here;
    /// [`Config::compile`] reports those.
    ///
    /// # Errors
    /// Returns a `Vec<ConfigError>` containing all validation errors found.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.uses_email() {
            match self.email_from.as_deref() {
                None | Some("") => errors.push(ConfigError::ValidationError(
                    "email_from is required when a notification sends email".to_string(),
                )),
                Some(from) => {
                    if let Err(e) = validate_mailbox(from) {
                        errors.push(ConfigError::ValidationError(format!("email_from: {}", e)));
                    }
                }
            }

            match self.smtp {
                None => errors.push(ConfigError::ValidationError(
                    "smtp section is required when a notification sends email".to_string(),
                )),
                Some(ref smtp) if smtp.host.trim().is_empty() => errors.push(
                    ConfigError::ValidationError("smtp.host cannot be empty".to_string()),
                ),
                Some(_) => {}
            }
        }

        let mut names: Vec<_> = self.notifications.keys().collect();
        names.sort();

        for name in names {
            let notification = &self.notifications[name];
            let invalid = |message: String| ConfigError::InvalidNotification {
                name: name.clone(),
                message,
            };

            if !notification.has_channel() {
                errors.push(invalid(
                    "no channel configured (email, post, get or print)".to_string(),
                ));
            }

            if !notification.has_email()
                && (!notification.cc.is_empty() || !notification.bcc.is_empty())
            {
                errors.push(invalid("cc and bcc require at least one email recipient".to_string()));
            }

            for (field, address) in notification.addresses() {
                if let Err(e) = validate_mailbox(address) {
                    errors.push(invalid(format!("{}: {}", field, e)));
                }
            }

            if let Some(ref content_type) = notification.content_type
                && let Err(e) = validate_content_type(content_type)
            {
                errors.push(invalid(e));
            }

            if let Some(ref body) = notification.body {
                if let Err(e) = validate_jinja_template(body) {
                    errors.push(ConfigError::InvalidTemplate {
                        name: name.clone(),
                        message: format!("body: {}", e),
                    });
                } else if let Err(e) = validate_template_render(body) {
                    errors.push(ConfigError::InvalidTemplate {
                        name: name.clone(),
                        message: format!("body render: {}", e),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
