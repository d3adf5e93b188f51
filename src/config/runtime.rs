//! Runtime configuration: env vars resolved, templates and URLs compiled.

use super::env::resolve_env_vars;
use super::secret::SecretString;
use super::types::{Config, ENV_HOSTNAME, MetricsConfig, SmtpConfig};
use crate::error::ConfigError;
use crate::notify::NotificationRegistry;
use crate::smtp::{Credentials, Relay};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Header value used when neither config nor environment names the host.
pub const DEFAULT_HOSTNAME: &str = "localhost";

/// Runtime configuration, ready to build the dispatcher from.
#[derive(Debug)]
pub struct RuntimeConfig {
    /// Mail relay, present when any notification sends email.
    pub relay: Option<Relay>,
    pub email_from: String,
    /// Value of the `X-Herald-Server` header.
    pub hostname: String,
    pub http_timeout: Option<Duration>,
    pub metrics: MetricsConfig,
    pub notifications: NotificationRegistry,
    pub config_dir: PathBuf,
}

/// Pick the server name: configured value, then `$HOSTNAME`, then `localhost`.
pub fn resolve_hostname(configured: Option<&str>) -> String {
    configured
        .filter(|h| !h.trim().is_empty())
        .map(str::to_string)
        .or_else(|| {
            std::env::var(ENV_HOSTNAME)
                .ok()
                .filter(|h| !h.trim().is_empty())
        })
        .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string())
}

impl SmtpConfig {
    /// Build the relay, resolving `${VAR}` references.
    pub fn to_relay(&self) -> Result<Relay, ConfigError> {
        let host = resolve_env_vars(&self.host)
            .map_err(|e| ConfigError::ValidationError(format!("smtp.host: {}", e)))?;

        let username = self
            .username
            .as_deref()
            .map(resolve_env_vars)
            .transpose()
            .map_err(|e| ConfigError::ValidationError(format!("smtp.username: {}", e)))?;

        let password = self
            .password
            .as_ref()
            .map(|p| resolve_env_vars(p.expose()).map(SecretString::new))
            .transpose()
            .map_err(|e| ConfigError::ValidationError(format!("smtp.password: {}", e)))?;

        let credentials = match (username, password) {
            (None, None) => None,
            (username, password) => Some(Credentials {
                username: username.unwrap_or_default(),
                password: password.unwrap_or_default(),
            }),
        };

        let mut relay = Relay::new(host);
        relay.credentials = credentials;
        relay.verify_server_certificate = self.verify_server_certificate;
        relay.timeout = self.timeout;
        Ok(relay)
    }
}

impl Config {
    /// Compile configuration into runtime-ready format.
    ///
    /// Call [`Config::validate`] first; this step reports what validation
    /// cannot see: undefined environment variables, unreadable body files
    /// and malformed URLs.
    ///
    /// # Errors
    /// Returns every error found while compiling.
    pub fn compile(self, config_path: &Path) -> Result<RuntimeConfig, Vec<ConfigError>> {
        let config_dir = config_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();
        let mut errors = Vec::new();

        let relay = if self.uses_email() {
            match self.smtp.as_ref().map(SmtpConfig::to_relay) {
                Some(Ok(relay)) => Some(relay),
                Some(Err(e)) => {
                    errors.push(e);
                    None
                }
                None => {
                    errors.push(ConfigError::ValidationError(
                        "smtp section is required when a notification sends email".to_string(),
                    ));
                    None
                }
            }
        } else {
            None
        };

        let notifications =
            match NotificationRegistry::from_config(&self.notifications, &config_dir) {
                Ok(registry) => Some(registry),
                Err(mut errs) => {
                    errors.append(&mut errs);
                    None
                }
            };

        match notifications {
            Some(notifications) if errors.is_empty() => Ok(RuntimeConfig {
                relay,
                email_from: self.email_from.unwrap_or_default(),
                hostname: resolve_hostname(self.hostname.as_deref()),
                http_timeout: self.http.timeout,
                metrics: self.metrics,
                notifications,
                config_dir,
            }),
            _ => Err(errors),
        }
    }
}
