//! Configuration loading and validation for herald.
//!
//! This module handles loading the YAML configuration file,
//! validation, and resolving environment variables for secrets.

mod env;
mod notifications;
mod runtime;
mod secret;
mod types;
mod validation;

pub use env::{resolve_body_template, resolve_env_vars};
pub use notifications::{DEFAULT_CONTENT_TYPE, NotificationConfig, NotificationsConfig};
pub use runtime::{DEFAULT_HOSTNAME, RuntimeConfig, resolve_hostname};
pub use secret::SecretString;
pub use types::{
    Config, DEFAULT_CONFIG_PATH, ENV_HOSTNAME, HttpConfig, MetricsConfig, SmtpConfig,
};
pub use validation::validate_template_render;
pub(crate) use validation::validate_http_url;
