//! Notification dispatch for herald incidents.
//!
//! Given an incident and a notification target, the [`Dispatcher`]
//! launches one independent task per active channel:
//!
//! ```text
//! Dispatcher -> email  -> message builder -> SMTP session -> relay
//!            -> post   -> HTTP POST
//!            -> get    -> HTTP GET
//!            -> print  -> log stream
//! ```
//!
//! # Key Features
//!
//! - **Non-blocking**: `notify` only spawns; callers never wait on a channel
//! - **Isolated failures**: each channel logs its own outcome, nothing propagates
//! - **Metrics**: email sent/failed counters through an injected [`EmailMetrics`]
//! - **Optional join**: the returned [`Dispatched`] handle can be awaited or dropped
//!
//! [`EmailMetrics`]: crate::metrics::EmailMetrics

pub mod email;
pub mod http;
pub mod message;
pub mod print;

use crate::config::{
    DEFAULT_CONTENT_TYPE, NotificationConfig, NotificationsConfig, resolve_body_template,
    resolve_env_vars,
};
use crate::error::ConfigError;
use crate::incident::IncidentState;
use crate::template::{BodyTemplate, PayloadSettings};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;

pub use email::{Delivery, EmailChannel, MailTransport, RelayTransport, SERVER_HEADER};
pub use http::{HttpChannel, PostEndpoint};
pub use message::{OutboundMessage, Recipients, build_message};

// =============================================================================
// Channel
// =============================================================================

/// A delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Email,
    Post,
    Get,
    Print,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Post => "post",
            Channel::Get => "get",
            Channel::Print => "print",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// NotificationTarget
// =============================================================================

fn detail(error: ConfigError) -> String {
    match error {
        ConfigError::LoadError(message) | ConfigError::ValidationError(message) => message,
        other => other.to_string(),
    }
}

/// One compiled notification: the channels an incident fans out to.
///
/// Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct NotificationTarget {
    pub name: String,
    pub recipients: Recipients,
    pub post: Option<PostEndpoint>,
    pub get: Option<reqwest::Url>,
    pub print: bool,
    pub payload: PayloadSettings,
}

impl NotificationTarget {
    /// Compile a notification from configuration.
    ///
    /// # Arguments
    ///
    /// * `name` - Notification name
    /// * `config` - Notification configuration
    /// * `config_dir` - Directory `body_file` paths are relative to
    ///
    /// # Returns
    ///
    /// * `Ok(NotificationTarget)` - Ready to dispatch
    /// * `Err(ConfigError)` - Env var, URL, template or body file problem
    pub fn from_config(
        name: &str,
        config: &NotificationConfig,
        config_dir: &Path,
    ) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidNotification {
            name: name.to_string(),
            message,
        };

        let resolve_url = |field: &str, raw: &str| -> Result<reqwest::Url, ConfigError> {
            let resolved =
                resolve_env_vars(raw).map_err(|e| invalid(format!("{}: {}", field, detail(e))))?;
            crate::config::validate_http_url(&resolved)
                .map_err(|e| invalid(format!("{}: {}", field, e)))
        };

        let post = config
            .post
            .as_deref()
            .map(|raw| {
                resolve_url("post", raw).map(|url| PostEndpoint {
                    url,
                    content_type: config
                        .content_type
                        .clone()
                        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
                })
            })
            .transpose()?;

        let get = config
            .get
            .as_deref()
            .map(|raw| resolve_url("get", raw))
            .transpose()?;

        let template = resolve_body_template(config, config_dir)
            .map_err(|e| invalid(format!("body: {}", detail(e))))?
            .map(|source| BodyTemplate::new(name, &source))
            .transpose()
            .map_err(|e| ConfigError::InvalidTemplate {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        if template.is_some() && post.is_none() {
            tracing::warn!(
                notification = %name,
                "body template has no effect without a post endpoint"
            );
        }

        Ok(Self {
            name: name.to_string(),
            recipients: Recipients {
                to: config.email.clone(),
                cc: config.cc.clone(),
                bcc: config.bcc.clone(),
            },
            post,
            get,
            print: config.print,
            payload: PayloadSettings {
                template,
                use_body: config.use_body,
                use_full_context: config.use_full_context,
            },
        })
    }

    /// Channels this notification is active on, in dispatch order.
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels = Vec::with_capacity(4);
        if !self.recipients.to.is_empty() {
            channels.push(Channel::Email);
        }
        if self.post.is_some() {
            channels.push(Channel::Post);
        }
        if self.get.is_some() {
            channels.push(Channel::Get);
        }
        if self.print {
            channels.push(Channel::Print);
        }
        channels
    }
}

// =============================================================================
// NotificationRegistry
// =============================================================================

/// Named notification targets.
#[derive(Debug, Default)]
pub struct NotificationRegistry {
    targets: HashMap<String, Arc<NotificationTarget>>,
}

impl NotificationRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            targets: HashMap::new(),
        }
    }

    /// Register a target by name.
    ///
    /// # Returns
    ///
    /// Error if a target with the same name already exists.
    pub fn register(&mut self, target: NotificationTarget) -> Result<(), ConfigError> {
        if self.targets.contains_key(&target.name) {
            return Err(ConfigError::ValidationError(format!(
                "notification '{}' already registered",
                target.name
            )));
        }
        self.targets.insert(target.name.clone(), Arc::new(target));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<NotificationTarget>> {
        self.targets.get(name).cloned()
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.targets.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Look up several names at once.
    ///
    /// Returns the targets found, in order, and the names that were not.
    pub fn resolve<'a>(
        &self,
        names: &'a [String],
    ) -> (Vec<Arc<NotificationTarget>>, Vec<&'a str>) {
        let mut found = Vec::with_capacity(names.len());
        let mut unknown = Vec::new();
        for name in names {
            match self.get(name) {
                Some(target) => found.push(target),
                None => unknown.push(name.as_str()),
            }
        }
        (found, unknown)
    }

    /// Create a registry from configuration.
    ///
    /// # Returns
    ///
    /// * `Ok(NotificationRegistry)` - Registry with every notification compiled
    /// * `Err(Vec<ConfigError>)` - All errors encountered
    pub fn from_config(
        config: &NotificationsConfig,
        config_dir: &Path,
    ) -> Result<Self, Vec<ConfigError>> {
        let mut registry = NotificationRegistry::new();
        let mut errors = Vec::new();

        let mut names: Vec<_> = config.keys().collect();
        names.sort();

        for name in names {
            match NotificationTarget::from_config(name, &config[name], config_dir) {
                Ok(target) => {
                    tracing::debug!(
                        notification = %name,
                        channels = ?target.channels(),
                        "Registered notification from config"
                    );
                    if let Err(e) = registry.register(target) {
                        errors.push(e);
                    }
                }
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            Ok(registry)
        } else {
            Err(errors)
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Handle on the tasks launched by one [`Dispatcher::notify`] call.
///
/// Dropping it leaves the tasks running.
#[derive(Debug, Default)]
pub struct Dispatched {
    handles: Vec<(Channel, JoinHandle<()>)>,
}

impl Dispatched {
    /// Channels that were launched.
    pub fn channels(&self) -> Vec<Channel> {
        self.handles.iter().map(|(c, _)| *c).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every channel task to finish.
    pub async fn wait(self) {
        for (channel, handle) in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(channel = %channel, error = %e, "Notification task panicked");
            }
        }
    }
}

/// Fans incidents out to their notification channels.
///
/// Cheap to clone; clones share the HTTP client and the email channel.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    email: Option<Arc<EmailChannel>>,
    http: HttpChannel,
}

impl Dispatcher {
    /// # Arguments
    ///
    /// * `email` - Email channel; `None` when no notification sends email
    /// * `http` - Client shared by the POST and GET channels
    pub fn new(email: Option<EmailChannel>, http: HttpChannel) -> Self {
        Self {
            email: email.map(Arc::new),
            http,
        }
    }

    /// Launch one task per active channel of `target` and return at once.
    ///
    /// Must be called from within a tokio runtime. Channels run
    /// concurrently and in no particular order; their failures are logged
    /// and never reach the caller.
    pub fn notify(
        &self,
        incident: &Arc<IncidentState>,
        target: &Arc<NotificationTarget>,
    ) -> Dispatched {
        let mut dispatched = Dispatched::default();

        for channel in target.channels() {
            let span = tracing::info_span!(
                "notify",
                alert_key = %incident.alert_key,
                notification = %target.name,
                channel = %channel
            );

            let handle = match channel {
                Channel::Email => {
                    let Some(email) = self.email.clone() else {
                        tracing::error!(
                            alert_key = %incident.alert_key,
                            notification = %target.name,
                            "Email channel requested but no mail relay is configured"
                        );
                        continue;
                    };
                    let incident = incident.clone();
                    let target = target.clone();
                    tokio::spawn(
                        async move { email.deliver(&incident, &target).await }.instrument(span),
                    )
                }
                Channel::Post => {
                    let http = self.http.clone();
                    let incident = incident.clone();
                    let target = target.clone();
                    tokio::spawn(
                        async move {
                            if let Some(ref endpoint) = target.post {
                                http.deliver_post(endpoint, &target.payload, &incident)
                                    .await;
                            }
                        }
                        .instrument(span),
                    )
                }
                Channel::Get => {
                    let http = self.http.clone();
                    let incident = incident.clone();
                    let target = target.clone();
                    tokio::spawn(
                        async move {
                            if let Some(ref url) = target.get {
                                http.deliver_get(url, &incident).await;
                            }
                        }
                        .instrument(span),
                    )
                }
                Channel::Print => {
                    let incident = incident.clone();
                    let use_body = target.payload.use_body;
                    tokio::spawn(
                        async move { print::deliver(&incident, use_body) }.instrument(span),
                    )
                }
            };
            dispatched.handles.push((channel, handle));
        }

        dispatched
    }
}
