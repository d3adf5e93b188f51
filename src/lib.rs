//! herald - Incident notification dispatcher: email over SMTP, HTTP POST/GET and console.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod incident;
pub mod metrics;
pub mod notify;
pub mod smtp;
pub mod template;

// Re-export commonly used types
pub use cli::LogFormat;
pub use engine::{DEFAULT_DRAIN_TIMEOUT, EngineSummary, IncidentEngine, open_incidents};
pub use incident::{Attachment, IncidentEvent, IncidentState};
pub use metrics::{
    EmailCounters, EmailMetrics, MetricsServer, PrometheusMetrics, register_metric_descriptions,
};
pub use notify::{
    Channel, Dispatched, Dispatcher, EmailChannel, HttpChannel, NotificationRegistry,
    NotificationTarget,
};
pub use smtp::{Relay, SessionReport, send_mail};
pub use template::{BodyTemplate, PayloadSettings};
