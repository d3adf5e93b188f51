//! Body templating for notification payloads.
//!
//! Templates use Jinja2 syntax powered by minijinja. A template renders
//! either against the full incident or against a single flat string
//! (the subject or body, selected by `use_body`), exposed as `payload`.
//!
//! # Example
//!
//! ```ignore
//! use herald::template::{BodyTemplate, PayloadSettings};
//!
//! let settings = PayloadSettings {
//!     template: Some(BodyTemplate::new("alert", "{{ alert_key }}: {{ subject }}")?),
//!     use_body: false,
//!     use_full_context: true,
//! };
//! let payload = settings.render(&incident)?;
//! ```

use minijinja::{Environment, context};
use serde::Serialize;

use crate::error::TemplateError;
use crate::incident::IncidentState;

/// A parsed body template.
///
/// The source is checked when the template is created, so a configured
/// template is always syntactically valid.
#[derive(Debug, Clone)]
pub struct BodyTemplate {
    name: String,
    source: String,
}

impl BodyTemplate {
    /// Parse a template, failing on syntax errors.
    pub fn new(name: &str, source: &str) -> Result<Self, TemplateError> {
        let mut env = Environment::new();
        env.add_template(name, source)
            .map_err(|e| TemplateError::ParseFailed {
                message: e.to_string(),
            })?;
        Ok(Self {
            name: name.to_string(),
            source: source.to_string(),
        })
    }

    /// Render the template with any serializable context.
    pub fn render<S: Serialize>(&self, ctx: S) -> Result<String, TemplateError> {
        let mut env = Environment::new();
        env.add_template(&self.name, &self.source)
            .map_err(|e| TemplateError::ParseFailed {
                message: e.to_string(),
            })?;

        let tmpl = env
            .get_template(&self.name)
            .map_err(|e| TemplateError::RenderFailed {
                message: e.to_string(),
            })?;

        tmpl.render(ctx).map_err(|e| TemplateError::RenderFailed {
            message: e.to_string(),
        })
    }
}

/// Template context exposing the full incident.
///
/// Attachment bytes are left out; templates see names and types only.
#[derive(Debug, Serialize)]
pub struct IncidentContext<'a> {
    pub alert_key: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
    pub email_subject: &'a str,
    pub email_body: &'a str,
    pub attachments: Vec<AttachmentContext<'a>>,
}

#[derive(Debug, Serialize)]
pub struct AttachmentContext<'a> {
    pub filename: &'a str,
    pub content_type: &'a str,
    pub size: usize,
}

impl<'a> From<&'a IncidentState> for IncidentContext<'a> {
    fn from(incident: &'a IncidentState) -> Self {
        Self {
            alert_key: &incident.alert_key,
            subject: &incident.subject,
            body: &incident.body,
            email_subject: &incident.email_subject,
            email_body: &incident.email_body,
            attachments: incident
                .attachments
                .iter()
                .map(|a| AttachmentContext {
                    filename: &a.filename,
                    content_type: &a.content_type,
                    size: a.data.len(),
                })
                .collect(),
        }
    }
}

/// How a notification turns an incident into a payload.
#[derive(Debug, Clone, Default)]
pub struct PayloadSettings {
    /// Optional body template.
    pub template: Option<BodyTemplate>,
    /// Select the body instead of the subject as the flat payload.
    pub use_body: bool,
    /// Render the template against the full incident instead of the flat payload.
    pub use_full_context: bool,
}

impl PayloadSettings {
    /// The flat payload: the raw body or the raw subject.
    pub fn raw<'a>(&self, incident: &'a IncidentState) -> &'a str {
        if self.use_body {
            &incident.body
        } else {
            &incident.subject
        }
    }

    /// The payload after templating.
    ///
    /// Without a template this is the raw flat payload, verbatim.
    pub fn render(&self, incident: &IncidentState) -> Result<String, TemplateError> {
        let raw = self.raw(incident);
        match &self.template {
            None => Ok(raw.to_string()),
            Some(template) if self.use_full_context => {
                template.render(IncidentContext::from(incident))
            }
            Some(template) => template.render(context! { payload => raw }),
        }
    }

    pub fn has_template(&self) -> bool {
        self.template.is_some()
    }
}
