//! Template, address and URL validation utilities.

use lettre::message::Mailbox;
use minijinja::{Environment, UndefinedBehavior};

/// Validates Jinja template syntax.
pub(crate) fn validate_jinja_template(source: &str) -> Result<(), String> {
    let mut env = Environment::new();
    env.add_template("_validate", source)
        .map_err(|e| e.to_string())?;
    Ok(())
}

/// Validates a Jinja template by performing a test render with empty data.
/// Detects runtime errors like unknown filters.
///
/// # Errors
/// Returns an error string if the template syntax is invalid or uses unknown filters.
pub fn validate_template_render(source: &str) -> Result<(), String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Lenient);
    env.add_template("_render_test", source)
        .map_err(|e| e.to_string())?;

    let tmpl = env
        .get_template("_render_test")
        .map_err(|e| e.to_string())?;
    tmpl.render(serde_json::json!({}))
        .map_err(|e| e.to_string())?;

    Ok(())
}

/// Validates a mail address (`user@host` or `Name <user@host>`).
pub(crate) fn validate_mailbox(address: &str) -> Result<(), String> {
    address
        .parse::<Mailbox>()
        .map(|_| ())
        .map_err(|e| format!("invalid address '{}': {}", address, e))
}

/// Validates an absolute http(s) URL.
pub(crate) fn validate_http_url(url: &str) -> Result<reqwest::Url, String> {
    let parsed = reqwest::Url::parse(url).map_err(|e| format!("invalid URL '{}': {}", url, e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(format!(
            "invalid URL '{}': unsupported scheme '{}'",
            url, scheme
        )),
    }
}

/// Validates a value usable as a `Content-Type` header.
pub(crate) fn validate_content_type(value: &str) -> Result<(), String> {
    reqwest::header::HeaderValue::from_str(value)
        .map(|_| ())
        .map_err(|e| format!("invalid content_type '{}': {}", value, e))
}
