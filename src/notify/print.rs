//! Print channel: writes the incident to the log stream.

use crate::incident::IncidentState;

/// The printed line: the subject, or subject and body with `use_body`.
pub fn print_line(incident: &IncidentState, use_body: bool) -> String {
    if use_body {
        format!("Subject: {}, Body: {}", incident.subject, incident.body)
    } else {
        incident.subject.clone()
    }
}

pub fn deliver(incident: &IncidentState, use_body: bool) {
    tracing::info!(
        alert_key = %incident.alert_key,
        "{}",
        print_line(incident, use_body)
    );
}
