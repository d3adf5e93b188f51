//! HTTP POST and GET channels.
//!
//! One request per incident, no retry. Any status of 300 or above is a
//! failure; it is logged and goes no further.

use crate::error::NotifyError;
use crate::incident::IncidentState;
use crate::template::PayloadSettings;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

/// A POST endpoint with the content type of its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostEndpoint {
    pub url: reqwest::Url,
    pub content_type: String,
}

/// Shared HTTP client for the POST and GET channels.
#[derive(Debug, Clone, Default)]
pub struct HttpChannel {
    client: reqwest::Client,
}

fn check_status(status: StatusCode) -> Result<StatusCode, NotifyError> {
    if status.as_u16() >= 300 {
        Err(NotifyError::BadStatus { status })
    } else {
        Ok(status)
    }
}

impl HttpChannel {
    /// Build the client; `timeout` bounds each whole request.
    pub fn new(timeout: Option<Duration>) -> Result<Self, NotifyError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| NotifyError::Http(e.to_string()))?;
        Ok(Self { client })
    }

    /// POST the incident payload.
    ///
    /// A template failure aborts before any request is made.
    pub async fn post(
        &self,
        endpoint: &PostEndpoint,
        payload: &PayloadSettings,
        incident: &IncidentState,
    ) -> Result<StatusCode, NotifyError> {
        let body = payload.render(incident)?;
        tracing::trace!(body_len = body.len(), "Request body built");

        let response = self
            .client
            .post(endpoint.url.clone())
            .header(CONTENT_TYPE, endpoint.content_type.as_str())
            .body(body)
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        check_status(response.status())
    }

    /// GET the endpoint.
    pub async fn get(&self, url: &reqwest::Url) -> Result<StatusCode, NotifyError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        check_status(response.status())
    }

    /// POST, then log the outcome. Never fails.
    pub async fn deliver_post(
        &self,
        endpoint: &PostEndpoint,
        payload: &PayloadSettings,
        incident: &IncidentState,
    ) {
        match self.post(endpoint, payload, incident).await {
            Ok(status) => tracing::info!(
                alert_key = %incident.alert_key,
                status = status.as_u16(),
                "Post notification successful"
            ),
            Err(NotifyError::Template(e)) => tracing::error!(
                alert_key = %incident.alert_key,
                url = %endpoint.url,
                error = %e,
                "Failed to render post body"
            ),
            Err(e) => tracing::error!(
                alert_key = %incident.alert_key,
                url = %endpoint.url,
                error = %e,
                "Bad response on notification post"
            ),
        }
    }

    /// GET, then log the outcome. Never fails.
    pub async fn deliver_get(&self, url: &reqwest::Url, incident: &IncidentState) {
        match self.get(url).await {
            Ok(status) => tracing::info!(
                alert_key = %incident.alert_key,
                status = status.as_u16(),
                "Get notification successful"
            ),
            Err(e) => tracing::error!(
                alert_key = %incident.alert_key,
                url = %url,
                error = %e,
                "Bad response on notification get"
            ),
        }
    }
}
