//! HTTP transport for EWS SOAP calls.

use reqwest::{Client, StatusCode};
use tracing::trace;

use crate::error::{BackendError, BackendResult};

use super::config::EwsConfig;
use super::soap::{EwsResponse, parse_response};

const SOAP_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Posts SOAP envelopes with Basic authentication.
#[derive(Debug)]
pub struct EwsClient {
    client: Client,
    endpoint: String,
    username: String,
    password: String,
}

impl EwsClient {
    pub fn new(config: &EwsConfig, username: String, password: String) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| BackendError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.url.to_string(),
            username,
            password,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Sends one envelope and parses the reply.
    ///
    /// Exchange reports SOAP faults with status 500, so those bodies are
    /// parsed as well.
    pub async fn call(&self, envelope: String) -> BackendResult<EwsResponse> {
        trace!(endpoint = %self.endpoint, "Sending EWS request");
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .header("Content-Type", SOAP_CONTENT_TYPE)
            .body(envelope)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::timeout(format!("Request to {} timed out", self.endpoint))
                } else {
                    BackendError::network(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED => {
                return Err(BackendError::authentication(
                    "Authentication failed: invalid credentials",
                ));
            }
            StatusCode::FORBIDDEN => {
                return Err(BackendError::authorization("Access denied to mailbox"));
            }
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
                return Err(BackendError::rate_limited("Exchange server is throttling requests"));
            }
            _ => {}
        }

        let body = response
            .text()
            .await
            .map_err(|e| BackendError::network(format!("Failed to read response: {}", e)))?;
        trace!(status = %status, "Received EWS response");

        let parsed = parse_response(&body);
        if !status.is_success() && parsed.faults.is_empty() {
            return Err(BackendError::server(format!("Server error ({})", status)));
        }
        Ok(parsed)
    }
}
