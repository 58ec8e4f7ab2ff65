//! HTTP client for CalDAV operations.
//!
//! Handles Basic and Digest authentication, WebDAV verbs (PROPFIND, REPORT,
//! PUT, DELETE) and status-code mapping.

use reqwest::{Client, Method, Response, StatusCode};
use tracing::{debug, trace, warn};

use crate::error::{BackendError, BackendResult};

use super::auth::{DigestAuth, basic_auth};
use super::config::CalDavConfig;

const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";
const ICS_CONTENT_TYPE: &str = "text/calendar; charset=utf-8";

/// One WebDAV request.
#[derive(Debug, Clone, Copy)]
pub struct DavRequest<'a> {
    method: &'static str,
    url: &'a str,
    body: Option<(&'static str, &'a str)>,
    depth: Option<u8>,
    if_match: Option<&'a str>,
    create_only: bool,
}

impl<'a> DavRequest<'a> {
    fn new(method: &'static str, url: &'a str) -> Self {
        Self {
            method,
            url,
            body: None,
            depth: None,
            if_match: None,
            create_only: false,
        }
    }
}

/// Etag and body of a successful response.
#[derive(Debug)]
pub struct DavResponse {
    pub etag: Option<String>,
    pub body: String,
}

#[derive(Debug)]
enum AuthMode {
    /// No challenge seen yet.
    Unknown,
    Basic,
    Digest(DigestAuth),
}

/// HTTP client for one CalDAV account.
pub struct CalDavClient {
    client: Client,
    config: CalDavConfig,
    auth: AuthMode,
}

impl CalDavClient {
    pub fn new(config: CalDavConfig) -> BackendResult<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| BackendError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            auth: AuthMode::Unknown,
        })
    }

    pub async fn propfind(&mut self, url: &str, body: &str, depth: u8) -> BackendResult<String> {
        let mut request = DavRequest::new("PROPFIND", url);
        request.body = Some((XML_CONTENT_TYPE, body));
        request.depth = Some(depth);
        Ok(self.execute(request).await?.body)
    }

    pub async fn report(&mut self, url: &str, body: &str) -> BackendResult<String> {
        let mut request = DavRequest::new("REPORT", url);
        request.body = Some((XML_CONTENT_TYPE, body));
        request.depth = Some(1);
        Ok(self.execute(request).await?.body)
    }

    /// Stores a calendar object.
    ///
    /// With `etag` the write only succeeds if the resource is unchanged;
    /// without it the write only succeeds if the resource does not exist yet.
    pub async fn put(
        &mut self,
        url: &str,
        ics: &str,
        etag: Option<&str>,
    ) -> BackendResult<Option<String>> {
        let mut request = DavRequest::new("PUT", url);
        request.body = Some((ICS_CONTENT_TYPE, ics));
        request.if_match = etag;
        request.create_only = etag.is_none();
        Ok(self.execute(request).await?.etag)
    }

    pub async fn delete(&mut self, url: &str, etag: Option<&str>) -> BackendResult<()> {
        let mut request = DavRequest::new("DELETE", url);
        request.if_match = etag;
        self.execute(request).await.map(|_| ())
    }

    /// Sends a request, answering one authentication challenge if needed.
    async fn execute(&mut self, request: DavRequest<'_>) -> BackendResult<DavResponse> {
        let response = self.send(request).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return self.handle_response(response).await;
        }

        let challenge = response
            .headers()
            .get("www-authenticate")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !self.config.has_credentials() {
            return Err(BackendError::authentication(
                "Server requires authentication but no credentials are configured",
            ));
        }

        self.auth = match challenge.as_deref() {
            Some(header) if header.starts_with("Digest ") => match DigestAuth::parse(header) {
                Some(digest) => AuthMode::Digest(digest),
                None => AuthMode::Basic,
            },
            Some(_) => AuthMode::Basic,
            None => {
                return Err(BackendError::authentication(
                    "Server answered 401 without an authentication challenge",
                ));
            }
        };
        debug!(url = %request.url, "Received 401, retrying with credentials");

        let response = self.send(request).await?;
        self.handle_response(response).await
    }

    async fn send(&mut self, request: DavRequest<'_>) -> BackendResult<Response> {
        let method = Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            BackendError::internal(format!("Invalid HTTP method: {}", request.method))
        })?;

        let mut builder = self.client.request(method, request.url);
        if let Some((content_type, body)) = request.body {
            builder = builder
                .header("Content-Type", content_type)
                .body(body.to_string());
        }
        if let Some(depth) = request.depth {
            builder = builder.header("Depth", depth.to_string());
        }
        if let Some(etag) = request.if_match {
            builder = builder.header("If-Match", format!("\"{}\"", etag));
        }
        if request.create_only {
            builder = builder.header("If-None-Match", "*");
        }
        if let Some(header) = self.authorization(request.method, request.url) {
            builder = builder.header("Authorization", header);
        }

        trace!(method = %request.method, url = %request.url, "Sending request");

        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::timeout(format!("Request to {} timed out", request.url))
            } else {
                BackendError::network(format!("Request failed: {}", e))
            }
        })
    }

    fn authorization(&mut self, method: &str, url: &str) -> Option<String> {
        let (username, password) = match (&self.config.username, &self.config.password) {
            (Some(u), Some(p)) => (u, p),
            _ => return None,
        };

        match self.auth {
            AuthMode::Unknown => None,
            AuthMode::Basic => Some(basic_auth(username, password)),
            AuthMode::Digest(ref mut digest) => {
                let uri = url::Url::parse(url)
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|_| url.to_string());
                Some(digest.authorize(method, &uri, username, password))
            }
        }
    }

    async fn handle_response(&self, response: Response) -> BackendResult<DavResponse> {
        let status = response.status();
        trace!(status = %status, "Received response");

        match status {
            StatusCode::OK
            | StatusCode::CREATED
            | StatusCode::NO_CONTENT
            | StatusCode::MULTI_STATUS => {
                let etag = response
                    .headers()
                    .get("etag")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.trim_start_matches("W/").trim_matches('"').to_string());
                let body = response.text().await.map_err(|e| {
                    BackendError::network(format!("Failed to read response: {}", e))
                })?;
                Ok(DavResponse { etag, body })
            }
            StatusCode::UNAUTHORIZED => Err(BackendError::authentication(
                "Authentication failed: invalid credentials",
            )),
            StatusCode::FORBIDDEN => Err(BackendError::authorization("Access denied to calendar")),
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                Err(BackendError::not_found("Calendar or resource not found"))
            }
            StatusCode::PRECONDITION_FAILED => Err(BackendError::calendar(
                "Event was modified on the server; reload and retry",
            )),
            StatusCode::TOO_MANY_REQUESTS => {
                Err(BackendError::rate_limited("Too many requests to server"))
            }
            s if s.is_server_error() => {
                let body = response.text().await.unwrap_or_default();
                Err(BackendError::server(format!("Server error ({}): {}", s, body)))
            }
            s => {
                let body = response.text().await.unwrap_or_default();
                warn!(status = %s, body = %body, "Unexpected response status");
                Err(BackendError::invalid_response(format!(
                    "Unexpected status {}: {}",
                    s, body
                )))
            }
        }
    }
}
