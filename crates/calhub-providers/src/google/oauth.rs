//! Interactive OAuth 2.0 authorization (PKCE, loopback redirect).
//!
//! 1. Generate a code verifier, its SHA-256 challenge and a random state
//! 2. Listen on an ephemeral 127.0.0.1 port
//! 3. Open the consent page in the browser
//! 4. Take the code from the redirect and exchange it for tokens

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::{BackendError, BackendResult};

use super::config::OAuthCredentials;
use super::tokens::TokenInfo;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Read/write access to events.
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// Bytes of entropy in the code verifier, before encoding.
const CODE_VERIFIER_LENGTH: usize = 32;

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the authorization code flow for one set of client secrets.
#[derive(Debug)]
pub struct OAuthClient {
    credentials: OAuthCredentials,
    http_client: reqwest::Client,
    token_url: String,
}

impl OAuthClient {
    pub fn new(credentials: OAuthCredentials) -> BackendResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| BackendError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            credentials,
            http_client,
            token_url: GOOGLE_TOKEN_URL.to_string(),
        })
    }

    /// Points the code exchange at another token endpoint.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Opens the consent page and waits for the redirect.
    ///
    /// If no browser can be started the URL is printed to stderr for manual
    /// copying.
    pub async fn authorize(&self, scopes: &[&str]) -> BackendResult<TokenInfo> {
        let pkce = PkceFlow::new();

        let listener = TcpListener::bind("127.0.0.1:0").await.map_err(|e| {
            BackendError::internal(format!("Failed to start callback listener: {}", e))
        })?;
        let port = listener
            .local_addr()
            .map_err(|e| BackendError::internal(format!("Callback listener has no port: {}", e)))?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{}/callback", port);
        let auth_url = pkce.build_auth_url(&self.credentials.client_id, &redirect_uri, scopes);

        info!(port, "Starting Google authorization, opening browser");
        debug!(url = %auth_url, "Authorization URL");
        if let Err(e) = open::that(&auth_url) {
            warn!(error = %e, "Failed to open browser");
            eprintln!("\nOpen this URL in your browser:\n\n{}\n", auth_url);
        }

        let callback = tokio::time::timeout(CALLBACK_TIMEOUT, wait_for_callback(&listener))
            .await
            .map_err(|_| BackendError::timeout("Timed out waiting for the authorization redirect"))??;

        if callback.state != pkce.state {
            return Err(BackendError::authentication(
                "OAuth state mismatch; the redirect did not come from this run",
            ));
        }

        info!("Received authorization code, exchanging for tokens");
        self.exchange_code(&callback.code, &pkce.verifier, &redirect_uri)
            .await
    }

    /// Trades an authorization code for an access and refresh token.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> BackendResult<TokenInfo> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| BackendError::network(format!("Token exchange request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::network(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(BackendError::authentication(format!(
                "Token exchange failed ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            BackendError::invalid_response(format!("Invalid token response: {}", e))
        })?;

        info!("Obtained Google tokens");
        let expiry = token
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        Ok(TokenInfo::new(token.access_token, expiry).with_refresh_token(token.refresh_token))
    }
}

/// Code and state taken from the redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callback {
    pub code: String,
    pub state: String,
}

/// Accepts connections until one carries the redirect.
async fn wait_for_callback(listener: &TcpListener) -> BackendResult<Callback> {
    loop {
        let (stream, peer) = listener.accept().await.map_err(|e| {
            BackendError::internal(format!("Failed to accept callback connection: {}", e))
        })?;
        debug!(peer = %peer, "Callback connection");
        if let Some(result) = handle_connection(stream).await {
            return result;
        }
    }
}

async fn handle_connection(mut stream: TcpStream) -> Option<BackendResult<Callback>> {
    let mut request_line = String::new();
    BufReader::new(&mut stream)
        .read_line(&mut request_line)
        .await
        .ok()?;

    let result = parse_callback(&request_line)?;
    let page = match &result {
        Ok(_) => {
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
             <html><body><h1>Authorization successful</h1>\
             <p>You can close this window and return to the terminal.</p></body></html>"
        }
        Err(_) => {
            "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
             <html><body><h1>Authorization failed</h1>\
             <p>You can close this window.</p></body></html>"
        }
    };
    if let Err(e) = stream.write_all(page.as_bytes()).await {
        debug!(error = %e, "Failed to answer the browser");
    }
    let _ = stream.shutdown().await;
    Some(result)
}

/// Reads `GET /callback?code=..&state=.. HTTP/1.1`.
///
/// Returns `None` for requests that are not the redirect (favicon and the like).
pub fn parse_callback(request_line: &str) -> Option<BackendResult<Callback>> {
    let mut parts = request_line.split_whitespace();
    if parts.next() != Some("GET") {
        return None;
    }
    let target = parts.next()?;
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    if path != "/callback" {
        return None;
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in query.split('&').filter_map(|pair| pair.split_once('=')) {
        let value = urlencoding::decode(value)
            .map(|v| v.into_owned())
            .unwrap_or_default();
        match key {
            "code" => code = Some(value),
            "state" => state = Some(value),
            "error" => error = Some(value),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Some(Err(BackendError::authentication(format!(
            "Authorization denied: {}",
            error
        ))));
    }
    Some(match code {
        Some(code) => Ok(Callback {
            code,
            state: state.unwrap_or_default(),
        }),
        None => Err(BackendError::authentication(
            "Missing authorization code in callback",
        )),
    })
}

/// RFC 7636 verifier, challenge and CSRF state for one run.
#[derive(Debug)]
pub struct PkceFlow {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(16),
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }

    /// Consent page URL asking for offline access, so a refresh token is issued.
    pub fn build_auth_url(&self, client_id: &str, redirect_uri: &str, scopes: &[&str]) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
             code_challenge={}&code_challenge_method=S256&state={}&\
             access_type=offline&prompt=consent",
            GOOGLE_AUTH_URL,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes.join(" ")),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackendErrorCode;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn verifier_is_43_chars() {
        assert_eq!(PkceFlow::new().verifier.len(), 43);
    }

    #[test]
    fn challenge_matches_rfc_example() {
        // RFC 7636 appendix B
        assert_eq!(
            PkceFlow::compute_challenge("dBjftJeZ4CVP-mJ92K1s40-2-bZGwPmw2NOAlJ1jBVcD1u0"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn state_is_random() {
        assert_ne!(PkceFlow::new().state, PkceFlow::new().state);
    }

    #[test]
    fn auth_url_carries_challenge_and_scope() {
        let flow = PkceFlow::new();
        let url = flow.build_auth_url(
            "id.apps.googleusercontent.com",
            "http://127.0.0.1:8080/callback",
            &[CALENDAR_SCOPE],
        );

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A8080%2Fcallback"));
        assert!(url.contains("scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fcalendar&"));
        assert!(url.contains(&format!("code_challenge={}", flow.challenge)));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("access_type=offline"));
    }

    #[test]
    fn callback_with_code_and_state() {
        let callback = parse_callback("GET /callback?state=s%2B1&code=4%2F0Ab HTTP/1.1\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(callback.code, "4/0Ab");
        assert_eq!(callback.state, "s+1");
    }

    #[test]
    fn callback_denied() {
        let err = parse_callback("GET /callback?error=access_denied HTTP/1.1")
            .unwrap()
            .unwrap_err();
        assert_eq!(err.code(), BackendErrorCode::AuthenticationFailed);
        assert_eq!(err.message(), "Authorization denied: access_denied");
    }

    #[test]
    fn unrelated_requests_are_ignored() {
        assert!(parse_callback("GET /favicon.ico HTTP/1.1").is_none());
        assert!(parse_callback("POST /callback?code=x HTTP/1.1").is_none());
        assert!(parse_callback("").is_none());
        assert!(parse_callback("GET /callback HTTP/1.1").unwrap().is_err());
    }

    #[tokio::test]
    async fn loopback_skips_other_requests_and_answers_browser() {
        use tokio::io::AsyncReadExt;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let waiter = tokio::spawn(async move { wait_for_callback(&listener).await });

        let mut noise = TcpStream::connect(addr).await.unwrap();
        noise.write_all(b"GET /favicon.ico HTTP/1.1\r\n\r\n").await.unwrap();
        drop(noise);

        let mut browser = TcpStream::connect(addr).await.unwrap();
        browser
            .write_all(b"GET /callback?code=c1&state=s1 HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n")
            .await
            .unwrap();
        let mut page = String::new();
        browser.read_to_string(&mut page).await.unwrap();

        assert!(page.starts_with("HTTP/1.1 200 OK"));
        assert!(page.contains("Authorization successful"));
        let callback = waiter.await.unwrap().unwrap();
        assert_eq!(
            callback,
            Callback {
                code: "c1".into(),
                state: "s1".into(),
            }
        );
    }

    fn client(server: &MockServer) -> OAuthClient {
        OAuthClient::new(OAuthCredentials::new("id", "secret"))
            .unwrap()
            .with_token_url(format!("{}/token", server.uri()))
    }

    #[tokio::test]
    async fn exchange_returns_refreshable_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .and(body_string_contains("code_verifier=ver"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.new",
                "refresh_token": "1//refresh",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = client(&server)
            .exchange_code("abc", "ver", "http://127.0.0.1:1/callback")
            .await
            .unwrap();

        assert_eq!(token.token, "ya29.new");
        assert_eq!(token.refresh_token.as_deref(), Some("1//refresh"));
        assert!(!token.is_expired());
    }

    #[tokio::test]
    async fn rejected_exchange_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error": "invalid_grant"}"#))
            .mount(&server)
            .await;

        let err = client(&server)
            .exchange_code("stale", "ver", "http://127.0.0.1:1/callback")
            .await
            .unwrap_err();
        assert_eq!(err.code(), BackendErrorCode::AuthenticationFailed);
        assert!(err.message().contains("invalid_grant"));
    }
}
