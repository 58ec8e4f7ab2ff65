//! HTTP Basic (RFC 7617) and Digest (RFC 7616) authentication.

use std::collections::HashMap;

use base64::Engine;
use rand::Rng;

/// Digest challenge state kept between requests.
#[derive(Debug, Clone)]
pub struct DigestAuth {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub qop: Option<String>,
    pub algorithm: String,
    nc: u32,
}

impl DigestAuth {
    /// Parses a `WWW-Authenticate: Digest ...` challenge.
    pub fn parse(header: &str) -> Option<Self> {
        let params = parse_auth_params(header.strip_prefix("Digest ")?.trim());

        Some(Self {
            realm: params.get("realm")?.clone(),
            nonce: params.get("nonce")?.clone(),
            opaque: params.get("opaque").cloned(),
            qop: params.get("qop").cloned(),
            algorithm: params
                .get("algorithm")
                .cloned()
                .unwrap_or_else(|| "MD5".to_string()),
            nc: 0,
        })
    }

    /// Builds the `Authorization` header for one request.
    pub fn authorize(&mut self, method: &str, uri: &str, username: &str, password: &str) -> String {
        self.nc += 1;
        let nc = format!("{:08x}", self.nc);
        let cnonce = generate_cnonce();

        let ha1 = md5_hex(&format!("{}:{}:{}", username, self.realm, password));
        let ha2 = md5_hex(&format!("{}:{}", method, uri));
        let with_qop = self.qop.as_deref().is_some_and(|q| q.contains("auth"));

        let response = if with_qop {
            md5_hex(&format!("{}:{}:{}:{}:auth:{}", ha1, self.nonce, nc, cnonce, ha2))
        } else {
            // RFC 2069
            md5_hex(&format!("{}:{}:{}", ha1, self.nonce, ha2))
        };

        let mut parts = vec![
            format!("username=\"{}\"", username),
            format!("realm=\"{}\"", self.realm),
            format!("nonce=\"{}\"", self.nonce),
            format!("uri=\"{}\"", uri),
            format!("response=\"{}\"", response),
            format!("algorithm={}", self.algorithm),
        ];
        if with_qop {
            parts.push("qop=auth".to_string());
            parts.push(format!("nc={}", nc));
            parts.push(format!("cnonce=\"{}\"", cnonce));
        }
        if let Some(ref opaque) = self.opaque {
            parts.push(format!("opaque=\"{}\"", opaque));
        }

        format!("Digest {}", parts.join(", "))
    }
}

/// Builds a Basic `Authorization` header value.
pub fn basic_auth(username: &str, password: &str) -> String {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password));
    format!("Basic {}", encoded)
}

/// Splits `key=value, key="quoted, value"` pairs. Keys are lowercased.
fn parse_auth_params(content: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = content;

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        let Some(eq) = rest.find('=') else {
            break;
        };
        let key = rest[..eq].trim().to_lowercase();
        rest = &rest[eq + 1..];

        let value = if let Some(quoted) = rest.strip_prefix('"') {
            let mut value = String::new();
            let mut consumed = quoted.len();
            let mut escaped = false;
            for (idx, c) in quoted.char_indices() {
                match c {
                    _ if escaped => {
                        value.push(c);
                        escaped = false;
                    }
                    '\\' => escaped = true,
                    '"' => {
                        consumed = idx + 1;
                        break;
                    }
                    _ => value.push(c),
                }
            }
            rest = &quoted[consumed..];
            value
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            let value = rest[..end].trim().to_string();
            rest = &rest[end..];
            value
        };

        if key.is_empty() {
            break;
        }
        params.insert(key, value);
    }

    params
}

fn generate_cnonce() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_challenge() {
        let header = r#"Digest realm="dav@example.com", nonce="abc123", qop="auth,auth-int", algorithm=MD5, opaque="xyz""#;
        let auth = DigestAuth::parse(header).unwrap();

        assert_eq!(auth.realm, "dav@example.com");
        assert_eq!(auth.nonce, "abc123");
        assert_eq!(auth.qop.as_deref(), Some("auth,auth-int"));
        assert_eq!(auth.algorithm, "MD5");
        assert_eq!(auth.opaque.as_deref(), Some("xyz"));
    }

    #[test]
    fn parse_minimal_challenge() {
        let auth = DigestAuth::parse(r#"Digest realm="test", nonce="123""#).unwrap();
        assert!(auth.qop.is_none());
        assert_eq!(auth.algorithm, "MD5");
    }

    #[test]
    fn rejects_non_digest() {
        assert!(DigestAuth::parse(r#"Basic realm="x""#).is_none());
        assert!(DigestAuth::parse(r#"Digest realm="x""#).is_none());
    }

    #[test]
    fn authorize_counts_requests() {
        let mut auth = DigestAuth::parse(r#"Digest realm="test", nonce="abc123", qop="auth""#).unwrap();

        let first = auth.authorize("REPORT", "/cal/", "anna", "secret");
        assert!(first.starts_with("Digest "));
        assert!(first.contains("username=\"anna\""));
        assert!(first.contains("uri=\"/cal/\""));
        assert!(first.contains("nc=00000001"));

        let second = auth.authorize("REPORT", "/cal/", "anna", "secret");
        assert!(second.contains("nc=00000002"));
    }

    #[test]
    fn authorize_without_qop_omits_counter() {
        let mut auth = DigestAuth::parse(r#"Digest realm="r", nonce="n""#).unwrap();
        let header = auth.authorize("GET", "/", "u", "p");
        assert!(!header.contains("nc="));
        assert!(!header.contains("cnonce"));
    }

    #[test]
    fn basic_auth_encoding() {
        assert_eq!(basic_auth("user", "password"), "Basic dXNlcjpwYXNzd29yZA==");
    }

    #[test]
    fn md5_hex_computation() {
        assert_eq!(md5_hex("hello"), "5d41402abc4b2a76b9719d911017c592");
    }
}
