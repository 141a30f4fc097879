//! Credential extraction from HTTP Basic authentication.
//!
//! The gateway never verifies credentials itself. An `Authorization: Basic`
//! header is decoded into an access/secret key pair and handed, verbatim,
//! to the storage backend. A missing or malformed header means anonymous
//! access.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;

const BASIC_SCHEME: &str = "basic ";

/// Access/secret key pair forwarded to the storage backend.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

// Keep the secret out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Read the optional credential pair carried by the request headers.
pub fn extract_credentials(headers: &HeaderMap) -> Option<Credentials> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    parse_basic_authorization(value)
}

/// Parse an `Authorization` header value of the form `Basic base64(user:pass)`.
///
/// The scheme is matched case-insensitively. The decoded user and password
/// are returned untouched: no trimming, no validation. Anything that is not
/// a well-formed Basic credential yields `None`.
pub fn parse_basic_authorization(value: &str) -> Option<Credentials> {
    if value.len() < BASIC_SCHEME.len()
        || !value.is_char_boundary(BASIC_SCHEME.len())
        || !value[..BASIC_SCHEME.len()].eq_ignore_ascii_case(BASIC_SCHEME)
    {
        return None;
    }

    let decoded = STANDARD.decode(&value[BASIC_SCHEME.len()..]).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (access_key, secret_key) = decoded.split_once(':')?;
    Some(Credentials::new(access_key, secret_key))
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn basic(user_pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(user_pass))
    }

    #[test]
    fn test_parse_basic_authorization() {
        let creds = parse_basic_authorization(&basic("AKIDEXAMPLE:wJalrXUtnFEMI")).unwrap();
        assert_eq!(creds.access_key, "AKIDEXAMPLE");
        assert_eq!(creds.secret_key, "wJalrXUtnFEMI");
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        let header = format!("bAsIc {}", STANDARD.encode("a:b"));
        assert_eq!(
            parse_basic_authorization(&header),
            Some(Credentials::new("a", "b"))
        );
    }

    #[test]
    fn test_values_are_verbatim() {
        let creds = parse_basic_authorization(&basic(" key : sec:ret ")).unwrap();
        assert_eq!(creds.access_key, " key ");
        assert_eq!(creds.secret_key, " sec:ret ");
    }

    #[test]
    fn test_empty_user_and_password() {
        assert_eq!(
            parse_basic_authorization(&basic(":")),
            Some(Credentials::new("", ""))
        );
    }

    #[test]
    fn test_malformed_headers() {
        assert!(parse_basic_authorization("").is_none());
        assert!(parse_basic_authorization("Basic").is_none());
        assert!(parse_basic_authorization("Basic not-base64!!").is_none());
        assert!(parse_basic_authorization(&basic("no-colon")).is_none());
        assert!(parse_basic_authorization("Bearer abc.def").is_none());
        assert!(parse_basic_authorization(
            "AWS4-HMAC-SHA256 Credential=AKID/20260101/us-east-1/s3/aws4_request"
        )
        .is_none());
    }

    #[test]
    fn test_extract_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(extract_credentials(&headers).is_none());

        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&basic("user:pass")).unwrap(),
        );
        assert_eq!(
            extract_credentials(&headers),
            Some(Credentials::new("user", "pass"))
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", Credentials::new("user", "hunter2"));
        assert!(rendered.contains("user"));
        assert!(!rendered.contains("hunter2"));
    }
}
