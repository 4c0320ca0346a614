//! AWS Signature Version 4 request signing
//!
//! Builds signed requests proving control of a set of long-lived or session
//! credentials, without performing any network I/O. The signature is fully
//! determined by its inputs plus the timestamp, which is captured once per
//! signing call and threaded through every step.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::errors::{Result, StrongboxError};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// AWS access credentials used for request signing
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Present for temporary (session/assumed-role) credentials.
    pub session_token: Option<String>,
}

// Key material stays out of Debug output and logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_deref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    /// Try to load from the standard AWS environment variables
    pub fn from_env() -> Result<Self> {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID")
            .or_else(|_| std::env::var("AWS_ACCESS_KEY"))
            .map_err(|_| {
                StrongboxError::Config(
                    "AWS_ACCESS_KEY_ID environment variable not set".to_string(),
                )
            })?;

        let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .or_else(|_| std::env::var("AWS_SECRET_KEY"))
            .map_err(|_| {
                StrongboxError::Config(
                    "AWS_SECRET_ACCESS_KEY environment variable not set".to_string(),
                )
            })?;

        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id: access_key,
            secret_access_key: secret_key,
            session_token,
        })
    }
}

/// A signed HTTP request, immutable once built and consumed exactly once
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Regional service host, accounting for the China partition's distinct
/// top-level domain.
pub(crate) fn service_host(service: &str, region: &str) -> String {
    if region.starts_with("cn-") {
        format!("{}.{}.amazonaws.com.cn", service, region)
    } else {
        format!("{}.{}.amazonaws.com", service, region)
    }
}

/// Sign an HTTP request with AWS SigV4
///
/// `extra_headers` are included in the canonical headers and the
/// signed-headers list alongside the computed `host`, `x-amz-date`, and
/// (for session credentials) `x-amz-security-token` headers. The same
/// inputs at the same `timestamp` always yield byte-identical output.
pub fn sign_request(
    method: &str,
    url: &str,
    service: &str,
    region: &str,
    extra_headers: &[(String, String)],
    body: &[u8],
    credentials: &Credentials,
    timestamp: DateTime<Utc>,
) -> Result<SignedRequest> {
    let parsed_url = url::Url::parse(url)?;

    let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
    let date = timestamp.format("%Y%m%d").to_string();

    // Host must match what the transport will actually send: include the
    // port only when it is non-standard for the scheme.
    let host = canonical_host(&parsed_url).ok_or_else(|| {
        StrongboxError::Auth(format!("cannot sign URL without a host: {}", url))
    })?;

    // Canonical headers: lower-cased names, trimmed values, sorted by name.
    let mut headers: Vec<(String, String)> = Vec::with_capacity(extra_headers.len() + 3);
    headers.push(("host".to_string(), host));
    headers.push(("x-amz-date".to_string(), amz_date.clone()));
    if let Some(token) = &credentials.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    for (name, value) in extra_headers {
        headers.push((name.to_ascii_lowercase(), value.trim().to_string()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        parsed_url.path(),
        canonical_query(&parsed_url),
        canonical_headers,
        signed_headers,
        sha256_hex(body)
    );

    let scope = format!("{}/{}/{}/aws4_request", date, region, service);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(&credentials.secret_access_key, &date, region, service)?;
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, credentials.access_key_id, scope, signed_headers, signature
    );

    let mut out_headers = vec![
        ("x-amz-date".to_string(), amz_date),
        ("Authorization".to_string(), authorization),
    ];
    if let Some(token) = &credentials.session_token {
        out_headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    for (name, value) in extra_headers {
        out_headers.push((name.clone(), value.clone()));
    }

    Ok(SignedRequest {
        method: method.to_string(),
        url: url.to_string(),
        headers: out_headers,
        body: body.to_vec(),
    })
}

fn canonical_host(url: &url::Url) -> Option<String> {
    let host = url.host_str()?;
    match url.port() {
        Some(port) => {
            let is_standard = match url.scheme() {
                "https" => port == 443,
                "http" => port == 80,
                _ => false,
            };
            if is_standard {
                Some(host.to_string())
            } else {
                Some(format!("{}:{}", host, port))
            }
        }
        None => Some(host.to_string()),
    }
}

/// Canonical query string: pairs percent-encoded with the strict RFC 3986
/// unreserved set, sorted by key then value.
fn canonical_query(url: &url::Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            (
                urlencoding::encode(&k).into_owned(),
                urlencoding::encode(&v).into_owned(),
            )
        })
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Chained key derivation: HMAC("AWS4" + secret, date) -> region -> service
/// -> "aws4_request".
fn derive_signing_key(
    secret_key: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StrongboxError::Auth(format!("HMAC key error: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Compute the hex-encoded SHA256 hash of data
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_credentials() -> Credentials {
        Credentials::new(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            None,
        )
    }

    fn suite_timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap()
    }

    #[test]
    fn sha256_hex_known_value() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    // The published "get-vanilla" SigV4 test vector.
    #[test]
    fn matches_reference_test_vector() {
        let signed = sign_request(
            "GET",
            "https://example.amazonaws.com/",
            "service",
            "us-east-1",
            &[],
            b"",
            &test_credentials(),
            suite_timestamp(),
        )
        .unwrap();

        let authorization = signed
            .headers
            .iter()
            .find(|(name, _)| name == "Authorization")
            .map(|(_, value)| value.as_str())
            .unwrap();

        assert_eq!(
            authorization,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
    }

    #[test]
    fn signing_is_deterministic() {
        let sign = || {
            sign_request(
                "POST",
                "https://kms.us-west-2.amazonaws.com/",
                "kms",
                "us-west-2",
                &[("Content-Type".to_string(), "application/x-amz-json-1.0".to_string())],
                br#"{"CiphertextBlob":"abc"}"#,
                &test_credentials(),
                suite_timestamp(),
            )
            .unwrap()
        };

        let first = sign();
        let second = sign();
        assert_eq!(first.headers, second.headers);
        assert_eq!(first.body, second.body);
    }

    #[test]
    fn session_token_is_signed_and_sent() {
        let credentials = Credentials::new("AKID", "secret", Some("SESSION".to_string()));
        let signed = sign_request(
            "GET",
            "https://sts.us-east-1.amazonaws.com/?Action=AssumeRole",
            "sts",
            "us-east-1",
            &[],
            b"",
            &credentials,
            suite_timestamp(),
        )
        .unwrap();

        let authorization = signed
            .headers
            .iter()
            .find(|(name, _)| name == "Authorization")
            .map(|(_, value)| value.as_str())
            .unwrap();
        assert!(authorization.contains("host;x-amz-date;x-amz-security-token"));
        assert!(signed
            .headers
            .iter()
            .any(|(name, value)| name == "x-amz-security-token" && value == "SESSION"));
    }

    #[test]
    fn non_standard_port_kept_in_host() {
        let url = url::Url::parse("http://127.0.0.1:8080/path").unwrap();
        assert_eq!(canonical_host(&url).unwrap(), "127.0.0.1:8080");

        let url = url::Url::parse("https://example.com:443/path").unwrap();
        assert_eq!(canonical_host(&url).unwrap(), "example.com");
    }

    #[test]
    fn china_partition_host_suffix() {
        assert_eq!(
            service_host("kms", "cn-north-1"),
            "kms.cn-north-1.amazonaws.com.cn"
        );
        assert_eq!(service_host("kms", "eu-west-1"), "kms.eu-west-1.amazonaws.com");
    }

    #[test]
    fn canonical_query_is_sorted_and_encoded() {
        let url = url::Url::parse("https://example.com/?b=2&a=1&a=0&c=a b").unwrap();
        assert_eq!(canonical_query(&url), "a=0&a=1&b=2&c=a%20b");
    }
}
