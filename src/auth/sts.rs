//! STS-backed authentication
//!
//! Two pieces: assuming an external role to obtain session credentials, and
//! the signed sts-identity login flow, where the client signs a
//! GetCallerIdentity call and the backend verifies the signature to issue a
//! token directly (no ciphertext round-trip).

use chrono::Utc;
use serde::Deserialize;

use crate::auth::token::TokenPayload;
use crate::errors::{Result, StrongboxError};
use crate::http;
use crate::sign::{self, Credentials};

const STS_API_VERSION: &str = "2011-06-15";
const CALLER_IDENTITY_BODY: &str = "Action=GetCallerIdentity&Version=2011-06-15";
const ROLE_SESSION_NAME: &str = "StrongboxAssumeRole";

#[derive(Debug, Deserialize)]
struct AssumeRoleEnvelope {
    #[serde(rename = "AssumeRoleResponse")]
    response: AssumeRoleResponse,
}

#[derive(Debug, Deserialize)]
struct AssumeRoleResponse {
    #[serde(rename = "AssumeRoleResult")]
    result: AssumeRoleResult,
}

#[derive(Debug, Deserialize)]
struct AssumeRoleResult {
    #[serde(rename = "Credentials")]
    credentials: AssumedCredentials,
}

#[derive(Debug, Deserialize)]
struct AssumedCredentials {
    #[serde(rename = "AccessKeyId")]
    access_key_id: String,
    #[serde(rename = "SecretAccessKey")]
    secret_access_key: String,
    #[serde(rename = "SessionToken")]
    session_token: String,
}

fn sts_endpoint(endpoint_override: Option<&str>, region: &str) -> String {
    match endpoint_override {
        Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
        None => format!("https://{}", sign::service_host("sts", region)),
    }
}

/// Assume `role_arn` and return the resulting session credentials.
pub(crate) async fn assume_role(
    client: &reqwest::Client,
    source_credentials: &Credentials,
    role_arn: &str,
    region: &str,
    endpoint_override: Option<&str>,
) -> Result<Credentials> {
    tracing::debug!(role_arn, "assuming role");

    let url = format!(
        "{}/?Version={}&Action=AssumeRole&RoleSessionName={}&RoleArn={}",
        sts_endpoint(endpoint_override, region),
        STS_API_VERSION,
        ROLE_SESSION_NAME,
        urlencoding::encode(role_arn)
    );

    let signed = sign::sign_request(
        "GET",
        &url,
        "sts",
        region,
        &[("Accept".to_string(), "application/json".to_string())],
        b"",
        source_credentials,
        Utc::now(),
    )?;

    let response = http::send_signed(client, signed).await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StrongboxError::Auth(format!(
            "AssumeRole failed (status {}): {}",
            status,
            body.trim()
        )));
    }

    let envelope: AssumeRoleEnvelope = response
        .json()
        .await
        .map_err(|e| StrongboxError::Auth(format!("malformed AssumeRole response: {}", e)))?;
    let creds = envelope.response.result.credentials;

    Ok(Credentials::new(
        creds.access_key_id,
        creds.secret_access_key,
        Some(creds.session_token),
    ))
}

/// Authenticate via the signed sts-identity route.
///
/// The client signs a GetCallerIdentity request for the given credentials
/// and hands the signed headers to the backend, which replays the call to
/// verify who the caller is and answers with a token payload.
pub(crate) async fn sts_identity_login(
    client: &reqwest::Client,
    host_url: &str,
    credentials: &Credentials,
    region: &str,
    sts_endpoint_override: Option<&str>,
) -> Result<TokenPayload> {
    tracing::debug!(region, "authenticating via signed sts-identity");

    let sts_url = format!("{}/", sts_endpoint(sts_endpoint_override, region));
    let signed = sign::sign_request(
        "POST",
        &sts_url,
        "sts",
        region,
        &[(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded; charset=utf-8".to_string(),
        )],
        CALLER_IDENTITY_BODY.as_bytes(),
        credentials,
        Utc::now(),
    )?;

    // The signed headers go to the backend, not to STS; the backend replays
    // the call itself.
    let mut builder = client.post(format!("{}/v2/auth/sts-identity", host_url));
    for (name, value) in &signed.headers {
        builder = builder.header(name, value);
    }
    let request = builder.body(CALLER_IDENTITY_BODY).build()?;

    let response = http::execute(client, request).await?;
    let value = http::read_json(response).await?;
    if value.is_null() {
        return Err(StrongboxError::NoResponse);
    }

    let payload: TokenPayload = serde_json::from_value(value)
        .map_err(|e| StrongboxError::Auth(format!("malformed sts-identity response: {}", e)))?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regional_endpoint_and_override() {
        assert_eq!(
            sts_endpoint(None, "us-east-1"),
            "https://sts.us-east-1.amazonaws.com"
        );
        assert_eq!(
            sts_endpoint(None, "cn-north-1"),
            "https://sts.cn-north-1.amazonaws.com.cn"
        );
        assert_eq!(
            sts_endpoint(Some("http://127.0.0.1:9000/"), "us-east-1"),
            "http://127.0.0.1:9000"
        );
    }

    #[test]
    fn assume_role_response_parses() {
        let body = serde_json::json!({
            "AssumeRoleResponse": {
                "AssumeRoleResult": {
                    "Credentials": {
                        "AccessKeyId": "ASIATESTACCESSKEY",
                        "SecretAccessKey": "testsecretkey123",
                        "SessionToken": "testtoken456",
                        "Expiration": 1735689600
                    }
                }
            }
        });
        let envelope: AssumeRoleEnvelope = serde_json::from_value(body).unwrap();
        let creds = envelope.response.result.credentials;
        assert_eq!(creds.access_key_id, "ASIATESTACCESSKEY");
        assert_eq!(creds.session_token, "testtoken456");
    }
}
