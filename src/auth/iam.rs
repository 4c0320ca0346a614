//! Legacy role-based login routes
//!
//! Both routes answer with an `auth_data` ciphertext for
//! [`crate::auth::kms`] to decrypt. The v2 principal route is preferred;
//! backends that predate it 404 there, so we fall back to the v1 role
//! route.

use serde_json::json;

use crate::auth::resolver::IdentityDescriptor;
use crate::errors::{Result, StrongboxError};
use crate::http;

/// Exchange a platform-derived identity for the auth ciphertext.
pub(crate) async fn role_login(
    client: &reqwest::Client,
    host_url: &str,
    identity: &IdentityDescriptor,
) -> Result<String> {
    match iam_principal_login(client, host_url, identity).await {
        Err(StrongboxError::Api { status: 404, .. }) => {
            tracing::debug!("iam-principal route not available, falling back to v1 iam-role");
            iam_role_login(client, host_url, identity).await
        }
        other => other,
    }
}

/// `POST /v2/auth/iam-principal` with the caller's principal ARN.
async fn iam_principal_login(
    client: &reqwest::Client,
    host_url: &str,
    identity: &IdentityDescriptor,
) -> Result<String> {
    let request = client
        .post(format!("{}/v2/auth/iam-principal", host_url))
        .json(&json!({
            "iam_principal_arn": identity.principal_arn(),
            "region": identity.region,
        }))
        .build()?;
    let response = http::execute(client, request).await?;
    extract_auth_data(http::read_json(response).await?)
}

/// `POST /v1/auth/iam-role`, the oldest login route.
async fn iam_role_login(
    client: &reqwest::Client,
    host_url: &str,
    identity: &IdentityDescriptor,
) -> Result<String> {
    let request = client
        .post(format!("{}/v1/auth/iam-role", host_url))
        .json(&json!({
            "account_id": identity.account_id,
            "role_name": identity.role_name,
            "region": identity.region,
        }))
        .build()?;
    let response = http::execute(client, request).await?;
    extract_auth_data(http::read_json(response).await?)
}

fn extract_auth_data(value: serde_json::Value) -> Result<String> {
    if value.is_null() {
        return Err(StrongboxError::NoResponse);
    }
    value["auth_data"]
        .as_str()
        .filter(|data| !data.is_empty())
        .map(|data| data.to_string())
        .ok_or(StrongboxError::MissingCiphertext)
}
