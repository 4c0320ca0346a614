//! Credential-source resolution
//!
//! Picks exactly one authentication strategy for the current execution
//! context, and implements the compute-platform metadata lookups (EC2
//! instance metadata, ECS task metadata, Lambda function configuration)
//! that derive the caller's account id, role name, and region.

use chrono::Utc;
use serde::Deserialize;

use crate::config::ClientConfig;
use crate::errors::{Result, StrongboxError};
use crate::http;
use crate::sign::{self, Credentials};

/// The identity a signing-based auth flow proves to the backend
#[derive(Debug, Clone)]
pub struct IdentityDescriptor {
    pub account_id: String,
    pub role_name: String,
    pub region: String,
}

impl IdentityDescriptor {
    pub fn principal_arn(&self) -> String {
        format!("arn:aws:iam::{}:role/{}", self.account_id, self.role_name)
    }
}

/// The authentication strategy selected for this client
#[derive(Debug, Clone)]
pub(crate) enum AuthStrategy {
    /// Pre-issued token; no network call.
    StaticToken(String),
    /// Interactive username/password (+ MFA) login at the terminal.
    Prompt,
    /// Assume an external role, then prove the session identity via the
    /// signed sts-identity flow.
    AssumeRole { role_arn: String, region: String },
    /// Prove explicitly supplied credentials via the signed sts-identity
    /// flow.
    ExplicitCredentials {
        credentials: Credentials,
        region: String,
    },
    /// Discover the caller's identity from platform metadata and use the
    /// legacy role-based login.
    PlatformMetadata,
}

impl AuthStrategy {
    /// Name for logging. Deliberately excludes credential material.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            AuthStrategy::StaticToken(_) => "static-token",
            AuthStrategy::Prompt => "prompt",
            AuthStrategy::AssumeRole { .. } => "assume-role",
            AuthStrategy::ExplicitCredentials { .. } => "explicit-credentials",
            AuthStrategy::PlatformMetadata => "platform-metadata",
        }
    }
}

/// Select the strategy for a configuration.
///
/// Precedence: static token, interactive prompt, assumed role (role ARN +
/// region configured), explicit credentials, platform metadata. Platform
/// metadata is always selectable here; it fails at lookup time with
/// `Config` when no metadata endpoint answers.
pub(crate) fn select_strategy(config: &ClientConfig) -> Result<AuthStrategy> {
    if let Some(token) = config.resolved_token() {
        return Ok(AuthStrategy::StaticToken(token));
    }

    if config.prompt {
        return Ok(AuthStrategy::Prompt);
    }

    if let Some(role_arn) = &config.assume_role_arn {
        let region = config.resolved_region().ok_or_else(|| {
            StrongboxError::Config(
                "assume_role_arn requires a region to be configured".to_string(),
            )
        })?;
        return Ok(AuthStrategy::AssumeRole {
            role_arn: role_arn.clone(),
            region,
        });
    }

    if let Some(credentials) = &config.credentials {
        let region = config.resolved_region().ok_or_else(|| {
            StrongboxError::Config(
                "explicit credentials require a region to be configured".to_string(),
            )
        })?;
        return Ok(AuthStrategy::ExplicitCredentials {
            credentials: credentials.clone(),
            region,
        });
    }

    Ok(AuthStrategy::PlatformMetadata)
}

#[derive(Debug, Deserialize)]
struct Ec2IamInfo {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "InstanceProfileArn")]
    instance_profile_arn: String,
}

#[derive(Debug, Deserialize)]
struct Ec2RoleCredentials {
    #[serde(rename = "AccessKeyId")]
    access_key_id: String,
    #[serde(rename = "SecretAccessKey")]
    secret_access_key: String,
    #[serde(rename = "Token")]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Ec2InstanceIdentity {
    region: String,
}

#[derive(Debug, Deserialize)]
struct EcsTaskMetadata {
    #[serde(rename = "TaskARN")]
    task_arn: String,
}

#[derive(Debug, Deserialize)]
struct LambdaConfiguration {
    #[serde(rename = "Role")]
    role: String,
}

/// Discover identity and session credentials from the instance-metadata
/// service.
pub(crate) async fn ec2_identity(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<(IdentityDescriptor, Credentials)> {
    tracing::debug!("discovering identity from instance metadata");

    let info_url = format!("{}/latest/meta-data/iam/info", base_url);
    let info: Ec2IamInfo = metadata_json(client, &info_url).await?;
    if info.code != "Success" {
        return Err(StrongboxError::Config(format!(
            "instance metadata iam/info reported {}",
            info.code
        )));
    }
    let account_id = arn_segment(&info.instance_profile_arn, 4)?;

    let role_url = format!("{}/latest/meta-data/iam/security-credentials/", base_url);
    let role_name = metadata_text(client, &role_url).await?.trim().to_string();
    if role_name.is_empty() {
        return Err(StrongboxError::Config(
            "instance metadata returned no role name".to_string(),
        ));
    }

    let creds_url = format!("{}{}", role_url, role_name);
    let creds: Ec2RoleCredentials = metadata_json(client, &creds_url).await?;

    let identity_url = format!("{}/latest/dynamic/instance-identity/document", base_url);
    let identity: Ec2InstanceIdentity = metadata_json(client, &identity_url).await?;

    Ok((
        IdentityDescriptor {
            account_id,
            role_name,
            region: identity.region,
        },
        Credentials::new(creds.access_key_id, creds.secret_access_key, creds.token),
    ))
}

/// Derive identity from the task-metadata endpoint. The task role name is
/// configuration; account and region come out of the task ARN.
pub(crate) async fn ecs_identity(
    client: &reqwest::Client,
    metadata_url: &str,
    task_role_name: &str,
) -> Result<IdentityDescriptor> {
    tracing::debug!("discovering identity from task metadata");

    let metadata: EcsTaskMetadata = metadata_json(client, metadata_url).await?;
    Ok(IdentityDescriptor {
        account_id: arn_segment(&metadata.task_arn, 4)?,
        role_name: task_role_name.to_string(),
        region: arn_segment(&metadata.task_arn, 3)?,
    })
}

/// Derive identity from a Lambda invocation's function ARN, looking up the
/// execution role through a signed GetFunctionConfiguration call.
pub(crate) async fn lambda_identity(
    client: &reqwest::Client,
    function_arn: &str,
    credentials: &Credentials,
    endpoint_override: Option<&str>,
) -> Result<IdentityDescriptor> {
    tracing::debug!(function_arn, "discovering identity from function configuration");

    let region = arn_segment(function_arn, 3)?;
    let account_id = arn_segment(function_arn, 4)?;
    let function_name = arn_segment(function_arn, 6)?;
    let qualifier = function_arn.split(':').nth(7);

    let endpoint = match endpoint_override {
        Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
        None => format!("https://{}", sign::service_host("lambda", &region)),
    };
    let mut url = format!(
        "{}/2015-03-31/functions/{}/configuration",
        endpoint, function_name
    );
    if let Some(qualifier) = qualifier {
        url.push_str(&format!("?Qualifier={}", urlencoding::encode(qualifier)));
    }

    let signed = sign::sign_request(
        "GET",
        &url,
        "lambda",
        &region,
        &[],
        b"",
        credentials,
        Utc::now(),
    )?;
    let response = http::send_signed(client, signed).await?;
    let value = http::read_json(response).await.map_err(|e| {
        StrongboxError::Auth(format!("function configuration lookup failed: {}", e))
    })?;
    let configuration: LambdaConfiguration = serde_json::from_value(value)?;

    // Execution role ARN ends in "role/<name>".
    let role_name = configuration
        .role
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            StrongboxError::Auth(format!(
                "malformed execution role ARN: {}",
                configuration.role
            ))
        })?
        .to_string();

    Ok(IdentityDescriptor {
        account_id,
        role_name,
        region,
    })
}

async fn metadata_response(client: &reqwest::Client, url: &str) -> Result<reqwest::Response> {
    let request = client.get(url).build()?;
    let response = http::execute(client, request)
        .await
        .map_err(|e| StrongboxError::Config(format!("metadata endpoint unreachable: {}", e)))?;
    if !response.status().is_success() {
        return Err(StrongboxError::Config(format!(
            "metadata endpoint {} returned status {}",
            url,
            response.status()
        )));
    }
    Ok(response)
}

async fn metadata_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T> {
    let response = metadata_response(client, url).await?;
    let value = response
        .json()
        .await
        .map_err(|e| StrongboxError::Config(format!("malformed metadata response: {}", e)))?;
    Ok(value)
}

async fn metadata_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = metadata_response(client, url).await?;
    Ok(response.text().await?)
}

fn arn_segment(arn: &str, index: usize) -> Result<String> {
    arn.split(':')
        .nth(index)
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_string())
        .ok_or_else(|| StrongboxError::Config(format!("malformed ARN: {}", arn)))
}
