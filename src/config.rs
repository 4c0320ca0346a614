//! Client configuration
//!
//! Explicit configuration always wins over environment variables; the
//! `STRONGBOX_TOKEN` and `STRONGBOX_ADDR` variables only fill fields the
//! caller left unset.

use std::time::Duration;

use crate::errors::{Result, StrongboxError};
use crate::sign::Credentials;

/// Environment variable holding a pre-issued bearer token.
pub const TOKEN_ENV_VAR: &str = "STRONGBOX_TOKEN";
/// Environment variable holding the backend base URL.
pub const ADDR_ENV_VAR: &str = "STRONGBOX_ADDR";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_EC2_METADATA_BASE: &str = "http://169.254.169.254";
const DEFAULT_ECS_METADATA_URL: &str = "http://169.254.170.2/v2/metadata";

/// Configuration for a [`crate::StrongboxClient`]
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Backend base URL. Falls back to `STRONGBOX_ADDR` when unset.
    pub host_url: Option<String>,
    /// Pre-issued bearer token, bypassing all authentication.
    /// Falls back to `STRONGBOX_TOKEN` when unset.
    pub token: Option<String>,
    /// Explicit AWS credentials for the signed sts-identity login flow,
    /// or the source credentials for an assume-role flow.
    pub credentials: Option<Credentials>,
    /// AWS region for signing. Falls back to `AWS_REGION`/`AWS_DEFAULT_REGION`.
    pub region: Option<String>,
    /// Role to assume before authenticating.
    pub assume_role_arn: Option<String>,
    /// Task role name when running on a container orchestrator.
    pub ecs_task_role_name: Option<String>,
    /// Invoked-function ARN when running inside a Lambda invocation.
    pub lambda_function_arn: Option<String>,
    /// Authenticate interactively at the terminal.
    pub prompt: bool,
    /// Request timeout applied to the underlying HTTP client.
    pub timeout: Option<Duration>,

    /// Instance-metadata base URL. Override for tests.
    pub ec2_metadata_base: Option<String>,
    /// Task-metadata URL. Override for tests.
    pub ecs_metadata_url: Option<String>,
    /// STS endpoint override. Default is the regional STS host.
    pub sts_endpoint: Option<String>,
    /// KMS endpoint override. Default is the regional KMS host.
    pub kms_endpoint: Option<String>,
    /// Lambda control-plane endpoint override.
    pub lambda_endpoint: Option<String>,
}

impl ClientConfig {
    pub fn new(host_url: impl Into<String>) -> Self {
        Self {
            host_url: Some(host_url.into()),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_assume_role(mut self, role_arn: impl Into<String>) -> Self {
        self.assume_role_arn = Some(role_arn.into());
        self
    }

    pub fn with_ecs_task_role(mut self, role_name: impl Into<String>) -> Self {
        self.ecs_task_role_name = Some(role_name.into());
        self
    }

    pub fn with_lambda_function_arn(mut self, arn: impl Into<String>) -> Self {
        self.lambda_function_arn = Some(arn.into());
        self
    }

    pub fn with_prompt(mut self, prompt: bool) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Base URL of the backend, explicit config first, then `STRONGBOX_ADDR`.
    pub(crate) fn resolved_host_url(&self) -> Result<String> {
        if let Some(url) = &self.host_url {
            return Ok(url.trim_end_matches('/').to_string());
        }
        match non_empty_env(ADDR_ENV_VAR) {
            Some(url) => {
                tracing::debug!(var = ADDR_ENV_VAR, "using backend address from environment");
                Ok(url.trim_end_matches('/').to_string())
            }
            None => Err(StrongboxError::Config(format!(
                "host_url must be set (or provide {})",
                ADDR_ENV_VAR
            ))),
        }
    }

    /// Pre-issued token, explicit config first, then `STRONGBOX_TOKEN`.
    pub(crate) fn resolved_token(&self) -> Option<String> {
        if self.token.is_some() {
            return self.token.clone();
        }
        let token = non_empty_env(TOKEN_ENV_VAR);
        if token.is_some() {
            tracing::debug!(var = TOKEN_ENV_VAR, "using token from environment");
        }
        token
    }

    /// Region from config, then the usual AWS environment variables.
    pub(crate) fn resolved_region(&self) -> Option<String> {
        self.region
            .clone()
            .or_else(|| non_empty_env("AWS_REGION"))
            .or_else(|| non_empty_env("AWS_DEFAULT_REGION"))
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }

    pub(crate) fn ec2_metadata_base(&self) -> &str {
        self.ec2_metadata_base
            .as_deref()
            .unwrap_or(DEFAULT_EC2_METADATA_BASE)
    }

    pub(crate) fn ecs_metadata_url(&self) -> &str {
        self.ecs_metadata_url
            .as_deref()
            .unwrap_or(DEFAULT_ECS_METADATA_URL)
    }
}

/// Treat unset, empty, and the literal string "undefined" as absent.
fn non_empty_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() && value != "undefined" => Some(value),
        _ => None,
    }
}
