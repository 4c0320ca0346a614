//! The Strongbox client: token orchestration and the secret surface

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

use crate::auth::resolver::{self, AuthStrategy};
use crate::auth::token::{AuthSession, AuthToken};
use crate::auth::user::{PromptProvider, TerminalPrompt};
use crate::auth::{iam, kms, sts, user};
use crate::config::ClientConfig;
use crate::errors::{Result, StrongboxError};
use crate::http;
use crate::sign::Credentials;

const CLIENT_HEADER: &str = "X-Strongbox-Client";
const CLIENT_HEADER_VALUE: &str =
    concat!("StrongboxRustClient/", env!("CARGO_PKG_VERSION"));
const TOKEN_HEADER: &str = "X-Vault-Token";

/// Client for the Strongbox secrets backend.
///
/// Holds the single cached bearer token; safe to share across tasks via
/// `Arc` — concurrent `get_token` calls de-duplicate into one
/// authentication flow.
pub struct StrongboxClient {
    http: reqwest::Client,
    host_url: String,
    config: ClientConfig,
    session: AuthSession,
    prompt: Arc<dyn PromptProvider>,
}

impl StrongboxClient {
    /// Build a client with the production terminal prompt.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_prompt_provider(config, Arc::new(TerminalPrompt))
    }

    /// Build a client with a custom prompt provider (scripted answers in
    /// tests, an alternate UI in embedding applications).
    pub fn with_prompt_provider(
        config: ClientConfig,
        prompt: Arc<dyn PromptProvider>,
    ) -> Result<Self> {
        let host_url = config.resolved_host_url()?;
        url::Url::parse(&host_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            CLIENT_HEADER,
            HeaderValue::from_static(CLIENT_HEADER_VALUE),
        );

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            host_url,
            config,
            session: AuthSession::new(),
            prompt,
        })
    }

    /// Return a valid bearer token, authenticating if the cached one is
    /// absent or past its expiry margin.
    pub async fn get_token(&self) -> Result<String> {
        self.session.get_or_fetch(|| self.fetch_token()).await
    }

    /// Drop the cached token so the next call re-authenticates.
    pub async fn invalidate_token(&self) {
        self.session.invalidate().await;
    }

    async fn fetch_token(&self) -> Result<AuthToken> {
        let strategy = resolver::select_strategy(&self.config)?;
        tracing::debug!(strategy = strategy.name(), "fetching token");

        match strategy {
            AuthStrategy::StaticToken(token) => Ok(AuthToken::pre_issued(token)),

            AuthStrategy::Prompt => {
                let payload = wrap_step(
                    "interactive login",
                    user::login(&self.http, &self.host_url, &self.prompt).await,
                )?;
                Ok(AuthToken::from_payload(&payload))
            }

            AuthStrategy::AssumeRole { role_arn, region } => {
                let source = self.source_credentials()?;
                let session_creds = wrap_step(
                    "assume role",
                    sts::assume_role(
                        &self.http,
                        &source,
                        &role_arn,
                        &region,
                        self.config.sts_endpoint.as_deref(),
                    )
                    .await,
                )?;
                let payload = wrap_step(
                    "sts-identity login",
                    sts::sts_identity_login(
                        &self.http,
                        &self.host_url,
                        &session_creds,
                        &region,
                        self.config.sts_endpoint.as_deref(),
                    )
                    .await,
                )?;
                Ok(AuthToken::from_payload(&payload))
            }

            AuthStrategy::ExplicitCredentials {
                credentials,
                region,
            } => {
                let payload = wrap_step(
                    "sts-identity login",
                    sts::sts_identity_login(
                        &self.http,
                        &self.host_url,
                        &credentials,
                        &region,
                        self.config.sts_endpoint.as_deref(),
                    )
                    .await,
                )?;
                Ok(AuthToken::from_payload(&payload))
            }

            AuthStrategy::PlatformMetadata => self.platform_metadata_login().await,
        }
    }

    /// Legacy role-based flow: platform metadata -> iam login -> KMS
    /// decrypt.
    async fn platform_metadata_login(&self) -> Result<AuthToken> {
        let (identity, credentials) = if let Some(arn) = &self.config.lambda_function_arn {
            let credentials = self.source_credentials()?;
            let identity = wrap_step(
                "lambda metadata",
                resolver::lambda_identity(
                    &self.http,
                    arn,
                    &credentials,
                    self.config.lambda_endpoint.as_deref(),
                )
                .await,
            )?;
            (identity, credentials)
        } else if let Some(role_name) = &self.config.ecs_task_role_name {
            let identity = wrap_step(
                "task metadata",
                resolver::ecs_identity(&self.http, self.config.ecs_metadata_url(), role_name)
                    .await,
            )?;
            let credentials = self.source_credentials()?;
            (identity, credentials)
        } else {
            wrap_step(
                "instance metadata",
                resolver::ec2_identity(&self.http, self.config.ec2_metadata_base()).await,
            )?
        };

        let auth_data = wrap_step(
            "role login",
            iam::role_login(&self.http, &self.host_url, &identity).await,
        )?;
        let payload = wrap_step(
            "token decrypt",
            kms::decrypt_token(
                &self.http,
                &identity.region,
                &credentials,
                &auth_data,
                self.config.kms_endpoint.as_deref(),
            )
            .await,
        )?;
        Ok(AuthToken::from_payload(&payload))
    }

    fn source_credentials(&self) -> Result<Credentials> {
        match &self.config.credentials {
            Some(credentials) => Ok(credentials.clone()),
            None => Credentials::from_env(),
        }
    }

    /// Read a secret's payload.
    pub async fn read(&self, path: &str) -> Result<Value> {
        let mut value = self.call(reqwest::Method::GET, path, None, false).await?;
        Ok(value
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Write a secret's payload.
    pub async fn write(&self, path: &str, data: &Value) -> Result<()> {
        self.call(reqwest::Method::POST, path, Some(data), false)
            .await?;
        Ok(())
    }

    /// Delete a secret.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.call(reqwest::Method::DELETE, path, None, false).await?;
        Ok(())
    }

    /// List the keys under a path. A 404 means the path holds nothing:
    /// zero results, not an error.
    pub async fn list(&self, path: &str) -> Result<Vec<String>> {
        let value = match self.call(reqwest::Method::GET, path, None, true).await {
            Err(StrongboxError::Api { status: 404, .. }) => return Ok(Vec::new()),
            other => other?,
        };
        let keys = value["data"]["keys"]
            .as_array()
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| k.as_str())
                    .map(|k| k.to_string())
                    .collect()
            })
            .unwrap_or_default();
        Ok(keys)
    }

    async fn call(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
        list: bool,
    ) -> Result<Value> {
        let token = self.get_token().await?;

        let mut url = format!(
            "{}/v1/secret/{}",
            self.host_url,
            path.trim_matches('/')
        );
        if list {
            url.push_str("?list=true");
        }

        let mut builder = self
            .http
            .request(method, url.as_str())
            .header(TOKEN_HEADER, token);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let request = builder.build()?;

        let response = http::execute(&self.http, request).await?;
        http::read_json(response).await
    }
}

/// Name the failed sub-step on errors that don't already carry their own
/// diagnosis; the typed taxonomy variants pass through untouched.
fn wrap_step<T>(step: &str, result: Result<T>) -> Result<T> {
    result.map_err(|err| match err {
        StrongboxError::Auth(message) => {
            StrongboxError::Auth(format!("{}: {}", step, message))
        }
        err @ (StrongboxError::Config(_)
        | StrongboxError::DecryptionAccessDenied
        | StrongboxError::TokenPayloadParse(_)
        | StrongboxError::MissingCiphertext
        | StrongboxError::PromptCancelled
        | StrongboxError::Api { .. }
        | StrongboxError::Blocked { .. }
        | StrongboxError::NoResponse) => err,
        other => StrongboxError::Auth(format!("{}: {}", step, other)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_step_names_generic_failures() {
        let err = wrap_step::<()>(
            "role login",
            Err(StrongboxError::Auth("connection reset".to_string())),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Authentication error: role login: connection reset"
        );
    }

    #[test]
    fn wrap_step_preserves_typed_errors() {
        let err = wrap_step::<()>("token decrypt", Err(StrongboxError::DecryptionAccessDenied))
            .unwrap_err();
        assert!(matches!(err, StrongboxError::DecryptionAccessDenied));

        let err = wrap_step::<()>(
            "role login",
            Err(StrongboxError::Api {
                status: 400,
                message: "The specified IAM role is not valid.".to_string(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, StrongboxError::Api { status: 400, .. }));
    }

    #[test]
    fn client_requires_valid_host_url() {
        let result = StrongboxClient::new(ClientConfig::new("not a url"));
        assert!(result.is_err());
    }

    #[test]
    fn client_header_value_names_the_crate() {
        assert!(CLIENT_HEADER_VALUE.starts_with("StrongboxRustClient/"));
    }
}
