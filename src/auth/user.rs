//! Interactive username/password + MFA login
//!
//! A small state machine driven against the backend's user-auth endpoints.
//! All terminal I/O goes through [`PromptProvider`] so the flow is testable
//! with scripted answers and cancellable at any prompt.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::token::TokenPayload;
use crate::errors::{Result, StrongboxError};
use crate::http;

/// Capability interface for interactive input
pub trait PromptProvider: Send + Sync {
    fn read_line(&self, prompt: &str) -> Result<String>;
    /// Masked entry; the answer must not echo.
    fn read_password(&self, prompt: &str) -> Result<String>;
}

/// Production prompt backed by the terminal
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl PromptProvider for TerminalPrompt {
    fn read_line(&self, prompt: &str) -> Result<String> {
        dialoguer::Input::<String>::new()
            .with_prompt(prompt)
            .interact_text()
            .map_err(map_prompt_error)
    }

    fn read_password(&self, prompt: &str) -> Result<String> {
        dialoguer::Password::new()
            .with_prompt(prompt)
            .interact()
            .map_err(map_prompt_error)
    }
}

fn map_prompt_error(err: dialoguer::Error) -> StrongboxError {
    match err {
        dialoguer::Error::IO(io) if io.kind() == std::io::ErrorKind::Interrupted => {
            StrongboxError::PromptCancelled
        }
        dialoguer::Error::IO(io) => StrongboxError::Io(io),
    }
}

/// Login flow states
#[derive(Debug)]
enum LoginState {
    AwaitingCredentials,
    AwaitingMfa {
        state_token: String,
        device_id: String,
        device_name: String,
    },
    Authenticated(TokenPayload),
}

#[derive(Debug, Deserialize)]
struct MfaDevice {
    id: String,
    name: String,
}

/// Run the interactive login flow to completion.
///
/// Structured error payloads at any step fail the flow; an interrupted
/// prompt surfaces as [`StrongboxError::PromptCancelled`].
pub(crate) async fn login(
    client: &reqwest::Client,
    host_url: &str,
    prompt: &Arc<dyn PromptProvider>,
) -> Result<TokenPayload> {
    let mut state = LoginState::AwaitingCredentials;

    loop {
        state = match state {
            LoginState::AwaitingCredentials => {
                let username = ask(prompt, |p| p.read_line("Email")).await?;
                let password = ask(prompt, |p| p.read_password("Password")).await?;
                let response = submit_credentials(client, host_url, &username, &password).await?;
                next_state_from_user_auth(response)?
            }
            LoginState::AwaitingMfa {
                state_token,
                device_id,
                device_name,
            } => {
                let label = format!("MultiFactor Auth for {}", device_name);
                let otp = ask(prompt, move |p| p.read_line(&label)).await?;
                let response = submit_mfa(client, host_url, &state_token, &device_id, &otp).await?;
                LoginState::Authenticated(parse_token_data(&response)?)
            }
            LoginState::Authenticated(payload) => {
                tracing::debug!("interactive login authenticated");
                return Ok(payload);
            }
        };
    }
}

/// Run one prompt on the blocking pool so a pending read does not stall
/// other tasks on the runtime.
async fn ask<F>(prompt: &Arc<dyn PromptProvider>, read: F) -> Result<String>
where
    F: FnOnce(&dyn PromptProvider) -> Result<String> + Send + 'static,
{
    let prompt = Arc::clone(prompt);
    tokio::task::spawn_blocking(move || read(prompt.as_ref()))
        .await
        .map_err(|err| StrongboxError::Auth(format!("prompt task failed: {}", err)))?
}

async fn submit_credentials(
    client: &reqwest::Client,
    host_url: &str,
    username: &str,
    password: &str,
) -> Result<Value> {
    let request = client
        .get(format!("{}/v2/auth/user", host_url))
        .header("Authorization", basic_auth_header(username, password))
        .build()?;
    let response = http::execute(client, request).await?;
    http::read_json(response).await
}

async fn submit_mfa(
    client: &reqwest::Client,
    host_url: &str,
    state_token: &str,
    device_id: &str,
    otp_token: &str,
) -> Result<Value> {
    let request = client
        .post(format!("{}/v2/auth/mfa_check", host_url))
        .json(&json!({
            "state_token": state_token,
            "device_id": device_id,
            "otp_token": otp_token,
        }))
        .build()?;
    let response = http::execute(client, request).await?;
    http::read_json(response).await
}

fn next_state_from_user_auth(response: Value) -> Result<LoginState> {
    if response["status"].as_str() == Some("mfa_req") {
        let state_token = response["data"]["state_token"]
            .as_str()
            .ok_or_else(|| {
                StrongboxError::Auth("MFA challenge missing state_token".to_string())
            })?
            .to_string();
        let devices: Vec<MfaDevice> =
            serde_json::from_value(response["data"]["devices"].clone()).map_err(|e| {
                StrongboxError::Auth(format!("MFA challenge with malformed device list: {}", e))
            })?;
        // The one-time code is tied to the first listed device.
        let device = devices.into_iter().next().ok_or_else(|| {
            StrongboxError::Auth("MFA challenge listed no devices".to_string())
        })?;
        return Ok(LoginState::AwaitingMfa {
            state_token,
            device_id: device.id,
            device_name: device.name,
        });
    }

    Ok(LoginState::Authenticated(parse_token_data(&response)?))
}

fn parse_token_data(response: &Value) -> Result<TokenPayload> {
    if response.is_null() {
        return Err(StrongboxError::NoResponse);
    }
    serde_json::from_value(response["data"].clone())
        .map_err(|e| StrongboxError::Auth(format!("malformed login response: {}", e)))
}

fn basic_auth_header(username: &str, password: &str) -> String {
    format!(
        "Basic {}",
        BASE64.encode(format!("{}:{}", username, password))
    )
}
