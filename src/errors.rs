//! Error types for the Strongbox client

use thiserror::Error;

/// Main error type for the Strongbox client
///
/// Everything that reaches a caller through this type is final: transient
/// 5xx/transport failures are retried inside the HTTP executor and only the
/// last observed failure surfaces here.
#[derive(Error, Debug)]
pub enum StrongboxError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Missing or contradictory client setup. Fails fast, never retried.
    #[error("Config error: {0}")]
    Config(String),

    /// A sub-step of token acquisition failed; the message names the step.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The caller's role lacks kms:Decrypt on the key backing the legacy
    /// auth path. Detected by a documented substring heuristic, see
    /// [`crate::auth::kms`].
    #[error("You do not have access to the KMS key required for authentication. \
             The most likely cause is that your IAM role does not have the KMS \
             Decrypt action. You will need to add it to your role.")]
    DecryptionAccessDenied,

    /// The decrypted auth plaintext was not a valid token payload.
    #[error("Error parsing KMS decrypt result: {0}")]
    TokenPayloadParse(String),

    /// The backend's auth result lacked the `auth_data` ciphertext field.
    #[error("cannot decrypt token, auth_data is missing")]
    MissingCiphertext,

    /// The interactive login flow was interrupted at a prompt.
    #[error("Prompt cancelled")]
    PromptCancelled,

    /// Structured or legacy error list returned by the backend.
    #[error("Backend error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Non-JSON error body, commonly an intermediary WAF block page.
    #[error("Blocked or unexpected response (status {status}, content-type {content_type:?})")]
    Blocked {
        status: u16,
        content_type: Option<String>,
    },

    /// The transport completed but handed back no usable payload.
    #[error("backend returned an empty response")]
    NoResponse,
}

pub type Result<T> = std::result::Result<T, StrongboxError>;
