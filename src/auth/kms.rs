//! KMS decryption of the legacy auth ciphertext
//!
//! The role-based login routes answer with an `auth_data` ciphertext that
//! only the caller's role can decrypt; the decrypted plaintext is the token
//! payload.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde_json::Value;

use crate::auth::token::TokenPayload;
use crate::errors::{Result, StrongboxError};
use crate::http;
use crate::sign::{self, Credentials};

/// KMS does not expose a structured code for "your role cannot use this
/// key", so we match its error text. Best-effort by design; a non-matching
/// KMS error passes through unmodified (with a logged fallback).
const ACCESS_DENIED_MARKER: &str =
    "The ciphertext references a key that either does not exist or you do not have access to";

/// Decrypt a base64 ciphertext via KMS and parse the plaintext as a token
/// payload.
pub(crate) async fn decrypt_token(
    client: &reqwest::Client,
    region: &str,
    credentials: &Credentials,
    ciphertext_b64: &str,
    endpoint_override: Option<&str>,
) -> Result<TokenPayload> {
    tracing::debug!(region, "decrypting auth ciphertext");

    let endpoint = match endpoint_override {
        Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
        None => format!("https://{}", sign::service_host("kms", region)),
    };
    let body = serde_json::to_vec(&serde_json::json!({ "CiphertextBlob": ciphertext_b64 }))?;

    let signed = sign::sign_request(
        "POST",
        &format!("{}/", endpoint),
        "kms",
        region,
        &[
            (
                "Content-Type".to_string(),
                "application/x-amz-json-1.0".to_string(),
            ),
            ("X-Amz-Target".to_string(), "TrentService.Decrypt".to_string()),
        ],
        &body,
        credentials,
        Utc::now(),
    )?;

    let response = http::send_signed(client, signed).await?;
    let status = response.status();
    let bytes = response.bytes().await?;
    let value: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    if !status.is_success() {
        let message = value["message"]
            .as_str()
            .or_else(|| value["Message"].as_str())
            .map(|m| m.to_string())
            .unwrap_or_else(|| String::from_utf8_lossy(&bytes).trim().to_string());
        return Err(classify_decrypt_error(status.as_u16(), &message));
    }

    let plaintext_b64 = value["Plaintext"].as_str().ok_or_else(|| {
        StrongboxError::Auth("KMS decrypt response missing Plaintext".to_string())
    })?;
    let plaintext = BASE64
        .decode(plaintext_b64)
        .map_err(|e| StrongboxError::TokenPayloadParse(e.to_string()))?;

    serde_json::from_slice(&plaintext)
        .map_err(|e| StrongboxError::TokenPayloadParse(e.to_string()))
}

fn classify_decrypt_error(status: u16, message: &str) -> StrongboxError {
    if message.contains(ACCESS_DENIED_MARKER) {
        return StrongboxError::DecryptionAccessDenied;
    }
    // Heuristic didn't match: keep the original text so nothing is lost.
    tracing::warn!(status, message, "KMS decrypt failed outside the known access-denied shape");
    StrongboxError::Auth(format!("KMS decrypt failed (status {}): {}", status, message))
}
