//! HTTP execution with bounded retry, plus backend error classification
//!
//! Transient failures (5xx or transport errors) are retried transparently
//! here; everything that escapes this module is terminal for the caller.

use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use crate::errors::{Result, StrongboxError};
use crate::sign::SignedRequest;

/// Total attempts per request, including the first.
pub(crate) const MAX_ATTEMPTS: u32 = 3;

/// Execute a request, retrying on 5xx responses and transport failures.
pub(crate) async fn execute(
    client: &reqwest::Client,
    request: reqwest::Request,
) -> Result<reqwest::Response> {
    let mut attempt = 1;
    loop {
        // Keep the original around for retries; the final attempt (or an
        // unclonable body) consumes it, which also ends the loop.
        let clone = if attempt < MAX_ATTEMPTS {
            request.try_clone()
        } else {
            None
        };
        let Some(to_send) = clone else {
            return client.execute(request).await.map_err(Into::into);
        };

        match client.execute(to_send).await {
            Ok(response) if response.status().is_server_error() => {
                tracing::warn!(
                    status = response.status().as_u16(),
                    attempt,
                    "transient server error, retrying"
                );
            }
            Ok(response) => return Ok(response),
            Err(err) => {
                tracing::warn!(error = %err, attempt, "transport failure, retrying");
            }
        }

        attempt += 1;
    }
}

/// Build a reqwest request from a [`SignedRequest`] and execute it.
pub(crate) async fn send_signed(
    client: &reqwest::Client,
    signed: SignedRequest,
) -> Result<reqwest::Response> {
    let method = reqwest::Method::from_bytes(signed.method.as_bytes())
        .map_err(|_| StrongboxError::Auth(format!("invalid HTTP method: {}", signed.method)))?;

    let mut builder = client.request(method, signed.url.as_str());
    for (name, value) in &signed.headers {
        builder = builder.header(name, value);
    }
    let request = builder.body(signed.body).build()?;
    execute(client, request).await
}

/// Read a completed response as a backend JSON payload.
///
/// Non-2xx responses are classified into the error taxonomy. 2xx responses
/// with an `errors` list (the backend reports some application errors with a
/// success status) are surfaced the same way. An empty 2xx body yields
/// `Value::Null`; callers that require a payload treat that as
/// [`StrongboxError::NoResponse`].
pub(crate) async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let success = response.status().is_success();
    let body = response.bytes().await?;

    if !success {
        return Err(classify_error(status, content_type.as_deref(), &body));
    }

    if body.is_empty() {
        return Ok(Value::Null);
    }

    let value: Value = serde_json::from_slice(&body)?;
    if let Some(message) = format_backend_errors(&value["errors"]) {
        return Err(StrongboxError::Api { status, message });
    }
    Ok(value)
}

/// Interpret a terminal non-2xx response into a typed error.
pub(crate) fn classify_error(
    status: u16,
    content_type: Option<&str>,
    body: &[u8],
) -> StrongboxError {
    let is_json = content_type
        .map(|ct| ct.contains("json"))
        .unwrap_or(false);

    // Non-JSON error bodies are commonly WAF block pages; never attempt to
    // parse them.
    if !is_json {
        return StrongboxError::Blocked {
            status,
            content_type: content_type.map(|ct| ct.to_string()),
        };
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(value) => {
            let message = format_backend_errors(&value["errors"])
                .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());
            StrongboxError::Api { status, message }
        }
        Err(_) => StrongboxError::Blocked {
            status,
            content_type: content_type.map(|ct| ct.to_string()),
        },
    }
}

/// Join a backend error list into a single message.
///
/// Handles both the structured shape (`[{code, message}]`) and the legacy
/// shape (`["text", {"message": "text"}]`). Returns `None` when the value is
/// not a non-empty array.
pub(crate) fn format_backend_errors(errors: &Value) -> Option<String> {
    let list = errors.as_array()?;
    if list.is_empty() {
        return None;
    }
    let joined = list
        .iter()
        .map(|entry| match entry {
            Value::String(text) => text.clone(),
            Value::Object(fields) => fields
                .get("message")
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
                .unwrap_or_else(|| entry.to_string()),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    Some(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structured_error_list_is_joined() {
        let errors = json!([
            {"code": 99216, "message": "The specified IAM role is not valid."},
            {"code": 99217, "message": "Try again."}
        ]);
        assert_eq!(
            format_backend_errors(&errors).unwrap(),
            "The specified IAM role is not valid., Try again."
        );
    }

    #[test]
    fn legacy_string_errors_are_joined() {
        let errors = json!(["Failed to parse JSON input: invalid character"]);
        assert_eq!(
            format_backend_errors(&errors).unwrap(),
            "Failed to parse JSON input: invalid character"
        );
    }

    #[test]
    fn legacy_object_errors_use_message_field() {
        let errors = json!([{"message": "bad token"}, "expired"]);
        assert_eq!(format_backend_errors(&errors).unwrap(), "bad token, expired");
    }

    #[test]
    fn empty_or_absent_error_list_is_none() {
        assert!(format_backend_errors(&json!([])).is_none());
        assert!(format_backend_errors(&Value::Null).is_none());
        assert!(format_backend_errors(&json!({"message": "x"})).is_none());
    }

    #[test]
    fn non_json_body_is_blocked() {
        let err = classify_error(403, Some("text/html"), b"<html>Forbidden</html>");
        assert!(matches!(
            err,
            StrongboxError::Blocked {
                status: 403,
                content_type: Some(ref ct)
            } if ct == "text/html"
        ));
    }

    #[test]
    fn missing_content_type_is_blocked() {
        let err = classify_error(502, None, b"Bad Gateway");
        assert!(matches!(err, StrongboxError::Blocked { status: 502, .. }));
    }

    #[test]
    fn structured_json_error_is_api() {
        let body = serde_json::to_vec(&json!({
            "error_id": "abc-123",
            "errors": [{"code": 99216, "message": "The specified IAM role is not valid."}]
        }))
        .unwrap();
        let err = classify_error(400, Some("application/json"), &body);
        match err {
            StrongboxError::Api { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("IAM role is not valid"));
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn json_without_error_list_keeps_body_text() {
        let err = classify_error(404, Some("application/json"), br#"{"detail":"missing"}"#);
        match err {
            StrongboxError::Api { status, message } => {
                assert_eq!(status, 404);
                assert!(message.contains("missing"));
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }
}
