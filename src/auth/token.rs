//! Bearer token cache with expiry tracking and single-flight refresh

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::errors::Result;

/// Tokens are considered expired this long before the backend would reject
/// them, to absorb clock drift and request latency.
pub(crate) const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

fn default_lease_duration() -> i64 {
    3600
}

/// Token payload as returned by the backend's auth endpoints (and as the
/// decrypted plaintext of the legacy ciphertext path)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPayload {
    pub client_token: String,
    /// Validity window in seconds. The interactive endpoints omit it.
    #[serde(default = "default_lease_duration")]
    pub lease_duration: i64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// The single cached bearer token
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub value: String,
    /// `None` for pre-issued tokens with no known lease.
    pub expires_at: Option<Instant>,
}

impl AuthToken {
    /// Build from a backend payload, applying the safety margin. A
    /// non-positive effective lease floors at "now", so the token is good
    /// for at most the current call.
    pub(crate) fn from_payload(payload: &TokenPayload) -> Self {
        let lease = (payload.lease_duration - EXPIRY_MARGIN.as_secs() as i64).max(0);
        Self {
            value: payload.client_token.clone(),
            expires_at: Some(Instant::now() + Duration::from_secs(lease as u64)),
        }
    }

    pub(crate) fn pre_issued(value: String) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at > Instant::now(),
            None => true,
        }
    }
}

/// Single-slot token cache owned by one client instance.
///
/// The slot is only read and written under the mutex, and the fetch runs
/// while it is held: the first caller to observe a missing/expired token
/// performs the fetch, concurrent callers park on the lock and then see the
/// freshly cached value. Exactly one authentication flow is in flight per
/// client at any time.
#[derive(Debug, Default)]
pub(crate) struct AuthSession {
    slot: Mutex<Option<AuthToken>>,
}

impl AuthSession {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AuthToken>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(token) = slot.as_ref() {
            if token.is_valid() {
                tracing::debug!("returning cached token");
                return Ok(token.value.clone());
            }
            tracing::debug!("cached token expired, refreshing");
            *slot = None;
        }

        let token = fetch().await?;
        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }

    /// Drop the cached token; the next caller re-authenticates.
    pub(crate) async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn payload(lease: i64) -> TokenPayload {
        TokenPayload {
            client_token: "tok".to_string(),
            lease_duration: lease,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn margin_is_subtracted_from_lease() {
        let token = AuthToken::from_payload(&payload(3600));
        let remaining = token.expires_at.unwrap() - Instant::now();
        assert!(remaining <= Duration::from_secs(3540));
        assert!(remaining > Duration::from_secs(3500));
        assert!(token.is_valid());
    }

    #[test]
    fn non_positive_lease_floors_at_now() {
        let token = AuthToken::from_payload(&payload(0));
        assert!(token.expires_at.unwrap() <= Instant::now());
        assert!(!token.is_valid());

        let token = AuthToken::from_payload(&payload(30));
        assert!(!token.is_valid());
    }

    #[test]
    fn pre_issued_token_never_expires() {
        let token = AuthToken::pre_issued("static".to_string());
        assert!(token.is_valid());
    }

    #[tokio::test]
    async fn fetch_runs_once_for_concurrent_callers() {
        let session = Arc::new(AuthSession::new());
        let fetches = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let session = Arc::clone(&session);
            let fetches = Arc::clone(&fetches);
            handles.push(tokio::spawn(async move {
                session
                    .get_or_fetch(|| async move {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(AuthToken::from_payload(&payload(3600)))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "tok");
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let session = AuthSession::new();
        let fetches = AtomicU32::new(0);

        for _ in 0..2 {
            session
                .get_or_fetch(|| async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(AuthToken::from_payload(&payload(3600)))
                })
                .await
                .unwrap();
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        session.invalidate().await;
        session
            .get_or_fetch(|| async {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok(AuthToken::from_payload(&payload(3600)))
            })
            .await
            .unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_error_leaves_slot_empty() {
        let session = AuthSession::new();
        let result = session
            .get_or_fetch(|| async {
                Err(crate::errors::StrongboxError::Auth("boom".to_string()))
            })
            .await;
        assert!(result.is_err());

        // Next caller retries rather than seeing a poisoned slot.
        let token = session
            .get_or_fetch(|| async { Ok(AuthToken::from_payload(&payload(3600))) })
            .await
            .unwrap();
        assert_eq!(token, "tok");
    }
}
