use moka::future::Cache;
use std::time::Duration;

/// Refresh tokens that may still be exchanged, keyed by `jti`.
///
/// Entries expire with the token itself; revoking removes them early.
#[derive(Clone)]
pub struct RefreshTokens {
    active: Cache<String, String>,
}

impl RefreshTokens {
    pub fn new(ttl_secs: usize) -> Self {
        Self {
            active: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(Duration::from_secs(ttl_secs as u64))
                .build(),
        }
    }

    pub async fn remember(&self, jti: &str, user_id: &str) {
        self.active.insert(jti.to_string(), user_id.to_string()).await;
    }

    /// Owner of an unrevoked token.
    pub async fn owner(&self, jti: &str) -> Option<String> {
        self.active.get(jti).await
    }

    /// Idempotent.
    pub async fn revoke(&self, jti: &str) {
        self.active.invalidate(jti).await;
    }
}
