//! Refresh-token sessions in Redis
//!
//! Each issued refresh token has a session keyed by its `jti` that lives as
//! long as the token. A refresh token is only honored while its session
//! exists, and rotation deletes the session, so every refresh token is
//! single use.

use anyhow::Result;
use common::cache::RedisPool;
use tracing::info;
use uuid::Uuid;

use crate::jwt::Claims;

/// Session manager for refresh tokens
#[derive(Clone)]
pub struct RefreshSessions {
    redis_pool: RedisPool,
}

impl RefreshSessions {
    pub fn new(redis_pool: RedisPool) -> Self {
        Self { redis_pool }
    }

    /// Record a freshly issued refresh token
    pub async fn create(&self, claims: &Claims) -> Result<()> {
        info!("Creating refresh session for user: {}", claims.sub);

        self.redis_pool
            .set(
                &session_key(claims.jti),
                &claims.sub.to_string(),
                Some(claims.remaining_lifetime()?),
            )
            .await
    }

    /// Consume the session of a refresh token. Returns `false` when it was
    /// already consumed, revoked or expired.
    pub async fn consume(&self, claims: &Claims) -> Result<bool> {
        let key = session_key(claims.jti);
        let owner = self.redis_pool.get(&key).await?;
        if owner.as_deref() != Some(claims.sub.to_string().as_str()) {
            return Ok(false);
        }

        // DEL reports whether this call removed the key, so only one of two
        // concurrent rotations can win.
        self.redis_pool.delete(&key).await
    }

    /// Drop a session, e.g. on logout. Idempotent.
    pub async fn revoke(&self, jti: Uuid) -> Result<()> {
        if self.redis_pool.delete(&session_key(jti)).await? {
            info!("Revoked refresh session {}", jti);
        }
        Ok(())
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.redis_pool.health_check().await
    }
}

fn session_key(jti: Uuid) -> String {
    format!("refresh_session:{}", jti)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_is_per_token() {
        let jti = Uuid::new_v4();
        assert_eq!(session_key(jti), format!("refresh_session:{}", jti));
        assert_ne!(session_key(jti), session_key(Uuid::new_v4()));
    }
}
