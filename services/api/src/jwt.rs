//! JWT service for token generation, validation, and revocation
//!
//! Tokens are signed with HS256 using a shared secret. Every token carries a
//! unique `jti`; revocation (logout, refresh rotation) works on that id so
//! raw tokens never land in Redis.

use anyhow::Result;
use common::{cache::RedisPool, models::Role};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use common::models::User;

const MIN_SECRET_LEN: usize = 32;

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// HMAC secret for signing and verifying tokens
    pub secret: String,
    /// Access token expiration time in seconds (default: 15 minutes)
    pub access_token_expiry: u64,
    /// Refresh token expiration time in seconds (default: 7 days)
    pub refresh_token_expiry: u64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_SECRET`: Signing secret, at least 32 bytes
    /// - `JWT_ACCESS_TOKEN_EXPIRY`: Access token expiry in seconds (default: 900)
    /// - `JWT_REFRESH_TOKEN_EXPIRY`: Refresh token expiry in seconds (default: 604800)
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;

        let access_token_expiry = std::env::var("JWT_ACCESS_TOKEN_EXPIRY")
            .unwrap_or_else(|_| "900".to_string())
            .parse()
            .unwrap_or(900);

        let refresh_token_expiry = std::env::var("JWT_REFRESH_TOKEN_EXPIRY")
            .unwrap_or_else(|_| "604800".to_string())
            .parse()
            .unwrap_or(604800);

        let config = JwtConfig {
            secret,
            access_token_expiry,
            refresh_token_expiry,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.secret.len() < MIN_SECRET_LEN {
            anyhow::bail!("JWT_SECRET must be at least {} bytes", MIN_SECRET_LEN);
        }
        if self.access_token_expiry == 0 || self.refresh_token_expiry == 0 {
            anyhow::bail!("JWT token expiries must be positive");
        }
        if self.refresh_token_expiry <= self.access_token_expiry {
            anyhow::bail!("JWT_REFRESH_TOKEN_EXPIRY must exceed JWT_ACCESS_TOKEN_EXPIRY");
        }
        Ok(())
    }
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("access_token_expiry", &self.access_token_expiry)
            .field("refresh_token_expiry", &self.refresh_token_expiry)
            .finish()
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    pub role: Role,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
    /// Token type (access or refresh)
    pub token_type: TokenType,
    /// Token id, the handle for revocation
    pub jti: Uuid,
}

impl Claims {
    /// Seconds until expiry, zero once expired.
    pub fn remaining_lifetime(&self) -> Result<u64> {
        Ok(self.exp.saturating_sub(now()?))
    }
}

/// Token type enum
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    /// Access token
    Access,
    /// Refresh token
    Refresh,
}

/// A signed token together with its claims
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    config: JwtConfig,
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        JwtService {
            encoding_key,
            decoding_key,
            validation,
            config,
        }
    }

    /// Generate an access token for a user
    pub fn generate_access_token(&self, user: &User) -> Result<IssuedToken> {
        self.issue(user, TokenType::Access, self.config.access_token_expiry)
    }

    /// Generate a refresh token for a user
    pub fn generate_refresh_token(&self, user: &User) -> Result<IssuedToken> {
        self.issue(user, TokenType::Refresh, self.config.refresh_token_expiry)
    }

    fn issue(&self, user: &User, token_type: TokenType, lifetime: u64) -> Result<IssuedToken> {
        let iat = now()?;
        let claims = Claims {
            sub: user.id,
            role: user.role,
            iat,
            exp: iat + lifetime,
            token_type,
            jti: Uuid::new_v4(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(IssuedToken { token, claims })
    }

    /// Validate a token and return the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }

    /// Validate a token and check it is of the expected type
    pub fn validate_token_of_type(&self, token: &str, expected: TokenType) -> Result<Claims> {
        let claims = self.validate_token(token)?;
        if claims.token_type != expected {
            anyhow::bail!("Expected {:?} token, got {:?}", expected, claims.token_type);
        }
        Ok(claims)
    }

    /// Check if a token id is blacklisted in Redis
    pub async fn is_token_blacklisted(&self, redis_pool: &RedisPool, jti: Uuid) -> Result<bool> {
        redis_pool.exists(&blacklist_key(jti)).await
    }

    /// Blacklist a token for the rest of its lifetime
    pub async fn blacklist_token(&self, redis_pool: &RedisPool, claims: &Claims) -> Result<()> {
        let expiry = claims.remaining_lifetime()?;
        redis_pool
            .set(&blacklist_key(claims.jti), "1", Some(expiry))
            .await
    }

    /// Get the access token expiry time
    pub fn access_token_expiry(&self) -> u64 {
        self.config.access_token_expiry
    }
}

fn blacklist_key(jti: Uuid) -> String {
    format!("blacklisted_token:{}", jti)
}

fn now() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow::anyhow!("Failed to get current time: {}", e))?
        .as_secs())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use serial_test::serial;

    pub(crate) fn test_config() -> JwtConfig {
        JwtConfig {
            secret: "medhome-test-secret-that-is-long-enough".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604800,
        }
    }

    pub(crate) fn test_user(role: Role) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "student@medhome.test".to_string(),
            full_name: "Test Student".to_string(),
            role,
            whatsapp_number: None,
            is_approved: true,
            is_blocked: false,
            email_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_access_token_round_trip() {
        let service = JwtService::new(test_config());
        let user = test_user(Role::Admin);

        let issued = service.generate_access_token(&user).unwrap();
        let claims = service
            .validate_token_of_type(&issued.token, TokenType::Access)
            .unwrap();

        assert_eq!(claims, issued.claims);
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn test_tokens_have_unique_ids() {
        let service = JwtService::new(test_config());
        let user = test_user(Role::Student);

        let first = service.generate_refresh_token(&user).unwrap();
        let second = service.generate_refresh_token(&user).unwrap();

        assert_ne!(first.claims.jti, second.claims.jti);
        assert_ne!(first.token, second.token);
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let service = JwtService::new(test_config());
        let refresh = service
            .generate_refresh_token(&test_user(Role::Student))
            .unwrap();

        assert!(
            service
                .validate_token_of_type(&refresh.token, TokenType::Access)
                .is_err()
        );
        assert_eq!(refresh.claims.exp - refresh.claims.iat, 604800);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let service = JwtService::new(test_config());
        let issued_at = now().unwrap() - 1000;
        let claims = Claims {
            sub: Uuid::new_v4(),
            role: Role::Student,
            iat: issued_at,
            exp: issued_at + 900,
            token_type: TokenType::Access,
            jti: Uuid::new_v4(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &service.encoding_key).unwrap();

        assert!(service.validate_token(&token).is_err());
        assert_eq!(claims.remaining_lifetime().unwrap(), 0);
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let service = JwtService::new(test_config());
        let other = JwtService::new(JwtConfig {
            secret: "a-completely-different-secret-value!!".to_string(),
            ..test_config()
        });

        let token = other
            .generate_access_token(&test_user(Role::Student))
            .unwrap();
        assert!(service.validate_token(&token.token).is_err());
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        unsafe {
            std::env::set_var("JWT_SECRET", "short");
            std::env::remove_var("JWT_ACCESS_TOKEN_EXPIRY");
            std::env::remove_var("JWT_REFRESH_TOKEN_EXPIRY");
        }
        assert!(JwtConfig::from_env().is_err());

        unsafe {
            std::env::set_var("JWT_SECRET", "medhome-test-secret-that-is-long-enough");
            std::env::set_var("JWT_ACCESS_TOKEN_EXPIRY", "600");
        }
        let config = JwtConfig::from_env().unwrap();
        assert_eq!(config.access_token_expiry, 600);
        assert_eq!(config.refresh_token_expiry, 604800);
        assert!(!format!("{:?}", config).contains("medhome-test-secret"));

        unsafe {
            std::env::remove_var("JWT_SECRET");
            std::env::remove_var("JWT_ACCESS_TOKEN_EXPIRY");
        }
        assert!(JwtConfig::from_env().is_err());
    }
}
