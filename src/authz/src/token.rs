//! Bearer token minting and token-version invalidation
//!
//! Every user carries a monotonically increasing `token_version`. Tokens
//! embed the version they were minted at (claim `v`); a token whose version
//! is lower than the user's current one is stale. Version `0` marks legacy
//! tokens minted before versioning existed and is always accepted.

use crate::config::TokenConfig;
use crate::error::{AuthzError, Result};
use apigov_core::{DeptId, User, UserCatalog, UserId};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Token version carried by tokens minted before versioning
pub const LEGACY_TOKEN_VERSION: u64 = 0;

/// JWT claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: UserId,
    pub username: String,
    pub dept_id: DeptId,
    /// Token version; absent in legacy tokens
    #[serde(rename = "v", default, skip_serializing_if = "is_legacy")]
    pub token_version: u64,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

fn is_legacy(version: &u64) -> bool {
    *version == LEGACY_TOKEN_VERSION
}

/// A freshly minted token
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    /// Unix timestamp (seconds)
    pub expires_at: i64,
    pub token_version: u64,
}

/// Signs and verifies bearer tokens
pub trait TokenIssuer: Send + Sync {
    /// Mint a token for `user` at `user.token_version`
    fn issue(&self, user: &User, ttl: Option<Duration>) -> Result<IssuedToken>;

    /// Check signature, issuer and expiry and return the claims
    fn verify(&self, token: &str) -> Result<TokenClaims>;
}

/// HS256 JWT issuer
pub struct JwtTokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl_hours: i64,
}

impl JwtTokenIssuer {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            ttl_hours: config.ttl_hours,
        }
    }
}

impl TokenIssuer for JwtTokenIssuer {
    fn issue(&self, user: &User, ttl: Option<Duration>) -> Result<IssuedToken> {
        let ttl = match ttl {
            Some(ttl) => ttl,
            None => Duration::try_hours(self.ttl_hours).ok_or_else(|| {
                AuthzError::InvalidInput(format!("token ttl of {} hours is out of range", self.ttl_hours))
            })?,
        };
        let now = Utc::now();
        let exp = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthzError::InvalidInput("token expiry overflows".to_string()))?;

        let claims = TokenClaims {
            user_id: user.id,
            username: user.username.clone(),
            dept_id: user.dept_id,
            token_version: user.token_version,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthzError::Token(format!("JWT encoding error: {}", e)))?;

        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
            token_version: claims.token_version,
        })
    }

    fn verify(&self, token: &str) -> Result<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 0;

        decode::<TokenClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthzError::Token(e.to_string()))
    }
}

/// Validates token versions and mints replacement tokens
pub struct TokenVersionGuard {
    users: Arc<dyn UserCatalog>,
    issuer: Arc<dyn TokenIssuer>,
}

impl TokenVersionGuard {
    pub fn new(users: Arc<dyn UserCatalog>, issuer: Arc<dyn TokenIssuer>) -> Self {
        Self { users, issuer }
    }

    pub fn issuer(&self) -> &Arc<dyn TokenIssuer> {
        &self.issuer
    }

    async fn require_user(&self, user_id: UserId) -> Result<User> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AuthzError::not_found(format!("user {}", user_id)))
    }

    /// Reject tokens minted before the user's last version bump
    pub async fn validate_token_version(&self, user_id: UserId, claimed: u64) -> Result<()> {
        if claimed == LEGACY_TOKEN_VERSION {
            return Ok(());
        }

        let user = self.require_user(user_id).await?;
        if claimed < user.token_version {
            debug!(
                "stale token for user {}: claimed {} < current {}",
                user_id, claimed, user.token_version
            );
            return Err(AuthzError::TokenStale {
                claimed,
                current: user.token_version,
            });
        }
        Ok(())
    }

    /// Verify a bearer token and its version
    pub async fn authenticate(&self, token: &str) -> Result<TokenClaims> {
        let claims = self.issuer.verify(token)?;
        self.validate_token_version(claims.user_id, claims.token_version)
            .await?;
        Ok(claims)
    }

    /// Mint a token at the user's current version; existing tokens stay valid
    pub async fn refresh_token(&self, user_id: UserId, ttl: Option<Duration>) -> Result<IssuedToken> {
        let user = self.require_user(user_id).await?;
        self.issuer.issue(&user, ttl)
    }

    /// Bump the user's version, invalidating every earlier token, then mint
    pub async fn refresh_token_with_version_increment(
        &self,
        user_id: UserId,
        ttl: Option<Duration>,
    ) -> Result<IssuedToken> {
        let mut user = self.require_user(user_id).await?;
        let version = self.users.increment_token_version(user_id).await?;
        user.token_version = version;

        info!("user {} token version bumped to {}", user_id, version);
        self.issuer.issue(&user, ttl)
    }
}
