use chrono::{DateTime, Duration, TimeZone, Utc};
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::models::{OrgId, Session, UserId};
use crate::services::error::ServiceError;

/// Issues and validates session tokens (HS256).
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_minutes: i64,
    /// Revoked token ids and when they would have expired anyway.
    revoked: Arc<DashMap<String, i64>>,
}

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Organization the session belongs to
    pub org: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// JWT ID (for revocation)
    pub jti: String,
}

impl SessionClaims {
    pub fn user_id(&self) -> Result<UserId, ServiceError> {
        self.sub.parse().map_err(|_| ServiceError::InvalidToken)
    }

    pub fn org_id(&self) -> Result<OrgId, ServiceError> {
        self.org.parse().map_err(|_| ServiceError::InvalidToken)
    }

    pub fn session(&self) -> Result<Session, ServiceError> {
        Ok(Session {
            user_id: self.user_id()?,
            organization_id: self.org_id()?,
            expires_at: Utc
                .timestamp_opt(self.exp, 0)
                .single()
                .ok_or(ServiceError::InvalidToken)?,
        })
    }
}

impl JwtService {
    pub fn new(config: &SessionConfig) -> Result<Self, anyhow::Error> {
        if config.signing_secret.len() < 32 {
            anyhow::bail!("Session signing secret must be at least 32 bytes");
        }
        tracing::info!("JWT service initialized with HS256 key");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.signing_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.signing_secret.as_bytes()),
            expiry_minutes: config.expiry_minutes,
            revoked: Arc::new(DashMap::new()),
        })
    }

    pub fn expiry_minutes(&self) -> i64 {
        self.expiry_minutes
    }

    /// Start a session for `user_id` in `org_id` and sign a token for it.
    pub fn issue(&self, user_id: UserId, org_id: OrgId) -> Result<(Session, String), ServiceError> {
        let now = Utc::now();
        let expires_at = now + Duration::minutes(self.expiry_minutes);

        let claims = SessionClaims {
            sub: user_id.to_string(),
            org: org_id.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode session token: {}", e))?;

        let session = Session {
            user_id,
            organization_id: org_id,
            expires_at: truncate_to_seconds(expires_at),
        };
        Ok((session, token))
    }

    pub fn validate(&self, token: &str) -> Result<SessionClaims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let claims = decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => ServiceError::TokenExpired,
                _ => ServiceError::InvalidToken,
            })?
            .claims;

        if self.revoked.contains_key(&claims.jti) {
            return Err(ServiceError::InvalidToken);
        }
        Ok(claims)
    }

    /// Reject `claims` from now on. Entries past their expiry are pruned.
    pub fn revoke(&self, claims: &SessionClaims) {
        let now = Utc::now().timestamp();
        self.revoked.retain(|_, exp| *exp > now);
        self.revoked.insert(claims.jti.clone(), claims.exp);
    }
}

fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(at.timestamp(), 0).single().unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new(&SessionConfig {
            signing_secret: "a-test-secret-that-is-long-enough-for-hs256".into(),
            expiry_minutes: 30,
            handshake_ttl_minutes: 10,
        })
        .unwrap()
    }

    #[test]
    fn test_issue_and_validate() {
        let jwt = service();
        let (user, org) = (UserId::new(), OrgId::new());
        let (session, token) = jwt.issue(user, org).unwrap();

        let claims = jwt.validate(&token).unwrap();
        assert_eq!(claims.session().unwrap(), session);
    }

    #[test]
    fn test_revoked_token_is_rejected() {
        let jwt = service();
        let (_, token) = jwt.issue(UserId::new(), OrgId::new()).unwrap();
        let claims = jwt.validate(&token).unwrap();

        jwt.revoke(&claims);
        assert!(matches!(jwt.validate(&token), Err(ServiceError::InvalidToken)));
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let jwt = service();
        let (_, token) = jwt.issue(UserId::new(), OrgId::new()).unwrap();
        let tampered = format!("{}x", token);
        assert!(jwt.validate(&tampered).is_err());
    }

    #[test]
    fn test_short_secret_is_refused() {
        let result = JwtService::new(&SessionConfig {
            signing_secret: "short".into(),
            expiry_minutes: 30,
            handshake_ttl_minutes: 10,
        });
        assert!(result.is_err());
    }
}
