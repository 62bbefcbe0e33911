//! Session tokens handed out after a successful face login.
//!
//! A token is `base64url(claims json) "." base64url(HMAC-SHA256(claims))`.

use std::env;

use base64::{engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD}, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::common::config::CredentialsConfig;
use crate::common::error::{FaceAuthError, Result};
use crate::core::types::Identity;

type HmacSha256 = Hmac<Sha256>;

pub const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCredentials {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

pub trait CredentialIssuer: Send + Sync {
    fn issue(&self, identity: &Identity) -> Result<SessionCredentials>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    kind: TokenKind,
    iat: i64,
    exp: i64,
    jti: String,
}

pub struct HmacCredentialIssuer {
    secret: Zeroizing<Vec<u8>>,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl std::fmt::Debug for HmacCredentialIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacCredentialIssuer")
            .field("secret", &"<redacted>")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish()
    }
}

impl HmacCredentialIssuer {
    pub fn new(secret: Vec<u8>, access_ttl_secs: u64, refresh_ttl_secs: u64) -> Result<Self> {
        let secret = Zeroizing::new(secret);
        if secret.len() < MIN_SECRET_BYTES {
            return Err(FaceAuthError::InvalidKeyConfiguration(format!(
                "token secret must be at least {} bytes, got {}",
                MIN_SECRET_BYTES,
                secret.len()
            )));
        }
        Ok(Self { secret, access_ttl_secs, refresh_ttl_secs })
    }

    pub fn from_config(config: &CredentialsConfig) -> Result<Self> {
        let encoded = Zeroizing::new(env::var(&config.secret_env).map_err(|_| {
            FaceAuthError::InvalidKeyConfiguration(format!("{} is not set", config.secret_env))
        })?);
        let secret = STANDARD.decode(encoded.trim()).map_err(|e| {
            FaceAuthError::InvalidKeyConfiguration(format!("{} is not valid base64: {}", config.secret_env, e))
        })?;
        Self::new(secret, config.access_ttl_secs, config.refresh_ttl_secs)
    }

    pub fn issue_at(&self, identity: &Identity, now: i64) -> Result<SessionCredentials> {
        Ok(SessionCredentials {
            access_token: self.sign(identity, TokenKind::Access, now, self.access_ttl_secs)?,
            refresh_token: self.sign(identity, TokenKind::Refresh, now, self.refresh_ttl_secs)?,
            expires_in: self.access_ttl_secs,
        })
    }

    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Identity> {
        self.verify_at(token, kind, Utc::now().timestamp())
    }

    pub fn verify_at(&self, token: &str, kind: TokenKind, now: i64) -> Result<Identity> {
        let (payload, signature) = token
            .split_once('.')
            .ok_or_else(|| FaceAuthError::Unauthorized("malformed token".into()))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| FaceAuthError::Unauthorized("malformed token".into()))?;

        self.mac(payload)?
            .verify_slice(&signature)
            .map_err(|_| FaceAuthError::Unauthorized("bad token signature".into()))?;

        let claims: Claims = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|json| serde_json::from_slice(&json).ok())
            .ok_or_else(|| FaceAuthError::Unauthorized("malformed token claims".into()))?;

        if claims.kind != kind {
            return Err(FaceAuthError::Unauthorized("wrong token kind".into()));
        }
        if claims.exp <= now {
            return Err(FaceAuthError::Unauthorized("token expired".into()));
        }

        Identity::new(claims.sub).map_err(|_| FaceAuthError::Unauthorized("bad token subject".into()))
    }

    fn sign(&self, identity: &Identity, kind: TokenKind, now: i64, ttl_secs: u64) -> Result<String> {
        let mut jti = [0u8; 16];
        OsRng.fill_bytes(&mut jti);

        let claims = Claims {
            sub: identity.to_string(),
            kind,
            iat: now,
            exp: now.saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX)),
            jti: URL_SAFE_NO_PAD.encode(jti),
        };
        let json = serde_json::to_vec(&claims)
            .map_err(|e| FaceAuthError::Other(anyhow::anyhow!("Failed to encode claims: {}", e)))?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = self.mac(&payload)?.finalize().into_bytes();

        Ok(format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(signature)))
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| FaceAuthError::InvalidKeyConfiguration(e.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }
}

impl CredentialIssuer for HmacCredentialIssuer {
    fn issue(&self, identity: &Identity) -> Result<SessionCredentials> {
        self.issue_at(identity, Utc::now().timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> HmacCredentialIssuer {
        HmacCredentialIssuer::new(vec![7u8; 32], 900, 3600).unwrap()
    }

    fn alice() -> Identity {
        Identity::new("alice").unwrap()
    }

    #[test]
    fn issued_tokens_verify_by_kind() {
        let issuer = issuer();
        let creds = issuer.issue(&alice()).unwrap();
        assert_eq!(creds.expires_in, 900);
        assert_eq!(issuer.verify(&creds.access_token, TokenKind::Access).unwrap(), alice());
        assert_eq!(issuer.verify(&creds.refresh_token, TokenKind::Refresh).unwrap(), alice());
        assert_ne!(creds.access_token, creds.refresh_token);
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let issuer = issuer();
        let creds = issuer.issue(&alice()).unwrap();
        assert!(matches!(
            issuer.verify(&creds.refresh_token, TokenKind::Access),
            Err(FaceAuthError::Unauthorized(_))
        ));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let issuer = issuer();
        let token = issuer.issue(&alice()).unwrap().access_token;
        let (_, signature) = token.split_once('.').unwrap();
        let forged_claims = serde_json::json!({
            "sub": "mallory", "kind": "access", "iat": 0, "exp": i64::MAX, "jti": "x"
        });
        let forged = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap()),
            signature
        );
        assert!(matches!(issuer.verify(&forged, TokenKind::Access), Err(FaceAuthError::Unauthorized(_))));
        assert!(issuer.verify("no-dot-here", TokenKind::Access).is_err());
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let other = HmacCredentialIssuer::new(vec![9u8; 32], 900, 3600).unwrap();
        let token = other.issue(&alice()).unwrap().access_token;
        assert!(issuer().verify(&token, TokenKind::Access).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = issuer();
        let creds = issuer.issue_at(&alice(), 1_000).unwrap();
        assert!(issuer.verify_at(&creds.access_token, TokenKind::Access, 1_899).is_ok());
        assert!(issuer.verify_at(&creds.access_token, TokenKind::Access, 1_900).is_err());
    }

    #[test]
    fn short_secret_is_a_key_error() {
        assert!(matches!(
            HmacCredentialIssuer::new(vec![1u8; 16], 900, 3600),
            Err(FaceAuthError::InvalidKeyConfiguration(_))
        ));
    }
}
