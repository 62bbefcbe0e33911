use serde::{Deserialize, Serialize};
use std::fmt;
use crate::common::error::{FaceAuthError, Result};
use crate::core::cipher::SealedEmbedding;

pub type Embedding = Vec<f32>;

pub const TEMPLATE_VERSION: u32 = 1;

const MAX_IDENTITY_LEN: usize = 128;

/// Opaque key of an enrolled user. Restricted to characters that are safe in
/// a file name so a store can key files by it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        validate_identity(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = FaceAuthError;

    fn try_from(value: String) -> Result<Self> {
        Identity::new(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl std::str::FromStr for Identity {
    type Err = FaceAuthError;

    fn from_str(s: &str) -> Result<Self> {
        Identity::new(s)
    }
}

/// The single enrolled template of one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceTemplate {
    pub version: u32,
    pub identity: Identity,
    pub sealed: SealedEmbedding,
    pub model_version: String,
    /// Best encoder quality across the enrollment frames. Metadata only.
    pub quality_score: f32,
    /// Unix milliseconds of the enrollment that wrote this template.
    pub enrolled_at: i64,
}

impl FaceTemplate {
    pub fn new(
        identity: Identity,
        sealed: SealedEmbedding,
        model_version: impl Into<String>,
        quality_score: f32,
    ) -> Self {
        Self {
            version: TEMPLATE_VERSION,
            identity,
            sealed,
            model_version: model_version.into(),
            quality_score,
            enrolled_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

fn validate_identity(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(FaceAuthError::InvalidIdentity {
            identity: value.to_string(),
            message: "identity cannot be empty".into(),
        });
    }

    if value.len() > MAX_IDENTITY_LEN {
        return Err(FaceAuthError::InvalidIdentity {
            identity: value.chars().take(16).collect(),
            message: format!("identity longer than {} characters", MAX_IDENTITY_LEN),
        });
    }

    if value.starts_with('.') {
        return Err(FaceAuthError::InvalidIdentity {
            identity: value.to_string(),
            message: "identity cannot start with '.'".into(),
        });
    }

    if !value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '@'))
    {
        return Err(FaceAuthError::InvalidIdentity {
            identity: value.to_string(),
            message: "use ASCII letters, numbers, '-', '_', '.' or '@' only".into(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_object_id_and_email_like_keys() {
        assert!(Identity::new("64f1c2a9e4b0a1b2c3d4e5f6").is_ok());
        assert!(Identity::new("alice.smith@example.org").is_ok());
    }

    #[test]
    fn rejects_path_tricks() {
        for bad in ["", "../etc/passwd", "a/b", ".hidden", "spaced name"] {
            assert!(
                matches!(Identity::new(bad), Err(FaceAuthError::InvalidIdentity { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn deserialization_validates() {
        let parsed: std::result::Result<Identity, _> = serde_json::from_str("\"a/b\"");
        assert!(parsed.is_err());
        let ok: Identity = serde_json::from_str("\"bob\"").unwrap();
        assert_eq!(ok.as_str(), "bob");
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a = Identity::new("alice").unwrap();
        let b = Identity::new("bob").unwrap();
        assert!(a < b);
    }
}
