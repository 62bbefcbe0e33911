use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceAuthError {
    #[error("No face detected")]
    NoFaceDetected,

    #[error("Multiple faces detected ({count}); exactly one face is required")]
    MultipleFacesDetected { count: u32 },

    #[error("Encoder reported a face but returned an empty embedding")]
    EmptyEmbedding,

    #[error("Face encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("No usable embedding to aggregate")]
    NoUsableEmbedding,

    #[error("Embedding dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Embedding encryption misconfigured: {0}")]
    EncryptionConfiguration(String),

    #[error("Invalid embedding key configuration: {0}")]
    InvalidKeyConfiguration(String),

    #[error("Template authentication failed")]
    AuthenticationFailed,

    #[error("Malformed embedding payload: {0}")]
    MalformedEmbedding(String),

    #[error("No face enrollments exist")]
    NoEnrollmentsExist,

    #[error("No confident match (best score {score:.4} < threshold {threshold:.4})")]
    NoConfidentMatch { score: f32, threshold: f32 },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account not active: {0}")]
    AccountNotActive(String),

    #[error("Invalid identity '{identity}': {message}")]
    InvalidIdentity { identity: String, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Too many authentication attempts; retry in {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl FaceAuthError {
    /// Conditions under which the service cannot operate safely. These are
    /// never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FaceAuthError::EncryptionConfiguration(_) | FaceAuthError::InvalidKeyConfiguration(_)
        )
    }

    /// Message suitable for an unauthenticated caller.
    ///
    /// A below-threshold match and a match on an unusable account read the
    /// same, and nothing here carries an identity or a score.
    pub fn client_message(&self) -> String {
        match self {
            FaceAuthError::NoFaceDetected => {
                "No face detected in the image".to_string()
            }
            FaceAuthError::MultipleFacesDetected { .. } => {
                "More than one face detected. Only one face may be in frame.".to_string()
            }
            FaceAuthError::EmptyEmbedding => "No face embedding".to_string(),
            FaceAuthError::NoEnrollmentsExist => "No face enrollments exist".to_string(),
            FaceAuthError::NoConfidentMatch { .. }
            | FaceAuthError::AccountNotFound(_)
            | FaceAuthError::AccountNotActive(_) => "No matching user found".to_string(),
            FaceAuthError::EncoderUnavailable(_) => {
                "Face encoder unavailable, try again later".to_string()
            }
            FaceAuthError::InvalidRequest(msg) => format!("Invalid request: {}", msg),
            FaceAuthError::InvalidIdentity { .. } => "Invalid identity".to_string(),
            FaceAuthError::Unauthorized(_) => "Unauthorized".to_string(),
            FaceAuthError::RateLimited { retry_after_ms } => {
                format!("Too many attempts, retry in {} ms", retry_after_ms)
            }
            _ => "Internal service error".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FaceAuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_and_inactive_account_read_the_same() {
        let below = FaceAuthError::NoConfidentMatch { score: 0.5, threshold: 0.65 };
        let inactive = FaceAuthError::AccountNotActive("alice".into());
        let missing = FaceAuthError::AccountNotFound("bob".into());

        assert_eq!(below.client_message(), inactive.client_message());
        assert_eq!(below.client_message(), missing.client_message());
        assert!(!below.client_message().contains("0.5"));
        assert!(!inactive.client_message().contains("alice"));
    }

    #[test]
    fn face_count_failures_stay_distinct() {
        let none = FaceAuthError::NoFaceDetected.client_message();
        let many = FaceAuthError::MultipleFacesDetected { count: 2 }.client_message();
        assert_ne!(none, many);
    }

    #[test]
    fn cipher_misconfiguration_is_fatal_and_opaque() {
        let err = FaceAuthError::EncryptionConfiguration("key missing".into());
        assert!(err.is_fatal());
        assert_eq!(err.client_message(), "Internal service error");
        assert!(!FaceAuthError::AuthenticationFailed.is_fatal());
    }
}
