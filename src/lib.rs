// Core modules
pub mod common;
pub mod core;
pub mod credentials;
pub mod encoder;
pub mod service;
pub mod storage;
pub mod workflow;

// Re-export commonly used types
pub use common::{Config, FaceAuthError, Paths, Result, RunMode};
pub use self::core::{Embedding, EmbeddingCipher, EmbeddingKey, FaceTemplate, Identity, MatchEngine};
pub use credentials::{CredentialIssuer, HmacCredentialIssuer, SessionCredentials, TokenKind};
pub use encoder::{EncodeOutcome, FaceEncoder, ImageInput, SocketFaceEncoder};
pub use service::{FaceGateServer, ServiceClient};
pub use storage::{AccountDirectory, FileAccountStore, FileTemplateStore, TemplateStore};
pub use workflow::{AuthenticationWorkflow, EnrollmentWorkflow};
