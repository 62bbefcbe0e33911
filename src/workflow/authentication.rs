use chrono::Utc;

use crate::common::config::AuthConfig;
use crate::common::error::{FaceAuthError, Result};
use crate::core::cipher::EmbeddingCipher;
use crate::core::matcher::{MatchEngine, NO_MATCH_SCORE};
use crate::core::types::Identity;
use crate::credentials::{CredentialIssuer, SessionCredentials};
use crate::encoder::{EncodeOutcome, FaceEncoder, ImageInput};
use crate::storage::{AccountDirectory, TemplateStore};
use crate::workflow::advance;
use crate::workflow::audit::{AuditSink, LoginAuditEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationStage {
    Idle,
    Encoding,
    Validating,
    Matching,
    Deciding,
    Issuing,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticationSuccess {
    pub identity: Identity,
    pub credentials: SessionCredentials,
    pub score: f32,
}

/// 1:N face login: one photo in, the best-matching active account's session
/// out.
pub struct AuthenticationWorkflow<'a> {
    encoder: &'a dyn FaceEncoder,
    cipher: &'a EmbeddingCipher,
    templates: &'a dyn TemplateStore,
    accounts: &'a dyn AccountDirectory,
    issuer: &'a dyn CredentialIssuer,
    audit: Option<&'a dyn AuditSink>,
    threshold: f32,
}

impl<'a> AuthenticationWorkflow<'a> {
    pub fn new(
        encoder: &'a dyn FaceEncoder,
        cipher: &'a EmbeddingCipher,
        templates: &'a dyn TemplateStore,
        accounts: &'a dyn AccountDirectory,
        issuer: &'a dyn CredentialIssuer,
        config: &AuthConfig,
    ) -> Self {
        Self {
            encoder,
            cipher,
            templates,
            accounts,
            issuer,
            audit: None,
            threshold: config.similarity_threshold,
        }
    }

    pub fn with_audit(mut self, sink: &'a dyn AuditSink) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn authenticate(&self, image: &ImageInput) -> Result<AuthenticationSuccess> {
        self.authenticate_for_client(image, None)
    }

    /// Same as [`authenticate`](Self::authenticate), tagging the audit event
    /// with the caller.
    pub fn authenticate_for_client(
        &self,
        image: &ImageInput,
        client: Option<&str>,
    ) -> Result<AuthenticationSuccess> {
        let mut stage = AuthenticationStage::Idle;
        let result = self.run(image, &mut stage);

        let event = match &result {
            Ok(success) => {
                tracing::info!("Face login succeeded for {} (score {:.4})", success.identity, success.score);
                LoginAuditEvent::success(success.identity.clone(), success.score, client)
            }
            Err(e) => {
                let next = if is_rejection(e) {
                    tracing::info!("Face login rejected during {:?}: {}", stage, e);
                    AuthenticationStage::Rejected
                } else {
                    tracing::error!("Face login failed during {:?}: {}", stage, e);
                    AuthenticationStage::Failed
                };
                advance("login", &mut stage, next);
                LoginAuditEvent::failure(e, client)
            }
        };

        if let Some(sink) = self.audit {
            if let Err(e) = sink.record(&event) {
                tracing::warn!("Audit sink failed: {}", e);
            }
        }

        result
    }

    fn run(&self, image: &ImageInput, stage: &mut AuthenticationStage) -> Result<AuthenticationSuccess> {
        advance("login", stage, AuthenticationStage::Encoding);
        let outcome = self.encoder.encode(image)?;

        advance("login", stage, AuthenticationStage::Validating);
        let probe = match outcome {
            EncodeOutcome::NoFace => return Err(FaceAuthError::NoFaceDetected),
            EncodeOutcome::MultipleFaces { count } => {
                return Err(FaceAuthError::MultipleFacesDetected { count })
            }
            EncodeOutcome::EncoderError { message } => {
                return Err(FaceAuthError::EncoderUnavailable(message))
            }
            EncodeOutcome::Detected(face) if face.embedding.is_empty() => {
                return Err(FaceAuthError::EmptyEmbedding)
            }
            EncodeOutcome::Detected(face) => face.embedding,
        };

        advance("login", stage, AuthenticationStage::Matching);
        let templates = self.templates.all()?;
        if templates.is_empty() {
            return Err(FaceAuthError::NoEnrollmentsExist);
        }

        let report = MatchEngine::new(self.cipher).best_match(&probe, &templates);
        tracing::debug!(
            "Scanned {} template(s), skipped {}",
            report.scanned,
            report.skipped.len()
        );

        advance("login", stage, AuthenticationStage::Deciding);
        let identity = match report.result.identity {
            Some(identity) if report.result.score >= self.threshold => identity,
            Some(_) => {
                return Err(FaceAuthError::NoConfidentMatch {
                    score: report.result.score,
                    threshold: self.threshold,
                })
            }
            None => {
                tracing::error!(
                    "All {} enrolled template(s) were unreadable; check the embedding key",
                    report.skipped.len()
                );
                return Err(FaceAuthError::NoConfidentMatch {
                    score: NO_MATCH_SCORE,
                    threshold: self.threshold,
                });
            }
        };

        let account = self
            .accounts
            .find(&identity)?
            .ok_or_else(|| FaceAuthError::AccountNotFound(identity.to_string()))?;
        if !account.is_active() {
            return Err(FaceAuthError::AccountNotActive(identity.to_string()));
        }

        advance("login", stage, AuthenticationStage::Issuing);
        let credentials = self.issuer.issue(&identity)?;
        self.accounts.record_login(&identity, Utc::now())?;

        Ok(AuthenticationSuccess { identity, credentials, score: report.result.score })
    }
}

fn is_rejection(error: &FaceAuthError) -> bool {
    matches!(
        error,
        FaceAuthError::NoFaceDetected
            | FaceAuthError::MultipleFacesDetected { .. }
            | FaceAuthError::EmptyEmbedding
            | FaceAuthError::NoEnrollmentsExist
            | FaceAuthError::NoConfidentMatch { .. }
            | FaceAuthError::AccountNotFound(_)
            | FaceAuthError::AccountNotActive(_)
    )
}
