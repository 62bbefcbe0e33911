use crate::common::config::EnrollmentConfig;
use crate::common::error::{FaceAuthError, Result};
use crate::core::aggregate::aggregate_embeddings;
use crate::core::cipher::EmbeddingCipher;
use crate::core::types::{Embedding, FaceTemplate, Identity};
use crate::encoder::{EncodeOutcome, FaceEncoder, ImageInput};
use crate::storage::{AccountDirectory, TemplateStore};
use crate::workflow::advance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentStage {
    Idle,
    Capturing,
    Aggregating,
    Sealing,
    Persisted,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentReceipt {
    pub quality: f32,
    pub model_version: String,
    pub frames_used: usize,
}

/// Turns a handful of photos of one already-authenticated user into their
/// single sealed template.
pub struct EnrollmentWorkflow<'a> {
    encoder: &'a dyn FaceEncoder,
    cipher: &'a EmbeddingCipher,
    templates: &'a dyn TemplateStore,
    accounts: &'a dyn AccountDirectory,
    config: &'a EnrollmentConfig,
}

struct Contribution {
    embedding: Embedding,
    quality: f32,
    model_version: Option<String>,
}

impl<'a> EnrollmentWorkflow<'a> {
    pub fn new(
        encoder: &'a dyn FaceEncoder,
        cipher: &'a EmbeddingCipher,
        templates: &'a dyn TemplateStore,
        accounts: &'a dyn AccountDirectory,
        config: &'a EnrollmentConfig,
    ) -> Self {
        Self { encoder, cipher, templates, accounts, config }
    }

    pub fn enroll(&self, identity: &Identity, images: &[ImageInput]) -> Result<EnrollmentReceipt> {
        let mut stage = EnrollmentStage::Idle;
        let result = self.run(identity, images, &mut stage);

        match &result {
            Ok(receipt) => tracing::info!(
                "Enrolled {} from {} frame(s), quality {:.3}",
                identity,
                receipt.frames_used,
                receipt.quality
            ),
            Err(e) => {
                tracing::error!("Enrollment for {} failed during {:?}: {}", identity, stage, e);
                advance("enroll", &mut stage, EnrollmentStage::Failed);
            }
        }
        result
    }

    fn run(
        &self,
        identity: &Identity,
        images: &[ImageInput],
        stage: &mut EnrollmentStage,
    ) -> Result<EnrollmentReceipt> {
        if images.is_empty() || images.len() > self.config.max_images {
            return Err(FaceAuthError::InvalidRequest(format!(
                "enrollment takes 1 to {} images, got {}",
                self.config.max_images,
                images.len()
            )));
        }

        advance("enroll", stage, EnrollmentStage::Capturing);
        let contributions = self.capture(identity, images)?;
        if contributions.is_empty() {
            return Err(FaceAuthError::NoFaceDetected);
        }

        advance("enroll", stage, EnrollmentStage::Aggregating);
        let embeddings: Vec<Embedding> =
            contributions.iter().map(|c| c.embedding.clone()).collect();
        let aggregated = aggregate_embeddings(&embeddings)?;
        let quality = contributions.iter().map(|c| c.quality).fold(0.0_f32, f32::max);
        let model_version = contributions
            .iter()
            .rev()
            .find_map(|c| c.model_version.clone())
            .unwrap_or_else(|| self.config.default_model_version.clone());

        advance("enroll", stage, EnrollmentStage::Sealing);
        let sealed = self.cipher.seal(&aggregated)?;
        let template = FaceTemplate::new(identity.clone(), sealed, model_version.clone(), quality);
        self.templates.upsert(template)?;
        self.accounts.mark_enrolled(identity)?;

        advance("enroll", stage, EnrollmentStage::Persisted);
        Ok(EnrollmentReceipt { quality, model_version, frames_used: contributions.len() })
    }

    fn capture(&self, identity: &Identity, images: &[ImageInput]) -> Result<Vec<Contribution>> {
        let mut contributions = Vec::with_capacity(images.len());

        for (index, image) in images.iter().enumerate() {
            match self.encoder.encode(image)? {
                EncodeOutcome::Detected(face) if !face.embedding.is_empty() => {
                    contributions.push(Contribution {
                        embedding: face.embedding,
                        quality: face.quality,
                        model_version: face.model_version,
                    });
                }
                EncodeOutcome::Detected(_) => {
                    tracing::warn!("Frame {} for {}: face without embedding, dropped", index, identity);
                }
                EncodeOutcome::NoFace => {
                    tracing::warn!("Frame {} for {}: no face, dropped", index, identity);
                }
                EncodeOutcome::MultipleFaces { count } => {
                    tracing::warn!("Frame {} for {}: {} faces, dropped", index, identity, count);
                }
                EncodeOutcome::EncoderError { message } => {
                    tracing::warn!("Frame {} for {}: encoder error '{}', dropped", index, identity, message);
                }
            }
        }

        Ok(contributions)
    }
}
