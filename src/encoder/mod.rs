//! Boundary to the external face encoder: image in, detection and embedding out.

pub mod socket;

use std::fs;
use std::path::Path;

use image::ImageFormat;
use serde::{Deserialize, Serialize};

use crate::common::error::{FaceAuthError, Result};
use crate::core::types::Embedding;

pub use socket::SocketFaceEncoder;

/// Raw image bytes plus their MIME type, passed to the encoder untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl ImageInput {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self { bytes, mime: mime.into() }
    }

    /// Read an image file, sniffing the MIME type from its leading bytes.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let mime = sniff_mime(&bytes).ok_or_else(|| {
            FaceAuthError::InvalidRequest(format!("{} is not a recognised image", path.display()))
        })?;
        Ok(Self { bytes, mime: mime.to_string() })
    }
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    let format = image::guess_format(bytes).ok()?;
    let mime = match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        _ => "application/octet-stream",
    };
    Some(mime)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    pub embedding: Embedding,
    pub quality: f32,
    pub model_version: Option<String>,
}

/// What the encoder saw in one image.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeOutcome {
    Detected(DetectedFace),
    NoFace,
    MultipleFaces { count: u32 },
    EncoderError { message: String },
}

pub trait FaceEncoder: Send + Sync {
    /// Transport failures are `Err(EncoderUnavailable)`; anything the encoder
    /// itself reports comes back as an `EncodeOutcome`.
    fn encode(&self, image: &ImageInput) -> Result<EncodeOutcome>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeRequest {
    pub image: ImageInput,
}

/// Loose response shape as the encoder sends it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncoderResponse {
    pub embedding: Option<Embedding>,
    pub quality: f32,
    pub faces_count: u32,
    pub model_version: Option<String>,
    pub error: Option<String>,
}

impl EncoderResponse {
    pub fn into_outcome(self) -> EncodeOutcome {
        match self.faces_count {
            0 => EncodeOutcome::NoFace,
            1 => match (self.embedding, self.error) {
                (None, Some(message)) => EncodeOutcome::EncoderError { message },
                (embedding, error) => {
                    if let Some(message) = error {
                        tracing::warn!("Encoder reported: {}", message);
                    }
                    EncodeOutcome::Detected(DetectedFace {
                        embedding: embedding.unwrap_or_default(),
                        quality: self.quality,
                        model_version: self.model_version,
                    })
                }
            },
            count => EncodeOutcome::MultipleFaces { count },
        }
    }
}
