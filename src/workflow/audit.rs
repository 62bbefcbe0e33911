use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;

use crate::common::error::{FaceAuthError, Result};
use crate::core::types::Identity;

/// One login attempt as written to the audit trail. The identity is only
/// present for successful logins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginAuditEvent {
    pub at: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
}

impl LoginAuditEvent {
    pub fn success(identity: Identity, score: f32, client: Option<&str>) -> Self {
        Self {
            at: chrono::Utc::now().timestamp_millis(),
            success: true,
            identity: Some(identity),
            score: Some(score),
            reason: None,
            client: client.map(str::to_string),
        }
    }

    pub fn failure(error: &FaceAuthError, client: Option<&str>) -> Self {
        let score = match error {
            FaceAuthError::NoConfidentMatch { score, .. } => Some(*score),
            _ => None,
        };
        Self {
            at: chrono::Utc::now().timestamp_millis(),
            success: false,
            identity: None,
            score,
            reason: Some(failure_reason(error)),
            client: client.map(str::to_string),
        }
    }
}

fn failure_reason(error: &FaceAuthError) -> &'static str {
    match error {
        FaceAuthError::NoFaceDetected => "no_face",
        FaceAuthError::MultipleFacesDetected { .. } => "multiple_faces",
        FaceAuthError::EmptyEmbedding => "empty_embedding",
        FaceAuthError::EncoderUnavailable(_) => "encoder_unavailable",
        FaceAuthError::NoEnrollmentsExist => "no_enrollments",
        FaceAuthError::NoConfidentMatch { .. } => "no_confident_match",
        FaceAuthError::AccountNotFound(_) => "account_not_found",
        FaceAuthError::AccountNotActive(_) => "account_not_active",
        FaceAuthError::RateLimited { .. } => "rate_limited",
        _ => "internal_error",
    }
}

/// Destination for login audit events. A failing sink never changes the
/// outcome of a login.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &LoginAuditEvent) -> Result<()>;
}

pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &LoginAuditEvent) -> Result<()> {
        match (&event.identity, event.reason) {
            (Some(identity), _) => tracing::info!(
                target: "facegate::audit",
                "login success for {} (client {:?})",
                identity,
                event.client
            ),
            (None, reason) => tracing::info!(
                target: "facegate::audit",
                "login failure: {} (client {:?})",
                reason.unwrap_or("unknown"),
                event.client
            ),
        }
        Ok(())
    }
}

/// Appends one JSON object per line.
pub struct JsonLinesAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesAuditSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path, lock: Mutex::new(()) }
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn record(&self, event: &LoginAuditEvent) -> Result<()> {
        let mut line = serde_json::to_vec(event)
            .map_err(|e| FaceAuthError::Storage(format!("Failed to encode audit event: {}", e)))?;
        line.push(b'\n');

        let _guard = self
            .lock
            .lock()
            .map_err(|_| FaceAuthError::Storage("audit log lock poisoned".into()))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(&line)?;
        Ok(())
    }
}
