pub mod audit;
pub mod authentication;
pub mod enrollment;

pub use audit::{AuditSink, JsonLinesAuditSink, LoginAuditEvent, TracingAuditSink};
pub use authentication::{AuthenticationStage, AuthenticationSuccess, AuthenticationWorkflow};
pub use enrollment::{EnrollmentReceipt, EnrollmentStage, EnrollmentWorkflow};

use std::fmt::Debug;

fn advance<S: Debug + Copy>(flow: &str, stage: &mut S, next: S) {
    tracing::debug!("{}: {:?} -> {:?}", flow, stage, next);
    *stage = next;
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::common::error::{FaceAuthError, Result};
    use crate::core::types::{Embedding, Identity};
    use crate::credentials::{CredentialIssuer, SessionCredentials};
    use crate::encoder::{DetectedFace, EncodeOutcome, FaceEncoder, ImageInput};
    use crate::workflow::audit::{AuditSink, LoginAuditEvent};

    /// Encoder whose answer is looked up by the image bytes.
    #[derive(Default)]
    pub struct StubEncoder {
        outcomes: HashMap<Vec<u8>, EncodeOutcome>,
        unavailable: bool,
        calls: AtomicUsize,
    }

    impl StubEncoder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn unavailable() -> Self {
            Self { unavailable: true, ..Self::default() }
        }

        pub fn with(mut self, image: &ImageInput, outcome: EncodeOutcome) -> Self {
            self.outcomes.insert(image.bytes.clone(), outcome);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl FaceEncoder for StubEncoder {
        fn encode(&self, image: &ImageInput) -> Result<EncodeOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.unavailable {
                return Err(FaceAuthError::EncoderUnavailable("stub offline".into()));
            }
            Ok(self.outcomes.get(&image.bytes).cloned().unwrap_or(EncodeOutcome::NoFace))
        }
    }

    pub fn image(tag: u8) -> ImageInput {
        ImageInput::new(vec![tag], "image/jpeg")
    }

    pub fn face(embedding: Embedding, quality: f32) -> EncodeOutcome {
        EncodeOutcome::Detected(DetectedFace {
            embedding,
            quality,
            model_version: Some("arcface_r100_onnx_v1".into()),
        })
    }

    pub struct StubIssuer;

    impl CredentialIssuer for StubIssuer {
        fn issue(&self, identity: &Identity) -> Result<SessionCredentials> {
            Ok(SessionCredentials {
                access_token: format!("access-{}", identity),
                refresh_token: format!("refresh-{}", identity),
                expires_in: 900,
            })
        }
    }

    #[derive(Default)]
    pub struct RecordingAuditSink {
        pub events: Mutex<Vec<LoginAuditEvent>>,
        pub fail: bool,
    }

    impl AuditSink for RecordingAuditSink {
        fn record(&self, event: &LoginAuditEvent) -> Result<()> {
            if self.fail {
                return Err(FaceAuthError::Storage("audit disk full".into()));
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }
}
