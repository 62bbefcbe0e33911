use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::common::config::EncoderConfig;
use crate::common::error::{FaceAuthError, Result};
use crate::encoder::{EncodeOutcome, EncodeRequest, EncoderResponse, FaceEncoder, ImageInput};
use crate::service::framing::{read_frame, write_frame, DEFAULT_MAX_FRAME_BYTES};

const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Talks to an encoder process over a Unix socket, one connection per image.
pub struct SocketFaceEncoder {
    socket_path: PathBuf,
    timeout: Duration,
    connect_retries: u32,
}

impl SocketFaceEncoder {
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration, connect_retries: u32) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout,
            connect_retries: connect_retries.max(1),
        }
    }

    pub fn from_config(config: &EncoderConfig) -> Self {
        Self::new(
            &config.socket_path,
            Duration::from_millis(config.timeout_ms),
            config.connect_retries,
        )
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    fn connect(&self) -> Result<UnixStream> {
        let mut last_error = None;

        for attempt in 1..=self.connect_retries {
            match UnixStream::connect(&self.socket_path) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.timeout))?;
                    stream.set_write_timeout(Some(self.timeout))?;
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::debug!(
                        "Encoder connect attempt {}/{} failed: {}",
                        attempt,
                        self.connect_retries,
                        e
                    );
                    last_error = Some(e);
                    if attempt < self.connect_retries {
                        thread::sleep(RETRY_DELAY);
                    }
                }
            }
        }

        Err(FaceAuthError::EncoderUnavailable(format!(
            "cannot reach encoder at {}: {}",
            self.socket_path.display(),
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    fn exchange(&self, image: &ImageInput) -> Result<EncoderResponse> {
        let mut stream = self.connect()?;
        let request = EncodeRequest { image: image.clone() };
        write_frame(&mut stream, &request)?;
        read_frame(&mut stream, DEFAULT_MAX_FRAME_BYTES)
    }
}

impl FaceEncoder for SocketFaceEncoder {
    fn encode(&self, image: &ImageInput) -> Result<EncodeOutcome> {
        let response = self.exchange(image).map_err(|e| match e {
            FaceAuthError::EncoderUnavailable(_) => e,
            other => FaceAuthError::EncoderUnavailable(other.to_string()),
        })?;
        Ok(response.into_outcome())
    }
}
