use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::common::config::ServiceConfig;
use crate::common::error::{FaceAuthError, Result};
use crate::encoder::ImageInput;
use crate::service::framing::{read_frame, write_frame};
use crate::service::protocol::{
    AuthRequest, AuthResponse, EnrollRequest, EnrollResponse, Request, Response,
};

pub struct ServiceClient {
    socket_path: PathBuf,
    max_frame_bytes: usize,
    connect_retries: u32,
}

impl ServiceClient {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            socket_path: config.socket_path.clone(),
            max_frame_bytes: config.max_frame_bytes,
            connect_retries: 3,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn enroll(&self, access_token: &str, images: Vec<ImageInput>) -> Result<EnrollResponse> {
        let request = Request::Enroll(EnrollRequest {
            access_token: access_token.to_string(),
            images,
        });

        match self.call(&request)? {
            Response::Enroll(resp) => Ok(resp),
            Response::Error(msg) => Err(FaceAuthError::Other(anyhow::anyhow!("Service error: {}", msg))),
            _ => Err(FaceAuthError::Protocol("Unexpected response type".into())),
        }
    }

    pub fn authenticate(&self, image: ImageInput) -> Result<AuthResponse> {
        let request = Request::Authenticate(AuthRequest { image });

        match self.call(&request)? {
            Response::Auth(resp) => Ok(resp),
            Response::Error(msg) => Err(FaceAuthError::Other(anyhow::anyhow!("Service error: {}", msg))),
            _ => Err(FaceAuthError::Protocol("Unexpected response type".into())),
        }
    }

    fn call(&self, request: &Request) -> Result<Response> {
        let mut stream = self.connect_with_retry()?;
        write_frame(&mut stream, request)?;
        read_frame(&mut stream, self.max_frame_bytes)
    }

    fn connect_with_retry(&self) -> Result<UnixStream> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match UnixStream::connect(&self.socket_path) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(Duration::from_secs(120)))?;
                    stream.set_write_timeout(Some(Duration::from_secs(10)))?;
                    return Ok(stream);
                }
                Err(e) if attempt < self.connect_retries => {
                    tracing::debug!("Failed to connect (attempt {}): {}", attempt, e);
                    thread::sleep(Duration::from_millis(500));
                }
                Err(e) => {
                    return Err(FaceAuthError::Other(anyhow::anyhow!(
                        "Failed to connect to service at {}: {}",
                        self.socket_path.display(),
                        e
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use tempfile::TempDir;

    #[test]
    fn authenticate_sends_one_request_and_reads_answer() {
        let tmp = TempDir::new().unwrap();
        let config = ServiceConfig { socket_path: tmp.path().join("service.sock"), ..Default::default() };
        let listener = UnixListener::bind(&config.socket_path).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request: Request = read_frame(&mut stream, 1 << 20).unwrap();
            assert!(matches!(request, Request::Authenticate(_)));
            write_frame(&mut stream, &Response::Auth(AuthResponse::rejected("No face detected".into())))
                .unwrap();
        });

        let client = ServiceClient::new(&config);
        let resp = client.authenticate(ImageInput::new(vec![1, 2, 3], "image/png")).unwrap();
        server.join().unwrap();

        assert!(!resp.success);
        assert_eq!(resp.message, "No face detected");
    }

    #[test]
    fn mismatched_response_is_protocol_error() {
        let tmp = TempDir::new().unwrap();
        let config = ServiceConfig { socket_path: tmp.path().join("service.sock"), ..Default::default() };
        let listener = UnixListener::bind(&config.socket_path).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let _: Request = read_frame(&mut stream, 1 << 20).unwrap();
            write_frame(&mut stream, &Response::Auth(AuthResponse::default())).unwrap();
        });

        let err = ServiceClient::new(&config).enroll("token", Vec::new()).unwrap_err();
        server.join().unwrap();
        assert!(matches!(err, FaceAuthError::Protocol(_)));
    }
}
