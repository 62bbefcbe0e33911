use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::time::Duration;

use crate::common::config::Config;
use crate::common::error::{FaceAuthError, Result};
use crate::core::cipher::EmbeddingCipher;
use crate::credentials::{HmacCredentialIssuer, TokenKind};
use crate::encoder::FaceEncoder;
use crate::service::framing::{read_frame, write_frame};
use crate::service::protocol::{
    AuthRequest, AuthResponse, EnrollRequest, EnrollResponse, Request, Response,
};
use crate::service::throttle::LoginThrottle;
use crate::storage::{AccountDirectory, TemplateStore};
use crate::workflow::{AuditSink, AuthenticationWorkflow, EnrollmentWorkflow};

const READ_TIMEOUT: Duration = Duration::from_secs(30);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
    pub pid: u32,
    pub uid: u32,
    pub gid: u32,
}

impl PeerCredentials {
    /// Throttle and audit key for this caller.
    pub fn client_key(&self) -> String {
        format!("uid:{}", self.uid)
    }
}

/// Kernel-reported credentials of the process on the other end of `stream`.
pub fn peer_credentials(stream: &UnixStream) -> Result<PeerCredentials> {
    use std::mem;
    use std::os::unix::io::AsRawFd;

    let mut cred: libc::ucred = unsafe { mem::zeroed() };
    let mut cred_len = mem::size_of::<libc::ucred>() as libc::socklen_t;

    // SAFETY: `cred` is a properly sized, writable ucred and `cred_len` holds
    // its size, as SO_PEERCRED requires.
    let ret = unsafe {
        libc::getsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            &mut cred as *mut _ as *mut libc::c_void,
            &mut cred_len,
        )
    };

    if ret != 0 {
        return Err(FaceAuthError::Io(std::io::Error::last_os_error()));
    }

    Ok(PeerCredentials { pid: cred.pid as u32, uid: cred.uid, gid: cred.gid })
}

/// Everything one service instance needs to answer enrollment and login
/// requests.
pub struct FaceGateServer {
    config: Config,
    encoder: Box<dyn FaceEncoder>,
    cipher: EmbeddingCipher,
    templates: Box<dyn TemplateStore>,
    accounts: Box<dyn AccountDirectory>,
    issuer: HmacCredentialIssuer,
    audit: Option<Box<dyn AuditSink>>,
    throttle: LoginThrottle,
}

impl FaceGateServer {
    pub fn new(
        config: Config,
        encoder: Box<dyn FaceEncoder>,
        cipher: EmbeddingCipher,
        templates: Box<dyn TemplateStore>,
        accounts: Box<dyn AccountDirectory>,
        issuer: HmacCredentialIssuer,
    ) -> Self {
        let throttle = LoginThrottle::new(Duration::from_millis(config.auth.login_window_ms));
        Self { config, encoder, cipher, templates, accounts, issuer, audit: None, throttle }
    }

    pub fn with_audit(mut self, sink: Box<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Accept and answer connections one at a time until the listener fails.
    pub fn serve(&self, listener: &UnixListener) {
        for stream in listener.incoming() {
            match stream {
                Ok(mut stream) => {
                    let client = match peer_credentials(&stream) {
                        Ok(peer) => {
                            tracing::info!("Connection from UID: {}, PID: {}", peer.uid, peer.pid);
                            peer.client_key()
                        }
                        Err(e) => {
                            tracing::warn!("Could not read peer credentials: {}", e);
                            "unknown".to_string()
                        }
                    };

                    if let Err(e) = stream
                        .set_read_timeout(Some(READ_TIMEOUT))
                        .and_then(|_| stream.set_write_timeout(Some(WRITE_TIMEOUT)))
                    {
                        tracing::error!("Failed to set socket timeouts: {}", e);
                        continue;
                    }

                    if let Err(e) = self.handle_connection(&mut stream, &client) {
                        tracing::error!("Client error: {}", e);
                    }
                }
                Err(e) => tracing::error!("Connection error: {}", e),
            }
        }
    }

    /// Read one request from `stream`, answer it, and return.
    pub fn handle_connection<S: Read + Write>(&self, stream: &mut S, client: &str) -> Result<()> {
        let request: Request = match read_frame(stream, self.config.service.max_frame_bytes) {
            Ok(request) => request,
            Err(e @ FaceAuthError::Protocol(_)) => {
                write_frame(stream, &Response::Error("Malformed request".to_string()))?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let response = self.dispatch(request, client);
        write_frame(stream, &response)
    }

    pub fn dispatch(&self, request: Request, client: &str) -> Response {
        match request {
            Request::Authenticate(req) => {
                tracing::info!("Processing auth request from {}", client);
                Response::Auth(self.authenticate(req, client))
            }
            Request::Enroll(req) => {
                tracing::info!("Processing enrollment request from {} ({} image(s))", client, req.images.len());
                Response::Enroll(self.enroll(req))
            }
        }
    }

    fn authenticate(&self, req: AuthRequest, client: &str) -> AuthResponse {
        if let Err(e) = self.throttle.check(client) {
            return AuthResponse::rejected(e.client_message());
        }

        let mut workflow = AuthenticationWorkflow::new(
            self.encoder.as_ref(),
            &self.cipher,
            self.templates.as_ref(),
            self.accounts.as_ref(),
            &self.issuer,
            &self.config.auth,
        );
        if let Some(sink) = &self.audit {
            workflow = workflow.with_audit(sink.as_ref());
        }

        match workflow.authenticate_for_client(&req.image, Some(client)) {
            Ok(success) => AuthResponse {
                success: true,
                message: "Authenticated".to_string(),
                identity: Some(success.identity.to_string()),
                credentials: Some(success.credentials),
                score: Some(success.score),
            },
            Err(e) => {
                if e.is_fatal() {
                    tracing::error!("Fatal configuration error during login: {}", e);
                }
                AuthResponse::rejected(e.client_message())
            }
        }
    }

    fn enroll(&self, req: EnrollRequest) -> EnrollResponse {
        let identity = match self.issuer.verify(&req.access_token, TokenKind::Access) {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!("Enrollment refused: {}", e);
                return EnrollResponse::rejected(e.client_message());
            }
        };

        // A token outlives a suspension, so the account is re-checked here.
        match self.accounts.find(&identity) {
            Ok(Some(account)) if account.is_active() => {}
            Ok(Some(account)) => {
                tracing::warn!("Enrollment refused: {} is {:?}", identity, account.status);
                return EnrollResponse::rejected("Unauthorized".to_string());
            }
            Ok(None) => {
                tracing::warn!("Enrollment refused: no account for {}", identity);
                return EnrollResponse::rejected("Unauthorized".to_string());
            }
            Err(e) => {
                tracing::error!("Account lookup failed for {}: {}", identity, e);
                return EnrollResponse::rejected(e.client_message());
            }
        }

        let workflow = EnrollmentWorkflow::new(
            self.encoder.as_ref(),
            &self.cipher,
            self.templates.as_ref(),
            self.accounts.as_ref(),
            &self.config.enrollment,
        );

        match workflow.enroll(&identity, &req.images) {
            Ok(receipt) => EnrollResponse {
                success: true,
                message: format!("Enrolled {}", identity),
                quality: Some(receipt.quality),
                model_version: Some(receipt.model_version),
            },
            Err(e) => EnrollResponse::rejected(e.client_message()),
        }
    }
}
