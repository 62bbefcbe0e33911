use serde::{Deserialize, Serialize};

use crate::credentials::SessionCredentials;
use crate::encoder::ImageInput;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Request {
    Enroll(EnrollRequest),
    Authenticate(AuthRequest),
}

/// Enrollment is only for a user who is already signed in; the access token
/// names who is enrolling.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EnrollRequest {
    pub access_token: String,
    pub images: Vec<ImageInput>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthRequest {
    pub image: ImageInput,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Response {
    Enroll(EnrollResponse),
    Auth(AuthResponse),
    Error(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct EnrollResponse {
    pub success: bool,
    pub message: String,
    pub quality: Option<f32>,
    pub model_version: Option<String>,
}

/// On failure only `success` and `message` are set.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    pub identity: Option<String>,
    pub credentials: Option<SessionCredentials>,
    pub score: Option<f32>,
}

impl AuthResponse {
    pub fn rejected(message: String) -> Self {
        Self { success: false, message, ..Self::default() }
    }
}

impl EnrollResponse {
    pub fn rejected(message: String) -> Self {
        Self { success: false, message, ..Self::default() }
    }
}
