use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::common::error::{FaceAuthError, Result};
use crate::common::paths::Paths;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub enrollment: EnrollmentConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_login_window")]
    pub login_window_ms: u64,
}

fn default_similarity_threshold() -> f32 { 0.65 }
fn default_login_window() -> u64 { 2000 }

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            login_window_ms: default_login_window(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EnrollmentConfig {
    #[serde(default = "default_max_images")]
    pub max_images: usize,
    #[serde(default = "default_model_version")]
    pub default_model_version: String,
}

fn default_max_images() -> usize { 5 }
fn default_model_version() -> String { "arcface_r100_onnx_v1".to_string() }

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            max_images: default_max_images(),
            default_model_version: default_model_version(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CryptoConfig {
    /// Environment variable holding the base64 AES-256 key.
    #[serde(default = "default_key_env")]
    pub key_env: String,
}

fn default_key_env() -> String { "FACE_EMBEDDING_KEY_B64".to_string() }

impl Default for CryptoConfig {
    fn default() -> Self {
        Self { key_env: default_key_env() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CredentialsConfig {
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    #[serde(default = "default_access_ttl")]
    pub access_ttl_secs: u64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_secs: u64,
}

fn default_secret_env() -> String { "FACEGATE_TOKEN_SECRET_B64".to_string() }
fn default_access_ttl() -> u64 { 15 * 60 }
fn default_refresh_ttl() -> u64 { 30 * 24 * 60 * 60 }

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            secret_env: default_secret_env(),
            access_ttl_secs: default_access_ttl(),
            refresh_ttl_secs: default_refresh_ttl(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EncoderConfig {
    #[serde(default = "default_encoder_socket")]
    pub socket_path: PathBuf,
    #[serde(default = "default_encoder_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
}

fn default_encoder_socket() -> PathBuf { PathBuf::from("/run/facegate/encoder.sock") }
fn default_encoder_timeout() -> u64 { 15_000 }
fn default_connect_retries() -> u32 { 3 }

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            socket_path: default_encoder_socket(),
            timeout_ms: default_encoder_timeout(),
            connect_retries: default_connect_retries(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
    #[serde(default = "default_accounts_file")]
    pub accounts_file: PathBuf,
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
}

fn default_templates_dir() -> PathBuf { PathBuf::from("/var/lib/facegate/templates") }
fn default_accounts_file() -> PathBuf { PathBuf::from("/var/lib/facegate/accounts.json") }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            templates_dir: default_templates_dir(),
            accounts_file: default_accounts_file(),
            audit_log: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_service_socket")]
    pub socket_path: PathBuf,
    #[serde(default = "default_max_frame")]
    pub max_frame_bytes: usize,
}

fn default_service_socket() -> PathBuf { PathBuf::from("/run/facegate/service.sock") }
fn default_max_frame() -> usize { 32 * 1024 * 1024 }

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: default_service_socket(),
            max_frame_bytes: default_max_frame(),
        }
    }
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FaceAuthError::Config(format!(
                "Config file not found: {}. Please create it from the example.", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| FaceAuthError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Config for a run mode: an explicit file wins, then the mode's default
    /// location, then built-in defaults. Development mode keeps all state under
    /// its data directory.
    pub fn resolve(paths: &Paths, explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::load_from_path(path)?,
            None => {
                let path = paths.config_file();
                if path.exists() {
                    Self::load_from_path(&path)?
                } else {
                    tracing::warn!("No config at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };

        match paths.data_dir() {
            Some(base) => Ok(config.rebased(base)),
            None => Ok(config),
        }
    }

    /// Rebase every storage and socket path under `base`. Used by dev mode.
    pub fn rebased(mut self, base: &Path) -> Self {
        self.storage.templates_dir = base.join("templates");
        self.storage.accounts_file = base.join("accounts.json");
        self.storage.audit_log = Some(base.join("logs/login-audit.jsonl"));
        self.service.socket_path = base.join("service.sock");
        self.encoder.socket_path = base.join("encoder.sock");
        self
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.auth.similarity_threshold;
        if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
            return Err(FaceAuthError::Config(format!(
                "Similarity threshold must be between -1.0 and 1.0, got {}", threshold
            )));
        }

        if self.enrollment.max_images == 0 || self.enrollment.max_images > 16 {
            return Err(FaceAuthError::Config(format!(
                "Enrollment max_images must be between 1 and 16, got {}",
                self.enrollment.max_images
            )));
        }

        if self.credentials.access_ttl_secs == 0 || self.credentials.refresh_ttl_secs == 0 {
            return Err(FaceAuthError::Config(
                "Credential TTLs must be greater than zero".to_string()
            ));
        }

        if self.encoder.timeout_ms == 0 || self.encoder.timeout_ms > 120_000 {
            return Err(FaceAuthError::Config(format!(
                "Encoder timeout must be between 1 and 120000 ms, got {}",
                self.encoder.timeout_ms
            )));
        }

        if self.service.max_frame_bytes < 1024 {
            return Err(FaceAuthError::Config(format!(
                "Service max_frame_bytes must be at least 1024, got {}",
                self.service.max_frame_bytes
            )));
        }

        Ok(())
    }
}
